use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use trade_exam_portal::{
    database::pool::{connect, run_migrations},
    dto::admin_dto::ClearSessionsPayload,
    models::{question::PaperType, question::QuestionSet, user::Role},
    services::{
        auth_service::AuthService,
        candidate_service::CandidateService,
        maintenance_service::{CleanupLevel, MaintenanceService},
        paper_service::{ActivationUpdate, PaperService},
        slot_service::SlotService,
        trade_service::TradeService,
    },
    utils::{dat, token::generate_access_token},
};

#[derive(Parser)]
#[command(author, version, about = "Operator commands for the trade exam portal")]
struct Cli {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Duration papers are reset to by `cleanup --level everything`
    #[arg(long, env = "DEFAULT_EXAM_DURATION_MINUTES", default_value_t = 180)]
    default_exam_duration_minutes: i32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Delete data at the given level
    Cleanup {
        #[arg(long)]
        level: CleanupLevel,
        #[arg(long)]
        dry_run: bool,
        /// Required unless --dry-run is given
        #[arg(long)]
        yes: bool,
    },
    /// Delete sessions and answers, keeping candidates and questions
    ClearResults {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Row counts per table
    Stats,
    #[command(subcommand)]
    Sets(SetsCommand),
    #[command(subcommand)]
    Slots(SlotsCommand),
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Create an OIC or PO admin account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "OIC_ADMIN")]
        role: Role,
        /// Generated and printed when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Decrypt a .dat container to a plain .xlsx
    DecryptDat {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, env = "CONVERTER_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
    /// Encrypt a plain .xlsx into a .dat container
    EncryptDat {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, env = "CONVERTER_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },
}

#[derive(Subcommand)]
enum SetsCommand {
    /// Current activations per trade
    Status,
    /// Active question counts per trade, paper type and set
    Available,
    /// Make a set live for one trade, or for every trade
    Activate {
        #[arg(long, value_parser = parse_paper_type)]
        paper_type: PaperType,
        #[arg(long)]
        set: QuestionSet,
        /// Trade code; all trades when omitted
        #[arg(long)]
        trade: Option<String>,
    },
}

#[derive(Subcommand)]
enum SlotsCommand {
    Status {
        #[arg(long)]
        army_no: String,
    },
    Assign {
        #[arg(long)]
        army_no: String,
    },
    Reset {
        #[arg(long)]
        army_no: String,
    },
    Reassign {
        #[arg(long)]
        army_no: String,
    },
    /// Clear every slot and unfinished session
    ResetAll {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// Delete unfinished sessions and their saved answers
    ClearIncomplete {
        /// Trade code
        #[arg(long)]
        trade: Option<String>,
        #[arg(long)]
        army_no: Option<String>,
        #[arg(long, value_parser = parse_paper_type)]
        paper_type: Option<PaperType>,
    },
}

fn parse_paper_type(s: &str) -> Result<PaperType, String> {
    s.to_ascii_uppercase().parse()
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn pool(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let url = database_url.context("DATABASE_URL is not set")?;
    Ok(connect(url).await?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let url = cli.database_url.as_deref();
    let minutes = cli.default_exam_duration_minutes;
    match cli.command {
        Command::DecryptDat { input, output, passphrase } => {
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let plain = dat::decrypt(&bytes, &passphrase)?;
            std::fs::write(&output, plain).with_context(|| format!("writing {}", output.display()))?;
            println!("decrypted {} -> {}", input.display(), output.display());
        }
        Command::EncryptDat { input, output, passphrase } => {
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            if !dat::looks_like_xlsx(&bytes) {
                bail!("{} is not an .xlsx workbook", input.display());
            }
            let sealed = dat::encrypt(&bytes, &passphrase)?;
            std::fs::write(&output, sealed).with_context(|| format!("writing {}", output.display()))?;
            println!("encrypted {} -> {}", input.display(), output.display());
        }
        Command::Migrate => {
            let pool = pool(url).await?;
            run_migrations(&pool).await?;
            println!("migrations applied");
        }
        Command::Cleanup { level, dry_run, yes } => {
            if !dry_run && !yes {
                bail!("refusing to delete data without --yes (or use --dry-run)");
            }
            let report = MaintenanceService::new(pool(url).await?, minutes).cleanup(level, dry_run).await?;
            print_report(&report);
        }
        Command::ClearResults { dry_run, yes } => {
            if !dry_run && !yes {
                bail!("refusing to delete data without --yes (or use --dry-run)");
            }
            let report = MaintenanceService::new(pool(url).await?, minutes).clear_exam_results(dry_run).await?;
            print_report(&report);
        }
        Command::Stats => {
            let stats = MaintenanceService::new(pool(url).await?, minutes).stats().await?;
            for r in &stats.users {
                println!("users[{}]: {}", r.role, r.count);
            }
            println!("trades: {}", stats.trades);
            println!("candidates: {} ({} with slot)", stats.candidates, stats.candidates_with_slot);
            for q in &stats.questions {
                println!("questions[{} part {} set {}]: {}", q.paper_type, q.part, q.question_set, q.count);
            }
            println!("sessions: {} ({} completed)", stats.sessions, stats.sessions_completed);
            println!("answers: {}", stats.answers);
            println!("uploads: {}", stats.uploads);
        }
        Command::Sets(cmd) => sets(pool(url).await?, cmd).await?,
        Command::Slots(cmd) => slots(pool(url).await?, cmd).await?,
        Command::Sessions(SessionsCommand::ClearIncomplete { trade, army_no, paper_type }) => {
            let pool = pool(url).await?;
            let trade_id = match trade {
                Some(code) => Some(TradeService::new(pool.clone()).by_code(&code).await?.id),
                None => None,
            };
            let candidate_id = match army_no {
                Some(no) => Some(CandidateService::new(pool.clone()).get_by_army_no(&no).await?.id),
                None => None,
            };
            let filter = ClearSessionsPayload { trade_id, candidate_id, paper_type };
            let removed = MaintenanceService::new(pool, minutes).clear_incomplete_sessions(&filter).await?;
            println!("removed {} incomplete session(s)", removed);
        }
        Command::CreateAdmin { username, role, password } => {
            if !role.is_admin() {
                bail!("role must be OIC_ADMIN or PO_ADMIN");
            }
            let generated = password.is_none();
            let password = password.unwrap_or_else(|| generate_access_token(16));
            let user = AuthService::new(pool(url).await?).create_admin(&username, &password, role).await?;
            println!("created {} '{}' (id {})", user.role, user.username, user.id);
            if generated {
                println!("password: {}", password);
            }
        }
    }
    Ok(())
}

async fn sets(pool: PgPool, cmd: SetsCommand) -> anyhow::Result<()> {
    let papers = PaperService::new(pool.clone());
    match cmd {
        SetsCommand::Status => {
            for a in papers.list_activations().await? {
                println!(
                    "{:<12} {:<10} set {} {}{}",
                    a.trade_code,
                    a.paper_type,
                    a.question_set,
                    if a.is_active { "active" } else { "inactive" },
                    a.exam_duration_minutes.map(|m| format!(" ({} min)", m)).unwrap_or_default()
                );
            }
        }
        SetsCommand::Available => {
            for s in papers.available_sets().await? {
                println!(
                    "{:<12} {:<10} set {}: {}",
                    s.trade_code.as_deref().unwrap_or("COMMON"),
                    s.paper_type,
                    s.question_set,
                    s.question_count
                );
            }
        }
        SetsCommand::Activate { paper_type, set, trade: None } => {
            let changed = papers.activate_set_everywhere(paper_type, set).await?;
            println!("set {} now live for {} {} activation(s)", set, changed, paper_type);
        }
        SetsCommand::Activate { paper_type, set, trade: Some(code) } => {
            let trade = TradeService::new(pool).by_code(&code).await?;
            let is_active = papers
                .activation(trade.id, paper_type)
                .await?
                .map(|a| a.is_active)
                .unwrap_or(true);
            let row = papers
                .upsert_activation(&ActivationUpdate {
                    trade_id: trade.id,
                    paper_type,
                    is_active,
                    question_set: Some(set),
                    exam_duration_minutes: None,
                })
                .await?;
            println!("{} {} now uses set {}", trade.code, row.paper_type, row.question_set);
        }
    }
    Ok(())
}

async fn slots(pool: PgPool, cmd: SlotsCommand) -> anyhow::Result<()> {
    let candidates = CandidateService::new(pool.clone());
    let slots = SlotService::new(pool);
    let profile = match &cmd {
        SlotsCommand::ResetAll { yes } => {
            if !yes {
                bail!("refusing to reset every slot without --yes");
            }
            let count = slots.reset_all().await?;
            println!("reset {} slot(s)", count);
            return Ok(());
        }
        SlotsCommand::Status { army_no }
        | SlotsCommand::Assign { army_no }
        | SlotsCommand::Reset { army_no }
        | SlotsCommand::Reassign { army_no } => candidates.get_by_army_no(army_no).await?,
    };
    let updated = match cmd {
        SlotsCommand::Assign { .. } => slots.assign(profile.id, None).await?,
        SlotsCommand::Reset { .. } => slots.reset(profile.id).await?,
        SlotsCommand::Reassign { .. } => slots.reassign(profile.id, None).await?,
        _ => profile,
    };
    println!("{} {}: {}", updated.army_no, updated.name, updated.slot_state());
    Ok(())
}

fn print_report(report: &trade_exam_portal::services::maintenance_service::CleanupReport) {
    let verb = if report.dry_run { "would delete" } else { "deleted" };
    for c in &report.counts {
        println!("{:<24} {} {}", c.target, verb, c.rows);
    }
    println!("{} level: {} row(s) total", report.level, report.total());
}
