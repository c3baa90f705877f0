use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

use crate::models::question::Part;
use crate::models::question_paper::PartDistribution;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortage {
    pub part: Part,
    pub required: u32,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Not enough questions. {}", describe(.0))]
    Shortage(Vec<Shortage>),
    #[error("No questions were selected for this paper.")]
    Empty,
}

fn describe(parts: &[Shortage]) -> String {
    parts
        .iter()
        .map(|s| format!("Part {}: need {}, available {}", s.part, s.required, s.available))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Draws `distribution[part]` items at random from each part's pool and
/// shuffles within the part. Parts come out in A-F order. Fails without
/// drawing anything when any part is short.
pub fn select_questions<T: Clone, R: Rng + ?Sized>(
    distribution: &PartDistribution,
    pool: &BTreeMap<Part, Vec<T>>,
    rng: &mut R,
) -> Result<Vec<T>, SelectionError> {
    let shortages: Vec<Shortage> = distribution
        .iter()
        .filter(|(_, required)| **required > 0)
        .filter_map(|(&part, &required)| {
            let available = pool.get(&part).map_or(0, Vec::len);
            (available < required as usize).then_some(Shortage {
                part,
                required,
                available,
            })
        })
        .collect();
    if !shortages.is_empty() {
        return Err(SelectionError::Shortage(shortages));
    }

    let mut selected = Vec::new();
    for (part, &required) in distribution {
        if required == 0 {
            continue;
        }
        let Some(candidates) = pool.get(part) else {
            continue;
        };
        let mut picked: Vec<T> = candidates
            .choose_multiple(rng, required as usize)
            .cloned()
            .collect();
        picked.shuffle(rng);
        selected.extend(picked);
    }

    if selected.is_empty() {
        return Err(SelectionError::Empty);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question_paper::{common_distribution, total_questions, trade_distribution};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool_with(sizes: &[(Part, usize)]) -> BTreeMap<Part, Vec<(Part, usize)>> {
        sizes
            .iter()
            .map(|&(part, n)| (part, (0..n).map(|i| (part, i)).collect()))
            .collect()
    }

    #[test]
    fn shortage_reports_every_short_part() {
        let pool = pool_with(&[(Part::A, 15), (Part::C, 2), (Part::D, 10), (Part::E, 3), (Part::F, 1)]);
        let err = select_questions(&common_distribution(), &pool, &mut StdRng::seed_from_u64(1)).unwrap_err();
        match err {
            SelectionError::Shortage(parts) => {
                let short: Vec<Part> = parts.iter().map(|s| s.part).collect();
                assert_eq!(short, vec![Part::C, Part::F]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shortage_message_lists_parts() {
        let err = SelectionError::Shortage(vec![
            Shortage { part: Part::C, required: 5, available: 2 },
            Shortage { part: Part::F, required: 10, available: 1 },
        ]);
        assert_eq!(
            err.to_string(),
            "Not enough questions. Part C: need 5, available 2; Part F: need 10, available 1"
        );
        let boxed: Box<dyn std::error::Error> = Box::new(SelectionError::Empty);
        assert_eq!(boxed.to_string(), "No questions were selected for this paper.");
    }

    #[test]
    fn all_zero_distribution_is_empty_error() {
        let dist: PartDistribution = Part::ALL.iter().map(|&p| (p, 0)).collect();
        let err = select_questions(&dist, &pool_with(&[(Part::A, 5)]), &mut StdRng::seed_from_u64(2)).unwrap_err();
        assert_eq!(err, SelectionError::Empty);
    }

    #[test]
    fn parts_are_grouped_in_order() {
        let dist = common_distribution();
        let pool = pool_with(&[(Part::A, 30), (Part::C, 30), (Part::D, 30), (Part::E, 30), (Part::F, 30)]);
        let picked = select_questions(&dist, &pool, &mut StdRng::seed_from_u64(3)).unwrap();
        let parts: Vec<Part> = picked.iter().map(|(p, _)| *p).collect();
        let mut sorted = parts.clone();
        sorted.sort();
        assert_eq!(parts, sorted);
    }

    proptest! {
        #[test]
        fn success_draws_exact_distinct_totals(
            seed in any::<u64>(),
            extra in proptest::collection::vec(0usize..20, 6),
            extended in any::<bool>(),
        ) {
            let dist = if extended {
                trade_distribution("OCC").unwrap()
            } else {
                common_distribution()
            };
            let sizes: Vec<(Part, usize)> = Part::ALL
                .iter()
                .zip(extra.iter())
                .map(|(&p, &e)| (p, dist[&p] as usize + e))
                .collect();
            let pool = pool_with(&sizes);
            let picked = select_questions(&dist, &pool, &mut StdRng::seed_from_u64(seed)).unwrap();
            prop_assert_eq!(picked.len() as u32, total_questions(&dist));
            let unique: HashSet<_> = picked.iter().collect();
            prop_assert_eq!(unique.len(), picked.len());
            for part in Part::ALL {
                let n = picked.iter().filter(|(p, _)| *p == part).count() as u32;
                prop_assert_eq!(n, dist[&part]);
            }
        }

        #[test]
        fn short_pool_never_yields_partial_paper(seed in any::<u64>(), short_part in 0usize..6) {
            let dist = common_distribution();
            let sizes: Vec<(Part, usize)> = Part::ALL
                .iter()
                .enumerate()
                .map(|(i, &p)| {
                    let need = dist[&p] as usize;
                    (p, if i == short_part && need > 0 { need - 1 } else { need })
                })
                .collect();
            let result = select_questions(&dist, &pool_with(&sizes), &mut StdRng::seed_from_u64(seed));
            if dist[&Part::ALL[short_part]] > 0 {
                prop_assert!(result.is_err());
            } else {
                prop_assert_eq!(result.unwrap().len() as u32, total_questions(&dist));
            }
        }
    }
}
