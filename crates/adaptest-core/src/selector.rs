//! Maximum-information next-item selection.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Item, ItemId};
use crate::rasch::item_information;

/// Absolute tolerance when comparing information values.
const TIE_ABS_TOLERANCE: f64 = 1e-12;
/// Relative tolerance when comparing information values.
const TIE_REL_TOLERANCE: f64 = 1e-5;

/// Picks the unanswered item with maximum Fisher information at the current theta.
///
/// Items whose information is within tolerance of the maximum are treated as
/// tied and one of them is drawn uniformly at random, so learners sharing the
/// same theta do not all receive the same item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemSelector;

impl ItemSelector {
    pub fn new() -> Self {
        Self
    }

    /// Select the next item using the thread-local RNG for tie-breaking.
    pub fn select_next<'a>(
        &self,
        theta: f64,
        answered: &HashSet<ItemId>,
        catalog: &'a [Item],
    ) -> Option<&'a Item> {
        self.select_next_with_rng(theta, answered, catalog, &mut rand::thread_rng())
    }

    /// Select the next item, breaking ties with `rng`.
    ///
    /// Returns `None` exactly when every catalog item is in `answered`.
    pub fn select_next_with_rng<'a, R: Rng + ?Sized>(
        &self,
        theta: f64,
        answered: &HashSet<ItemId>,
        catalog: &'a [Item],
        rng: &mut R,
    ) -> Option<&'a Item> {
        let scored: Vec<(&Item, f64)> = catalog
            .iter()
            .filter(|item| !answered.contains(&item.id))
            .map(|item| (item, item_information(theta, item.difficulty)))
            .collect();

        let max_info = scored
            .iter()
            .map(|(_, info)| *info)
            .filter(|info| !info.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);

        let candidates: Vec<&Item> = scored
            .iter()
            .filter(|(_, info)| is_tied(*info, max_info))
            .map(|(item, _)| *item)
            .collect();

        if candidates.len() > 1 {
            tracing::debug!(
                theta,
                max_info,
                n_candidates = candidates.len(),
                "multiple items share the maximum information"
            );
        }

        match candidates.choose(rng) {
            Some(item) => Some(*item),
            // Only reachable when every candidate has NaN information.
            None => scored.choose(rng).map(|(item, _)| *item),
        }
    }
}

fn is_tied(info: f64, max_info: f64) -> bool {
    (info - max_info).abs() <= TIE_ABS_TOLERANCE + TIE_REL_TOLERANCE * max_info.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog(difficulties: &[f64]) -> Vec<Item> {
        difficulties
            .iter()
            .enumerate()
            .map(|(i, &b)| Item::new(i as ItemId + 1, "stmt", "ans", b))
            .collect()
    }

    #[test]
    fn picks_item_closest_to_theta() {
        let items = catalog(&[-2.0, -0.5, 0.4, 2.5]);
        let selected = ItemSelector::new()
            .select_next(0.5, &HashSet::new(), &items)
            .unwrap();
        assert_eq!(selected.id, 3);
    }

    #[test]
    fn never_returns_an_answered_item() {
        let items = catalog(&[-1.0, 0.0, 0.1, 1.0]);
        let answered: HashSet<ItemId> = [2, 3].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let selected = ItemSelector::new()
                .select_next_with_rng(0.0, &answered, &items, &mut rng)
                .unwrap();
            assert!(!answered.contains(&selected.id));
        }
    }

    #[test]
    fn none_iff_pool_exhausted() {
        let items = catalog(&[0.0, 1.0]);
        let selector = ItemSelector::new();
        let all: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
        assert!(selector.select_next(0.0, &all, &items).is_none());
        assert!(selector.select_next(0.0, &HashSet::new(), &[]).is_none());

        let one_left: HashSet<ItemId> = [1].into_iter().collect();
        assert_eq!(selector.select_next(0.0, &one_left, &items).unwrap().id, 2);
    }

    #[test]
    fn ties_are_broken_uniformly() {
        // Equal difficulty, so information is identical at any theta.
        let items = catalog(&[0.8, 0.8]);
        let selector = ItemSelector::new();
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 4000;
        let first = (0..trials)
            .filter(|_| {
                selector
                    .select_next_with_rng(0.0, &HashSet::new(), &items, &mut rng)
                    .unwrap()
                    .id
                    == 1
            })
            .count();
        let share = first as f64 / trials as f64;
        assert!((0.45..=0.55).contains(&share), "share of first item: {share}");
    }

    #[test]
    fn symmetric_difficulties_tie_at_center() {
        let items = catalog(&[-1.0, 1.0, 2.5]);
        let selector = ItemSelector::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let item = selector
                .select_next_with_rng(0.0, &HashSet::new(), &items, &mut rng)
                .unwrap();
            seen.insert(item.id);
        }
        assert_eq!(seen, [1, 2].into_iter().collect());
    }
}
