//! Cumulative weight table for response time weighted selection.
//!
//! With servers A(avg=10), B(avg=30), C(avg=40) the cluster total is 80, so
//! each server contributes `80 - avg`: A=70, B=50, C=40. The table stores the
//! running sum `[70, 120, 160]`; a draw `r` in `[0, 160)` selects the first
//! position whose cumulative weight is `>= r`.

/// Totals below this are treated as "no statistics yet".
pub const MIN_TOTAL_WEIGHT: f64 = 0.001;

/// Cumulative weights aligned with the server list they were computed from.
///
/// Never mutated after construction; a new table replaces the old one whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightTable {
    cumulative: Vec<f64>,
}

impl WeightTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the table from average response times in server list order.
    ///
    /// A server slower than the sum of all averages would contribute a
    /// negative weight; that can only happen with negative averages and is
    /// left unclamped.
    pub fn from_response_times(avg_response_times: &[f64]) -> Self {
        let total: f64 = avg_response_times.iter().sum();
        let mut weight_so_far = 0.0;
        let cumulative = avg_response_times
            .iter()
            .map(|avg| {
                weight_so_far += total - avg;
                weight_so_far
            })
            .collect();
        Self { cumulative }
    }

    /// Total weight, the last cumulative entry, or 0 when empty.
    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Whether the weights carry no signal and selection should rotate instead.
    pub fn is_degenerate(&self) -> bool {
        self.total() < MIN_TOTAL_WEIGHT
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// The cumulative weights.
    pub fn as_slice(&self) -> &[f64] {
        &self.cumulative
    }

    /// Position selected by a draw: the first entry `>= draw`, or 0 if none.
    pub fn index_for(&self, draw: f64) -> usize {
        self.cumulative.iter().position(|w| *w >= draw).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cumulative_weights() {
        let table = WeightTable::from_response_times(&[10.0, 30.0, 40.0]);
        assert_eq!(table.as_slice(), &[70.0, 120.0, 160.0]);
        assert_eq!(table.total(), 160.0);
    }

    #[test]
    fn test_boundary_draws() {
        let table = WeightTable::from_response_times(&[10.0, 30.0, 40.0]);
        assert_eq!(table.index_for(0.0), 0);
        assert_eq!(table.index_for(69.999), 0);
        assert_eq!(table.index_for(70.0), 0);
        assert_eq!(table.index_for(70.001), 1);
        assert_eq!(table.index_for(159.999), 2);
    }

    #[test]
    fn test_equal_averages_are_degenerate() {
        // Each contribution is 2 * avg, so only all-zero averages vanish.
        assert!(WeightTable::from_response_times(&[0.0, 0.0, 0.0]).is_degenerate());
        assert!(WeightTable::empty().is_degenerate());
        assert!(!WeightTable::from_response_times(&[5.0, 5.0]).is_degenerate());
    }

    #[test]
    fn test_single_server_has_zero_weight() {
        let table = WeightTable::from_response_times(&[250.0]);
        assert_eq!(table.as_slice(), &[0.0]);
        assert!(table.is_degenerate());
    }

    #[test]
    fn test_negative_contribution_is_not_clamped() {
        // total = -5 + 20 = 15; contributions 20 and -5.
        let table = WeightTable::from_response_times(&[-5.0, 20.0]);
        assert_eq!(table.as_slice(), &[20.0, 15.0]);
        assert_eq!(table.index_for(17.0), 0);
        // Past the last entry the scan falls back to the first position.
        assert_eq!(table.index_for(30.0), 0);
    }

    proptest! {
        #[test]
        fn prop_table_is_monotonic_and_sums(avgs in prop::collection::vec(0.0f64..10_000.0, 0..64)) {
            let table = WeightTable::from_response_times(&avgs);
            prop_assert_eq!(table.len(), avgs.len());

            for pair in table.as_slice().windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }

            let total: f64 = avgs.iter().sum();
            let contributions: f64 = avgs.iter().map(|a| total - a).sum();
            prop_assert!((table.total() - contributions).abs() <= 1e-6 * contributions.max(1.0));
        }

        #[test]
        fn prop_draw_lands_in_range(avgs in prop::collection::vec(1.0f64..500.0, 2..32), frac in 0.0f64..1.0) {
            let table = WeightTable::from_response_times(&avgs);
            let draw = frac * table.total();
            let idx = table.index_for(draw);
            prop_assert!(idx < table.len());
            prop_assert!(table.as_slice()[idx] >= draw);
            if idx > 0 {
                prop_assert!(table.as_slice()[idx - 1] < draw);
            }
        }
    }
}
