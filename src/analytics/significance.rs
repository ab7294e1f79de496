//! Chi-squared test of independence over the 2x2 table
//! {variant A, variant B} x {converted, not converted}.
//!
//! The p-value is read off a fixed ladder of df=1 critical values rather than
//! evaluated from the chi-squared distribution, so callers only ever see one of
//! `1.0, 0.10, 0.05, 0.02, 0.01, 0.001`.

use crate::model::{SignificanceResult, Variant, VariantTotal};

/// `(critical value, p-value)` rungs, strongest first.
pub const CRITICAL_VALUES: [(f64, f64); 5] = [
    (10.83, 0.001),
    (6.63, 0.01),
    (5.41, 0.02),
    (3.84, 0.05),
    (2.71, 0.10),
];

const NOT_SIGNIFICANT_P_VALUE: f64 = 1.0;
const SIGNIFICANCE_LEVEL: f64 = 0.05;

pub const INSUFFICIENT_DATA_MESSAGE: &str =
    "insufficient data: statistical significance cannot be computed yet.";

/// Tests whether the conversion rates of A and B differ.
///
/// Inputs where a variant has no views, where nothing converted, or where the
/// counters cannot form a valid table (more clicks than views, an expected
/// cell of zero) produce the insufficient-data result with `p_value = 1`.
///
/// The returned `p_value` is a coarse step approximation: any statistic
/// between two critical values reports the weaker rung.
pub fn test_significance(
    views_a: u64,
    clicks_a: u64,
    views_b: u64,
    clicks_b: u64,
) -> SignificanceResult {
    let Some(statistic) = chi_squared_statistic(views_a, clicks_a, views_b, clicks_b) else {
        return insufficient_data();
    };

    let p_value = p_value_for(statistic);
    let confidence = (1.0 - p_value) * 100.0;

    if p_value <= SIGNIFICANCE_LEVEL {
        let winner = better_variant(views_a, clicks_a, views_b, clicks_b);

        SignificanceResult {
            p_value,
            confidence,
            statistic,
            message: format!(
                "The result is statistically significant. Based on the current data, {} is performing better.",
                winner.label()
            ),
            winner: Some(winner),
        }
    } else {
        SignificanceResult {
            p_value,
            confidence,
            statistic,
            message: "The difference between the variants is not statistically significant. \
                      It may be due to chance; collect more data or redesign the test."
                .to_string(),
            winner: None,
        }
    }
}

/// [`test_significance`] over the totals produced by the aggregator.
pub fn test_totals(totals: &[VariantTotal; 2]) -> SignificanceResult {
    let [a, b] = totals;
    test_significance(a.views, a.clicks, b.views, b.clicks)
}

/// Pearson's statistic for the 2x2 table, `None` when any expected cell is
/// not strictly positive or an observed cell would be negative.
pub fn chi_squared_statistic(
    views_a: u64,
    clicks_a: u64,
    views_b: u64,
    clicks_b: u64,
) -> Option<f64> {
    if views_a == 0 || views_b == 0 || clicks_a > views_a || clicks_b > views_b {
        return None;
    }

    let total_views = views_a as f64 + views_b as f64;
    let total_clicks = clicks_a as f64 + clicks_b as f64;
    if total_clicks == 0.0 {
        return None;
    }

    let mut statistic = 0.0;
    for (views, clicks) in [(views_a, clicks_a), (views_b, clicks_b)] {
        let views = views as f64;
        let clicks = clicks as f64;
        let expected_conv = views * total_clicks / total_views;
        let expected_non_conv = views - expected_conv;
        if expected_conv <= 0.0 || expected_non_conv <= 0.0 {
            return None;
        }

        statistic += (clicks - expected_conv).powi(2) / expected_conv;
        statistic += ((views - clicks) - expected_non_conv).powi(2) / expected_non_conv;
    }

    statistic.is_finite().then_some(statistic)
}

/// Maps a df=1 statistic onto the critical-value ladder.
pub fn p_value_for(statistic: f64) -> f64 {
    CRITICAL_VALUES
        .iter()
        .find(|(critical, _)| statistic >= *critical)
        .map(|(_, p_value)| *p_value)
        .unwrap_or(NOT_SIGNIFICANT_P_VALUE)
}

/// Threshold label shown next to a non-significant p-value, as in
/// `p-value > 0.10`.
pub fn p_value_display(p_value: f64) -> &'static str {
    if p_value > 0.1 {
        "0.10"
    } else if p_value > 0.05 {
        "0.05"
    } else if p_value > 0.02 {
        "0.02"
    } else if p_value > 0.01 {
        "0.01"
    } else {
        "0.001"
    }
}

/// B only wins with a strictly higher raw rate.
fn better_variant(views_a: u64, clicks_a: u64, views_b: u64, clicks_b: u64) -> Variant {
    let rate_a = clicks_a as f64 / views_a as f64;
    let rate_b = clicks_b as f64 / views_b as f64;
    if rate_b > rate_a { Variant::B } else { Variant::A }
}

fn insufficient_data() -> SignificanceResult {
    SignificanceResult {
        p_value: NOT_SIGNIFICANT_P_VALUE,
        confidence: 0.0,
        statistic: 0.0,
        message: INSUFFICIENT_DATA_MESSAGE.to_string(),
        winner: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_insufficient(result: &SignificanceResult) {
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.winner.is_none());
        assert_eq!(result.message, INSUFFICIENT_DATA_MESSAGE);
    }

    #[test]
    fn zero_exposure_on_either_side_is_insufficient_data() {
        for (views, clicks) in [(0, 0), (1000, 100), (5, 0), (1, 1)] {
            assert_insufficient(&test_significance(0, 0, views, clicks));
            assert_insufficient(&test_significance(views, clicks, 0, 0));
        }
    }

    #[test]
    fn no_conversions_at_all_is_insufficient_data() {
        assert_insufficient(&test_significance(500, 0, 700, 0));
    }

    #[test]
    fn every_view_converting_is_insufficient_data() {
        assert_eq!(chi_squared_statistic(50, 50, 80, 80), None);
        assert_insufficient(&test_significance(50, 50, 80, 80));
    }

    #[test]
    fn more_clicks_than_views_is_insufficient_data() {
        assert_insufficient(&test_significance(100, 120, 100, 10));
        assert_insufficient(&test_significance(100, 10, 100, 101));
    }

    #[test]
    fn extreme_counters_still_return_a_result() {
        for (views_a, clicks_a, views_b, clicks_b) in [
            (u64::MAX, 10, 10, 1),
            (u64::MAX, u64::MAX / 2, u64::MAX, u64::MAX / 4),
        ] {
            let result = test_significance(views_a, clicks_a, views_b, clicks_b);

            assert!(result.statistic.is_finite());
            assert!(CRITICAL_VALUES
                .iter()
                .any(|(_, p_value)| *p_value == result.p_value)
                || result.p_value == 1.0);
            assert_eq!(result.winner.is_some(), result.p_value <= 0.05);
        }

        let result = test_significance(u64::MAX, 10, 10, 1);
        assert_eq!(result.winner, Some(Variant::B));
    }

    #[test]
    fn ten_versus_fifteen_percent_on_a_thousand_views_names_b() {
        let result = test_significance(1000, 100, 1000, 150);

        assert_close(result.statistic, 10.0 + 1250.0 / 875.0);
        assert_eq!(result.p_value, 0.001);
        assert_close(result.confidence, 99.9);
        assert_eq!(result.winner, Some(Variant::B));
        assert!(result.message.contains("statistically significant"));
        assert!(result.message.contains("Variant B"));
    }

    #[test]
    fn small_samples_are_not_significant() {
        let result = test_significance(100, 10, 100, 12);

        assert!(result.statistic < 2.71);
        assert_eq!(result.p_value, 1.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.winner.is_none());
        assert!(result.message.contains("not statistically significant"));
    }

    #[test]
    fn swapping_variants_flips_only_the_winner() {
        let a_ahead = test_significance(1000, 100, 1000, 50);
        let b_ahead = test_significance(1000, 50, 1000, 100);

        assert_eq!(a_ahead.winner, Some(Variant::A));
        assert_eq!(b_ahead.winner, Some(Variant::B));
        assert_close(a_ahead.statistic, b_ahead.statistic);
        assert_eq!(a_ahead.p_value, b_ahead.p_value);
        assert_eq!(a_ahead.confidence, b_ahead.confidence);
    }

    #[test]
    fn p_value_never_rises_as_the_rate_gap_widens() {
        let mut previous = test_significance(2000, 200, 2000, 200);
        assert_eq!(previous.p_value, 1.0);

        for clicks_b in 201..=320 {
            let current = test_significance(2000, 200, 2000, clicks_b);
            assert!(
                current.p_value <= previous.p_value,
                "p-value rose at clicks_b={clicks_b}"
            );
            assert!(current.confidence >= previous.confidence);
            previous = current;
        }
        assert_eq!(previous.p_value, 0.001);
    }

    #[test]
    fn winner_is_set_exactly_when_p_value_is_at_most_five_percent() {
        for clicks_b in [100, 110, 120, 130, 140, 150] {
            let result = test_significance(1000, 100, 1000, clicks_b);
            assert_eq!(result.winner.is_some(), result.p_value <= 0.05);
            assert_eq!(result.is_significant(), result.winner.is_some());
        }
    }

    #[test]
    fn equal_rates_favour_a() {
        assert_eq!(better_variant(400, 40, 1000, 100), Variant::A);
        assert_eq!(better_variant(400, 40, 1000, 101), Variant::B);
    }

    #[test]
    fn ladder_maps_statistics_to_rungs() {
        assert_eq!(p_value_for(0.0), 1.0);
        assert_eq!(p_value_for(2.70), 1.0);
        assert_eq!(p_value_for(2.71), 0.10);
        assert_eq!(p_value_for(3.84), 0.05);
        assert_eq!(p_value_for(5.41), 0.02);
        assert_eq!(p_value_for(6.63), 0.01);
        assert_eq!(p_value_for(10.82), 0.01);
        assert_eq!(p_value_for(10.83), 0.001);
        assert_eq!(p_value_for(250.0), 0.001);
    }

    #[test]
    fn p_value_display_labels_follow_the_thresholds() {
        assert_eq!(p_value_display(1.0), "0.10");
        assert_eq!(p_value_display(0.10), "0.05");
        assert_eq!(p_value_display(0.05), "0.02");
        assert_eq!(p_value_display(0.02), "0.01");
        assert_eq!(p_value_display(0.001), "0.001");
    }

    #[test]
    fn test_totals_reads_views_and_clicks_in_variant_order() {
        let totals = [
            VariantTotal::new(Variant::A, 1000, 150),
            VariantTotal::new(Variant::B, 1000, 100),
        ];

        let result = test_totals(&totals);

        assert_eq!(result.winner, Some(Variant::A));
        assert_eq!(result.p_value, 0.001);
    }
}
