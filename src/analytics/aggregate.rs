use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::debug;

use crate::model::{Aggregation, DATE_KEY_FORMAT, DailyMetric, DateRange, Variant, VariantTotal};
use crate::store::EventStore;

/// Folds every day document of both variants inside `range` into per-variant
/// totals and a date-ascending daily series.
///
/// Both outputs come from the same fold, so the series always sums to the
/// totals. A failed read of either variant fails the whole call.
pub fn aggregate<S>(store: &S, range: DateRange) -> Result<Aggregation>
where
    S: EventStore + ?Sized,
{
    let mut daily = BTreeMap::<NaiveDate, DailyMetric>::new();
    let mut sums = [(0_u64, 0_u64); 2];

    for variant in Variant::ALL {
        let records = store
            .daily_records(variant, &range)
            .with_context(|| format!("failed to read daily stats for {}", variant.id()))?;
        debug!(variant = %variant, range = %range, documents = records.len(), "read day documents");

        let (views, clicks) = &mut sums[variant.index()];
        for record in records {
            daily
                .entry(record.date)
                .or_insert_with(|| DailyMetric::empty(record.date))
                .add(variant, record.views, record.clicks)?;
            let (Some(next_views), Some(next_clicks)) = (
                views.checked_add(record.views),
                clicks.checked_add(record.clicks),
            ) else {
                bail!(
                    "running totals of {} overflow at {}",
                    variant.id(),
                    record.date.format(DATE_KEY_FORMAT)
                );
            };
            *views = next_views;
            *clicks = next_clicks;
        }
    }

    let totals = Variant::ALL.map(|variant| {
        let (views, clicks) = sums[variant.index()];
        VariantTotal::new(variant, views, clicks)
    });

    Ok(Aggregation {
        range,
        totals,
        daily: daily.into_values().collect(),
    })
}
