use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use abtest::model::{DATE_KEY_FORMAT, Variant};
use abtest::store::{CumulativeDocument, DayDocument, SqliteEventStore};
use abtest::util::ensure_directory;

use crate::cli::ImportArgs;

/// One variant document of a store export, e.g. the value under `variantA`.
#[derive(Debug, Deserialize)]
struct ExportedVariant {
    views: Option<u64>,
    clicks: Option<u64>,
    #[serde(default, rename = "dailyStats")]
    daily_stats: BTreeMap<String, ExportedCounters>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportedCounters {
    views: Option<u64>,
    clicks: Option<u64>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ImportPlan {
    days: Vec<DayDocument>,
    cumulative: Vec<CumulativeDocument>,
    skipped: Vec<String>,
}

pub fn run(args: ImportArgs) -> Result<()> {
    let raw = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let plan = build_plan(&raw)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    for key in &plan.skipped {
        warn!(document = %key, "skipped export entry");
    }

    if args.dry_run {
        info!(
            days = plan.days.len(),
            variants = plan.cumulative.len(),
            skipped = plan.skipped.len(),
            "import dry-run complete"
        );
        return Ok(());
    }

    let db_path = args.store.resolve_db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }

    let mut store = SqliteEventStore::open(&db_path)?;
    store.import_documents(&plan.days, &plan.cumulative)?;

    for document in &plan.cumulative {
        info!(
            variant = %document.variant,
            views = document.views,
            clicks = document.clicks,
            "imported cumulative totals"
        );
    }
    info!(
        path = %db_path.display(),
        days = plan.days.len(),
        skipped = plan.skipped.len(),
        "import completed"
    );

    Ok(())
}

fn build_plan(raw: &[u8]) -> Result<ImportPlan> {
    let export: BTreeMap<String, ExportedVariant> =
        serde_json::from_slice(raw).context("export is not a JSON object of variants")?;
    let date_key_pattern =
        Regex::new(r"^\d{4}-\d{2}-\d{2}$").context("failed to compile date key regex")?;

    let mut plan = ImportPlan::default();
    for (variant_key, exported) in export {
        let Ok(variant) = variant_key.parse::<Variant>() else {
            plan.skipped.push(variant_key);
            continue;
        };

        let mut day_views = 0_u64;
        let mut day_clicks = 0_u64;
        for (date_key, counters) in exported.daily_stats {
            let Some(date) = parse_date_key(&date_key, &date_key_pattern) else {
                plan.skipped.push(format!("{}/dailyStats/{date_key}", variant.id()));
                continue;
            };

            day_views = day_views
                .checked_add(counters.views.unwrap_or(0))
                .with_context(|| format!("summed views of {} overflow at {date_key}", variant.id()))?;
            day_clicks = day_clicks
                .checked_add(counters.clicks.unwrap_or(0))
                .with_context(|| format!("summed clicks of {} overflow at {date_key}", variant.id()))?;
            plan.days.push(DayDocument {
                variant,
                date,
                views: counters.views,
                clicks: counters.clicks,
            });
        }

        plan.cumulative.push(CumulativeDocument {
            variant,
            views: exported.views.unwrap_or(day_views),
            clicks: exported.clicks.unwrap_or(day_clicks),
        });
    }

    Ok(plan)
}

fn parse_date_key(date_key: &str, pattern: &Regex) -> Option<NaiveDate> {
    if !pattern.is_match(date_key) {
        return None;
    }
    NaiveDate::parse_from_str(date_key, DATE_KEY_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, DATE_KEY_FORMAT).expect("test date should parse")
    }

    #[test]
    fn build_plan_reads_days_and_explicit_cumulative_totals() {
        let raw = br#"
        {
          "variantA": {
            "views": 500,
            "clicks": 40,
            "dailyStats": {
              "2024-07-02": { "views": 20, "clicks": 3 },
              "2024-07-01": { "views": 10 }
            }
          }
        }
        "#;

        let plan = build_plan(raw).expect("export should parse");

        assert_eq!(
            plan.days,
            vec![
                DayDocument {
                    variant: Variant::A,
                    date: date("2024-07-01"),
                    views: Some(10),
                    clicks: None,
                },
                DayDocument {
                    variant: Variant::A,
                    date: date("2024-07-02"),
                    views: Some(20),
                    clicks: Some(3),
                },
            ]
        );
        assert_eq!(
            plan.cumulative,
            vec![CumulativeDocument {
                variant: Variant::A,
                views: 500,
                clicks: 40,
            }]
        );
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn build_plan_sums_days_when_cumulative_totals_are_missing() {
        let raw = br#"
        {
          "variantB": {
            "dailyStats": {
              "2024-07-01": { "views": 10, "clicks": 1 },
              "2024-07-02": { "views": 15, "clicks": 2 }
            }
          }
        }
        "#;

        let plan = build_plan(raw).expect("export should parse");

        assert_eq!(
            plan.cumulative,
            vec![CumulativeDocument {
                variant: Variant::B,
                views: 25,
                clicks: 3,
            }]
        );
    }

    #[test]
    fn build_plan_skips_unknown_variants_and_non_date_keys() {
        let raw = br#"
        {
          "variantA": {
            "dailyStats": {
              "summary": { "views": 99 },
              "2024-02-30": { "views": 5 },
              "2024-7-1": { "views": 5 },
              "2024-07-01": { "views": 7, "clicks": 1 }
            }
          },
          "variantC": { "views": 3 }
        }
        "#;

        let plan = build_plan(raw).expect("export should parse");

        assert_eq!(plan.days.len(), 1);
        assert_eq!(plan.days[0].date, date("2024-07-01"));
        assert_eq!(plan.cumulative[0].views, 7);
        assert_eq!(
            plan.skipped,
            vec![
                "variantA/dailyStats/2024-02-30".to_string(),
                "variantA/dailyStats/2024-7-1".to_string(),
                "variantA/dailyStats/summary".to_string(),
                "variantC".to_string(),
            ]
        );
    }

    #[test]
    fn build_plan_rejects_day_sums_that_overflow() {
        let raw = br#"
        {
          "variantB": {
            "dailyStats": {
              "2024-07-01": { "views": 18446744073709551615 },
              "2024-07-02": { "views": 1 }
            }
          }
        }
        "#;

        let err = build_plan(raw).expect_err("overflowing sum should be rejected");

        let message = format!("{err:#}");
        assert!(message.contains("variantB"), "unexpected error: {message}");
        assert!(message.contains("2024-07-02"), "unexpected error: {message}");
    }

    #[test]
    fn build_plan_rejects_non_object_exports() {
        assert!(build_plan(b"[1, 2, 3]").is_err());
    }
}
