use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use abtest::analytics::{aggregate, p_value_display, test_totals};
use abtest::model::{
    Aggregation, DATE_KEY_FORMAT, DateRange, ReportManifest, SignificanceResult, Variant,
    VariantTotal,
};
use abtest::store::SqliteEventStore;
use abtest::util::{now_utc_string, sha256_file, today_utc, write_json_pretty};

use crate::cli::ReportArgs;

#[derive(Debug, Serialize)]
struct Report {
    #[serde(flatten)]
    aggregation: Aggregation,
    significance: SignificanceResult,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();
    if !db_path.exists() {
        bail!(
            "event store not found at {}; record or import events first",
            db_path.display()
        );
    }

    let range = resolve_range(args.start, args.end, args.days, today_utc());
    info!(range = %range, path = %db_path.display(), "building report");

    let store = SqliteEventStore::open_read_only(&db_path)?;
    let aggregation = aggregate(&store, range)?;
    let significance = test_totals(&aggregation.totals);

    info!(
        days = aggregation.daily.len(),
        views_a = aggregation.total(Variant::A).views,
        views_b = aggregation.total(Variant::B).views,
        p_value = significance.p_value,
        winner = significance.winner.map(Variant::as_str).unwrap_or("none"),
        "report computed"
    );

    let report = Report {
        aggregation,
        significance,
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize report json output")?;
        writeln!(output)?;
    } else {
        write_text_report(&mut output, &report.aggregation, &report.significance)?;
    }
    output.flush()?;

    if let Some(manifest_path) = args.output {
        let manifest = ReportManifest {
            manifest_version: 1,
            generated_at: now_utc_string(),
            db_path: db_path.display().to_string(),
            db_sha256: sha256_file(&db_path)?,
            range: report.aggregation.range,
            totals: report.aggregation.totals.clone(),
            daily: report.aggregation.daily.clone(),
            significance: report.significance.clone(),
        };
        write_json_pretty(&manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), "wrote report manifest");
    }

    Ok(())
}

/// Explicit bounds win; otherwise the window is the last `days` days ending
/// at `end` (today by default).
fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    days: u32,
    today: NaiveDate,
) -> DateRange {
    let end = end.unwrap_or(today);
    match start {
        Some(start) => DateRange::new(start, end),
        None => DateRange::trailing_days(end, days),
    }
}

/// Summary-table highlight: A only when its rounded rate is strictly higher.
fn leading_variant(totals: &[VariantTotal; 2]) -> Variant {
    let [a, b] = totals;
    if a.conversion_rate > b.conversion_rate {
        Variant::A
    } else {
        Variant::B
    }
}

fn write_text_report<W: Write>(
    output: &mut W,
    aggregation: &Aggregation,
    significance: &SignificanceResult,
) -> Result<()> {
    writeln!(output, "Range: {}", aggregation.range)?;

    let [a, b] = &aggregation.totals;
    if a.views == 0 && b.views == 0 {
        writeln!(output, "No data for this range.")?;
    } else {
        let leader = leading_variant(&aggregation.totals);
        let marker = |variant: Variant| if variant == leader { "*" } else { "" };

        writeln!(output, "{:<12}{:>14}{:>14}", "", Variant::A.label(), Variant::B.label())?;
        writeln!(output, "{:<12}{:>14}{:>14}", "Views", a.views, b.views)?;
        writeln!(output, "{:<12}{:>14}{:>14}", "CTA clicks", a.clicks, b.clicks)?;
        writeln!(
            output,
            "{:<12}{:>14}{:>14}",
            "CVR",
            format!("{}{:.2}%", marker(Variant::A), a.conversion_rate),
            format!("{}{:.2}%", marker(Variant::B), b.conversion_rate),
        )?;
    }

    writeln!(output)?;
    writeln!(output, "Significance: {}", significance.message)?;
    if significance.is_significant() {
        writeln!(
            output,
            "Confidence: {:.0}% (p-value <= {})",
            significance.confidence, significance.p_value
        )?;
    } else {
        writeln!(
            output,
            "Confidence: {:.0}% (p-value > {})",
            significance.confidence,
            p_value_display(significance.p_value)
        )?;
    }

    if !aggregation.daily.is_empty() {
        writeln!(output)?;
        writeln!(
            output,
            "{:<12}{:>10}{:>10}{:>9}{:>10}{:>10}{:>9}",
            "date", "views_a", "clicks_a", "cvr_a", "views_b", "clicks_b", "cvr_b"
        )?;
        for metric in &aggregation.daily {
            writeln!(
                output,
                "{:<12}{:>10}{:>10}{:>9}{:>10}{:>10}{:>9}",
                metric.date.format(DATE_KEY_FORMAT).to_string(),
                metric.views_a,
                metric.clicks_a,
                format!("{:.1}%", metric.conversion_rate(Variant::A)),
                metric.views_b,
                metric.clicks_b,
                format!("{:.1}%", metric.conversion_rate(Variant::B)),
            )?;
        }
    }

    Ok(())
}
