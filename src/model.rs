use std::fmt;
use std::str::FromStr;

use anyhow::{Error, Result, bail};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::util::round_to;

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// One arm of the landing-page experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::A, Variant::B];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Document id used by the event store, e.g. `variantA`.
    pub fn id(self) -> &'static str {
        match self {
            Self::A => "variantA",
            Self::B => "variantB",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::A => "Variant A",
            Self::B => "Variant B",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let code = trimmed
            .strip_prefix("variant")
            .or_else(|| trimmed.strip_prefix("Variant"))
            .unwrap_or(trimmed)
            .trim();

        match code {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            _ => bail!("unknown variant {raw:?}; expected A or B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    View,
    Click,
}

impl EventKind {
    /// Counter name inside a day document.
    pub fn counter(self) -> &'static str {
        match self {
            Self::View => "views",
            Self::Click => "clicks",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "view" | "views" => Ok(Self::View),
            "click" | "clicks" => Ok(Self::Click),
            _ => bail!("unknown event kind {raw:?}; expected view or click"),
        }
    }
}

/// Inclusive calendar-date bounds of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` calendar days ending on `end`, `end` included.
    pub fn trailing_days(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: end - Duration::days(span),
            end,
        }
    }

    pub fn start_key(&self) -> String {
        self.start.format(DATE_KEY_FORMAT).to_string()
    }

    pub fn end_key(&self) -> String {
        self.end.format(DATE_KEY_FORMAT).to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start_key(), self.end_key())
    }
}

/// Counters of one day document as read from the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDayRecord {
    pub date: NaiveDate,
    pub views: u64,
    pub clicks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantTotal {
    pub variant: Variant,
    pub views: u64,
    pub clicks: u64,
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub conversion_rate: f64,
}

impl VariantTotal {
    pub fn new(variant: Variant, views: u64, clicks: u64) -> Self {
        Self {
            variant,
            views,
            clicks,
            conversion_rate: round_to(conversion_rate_percent(views, clicks), 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub views_a: u64,
    pub clicks_a: u64,
    pub views_b: u64,
    pub clicks_b: u64,
}

impl DailyMetric {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            views_a: 0,
            clicks_a: 0,
            views_b: 0,
            clicks_b: 0,
        }
    }

    /// Fails without touching the metric when either counter would overflow.
    pub fn add(&mut self, variant: Variant, views: u64, clicks: u64) -> Result<()> {
        let (day_views, day_clicks) = match variant {
            Variant::A => (&mut self.views_a, &mut self.clicks_a),
            Variant::B => (&mut self.views_b, &mut self.clicks_b),
        };
        let (Some(next_views), Some(next_clicks)) =
            (day_views.checked_add(views), day_clicks.checked_add(clicks))
        else {
            bail!(
                "counters of {} on {} overflow",
                variant.id(),
                self.date.format(DATE_KEY_FORMAT)
            );
        };
        *day_views = next_views;
        *day_clicks = next_clicks;
        Ok(())
    }

    pub fn views(&self, variant: Variant) -> u64 {
        match variant {
            Variant::A => self.views_a,
            Variant::B => self.views_b,
        }
    }

    pub fn clicks(&self, variant: Variant) -> u64 {
        match variant {
            Variant::A => self.clicks_a,
            Variant::B => self.clicks_b,
        }
    }

    /// Unrounded per-day conversion percentage, used for the daily CVR series.
    pub fn conversion_rate(&self, variant: Variant) -> f64 {
        conversion_rate_percent(self.views(variant), self.clicks(variant))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub range: DateRange,
    pub totals: [VariantTotal; 2],
    pub daily: Vec<DailyMetric>,
}

impl Aggregation {
    pub fn total(&self, variant: Variant) -> &VariantTotal {
        &self.totals[variant.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignificanceResult {
    /// One rung of the critical-value ladder, never a continuous p-value.
    pub p_value: f64,
    pub confidence: f64,
    pub statistic: f64,
    pub message: String,
    pub winner: Option<Variant>,
}

impl SignificanceResult {
    pub fn is_significant(&self) -> bool {
        self.winner.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub db_path: String,
    pub db_sha256: String,
    pub range: DateRange,
    pub totals: [VariantTotal; 2],
    pub daily: Vec<DailyMetric>,
    pub significance: SignificanceResult,
}

/// `100 * clicks / views`, `0` for an unexposed variant, capped at `100`.
pub fn conversion_rate_percent(views: u64, clicks: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    (clicks as f64 / views as f64 * 100.0).min(100.0)
}
