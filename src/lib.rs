//! Landing-page A/B experiment analytics.
//!
//! [`analytics::aggregate`] folds per-day event counters from an
//! [`store::EventStore`] into variant totals and a daily series, and
//! [`analytics::test_significance`] turns two (views, clicks) samples into a
//! chi-squared verdict.

pub mod analytics;
pub mod model;
pub mod store;
pub mod util;
