use anyhow::{Result, bail};
use tracing::info;

use abtest::store::SqliteEventStore;
use abtest::util::{ensure_directory, today_utc};

use crate::cli::RecordArgs;

pub fn run(args: RecordArgs) -> Result<()> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let db_path = args.store.resolve_db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    let date = args.date.unwrap_or_else(today_utc);

    let mut store = SqliteEventStore::open(&db_path)?;
    store.record_event(args.variant, args.event, date, args.count)?;
    let (views, clicks) = store.cumulative(args.variant)?;

    info!(
        variant = %args.variant,
        counter = args.event.counter(),
        date = %date,
        count = args.count,
        cumulative_views = views,
        cumulative_clicks = clicks,
        "recorded event"
    );

    Ok(())
}
