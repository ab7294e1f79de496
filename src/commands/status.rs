use anyhow::Result;
use tracing::{info, warn};

use abtest::model::Variant;
use abtest::store::SqliteEventStore;

use crate::cli::StatusArgs;

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();

    info!(cache_root = %args.store.cache_root().display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "event store missing");
        return Ok(());
    }

    let store = SqliteEventStore::open_read_only(&db_path)?;
    info!(
        path = %db_path.display(),
        schema_version = %store.schema_version()?.unwrap_or_default(),
        "event store status"
    );

    for variant in Variant::ALL {
        let inventory = store.inventory(variant)?;
        if inventory.day_count == 0 {
            warn!(variant = %variant.id(), "no day documents stored");
        }
        info!(
            variant = %variant.id(),
            days = inventory.day_count,
            first_date = %inventory.first_date_key.unwrap_or_default(),
            last_date = %inventory.last_date_key.unwrap_or_default(),
            cumulative_views = inventory.cumulative_views,
            cumulative_clicks = inventory.cumulative_clicks,
            "variant status"
        );
    }

    Ok(())
}
