//! Event store: per-variant day documents plus one cumulative document per
//! variant, backed by SQLite.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, warn};

use crate::model::{DATE_KEY_FORMAT, DateRange, EventKind, RawDayRecord, Variant};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

/// Read access the aggregator needs from the event store.
pub trait EventStore {
    /// Every day document of `variant` whose date key lies in `range`,
    /// bounds inclusive.
    fn daily_records(&self, variant: Variant, range: &DateRange) -> Result<Vec<RawDayRecord>>;
}

/// Summary of what one variant holds, for `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantInventory {
    pub day_count: i64,
    pub first_date_key: Option<String>,
    pub last_date_key: Option<String>,
    pub cumulative_views: u64,
    pub cumulative_clicks: u64,
}

/// One day document as written by imports. `None` marks a missing counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDocument {
    pub variant: Variant,
    pub date: NaiveDate,
    pub views: Option<u64>,
    pub clicks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeDocument {
    pub variant: Variant,
    pub views: u64,
    pub clicks: u64,
}

pub struct SqliteEventStore {
    connection: Connection,
}

impl SqliteEventStore {
    /// Opens (creating if needed) a writable store.
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database read-only: {}", path.display()))?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Adds `count` to one counter of the day document and of the cumulative
    /// document in a single transaction.
    pub fn record_event(
        &mut self,
        variant: Variant,
        kind: EventKind,
        date: NaiveDate,
        count: u64,
    ) -> Result<()> {
        let amount = to_sql_counter(count)?;
        let (views, clicks) = match kind {
            EventKind::View => (amount, 0),
            EventKind::Click => (0, amount),
        };
        let date_key = date.format(DATE_KEY_FORMAT).to_string();

        let tx = self
            .connection
            .transaction()
            .context("failed to begin event transaction")?;
        tx.execute(
            "INSERT INTO daily_stats(variant, date_key, views, clicks) VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(variant, date_key) DO UPDATE SET
               views = COALESCE(daily_stats.views, 0) + excluded.views,
               clicks = COALESCE(daily_stats.clicks, 0) + excluded.clicks",
            params![variant.id(), date_key, views, clicks],
        )
        .with_context(|| format!("failed to increment {} for {}", kind.counter(), variant.id()))?;
        tx.execute(
            "INSERT INTO variant_totals(variant, views, clicks) VALUES(?1, ?2, ?3)
             ON CONFLICT(variant) DO UPDATE SET
               views = variant_totals.views + excluded.views,
               clicks = variant_totals.clicks + excluded.clicks",
            params![variant.id(), views, clicks],
        )
        .with_context(|| format!("failed to increment cumulative {}", variant.id()))?;
        tx.commit().context("failed to commit event transaction")?;

        debug!(
            variant = %variant,
            counter = kind.counter(),
            date = %date_key,
            count,
            "recorded event"
        );
        Ok(())
    }

    /// Replaces one day document. `None` counters are stored as missing fields.
    pub fn put_day(&self, document: &DayDocument) -> Result<()> {
        write_day(&self.connection, document)
    }

    /// Replaces day documents and cumulative documents in one transaction.
    pub fn import_documents(
        &mut self,
        days: &[DayDocument],
        cumulative: &[CumulativeDocument],
    ) -> Result<()> {
        let tx = self
            .connection
            .transaction()
            .context("failed to begin import transaction")?;
        for document in days {
            write_day(&tx, document)?;
        }
        for document in cumulative {
            write_cumulative(&tx, document)?;
        }
        tx.commit().context("failed to commit import transaction")?;
        Ok(())
    }

    /// Running totals as kept by the live event path, independent of any range.
    pub fn cumulative(&self, variant: Variant) -> Result<(u64, u64)> {
        let row = self
            .connection
            .query_row(
                "SELECT views, clicks FROM variant_totals WHERE variant = ?1",
                [variant.id()],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()
            .with_context(|| format!("failed to read cumulative {}", variant.id()))?;

        Ok(match row {
            Some((views, clicks)) => (
                counter_from_sql(views, variant, "views"),
                counter_from_sql(clicks, variant, "clicks"),
            ),
            None => (0, 0),
        })
    }

    pub fn inventory(&self, variant: Variant) -> Result<VariantInventory> {
        let (day_count, first_date_key, last_date_key) = self
            .connection
            .query_row(
                "SELECT COUNT(*), MIN(date_key), MAX(date_key) FROM daily_stats WHERE variant = ?1",
                [variant.id()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .with_context(|| format!("failed to inspect day documents of {}", variant.id()))?;
        let (cumulative_views, cumulative_clicks) = self.cumulative(variant)?;

        Ok(VariantInventory {
            day_count,
            first_date_key,
            last_date_key,
            cumulative_views,
            cumulative_clicks,
        })
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'db_schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read db_schema_version")
    }
}

impl EventStore for SqliteEventStore {
    fn daily_records(&self, variant: Variant, range: &DateRange) -> Result<Vec<RawDayRecord>> {
        let mut statement = self
            .connection
            .prepare(
                "
                SELECT date_key, views, clicks
                FROM daily_stats
                WHERE variant = ?1 AND date_key >= ?2 AND date_key <= ?3
                ORDER BY date_key
                ",
            )
            .context("failed to prepare day document query")?;

        let rows = statement
            .query_map(
                params![variant.id(), range.start_key(), range.end_key()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .with_context(|| format!("failed to query day documents of {}", variant.id()))?;

        let mut records = Vec::new();
        for row in rows {
            let (date_key, views, clicks) =
                row.with_context(|| format!("failed to read day document of {}", variant.id()))?;
            let date = NaiveDate::parse_from_str(&date_key, DATE_KEY_FORMAT).with_context(|| {
                format!("day document {date_key:?} of {} is not an ISO date", variant.id())
            })?;
            records.push(RawDayRecord {
                date,
                views: counter_from_sql(views, variant, "views"),
                clicks: counter_from_sql(clicks, variant, "clicks"),
            });
        }

        Ok(records)
    }
}

fn write_day(connection: &Connection, document: &DayDocument) -> Result<()> {
    let views = document.views.map(to_sql_counter).transpose()?;
    let clicks = document.clicks.map(to_sql_counter).transpose()?;
    connection
        .execute(
            "INSERT INTO daily_stats(variant, date_key, views, clicks) VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(variant, date_key) DO UPDATE SET
               views = excluded.views,
               clicks = excluded.clicks",
            params![
                document.variant.id(),
                document.date.format(DATE_KEY_FORMAT).to_string(),
                views,
                clicks
            ],
        )
        .with_context(|| format!("failed to write day document for {}", document.variant.id()))?;
    Ok(())
}

fn write_cumulative(connection: &Connection, document: &CumulativeDocument) -> Result<()> {
    connection
        .execute(
            "INSERT INTO variant_totals(variant, views, clicks) VALUES(?1, ?2, ?3)
             ON CONFLICT(variant) DO UPDATE SET
               views = excluded.views,
               clicks = excluded.clicks",
            params![
                document.variant.id(),
                to_sql_counter(document.views)?,
                to_sql_counter(document.clicks)?
            ],
        )
        .with_context(|| format!("failed to write cumulative {}", document.variant.id()))?;
    Ok(())
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_stats (
              variant TEXT NOT NULL,
              date_key TEXT NOT NULL,
              views INTEGER,
              clicks INTEGER,
              PRIMARY KEY(variant, date_key)
            );

            CREATE TABLE IF NOT EXISTS variant_totals (
              variant TEXT PRIMARY KEY,
              views INTEGER NOT NULL DEFAULT 0,
              clicks INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
        .context("failed to initialize event store schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

fn to_sql_counter(value: u64) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("counter {value} exceeds storage range"))
}

/// Missing counters read as zero; negative ones are clamped.
fn counter_from_sql(value: Option<i64>, variant: Variant, field: &str) -> u64 {
    match value {
        Some(raw) if raw < 0 => {
            warn!(variant = %variant, field, value = raw, "negative counter treated as zero");
            0
        }
        Some(raw) => raw as u64,
        None => 0,
    }
}
