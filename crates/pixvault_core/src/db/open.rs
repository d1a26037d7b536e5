//! Connection bootstrap for SQLite-backed stores.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections with the pragmas the store
//!   relies on.
//!
//! # Invariants
//! - Returned handles have `foreign_keys=ON` and a busy timeout, so
//!   concurrent writers block instead of failing immediately.
//! - File databases run in WAL mode; readers do not block writers.

use super::{Db, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and returns a configured handle.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Db> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let result = Connection::open(path)
        .map_err(Into::into)
        .and_then(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            configure(&conn)?;
            Ok(Db::new(conn))
        });

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode=file duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode=file duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }

    result
}

/// Opens an in-memory SQLite database, mainly for tests.
pub fn open_db_in_memory() -> DbResult<Db> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    info!("event=db_open module=db status=ok mode=memory");
    Ok(Db::new(conn))
}

fn configure(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
