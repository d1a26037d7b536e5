//! SQLite connection handle and transaction scoping.
//!
//! # Responsibility
//! - Own one SQLite connection and its transaction lifecycle.
//! - Provide a reentrant unit-of-work so content and index writes commit or
//!   roll back together.
//!
//! # Invariants
//! - At most one engine transaction is active per `Db`; nested scopes join it.
//! - Every exit path of a scope (success, error, unwind) leaves the
//!   connection outside any transaction.

use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};

use rusqlite::Connection;

mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Engine-level storage error.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Connection handle shared by every repository bound to one database.
///
/// `Db` is deliberately not `Sync`: callers that want parallel writers open
/// one handle per thread against the same database file and rely on the
/// engine's locking (immediate transactions + busy timeout).
pub struct Db {
    conn: Connection,
    tx_depth: Cell<u32>,
}

impl Db {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn,
            tx_depth: Cell::new(0),
        }
    }

    /// Returns the underlying connection for single-statement reads.
    ///
    /// Statements issued here participate in the active transaction when one
    /// exists, since the handle owns exactly one connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Returns whether a scoped transaction is currently active.
    pub fn in_transaction(&self) -> bool {
        self.tx_depth.get() > 0
    }

    /// Runs `f` inside a unit-of-work transaction.
    ///
    /// # Contract
    /// - Outermost call: `BEGIN IMMEDIATE`, then `COMMIT` when `f` returns
    ///   `Ok`, `ROLLBACK` when it returns `Err` or unwinds.
    /// - Nested call: joins the enclosing transaction; commit/rollback is
    ///   decided by the outermost scope alone.
    ///
    /// # Errors
    /// - Engine failures from begin/commit surface as `DbError` converted
    ///   into the caller's error type; errors from `f` propagate unchanged.
    pub fn scoped_transaction<R, E>(&self, f: impl FnOnce(&Db) -> Result<R, E>) -> Result<R, E>
    where
        E: From<DbError>,
    {
        if self.tx_depth.get() > 0 {
            let _join = JoinedScope::enter(self);
            return f(self);
        }

        self.conn
            .execute_batch("BEGIN IMMEDIATE;")
            .map_err(|err| E::from(DbError::from(err)))?;
        self.tx_depth.set(1);

        let mut scope = OutermostScope { db: self, armed: true };
        let result = f(self);
        scope.armed = false;
        self.tx_depth.set(0);

        match result {
            Ok(value) => match self.conn.execute_batch("COMMIT;") {
                Ok(()) => Ok(value),
                Err(err) => {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    Err(E::from(DbError::from(err)))
                }
            },
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }
}

/// Tracks one nested participant of an already-active transaction.
struct JoinedScope<'a> {
    db: &'a Db,
}

impl<'a> JoinedScope<'a> {
    fn enter(db: &'a Db) -> Self {
        db.tx_depth.set(db.tx_depth.get() + 1);
        Self { db }
    }
}

impl Drop for JoinedScope<'_> {
    fn drop(&mut self) {
        self.db.tx_depth.set(self.db.tx_depth.get() - 1);
    }
}

/// Rolls the outermost transaction back if its closure unwinds.
struct OutermostScope<'a> {
    db: &'a Db,
    armed: bool,
}

impl Drop for OutermostScope<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.db.tx_depth.set(0);
            let _ = self.db.conn.execute_batch("ROLLBACK;");
        }
    }
}
