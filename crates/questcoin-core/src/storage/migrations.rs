//! Database schema migrations for questcoin.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Current schema version, 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: ledger, completions, owned coupons, redemption requests.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS transactions (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL,
            amount        INTEGER NOT NULL,
            kind          TEXT NOT NULL,
            reference_id  TEXT NOT NULL,
            description   TEXT NOT NULL DEFAULT '',
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS completions (
            id            TEXT PRIMARY KEY,
            task_id       TEXT NOT NULL,
            user_id       TEXT NOT NULL,
            task_title    TEXT NOT NULL,
            reward        INTEGER NOT NULL,
            status        TEXT NOT NULL,
            submitted_at  TEXT NOT NULL,
            proof         TEXT,
            decided_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS owned_coupons (
            id            TEXT PRIMARY KEY,
            coupon_id     TEXT NOT NULL,
            owner_id      TEXT NOT NULL,
            title         TEXT NOT NULL,
            cost          INTEGER NOT NULL,
            code          TEXT NOT NULL UNIQUE,
            purchased_at  TEXT NOT NULL,
            expires_at    TEXT NOT NULL,
            status        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS redemption_requests (
            id               TEXT PRIMARY KEY,
            owned_coupon_id  TEXT NOT NULL REFERENCES owned_coupons(id),
            owner_id         TEXT NOT NULL,
            status           TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            decided_at       TEXT
        );",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: lookup indexes and the one-pending-request-per-coupon guard.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
         CREATE INDEX IF NOT EXISTS idx_completions_user_task ON completions(user_id, task_id);
         CREATE INDEX IF NOT EXISTS idx_completions_status ON completions(status);
         CREATE INDEX IF NOT EXISTS idx_owned_coupons_owner ON owned_coupons(owner_id);
         CREATE INDEX IF NOT EXISTS idx_redemptions_status ON redemption_requests(status);
         CREATE UNIQUE INDEX IF NOT EXISTS idx_redemptions_one_pending
             ON redemption_requests(owned_coupon_id) WHERE status = 'pending';",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}
