//! SQLite-backed store.
//!
//! Every [`Store::transaction`] runs inside `BEGIN IMMEDIATE`, which takes
//! the database write lock before the first read. Two processes sharing the
//! file therefore cannot interleave a balance read with another append.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations, Records, Store};
use crate::completion::Completion;
use crate::error::{CoreError, StorageError};
use crate::exchange::{OwnedCoupon, RedemptionRequest, RedemptionStatus};
use crate::ledger::{Transaction, TransactionKind};
use crate::status::ReviewStatus;

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

// === Helper Functions ===

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

/// Parse an RFC3339 column.
fn get_datetime(row: &Row, index: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, format!("bad timestamp '{raw}': {e}")))
}

fn get_optional_datetime(row: &Row, index: usize) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(index, format!("bad timestamp '{s}': {e}")))
    })
    .transpose()
}

fn get_review_status(row: &Row, index: usize) -> Result<ReviewStatus, rusqlite::Error> {
    let raw: String = row.get(index)?;
    ReviewStatus::parse(&raw).ok_or_else(|| conversion_error(index, format!("bad review status '{raw}'")))
}

fn row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let kind: String = row.get(3)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        kind: TransactionKind::parse(&kind)
            .ok_or_else(|| conversion_error(3, format!("bad transaction kind '{kind}'")))?,
        reference_id: row.get(4)?,
        description: row.get(5)?,
        created_at: get_datetime(row, 6)?,
    })
}

fn row_to_completion(row: &Row) -> Result<Completion, rusqlite::Error> {
    Ok(Completion {
        id: row.get(0)?,
        task_id: row.get(1)?,
        user_id: row.get(2)?,
        task_title: row.get(3)?,
        reward: row.get(4)?,
        status: get_review_status(row, 5)?,
        submitted_at: get_datetime(row, 6)?,
        proof: row.get(7)?,
        decided_at: get_optional_datetime(row, 8)?,
    })
}

fn row_to_owned_coupon(row: &Row) -> Result<OwnedCoupon, rusqlite::Error> {
    let status: String = row.get(8)?;
    Ok(OwnedCoupon {
        id: row.get(0)?,
        coupon_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        cost: row.get(4)?,
        code: row.get(5)?,
        purchased_at: get_datetime(row, 6)?,
        expires_at: get_datetime(row, 7)?,
        status: RedemptionStatus::parse(&status)
            .ok_or_else(|| conversion_error(8, format!("bad redemption status '{status}'")))?,
    })
}

fn row_to_redemption(row: &Row) -> Result<RedemptionRequest, rusqlite::Error> {
    Ok(RedemptionRequest {
        id: row.get(0)?,
        owned_coupon_id: row.get(1)?,
        owner_id: row.get(2)?,
        status: get_review_status(row, 3)?,
        created_at: get_datetime(row, 4)?,
        decided_at: get_optional_datetime(row, 5)?,
    })
}

const TRANSACTION_COLUMNS: &str =
    "id, user_id, amount, kind, reference_id, description, created_at";
const COMPLETION_COLUMNS: &str =
    "id, task_id, user_id, task_title, reward, status, submitted_at, proof, decided_at";
const OWNED_COUPON_COLUMNS: &str =
    "id, coupon_id, owner_id, title, cost, code, purchased_at, expires_at, status";
const REDEMPTION_COLUMNS: &str = "id, owned_coupon_id, owner_id, status, created_at, decided_at";

/// Record access over one open SQLite transaction.
struct SqliteRecords<'c> {
    conn: &'c Connection,
}

impl SqliteRecords<'_> {
    fn query_all<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row) -> Result<T, rusqlite::Error>,
    ) -> Result<Vec<T>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_one<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row) -> Result<T, rusqlite::Error>,
    ) -> Result<Option<T>, StorageError> {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    fn expect_one_row(changed: usize, entity: &'static str, id: &str) -> Result<(), StorageError> {
        if changed == 1 {
            Ok(())
        } else {
            Err(StorageError::Corrupt {
                entity,
                id: id.to_string(),
                message: format!("update touched {changed} rows"),
            })
        }
    }
}

impl Records for SqliteRecords<'_> {
    fn append_transaction(&mut self, tx: &Transaction) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO transactions (id, user_id, amount, kind, reference_id, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tx.id,
                tx.user_id,
                tx.amount,
                tx.kind.as_str(),
                tx.reference_id,
                tx.description,
                tx.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError> {
        self.query_all(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE user_id = ?1 ORDER BY rowid"),
            params![user_id],
            row_to_transaction,
        )
    }

    fn insert_completion(&mut self, c: &Completion) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO completions (id, task_id, user_id, task_title, reward, status, submitted_at, proof, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                c.id,
                c.task_id,
                c.user_id,
                c.task_title,
                c.reward,
                c.status.as_str(),
                c.submitted_at.to_rfc3339(),
                c.proof,
                c.decided_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn update_completion(&mut self, c: &Completion) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE completions SET status = ?2, decided_at = ?3 WHERE id = ?1",
            params![c.id, c.status.as_str(), c.decided_at.map(|dt| dt.to_rfc3339())],
        )?;
        Self::expect_one_row(changed, "completion", &c.id)
    }

    fn completion(&self, id: &str) -> Result<Option<Completion>, StorageError> {
        self.query_one(
            &format!("SELECT {COMPLETION_COLUMNS} FROM completions WHERE id = ?1"),
            params![id],
            row_to_completion,
        )
    }

    fn completions_for_user(&self, user_id: &str) -> Result<Vec<Completion>, StorageError> {
        self.query_all(
            &format!("SELECT {COMPLETION_COLUMNS} FROM completions WHERE user_id = ?1 ORDER BY rowid"),
            params![user_id],
            row_to_completion,
        )
    }

    fn completions_for_task(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> Result<Vec<Completion>, StorageError> {
        self.query_all(
            &format!(
                "SELECT {COMPLETION_COLUMNS} FROM completions
                 WHERE user_id = ?1 AND task_id = ?2 ORDER BY rowid"
            ),
            params![user_id, task_id],
            row_to_completion,
        )
    }

    fn completions_with_status(&self, status: ReviewStatus) -> Result<Vec<Completion>, StorageError> {
        self.query_all(
            &format!("SELECT {COMPLETION_COLUMNS} FROM completions WHERE status = ?1 ORDER BY rowid"),
            params![status.as_str()],
            row_to_completion,
        )
    }

    fn insert_owned_coupon(&mut self, c: &OwnedCoupon) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO owned_coupons (id, coupon_id, owner_id, title, cost, code, purchased_at, expires_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                c.id,
                c.coupon_id,
                c.owner_id,
                c.title,
                c.cost,
                c.code,
                c.purchased_at.to_rfc3339(),
                c.expires_at.to_rfc3339(),
                c.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn update_owned_coupon(&mut self, c: &OwnedCoupon) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE owned_coupons SET status = ?2 WHERE id = ?1",
            params![c.id, c.status.as_str()],
        )?;
        Self::expect_one_row(changed, "owned coupon", &c.id)
    }

    fn owned_coupon(&self, id: &str) -> Result<Option<OwnedCoupon>, StorageError> {
        self.query_one(
            &format!("SELECT {OWNED_COUPON_COLUMNS} FROM owned_coupons WHERE id = ?1"),
            params![id],
            row_to_owned_coupon,
        )
    }

    fn owned_coupon_by_code(&self, code: &str) -> Result<Option<OwnedCoupon>, StorageError> {
        self.query_one(
            &format!("SELECT {OWNED_COUPON_COLUMNS} FROM owned_coupons WHERE code = ?1"),
            params![code],
            row_to_owned_coupon,
        )
    }

    fn owned_coupons_for(&self, owner_id: &str) -> Result<Vec<OwnedCoupon>, StorageError> {
        self.query_all(
            &format!("SELECT {OWNED_COUPON_COLUMNS} FROM owned_coupons WHERE owner_id = ?1 ORDER BY rowid"),
            params![owner_id],
            row_to_owned_coupon,
        )
    }

    fn insert_redemption(&mut self, r: &RedemptionRequest) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO redemption_requests (id, owned_coupon_id, owner_id, status, created_at, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                r.id,
                r.owned_coupon_id,
                r.owner_id,
                r.status.as_str(),
                r.created_at.to_rfc3339(),
                r.decided_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn update_redemption(&mut self, r: &RedemptionRequest) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "UPDATE redemption_requests SET status = ?2, decided_at = ?3 WHERE id = ?1",
            params![r.id, r.status.as_str(), r.decided_at.map(|dt| dt.to_rfc3339())],
        )?;
        Self::expect_one_row(changed, "redemption request", &r.id)
    }

    fn redemption(&self, id: &str) -> Result<Option<RedemptionRequest>, StorageError> {
        self.query_one(
            &format!("SELECT {REDEMPTION_COLUMNS} FROM redemption_requests WHERE id = ?1"),
            params![id],
            row_to_redemption,
        )
    }

    fn redemptions_for_coupon(
        &self,
        owned_coupon_id: &str,
    ) -> Result<Vec<RedemptionRequest>, StorageError> {
        self.query_all(
            &format!(
                "SELECT {REDEMPTION_COLUMNS} FROM redemption_requests
                 WHERE owned_coupon_id = ?1 ORDER BY rowid"
            ),
            params![owned_coupon_id],
            row_to_redemption,
        )
    }

    fn redemptions_with_status(
        &self,
        status: ReviewStatus,
    ) -> Result<Vec<RedemptionRequest>, StorageError> {
        self.query_all(
            &format!("SELECT {REDEMPTION_COLUMNS} FROM redemption_requests WHERE status = ?1 ORDER BY rowid"),
            params![status.as_str()],
            row_to_redemption,
        )
    }
}

/// SQLite database holding the ledger and all review records.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `~/.config/questcoin/questcoin.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("questcoin.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (creating if needed) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn run<T, F>(&self, begin: &str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut SqliteRecords<'_>) -> Result<T, CoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        conn.execute_batch(begin).map_err(StorageError::from)?;
        let mut records = SqliteRecords { conn: &conn };
        let result = f(&mut records).and_then(|value| {
            conn.execute_batch("COMMIT;").map_err(StorageError::from)?;
            Ok(value)
        });
        // A failed COMMIT leaves the transaction open; close it so the
        // connection can begin the next one.
        if result.is_err() && !conn.is_autocommit() {
            if let Err(rollback) = conn.execute_batch("ROLLBACK;") {
                tracing::warn!(error = %rollback, "rollback failed");
            }
        }
        result
    }
}

impl Store for SqliteStore {
    fn transaction<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut dyn Records) -> Result<T, CoreError>,
    {
        self.run("BEGIN IMMEDIATE TRANSACTION;", |records| f(records))
    }

    fn read<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&dyn Records) -> Result<T, CoreError>,
    {
        self.run("BEGIN DEFERRED TRANSACTION;", |records| f(&*records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RewardError;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn completion(id: &str, status: ReviewStatus, minutes: i64) -> Completion {
        Completion {
            id: id.into(),
            task_id: "walk".into(),
            user_id: "u1".into(),
            task_title: "Walk".into(),
            reward: 20,
            status,
            submitted_at: at(minutes),
            proof: Some("photo".into()),
            decided_at: None,
        }
    }

    #[test]
    fn completions_roundtrip_in_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .transaction(|r| {
                r.insert_completion(&completion("b", ReviewStatus::Pending, 5))?;
                r.insert_completion(&completion("a", ReviewStatus::Rejected, 5))?;
                Ok(())
            })
            .unwrap();

        let listed = store.read(|r| Ok(r.completions_for_task("u1", "walk")?)).unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(listed[0], completion("b", ReviewStatus::Pending, 5));

        let pending = store
            .read(|r| Ok(r.completions_with_status(ReviewStatus::Pending)?))
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn update_persists_decision() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut c = completion("c1", ReviewStatus::Pending, 0);
        store.transaction(|r| Ok(r.insert_completion(&c)?)).unwrap();

        c.status = ReviewStatus::Approved;
        c.decided_at = Some(at(10));
        store.transaction(|r| Ok(r.update_completion(&c)?)).unwrap();

        let loaded = store.read(|r| Ok(r.completion("c1")?)).unwrap().unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn update_of_missing_row_is_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = completion("ghost", ReviewStatus::Approved, 0);
        let err = store.transaction(|r| Ok(r.update_completion(&c)?)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn error_rolls_back_every_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: Result<(), CoreError> = store.transaction(|r| {
            r.append_transaction(&Transaction {
                id: "txn-1".into(),
                user_id: "u1".into(),
                amount: 10,
                kind: TransactionKind::Earn,
                reference_id: "c1".into(),
                description: "Completed: Walk".into(),
                created_at: at(0),
            })?;
            Err(RewardError::InsufficientFunds {
                needed: 1,
                available: 0,
            }
            .into())
        });
        assert!(result.is_err());

        let txs = store.read(|r| Ok(r.transactions_for("u1")?)).unwrap();
        assert!(txs.is_empty());
    }

    fn earn(id: &str) -> Transaction {
        Transaction {
            id: id.into(),
            user_id: "u1".into(),
            amount: 10,
            kind: TransactionKind::Earn,
            reference_id: "c1".into(),
            description: "Completed: Walk".into(),
            created_at: at(0),
        }
    }

    #[test]
    fn busy_commit_rolls_back_and_store_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questcoin.db");
        let store = SqliteStore::open_at(&path).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .busy_timeout(StdDuration::from_millis(50))
            .unwrap();

        // Another connection holds a shared lock, so COMMIT cannot take
        // the exclusive lock it needs.
        let reader = Connection::open(&path).unwrap();
        reader.execute_batch("BEGIN DEFERRED TRANSACTION;").unwrap();
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let err = store
            .transaction(|r| Ok(r.append_transaction(&earn("txn-1"))?))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.conn.lock().unwrap().is_autocommit());

        reader.execute_batch("COMMIT;").unwrap();
        drop(reader);

        store
            .transaction(|r| Ok(r.append_transaction(&earn("txn-2"))?))
            .unwrap();
        let ids: Vec<_> = store
            .read(|r| Ok(r.transactions_for("u1")?))
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["txn-2"]);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questcoin.db");
        {
            let store = SqliteStore::open_at(&path).unwrap();
            store
                .transaction(|r| Ok(r.insert_completion(&completion("c1", ReviewStatus::Pending, 0))?))
                .unwrap();
        }
        let store = SqliteStore::open_at(&path).unwrap();
        assert!(store.read(|r| Ok(r.completion("c1")?)).unwrap().is_some());
    }

    #[test]
    fn owned_coupon_and_redemption_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owned = OwnedCoupon {
            id: "own-1".into(),
            coupon_id: "tea".into(),
            owner_id: "u1".into(),
            title: "Tea House".into(),
            cost: 30,
            code: "ABC123".into(),
            purchased_at: at(0),
            expires_at: at(0) + Duration::days(30),
            status: RedemptionStatus::Unredeemed,
        };
        let request = RedemptionRequest {
            id: "rdm-1".into(),
            owned_coupon_id: "own-1".into(),
            owner_id: "u1".into(),
            status: ReviewStatus::Pending,
            created_at: at(1),
            decided_at: None,
        };
        store
            .transaction(|r| {
                r.insert_owned_coupon(&owned)?;
                r.insert_redemption(&request)?;
                Ok(())
            })
            .unwrap();

        let by_code = store.read(|r| Ok(r.owned_coupon_by_code("ABC123")?)).unwrap();
        assert_eq!(by_code, Some(owned.clone()));
        let for_coupon = store.read(|r| Ok(r.redemptions_for_coupon("own-1")?)).unwrap();
        assert_eq!(for_coupon, vec![request]);
        assert_eq!(store.read(|r| Ok(r.owned_coupons_for("u1")?)).unwrap(), vec![owned]);
    }
}
