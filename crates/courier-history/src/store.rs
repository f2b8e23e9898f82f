use std::path::Path;
use std::sync::Mutex;

use courier_common::{ConversationTurn, Error, Result, UserId};
use rusqlite::{params, Connection};
use tracing::info;

/// Append-only conversation log, one row per turn, keyed by user.
///
/// The connection is wrapped in a mutex so the store can be shared across
/// turn tasks; every call is a short synchronous statement.
pub struct HistoryStore {
    conn: Mutex<Connection>,
    /// Turns kept per user; older rows are pruned on append.
    limit: usize,
}

impl HistoryStore {
    pub fn open(db_path: &Path, limit: usize) -> Result<Self> {
        info!("opening history store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            limit,
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory(limit: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            limit,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS turns (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    response TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_turns_user
                    ON turns(user_id);",
            )
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("history store lock poisoned".into()))
    }

    /// Append one committed turn and prune the user's log to the retention
    /// limit. Runs inside a transaction so either the whole turn is recorded
    /// or nothing is.
    pub fn append(&self, turn: &ConversationTurn) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        tx.execute(
            "INSERT INTO turns (id, user_id, prompt, response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                uuid::Uuid::new_v4().to_string(),
                turn.user.0,
                turn.prompt,
                turn.response,
                turn.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("failed to append turn: {e}")))?;

        tx.execute(
            "DELETE FROM turns WHERE user_id = ?1 AND rowid NOT IN (
                SELECT rowid FROM turns WHERE user_id = ?1
                ORDER BY rowid DESC LIMIT ?2
            )",
            params![turn.user.0, self.limit as i64],
        )
        .map_err(|e| Error::Database(format!("failed to prune turns: {e}")))?;

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit turn: {e}")))
    }

    /// Load a user's turns in chronological order (oldest first).
    pub fn read(&self, user: UserId) -> Result<Vec<ConversationTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT prompt, response, created_at FROM turns
                 WHERE user_id = ?1 ORDER BY rowid ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare turn query: {e}")))?;

        let rows = stmt
            .query_map(params![user.0], |row| {
                let created_raw: String = row.get(2)?;
                Ok(ConversationTurn {
                    user,
                    prompt: row.get(0)?,
                    response: row.get(1)?,
                    created_at: parse_timestamp(&created_raw),
                })
            })
            .map_err(|e| Error::Database(format!("failed to load turns: {e}")))?;

        let mut turns = Vec::new();
        for row in rows {
            turns.push(row.map_err(|e| Error::Database(format!("failed to read turn row: {e}")))?);
        }
        Ok(turns)
    }

    /// Delete every turn for a user. Returns the number of removed rows.
    pub fn clear(&self, user: UserId) -> Result<usize> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM turns WHERE user_id = ?1", params![user.0])
            .map_err(|e| Error::Database(format!("failed to clear history: {e}")))?;
        Ok(deleted)
    }
}

fn parse_timestamp(value: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("failed to parse timestamp '{value}': {e}, falling back to now");
            chrono::Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::HistoryStore;
    use courier_common::{ConversationTurn, UserId};

    #[test]
    fn append_and_read_round_trip() {
        let store = HistoryStore::in_memory(10).expect("in-memory store should open");
        let user = UserId(1);

        store
            .append(&ConversationTurn::new(user, "hello", "hi there"))
            .expect("append should succeed");
        store
            .append(&ConversationTurn::new(user, "how are you", "fine"))
            .expect("append should succeed");

        let turns = store.read(user).expect("read should succeed");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].prompt, "hello");
        assert_eq!(turns[0].response, "hi there");
        assert_eq!(turns[1].prompt, "how are you");
    }

    #[test]
    fn histories_are_isolated_per_user() {
        let store = HistoryStore::in_memory(10).unwrap();

        store
            .append(&ConversationTurn::new(UserId(1), "a", "b"))
            .unwrap();
        store
            .append(&ConversationTurn::new(UserId(2), "c", "d"))
            .unwrap();

        assert_eq!(store.read(UserId(1)).unwrap().len(), 1);
        assert_eq!(store.read(UserId(2)).unwrap().len(), 1);

        store.clear(UserId(1)).unwrap();
        assert!(store.read(UserId(1)).unwrap().is_empty());
        assert_eq!(store.read(UserId(2)).unwrap().len(), 1);
    }

    #[test]
    fn append_prunes_to_retention_limit() {
        let store = HistoryStore::in_memory(3).unwrap();
        let user = UserId(5);

        for i in 0..6 {
            store
                .append(&ConversationTurn::new(user, format!("q{i}"), format!("a{i}")))
                .unwrap();
        }

        let turns = store.read(user).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].prompt, "q3");
        assert_eq!(turns[2].prompt, "q5");
    }

    #[test]
    fn clear_reports_deleted_rows() {
        let store = HistoryStore::in_memory(10).unwrap();
        let user = UserId(9);
        assert_eq!(store.clear(user).unwrap(), 0);

        store
            .append(&ConversationTurn::new(user, "x", "y"))
            .unwrap();
        assert_eq!(store.clear(user).unwrap(), 1);
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = HistoryStore::open(&path, 10).unwrap();
            store
                .append(&ConversationTurn::new(UserId(1), "persist", "me"))
                .unwrap();
        }

        let store = HistoryStore::open(&path, 10).unwrap();
        let turns = store.read(UserId(1)).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].response, "me");
    }
}
