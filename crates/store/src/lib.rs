// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! instancer-store: the durable instance store (§3, §4.A).
//!
//! Backed by an embedded SQLite database reached through an async `sqlx`
//! pool, in WAL mode, so every write is both durable on commit and
//! non-blocking of the cooperative scheduler. `delete_and_insert` is a
//! single transaction, never a delete followed by a separate insert.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;

use std::path::Path;
use std::str::FromStr;

use instancer_core::{InstanceKey, InstanceState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

pub use error::StoreError;

/// A full snapshot of one instance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub state: InstanceState,
    pub reason: String,
    pub server_idx: Option<i64>,
    pub port: Option<u16>,
}

/// The durable keyed store described in §4.A.
///
/// Table layout matches §6 exactly: `challenges(name, user_id, server,
/// port, state, reason)`, primary key `(name, user_id)`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `path` and run
    /// migrations. `path` is the `[database].path` value from config.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests: a fresh, private SQLite database per
    /// connection so tests never share state.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS challenges (
                name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                server INTEGER NULL,
                port INTEGER NULL,
                state TEXT NOT NULL,
                reason TEXT NOT NULL,
                PRIMARY KEY (name, user_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `create(key)` — insert `state=created, reason=""`. Replaces any
    /// existing row (start-from-scratch semantics; callers who want to
    /// preserve an existing row must `get` first).
    #[instrument(skip(self), fields(key = %key))]
    pub async fn create(&self, key: &InstanceKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO challenges (name, user_id, server, port, state, reason)
             VALUES (?, ?, NULL, NULL, ?, '')
             ON CONFLICT (name, user_id) DO UPDATE SET
                server = NULL, port = NULL, state = excluded.state, reason = ''",
        )
        .bind(key.challenge_id())
        .bind(key.user_id())
        .bind(InstanceState::Created.as_str())
        .execute(&self.pool)
        .await?;
        debug!("instance row created");
        Ok(())
    }

    /// `get(key)` — current state, or `None` if no row exists (the
    /// unpersisted `not_started` state, §3).
    pub async fn get(&self, key: &InstanceKey) -> Result<Option<InstanceState>, StoreError> {
        Ok(self.get_with_reason(key).await?.map(|(state, _)| state))
    }

    /// `get_with_reason(key)`.
    pub async fn get_with_reason(
        &self,
        key: &InstanceKey,
    ) -> Result<Option<(InstanceState, String)>, StoreError> {
        let row = sqlx::query("SELECT state, reason FROM challenges WHERE name = ? AND user_id = ?")
            .bind(key.challenge_id())
            .bind(key.user_id())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let state_str: String = row.try_get("state")?;
        let reason: String = row.try_get("reason")?;
        let state: InstanceState = state_str.parse()?;
        Ok(Some((state, reason)))
    }

    /// `set(key, state, reason)`. A no-op (logged at `warn`) if the row
    /// does not exist — callers must `create` first when in doubt (§4.A).
    #[instrument(skip(self), fields(key = %key, state = %state))]
    pub async fn set(
        &self,
        key: &InstanceKey,
        state: InstanceState,
        reason: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE challenges SET state = ?, reason = ? WHERE name = ? AND user_id = ?",
        )
        .bind(state.as_str())
        .bind(reason)
        .bind(key.challenge_id())
        .bind(key.user_id())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(%key, "set() on a row that does not exist; no-op");
        }
        Ok(())
    }

    /// `set_server(key, idx)`.
    pub async fn set_server(&self, key: &InstanceKey, idx: usize) -> Result<(), StoreError> {
        sqlx::query("UPDATE challenges SET server = ? WHERE name = ? AND user_id = ?")
            .bind(idx as i64)
            .bind(key.challenge_id())
            .bind(key.user_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `get_server(key)`.
    pub async fn get_server(&self, key: &InstanceKey) -> Result<Option<usize>, StoreError> {
        let row = sqlx::query("SELECT server FROM challenges WHERE name = ? AND user_id = ?")
            .bind(key.challenge_id())
            .bind(key.user_id())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let idx: Option<i64> = row.try_get("server")?;
        Ok(idx.map(|i| i as usize))
    }

    /// `set_port(key, port)`.
    pub async fn set_port(&self, key: &InstanceKey, port: u16) -> Result<(), StoreError> {
        sqlx::query("UPDATE challenges SET port = ? WHERE name = ? AND user_id = ?")
            .bind(port as i64)
            .bind(key.challenge_id())
            .bind(key.user_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `get_port(key)`.
    pub async fn get_port(&self, key: &InstanceKey) -> Result<Option<u16>, StoreError> {
        let row = sqlx::query("SELECT port FROM challenges WHERE name = ? AND user_id = ?")
            .bind(key.challenge_id())
            .bind(key.user_id())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let port: Option<i64> = row.try_get("port")?;
        Ok(port.map(|p| p as u16))
    }

    /// Full row fetch, used by the reconciler and status handler so a
    /// single lookup returns state, reason, server, and port together.
    pub async fn get_row(&self, key: &InstanceKey) -> Result<Option<InstanceRow>, StoreError> {
        let row = sqlx::query(
            "SELECT state, reason, server, port FROM challenges WHERE name = ? AND user_id = ?",
        )
        .bind(key.challenge_id())
        .bind(key.user_id())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        let state_str: String = row.try_get("state")?;
        let reason: String = row.try_get("reason")?;
        let server: Option<i64> = row.try_get("server")?;
        let port: Option<i64> = row.try_get("port")?;
        Ok(Some(InstanceRow {
            state: state_str.parse()?,
            reason,
            server_idx: server,
            port: port.map(|p| p as u16),
        }))
    }

    /// `delete(key)`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &InstanceKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM challenges WHERE name = ? AND user_id = ?")
            .bind(key.challenge_id())
            .bind(key.user_id())
            .execute(&self.pool)
            .await?;
        debug!("instance row deleted");
        Ok(())
    }

    /// All instance keys currently in one of `states`. Used by the
    /// background reconciliation sweep (§4.G) to find rows nobody is
    /// actively polling.
    pub async fn list_in_states(
        &self,
        states: &[InstanceState],
    ) -> Result<Vec<InstanceKey>, StoreError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = states.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("SELECT name, user_id FROM challenges WHERE state IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let user_id: String = row.try_get("user_id")?;
            // Rows are only ever written through `InstanceKey`-validated
            // paths, so these always re-parse cleanly.
            if let Ok(key) = InstanceKey::new(name, user_id) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// `delete_and_insert(key, state)` — atomic replace, in a single
    /// transaction (§9: never decomposed at the application layer).
    #[instrument(skip(self), fields(key = %key, state = %state))]
    pub async fn delete_and_insert(
        &self,
        key: &InstanceKey,
        state: InstanceState,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM challenges WHERE name = ? AND user_id = ?")
            .bind(key.challenge_id())
            .bind(key.user_id())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO challenges (name, user_id, server, port, state, reason)
             VALUES (?, ?, NULL, NULL, ?, '')",
        )
        .bind(key.challenge_id())
        .bind(key.user_id())
        .bind(state.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
