use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use sqlx::types::{Json, JsonValue};
use sqlx::{MySql, MySqlPool, QueryBuilder};
use uuid::Uuid;

use crate::models::game::{GameKind, NewSession, Session, SessionPatch, SessionStatus};
use crate::models::user::PlayerRecord;
use crate::store::{tally, ChangeFeed, SessionStore, SessionSubscription, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session (
    id CHAR(36) NOT NULL PRIMARY KEY,
    kind TINYINT UNSIGNED NOT NULL,
    player1 VARCHAR(255) NULL,
    player2 VARCHAR(255) NULL,
    status TINYINT UNSIGNED NOT NULL DEFAULT 0,
    board1 JSON NULL,
    board2 JSON NULL,
    board JSON NULL,
    ready1 BOOLEAN NULL,
    ready2 BOOLEAN NULL,
    turn TINYINT UNSIGNED NULL,
    result TINYINT UNSIGNED NULL,
    player1_last_active DATETIME(3) NULL,
    player2_last_active DATETIME(3) NULL,
    version BIGINT UNSIGNED NOT NULL DEFAULT 1,
    created_at DATETIME(3) NOT NULL,
    INDEX session_queue (kind, status, result)
)";

// The session row as stored. Enum columns are TINYINT codes, boards are JSON.
#[derive(sqlx::FromRow, Debug)]
struct SessionRow {
    id: String,
    kind: u8,
    player1: Option<String>,
    player2: Option<String>,
    status: u8,
    board1: Option<JsonValue>,
    board2: Option<JsonValue>,
    board: Option<JsonValue>,
    ready1: Option<bool>,
    ready2: Option<bool>,
    turn: Option<u8>,
    result: Option<u8>,
    player1_last_active: Option<DateTime<Utc>>,
    player2_last_active: Option<DateTime<Utc>>,
    version: u64,
    created_at: DateTime<Utc>,
}

// A board that does not parse reads as missing, which callers treat as empty
fn board_from<T: DeserializeOwned>(id: &str, column: &str, value: Option<JsonValue>) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(board) => Some(board),
        Err(err) => {
            warn!("Ignoring malformed {} on session {}: {:?}", column, id, err);
            None
        }
    }
}

fn code<T: TryFrom<u8, Error = u8>>(id: &str, column: &str, value: u8) -> Result<T, StoreError> {
    T::try_from(value).map_err(|bad| StoreError::Malformed(format!("session {}: {} = {}", id, column, bad)))
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, StoreError> {
        let id = row.id;
        Ok(Session {
            kind: code(&id, "kind", row.kind)?,
            status: code(&id, "status", row.status)?,
            turn: row.turn.map(|t| code(&id, "turn", t)).transpose()?,
            result: row.result.map(|r| code(&id, "result", r)).transpose()?,
            board1: board_from(&id, "board1", row.board1),
            board2: board_from(&id, "board2", row.board2),
            board: board_from(&id, "board", row.board),
            player1: row.player1,
            player2: row.player2,
            ready1: row.ready1,
            ready2: row.ready2,
            player1_last_active: row.player1_last_active,
            player2_last_active: row.player2_last_active,
            version: row.version,
            created_at: row.created_at,
            id,
        })
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<Session>, StoreError> {
    rows.into_iter().map(Session::try_from).collect()
}

/// Session store over the `session` table. Change notifications cover writes
/// made through this instance; polling picks up everything else.
#[derive(Clone)]
pub struct MySqlSessionStore {
    pool: MySqlPool,
    feed: ChangeFeed,
}

impl MySqlSessionStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlSessionStore {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await.map_err(|err| {
            error!("Error creating session table: {:?}", err);
            StoreError::from(err)
        })?;
        Ok(())
    }

    async fn write(&self, id: &str, expected_version: Option<u64>, patch: SessionPatch) -> Result<Session, StoreError> {
        let mut qb = patch_query(patch);
        qb.push(" WHERE id = ").push_bind(id.to_string());
        if let Some(expected) = expected_version {
            qb.push(" AND version = ").push_bind(expected);
        }

        let done = match qb.build().execute(&self.pool).await {
            Ok(done) => done,
            Err(err) => {
                error!("Error updating session {}: {:?}", id, err);
                return Err(err.into());
            }
        };

        if done.rows_affected() == 0 {
            // Either the row is gone or somebody else moved the version on
            return match (self.get_session(id).await?, expected_version) {
                (None, _) => Err(StoreError::NotFound(id.to_string())),
                (Some(_), Some(expected)) => {
                    debug!("Version conflict on session {} (expected {})", id, expected);
                    Err(StoreError::Conflict {
                        id: id.to_string(),
                        expected,
                    })
                }
                (Some(_), None) => Err(StoreError::Malformed(format!("session {} was not updated", id))),
            };
        }

        let updated = self
            .get_session(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.feed.publish(&updated);
        Ok(updated)
    }
}

// UPDATE statement for the written fields; always bumps the version
fn patch_query(patch: SessionPatch) -> QueryBuilder<'static, MySql> {
    let mut qb = QueryBuilder::<MySql>::new("UPDATE session SET version = version + 1");
    if let Some(value) = patch.player1 {
        qb.push(", player1 = ").push_bind(value);
    }
    if let Some(value) = patch.player2 {
        qb.push(", player2 = ").push_bind(value);
    }
    if let Some(value) = patch.status {
        qb.push(", status = ").push_bind(u8::from(value));
    }
    if let Some(value) = patch.board1 {
        qb.push(", board1 = ").push_bind(value.map(Json));
    }
    if let Some(value) = patch.board2 {
        qb.push(", board2 = ").push_bind(value.map(Json));
    }
    if let Some(value) = patch.board {
        qb.push(", board = ").push_bind(value.map(Json));
    }
    if let Some(value) = patch.ready1 {
        qb.push(", ready1 = ").push_bind(value);
    }
    if let Some(value) = patch.ready2 {
        qb.push(", ready2 = ").push_bind(value);
    }
    if let Some(value) = patch.turn {
        qb.push(", turn = ").push_bind(value.map(u8::from));
    }
    if let Some(value) = patch.result {
        qb.push(", result = ").push_bind(value.map(u8::from));
    }
    if let Some(value) = patch.player1_last_active {
        qb.push(", player1_last_active = ").push_bind(value);
    }
    if let Some(value) = patch.player2_last_active {
        qb.push(", player2_last_active = ").push_bind(value);
    }
    qb
}

#[async_trait]
impl SessionStore for MySqlSessionStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let id = Uuid::new_v4().to_string();

        // Most initial values come from the schema defaults
        let sql = "INSERT INTO session (id, kind, player1, status, created_at) VALUES (?, ?, ?, ?, ?)";
        if let Err(err) = sqlx::query(sql)
            .bind(&id)
            .bind(u8::from(new.kind))
            .bind(&new.player1)
            .bind(u8::from(SessionStatus::Waiting))
            .bind(Utc::now())
            .execute(&self.pool)
            .await
        {
            error!("Error creating session: {:?}", err);
            return Err(err.into());
        }

        let session = self
            .get_session(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.feed.publish(&session);
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sql = "SELECT * FROM session WHERE id = ?";
        let row = sqlx::query_as::<_, SessionRow>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                error!("Error fetching session {}: {:?}", id, err);
                StoreError::from(err)
            })?;
        row.map(Session::try_from).transpose()
    }

    async fn update_session(&self, id: &str, patch: SessionPatch) -> Result<Session, StoreError> {
        self.write(id, None, patch).await
    }

    async fn update_session_if(
        &self,
        id: &str,
        expected_version: u64,
        patch: SessionPatch,
    ) -> Result<Session, StoreError> {
        self.write(id, Some(expected_version), patch).await
    }

    async fn joinable_sessions(&self, kind: GameKind) -> Result<Vec<Session>, StoreError> {
        let sql = "SELECT * FROM session WHERE kind = ? AND status = ? AND player2 IS NULL AND result IS NULL ORDER BY created_at";
        let rows = sqlx::query_as::<_, SessionRow>(sql)
            .bind(u8::from(kind))
            .bind(u8::from(SessionStatus::Waiting))
            .fetch_all(&self.pool)
            .await?;
        into_sessions(rows)
    }

    async fn started_session_for(&self, kind: GameKind, identity: &str) -> Result<Option<Session>, StoreError> {
        let sql = "SELECT * FROM session WHERE kind = ? AND status = ? AND result IS NULL AND (player1 = ? OR player2 = ?) ORDER BY created_at DESC LIMIT 1";
        let row = sqlx::query_as::<_, SessionRow>(sql)
            .bind(u8::from(kind))
            .bind(u8::from(SessionStatus::Ready))
            .bind(identity)
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::try_from).transpose()
    }

    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StoreError> {
        let sql = "SELECT * FROM session WHERE result IS NULL AND (player1_last_active < ? OR player2_last_active < ?) ORDER BY created_at";
        let rows = sqlx::query_as::<_, SessionRow>(sql)
            .bind(cutoff)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        into_sessions(rows)
    }

    async fn player_record(&self, kind: GameKind, identity: &str) -> Result<PlayerRecord, StoreError> {
        let sql = "SELECT * FROM session WHERE kind = ? AND result IS NOT NULL AND (player1 = ? OR player2 = ?)";
        let rows = sqlx::query_as::<_, SessionRow>(sql)
            .bind(u8::from(kind))
            .bind(identity)
            .bind(identity)
            .fetch_all(&self.pool)
            .await?;
        let mut record = PlayerRecord::default();
        for session in into_sessions(rows)? {
            tally(&mut record, &session, identity);
        }
        Ok(record)
    }

    fn subscribe(&self, id: &str) -> SessionSubscription {
        self.feed.subscribe(id)
    }
}
