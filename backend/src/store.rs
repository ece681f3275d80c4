//! store.rs — append-only event history
//!
//! Two relations keyed by stable feed identifiers: the portal catalog and
//! the normalized action log. Fetch pages overlap and runs repeat, so every
//! write is `INSERT OR IGNORE` — replaying the same window is free, and a
//! portal's stored metadata stays at its first-observed value. One fetch
//! page commits as one transaction.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use intel_types::{ActionKind, ActionRecord, ActionVerb, Faction, PortalRecord};

use crate::normalizer::NormalizedEvent;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS portals (
        id TEXT PRIMARY KEY,
        lat REAL NOT NULL,
        lng REAL NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        team TEXT NOT NULL DEFAULT 'NEUTRAL'
    )",
    "CREATE TABLE IF NOT EXISTS actions (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        type TEXT NOT NULL,
        action TEXT NOT NULL,
        portal_id TEXT,
        target_portal_id TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_actions_timestamp ON actions (timestamp)",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub portals: i64,
    pub actions: i64,
    pub oldest_ms: Option<i64>,
    pub newest_ms: Option<i64>,
}

pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (and create if missing) the history database, applying the
    /// schema idempotently.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("history store open: {path}");
        Ok(Self { pool })
    }

    /// Persist one fetched page atomically. Records already present (page
    /// overlap, repeated runs) are ignored.
    pub async fn write_page(&self, events: &[NormalizedEvent]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            for portal in &event.portals {
                sqlx::query(
                    "INSERT OR IGNORE INTO portals (id, lat, lng, name, address, team)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .bind(&portal.id)
                .bind(portal.lat)
                .bind(portal.lng)
                .bind(&portal.name)
                .bind(&portal.address)
                .bind(portal.team.as_str())
                .execute(&mut *tx)
                .await?;
            }
            let action = &event.action;
            sqlx::query(
                "INSERT OR IGNORE INTO actions (id, timestamp, type, action, portal_id, target_portal_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&action.id)
            .bind(action.timestamp)
            .bind(action.kind.as_str())
            .bind(action.action.as_str())
            .bind(&action.portal_id)
            .bind(&action.target_portal_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    /// The full portal catalog, unordered.
    pub async fn load_portals(&self) -> Result<Vec<PortalRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, lat, lng, name, address, team FROM portals")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PortalRecord {
                id: row.get(0),
                lat: row.get(1),
                lng: row.get(2),
                name: row.get(3),
                address: row.get(4),
                team: Faction::parse(row.get::<String, _>(5).as_str()),
            })
            .collect())
    }

    /// The action log in replay order. The unique event id breaks timestamp
    /// ties so repeated replays stay identical.
    pub async fn load_actions(&self) -> Result<Vec<ActionRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, timestamp, type, action, portal_id, target_portal_id
             FROM actions ORDER BY timestamp ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| ActionRecord {
                id: row.get(0),
                timestamp: row.get(1),
                kind: ActionKind::parse(row.get::<String, _>(2).as_str()),
                action: ActionVerb::parse(row.get::<String, _>(3).as_str()),
                portal_id: row.get(4),
                target_portal_id: row.get(5),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<StoreStats, sqlx::Error> {
        let row = sqlx::query(
            "SELECT (SELECT COUNT(*) FROM portals), COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM actions",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            portals: row.get(0),
            actions: row.get(1),
            oldest_ms: row.get(2),
            newest_ms: row.get(3),
        })
    }
}
