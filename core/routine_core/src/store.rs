use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::warn;

use crate::model::Record;

/// Fixed key the record lives under.
pub const STORAGE_KEY: &str = "routines_data";

pub const DEFAULT_RECENT_LIMIT: usize = 8;
pub const RECENT_LIMIT_MAX: usize = 100;

/// Persistence for the whole record. Saves always overwrite.
pub trait Store: Send {
    /// Never fails: a missing or unreadable value yields an empty record.
    fn load(&mut self) -> Record;

    fn save(&mut self, record: &Record) -> anyhow::Result<()>;
}

/// Parse a persisted value. `None` for anything that isn't a record-shaped
/// JSON object (including `null`).
pub fn parse_record(raw: &str) -> Option<Record> {
    match serde_json::from_str::<Option<Record>>(raw) {
        Ok(v) => v,
        Err(err) => {
            warn!("stored record unreadable, starting empty: {err}");
            None
        }
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn read_raw(&self) -> rusqlite::Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        match stmt.query_row([STORAGE_KEY], |row| row.get::<_, String>(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn write_raw(&self, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            r#"
INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at
            "#,
            (STORAGE_KEY, value, now_rfc3339()),
        )?;
        Ok(())
    }

    pub fn load_or_init_settings(&mut self, defaults: Settings) -> rusqlite::Result<Settings> {
        if let Some(settings) = self.load_settings()? {
            let fixed = settings.clamped();
            if fixed != settings {
                self.save_settings(fixed)?;
            }
            return Ok(fixed);
        }

        let fixed = defaults.clamped();
        self.save_settings(fixed)?;
        Ok(fixed)
    }

    fn load_settings(&mut self) -> rusqlite::Result<Option<Settings>> {
        let mut stmt = self
            .conn
            .prepare("SELECT notifications_enabled, recent_limit FROM app_settings WHERE id = 1")?;
        match stmt.query_row([], |row| {
            let notifications_enabled: i64 = row.get(0)?;
            let recent_limit: i64 = row.get(1)?;
            Ok(Settings {
                notifications_enabled: notifications_enabled != 0,
                recent_limit: recent_limit.max(0) as usize,
            })
        }) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn save_settings(&mut self, settings: Settings) -> rusqlite::Result<()> {
        self.conn.execute(
            r#"
INSERT INTO app_settings (id, notifications_enabled, recent_limit, updated_at)
VALUES (1, ?1, ?2, ?3)
ON CONFLICT(id) DO UPDATE SET
  notifications_enabled=excluded.notifications_enabled,
  recent_limit=excluded.recent_limit,
  updated_at=excluded.updated_at
            "#,
            (
                settings.notifications_enabled as i64,
                settings.recent_limit as i64,
                now_rfc3339(),
            ),
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load(&mut self) -> Record {
        match self.read_raw() {
            Ok(Some(raw)) => parse_record(&raw).unwrap_or_default(),
            Ok(None) => Record::default(),
            Err(err) => {
                warn!("read {STORAGE_KEY} failed, starting empty: {err}");
                Record::default()
            }
        }
    }

    fn save(&mut self, record: &Record) -> anyhow::Result<()> {
        let raw = serde_json::to_string(record)?;
        self.write_raw(&raw)?;
        Ok(())
    }
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS app_settings (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  notifications_enabled INTEGER NOT NULL DEFAULT 0,
  recent_limit INTEGER NOT NULL DEFAULT 8,
  updated_at TEXT NOT NULL
);
"#,
    )
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// In-process store holding the serialized value, like a browser's
/// key-value slot.
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: Option<String>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            saves: 0,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl Store for MemoryStore {
    fn load(&mut self) -> Record {
        self.raw
            .as_deref()
            .and_then(parse_record)
            .unwrap_or_default()
    }

    fn save(&mut self, record: &Record) -> anyhow::Result<()> {
        self.raw = Some(serde_json::to_string(record)?);
        self.saves += 1;
        Ok(())
    }
}

/// User preferences kept next to the record.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    /// Stands in for the platform notification permission.
    pub notifications_enabled: bool,
    pub recent_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: false,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl Settings {
    fn clamped(self) -> Self {
        Self {
            notifications_enabled: self.notifications_enabled,
            recent_limit: self.recent_limit.clamp(1, RECENT_LIMIT_MAX),
        }
    }
}
