//! `SQLite`-backed session persistence.
//!
//! One file holds the schema version, the single session row and one row per
//! known entity. Blocking `SQLite` calls run on the blocking thread pool, so
//! `load`, `save` and `close` are the only points where this backend yields.

use super::{AuthKey, DcAddress, Session, SessionRecord, SessionState};
use crate::entities::{EntityRecord, EntityStore, Reference};
use crate::errors::{EntityNotFound, PersistenceError};
use crate::tl::InputPeer;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Schema version stamped into new files. Other versions are rejected on load.
pub const SCHEMA_VERSION: i64 = 1;

type Handle = Arc<Mutex<Option<Connection>>>;

/// Rows read back from the file.
#[derive(Default)]
struct Snapshot {
    record: Option<SessionRecord>,
    entities: Vec<EntityRecord>,
}

/// Session persisted in a `SQLite` file.
///
/// The connection is opened lazily by the first `load` or `save` and released
/// by `close`. Saves are serialized by the handle's mutex.
pub struct SqliteSession {
    path: PathBuf,
    conn: Handle,
    state: SessionState,
}

impl SqliteSession {
    /// Creates a session bound to `path`. Nothing is touched on disk until `load`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(None)),
            state: SessionState::default(),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The entity cache.
    #[must_use]
    pub const fn entities(&self) -> &EntityStore {
        &self.state.entities
    }

    /// Whether the backing file is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_ok_and(|slot| slot.is_some())
    }

    /// Closes the store and removes the backing file with its WAL siblings.
    ///
    /// Files that do not exist are not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if closing or removing fails.
    pub async fn delete(&mut self) -> Result<(), PersistenceError> {
        self.close().await?;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = OsString::from(self.path.as_os_str());
            file.push(suffix);
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Deleted session file {}", self.path.display());
        Ok(())
    }

    async fn with_connection<T, F>(&self, task: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&mut Option<Connection>, &Path) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = conn.lock().map_err(|_| PersistenceError::Poisoned)?;
            task(&mut *slot, path.as_path())
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn open<'a>(
    slot: &'a mut Option<Connection>,
    path: &Path,
) -> Result<&'a mut Connection, PersistenceError> {
    let conn = match slot.take() {
        Some(conn) => conn,
        None => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn
        }
    };
    Ok(slot.insert(conn))
}

/// Creates the schema on a fresh file, or checks the version of an existing one.
///
/// Returns `true` when the file was fresh.
fn prepare(conn: &mut Connection) -> Result<bool, PersistenceError> {
    let has_version: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if has_version.is_none() {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA_SQL)?;
        tx.execute(
            "INSERT INTO version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        tx.commit()?;
        return Ok(true);
    }

    let found: Option<i64> = conn
        .query_row("SELECT version FROM version", [], |row| row.get(0))
        .optional()?;
    match found {
        Some(version) if version == SCHEMA_VERSION => Ok(false),
        other => Err(PersistenceError::VersionMismatch {
            found: other.unwrap_or(0),
            expected: SCHEMA_VERSION,
        }),
    }
}

fn read_snapshot(conn: &Connection) -> Result<Snapshot, PersistenceError> {
    let record = conn
        .query_row(
            "SELECT dc_id, address, port, auth FROM sessions LIMIT 1",
            [],
            |row| {
                let auth_key: Option<Vec<u8>> = row.get(3)?;
                Ok(SessionRecord {
                    dc_id: row.get(0)?,
                    server_address: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    port: row.get::<_, Option<u16>>(2)?.unwrap_or_default(),
                    auth_key: auth_key.filter(|k| !k.is_empty()).map(AuthKey::new),
                })
            },
        )
        .optional()?;

    let mut stmt = conn.prepare("SELECT id, hash, username, phone, name, date FROM entities")?;
    let entities = stmt
        .query_map([], |row| {
            Ok(EntityRecord {
                id: row.get(0)?,
                hash: row.get(1)?,
                username: row.get(2)?,
                phone: row.get(3)?,
                name: row.get(4)?,
                date: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Snapshot { record, entities })
}

fn write_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let tx = conn.transaction()?;
    if let Some(record) = &snapshot.record {
        tx.execute("DELETE FROM sessions", [])?;
        tx.execute(
            "INSERT OR REPLACE INTO sessions (dc_id, address, port, auth)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.dc_id,
                record.server_address,
                record.port,
                record.auth_key.as_ref().map(AuthKey::as_bytes),
            ],
        )?;
    }
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO entities (id, hash, username, phone, name, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for entity in &snapshot.entities {
            stmt.execute(params![
                entity.id,
                entity.hash,
                entity.username,
                entity.phone,
                entity.name,
                entity.date,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

#[async_trait]
impl Session for SqliteSession {
    async fn load(&mut self) -> Result<(), PersistenceError> {
        let snapshot = self
            .with_connection(|slot, path| {
                let conn = open(slot, path)?;
                if prepare(conn)? {
                    info!("Created new session store at {}", path.display());
                    return Ok(Snapshot::default());
                }
                read_snapshot(conn)
            })
            .await?;

        self.state.record = snapshot.record;
        self.state.entities.clear();
        for entity in snapshot.entities {
            self.state.entities.upsert(entity);
        }
        info!(
            "Loaded session from {} ({} entities, authorized: {})",
            self.path.display(),
            self.state.entities.len(),
            self.state.auth_key().is_some()
        );
        Ok(())
    }

    async fn save(&mut self) -> Result<(), PersistenceError> {
        // The index is keyed by marked id, so each id is written exactly once.
        let snapshot = Snapshot {
            record: self.state.record.clone(),
            entities: self
                .state
                .entities
                .records()
                .into_iter()
                .cloned()
                .collect(),
        };
        let count = snapshot.entities.len();
        self.with_connection(move |slot, path| {
            let conn = open(slot, path)?;
            prepare(conn)?;
            write_snapshot(conn, &snapshot)
        })
        .await?;
        debug!("Saved session to {} ({} entities)", self.path.display(), count);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        self.with_connection(|slot, _| {
            if let Some(conn) = slot.take() {
                conn.close().map_err(|(_, e)| PersistenceError::Database(e))?;
            }
            Ok(())
        })
        .await
    }

    fn set_dc(&mut self, dc_id: i32, server_address: &str, port: u16) {
        self.state.set_dc(dc_id, server_address, port);
    }

    fn dc(&self) -> Option<DcAddress> {
        self.state.dc()
    }

    fn set_auth_key(&mut self, auth_key: Option<AuthKey>) {
        self.state.set_auth_key(auth_key);
    }

    fn auth_key(&self) -> Option<AuthKey> {
        self.state.auth_key()
    }

    fn process_entities(&mut self, response: &Value) -> usize {
        self.state.entities.process_entities(response)
    }

    fn get_input_entity(&self, reference: &Reference) -> Result<InputPeer, EntityNotFound> {
        self.state.entities.get_input_entity(reference)
    }
}
