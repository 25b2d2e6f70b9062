//! Persisted session record and the ephemeral session-scoped store.
//!
//! The [`SessionRecord`] is the single versioned, typed document holding
//! everything that must survive a restart: auth token, selected agent,
//! native-auth marker, setup flag. During a session the in-memory record is
//! the source of truth; the file is only a durability layer. On a schema
//! version mismatch the persisted record is discarded and a fresh one is
//! created - that is the whole migration policy, made explicit.
//!
//! The [`EphemeralStore`] holds state scoped to one process lifetime:
//! one-time event-handled markers. It is never written to disk.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lumen_types::{AgentId, AuthToken};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedAgent {
    pub id: AgentId,
    pub name: String,
}

/// Session state container for persistence.
///
/// # Version Compatibility
///
/// The `version` field enables forward compatibility: a record written by a
/// newer schema is ignored at load and replaced with a fresh one, rather than
/// being partially interpreted.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub auth_token: Option<AuthToken>,
    pub selected_agent: Option<SelectedAgent>,
    /// Set once the native bridge has injected credentials on this install.
    #[serde(default)]
    pub native_auth_seen: bool,
    /// Last setup-completion hint observed from the server.
    #[serde(default)]
    pub setup_complete: bool,
    /// Schema version; bump on breaking shape changes.
    pub version: u32,
}

impl SessionRecord {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Filename for the session record inside the data directory.
    pub const FILENAME: &'static str = "session.json";

    #[must_use]
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_compatible(&self) -> bool {
        self.version == Self::CURRENT_VERSION
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write session record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode session record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed persistence for the session record.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SessionRecord::FILENAME),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record, falling back to a fresh one.
    ///
    /// A missing file, unreadable JSON, or incompatible schema version all
    /// produce a fresh record; none of them is an error the caller can act on.
    #[must_use]
    pub fn load(&self) -> SessionRecord {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SessionRecord::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read session record: {e}");
                return SessionRecord::new();
            }
        };

        match serde_json::from_str::<SessionRecord>(&text) {
            Ok(record) if record.is_compatible() => record,
            Ok(record) => {
                tracing::info!(
                    found = record.version,
                    expected = SessionRecord::CURRENT_VERSION,
                    "Discarding session record with incompatible schema version"
                );
                SessionRecord::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Corrupt session record, starting fresh: {e}");
                SessionRecord::new()
            }
        }
    }

    /// Persist the record atomically (temp file + rename) with owner-only
    /// permissions - it holds a bearer token.
    pub fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let bytes = serde_json::to_vec_pretty(record)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        Ok(())
    }
}

/// In-memory session-scoped state: one-time markers and small string values.
///
/// Cleared when the process exits; nothing here is ever persisted.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    values: HashMap<String, String>,
    handled: HashSet<String>,
}

impl EphemeralStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// One-time marker: true the first time a key is marked, false afterward.
    pub fn mark_once(&mut self, key: &str) -> bool {
        self.handled.insert(key.to_owned())
    }
}
