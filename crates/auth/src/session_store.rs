//! Session-scoped credential storage.
//!
//! Credentials live for one client session: either in process memory, or in a
//! single JSON file under the per-login runtime directory keyed by a session
//! id. Nothing here survives a reboot or is visible to another session id.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{AuthError, Credentials};

/// Fixed storage key for the credential pair.
pub const STORAGE_KEY: &str = "api_keys";

pub trait CredentialStore: Send + Sync {
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError>;

    /// Missing, empty or unreadable data all come back as `None`.
    fn load(&self) -> Option<Credentials>;

    fn clear(&self) -> Result<(), AuthError>;
}

/// Holds credentials for the life of the process.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let encoded = serde_json::to_string(credentials)?;
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(encoded);
        Ok(())
    }

    fn load(&self) -> Option<Credentials> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_deref().and_then(decode)
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
        Ok(())
    }
}

/// One JSON document per session under `<root>/<session_id>/api_keys.json`.
#[derive(Debug, Clone)]
pub struct SessionFileStore {
    path: PathBuf,
}

impl SessionFileStore {
    pub fn new(root: &Path, session_id: &str) -> Self {
        Self {
            path: root
                .join(sanitize_session_id(session_id))
                .join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for SessionFileStore {
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string(credentials)?;
        remove_if_present(&tmp)?;
        if let Err(e) = write_private(&tmp, content.as_bytes())
            .and_then(|()| std::fs::rename(&tmp, &self.path))
        {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::debug!(path = %self.path.display(), "Saved session credentials");
        Ok(())
    }

    fn load(&self) -> Option<Credentials> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not read session credentials");
                return None;
            }
        };
        let creds = decode(&content);
        if creds.is_none() && !content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "Ignoring unreadable session credentials");
        }
        creds
    }

    fn clear(&self) -> Result<(), AuthError> {
        remove_if_present(&self.path)?;
        // The session directory only ever holds this file.
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::remove_dir(parent);
        }
        tracing::debug!(path = %self.path.display(), "Cleared session credentials");
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn decode(content: &str) -> Option<Credentials> {
    if content.trim().is_empty() {
        return None;
    }
    serde_json::from_str(content).ok()
}

/// Session id for the current shell: the parent process id on unix.
pub fn default_session_id() -> String {
    #[cfg(unix)]
    {
        format!("ppid-{}", std::os::unix::process::parent_id())
    }
    #[cfg(not(unix))]
    {
        "default".to_string()
    }
}

fn sanitize_session_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Owner-only directories; an existing session directory is tightened too.
#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

/// Creates `path` fresh with owner-only permissions from the first byte.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("sk-ant-REDACTED", "sk-ABCDEFGHIJ0123456789xyz")
    }

    #[test]
    fn memory_round_trip_and_clear() {
        let store = MemoryStore::new();
        assert!(store.load().is_none());
        store.save(&creds()).unwrap();
        assert_eq!(store.load(), Some(creds()));
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn file_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        assert!(store.load().is_none());
        store.save(&creds()).unwrap();
        assert_eq!(store.load(), Some(creds()));
        store.clear().unwrap();
        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn clear_without_entry_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        store.clear().unwrap();
    }

    #[test]
    fn sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let a = SessionFileStore::new(dir.path(), "tab-a");
        let b = SessionFileStore::new(dir.path(), "tab-b");
        a.save(&creds()).unwrap();
        assert!(b.load().is_none());
    }

    #[test]
    fn corrupted_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();

        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_none());

        std::fs::write(store.path(), "   ").unwrap();
        assert!(store.load().is_none());

        std::fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn stored_document_uses_fixed_key_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        store.save(&creds()).unwrap();
        assert!(store.path().ends_with("tab-1/api_keys.json"));
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["anthropicKey"], "sk-ant-REDACTED");
    }

    #[test]
    fn partial_document_loads_incomplete_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"anthropicKey":"sk-ant-REDACTED"}"#).unwrap();
        let loaded = store.load().unwrap();
        assert!(!loaded.is_complete());
    }

    #[test]
    fn session_id_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "../escape");
        assert!(store.path().starts_with(dir.path()));
        assert!(store.path().ends_with("___escape/api_keys.json"));
    }

    #[cfg(unix)]
    #[test]
    fn file_and_session_dir_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(&dir.path().join("sessions"), "tab-1");
        store.save(&creds()).unwrap();
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(store.path()), 0o600);
        assert_eq!(mode(store.path().parent().unwrap()), 0o700);
        assert_eq!(mode(&dir.path().join("sessions")), 0o700);
    }

    #[test]
    fn save_leaves_no_temp_file_and_replaces_stale_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        let tmp = store.path().with_extension("json.tmp");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(&tmp, "stale").unwrap();

        store.save(&creds()).unwrap();
        assert!(!tmp.exists());
        assert_eq!(store.load(), Some(creds()));

        // Overwriting an existing entry goes through the same path.
        let other = Credentials::new("sk-ant-REDACTED", "sk-ZYXWVUTSRQ9876543210abc");
        store.save(&other).unwrap();
        assert_eq!(store.load(), Some(other));
        assert!(!tmp.exists());
    }

    #[test]
    fn clear_removes_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFileStore::new(dir.path(), "tab-1");
        store.save(&creds()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().parent().unwrap().exists());
        assert!(dir.path().exists());
    }
}
