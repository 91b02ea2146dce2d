//! Durable storage for the token pair.
//!
//! A `TokenStore` is a flat key/value slot holding raw strings, last writer
//! wins. The session manager owns the (de)serialization so a corrupted value
//! can be detected and cleared rather than failing inside the store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use thiserror::Error;

/// Storage key the token pair is persisted under
pub const AUTH_TOKENS_KEY: &str = "authTokens";

/// Keychain service name
const SERVICE_NAME: &str = "storefront";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a key that is not present succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// File store
// ============================================================================

/// One JSON file per key inside a directory.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        std::fs::write(&path, value)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Keychain store
// ============================================================================

/// Values kept in the OS keychain, one entry per key.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let entry = Entry::new(&self.service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));

        assert_eq!(store.get(AUTH_TOKENS_KEY).unwrap(), None);
        store.set(AUTH_TOKENS_KEY, r#"{"access":"a","refresh":"r"}"#).unwrap();
        assert_eq!(
            store.get(AUTH_TOKENS_KEY).unwrap().as_deref(),
            Some(r#"{"access":"a","refresh":"r"}"#)
        );
        assert!(dir.path().join("nested").join("authTokens.json").exists());
    }

    #[test]
    fn test_file_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());

        store.set(AUTH_TOKENS_KEY, "x").unwrap();
        store.remove(AUTH_TOKENS_KEY).unwrap();
        store.remove(AUTH_TOKENS_KEY).unwrap();
        assert_eq!(store.get(AUTH_TOKENS_KEY).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.set(AUTH_TOKENS_KEY, "x").unwrap();

        let mode = std::fs::metadata(dir.path().join("authTokens.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_keyring_store_survives_new_instance() {
        let key = format!("storefront-test-{}", std::process::id());
        let writer = KeyringTokenStore::new();
        if let Err(e) = writer.set(&key, "persisted") {
            // No keychain service in this environment (headless CI)
            eprintln!("skipping keychain round trip: {e}");
            return;
        }

        let reader = KeyringTokenStore::new();
        let value = reader.get(&key).unwrap();
        reader.remove(&key).unwrap();
        assert_eq!(value.as_deref(), Some("persisted"));
        assert_eq!(reader.get(&key).unwrap(), None);
    }

    #[test]
    fn test_memory_store_last_writer_wins() {
        let store = MemoryTokenStore::new();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
