//! Pluggable key-value persistence for the token pair.
//!
//! Only two fixed keys are ever written (`access_token`, `refresh_token`).
//! Backends: in-memory, a JSON file in the cache directory, or the OS keychain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use crate::config::{Config, TokenBackend};

/// Keychain service name
const SERVICE_NAME: &str = "authgate";

/// Token file name in cache directory
const TOKEN_FILE: &str = "tokens.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    AccessToken,
    RefreshToken,
}

impl TokenKey {
    pub const ALL: [TokenKey; 2] = [TokenKey::AccessToken, TokenKey::RefreshToken];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::AccessToken => "access_token",
            TokenKey::RefreshToken => "refresh_token",
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: TokenKey) -> Result<Option<String>>;
    fn set(&self, key: TokenKey, value: &str) -> Result<()>;
    /// Removing an absent key is not an error
    fn remove(&self, key: TokenKey) -> Result<()>;
}

/// Build the backend selected in the config.
pub fn token_store_for(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.token_backend {
        TokenBackend::File => Arc::new(FileTokenStore::new(config.cache_dir()?)),
        TokenBackend::Keyring => Arc::new(KeyringTokenStore::new()),
        TokenBackend::Memory => Arc::new(MemoryTokenStore::new()),
    };
    debug!(backend = %config.token_backend, "Token store ready");
    Ok(store)
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair, as if left over from an earlier run
    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            if let Some(token) = access_token {
                values.insert(TokenKey::AccessToken, token.to_string());
            }
            if let Some(token) = refresh_token {
                values.insert(TokenKey::RefreshToken, token.to_string());
            }
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TokenKey, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("Token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: TokenKey) -> Result<Option<String>> {
        Ok(self.lock()?.get(&key).cloned())
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.lock()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        self.lock()?.remove(&key);
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// Tokens as a flat JSON object in `<cache_dir>/tokens.json`.
/// The file is deleted once both keys are gone.
pub struct FileTokenStore {
    cache_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            write_lock: Mutex::new(()),
        }
    }

    fn token_path(&self) -> PathBuf {
        self.cache_dir.join(TOKEN_FILE)
    }

    fn read_all(path: &Path) -> Result<HashMap<String, String>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(path).context("Failed to read token file")?;
        serde_json::from_str(&contents).context("Failed to parse token file")
    }

    fn write_all(path: &Path, values: &HashMap<String, String>) -> Result<()> {
        if values.is_empty() {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove token file")?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(path, contents).context("Failed to write token file")?;
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Token file lock poisoned"))?;
        let path = self.token_path();
        let mut values = Self::read_all(&path)?;
        f(&mut values);
        Self::write_all(&path, &values)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: TokenKey) -> Result<Option<String>> {
        let values = Self::read_all(&self.token_path())?;
        Ok(values.get(key.as_str()).cloned())
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.as_str().to_string(), value.to_string());
        })
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        self.update(|values| {
            values.remove(key.as_str());
        })
    }
}

// ============================================================================
// Keyring
// ============================================================================

pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: TokenKey) -> Result<Entry> {
        Entry::new(&self.service, key.as_str()).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: TokenKey) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: TokenKey) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryTokenStore::new();
        assert!(store.get(TokenKey::AccessToken).unwrap().is_none());

        store.set(TokenKey::AccessToken, "A1").unwrap();
        assert_eq!(store.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));
        assert!(store.get(TokenKey::RefreshToken).unwrap().is_none());

        store.remove(TokenKey::AccessToken).unwrap();
        store.remove(TokenKey::AccessToken).unwrap();
        assert!(store.get(TokenKey::AccessToken).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_seeded() {
        let store = MemoryTokenStore::with_tokens(Some("A1"), None);
        assert_eq!(store.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));
        assert!(store.get(TokenKey::RefreshToken).unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("authgate"));
        store.set(TokenKey::AccessToken, "A1").unwrap();
        store.set(TokenKey::RefreshToken, "R1").unwrap();

        let reopened = FileTokenStore::new(dir.path().join("authgate"));
        assert_eq!(reopened.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));
        assert_eq!(reopened.get(TokenKey::RefreshToken).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_store_removes_file_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.set(TokenKey::AccessToken, "A1").unwrap();
        assert!(dir.path().join(TOKEN_FILE).exists());

        store.remove(TokenKey::AccessToken).unwrap();
        assert!(!dir.path().join(TOKEN_FILE).exists());

        // Idempotent on a missing file
        store.remove(TokenKey::RefreshToken).unwrap();
    }

    #[test]
    fn test_file_store_keys_are_fixed_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.set(TokenKey::RefreshToken, "R1").unwrap();

        let raw = std::fs::read_to_string(dir.path().join(TOKEN_FILE)).unwrap();
        let parsed: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.get("refresh_token").map(String::as_str), Some("R1"));
    }

    #[test]
    fn test_memory_backend_from_config() {
        let config = Config {
            token_backend: TokenBackend::Memory,
            ..Config::default()
        };
        let store = token_store_for(&config).unwrap();
        store.set(TokenKey::AccessToken, "A1").unwrap();
        assert_eq!(store.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));
    }

    #[test]
    #[ignore = "needs an OS keychain; run with --ignored"]
    fn test_keyring_store_persists_across_instances() {
        let service = format!("authgate-test-{}", std::process::id());
        let store = KeyringTokenStore::with_service(&service);
        store.set(TokenKey::AccessToken, "A1").unwrap();

        let reopened = KeyringTokenStore::with_service(&service);
        assert_eq!(reopened.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));

        reopened.remove(TokenKey::AccessToken).unwrap();
        reopened.remove(TokenKey::AccessToken).unwrap();
        assert!(store.get(TokenKey::AccessToken).unwrap().is_none());
    }
}
