//! Where a client keeps its session between runs.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use tokio::sync::Mutex;
use wheelhouse_auth::find_cookie;

use crate::error::{Result, SessionError};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const GUEST_USER_KEY: &str = "guestUser";

/// Async key-value store for session material.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-process map. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self
            .entries
            .read()
            .map_err(|_| SessionError::Store("memory store poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| SessionError::Store("memory store poisoned".to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self
            .entries
            .write()
            .map_err(|_| SessionError::Store("memory store poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// OS keychain (macOS Keychain, Windows Credential Manager, Secret Service).
///
/// An entry that exists but cannot be read is deleted and reported as absent, so a
/// corrupted credential never wedges the client.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
    // One entry per key for the life of the store; some credential backends keep
    // their state on the entry itself.
    entries: Arc<RwLock<BTreeMap<String, Arc<keyring::Entry>>>>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Arc::default(),
        }
    }

    fn entry(&self, key: &str) -> Result<Arc<keyring::Entry>> {
        let poisoned = || SessionError::Store("keychain entry cache poisoned".to_string());
        if let Some(entry) = self.entries.read().map_err(|_| poisoned())?.get(key) {
            return Ok(Arc::clone(entry));
        }
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if let Some(entry) = entries.get(key) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(
            keyring::Entry::new(&self.service, key)
                .map_err(|e| SessionError::Store(format!("keychain error: {e}")))?,
        );
        entries.insert(key.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&keyring::Entry) -> Result<T> + Send + 'static,
    {
        let entry = self.entry(key)?;
        tokio::task::spawn_blocking(move || op(&entry))
            .await
            .map_err(|e| SessionError::Store(format!("keychain task failed: {e}")))?
    }
}

#[async_trait]
impl SessionStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let name = key.to_string();
        self.with_entry(key, move |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => {
                tracing::warn!(key = %name, error = %err, "unreadable keychain entry, removing it");
                if let Err(err) = entry.delete_credential() {
                    tracing::warn!(key = %name, error = %err, "failed to remove keychain entry");
                }
                Ok(None)
            }
        })
        .await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        let name = key.to_string();
        self.with_entry(key, move |entry| {
            entry
                .set_password(&value)
                .map_err(|e| SessionError::Store(format!("failed to store '{name}' in keychain: {e}")))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let name = key.to_string();
        self.with_entry(key, move |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Store(format!("failed to delete '{name}': {e}"))),
        })
        .await
    }
}

/// Plain JSON map on disk, for non-secret local state such as the guest marker.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(SessionError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt local store, resetting it");
                self.remove_file().await?;
                Ok(BTreeMap::new())
            }
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if map.is_empty() {
            return self.remove_file().await;
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SessionError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| SessionError::Store(format!("failed to write {}: {e}", self.path.display())))
    }

    async fn remove_file(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Store(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map().await?.remove(key))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

/// Web view of the session: the cookies the server set in the HTTP client's jar.
///
/// Writes are no-ops. The server owns these cookies through `Set-Cookie`.
#[derive(Debug, Clone)]
pub struct CookieJarStore {
    jar: Arc<Jar>,
    urls: Vec<Url>,
}

impl CookieJarStore {
    /// `paths` are the cookie paths to look under, e.g. `/` and `/auth/refresh`.
    pub fn new(jar: Arc<Jar>, server_url: &Url, paths: &[&str]) -> Self {
        let urls = paths
            .iter()
            .filter_map(|path| server_url.join(path).ok())
            .collect();
        Self { jar, urls }
    }
}

#[async_trait]
impl SessionStore for CookieJarStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.urls.iter().find_map(|url| {
            let header = self.jar.cookies(url)?;
            let header = header.to_str().ok()?;
            find_cookie(header, key).map(|cookie| cookie.value)
        }))
    }

    async fn save(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("wheelhouse-store-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn keyring_store_keeps_what_it_saved() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringStore::new(format!("wheelhouse-test-{}", uuid::Uuid::new_v4()));

        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        store.save(ACCESS_TOKEN_KEY, "tok").await.unwrap();
        store.save(REFRESH_TOKEN_KEY, "ref").await.unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("tok"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(), Some("ref"));

        let clone = store.clone();
        assert_eq!(clone.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("tok"));

        store.delete(ACCESS_TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        store.delete(ACCESS_TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(REFRESH_TOKEN_KEY).await.unwrap().as_deref(), Some("ref"));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::default();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        store.save(ACCESS_TOKEN_KEY, "a").await.unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("a"));
        store.delete(ACCESS_TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let path = temp_path("local.json");
        FileStore::new(&path).save(GUEST_USER_KEY, "{\"id\":\"g\"}").await.unwrap();
        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get(GUEST_USER_KEY).await.unwrap().as_deref(),
            Some("{\"id\":\"g\"}")
        );
        reopened.delete(GUEST_USER_KEY).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn corrupt_file_heals_to_empty() {
        let path = temp_path("local.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let store = FileStore::new(&path);
        assert_eq!(store.get(GUEST_USER_KEY).await.unwrap(), None);
        assert!(!path.exists());
        store.save(GUEST_USER_KEY, "x").await.unwrap();
        assert_eq!(store.get(GUEST_USER_KEY).await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn cookie_jar_store_reads_path_scoped_cookies() {
        let jar = Arc::new(Jar::default());
        let base = Url::parse("http://127.0.0.1:8081/").unwrap();
        jar.add_cookie_str("access_token=acc; Path=/", &base);
        jar.add_cookie_str(
            "refresh_token=ref; Path=/auth/refresh",
            &base.join("/auth/refresh").unwrap(),
        );

        let store = CookieJarStore::new(jar, &base, &["/", "/auth/refresh"]);
        assert_eq!(store.get("access_token").await.unwrap().as_deref(), Some("acc"));
        assert_eq!(store.get("refresh_token").await.unwrap().as_deref(), Some("ref"));

        store.delete("access_token").await.unwrap();
        assert_eq!(store.get("access_token").await.unwrap().as_deref(), Some("acc"));
    }
}
