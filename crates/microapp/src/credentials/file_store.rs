//! Single-machine credential store backed by one file per application.
//!
//! The file holds the raw token bytes. The expiry instant is encoded in the
//! file's modification time: after writing, the access time is set to the
//! store clock's "now" and the modification time to `expires_at`, so a plain `stat` recovers the
//! expiry without a sidecar metadata file. This only works on filesystems
//! that allow setting timestamps into the future, which covers the usual
//! local filesystems.

use std::fmt;
use std::fs::{self, File, FileTimes};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::error::StoreError;
use super::store::CredentialStore;
use super::types::{Credential, CredentialKey};

#[derive(Debug, Clone)]
enum Location {
    /// One `{app_id}.access_token` file per key inside this directory.
    Dir(PathBuf),
    /// A fixed file, whatever the key.
    File(PathBuf),
}

/// Distinguishes temporary files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-based [`CredentialStore`].
#[derive(Clone)]
pub struct FileStore {
    location: Location,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    fn with_location(location: Location) -> Self {
        Self {
            location,
            clock: Arc::new(SystemClock),
        }
    }

    /// Store tokens as `{dir}/{app_id}.access_token`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::Dir(dir.into()))
    }

    /// Store the token at exactly `path`.
    ///
    /// The caller is responsible for not pointing two applications at the
    /// same file.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    /// Clock stamped as the access time of written files.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Default directory: the user's home, else the current directory.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve the file used for `key`.
    pub fn path_for(&self, key: &CredentialKey) -> PathBuf {
        match &self.location {
            Location::Dir(dir) => dir.join(key.file_name()),
            Location::File(path) => path.clone(),
        }
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &CredentialKey) -> Result<Option<Credential>, StoreError> {
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || read_entry(&path)).await?
    }

    async fn set(&self, key: &CredentialKey, credential: &Credential) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let credential = credential.clone();
        let written_at = self.clock.now();
        tokio::task::spawn_blocking(move || write_entry(&path, &credential, written_at)).await?
    }
}

fn read_entry(path: &Path) -> Result<Option<Credential>, StoreError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let expires_at = DateTime::<Utc>::from(metadata.modified()?);

    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let token = String::from_utf8(contents)
        .map_err(|_| StoreError::Corrupt(format!("{} is not valid UTF-8", path.display())))?;
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }

    Ok(Some(Credential::new(token, expires_at)))
}

fn write_entry(
    path: &Path,
    credential: &Credential,
    written_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // Write next to the target and rename, so readers never see a partial token.
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp_path = PathBuf::from(tmp_name);

    let result = (|| -> Result<(), StoreError> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(credential.token.as_bytes())?;
        file.flush()?;
        let times = FileTimes::new()
            .set_accessed(SystemTime::from(written_at))
            .set_modified(SystemTime::from(credential.expires_at));
        file.set_times(times)?;
        drop(file);
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;

    debug!(path = %path.display(), expires_at = %credential.expires_at, "Wrote access token file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::clock::ManualClock;
    use chrono::TimeZone;

    fn credential(token: &str, expires_unix: i64) -> Credential {
        Credential::new(token, Utc.timestamp_opt(expires_unix, 0).unwrap())
    }

    #[tokio::test]
    async fn test_round_trip_preserves_token_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        let key = CredentialKey::new("app1");

        assert!(store.get(&key).await.unwrap().is_none());

        let expires = Utc::now().timestamp() + 3000;
        store.set(&key, &credential("abc", expires)).await.unwrap();

        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.token, "abc");
        assert_eq!(loaded.expires_at.timestamp(), expires);
        assert!(dir.path().join("app1.access_token").exists());
    }

    #[tokio::test]
    async fn test_read_trims_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        let key = CredentialKey::new("app1");

        store.set(&key, &credential("  abc\n", 4_000)).await.unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.token, "abc");
        assert_eq!(loaded.expires_at.timestamp(), 4_000);
    }

    #[tokio::test]
    async fn test_empty_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        let key = CredentialKey::new("app1");

        fs::write(dir.path().join(key.file_name()), b"  \n").unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apps_use_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());

        store
            .set(&CredentialKey::new("app1"), &credential("one", 4_000))
            .await
            .unwrap();
        store
            .set(&CredentialKey::new("app2"), &credential("two", 5_000))
            .await
            .unwrap();

        let one = store.get(&CredentialKey::new("app1")).await.unwrap().unwrap();
        let two = store.get(&CredentialKey::new("app2")).await.unwrap().unwrap();
        assert_eq!(one.token, "one");
        assert_eq!(two.token, "two");
    }

    #[tokio::test]
    async fn test_fixed_path_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token");
        let store = FileStore::at_path(&path);
        let key = CredentialKey::new("app1");

        store.set(&key, &credential("xyz", 4_000)).await.unwrap();
        assert_eq!(store.path_for(&key), path);
        assert_eq!(fs::read_to_string(&path).unwrap(), "xyz");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn test_access_time_comes_from_store_clock() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::at_unix(1_000));
        let store = FileStore::in_dir(dir.path()).with_clock(clock.clone());
        let key = CredentialKey::new("app1");

        store.set(&key, &credential("abc", 7_600)).await.unwrap();

        let metadata = fs::metadata(store.path_for(&key)).unwrap();
        let accessed = DateTime::<Utc>::from(metadata.accessed().unwrap());
        let modified = DateTime::<Utc>::from(metadata.modified().unwrap());
        assert_eq!(accessed.timestamp(), 1_000);
        assert_eq!(modified.timestamp(), 7_600);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = CredentialKey::new("app1");

        // Separate stores, as two clients for the same app would hold.
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = FileStore::in_dir(dir.path());
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .set(&key, &credential(&format!("token-{i}"), 4_000 + i))
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let loaded = FileStore::in_dir(dir.path()).get(&key).await.unwrap().unwrap();
        let i: i64 = loaded.token.strip_prefix("token-").unwrap().parse().unwrap();
        assert_eq!(loaded.expires_at.timestamp(), 4_000 + i);

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(key.file_name())]);
    }
}
