//! Cache storage backends
//!
//! [`DiskStorage`] keeps one gzip-compressed blob per key under a root
//! directory, at `root/<part>/<part>.gz`. File modification times are the
//! entry ages; they are compared against the injected [`Clock`] so tests
//! can move time forward.

use super::blob;
use super::key::CacheKey;
use crate::clock::SharedClock;
use crate::error::Result;
use crate::response::Response;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const EXTENSION: &str = "gz";

/// Where cached responses live
pub trait Storage: Send + Sync {
    /// The stored response, or `None` when missing, unreadable or older than `max_age`
    fn read(&self, key: &CacheKey, max_age: Option<Duration>) -> Option<Response>;

    fn write(&self, key: &CacheKey, response: &Response) -> Result<()>;

    fn iter_all_keys(&self) -> Box<dyn Iterator<Item = CacheKey> + '_>;

    /// Delete entries older than `max_age`
    fn prune(&self, max_age: Duration) -> Result<()>;
}

pub struct DiskStorage {
    root: PathBuf,
    clock: SharedClock,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>, clock: SharedClock) -> Self {
        DiskStorage {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the entry for `key`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.root.clone();
        let mut parts = key.path_parts();
        if let Some(last) = parts.last_mut() {
            last.push('.');
            last.push_str(EXTENSION);
        }
        path.extend(parts);
        path
    }

    fn age(&self, path: &Path) -> io::Result<Duration> {
        let modified = fs::metadata(path)?.modified()?;
        // A file from the future counts as brand new
        Ok(self
            .clock
            .now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    fn read_file(&self, path: &Path) -> Result<Response> {
        let mut data = Vec::new();
        GzDecoder::new(fs::File::open(path)?).read_to_end(&mut data)?;
        blob::parse(&data)
    }

    fn entry_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                // Missing root, or an entry deleted mid-walk
                Err(err) if err.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
                    None
                }
                Err(err) => {
                    log::warn!("skipping unreadable cache entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
    }

    fn key_for_path(&self, path: &Path) -> Option<CacheKey> {
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        CacheKey::from_path_parts(&parts)
    }

    /// Remove `dir` and its parents while they are empty, stopping at the root
    fn remove_empty_dirs(&self, mut dir: &Path) {
        while dir != self.root && dir.starts_with(&self.root) {
            // Fails when the directory still has entries
            if fs::remove_dir(dir).is_err() {
                return;
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => return,
            }
        }
    }
}

impl Storage for DiskStorage {
    fn read(&self, key: &CacheKey, max_age: Option<Duration>) -> Option<Response> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        if let Some(max_age) = max_age {
            match self.age(&path) {
                Ok(age) if age > max_age => return None,
                Ok(_) => {}
                Err(err) => {
                    log::error!("cannot stat cache file {}: {}", path.display(), err);
                    return None;
                }
            }
        }

        match self.read_file(&path) {
            Ok(response) => Some(response),
            Err(err) => {
                log::error!("cannot read cache file {}: {}", path.display(), err);
                None
            }
        }
    }

    fn write(&self, key: &CacheKey, response: &Response) -> Result<()> {
        let data = blob::compose(response)?;
        let path = self.path_for(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        // Write beside the target then rename, so readers never see half a file
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn iter_all_keys(&self) -> Box<dyn Iterator<Item = CacheKey> + '_> {
        Box::new(
            self.entry_paths()
                .filter_map(move |path| self.key_for_path(&path)),
        )
    }

    fn prune(&self, max_age: Duration) -> Result<()> {
        let mut dirs = BTreeSet::new();
        let mut removed = 0usize;

        let paths: Vec<PathBuf> = self.entry_paths().collect();
        for path in paths {
            if self.age(&path)? > max_age {
                fs::remove_file(&path)?;
                removed += 1;
                if let Some(parent) = path.parent() {
                    dirs.insert(parent.to_path_buf());
                }
            }
        }

        // Deepest first, so children go before their parents
        for dir in dirs.iter().rev() {
            self.remove_empty_dirs(dir);
        }

        log::debug!("pruned {} cache entries from {}", removed, self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::http::Headers;
    use crate::request::CompiledRequest;
    use std::sync::{Arc, Mutex};
    use std::time::SystemTime;

    /// A clock that only moves when told to
    struct ManualClock(Mutex<SystemTime>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            *self.0.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    fn setup() -> (tempfile::TempDir, Arc<ManualClock>, DiskStorage) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock(Mutex::new(SystemTime::now())));
        let storage = DiskStorage::new(dir.path().join("cache"), clock.clone());
        (dir, clock, storage)
    }

    fn response(body: &'static str) -> Response {
        let creq = Arc::new(CompiledRequest::new("GET", "http://example.com/"));
        Response::new(
            creq,
            200,
            Some("OK".to_string()),
            Headers::from([("Content-Type", "text/plain")]),
            body.as_bytes(),
        )
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, _clock, storage) = setup();
        let key = CacheKey::from(["abc", "defghijklmnop"]);

        assert!(storage.read(&key, None).is_none());
        storage.write(&key, &response("hello")).unwrap();

        let path = storage.path_for(&key);
        assert!(path.ends_with("abc/defghijklmnop.gz"));

        let read = storage.read(&key, None).unwrap();
        assert_eq!(read, response("hello"));
    }

    #[test]
    fn test_read_respects_max_age() {
        let (_dir, clock, storage) = setup();
        let key = CacheKey::parse("aged");
        storage.write(&key, &response("x")).unwrap();

        clock.advance(Duration::from_secs(3600));
        assert!(storage.read(&key, Some(Duration::from_secs(7200))).is_some());
        assert!(storage.read(&key, Some(Duration::from_secs(60))).is_none());
        assert!(storage.read(&key, None).is_some());
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let (_dir, _clock, storage) = setup();
        let key = CacheKey::parse("broken");
        let path = storage.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"definitely not gzip").unwrap();

        assert!(storage.read(&key, None).is_none());
    }

    #[test]
    fn test_iter_all_keys() {
        let (_dir, _clock, storage) = setup();
        let keys = [
            CacheKey::from(["a b", "c"]),
            CacheKey::parse("fixed").next_in_sequence(),
            CacheKey::parse("fixed"),
        ];
        for key in &keys {
            storage.write(key, &response("x")).unwrap();
        }

        let mut found: Vec<String> = storage.iter_all_keys().map(|k| k.unique_str()).collect();
        found.sort();
        assert_eq!(found, vec!["a%20b/c", "fixed", "fixed.1"]);
    }

    #[test]
    fn test_prune_removes_old_files_and_empty_dirs() {
        let (_dir, clock, storage) = setup();
        let old = CacheKey::from(["old", "deep", "entry"]);
        let shared_old = CacheKey::from(["mix", "a"]);
        storage.write(&old, &response("old")).unwrap();
        storage.write(&shared_old, &response("old")).unwrap();

        clock.advance(Duration::from_secs(48 * 3600));
        let fresh = CacheKey::from(["mix", "b"]);
        // Written "now": mtimes come from the real clock, so move it back in line
        storage.write(&fresh, &response("new")).unwrap();
        let fresh_path = storage.path_for(&fresh);
        let file = fs::File::options().write(true).open(&fresh_path).unwrap();
        file.set_modified(clock.now()).unwrap();

        storage.prune(Duration::from_secs(24 * 3600)).unwrap();

        assert!(!storage.path_for(&old).exists());
        assert!(!storage.root().join("old").exists());
        assert!(!storage.path_for(&shared_old).exists());
        assert!(fresh_path.exists());
        assert!(storage.root().exists());
    }
}
