//!
//! File backed page cache.
//!
//! One file per cached URL under the cache directory, named after the SHA-256
//! of the URL with an `.html` extension. The file holds a JSON string wrapping
//! the body between start and end markers; its modification time is the
//! freshness clock. Readers take a shared lock and writers an exclusive one,
//! so concurrent workers never observe a half written entry.
//!

use {
    crate::{Error, ErrorKind, Result},
    sha2::{Digest, Sha256},
    std::{
        fs::{self, File, OpenOptions},
        io::{self, Read, Write},
        path::{Path, PathBuf},
        time::{Duration, SystemTime},
    },
};

const START_MARKER: &str = "<!-- Cached Content Start -->\n";
const END_MARKER: &str = "\n<!-- Cached Content End :: Generated ";
const END_MARKER_TAIL: &str = " -->";

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the entry for `url`.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.dir.join(format!("{}.html", hex::encode(digest)))
    }

    ///
    /// Returns the cached body for `url` if an entry exists and is younger
    /// than `expires`.
    ///
    /// Empty or undecodable entries are reported and treated as misses so the
    /// page is rendered again and the entry rewritten. Failing to open or lock
    /// an existing entry is an error.
    ///
    pub fn get(&self, url: &str, expires: Duration) -> Result<Option<String>> {
        let path = self.path_for(url);

        let modified = match fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(url = %url, "Cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= expires {
            tracing::debug!(url = %url, age = ?age, "Cache entry is stale");
            return Ok(None);
        }

        match self.read_entry(url) {
            Ok(body) => {
                tracing::debug!(url = %url, "Cache hit");
                Ok(Some(body))
            }
            Err(e) if matches!(e.kind(), ErrorKind::CacheEmptyFile | ErrorKind::CacheCorruptFile) => {
                tracing::warn!(url = %url, error = %e, "Ignoring unusable cache entry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    ///
    /// Reads and unwraps the entry for `url` regardless of its age.
    ///
    pub fn read_entry(&self, url: &str) -> Result<String> {
        let path = self.path_for(url);

        let mut file = File::open(&path).map_err(|e| {
            Error::cache(
                ErrorKind::CacheUnableToOpen,
                format!("Cache {} can not be opened: {}", path.display(), e),
            )
        })?;

        file.lock_shared().map_err(|e| {
            Error::cache(
                ErrorKind::CacheUnableToLock,
                format!("Cache unable to lock file {}: {}", path.display(), e),
            )
        })?;

        let mut raw = String::new();
        let read = file.read_to_string(&mut raw);
        file.unlock()?;
        read?;

        if raw.is_empty() {
            return Err(Error::cache(
                ErrorKind::CacheEmptyFile,
                format!("Cache {} is empty.", path.display()),
            ));
        }

        let wrapped: String = serde_json::from_str(&raw).map_err(|e| {
            Error::cache(
                ErrorKind::CacheCorruptFile,
                format!("Cache {} can not be decoded: {}", path.display(), e),
            )
        })?;

        unwrap_markers(&wrapped).map(str::to_string).ok_or_else(|| {
            Error::cache(
                ErrorKind::CacheCorruptFile,
                format!("Cache {} has no content markers", path.display()),
            )
        })
    }

    ///
    /// Stores `content` as the entry for `url`, refreshing its timestamp.
    ///
    pub fn put(&self, url: &str, content: &str) -> Result<()> {
        let writable = fs::metadata(&self.dir)
            .map(|meta| meta.is_dir() && !meta.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return Err(Error::cache(
                ErrorKind::CacheDirNotWritable,
                format!(
                    "{} directory is either not found or not writable.",
                    self.dir.display()
                ),
            ));
        }

        let path = self.path_for(url);

        // Not truncated on open: another worker may hold a shared lock and be
        // reading the previous entry.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                Error::cache(
                    ErrorKind::CacheUnableToOpen,
                    format!("Cache {} can not be opened: {}", path.display(), e),
                )
            })?;

        file.lock().map_err(|e| {
            Error::cache(
                ErrorKind::CacheUnableToLock,
                format!("Cache unable to lock file {}: {}", path.display(), e),
            )
        })?;

        let generated = humantime::format_rfc3339_seconds(SystemTime::now());
        let wrapped = format!("{START_MARKER}{content}{END_MARKER}{generated}{END_MARKER_TAIL}");
        let written = serde_json::to_string(&wrapped)
            .map_err(Error::from)
            .and_then(|encoded| {
                file.set_len(0)?;
                file.write_all(encoded.as_bytes())?;
                file.flush()?;
                Ok(())
            });
        file.unlock()?;
        written?;

        tracing::debug!(url = %url, file = %path.display(), "Cache entry written");
        Ok(())
    }

    /// Removes the entry for `url`. Returns false when there was none.
    pub fn remove(&self, url: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(url)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn unwrap_markers(wrapped: &str) -> Option<&str> {
    let inner = wrapped.strip_prefix(START_MARKER)?;
    let end = inner.rfind(END_MARKER)?;
    inner[end..].ends_with(END_MARKER_TAIL).then(|| &inner[..end])
}
