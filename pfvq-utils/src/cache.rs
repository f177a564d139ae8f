//! Module to cache parsed files next to their source, addressed by the content of the source.
//!
//! The cache file of `switch.log` is called `switch.log.parsed.<token>`, where `<token>` is the
//! base64-encoded SHA-1 digest of the raw bytes of `switch.log` (with `/` replaced by `-`). Any
//! change to the source therefore produces a different cache file name. An existing cache file
//! with the matching name is trusted and never re-validated.
//!
//! Two processes parsing the same uncached source at the same time will both write the same
//! cache path. Each writes its own temporary file and renames it into place, so the last writer
//! wins and the cache file is never a mix of both.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Serialize};
use sha1::{Digest, Sha1};

/// Infix between the source file name and the digest token.
pub const CACHE_INFIX: &str = "parsed";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
}

/// Compute the file-name compatible digest token of some content.
pub fn digest_token(contents: &[u8]) -> String {
    let digest = Sha1::digest(contents);
    STANDARD.encode(digest).replace('/', "-")
}

/// Derive the cache path for `source` with the given digest token.
pub fn cache_path(source: impl AsRef<Path>, token: &str) -> PathBuf {
    let mut name = source.as_ref().as_os_str().to_os_string();
    name.push(format!(".{CACHE_INFIX}.{token}"));
    PathBuf::from(name)
}

/// A source file that was read into memory, together with the location of its cache.
#[derive(Debug, Clone)]
pub struct CachedSource {
    source: PathBuf,
    contents: Vec<u8>,
    cache_path: PathBuf,
}

impl CachedSource {
    /// Read the entire `source` and derive its cache path.
    pub fn open(source: impl AsRef<Path>) -> Result<Self, CacheError> {
        let source = source.as_ref().to_path_buf();
        let contents = fs::read(&source)?;
        let cache_path = cache_path(&source, &digest_token(&contents));
        Ok(Self {
            source,
            contents,
            cache_path,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Raw bytes of the source file.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Whether a cache file for exactly this content already exists.
    pub fn is_cached(&self) -> bool {
        self.cache_path.exists()
    }

    /// Load all records from the cache file.
    pub fn load<R: DeserializeOwned>(&self) -> Result<Vec<R>, CacheError> {
        log::trace!("Loading cache {:?}", self.cache_path);
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.cache_path)?;
        let records = csv.deserialize().collect::<Result<Vec<R>, _>>()?;
        Ok(records)
    }

    /// Write all records to the cache file, replacing whatever was there.
    ///
    /// The records are written to a temporary sibling first and then renamed into place, so the
    /// cache path only ever holds a complete file. If writing fails, no cache file is created.
    pub fn store<R: Serialize>(&self, records: &[R]) -> Result<(), CacheError> {
        let mut tmp_name = self.cache_path.as_os_str().to_os_string();
        tmp_name.push(format!(".tmp.{}", std::process::id()));
        let tmp_path = PathBuf::from(tmp_name);

        log::trace!("Writing cache {:?} via {:?}", self.cache_path, tmp_path);
        if let Err(e) = write_records(&tmp_path, records) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &self.cache_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::from(e)
        })
    }
}

fn write_records<R: Serialize>(path: &Path, records: &[R]) -> Result<(), CacheError> {
    let mut csv = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(())
}
