use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

/// What the index remembers about a file's bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lowercase hex SHA-256 of the raw bytes
    pub content_hash: String,
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: i64,
    pub size: i64,
}

/// A fingerprint together with the bytes it was computed from
#[derive(Debug, Clone)]
pub struct Observed {
    pub fingerprint: Fingerprint,
    pub bytes: Vec<u8>,
}

/// Result of comparing a file on disk against its stored fingerprint
#[derive(Debug, Clone)]
pub enum Freshness {
    /// Same mtime and size; the file was not read
    Unchanged,
    /// Timestamp moved but the content hash matches
    Touched(Fingerprint),
    /// Content differs from the stored fingerprint
    Changed(Observed),
    /// No stored fingerprint
    New(Observed),
}

impl Freshness {
    pub fn needs_reindex(&self) -> bool {
        matches!(self, Freshness::Changed(_) | Freshness::New(_))
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn stat(path: &Path) -> io::Result<(i64, i64)> {
    let meta = fs::metadata(path)?;
    let mtime_ns = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok((mtime_ns, meta.len() as i64))
}

/// Read a file and fingerprint it
pub fn observe(path: &Path) -> io::Result<Observed> {
    let (mtime_ns, _) = stat(path)?;
    let bytes = fs::read(path)?;
    Ok(Observed {
        fingerprint: Fingerprint {
            content_hash: content_hash(&bytes),
            mtime_ns,
            size: bytes.len() as i64,
        },
        bytes,
    })
}

/// Two-tier freshness check: equal mtime and size short-circuit without
/// reading; otherwise the content hash decides.
pub fn check(path: &Path, stored: Option<&Fingerprint>) -> io::Result<Freshness> {
    let Some(stored) = stored else {
        return observe(path).map(Freshness::New);
    };

    let (mtime_ns, size) = stat(path)?;
    if mtime_ns == stored.mtime_ns && size == stored.size {
        return Ok(Freshness::Unchanged);
    }

    let observed = observe(path)?;
    if observed.fingerprint.content_hash == stored.content_hash {
        Ok(Freshness::Touched(observed.fingerprint))
    } else {
        Ok(Freshness::Changed(observed))
    }
}

/// True when the file's content must be re-extracted
pub fn needs_reindex(path: &Path, stored: Option<&Fingerprint>) -> io::Result<bool> {
    check(path, stored).map(|f| f.needs_reindex())
}
