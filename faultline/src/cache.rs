//! Disk caching of envelopes for offline and crash resilience.
//!
//! Every envelope is written to the cache before a delivery attempt and
//! discarded again once the collector accepted or permanently rejected it.
//! Whatever is left in the cache directory when the process dies is
//! re-submitted on the next start.

use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

use faultline_core::fault_debug;

use crate::{Client, Envelope, Hint};

/// The file extension used for cached envelopes.
const ENVELOPE_EXT: &str = "envelope";

/// Storage for envelopes awaiting delivery.
///
/// Implementations must tolerate concurrent calls from multiple transport
/// worker invocations.
pub trait EnvelopeCache: Send + Sync {
    /// Persists the envelope.
    fn store(&self, envelope: &Envelope, hint: &Hint);

    /// Removes a previously stored envelope.
    fn discard(&self, envelope: &Envelope);
}

/// A cache that persists nothing.
///
/// Used for submissions whose payload already lives in the disk cache, so
/// it is not persisted a second time.
pub struct NoopCache;

impl EnvelopeCache for NoopCache {
    fn store(&self, _envelope: &Envelope, _hint: &Hint) {}

    fn discard(&self, _envelope: &Envelope) {}
}

/// A cache holding one file per envelope in a directory.
///
/// Files are named by a hash of the serialized envelope bytes, which makes
/// store and discard line up regardless of whether the envelope was parsed
/// or read back raw from an earlier run. The directory holds at most
/// `max_items` envelopes; storing beyond that evicts the oldest files.
pub struct DiskCache {
    dir: PathBuf,
    max_items: usize,
}

impl DiskCache {
    /// Creates a cache inside the given directory, creating it if needed.
    pub fn new<P: Into<PathBuf>>(dir: P, max_items: usize) -> io::Result<DiskCache> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DiskCache { dir, max_items })
    }

    fn file_name(body: &[u8]) -> String {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        format!("{:016x}.{}", hasher.finish(), ENVELOPE_EXT)
    }

    fn path_for(&self, body: &[u8]) -> PathBuf {
        self.dir.join(Self::file_name(body))
    }

    /// Lists the cached envelope files, oldest first.
    pub fn envelope_paths(&self) -> Vec<PathBuf> {
        let mut entries = match self.cached_files() {
            Ok(entries) => entries,
            Err(err) => {
                fault_debug!("[Cache] failed to list {:?}: {}", self.dir, err);
                return Vec::new();
            }
        };
        entries.sort_by_key(|(_, mtime)| *mtime);
        entries.into_iter().map(|(path, _)| path).collect()
    }

    fn cached_files(&self) -> io::Result<Vec<(PathBuf, std::time::SystemTime)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENVELOPE_EXT) {
                continue;
            }
            let mtime = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((path, mtime));
        }
        Ok(entries)
    }

    fn make_room(&self) -> io::Result<()> {
        let mut entries = self.cached_files()?;
        if entries.len() < self.max_items {
            return Ok(());
        }
        entries.sort_by_key(|(_, mtime)| *mtime);
        let excess = entries.len() + 1 - self.max_items;
        for (path, _) in entries.into_iter().take(excess) {
            fault_debug!("[Cache] evicting oldest cached envelope {:?}", path);
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

impl EnvelopeCache for DiskCache {
    fn store(&self, envelope: &Envelope, _hint: &Hint) {
        let body = match envelope.to_vec() {
            Ok(body) => body,
            Err(err) => {
                fault_debug!("[Cache] failed to serialize envelope: {}", err);
                return;
            }
        };
        let path = self.path_for(&body);
        if path.exists() {
            return;
        }
        if let Err(err) = self.make_room() {
            fault_debug!("[Cache] failed to enforce the cache bound: {}", err);
        }
        if let Err(err) = fs::write(&path, &body) {
            fault_debug!("[Cache] failed to write {:?}: {}", path, err);
        }
    }

    fn discard(&self, envelope: &Envelope) {
        let body = match envelope.to_vec() {
            Ok(body) => body,
            Err(_) => return,
        };
        let path = self.path_for(&body);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                fault_debug!("[Cache] failed to remove {:?}: {}", path, err);
            }
        }
    }
}

/// Re-submits every envelope a previous run left in the cache.
///
/// Each file is sent raw with a from-cache hint carrying a retry flag. Once
/// the transport drained, files whose hint ended up not flagged for retry
/// are deleted; retryable ones stay for the next sweep.
///
/// Returns the number of files removed from the cache.
pub fn resend_cached_envelopes(cache: &DiskCache, client: &Client) -> usize {
    let mut submitted = Vec::new();
    for path in cache.envelope_paths() {
        match Envelope::from_path_raw(&path) {
            Ok(envelope) => {
                let hint = Hint::from_cache().with_retry();
                client.send_envelope_with_hint(envelope, hint.clone());
                submitted.push((path, hint));
            }
            Err(err) => {
                fault_debug!("[Cache] dropping unreadable cache file {:?}: {}", path, err);
                let _ = fs::remove_file(&path);
            }
        }
    }
    if submitted.is_empty() {
        return 0;
    }

    client.flush(None);

    let mut removed = 0;
    for (path, hint) in submitted {
        if !hint.wants_retry() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => removed += 1,
                Err(err) => {
                    fault_debug!("[Cache] failed to remove {:?}: {}", path, err);
                }
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{EnvelopeItem, EnvelopeItemType};

    fn envelope(marker: &str) -> Envelope {
        let mut envelope = Envelope::new();
        envelope.add_item(EnvelopeItem::from_json(
            EnvelopeItemType::Event,
            format!("{{\"message\":\"{marker}\"}}").into_bytes(),
        ));
        envelope
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("faultline-cache-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_store_discard_roundtrip() {
        let dir = temp_dir("roundtrip");
        let cache = DiskCache::new(&dir, 10).unwrap();
        let hint = Hint::new();

        let envelope = envelope("one");
        cache.store(&envelope, &hint);
        assert_eq!(cache.envelope_paths().len(), 1);

        // a raw read-back of the file maps to the same cache entry
        let raw = Envelope::from_path_raw(&cache.envelope_paths()[0]).unwrap();
        cache.discard(&raw);
        assert!(cache.envelope_paths().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_store_is_idempotent() {
        let dir = temp_dir("idempotent");
        let cache = DiskCache::new(&dir, 10).unwrap();
        let hint = Hint::new();

        let envelope = envelope("same");
        cache.store(&envelope, &hint);
        cache.store(&envelope, &hint);
        assert_eq!(cache.envelope_paths().len(), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let dir = temp_dir("eviction");
        let cache = DiskCache::new(&dir, 3).unwrap();
        let hint = Hint::new();

        for i in 0..5 {
            cache.store(&envelope(&format!("e{i}")), &hint);
        }
        assert_eq!(cache.envelope_paths().len(), 3);

        let _ = fs::remove_dir_all(&dir);
    }
}
