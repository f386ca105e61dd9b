use super::*;
use fxhash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::*;

pub const DEFAULT_CACHE_DIR: &str = ".mimir";

const CACHE_FILE_NAME: &str = "cache.txt";

/// The SignatureCache remembers, per target name, the signature that last
/// built successfully. It is the single source of truth for staleness during
/// a build and is persisted as a small text file under the cache directory.
///
/// Cache I/O never fails a build: a missing or unreadable file simply reads
/// as "no prior cache", which makes everything stale.
///
#[derive(Debug)]
pub struct SignatureCache {
    cache_dir: PathBuf,
    cache_file: PathBuf,
    signatures: RwLock<FxHashMap<String, Signature>>,
}

impl SignatureCache {
    #[tracing::instrument(name = "SignatureCache::new")]
    pub fn new(cache_dir: impl Into<PathBuf> + std::fmt::Debug) -> SignatureCache {
        let cache_dir = cache_dir.into();
        let cache_file = cache_dir.join(CACHE_FILE_NAME);
        let cache = SignatureCache {
            cache_dir,
            cache_file,
            signatures: RwLock::new(FxHashMap::default()),
        };
        cache.ensure_cache_dir();
        cache
    }

    fn ensure_cache_dir(&self) -> bool {
        std::fs::create_dir_all(&self.cache_dir).is_ok()
    }

    /// Replaces the in-memory map with the contents of the cache file.
    /// Returns false when the file is absent or unreadable.
    pub fn load(&self) -> bool {
        let contents = match std::fs::read_to_string(&self.cache_file) {
            Ok(contents) => contents,
            Err(err) => {
                debug!("No usable cache at {:?}: {:?}", self.cache_file, err);
                return false;
            }
        };

        let mut signatures = self.signatures.write().unwrap();
        signatures.clear();
        for line in contents.lines() {
            // Lines without a separator are tolerated and skipped.
            if let Some((name, signature)) = line.split_once('=') {
                signatures.insert(name.to_string(), signature.to_string());
            }
        }
        debug!("Loaded {} cached signatures", signatures.len());
        true
    }

    /// Writes every entry out as `name=signature` lines. The file is
    /// replaced atomically so a crashed save never leaves a torn cache.
    /// Returns false on I/O failure.
    pub fn save(&self) -> bool {
        if !self.ensure_cache_dir() {
            return false;
        }

        let signatures = self.signatures.read().unwrap();
        let mut contents = String::new();
        for (name, signature) in signatures.iter() {
            contents.push_str(name);
            contents.push('=');
            contents.push_str(signature);
            contents.push('\n');
        }

        let staging = self.cache_dir.join(format!("{}.tmp", CACHE_FILE_NAME));
        if let Err(err) = std::fs::write(&staging, contents) {
            warn!("Could not stage cache file {:?}: {:?}", staging, err);
            return false;
        }
        std::fs::rename(&staging, &self.cache_file).is_ok()
    }

    /// The stored signature, or the empty string when the target is unknown.
    pub fn get_signature(&self, target_name: &str) -> Signature {
        self.find_signature(target_name).unwrap_or_default()
    }

    /// Like `get_signature`, but keeps "absent" distinguishable from an
    /// empty-but-present entry.
    pub fn find_signature(&self, target_name: &str) -> Option<Signature> {
        self.signatures.read().unwrap().get(target_name).cloned()
    }

    pub fn set_signature(&self, target_name: impl Into<String>, signature: impl Into<Signature>) {
        self.signatures
            .write()
            .unwrap()
            .insert(target_name.into(), signature.into());
    }

    /// A target needs rebuilding when it has no entry, or when its entry
    /// differs from the signature computed for this run.
    pub fn needs_rebuild(&self, target_name: &str, current_signature: &str) -> bool {
        match self.signatures.read().unwrap().get(target_name) {
            Some(stored) => stored != current_signature,
            None => true,
        }
    }

    pub fn remove_signature(&self, target_name: &str) -> bool {
        self.signatures.write().unwrap().remove(target_name).is_some()
    }

    pub fn clear(&self) {
        self.signatures.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.signatures.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.read().unwrap().is_empty()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }
}

impl Default for SignatureCache {
    fn default() -> SignatureCache {
        SignatureCache::new(DEFAULT_CACHE_DIR)
    }
}
