//! Bounded, content-addressed state cache.
//!
//! Snapshots are written once per put to
//! `<cache_dir>/<key-hash>-<content-hash>-<pid>-<seq>.tfstate` and never
//! modified in place. Every put owns its file, so a put never unlinks a
//! file another in-flight put is about to publish. A single read-write lock guards the entry
//! index; serialization and file writes happen outside it, and the only
//! I/O performed under it is unlinking files.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::diff::StateDiff;
use crate::error::{StateError, StateResult};
use crate::model::{State, StateOutput, StateResource};

const SNAPSHOT_EXTENSION: &str = "tfstate";

static PUT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Metadata attached to a cache entry.
pub type Metadata = BTreeMap<String, String>;

struct CacheEntry {
    path: PathBuf,
    size: u64,
    hash: String,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    ttl: Duration,
    metadata: Metadata,
    state: Option<Arc<State>>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > self.ttl
    }
}

/// Read-only view of a cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub metadata: Metadata,
    pub in_memory: bool,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_memory: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Index {
    entries: HashMap<String, CacheEntry>,
    current_size: u64,
}

impl Index {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(entry.size);
        Some(entry)
    }

    /// Pick least recently accessed entries, other than `key`, whose removal
    /// makes room for `size` bytes replacing whatever `key` holds now.
    fn eviction_victims(&self, key: &str, size: u64, max: u64) -> StateResult<Vec<String>> {
        let old_size = self.entries.get(key).map(|e| e.size).unwrap_or(0);
        let mut projected = self.current_size.saturating_sub(old_size) + size;
        if projected <= max {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(DateTime<Utc>, &String, u64)> = self
            .entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, e)| (e.last_accessed, k, e.size))
            .collect();
        candidates.sort();

        let mut victims = Vec::new();
        for (_, k, entry_size) in candidates {
            if projected <= max {
                break;
            }
            projected -= entry_size;
            victims.push(k.clone());
        }

        if projected > max {
            return Err(StateError::CapacityExceeded {
                required: size,
                available: max.saturating_sub(projected - size),
            });
        }
        Ok(victims)
    }
}

/// Size- and TTL-bounded cache of provisioning state snapshots.
///
/// Safe to share across threads behind an `Arc`.
pub struct StateCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    index: RwLock<Index>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StateCache {
    /// Open a cache, creating its directory if needed.
    pub fn new(config: CacheConfig) -> StateResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> StateResult<Self> {
        fs::create_dir_all(&config.cache_dir)?;
        debug!(dir = %config.cache_dir.display(), "Opened state cache");
        Ok(Self {
            config,
            clock,
            index: RwLock::new(Index::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store `state` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, state: &State, metadata: Metadata) -> StateResult<()> {
        let data = state.to_vec()?;
        let size = data.len() as u64;
        let max = self.config.max_size_bytes;

        if size > max {
            return Err(StateError::CapacityExceeded {
                required: size,
                available: max,
            });
        }

        let hash = hex::encode(Sha256::digest(&data));
        let path = self.snapshot_path(key, &hash, PUT_SEQ.fetch_add(1, Ordering::Relaxed));
        write_atomic(&path, &data)?;

        let now = self.clock.now();
        let mut index = self.index.write();

        let victims = match index.eviction_victims(key, size, max) {
            Ok(victims) => victims,
            Err(e) => {
                remove_file_quietly(&path);
                return Err(e);
            }
        };

        for victim in victims {
            if let Some(evicted) = index.remove(&victim) {
                debug!(key = %victim, size = evicted.size, "Evicted cache entry");
                remove_file_quietly(&evicted.path);
            }
        }

        if let Some(old) = index.remove(key) {
            remove_file_quietly(&old.path);
        }

        let in_memory = self.config.keep_in_memory.then(|| Arc::new(state.clone()));
        index.entries.insert(
            key.to_string(),
            CacheEntry {
                path,
                size,
                hash,
                created_at: now,
                last_accessed: now,
                ttl: self.config.ttl(),
                metadata,
                state: in_memory,
            },
        );
        index.current_size += size;

        debug!(key, size, total = index.current_size, "Stored state snapshot");
        Ok(())
    }

    /// Fetch the state stored under `key`.
    ///
    /// Expired entries are removed and reported as a miss. States dropped
    /// from memory are reloaded from their snapshot file.
    pub fn get(&self, key: &str) -> StateResult<Arc<State>> {
        let path = {
            let mut index = self.index.write();
            match self.touch(&mut index, key) {
                Some(entry) => match &entry.state {
                    Some(state) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(state.clone());
                    }
                    None => entry.path.clone(),
                },
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Err(StateError::NotFound(key.to_string()));
                }
            }
        };

        let state = Arc::new(self.load_snapshot(key, &path)?);
        if self.config.keep_in_memory {
            if let Some(entry) = self.index.write().entries.get_mut(key) {
                if entry.path == path {
                    entry.state = Some(state.clone());
                }
            }
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(state)
    }

    /// Whether a live entry exists for `key`. Does not count as an access.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.index
            .read()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> StateResult<bool> {
        let mut index = self.index.write();
        match index.remove(key) {
            Some(entry) => {
                remove_snapshot(&entry.path)?;
                debug!(key, "Deleted cache entry");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> StateResult<usize> {
        let mut index = self.index.write();
        let entries: Vec<CacheEntry> = index.entries.drain().map(|(_, e)| e).collect();
        index.current_size = 0;

        let count = entries.len();
        let mut first_error = None;
        for entry in entries {
            if let Err(e) = remove_snapshot(&entry.path) {
                first_error.get_or_insert(e);
            }
        }
        debug!(count, "Cleared state cache");
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Reload `key` from its snapshot file, replacing the in-memory copy.
    pub fn refresh(&self, key: &str) -> StateResult<Arc<State>> {
        let path = {
            let mut index = self.index.write();
            match self.touch(&mut index, key) {
                Some(entry) => entry.path.clone(),
                None => return Err(StateError::NotFound(key.to_string())),
            }
        };

        let state = Arc::new(self.load_snapshot(key, &path)?);
        if let Some(entry) = self.index.write().entries.get_mut(key) {
            if entry.path == path && self.config.keep_in_memory {
                entry.state = Some(state.clone());
            }
        }
        Ok(state)
    }

    /// Drop the in-memory copy of `key`, keeping the snapshot file.
    pub fn evict_from_memory(&self, key: &str) -> bool {
        self.index
            .write()
            .entries
            .get_mut(key)
            .and_then(|e| e.state.take())
            .is_some()
    }

    pub fn metadata(&self, key: &str) -> StateResult<Metadata> {
        let mut index = self.index.write();
        self.touch(&mut index, key)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }

    pub fn set_metadata(
        &self,
        key: &str,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> StateResult<()> {
        let mut index = self.index.write();
        let entry = self
            .touch(&mut index, key)
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;
        entry.metadata.insert(name.into(), value.into());
        Ok(())
    }

    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let now = self.clock.now();
        let index = self.index.read();
        index
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| info_for(key, e))
    }

    /// Live entries sorted by key.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let now = self.clock.now();
        let index = self.index.read();
        let mut infos: Vec<EntryInfo> = index
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, e)| info_for(k, e))
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.index.read();
        CacheStats {
            entries: index.entries.len(),
            in_memory: index.entries.values().filter(|e| e.state.is_some()).count(),
            total_size_bytes: index.current_size,
            max_size_bytes: self.config.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn resource_by_address(&self, key: &str, address: &str) -> StateResult<StateResource> {
        self.get(key)?
            .resource(address)
            .cloned()
            .ok_or_else(|| StateError::ResourceNotFound(address.to_string()))
    }

    pub fn output_by_name(&self, key: &str, name: &str) -> StateResult<StateOutput> {
        self.get(key)?
            .output(name)
            .cloned()
            .ok_or_else(|| StateError::OutputNotFound(name.to_string()))
    }

    /// Compare the states under two keys. Added means present under `key_b` only.
    pub fn compare(&self, key_a: &str, key_b: &str) -> StateResult<StateDiff> {
        let a = self.get(key_a)?;
        let b = self.get(key_b)?;
        Ok(StateDiff::between(key_a, &a, key_b, &b))
    }

    /// Merge the states under `keys` into `target`.
    ///
    /// The first key is the base. Each later state appends its resources,
    /// overlays its outputs and raises the serial to the highest seen.
    pub fn merge<S: AsRef<str>>(&self, keys: &[S], target: &str) -> StateResult<Arc<State>> {
        let (first, rest) = keys.split_first().ok_or(StateError::EmptyMerge)?;

        let mut merged = (*self.get(first.as_ref())?).clone();
        for key in rest {
            let other = self.get(key.as_ref())?;
            merged.resources.extend(other.resources.iter().cloned());
            for (name, output) in &other.outputs {
                merged.outputs.insert(name.clone(), output.clone());
            }
            merged.serial = merged.serial.max(other.serial);
        }

        let sources: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
        let mut metadata = Metadata::new();
        metadata.insert("merged_from".to_string(), sources.join(","));

        self.put(target, &merged, metadata)?;
        info!(target, sources = sources.len(), "Merged states");
        Ok(Arc::new(merged))
    }

    /// Parse, validate and store a state document.
    pub fn import<R: Read>(&self, key: &str, mut reader: R) -> StateResult<Arc<State>> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let state = State::from_slice(&data)
            .map_err(|e| StateError::Invalid(format!("failed to parse state: {}", e)))?;
        state.validate()?;

        let mut metadata = Metadata::new();
        metadata.insert("origin".to_string(), "import".to_string());
        self.put(key, &state, metadata)?;
        Ok(Arc::new(state))
    }

    pub fn import_file(&self, key: &str, path: impl AsRef<Path>) -> StateResult<Arc<State>> {
        self.import(key, fs::File::open(path)?)
    }

    /// Write the state under `key` as indented JSON.
    pub fn export<W: Write>(&self, key: &str, mut writer: W) -> StateResult<()> {
        let state = self.get(key)?;
        writer.write_all(state.to_pretty_json()?.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn export_file(&self, key: &str, path: impl AsRef<Path>) -> StateResult<()> {
        let file = fs::File::create(path)?;
        self.export(key, io::BufWriter::new(file))
    }

    /// Copy the raw snapshot bytes for `key` into `writer`.
    pub fn stream<W: Write>(&self, key: &str, writer: &mut W) -> StateResult<u64> {
        let path = {
            let mut index = self.index.write();
            match self.touch(&mut index, key) {
                Some(entry) => entry.path.clone(),
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Err(StateError::NotFound(key.to_string()));
                }
            }
        };

        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.forget_if_path(key, &path);
                return Err(StateError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(io::copy(&mut file, writer)?)
    }

    /// Structurally validate the state under `key`.
    pub fn validate(&self, key: &str) -> StateResult<()> {
        self.get(key)?.validate()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut index = self.index.write();
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = index.remove(key) {
                remove_file_quietly(&entry.path);
            }
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), remaining = index.entries.len(), "Expired cache entries removed");
        }
        expired.len()
    }

    /// Start the periodic expiry sweep on the current tokio runtime.
    ///
    /// Cancel the returned token to stop it.
    pub fn spawn_cleanup(self: &Arc<Self>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            cache.run_cleanup_loop(token).await;
        });

        cancel
    }

    async fn run_cleanup_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.cleanup_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!(
            interval_secs = self.config.cleanup_interval().as_secs(),
            "Cache cleanup task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cache cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.cleanup_expired();
                }
            }
        }
    }

    /// Delete snapshot and temporary files in the cache directory that no
    /// entry refers to, such as those left behind by an earlier process.
    ///
    /// Meant to run at startup, before concurrent puts begin.
    pub fn purge_orphans(&self) -> StateResult<usize> {
        let known: Vec<PathBuf> = self
            .index
            .read()
            .entries
            .values()
            .map(|e| e.path.clone())
            .collect();

        let mut removed = 0;
        for entry in WalkDir::new(&self.config.cache_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            let is_ours = name.ends_with(".tmp")
                || path.extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION);
            if !is_ours || known.iter().any(|k| k == path) {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed > 0 {
            info!(removed, "Purged orphaned snapshot files");
        }
        Ok(removed)
    }

    /// Look up a live entry and mark it accessed. Expired entries are removed.
    fn touch<'a>(&self, index: &'a mut Index, key: &str) -> Option<&'a mut CacheEntry> {
        let now = self.clock.now();
        if index.entries.get(key)?.is_expired(now) {
            if let Some(entry) = index.remove(key) {
                debug!(key, "Cache entry expired");
                remove_file_quietly(&entry.path);
            }
            return None;
        }
        let entry = index.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry)
    }

    fn load_snapshot(&self, key: &str, path: &Path) -> StateResult<State> {
        match fs::read(path) {
            Ok(data) => State::from_slice(&data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(key, path = %path.display(), "Snapshot file missing, dropping entry");
                self.forget_if_path(key, path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Err(StateError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn forget_if_path(&self, key: &str, path: &Path) {
        let mut index = self.index.write();
        if index.entries.get(key).is_some_and(|e| e.path == path) {
            index.remove(key);
        }
    }

    fn snapshot_path(&self, key: &str, content_hash: &str, seq: u64) -> PathBuf {
        let key_hash = hex::encode(Sha256::digest(key.as_bytes()));
        self.config.cache_dir.join(format!(
            "{}-{}-{}-{}.{}",
            &key_hash[..12],
            &content_hash[..16],
            std::process::id(),
            seq,
            SNAPSHOT_EXTENSION
        ))
    }
}

fn info_for(key: &str, entry: &CacheEntry) -> EntryInfo {
    EntryInfo {
        key: key.to_string(),
        path: entry.path.clone(),
        size: entry.size,
        hash: entry.hash.clone(),
        created_at: entry.created_at,
        last_accessed: entry.last_accessed,
        metadata: entry.metadata.clone(),
        in_memory: entry.state.is_some(),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", SNAPSHOT_EXTENSION));

    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn remove_snapshot(path: &Path) -> StateResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove snapshot file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn state(serial: u64) -> State {
        State::new("1.6.2", "lineage-1")
            .with_serial(serial)
            .with_resource(StateResource::new("aws_vpc", "main").with_provider("aws"))
            .with_output("vpc_id", StateOutput::new(json!("vpc-123")))
    }

    fn cache(dir: &TempDir, clock: &ManualClock) -> StateCache {
        StateCache::with_clock(CacheConfig::new(dir.path()), Arc::new(clock.clone())).unwrap()
    }

    #[test]
    fn test_eviction_victims_oldest_first() {
        let now = Utc::now();
        let mut index = Index::default();
        for (key, age) in [("a", 10), ("b", 5), ("c", 1)] {
            index.entries.insert(
                key.to_string(),
                CacheEntry {
                    path: PathBuf::from(key),
                    size: 10,
                    hash: String::new(),
                    created_at: now,
                    last_accessed: now - Duration::seconds(age),
                    ttl: Duration::hours(1),
                    metadata: Metadata::new(),
                    state: None,
                },
            );
            index.current_size += 10;
        }

        assert!(index.eviction_victims("d", 10, 40).unwrap().is_empty());
        assert_eq!(index.eviction_victims("d", 10, 30).unwrap(), vec!["a"]);
        assert_eq!(index.eviction_victims("d", 20, 30).unwrap(), vec!["a", "b"]);
        assert_eq!(index.eviction_victims("d", 30, 30).unwrap(), vec!["a", "b", "c"]);
        // Replacing an entry does not count its old size.
        assert!(index.eviction_victims("a", 10, 30).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_filename_layout() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &ManualClock::default());

        cache.put("dev", &state(1), Metadata::new()).unwrap();
        let info = cache.entry_info("dev").unwrap();
        let name = info.path.file_name().unwrap().to_string_lossy().to_string();

        let stem = name.strip_suffix(".tfstate").unwrap();
        let parts: Vec<&str> = stem.split('-').collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), 12);
        assert!(info.hash.starts_with(parts[1]));
        assert_eq!(parts[2], std::process::id().to_string());
    }

    #[test]
    fn test_replacing_removes_old_file() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &ManualClock::default());

        cache.put("dev", &state(1), Metadata::new()).unwrap();
        let first = cache.entry_info("dev").unwrap().path;
        cache.put("dev", &state(2), Metadata::new()).unwrap();
        let second = cache.entry_info("dev").unwrap().path;

        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_same_content_gets_fresh_file() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &ManualClock::default());

        cache.put("dev", &state(1), Metadata::new()).unwrap();
        let first = cache.entry_info("dev").unwrap();
        cache.put("dev", &state(1), Metadata::new()).unwrap();
        let second = cache.entry_info("dev").unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(first.hash, second.hash);
        assert!(!first.path.exists());
        assert!(second.path.exists());
        assert_eq!(cache.stats().total_size_bytes, second.size);
    }

    #[test]
    fn test_lazy_reload_after_memory_eviction() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &ManualClock::default());

        cache.put("dev", &state(4), Metadata::new()).unwrap();
        assert!(cache.evict_from_memory("dev"));
        assert_eq!(cache.stats().in_memory, 0);

        let loaded = cache.get("dev").unwrap();
        assert_eq!(*loaded, state(4));
        assert_eq!(cache.stats().in_memory, 1);
    }

    #[test]
    fn test_missing_file_becomes_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, &ManualClock::default());

        cache.put("dev", &state(1), Metadata::new()).unwrap();
        cache.evict_from_memory("dev");
        fs::remove_file(cache.entry_info("dev").unwrap().path).unwrap();

        assert!(cache.get("dev").unwrap_err().is_miss());
        assert!(!cache.contains("dev"));
    }

    #[test]
    fn test_get_updates_last_accessed() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::default();
        let cache = cache(&dir, &clock);

        cache.put("dev", &state(1), Metadata::new()).unwrap();
        let before = cache.entry_info("dev").unwrap().last_accessed;
        clock.advance_secs(30);
        cache.get("dev").unwrap();

        let after = cache.entry_info("dev").unwrap().last_accessed;
        assert_eq!(after - before, Duration::seconds(30));
    }
}
