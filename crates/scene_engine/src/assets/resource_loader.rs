//! Resource loader service
//!
//! Relative paths are resolved against the configured search paths, in
//! order, then against the working directory. Parsed resources are shared as
//! `Arc<T>` and cached by resolved path when caching is enabled.
//!
//! Background loads only move the file read off-thread: the worker hands the
//! bytes back over a channel and [`ResourceLoader::poll`] parses them on the
//! caller's thread, so asset types never have to be built concurrently.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{Asset, AssetError};
use crate::core::config::ResourceConfig;

type Shared = Arc<dyn Any + Send + Sync>;
type ParseFn = fn(&[u8]) -> Result<Shared, AssetError>;
type Delivery = (LoadTicket, io::Result<Vec<u8>>);

fn parse_shared<T: Asset>(bytes: &[u8]) -> Result<Shared, AssetError> {
    Ok(Arc::new(T::from_bytes(bytes)?))
}

fn downcast<T: Asset>(path: &Path, shared: Shared) -> Result<Arc<T>, AssetError> {
    shared.downcast::<T>().map_err(|_| AssetError::TypeMismatch {
        path: path.display().to_string(),
        requested: type_name::<T>(),
    })
}

/// Handle of a background load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

struct PendingLoad {
    path: PathBuf,
    parse: ParseFn,
}

/// Completed background load, as returned by [`ResourceLoader::poll`]
pub struct LoadOutcome {
    /// Ticket returned when the load was started
    pub ticket: LoadTicket,
    /// Resolved path
    pub path: PathBuf,
    result: Result<Shared, AssetError>,
}

impl LoadOutcome {
    /// Whether the load produced a resource
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Take the resource as its concrete type
    pub fn take<T: Asset>(self) -> Result<Arc<T>, AssetError> {
        downcast(&self.path, self.result?)
    }
}

impl std::fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOutcome")
            .field("ticket", &self.ticket)
            .field("path", &self.path)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

/// Resource loaded on first access
#[derive(Debug)]
pub struct LazyResource<T: Asset> {
    path: String,
    cell: OnceLock<Arc<T>>,
}

impl<T: Asset> LazyResource<T> {
    /// Requested path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the resource was already loaded
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Load on first call, then return the same resource
    pub fn get(&self, loader: &ResourceLoader) -> Result<Arc<T>, AssetError> {
        if let Some(resource) = self.cell.get() {
            return Ok(Arc::clone(resource));
        }
        let resource = loader.load_eager::<T>(&self.path)?;
        Ok(Arc::clone(self.cell.get_or_init(|| resource)))
    }
}

/// Loads [`Asset`]s from disk, caching them by resolved path
pub struct ResourceLoader {
    config: ResourceConfig,
    cache: Mutex<HashMap<PathBuf, Shared>>,
    pending: Mutex<HashMap<LoadTicket, PendingLoad>>,
    next_ticket: AtomicU64,
    sender: Sender<Delivery>,
    receiver: Receiver<Delivery>,
}

impl ResourceLoader {
    /// Create a loader
    pub fn new(config: ResourceConfig) -> Self {
        let (sender, receiver) = unbounded();
        log::debug!(
            "Resource loader search paths: {:?} (caching {})",
            config.search_paths,
            if config.enable_caching { "on" } else { "off" }
        );
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            sender,
            receiver,
        }
    }

    /// Loader configuration
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Resolve a path against the search paths, then as given
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AssetError> {
        self.config
            .search_paths
            .iter()
            .map(|search_path| Path::new(search_path).join(path))
            .find(|candidate| candidate.is_file())
            .or_else(|| Some(PathBuf::from(path)).filter(|p| p.is_file()))
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    /// Load and parse now, reusing the cached resource when there is one
    pub fn load_eager<T: Asset>(&self, path: &str) -> Result<Arc<T>, AssetError> {
        let resolved = self.resolve(path)?;
        if let Some(shared) = self.cached(&resolved) {
            log::trace!("Resource cache hit: {}", resolved.display());
            return downcast(&resolved, shared);
        }

        let bytes = fs::read(&resolved)?;
        let resource = Arc::new(T::from_bytes(&bytes)?);
        if self.config.enable_caching {
            self.lock_cache().insert(resolved.clone(), Arc::clone(&resource) as Shared);
        }
        log::info!("Loaded {} from {}", type_name::<T>(), resolved.display());
        Ok(resource)
    }

    /// Defer loading until the first [`LazyResource::get`]
    pub fn load_lazy<T: Asset>(&self, path: &str) -> LazyResource<T> {
        LazyResource {
            path: path.to_string(),
            cell: OnceLock::new(),
        }
    }

    /// Parse a fresh, uncached copy
    pub fn duplicate<T: Asset>(&self, path: &str) -> Result<T, AssetError> {
        let resolved = self.resolve(path)?;
        T::from_bytes(&fs::read(&resolved)?)
    }

    /// Whether the resource behind `path` is cached
    pub fn is_cached(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|resolved| self.lock_cache().contains_key(&resolved))
    }

    /// Drop one cached resource; live `Arc`s keep their copy
    pub fn evict(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|resolved| self.lock_cache().remove(&resolved).is_some())
    }

    /// Drop every cached resource
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    /// Number of cached resources
    pub fn cached_count(&self) -> usize {
        self.lock_cache().len()
    }

    /// Start reading a file on a worker thread
    ///
    /// The path is resolved right away so a missing file fails here. The
    /// parse happens in [`ResourceLoader::poll`].
    pub fn load_background<T: Asset>(&self, path: &str) -> Result<LoadTicket, AssetError> {
        let resolved = self.resolve(path)?;
        let ticket = LoadTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        self.lock_pending().insert(
            ticket,
            PendingLoad {
                path: resolved.clone(),
                parse: parse_shared::<T>,
            },
        );

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name("resource-loader".to_string())
            .spawn(move || {
                let bytes = fs::read(&resolved);
                if sender.send((ticket, bytes)).is_err() {
                    log::debug!("Resource loader dropped before {} was read", resolved.display());
                }
            });
        if let Err(error) = spawned {
            self.lock_pending().remove(&ticket);
            return Err(error.into());
        }
        log::debug!("Background load {ticket:?} started for '{path}'");
        Ok(ticket)
    }

    /// Cancel a background load; its bytes are discarded on arrival
    pub fn cancel(&self, ticket: LoadTicket) -> bool {
        let cancelled = self.lock_pending().remove(&ticket).is_some();
        if cancelled {
            log::debug!("Background load {ticket:?} cancelled");
        }
        cancelled
    }

    /// Number of background loads not yet returned by `poll`
    pub fn pending_loads(&self) -> usize {
        self.lock_pending().len()
    }

    /// Parse every background load that finished reading
    pub fn poll(&self) -> Vec<LoadOutcome> {
        let deliveries: Vec<_> = self.receiver.try_iter().collect();
        self.complete(deliveries)
    }

    /// Like [`ResourceLoader::poll`], waiting up to `timeout` for the first delivery
    pub fn poll_timeout(&self, timeout: Duration) -> Vec<LoadOutcome> {
        let mut deliveries = Vec::new();
        if let Ok(first) = self.receiver.recv_timeout(timeout) {
            deliveries.push(first);
            deliveries.extend(self.receiver.try_iter());
        }
        self.complete(deliveries)
    }

    fn complete(&self, deliveries: Vec<Delivery>) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::with_capacity(deliveries.len());
        for (ticket, bytes) in deliveries {
            let Some(load) = self.lock_pending().remove(&ticket) else {
                log::debug!("Discarding bytes of cancelled load {ticket:?}");
                continue;
            };
            let result = bytes.map_err(AssetError::from).and_then(|bytes| (load.parse)(&bytes));
            match &result {
                Ok(shared) if self.config.enable_caching => {
                    self.lock_cache().insert(load.path.clone(), Arc::clone(shared));
                    log::info!("Loaded {} in background", load.path.display());
                }
                Ok(_) => log::info!("Loaded {} in background", load.path.display()),
                Err(error) => log::warn!("Background load of {} failed: {error}", load.path.display()),
            }
            outcomes.push(LoadOutcome {
                ticket,
                path: load.path,
                result,
            });
        }
        outcomes
    }

    fn cached(&self, resolved: &Path) -> Option<Shared> {
        if !self.config.enable_caching {
            return None;
        }
        self.lock_cache().get(resolved).cloned()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Shared>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<LoadTicket, PendingLoad>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceLoader {
    fn default() -> Self {
        Self::new(ResourceConfig::default())
    }
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("config", &self.config)
            .field("cached", &self.cached_count())
            .field("pending", &self.pending_loads())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Text(String);

    impl Asset for Text {
        fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
            String::from_utf8(bytes.to_vec())
                .map(Text)
                .map_err(|e| AssetError::InvalidData(e.to_string()))
        }
    }

    #[derive(Debug)]
    struct Length(usize);

    impl Asset for Length {
        fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
            Ok(Length(bytes.len()))
        }
    }

    fn loader_with(files: &[(&str, &[u8])]) -> (tempfile::TempDir, ResourceLoader) {
        let dir = tempfile::tempdir().unwrap();
        for (name, bytes) in files {
            fs::write(dir.path().join(name), bytes).unwrap();
        }
        let config = ResourceConfig::new().with_search_paths([dir.path().to_string_lossy().into_owned()]);
        (dir, ResourceLoader::new(config))
    }

    #[test]
    fn test_eager_load_is_cached() {
        let (_dir, loader) = loader_with(&[("hello.txt", b"hello".as_slice())]);

        let first = loader.load_eager::<Text>("hello.txt").unwrap();
        let second = loader.load_eager::<Text>("hello.txt").unwrap();
        assert_eq!(*first, Text("hello".to_string()));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.is_cached("hello.txt"));

        assert!(loader.evict("hello.txt"));
        let third = loader.load_eager::<Text>("hello.txt").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_missing_and_mistyped_resources() {
        let (_dir, loader) = loader_with(&[("hello.txt", b"hello".as_slice()), ("bad.txt", [0xff_u8, 0xfe].as_slice())]);

        assert!(matches!(loader.load_eager::<Text>("nope.txt"), Err(AssetError::NotFound(_))));
        assert!(matches!(loader.load_eager::<Text>("bad.txt"), Err(AssetError::InvalidData(_))));
        assert!(!loader.is_cached("bad.txt"));

        loader.load_eager::<Text>("hello.txt").unwrap();
        assert!(matches!(
            loader.load_eager::<Length>("hello.txt"),
            Err(AssetError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_caching_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a".as_slice()).unwrap();
        let config = ResourceConfig::new()
            .with_search_paths([dir.path().to_string_lossy().into_owned()])
            .with_caching(false);
        let loader = ResourceLoader::new(config);

        let first = loader.load_eager::<Text>("a.txt").unwrap();
        let second = loader.load_eager::<Text>("a.txt").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cached_count(), 0);
    }

    #[test]
    fn test_lazy_and_duplicate() {
        let (dir, loader) = loader_with(&[("lazy.txt", b"one".as_slice())]);

        let lazy = loader.load_lazy::<Text>("lazy.txt");
        assert!(!lazy.is_loaded());
        assert!(!loader.is_cached("lazy.txt"));

        // contents change before first access
        fs::write(dir.path().join("lazy.txt"), b"two".as_slice()).unwrap();
        assert_eq!(*lazy.get(&loader).unwrap(), Text("two".to_string()));
        assert!(lazy.is_loaded());

        let copy = loader.duplicate::<Text>("lazy.txt").unwrap();
        assert_eq!(copy, Text("two".to_string()));
        assert_eq!(loader.cached_count(), 1);
    }

    #[test]
    fn test_background_load_completes_on_poll() {
        let (_dir, loader) = loader_with(&[("bg.txt", b"background".as_slice())]);

        let ticket = loader.load_background::<Text>("bg.txt").unwrap();
        assert_eq!(loader.pending_loads(), 1);

        let outcomes = loader.poll_timeout(Duration::from_secs(5));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ticket, ticket);
        let text = outcomes.into_iter().next().unwrap().take::<Text>().unwrap();
        assert_eq!(*text, Text("background".to_string()));
        assert_eq!(loader.pending_loads(), 0);
        assert!(loader.is_cached("bg.txt"));
    }

    #[test]
    fn test_cancelled_background_load_is_discarded() {
        let (_dir, loader) = loader_with(&[("bg.txt", b"background".as_slice())]);
        assert!(matches!(loader.load_background::<Text>("nope.txt"), Err(AssetError::NotFound(_))));

        let ticket = loader.load_background::<Text>("bg.txt").unwrap();
        assert!(loader.cancel(ticket));
        assert!(!loader.cancel(ticket));

        assert!(loader.poll_timeout(Duration::from_millis(200)).is_empty());
        assert!(!loader.is_cached("bg.txt"));
    }
}
