//! Raster and font cache.
//!
//! Every source key gets one async once-cell. The first caller fetches and
//! decodes; concurrent callers await the same cell, later callers get the
//! stored result. Failures are terminal for their key and reported once.

use crate::error::ResourceError;
use crate::font::{load_default_font, load_system_font, GenericFamily, LoadedFont};
use crate::notify::{default_notifier, Failure, Notifier};
use crate::raster::{decode_for, RasterImage};
use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use parking_lot::RwLock;
use scene::{FontKey, Scene, SourceKey};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OnceCell};
use tracing::{debug, info};

/// Shared handle to a decoded raster.
pub type RasterHandle = Arc<RasterImage>;

/// Default time allowed for a font to load before the fallback is used.
pub const DEFAULT_FONT_TIMEOUT: Duration = Duration::from_secs(3);

const BLOB_PREFIX: &str = "blob:layerforge/";

/// Synchronous view of a raster's load state.
#[derive(Clone, Debug)]
pub enum RasterState {
    /// Never requested.
    Missing,
    /// Requested, not finished.
    Pending,
    Ready(RasterHandle),
    Failed(ResourceError),
}

/// Fetches the bytes behind a source key.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, key: &SourceKey) -> Result<Vec<u8>, ResourceError>;
}

/// Handles `data:` URLs and local files. Anything else is unsupported.
#[derive(Default)]
pub struct DefaultFetcher;

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, key: &SourceKey) -> Result<Vec<u8>, ResourceError> {
        match key.scheme().as_deref() {
            Some("data") => decode_data_url(key),
            Some("file") => read_file(key, key.as_str().trim_start_matches("file://")).await,
            None => read_file(key, key.as_str()).await,
            Some(_) => Err(ResourceError::UnsupportedSource(key.to_string())),
        }
    }
}

async fn read_file(key: &SourceKey, path: &str) -> Result<Vec<u8>, ResourceError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ResourceError::Fetch(key.to_string(), e.to_string()))
}

/// Decode `data:[<media type>][;base64],<payload>`.
fn decode_data_url(key: &SourceKey) -> Result<Vec<u8>, ResourceError> {
    let rest = &key.as_str()["data:".len()..];
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ResourceError::Fetch(key.to_string(), "malformed data URL".to_string()))?;

    if header.ends_with(";base64") {
        let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ResourceError::Fetch(key.to_string(), e.to_string()))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// In-memory bytes addressable by `blob:` keys, like object URLs for uploads.
#[derive(Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<SourceKey, Arc<[u8]>>>,
    next: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bytes: impl Into<Arc<[u8]>>) -> SourceKey {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let key = SourceKey::new(format!("{}{}", BLOB_PREFIX, n));
        self.blobs.write().insert(key.clone(), bytes.into());
        key
    }

    pub fn get(&self, key: &SourceKey) -> Option<Arc<[u8]>> {
        self.blobs.read().get(key).cloned()
    }

    /// Returns false when the key was not registered.
    pub fn revoke(&self, key: &SourceKey) -> bool {
        self.blobs.write().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved font request.
#[derive(Clone, Debug)]
pub struct FontReady {
    /// `None` only when not even a fallback font exists.
    pub font: Option<Arc<LoadedFont>>,
    /// The requested family could not be loaded and a substitute is used.
    pub substituted: bool,
}

type RasterCell = Arc<OnceCell<Result<RasterHandle, ResourceError>>>;
type FontCell = Arc<OnceCell<FontReady>>;

/// Owns every decoded raster and loaded font.
pub struct ResourceCache {
    fetcher: Arc<dyn SourceFetcher>,
    blobs: BlobStore,
    rasters: RwLock<HashMap<SourceKey, RasterCell>>,
    decodes: AtomicUsize,
    notifier: Arc<dyn Notifier>,
    /// Bumped whenever a raster or font settles.
    ready: watch::Sender<u64>,
    fonts: RwLock<HashMap<FontKey, FontCell>>,
    font_sources: RwLock<HashMap<FontKey, SourceKey>>,
    font_timeout: Duration,
    fallback: once_cell::sync::OnceCell<Option<Arc<LoadedFont>>>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(0);
        Self {
            fetcher: Arc::new(DefaultFetcher),
            blobs: BlobStore::new(),
            rasters: RwLock::new(HashMap::new()),
            decodes: AtomicUsize::new(0),
            notifier: default_notifier(),
            ready,
            fonts: RwLock::new(HashMap::new()),
            font_sources: RwLock::new(HashMap::new()),
            font_timeout: DEFAULT_FONT_TIMEOUT,
            fallback: once_cell::sync::OnceCell::new(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_font_timeout(mut self, timeout: Duration) -> Self {
        self.font_timeout = timeout;
        self
    }

    /// Use `font` instead of searching the system for a fallback.
    pub fn with_fallback_font(self, font: Option<LoadedFont>) -> Self {
        // A fresh cache has no fallback yet, so the cell is always empty here.
        let _ = self.fallback.set(font.map(Arc::new));
        self
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    // ---- rasters ----

    /// Load and decode `key`, at most once per key.
    pub async fn load_raster(&self, key: &SourceKey) -> Result<RasterHandle, ResourceError> {
        let cell = self.raster_cell(key);
        cell.get_or_init(|| self.fetch_and_decode(key)).await.clone()
    }

    /// Non-suspending lookup.
    pub fn raster_state(&self, key: &SourceKey) -> RasterState {
        match self.rasters.read().get(key).map(|cell| cell.get().cloned()) {
            None => RasterState::Missing,
            Some(None) => RasterState::Pending,
            Some(Some(Ok(handle))) => RasterState::Ready(handle),
            Some(Some(Err(err))) => RasterState::Failed(err),
        }
    }

    /// Number of decodes started.
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn cached_rasters(&self) -> usize {
        self.rasters.read().len()
    }

    /// Start loading every key that was never requested. Returns how many
    /// loads were started.
    pub fn prefetch(self: &Arc<Self>, keys: impl IntoIterator<Item = SourceKey>) -> usize {
        let mut started = 0;
        for key in keys {
            if !matches!(self.raster_state(&key), RasterState::Missing) {
                continue;
            }
            // The cell exists from here on, so the key reads as pending.
            let cell = self.raster_cell(&key);
            let cache = self.clone();
            tokio::spawn(async move {
                // Released before the task ran.
                if !cache.holds_cell(&key, &cell) {
                    return;
                }
                let _ = cell.get_or_init(|| cache.fetch_and_decode(&key)).await;
            });
            started += 1;
        }
        started
    }

    /// Await every raster the scene references.
    pub async fn ensure_rasters(&self, scene: &Scene) -> Vec<(SourceKey, Result<RasterHandle, ResourceError>)> {
        let keys: Vec<SourceKey> = scene.referenced_sources().into_iter().collect();
        let results = join_all(keys.iter().map(|key| self.load_raster(key))).await;
        keys.into_iter().zip(results).collect()
    }

    /// Drop rasters not in `live` and revoke the blobs behind them.
    pub fn release_unreferenced(&self, live: &HashSet<SourceKey>) -> usize {
        let released: Vec<SourceKey> = {
            let mut rasters = self.rasters.write();
            let dead: Vec<SourceKey> = rasters.keys().filter(|key| !live.contains(*key)).cloned().collect();
            for key in &dead {
                rasters.remove(key);
            }
            dead
        };

        let font_sources: HashSet<SourceKey> = self.font_sources.read().values().cloned().collect();
        for key in &released {
            if key.scheme().as_deref() == Some("blob") && !font_sources.contains(key) {
                self.blobs.revoke(key);
            }
        }

        if !released.is_empty() {
            debug!(released = released.len(), "released unreferenced rasters");
        }
        released.len()
    }

    pub fn register_blob(&self, bytes: impl Into<Arc<[u8]>>) -> SourceKey {
        self.blobs.register(bytes)
    }

    pub fn revoke_blob(&self, key: &SourceKey) -> bool {
        self.blobs.revoke(key)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Counter bumped every time a raster or font finishes loading.
    pub fn ready_events(&self) -> watch::Receiver<u64> {
        self.ready.subscribe()
    }

    fn holds_cell(&self, key: &SourceKey, cell: &RasterCell) -> bool {
        self.rasters.read().get(key).is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    fn raster_cell(&self, key: &SourceKey) -> RasterCell {
        if let Some(cell) = self.rasters.read().get(key) {
            return cell.clone();
        }
        self.rasters.write().entry(key.clone()).or_default().clone()
    }

    async fn fetch(&self, key: &SourceKey) -> Result<Vec<u8>, ResourceError> {
        if key.scheme().as_deref() == Some("blob") {
            return self
                .blobs
                .get(key)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(|| ResourceError::Fetch(key.to_string(), "blob was revoked".to_string()));
        }
        self.fetcher.fetch(key).await
    }

    async fn fetch_and_decode(&self, key: &SourceKey) -> Result<RasterHandle, ResourceError> {
        let result = match self.fetch(key).await {
            Ok(bytes) => {
                self.decodes.fetch_add(1, Ordering::SeqCst);
                let label = key.to_string();
                tokio::task::spawn_blocking(move || decode_for(&label, &bytes))
                    .await
                    .unwrap_or_else(|e| Err(ResourceError::Decode(key.to_string(), e.to_string())))
                    .map(Arc::new)
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(raster) => debug!(key = %key, width = raster.width(), height = raster.height(), "raster ready"),
            Err(err) => self.notifier.notify(&Failure::resource(key.as_str(), err.to_string())),
        }
        self.ready.send_modify(|n| *n += 1);
        result
    }

    // ---- fonts ----

    /// Load `family`/`weight` from `source` instead of the system.
    pub fn register_font(&self, family: &str, weight: u16, source: SourceKey) {
        let key = FontKey::new(family, weight);
        self.fonts.write().remove(&key);
        self.font_sources.write().insert(key, source);
    }

    /// Resolve a font, substituting the fallback on failure or timeout.
    pub async fn load_font(&self, family: &str, weight: u16) -> FontReady {
        let key = FontKey::new(family, weight);
        let cell = self.font_cell(&key);
        cell.get_or_init(|| self.resolve_font(key.clone())).await.clone()
    }

    /// The loaded font for `family`/`weight`, or the fallback while it is
    /// pending or when it failed.
    pub fn font(&self, family: &str, weight: u16) -> Option<Arc<LoadedFont>> {
        match self.font_state(family, weight) {
            Some(FontReady { font: Some(font), .. }) => Some(font),
            _ => self.fallback_font(),
        }
    }

    /// `None` while the font has not been resolved.
    pub fn font_state(&self, family: &str, weight: u16) -> Option<FontReady> {
        let key = FontKey::new(family, weight);
        self.fonts.read().get(&key).and_then(|cell| cell.get().cloned())
    }

    /// Start resolving every font nobody has requested yet. Returns how many
    /// loads were started.
    pub fn prefetch_fonts(self: &Arc<Self>, keys: impl IntoIterator<Item = FontKey>) -> usize {
        let mut started = 0;
        for key in keys {
            // A cell exists once a load is in flight, before it resolves.
            let cell = {
                let mut fonts = self.fonts.write();
                if fonts.contains_key(&key) {
                    continue;
                }
                fonts.entry(key.clone()).or_default().clone()
            };
            let cache = self.clone();
            tokio::spawn(async move {
                cell.get_or_init(|| cache.resolve_font(key)).await;
            });
            started += 1;
        }
        started
    }

    /// Await every font the scene's text layers use.
    pub async fn ensure_fonts(&self, scene: &Scene) -> Vec<(FontKey, FontReady)> {
        let keys: Vec<FontKey> = scene.used_fonts().into_iter().collect();
        let results = join_all(keys.iter().map(|key| self.load_font(&key.family, key.weight))).await;
        keys.into_iter().zip(results).collect()
    }

    pub fn fallback_font(&self) -> Option<Arc<LoadedFont>> {
        self.fallback
            .get_or_init(|| {
                let font = load_default_font().map(Arc::new);
                if let Some(font) = &font {
                    info!(origin = font.origin(), "fallback font loaded");
                }
                font
            })
            .clone()
    }

    fn font_cell(&self, key: &FontKey) -> FontCell {
        if let Some(cell) = self.fonts.read().get(key) {
            return cell.clone();
        }
        self.fonts.write().entry(key.clone()).or_default().clone()
    }

    async fn resolve_font(&self, key: FontKey) -> FontReady {
        let attempt = tokio::time::timeout(self.font_timeout, self.load_font_bytes(key.clone())).await;
        let loaded = match attempt {
            Ok(result) => result,
            Err(_) => Err(ResourceError::Timeout(key.to_string())),
        };

        let ready = match loaded {
            Ok((font, exact)) => {
                if !exact {
                    self.notifier.notify(&Failure::font(
                        key.to_string(),
                        format!("{} is not installed, using {}", key, font.origin()),
                    ));
                }
                FontReady {
                    font: Some(Arc::new(font)),
                    substituted: !exact,
                }
            }
            Err(err) => {
                self.notifier
                    .notify(&Failure::font(key.to_string(), format!("{}; using fallback font", err)));
                FontReady {
                    font: self.fallback_font(),
                    substituted: true,
                }
            }
        };

        self.ready.send_modify(|n| *n += 1);
        ready
    }

    /// Returns the font and whether it is the requested family.
    async fn load_font_bytes(&self, key: FontKey) -> Result<(LoadedFont, bool), ResourceError> {
        let source = self.font_sources.read().get(&key).cloned();
        match source {
            Some(source) => {
                let bytes = self.fetch(&source).await?;
                let origin = source.to_string();
                let font_key = key.clone();
                tokio::task::spawn_blocking(move || LoadedFont::from_bytes(font_key, origin, &bytes))
                    .await
                    .map_err(|e| ResourceError::FontUnavailable(format!("{}: {}", key, e)))?
                    .map(|font| (font, true))
                    .map_err(|reason| ResourceError::FontUnavailable(format!("{}: {}", key, reason)))
            }
            None => {
                let exact = GenericFamily::is_generic_name(&key.family);
                let lookup = key.clone();
                tokio::task::spawn_blocking(move || load_system_font(&lookup))
                    .await
                    .ok()
                    .flatten()
                    .map(|font| (font, exact))
                    .ok_or_else(|| ResourceError::FontUnavailable(key.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{CollectingNotifier, FailureKind};
    use crate::raster::tests::solid_png;
    use scene::{BackgroundImageLayer, Placement, TextLayer};
    use std::sync::atomic::AtomicUsize;

    /// Serves fixed bytes after a delay and counts fetches.
    struct SlowFetcher {
        bytes: HashMap<String, Vec<u8>>,
        delay: Duration,
        fetches: AtomicUsize,
    }

    impl SlowFetcher {
        fn new(delay: Duration) -> Self {
            Self {
                bytes: HashMap::new(),
                delay,
                fetches: AtomicUsize::new(0),
            }
        }

        fn with(mut self, key: &str, bytes: Vec<u8>) -> Self {
            self.bytes.insert(key.to_string(), bytes);
            self
        }
    }

    #[async_trait]
    impl SourceFetcher for SlowFetcher {
        async fn fetch(&self, key: &SourceKey) -> Result<Vec<u8>, ResourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.bytes
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| ResourceError::Fetch(key.to_string(), "not found".to_string()))
        }
    }

    fn cache_with(fetcher: SlowFetcher) -> (Arc<ResourceCache>, Arc<SlowFetcher>, Arc<CollectingNotifier>) {
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(CollectingNotifier::new());
        let cache = ResourceCache::new()
            .with_fetcher(fetcher.clone())
            .with_notifier(notifier.clone());
        (Arc::new(cache), fetcher, notifier)
    }

    #[tokio::test]
    async fn test_concurrent_loads_decode_once() {
        let fetcher = SlowFetcher::new(Duration::from_millis(20)).with("mem://photo", solid_png(4, 4, [1, 2, 3, 255]));
        let (cache, fetcher, _) = cache_with(fetcher);
        let key = SourceKey::new("mem://photo");

        assert!(matches!(cache.raster_state(&key), RasterState::Missing));
        let results = join_all((0..8).map(|_| cache.load_raster(&key))).await;
        let handles: Vec<RasterHandle> = results.into_iter().map(Result::unwrap).collect();

        assert!(handles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(cache.decode_count(), 1);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);

        let again = cache.load_raster(&key).await.unwrap();
        assert!(Arc::ptr_eq(&again, &handles[0]));
        assert_eq!(cache.decode_count(), 1);
        assert!(matches!(cache.raster_state(&key), RasterState::Ready(_)));
    }

    #[tokio::test]
    async fn test_decode_failure_is_terminal_and_reported_once() {
        let fetcher = SlowFetcher::new(Duration::ZERO).with("mem://broken", b"not an image".to_vec());
        let (cache, fetcher, notifier) = cache_with(fetcher);
        let key = SourceKey::new("mem://broken");

        assert!(matches!(cache.load_raster(&key).await, Err(ResourceError::Decode(..))));
        assert!(cache.load_raster(&key).await.is_err());
        assert!(matches!(cache.raster_state(&key), RasterState::Failed(_)));
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.count(FailureKind::Resource), 1);
    }

    #[tokio::test]
    async fn test_data_url_and_file_sources() {
        let png = solid_png(3, 2, [255, 0, 0, 255]);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        let cache = ResourceCache::new();

        let data = SourceKey::new(format!("data:image/png;base64,{}", encoded));
        assert_eq!(cache.load_raster(&data).await.unwrap().width(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, &png).unwrap();
        let file = SourceKey::new(path.display().to_string());
        assert_eq!(cache.load_raster(&file).await.unwrap().height(), 2);

        let url = SourceKey::new(format!("file://{}", path.display()));
        assert!(cache.load_raster(&url).await.is_ok());

        let remote = SourceKey::new("https://example.com/a.png");
        assert!(matches!(
            cache.load_raster(&remote).await,
            Err(ResourceError::UnsupportedSource(_))
        ));
    }

    #[tokio::test]
    async fn test_release_drops_entries_and_revokes_blobs() {
        let cache = ResourceCache::new();
        let kept = cache.register_blob(solid_png(2, 2, [0, 0, 0, 255]));
        let dropped = cache.register_blob(solid_png(2, 2, [9, 9, 9, 255]));
        cache.load_raster(&kept).await.unwrap();
        cache.load_raster(&dropped).await.unwrap();
        assert_eq!(cache.blob_count(), 2);

        let live: HashSet<SourceKey> = [kept.clone()].into_iter().collect();
        assert_eq!(cache.release_unreferenced(&live), 1);
        assert_eq!(cache.cached_rasters(), 1);
        assert_eq!(cache.blob_count(), 1);
        assert!(matches!(cache.raster_state(&dropped), RasterState::Missing));

        // A revoked blob can no longer be loaded.
        assert!(matches!(cache.load_raster(&dropped).await, Err(ResourceError::Fetch(..))));
    }

    #[tokio::test]
    async fn test_prefetch_and_ready_events() {
        let fetcher = SlowFetcher::new(Duration::from_millis(5)).with("mem://a", solid_png(1, 1, [0, 0, 0, 255]));
        let (cache, _, _) = cache_with(fetcher);
        let mut events = cache.ready_events();
        let key = SourceKey::new("mem://a");

        assert_eq!(cache.prefetch([key.clone()]), 1);
        events.changed().await.unwrap();
        assert!(matches!(cache.raster_state(&key), RasterState::Ready(_)));
        assert_eq!(cache.prefetch([key]), 0);
    }

    #[tokio::test]
    async fn test_ensure_rasters_covers_scene() {
        let fetcher = SlowFetcher::new(Duration::ZERO)
            .with("mem://bg", solid_png(2, 2, [0, 0, 0, 255]))
            .with("mem://sticker", solid_png(2, 2, [0, 0, 0, 255]));
        let (cache, _, _) = cache_with(fetcher);
        let scene = Scene {
            background_photo: Some(SourceKey::new("mem://bg")),
            background_images: vec![BackgroundImageLayer::new(
                SourceKey::new("mem://sticker"),
                30.0,
                Placement::at(50.0, 50.0),
            )],
            ..Scene::default()
        };

        let results = cache.ensure_rasters(&scene).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
    }

    #[tokio::test]
    async fn test_font_timeout_uses_fallback_and_warns_once() {
        let fetcher = SlowFetcher::new(Duration::from_secs(5)).with("mem://font", vec![0; 16]);
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(CollectingNotifier::new());
        let cache = ResourceCache::new()
            .with_fetcher(fetcher)
            .with_notifier(notifier.clone())
            .with_font_timeout(Duration::from_millis(30));
        cache.register_font("Brand", 700, SourceKey::new("mem://font"));

        let ready = cache.load_font("Brand", 700).await;
        assert!(ready.substituted);
        let again = cache.load_font("Brand", 700).await;
        assert!(again.substituted);
        assert_eq!(notifier.count(FailureKind::FontFallback), 1);
        assert!(cache.font_state("Brand", 700).is_some());
    }

    #[tokio::test]
    async fn test_prefetch_fonts_skips_resolved() {
        let fetcher = SlowFetcher::new(Duration::ZERO);
        let (cache, _, _) = cache_with(fetcher);
        cache.register_font("Brand", 400, SourceKey::new("mem://missing-font"));
        let mut events = cache.ready_events();

        assert_eq!(cache.prefetch_fonts([FontKey::new("Brand", 400)]), 1);
        events.changed().await.unwrap();
        assert!(cache.font_state("Brand", 400).is_some());
        assert_eq!(cache.prefetch_fonts([FontKey::new("Brand", 400)]), 0);
    }

    #[tokio::test]
    async fn test_prefetch_fonts_skips_loads_in_flight() {
        let fetcher = SlowFetcher::new(Duration::from_millis(50));
        let (cache, fetcher, _) = cache_with(fetcher);
        cache.register_font("Brand", 400, SourceKey::new("mem://missing-font"));
        let mut events = cache.ready_events();

        assert_eq!(cache.prefetch_fonts([FontKey::new("Brand", 400)]), 1);
        assert!(cache.font_state("Brand", 400).is_none());
        assert_eq!(cache.prefetch_fonts([FontKey::new("Brand", 400), FontKey::new("Brand", 400)]), 0);

        events.changed().await.unwrap();
        assert!(cache.font_state("Brand", 400).is_some());
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_fonts_resolves_text_fonts() {
        let cache = ResourceCache::new().with_notifier(Arc::new(CollectingNotifier::new()));
        let scene = Scene {
            texts: vec![
                TextLayer::new("Hi", "sans-serif", 24.0, common::color::Color::BLACK, Placement::at(50.0, 50.0)),
                TextLayer::new("", "Unused", 24.0, common::color::Color::BLACK, Placement::at(50.0, 50.0)),
            ],
            ..Scene::default()
        };

        let fonts = cache.ensure_fonts(&scene).await;
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].0, FontKey::new("sans-serif", 400));
        // Generic families resolve from the system without a substitution
        // warning when a system font exists.
        if fonts[0].1.font.is_some() {
            assert!(!fonts[0].1.substituted);
        }
    }
}
