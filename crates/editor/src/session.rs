//! Editor session - owns the scene and everything needed to draw it.

use common::error::EditorResult;
use common::geometry::Size;
use compositor::{
    Compositor, ExportError, ExportRequest, ExportedImage, Exporter, FrameRun, FrameTicket, RenderOptions,
    RenderOutcome, RenderScheduler, SchedulerStats,
};
use parking_lot::Mutex;
use render::{RasterState, ResourceCache, Surface};
use scene::{Scene, SceneStore, SourceKey};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use crate::config::EditorConfig;

/// One editing session.
///
/// Edits go through [`edit`](Self::edit), which invalidates the preview. The
/// resulting frame request is picked up by a [`PreviewLoop`](crate::PreviewLoop)
/// or by calling [`take_frame_ticket`](Self::take_frame_ticket) and
/// [`render_frame`](Self::render_frame) directly.
pub struct EditorSession {
    config: EditorConfig,
    store: SceneStore,
    resources: Arc<ResourceCache>,
    compositor: Compositor,
    exporter: Exporter,
    scheduler: RenderScheduler,
    /// Live preview surface.
    surface: Mutex<Surface>,
    /// Frame waiting to be rendered.
    pending: Mutex<Option<FrameTicket>>,
    frame_requested: Notify,
    last_outcome: Mutex<Option<RenderOutcome>>,
    shutdown: watch::Sender<bool>,
}

impl EditorSession {
    /// Create a session with a fresh resource cache.
    pub fn new(config: EditorConfig) -> EditorResult<Self> {
        let resources = ResourceCache::new().with_font_timeout(config.font_timeout);
        Self::with_resources(config, Arc::new(resources))
    }

    /// Create a session drawing from an existing resource cache.
    pub fn with_resources(config: EditorConfig, resources: Arc<ResourceCache>) -> EditorResult<Self> {
        let surface = Surface::new(config.preview_width.max(1), config.preview_height.max(1))?;
        let compositor = Compositor::new().with_checker(config.checker_style());
        let (shutdown, _) = watch::channel(false);
        info!(
            width = config.preview_width,
            height = config.preview_height,
            "editor session created"
        );
        Ok(Self {
            exporter: Exporter::new(compositor.clone()),
            compositor,
            config,
            store: SceneStore::new(),
            resources,
            scheduler: RenderScheduler::new(),
            surface: Mutex::new(surface),
            pending: Mutex::new(None),
            frame_requested: Notify::new(),
            last_outcome: Mutex::new(None),
            shutdown,
        })
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn resources(&self) -> &Arc<ResourceCache> {
        &self.resources
    }

    pub fn snapshot(&self) -> Arc<Scene> {
        self.store.snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    /// Apply edits through the scene store.
    ///
    /// If the scene changed, rasters and fonts it now references start loading, rasters
    /// it dropped are released and a preview frame is requested.
    pub fn edit<R>(&self, f: impl FnOnce(&SceneStore) -> R) -> R {
        let before = self.store.revision();
        let result = f(&self.store);
        if self.store.revision() != before {
            self.scene_changed();
        }
        result
    }

    /// Replace the scene with one read from JSON.
    pub fn load_scene_json(&self, json: &str) -> EditorResult<()> {
        let scene = Scene::from_json(json)?;
        self.load_scene(scene);
        Ok(())
    }

    pub fn load_scene(&self, scene: Scene) {
        self.edit(|store| store.load(scene));
        info!(layers = self.store.snapshot().layer_count(), "scene loaded");
    }

    /// Discard the scene and everything it loaded.
    pub fn reset(&self) {
        self.edit(|store| store.reset());
        info!("scene reset");
    }

    /// Make uploaded bytes addressable by the scene.
    pub fn register_upload(&self, bytes: impl Into<Arc<[u8]>>) -> SourceKey {
        self.resources.register_blob(bytes)
    }

    fn scene_changed(&self) {
        let scene = self.store.snapshot();
        let live = scene.referenced_sources();
        if tokio::runtime::Handle::try_current().is_ok() {
            let rasters = self.resources.prefetch(live.iter().cloned());
            let fonts = self.resources.prefetch_fonts(scene.used_fonts());
            if rasters + fonts > 0 {
                debug!(rasters, fonts, "prefetching scene resources");
            }
        }
        self.resources.release_unreferenced(&live);
        self.invalidate();
    }

    /// Request a preview frame.
    pub fn invalidate(&self) {
        if let Some(ticket) = self.scheduler.invalidate() {
            self.queue_frame(ticket);
        }
    }

    fn queue_frame(&self, ticket: FrameTicket) {
        *self.pending.lock() = Some(ticket);
        self.frame_requested.notify_one();
    }

    /// Wait until a frame is requested.
    pub async fn frame_requested(&self) {
        self.frame_requested.notified().await;
    }

    /// Take the requested frame, if any.
    pub fn take_frame_ticket(&self) -> Option<FrameTicket> {
        self.pending.lock().take()
    }

    /// Render the preview for `ticket`.
    ///
    /// A follow-up frame requested during the render is queued again.
    pub fn render_frame(&self, ticket: FrameTicket) -> FrameRun<RenderOutcome> {
        let run = self.scheduler.run_frame(ticket, || self.render_now());
        if let FrameRun::Rendered { output, follow_up } = &run {
            *self.last_outcome.lock() = Some(output.clone());
            if let Some(next) = follow_up {
                self.queue_frame(*next);
            }
        }
        run
    }

    fn render_now(&self) -> RenderOutcome {
        let scene = self.store.snapshot();
        let size = self.preview_size_for(&scene);
        let mut surface = self.surface.lock();
        let (width, height) = (size.width as u32, size.height as u32);
        if surface.width() != width || surface.height() != height {
            if let Err(err) = surface.resize_to(width, height) {
                debug!(width, height, error = %err, "keeping previous preview size");
            }
        }
        self.compositor
            .render(&scene, &self.resources, &mut surface, &RenderOptions::preview())
    }

    /// Preview size for the current scene.
    pub fn preview_size(&self) -> Size {
        self.preview_size_for(&self.store.snapshot())
    }

    /// The preview box, shrunk to the photo's aspect ratio once a photo is loaded.
    fn preview_size_for(&self, scene: &Scene) -> Size {
        let frame = self.config.preview_box();
        let photo = [scene.background_photo.as_ref(), scene.foreground_photo.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|key| match self.resources.raster_state(key) {
                RasterState::Ready(raster) => Some(Size::new(raster.width() as f32, raster.height() as f32)),
                _ => None,
            });
        match photo {
            Some(photo) if !photo.is_empty() => {
                let fitted = photo.scale(frame.fit_scale(photo));
                Size::new(fitted.width.round().max(1.0), fitted.height.round().max(1.0))
            }
            _ => Size::new(frame.width.round().max(1.0), frame.height.round().max(1.0)),
        }
    }

    pub fn last_outcome(&self) -> Option<RenderOutcome> {
        self.last_outcome.lock().clone()
    }

    /// Read the live preview surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&Surface) -> R) -> R {
        f(&self.surface.lock())
    }

    /// Render the current scene at full resolution.
    pub async fn export(&self) -> Result<ExportedImage, ExportError> {
        let scene = self.store.snapshot();
        // The preview size depends on the photo, so load it first.
        self.resources.ensure_rasters(&scene).await;
        let request = ExportRequest::new(self.preview_size_for(&scene))
            .with_sizing(self.config.export_sizing)
            .with_product(self.config.product_name.clone());
        self.exporter.export(&scene, &self.resources, &request).await
    }

    /// Export and save into the configured downloads directory.
    pub async fn export_to_downloads(&self) -> Result<PathBuf, ExportError> {
        let image = self.export().await?;
        let path = image.save_into(&self.config.downloads_dir).await?;
        info!(path = %path.display(), width = image.width, height = image.height, "export saved");
        Ok(path)
    }

    /// Stop rendering. Queued frames become stale and preview loops exit.
    pub fn teardown(&self) {
        self.scheduler.teardown();
        self.pending.lock().take();
        self.shutdown.send_replace(true);
        info!("editor session torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.scheduler.is_torn_down()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}
