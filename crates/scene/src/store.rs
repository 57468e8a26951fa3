//! Copy-on-write scene store.

use crate::model::{
    BackgroundImageLayer, ClonedForeground, ForegroundTransform, ImageAdjustments, Layer, LayerId,
    MovableObject, Scene, ShapeLayer, SourceKey, TextLayer,
};
use common::color::Color;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Holds the current scene snapshot and applies edits to it.
///
/// Every mutation clones the current snapshot, applies the patch and swaps the
/// result in under the write lock, so readers always hold a complete scene.
/// Edits that target an unknown layer, or that would not change anything,
/// leave the snapshot and revision untouched.
pub struct SceneStore {
    current: RwLock<Arc<Scene>>,
    revision: AtomicU64,
    next_id: AtomicU64,
}

impl SceneStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Scene::default())),
            revision: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a store holding `scene`, normalizing its layer ids.
    pub fn with_scene(scene: Scene) -> Self {
        let store = Self::new();
        store.load(scene);
        store
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Scene> {
        self.current.read().clone()
    }

    /// Bumped on every effective mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Raster sources referenced by the current snapshot.
    pub fn referenced_sources(&self) -> HashSet<SourceKey> {
        self.snapshot().referenced_sources()
    }

    /// Discard the scene. Layer ids keep counting up.
    pub fn reset(&self) {
        self.commit("reset", |scene| {
            *scene = Scene::default();
            Some(())
        });
    }

    /// Replace the whole scene, e.g. from a saved document.
    ///
    /// Missing or repeated ids are replaced with fresh ones; the id counter is
    /// moved past every id already present.
    pub fn load(&self, mut scene: Scene) {
        scene.clamp();
        if let Some(max) = scene.max_layer_id() {
            self.next_id.fetch_max(max.0 + 1, Ordering::AcqRel);
        }

        let mut seen = HashSet::new();
        self.renumber(&mut scene.background_images, &mut seen);
        self.renumber(&mut scene.shapes, &mut seen);
        self.renumber(&mut scene.texts, &mut seen);
        self.renumber(&mut scene.clones, &mut seen);

        self.commit("load", move |current| {
            *current = scene;
            Some(())
        });
    }

    fn renumber<L: Layer>(&self, layers: &mut [L], seen: &mut HashSet<LayerId>) {
        for layer in layers {
            if layer.id().0 == 0 || !seen.insert(layer.id()) {
                let id = self.allocate_id();
                layer.set_id(id);
                seen.insert(id);
            }
        }
    }

    // Background images

    pub fn add_background_image(&self, layer: BackgroundImageLayer) -> LayerId {
        self.add(|s| &mut s.background_images, layer)
    }

    pub fn update_background_image(&self, id: LayerId, f: impl FnOnce(&mut BackgroundImageLayer)) -> bool {
        self.update(|s| &mut s.background_images, id, f)
    }

    pub fn remove_background_image(&self, id: LayerId) -> bool {
        self.remove(|s| &mut s.background_images, id)
    }

    pub fn duplicate_background_image(&self, id: LayerId) -> Option<LayerId> {
        self.duplicate(|s| &mut s.background_images, id)
    }

    // Shapes

    pub fn add_shape(&self, layer: ShapeLayer) -> LayerId {
        self.add(|s| &mut s.shapes, layer)
    }

    pub fn update_shape(&self, id: LayerId, f: impl FnOnce(&mut ShapeLayer)) -> bool {
        self.update(|s| &mut s.shapes, id, f)
    }

    pub fn remove_shape(&self, id: LayerId) -> bool {
        self.remove(|s| &mut s.shapes, id)
    }

    pub fn duplicate_shape(&self, id: LayerId) -> Option<LayerId> {
        self.duplicate(|s| &mut s.shapes, id)
    }

    // Texts

    pub fn add_text(&self, layer: TextLayer) -> LayerId {
        self.add(|s| &mut s.texts, layer)
    }

    pub fn update_text(&self, id: LayerId, f: impl FnOnce(&mut TextLayer)) -> bool {
        self.update(|s| &mut s.texts, id, f)
    }

    pub fn remove_text(&self, id: LayerId) -> bool {
        self.remove(|s| &mut s.texts, id)
    }

    pub fn duplicate_text(&self, id: LayerId) -> Option<LayerId> {
        self.duplicate(|s| &mut s.texts, id)
    }

    // Foreground clones

    pub fn add_clone(&self, layer: ClonedForeground) -> LayerId {
        self.add(|s| &mut s.clones, layer)
    }

    pub fn update_clone(&self, id: LayerId, f: impl FnOnce(&mut ClonedForeground)) -> bool {
        self.update(|s| &mut s.clones, id, f)
    }

    pub fn remove_clone(&self, id: LayerId) -> bool {
        self.remove(|s| &mut s.clones, id)
    }

    pub fn duplicate_clone(&self, id: LayerId) -> Option<LayerId> {
        self.duplicate(|s| &mut s.clones, id)
    }

    // Global properties

    /// Set the photo from the original upload.
    pub fn set_background_photo(&self, photo: Option<SourceKey>) -> bool {
        self.set("background_photo", |scene| {
            replace_if_changed(&mut scene.background_photo, photo) | replace_if_changed(&mut scene.background_replaced, false)
        })
    }

    /// Swap in a different background photo behind the cutout.
    pub fn replace_background_photo(&self, photo: SourceKey) -> bool {
        self.set("replace_background_photo", |scene| {
            replace_if_changed(&mut scene.background_photo, Some(photo)) | replace_if_changed(&mut scene.background_replaced, true)
        })
    }

    pub fn set_background_color(&self, color: Option<Color>) -> bool {
        self.set("background_color", |scene| replace_if_changed(&mut scene.background_color, color))
    }

    pub fn set_transparent_background(&self, transparent: bool) -> bool {
        self.set("transparent_background", |scene| {
            replace_if_changed(&mut scene.transparent_background, transparent)
        })
    }

    pub fn set_image_adjustments(&self, adjustments: ImageAdjustments) -> bool {
        self.set("image_adjustments", |scene| {
            replace_if_changed(&mut scene.image_adjustments, adjustments)
        })
    }

    pub fn set_foreground_photo(&self, photo: Option<SourceKey>) -> bool {
        self.set("foreground_photo", |scene| replace_if_changed(&mut scene.foreground_photo, photo))
    }

    pub fn set_foreground_transform(&self, transform: ForegroundTransform) -> bool {
        self.set("foreground_transform", |scene| {
            replace_if_changed(&mut scene.foreground_transform, transform)
        })
    }

    pub fn set_movable_object(&self, object: Option<MovableObject>) -> bool {
        self.set("movable_object", |scene| replace_if_changed(&mut scene.movable_object, object))
    }

    /// Edit the movable object in place; no-op when there is none.
    pub fn update_movable_object(&self, f: impl FnOnce(&mut MovableObject)) -> bool {
        self.set("update_movable_object", |scene| match scene.movable_object.as_mut() {
            Some(object) => {
                let before = object.clone();
                f(object);
                *object != before
            }
            None => false,
        })
    }

    pub fn set_inpainted_patch(&self, patch: Option<SourceKey>) -> bool {
        self.set("inpainted_patch", |scene| replace_if_changed(&mut scene.inpainted_patch, patch))
    }

    fn allocate_id(&self) -> LayerId {
        LayerId(self.next_id.fetch_add(1, Ordering::AcqRel))
    }

    /// Apply `f` to a copy of the current scene and publish it if `f` returns `Some`.
    fn commit<R>(&self, what: &str, f: impl FnOnce(&mut Scene) -> Option<R>) -> Option<R> {
        let mut current = self.current.write();
        let mut next = Scene::clone(&current);
        let result = f(&mut next)?;
        next.clamp();
        *current = Arc::new(next);
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(revision, "scene {}", what);
        Some(result)
    }

    fn set(&self, what: &str, f: impl FnOnce(&mut Scene) -> bool) -> bool {
        self.commit(what, |scene| f(scene).then_some(())).is_some()
    }

    fn add<L: Layer>(&self, collection: fn(&mut Scene) -> &mut Vec<L>, mut layer: L) -> LayerId {
        let id = self.allocate_id();
        layer.set_id(id);
        self.commit("add layer", move |scene| {
            collection(scene).push(layer);
            Some(())
        });
        id
    }

    fn update<L: Layer + PartialEq>(
        &self,
        collection: fn(&mut Scene) -> &mut Vec<L>,
        id: LayerId,
        f: impl FnOnce(&mut L),
    ) -> bool {
        self.commit("update layer", |scene| {
            let layer = collection(scene).iter_mut().find(|layer| layer.id() == id)?;
            let before = layer.clone();
            f(layer);
            layer.set_id(id);
            layer.clamp();
            (*layer != before).then_some(())
        })
        .is_some()
    }

    fn remove<L: Layer>(&self, collection: fn(&mut Scene) -> &mut Vec<L>, id: LayerId) -> bool {
        self.commit("remove layer", |scene| {
            let layers = collection(scene);
            let index = layers.iter().position(|layer| layer.id() == id)?;
            layers.remove(index);
            Some(())
        })
        .is_some()
    }

    fn duplicate<L: Layer>(&self, collection: fn(&mut Scene) -> &mut Vec<L>, id: LayerId) -> Option<LayerId> {
        self.commit("duplicate layer", |scene| {
            let layers = collection(scene);
            let index = layers.iter().position(|layer| layer.id() == id)?;
            let mut copy = layers[index].clone();
            let new_id = self.allocate_id();
            copy.set_id(new_id);
            layers.insert(index + 1, copy);
            Some(new_id)
        })
    }
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
