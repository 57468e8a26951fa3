//! Scene data model.
//!
//! Everything here is plain data: raster and font references are string
//! identifiers resolved by the resource cache, never decoded handles. Layer
//! collections keep insertion order, which is also their stacking order.

use common::color::Color;
use common::error::{EditorError, EditorResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a layer, assigned by the scene store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Opaque raster source descriptor (data URL, blob URL or file path).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL scheme in lowercase, or `None` for bare paths.
    pub fn scheme(&self) -> Option<String> {
        let (scheme, _) = self.0.split_once(':')?;
        // Single letters are Windows drive prefixes, not schemes.
        if scheme.len() < 2 || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return None;
        }
        Some(scheme.to_ascii_lowercase())
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Data URLs can be megabytes long.
        match self.0.char_indices().nth(61) {
            Some((cut, _)) if self.0.len() > 64 => write!(f, "{}...", &self.0[..cut]),
            _ => f.write_str(&self.0),
        }
    }
}

impl From<&str> for SourceKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Font family and numeric weight (100 - 900).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FontKey {
    pub family: String,
    pub weight: u16,
}

impl FontKey {
    pub fn new(family: impl Into<String>, weight: u16) -> Self {
        Self {
            family: family.into(),
            weight,
        }
    }
}

impl fmt::Display for FontKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.weight)
    }
}

/// Position in percent of the canvas (or of the offset range for clones).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn centered() -> Self {
        Self::new(50.0, 50.0)
    }

    fn clamped(self, min: f32, max: f32) -> Self {
        Self::new(clamp_finite(self.x, min, max, 0.0), clamp_finite(self.y, min, max, 0.0))
    }
}

/// Soft colored shadow drawn behind a layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Glow {
    pub enabled: bool,
    pub color: Color,
    /// Blur strength in px at preview scale.
    pub intensity: f32,
}

impl Glow {
    pub fn new(color: Color, intensity: f32) -> Self {
        Self {
            enabled: true,
            color,
            intensity,
        }
    }

    /// Whether drawing this glow would change any pixel.
    pub fn is_visible(&self) -> bool {
        self.enabled && self.intensity > 0.0 && !self.color.is_transparent()
    }
}

/// Attributes shared by shape, text and background image layers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    /// Percent of canvas width/height, origin top-left.
    pub position: Position,
    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glow: Option<Glow>,
}

fn default_opacity() -> f32 {
    1.0
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Position::centered(),
            rotation: 0.0,
            opacity: 1.0,
            glow: None,
        }
    }
}

impl Placement {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Position::new(x, y),
            ..Self::default()
        }
    }

    /// Glow that should actually be drawn, if any.
    pub fn visible_glow(&self) -> Option<Glow> {
        self.glow.filter(Glow::is_visible)
    }

    fn clamp(&mut self) {
        self.position = Position::new(finite_or(self.position.x, 0.0), finite_or(self.position.y, 0.0));
        self.rotation = finite_or(self.rotation, 0.0);
        self.opacity = clamp_finite(self.opacity, 0.0, 1.0, 1.0);
        if let Some(glow) = self.glow.as_mut() {
            glow.intensity = clamp_finite(glow.intensity, 0.0, f32::MAX, 0.0);
        }
    }
}

/// Closed set of vector shape templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Circle,
    Square,
    Rectangle,
    Triangle,
    Star,
    Heart,
    Hexagon,
    Pentagon,
    Diamond,
    Arrow,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 10] = [
        ShapeKind::Circle,
        ShapeKind::Square,
        ShapeKind::Rectangle,
        ShapeKind::Triangle,
        ShapeKind::Star,
        ShapeKind::Heart,
        ShapeKind::Hexagon,
        ShapeKind::Pentagon,
        ShapeKind::Diamond,
        ShapeKind::Arrow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Circle => "circle",
            ShapeKind::Square => "square",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Star => "star",
            ShapeKind::Heart => "heart",
            ShapeKind::Hexagon => "hexagon",
            ShapeKind::Pentagon => "pentagon",
            ShapeKind::Diamond => "diamond",
            ShapeKind::Arrow => "arrow",
        }
    }
}

/// Error returned for an unknown shape name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown shape kind: {0}")]
pub struct ParseShapeKindError(pub String);

impl FromStr for ShapeKind {
    type Err = ParseShapeKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        ShapeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ParseShapeKindError(s.to_string()))
    }
}

/// A vector shape layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeLayer {
    #[serde(default)]
    pub id: LayerId,
    #[serde(alias = "shapeType", alias = "type")]
    pub shape: ShapeKind,
    pub color: Color,
    #[serde(default = "default_true")]
    pub is_filled: bool,
    /// Stroke width in px at preview scale.
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
    /// Per-mille of the canvas' shorter side.
    pub scale: f32,
    #[serde(flatten)]
    pub placement: Placement,
}

fn default_true() -> bool {
    true
}

fn default_stroke_width() -> f32 {
    2.0
}

impl ShapeLayer {
    pub fn new(shape: ShapeKind, color: Color, scale: f32, placement: Placement) -> Self {
        Self {
            id: LayerId::default(),
            shape,
            color,
            is_filled: true,
            stroke_width: default_stroke_width(),
            scale,
            placement,
        }
    }

    pub fn outlined(mut self, stroke_width: f32) -> Self {
        self.is_filled = false;
        self.stroke_width = stroke_width;
        self
    }
}

/// A single line of text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLayer {
    #[serde(default)]
    pub id: LayerId,
    pub text: String,
    pub font_family: String,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    /// Px at preview scale; independent of canvas size.
    pub font_size: f32,
    pub color: Color,
    #[serde(flatten)]
    pub placement: Placement,
}

fn default_font_weight() -> u16 {
    400
}

impl TextLayer {
    pub fn new(text: impl Into<String>, font_family: impl Into<String>, font_size: f32, color: Color, placement: Placement) -> Self {
        Self {
            id: LayerId::default(),
            text: text.into(),
            font_family: font_family.into(),
            font_weight: default_font_weight(),
            font_size,
            color,
            placement,
        }
    }

    pub fn font_key(&self) -> FontKey {
        FontKey::new(self.font_family.clone(), self.font_weight)
    }
}

/// An auxiliary image drawn above the background fill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundImageLayer {
    #[serde(default)]
    pub id: LayerId,
    pub source: SourceKey,
    /// Percent of the canvas' shorter side covered by the image's longer side.
    pub scale: f32,
    #[serde(flatten)]
    pub placement: Placement,
}

impl BackgroundImageLayer {
    pub fn new(source: impl Into<SourceKey>, scale: f32, placement: Placement) -> Self {
        Self {
            id: LayerId::default(),
            source: source.into(),
            scale,
            placement,
        }
    }
}

/// An extra instance of the foreground cutout with its own transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonedForeground {
    #[serde(default)]
    pub id: LayerId,
    /// Percent offset from canvas center, -100 to 100.
    pub position: Position,
    #[serde(default = "default_multiplier")]
    pub size_multiplier: f32,
    #[serde(default)]
    pub rotation: f32,
}

fn default_multiplier() -> f32 {
    100.0
}

impl ClonedForeground {
    pub fn new(position: Position, size_multiplier: f32, rotation: f32) -> Self {
        Self {
            id: LayerId::default(),
            position,
            size_multiplier,
            rotation,
        }
    }
}

/// Separately segmented cutout drawn above everything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovableObject {
    pub source: SourceKey,
    /// Percent offset from canvas center, -100 to 100.
    #[serde(default)]
    pub position: Position,
    /// Percent of the scale-to-fit size.
    #[serde(default = "default_multiplier")]
    pub scale: f32,
    #[serde(default)]
    pub rotation: f32,
}

impl MovableObject {
    pub fn new(source: impl Into<SourceKey>) -> Self {
        Self {
            source: source.into(),
            position: Position::default(),
            scale: default_multiplier(),
            rotation: 0.0,
        }
    }

    fn clamp(&mut self) {
        self.position = self.position.clamped(-100.0, 100.0);
        self.scale = clamp_finite(self.scale, 0.0, f32::MAX, 0.0);
        self.rotation = finite_or(self.rotation, 0.0);
    }
}

/// Offset and size of the primary foreground cutout.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundTransform {
    /// Percent of canvas width/height.
    pub offset: Position,
    pub size_multiplier: f32,
}

impl Default for ForegroundTransform {
    fn default() -> Self {
        Self {
            offset: Position::default(),
            size_multiplier: default_multiplier(),
        }
    }
}

/// Color grading applied to the background photo only.
///
/// Brightness, contrast and saturation are percentages with 100 as neutral;
/// fade is 0 - 100 and washes the photo toward white.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAdjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub fade: f32,
}

impl Default for ImageAdjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            fade: 0.0,
        }
    }
}

impl ImageAdjustments {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    fn clamp(&mut self) {
        self.brightness = clamp_finite(self.brightness, 0.0, 400.0, 100.0);
        self.contrast = clamp_finite(self.contrast, 0.0, 400.0, 100.0);
        self.saturation = clamp_finite(self.saturation, 0.0, 400.0, 100.0);
        self.fade = clamp_finite(self.fade, 0.0, 100.0, 0.0);
    }
}

/// What fills the canvas before any layer is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BackgroundFill<'a> {
    Color(Color),
    Checkerboard,
    Photo(&'a SourceKey),
    Empty,
}

/// The editable scene.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scene {
    pub background_photo: Option<SourceKey>,
    pub background_color: Option<Color>,
    pub transparent_background: bool,
    /// The user swapped in a different background photo.
    pub background_replaced: bool,
    pub foreground_photo: Option<SourceKey>,
    pub foreground_transform: ForegroundTransform,
    pub image_adjustments: ImageAdjustments,
    pub background_images: Vec<BackgroundImageLayer>,
    pub shapes: Vec<ShapeLayer>,
    pub texts: Vec<TextLayer>,
    pub clones: Vec<ClonedForeground>,
    pub movable_object: Option<MovableObject>,
    pub inpainted_patch: Option<SourceKey>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Background to draw, by priority: color, checkerboard, photo.
    pub fn background_fill(&self) -> BackgroundFill<'_> {
        if let Some(color) = self.background_color {
            BackgroundFill::Color(color)
        } else if self.transparent_background {
            BackgroundFill::Checkerboard
        } else if let Some(photo) = &self.background_photo {
            BackgroundFill::Photo(photo)
        } else {
            BackgroundFill::Empty
        }
    }

    /// Whether the foreground honours its offset instead of staying centered.
    pub fn foreground_is_detached(&self) -> bool {
        self.background_color.is_some() || self.transparent_background || self.background_replaced
    }

    /// Every raster source the scene references.
    pub fn referenced_sources(&self) -> HashSet<SourceKey> {
        let mut sources = HashSet::new();
        sources.extend(self.background_photo.iter().cloned());
        sources.extend(self.foreground_photo.iter().cloned());
        sources.extend(self.inpainted_patch.iter().cloned());
        sources.extend(self.movable_object.iter().map(|object| object.source.clone()));
        sources.extend(self.background_images.iter().map(|layer| layer.source.clone()));
        sources
    }

    /// Every font used by a non-empty text layer.
    pub fn used_fonts(&self) -> BTreeSet<FontKey> {
        self.texts
            .iter()
            .filter(|text| !text.text.is_empty())
            .map(TextLayer::font_key)
            .collect()
    }

    /// Total number of layers across all collections.
    pub fn layer_count(&self) -> usize {
        self.background_images.len()
            + self.shapes.len()
            + self.texts.len()
            + self.clones.len()
            + usize::from(self.movable_object.is_some())
    }

    /// Largest layer id present, if any.
    pub fn max_layer_id(&self) -> Option<LayerId> {
        let ids = self
            .background_images
            .iter()
            .map(|l| l.id)
            .chain(self.shapes.iter().map(|l| l.id))
            .chain(self.texts.iter().map(|l| l.id))
            .chain(self.clones.iter().map(|l| l.id));
        ids.max()
    }

    pub fn from_json(json: &str) -> EditorResult<Self> {
        let mut scene: Scene =
            serde_json::from_str(json).map_err(|e| EditorError::scene(format!("invalid scene document: {}", e)))?;
        scene.clamp();
        Ok(scene)
    }

    pub fn to_json(&self) -> EditorResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EditorError::scene(e.to_string()))
    }

    /// Clamp every attribute into its valid range.
    pub fn clamp(&mut self) {
        self.image_adjustments.clamp();
        self.foreground_transform.offset = Position::new(
            finite_or(self.foreground_transform.offset.x, 0.0),
            finite_or(self.foreground_transform.offset.y, 0.0),
        );
        self.foreground_transform.size_multiplier =
            clamp_finite(self.foreground_transform.size_multiplier, 0.0, f32::MAX, 100.0);
        self.background_images.iter_mut().for_each(Layer::clamp);
        self.shapes.iter_mut().for_each(Layer::clamp);
        self.texts.iter_mut().for_each(Layer::clamp);
        self.clones.iter_mut().for_each(Layer::clamp);
        if let Some(object) = self.movable_object.as_mut() {
            object.clamp();
        }
    }
}

/// An entry in one of the scene's ordered layer collections.
pub trait Layer: Clone {
    fn id(&self) -> LayerId;
    fn set_id(&mut self, id: LayerId);
    fn clamp(&mut self);
}

impl Layer for ShapeLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn set_id(&mut self, id: LayerId) {
        self.id = id;
    }

    fn clamp(&mut self) {
        self.placement.clamp();
        self.scale = clamp_finite(self.scale, 0.0, f32::MAX, 0.0);
        self.stroke_width = clamp_finite(self.stroke_width, 0.0, f32::MAX, 0.0);
    }
}

impl Layer for TextLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn set_id(&mut self, id: LayerId) {
        self.id = id;
    }

    fn clamp(&mut self) {
        self.placement.clamp();
        self.font_size = clamp_finite(self.font_size, 0.0, f32::MAX, 0.0);
        self.font_weight = self.font_weight.clamp(100, 900);
    }
}

impl Layer for BackgroundImageLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn set_id(&mut self, id: LayerId) {
        self.id = id;
    }

    fn clamp(&mut self) {
        self.placement.clamp();
        self.scale = clamp_finite(self.scale, 0.0, f32::MAX, 0.0);
    }
}

impl Layer for ClonedForeground {
    fn id(&self) -> LayerId {
        self.id
    }

    fn set_id(&mut self, id: LayerId) {
        self.id = id;
    }

    fn clamp(&mut self) {
        self.position = self.position.clamped(-100.0, 100.0);
        self.size_multiplier = clamp_finite(self.size_multiplier, 0.0, f32::MAX, 0.0);
        self.rotation = finite_or(self.rotation, 0.0);
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_priority() {
        let mut scene = Scene::new();
        assert_eq!(scene.background_fill(), BackgroundFill::Empty);

        let photo = SourceKey::new("photo.png");
        scene.background_photo = Some(photo.clone());
        assert_eq!(scene.background_fill(), BackgroundFill::Photo(&photo));

        scene.transparent_background = true;
        assert_eq!(scene.background_fill(), BackgroundFill::Checkerboard);

        scene.background_color = Some(Color::WHITE);
        assert_eq!(scene.background_fill(), BackgroundFill::Color(Color::WHITE));
    }

    #[test]
    fn test_shape_kind_from_str() {
        assert_eq!("circle".parse::<ShapeKind>(), Ok(ShapeKind::Circle));
        assert_eq!(" Heart ".parse::<ShapeKind>(), Ok(ShapeKind::Heart));
        assert!("blob".parse::<ShapeKind>().is_err());
        for kind in ShapeKind::ALL {
            assert_eq!(kind.name().parse::<ShapeKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_source_scheme() {
        assert_eq!(SourceKey::new("data:image/png;base64,AAAA").scheme().as_deref(), Some("data"));
        assert_eq!(SourceKey::new("blob:layerforge/3").scheme().as_deref(), Some("blob"));
        assert_eq!(SourceKey::new("/tmp/photo.png").scheme(), None);
        assert_eq!(SourceKey::new("C:\\photos\\a.png").scheme(), None);
    }

    #[test]
    fn test_clamp_on_load() {
        let json = r##"{
            "shapes": [{
                "id": 1, "shape": "circle", "color": "#ff0000", "scale": -5,
                "position": {"x": 20, "y": 20}, "opacity": 3.0
            }],
            "clones": [{"id": 2, "position": {"x": 250, "y": -400}, "sizeMultiplier": 80}]
        }"##;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.shapes[0].scale, 0.0);
        assert_eq!(scene.shapes[0].placement.opacity, 1.0);
        assert!(scene.shapes[0].is_filled);
        assert_eq!(scene.clones[0].position, Position::new(100.0, -100.0));
    }

    #[test]
    fn test_json_uses_camel_case_and_string_references() {
        let mut scene = Scene::new();
        scene.foreground_photo = Some(SourceKey::new("blob:layerforge/1"));
        scene.texts.push(TextLayer::new("Hello", "Inter", 100.0, Color::BLACK, Placement::at(50.0, 50.0)));

        let json = scene.to_json().unwrap();
        assert!(json.contains("\"foregroundPhoto\": \"blob:layerforge/1\""));
        assert!(json.contains("\"fontFamily\": \"Inter\""));
        assert!(json.contains("\"imageAdjustments\""));
        assert_eq!(Scene::from_json(&json).unwrap(), scene);
    }

    #[test]
    fn test_referenced_sources_and_fonts() {
        let mut scene = Scene::new();
        scene.background_photo = Some("bg.png".into());
        scene.background_images.push(BackgroundImageLayer::new("sticker.png", 30.0, Placement::default()));
        scene.movable_object = Some(MovableObject::new("object.png"));
        scene.texts.push(TextLayer::new("", "Ghost", 12.0, Color::BLACK, Placement::default()));
        scene.texts.push(TextLayer::new("Hi", "Inter", 12.0, Color::BLACK, Placement::default()));

        let sources = scene.referenced_sources();
        assert_eq!(sources.len(), 3);
        assert!(sources.contains(&SourceKey::new("sticker.png")));

        let fonts: Vec<_> = scene.used_fonts().into_iter().collect();
        assert_eq!(fonts, vec![FontKey::new("Inter", 400)]);
    }

    #[test]
    fn test_glow_visibility() {
        assert!(Glow::new(Color::WHITE, 10.0).is_visible());
        assert!(!Glow::new(Color::WHITE, 0.0).is_visible());
        assert!(!Glow { enabled: false, ..Glow::new(Color::WHITE, 10.0) }.is_visible());
    }
}
