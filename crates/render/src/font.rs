//! Font loading and glyph rasterization.

use fontdue::{Font, FontSettings};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use scene::FontKey;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Rasterized glyph bitmap.
pub struct GlyphBitmap {
    /// Glyph metrics.
    pub metrics: GlyphMetrics,
    /// Grayscale coverage, row major, `metrics.width * metrics.height` bytes.
    pub coverage: Vec<u8>,
}

/// Glyph metrics.
#[derive(Clone, Copy, Debug)]
pub struct GlyphMetrics {
    /// Advance width.
    pub advance_width: f32,
    /// Left side bearing.
    pub xmin: i32,
    /// Bottom of glyph relative to baseline.
    pub ymin: i32,
    /// Width of glyph.
    pub width: u32,
    /// Height of glyph.
    pub height: u32,
}

/// Vertical metrics of a line of text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineMetrics {
    /// Distance from baseline to top of line.
    pub ascent: f32,
    /// Distance from baseline to bottom of line (positive).
    pub descent: f32,
    /// Gap between lines.
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// A loaded font with rasterization support.
pub struct LoadedFont {
    font: Font,
    key: FontKey,
    /// Where the font came from, for diagnostics.
    origin: String,
    glyph_cache: RwLock<HashMap<(char, OrderedFloat<f32>), Arc<GlyphBitmap>>>,
}

impl LoadedFont {
    pub fn from_bytes(key: FontKey, origin: impl Into<String>, data: &[u8]) -> Result<Self, String> {
        let font = Font::from_bytes(data, FontSettings::default()).map_err(|e| e.to_string())?;

        Ok(Self {
            font,
            key,
            origin: origin.into(),
            glyph_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Rasterize a glyph at a given pixel size.
    pub fn rasterize(&self, c: char, size: f32) -> Arc<GlyphBitmap> {
        let cache_key = (c, OrderedFloat(size));

        if let Some(bitmap) = self.glyph_cache.read().get(&cache_key) {
            return bitmap.clone();
        }

        let (metrics, coverage) = self.font.rasterize(c, size);
        let bitmap = Arc::new(GlyphBitmap {
            metrics: GlyphMetrics {
                advance_width: metrics.advance_width,
                xmin: metrics.xmin,
                ymin: metrics.ymin,
                width: metrics.width as u32,
                height: metrics.height as u32,
            },
            coverage,
        });

        self.glyph_cache.write().insert(cache_key, bitmap.clone());
        bitmap
    }

    /// Advance width of a glyph without rasterizing it.
    pub fn advance(&self, c: char, size: f32) -> f32 {
        self.font.metrics(c, size).advance_width
    }

    /// Whether the font has a glyph for `c`.
    pub fn has_glyph(&self, c: char) -> bool {
        c.is_whitespace() || self.font.lookup_glyph_index(c) != 0
    }

    /// Line metrics at `size`, approximated when the font has no horizontal
    /// metrics table.
    pub fn line_metrics(&self, size: f32) -> LineMetrics {
        match self.font.horizontal_line_metrics(size) {
            Some(m) => LineMetrics {
                ascent: m.ascent,
                descent: -m.descent,
                line_gap: m.line_gap,
            },
            None => LineMetrics {
                ascent: size * 0.8,
                descent: size * 0.2,
                line_gap: size * 0.1,
            },
        }
    }

    pub fn key(&self) -> &FontKey {
        &self.key
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Number of cached glyph bitmaps.
    pub fn cached_glyphs(&self) -> usize {
        self.glyph_cache.read().len()
    }
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Generic family a requested family name maps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenericFamily {
    SansSerif,
    Serif,
    Monospace,
}

impl GenericFamily {
    /// Classify a family name the way browsers pick a fallback.
    pub fn classify(family: &str) -> Self {
        let family = family.to_lowercase();
        if family.contains("mono") || family.contains("courier") || family.contains("code") {
            GenericFamily::Monospace
        } else if family.contains("serif") && !family.contains("sans") || family.contains("times") || family.contains("georgia") {
            GenericFamily::Serif
        } else {
            GenericFamily::SansSerif
        }
    }

    /// Whether `family` names a generic family rather than a specific face.
    pub fn is_generic_name(family: &str) -> bool {
        matches!(
            family.trim().to_lowercase().as_str(),
            "sans-serif" | "serif" | "monospace" | "system-ui" | "ui-sans-serif" | "ui-serif" | "ui-monospace"
        )
    }
}

/// Candidate system font files for a family and weight, best match first.
pub fn system_font_paths(generic: GenericFamily, weight: u16) -> Vec<PathBuf> {
    let bold = weight >= 600;
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut push = |list: &[&str]| paths.extend(list.iter().map(PathBuf::from));

    push(linux_candidates(generic, bold));
    #[cfg(target_os = "macos")]
    push(macos_candidates(generic));
    #[cfg(target_os = "windows")]
    push(windows_candidates(generic, bold));

    // Regular weight is a usable substitute for bold.
    if bold {
        paths.extend(system_font_paths(generic, 400));
    }
    paths
}

fn linux_candidates(generic: GenericFamily, bold: bool) -> &'static [&'static str] {
    match (generic, bold) {
        (GenericFamily::SansSerif, false) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        ],
        (GenericFamily::SansSerif, true) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
        ],
        (GenericFamily::Serif, false) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
            "/usr/share/fonts/TTF/DejaVuSerif.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
        ],
        (GenericFamily::Serif, true) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSerif-Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSerif-Bold.ttf",
        ],
        (GenericFamily::Monospace, false) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
            "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
        ],
        (GenericFamily::Monospace, true) => &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono-Bold.ttf",
            "/usr/share/fonts/TTF/DejaVuSansMono-Bold.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationMono-Bold.ttf",
        ],
    }
}

#[cfg(target_os = "macos")]
fn macos_candidates(generic: GenericFamily) -> &'static [&'static str] {
    match generic {
        GenericFamily::SansSerif => &["/System/Library/Fonts/Helvetica.ttc", "/Library/Fonts/Arial.ttf"],
        GenericFamily::Serif => &["/System/Library/Fonts/Times.ttc", "/Library/Fonts/Georgia.ttf"],
        GenericFamily::Monospace => &["/System/Library/Fonts/Menlo.ttc", "/System/Library/Fonts/Courier.ttc"],
    }
}

#[cfg(target_os = "windows")]
fn windows_candidates(generic: GenericFamily, bold: bool) -> &'static [&'static str] {
    match (generic, bold) {
        (GenericFamily::SansSerif, false) => &["C:\\Windows\\Fonts\\arial.ttf", "C:\\Windows\\Fonts\\segoeui.ttf"],
        (GenericFamily::SansSerif, true) => &["C:\\Windows\\Fonts\\arialbd.ttf", "C:\\Windows\\Fonts\\segoeuib.ttf"],
        (GenericFamily::Serif, _) => &["C:\\Windows\\Fonts\\times.ttf", "C:\\Windows\\Fonts\\georgia.ttf"],
        (GenericFamily::Monospace, _) => &["C:\\Windows\\Fonts\\consola.ttf", "C:\\Windows\\Fonts\\cour.ttf"],
    }
}

/// Load the first readable system font for `key`.
pub fn load_system_font(key: &FontKey) -> Option<LoadedFont> {
    let generic = GenericFamily::classify(&key.family);
    system_font_paths(generic, key.weight).into_iter().find_map(|path| {
        let data = std::fs::read(&path).ok()?;
        LoadedFont::from_bytes(key.clone(), path.display().to_string(), &data).ok()
    })
}

/// The font used when nothing better is available.
pub fn load_default_font() -> Option<LoadedFont> {
    load_system_font(&FontKey::new("sans-serif", 400))
}
