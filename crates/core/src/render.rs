//! Slice rendering to PNG (PRD-06).
//!
//! Rendering is a pure function of an owned [`RenderInput`] snapshot: no
//! engine state is read or mutated, and identical inputs yield byte-identical
//! PNGs. Callers snapshot the slice (and colormap) they want, then encode
//! wherever convenient, off-thread included.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::color::{color_for, ColorMap, Rgb};
use crate::error::EngineError;
use crate::frame::Buffer2D;
use crate::types::LabelId;

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Which rendering path a [`RenderSpec`] resolves to. Part of render cache
/// keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    Raw,
    Labeled,
}

/// Cache key for rendered slices: (frame, channel-or-feature, kind).
pub type RenderKey = (usize, usize, RenderKind);

/// A caller's description of the image it wants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenderSpec {
    /// One raw channel, windowed and mapped through cubehelix.
    Raw {
        frame: usize,
        channel: usize,
        /// Explicit display window. Defaults to the slice's min/max.
        #[serde(default)]
        window: Option<(f32, f32)>,
    },
    /// One label feature with stable per-id colors and boundary outlines.
    Labeled { frame: usize, feature: usize },
}

impl RenderSpec {
    pub fn frame(&self) -> usize {
        match self {
            Self::Raw { frame, .. } | Self::Labeled { frame, .. } => *frame,
        }
    }

    /// Cache key, or `None` when the output depends on caller-specific
    /// parameters (an explicit window) and must not be shared.
    pub fn cache_key(&self) -> Option<RenderKey> {
        match self {
            Self::Raw {
                window: Some(_), ..
            } => None,
            Self::Raw { frame, channel, .. } => Some((*frame, *channel, RenderKind::Raw)),
            Self::Labeled { frame, feature } => Some((*frame, *feature, RenderKind::Labeled)),
        }
    }
}

/// An owned snapshot of everything one render needs.
#[derive(Debug, Clone)]
pub enum RenderInput {
    Raw {
        buffer: Buffer2D<f32>,
        window: Option<(f32, f32)>,
    },
    Labeled {
        buffer: Buffer2D<LabelId>,
        colors: ColorMap,
    },
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render a snapshot to PNG bytes (RGBA, alpha 255 except label background).
pub fn render(input: &RenderInput) -> Result<Vec<u8>, EngineError> {
    let (width, height, rgba) = match input {
        RenderInput::Raw { buffer, window } => {
            (buffer.width(), buffer.height(), raw_rgba(buffer, *window))
        }
        RenderInput::Labeled { buffer, colors } => {
            (buffer.width(), buffer.height(), labeled_rgba(buffer, colors))
        }
    };
    encode_png(width, height, &rgba)
}

fn raw_rgba(buffer: &Buffer2D<f32>, window: Option<(f32, f32)>) -> Vec<u8> {
    let (vmin, vmax) = window.unwrap_or_else(|| slice_window(buffer));
    let span = if vmax > vmin { vmax - vmin } else { 1.0 };

    let mut out = Vec::with_capacity(buffer.as_slice().len() * 4);
    for &value in buffer.as_slice() {
        let t = ((value - vmin) / span).clamp(0.0, 1.0);
        let [r, g, b] = cubehelix(t);
        out.extend([r, g, b, 255]);
    }
    out
}

/// Default display window: the slice's own extrema, the 0th and 100th
/// percentile.
fn slice_window(buffer: &Buffer2D<f32>) -> (f32, f32) {
    let mut vmin = f32::INFINITY;
    let mut vmax = f32::NEG_INFINITY;
    for &value in buffer.as_slice() {
        vmin = vmin.min(value);
        vmax = vmax.max(value);
    }
    (vmin, vmax)
}

fn labeled_rgba(labels: &Buffer2D<LabelId>, colors: &ColorMap) -> Vec<u8> {
    let width = labels.width();
    let height = labels.height();
    let data = labels.as_slice();

    let mut out = Vec::with_capacity(data.len() * 4);
    for y in 0..height {
        for x in 0..width {
            let id = data[y * width + x];
            if id == 0 {
                out.extend([0, 0, 0, 0]);
                continue;
            }
            // The colormap is authoritative, but the fallback computes the
            // same color, so an unassigned id still renders correctly.
            let mut rgb = colors.get(id).unwrap_or_else(|| color_for(id));
            if on_boundary(data, width, height, x, y) {
                rgb = brighten(rgb);
            }
            out.extend([rgb[0], rgb[1], rgb[2], 255]);
        }
    }
    out
}

/// A pixel is on its region's boundary when it sits on the image edge or any
/// 4-neighbor holds a different id. Matches the erosion rule, so outlines
/// and morphology agree.
fn on_boundary(data: &[LabelId], width: usize, height: usize, x: usize, y: usize) -> bool {
    if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
        return true;
    }
    let id = data[y * width + x];
    data[y * width + x - 1] != id
        || data[y * width + x + 1] != id
        || data[(y - 1) * width + x] != id
        || data[(y + 1) * width + x] != id
}

/// Halfway toward white, enough to outline two same-colored neighbors.
fn brighten(rgb: Rgb) -> Rgb {
    let lift = |c: u8| c + (255 - c) / 2;
    [lift(rgb[0]), lift(rgb[1]), lift(rgb[2])]
}

// ---------------------------------------------------------------------------
// Cubehelix
// ---------------------------------------------------------------------------

// Green (1986), "A colour scheme for the display of astronomical intensity
// images", evaluated in closed form with start 0.5, -1.5 rotations, hue 1.0.
const START: f32 = 0.5;
const ROTATIONS: f32 = -1.5;
const HUE: f32 = 1.0;

fn cubehelix(t: f32) -> Rgb {
    let phi = 2.0 * std::f32::consts::PI * (START / 3.0 + ROTATIONS * t);
    let amp = HUE * t * (1.0 - t) / 2.0;
    let (sin, cos) = phi.sin_cos();
    let r = t + amp * (-0.14861 * cos + 1.78277 * sin);
    let g = t + amp * (-0.29227 * cos - 0.90649 * sin);
    let b = t + amp * (1.97294 * cos);
    [to_byte(r), to_byte(g), to_byte(b)]
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn encode_png(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(rgba, width as u32, height as u32, ExtendedColorType::Rgba8)
        .map_err(|e| EngineError::Apply(format!("PNG encoding failed: {e}")))?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
