//! Stable per-label color assignment (PRD-05).
//!
//! Every label id gets a color the first time it is seen and keeps it for the
//! life of the project, even if the id disappears and later reappears through
//! undo. The color is a pure function of the id — hue from the golden-ratio
//! sequence, saturation and value jittered by a generator seeded with the id —
//! so assignments are identical across runs.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::types::LabelId;

/// An opaque RGB triple.
pub type Rgb = [u8; 3];

/// Golden-ratio conjugate; successive ids land maximally far apart on the
/// hue wheel.
const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

/// Compute the display color for a label id.
pub fn color_for(id: LabelId) -> Rgb {
    let hue = (id as f32 * GOLDEN_RATIO_CONJUGATE).fract();
    let mut rng = SmallRng::seed_from_u64(id as u64);
    let saturation = rng.random_range(0.55_f32..0.95);
    let value = rng.random_range(0.75_f32..1.0);
    hsv_to_rgb(hue, saturation, value)
}

/// Convert HSV (all components in `[0, 1]`) to RGB bytes.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h6 = (h.fract() + 1.0).fract() * 6.0;
    let sector = h6 as u32 % 6;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

/// The per-project id → color table.
///
/// Entries are only ever added, never changed or removed, which keeps
/// rendering stable across undo/redo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMap {
    assigned: BTreeMap<LabelId, Rgb>,
}

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color for an id, assigning one on first sight.
    ///
    /// Returns the color and whether this call created the assignment.
    pub fn assign(&mut self, id: LabelId) -> (Rgb, bool) {
        match self.assigned.get(&id) {
            Some(rgb) => (*rgb, false),
            None => {
                let rgb = color_for(id);
                self.assigned.insert(id, rgb);
                (rgb, true)
            }
        }
    }

    /// Color for an id if it has been assigned.
    pub fn get(&self, id: LabelId) -> Option<Rgb> {
        self.assigned.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_deterministic_per_id() {
        for id in [1, 2, 17, 4096] {
            assert_eq!(color_for(id), color_for(id));
        }
    }

    #[test]
    fn adjacent_ids_get_distinct_colors() {
        assert_ne!(color_for(1), color_for(2));
        assert_ne!(color_for(2), color_for(3));
    }

    #[test]
    fn colors_are_never_too_dark() {
        // value >= 0.75 guarantees at least one bright channel.
        for id in 1..50 {
            let rgb = color_for(id);
            assert!(rgb.iter().any(|&c| c >= 150), "id {id} too dark: {rgb:?}");
        }
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0, 255, 0]);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0, 0, 255]);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 1.0), [255, 255, 255]);
    }

    #[test]
    fn map_assignment_is_stable() {
        let mut map = ColorMap::new();
        let (first, created) = map.assign(9);
        assert!(created);
        let (second, created) = map.assign(9);
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(map.get(9), Some(first));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn map_misses_for_unseen_ids() {
        let map = ColorMap::new();
        assert_eq!(map.get(3), None);
    }
}
