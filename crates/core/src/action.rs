//! Edit action vocabulary and per-mode legality (PRD-03).
//!
//! Actions arrive as tagged payloads (an HTTP layer can pass client JSON
//! straight through) and are dispatched exhaustively by the engine. Which
//! actions a project accepts depends on its [`EditMode`]; an action outside
//! its mode fails validation before anything is touched.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{LabelId, Point};

/// Longest accepted brush trace, in points.
pub const MAX_TRACE_POINTS: usize = 5000;

/// Largest accepted brush radius, in pixels.
pub const MAX_BRUSH_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Edit modes
// ---------------------------------------------------------------------------

/// Editing variant a project was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Single-frame label correction.
    Pixel,
    /// Multi-frame, multi-channel stacks; label ids persist across frames.
    ZStack,
    /// Time-lapse stacks with lineage bookkeeping; single feature.
    Track,
}

impl EditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Pixel => "pixel",
            EditMode::ZStack => "zstack",
            EditMode::Track => "track",
        }
    }

    pub fn from_str(value: &str) -> Result<Self, EngineError> {
        match value {
            "pixel" => Ok(EditMode::Pixel),
            "zstack" => Ok(EditMode::ZStack),
            "track" => Ok(EditMode::Track),
            other => Err(EngineError::Validation(format!(
                "Invalid mode '{other}'. Must be one of: pixel, zstack, track"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One discrete edit, named the way clients submit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Stamp a circular brush along `trace`. Pixels equal to `background`
    /// become `foreground`; `erase` swaps the roles.
    Draw {
        frame: usize,
        feature: usize,
        trace: Vec<Point>,
        foreground: LabelId,
        background: LabelId,
        brush_size: usize,
        erase: bool,
    },
    /// Flood the 4-connected component under `(x, y)` with `fill`.
    Flood {
        frame: usize,
        feature: usize,
        x: usize,
        y: usize,
        fill: LabelId,
    },
    /// Zero every pixel of `label` not 4-connected to `(x, y)`.
    Trim {
        frame: usize,
        feature: usize,
        label: LabelId,
        x: usize,
        y: usize,
    },
    /// Fill the background component under `(x, y)` with `label`.
    FillHole {
        frame: usize,
        feature: usize,
        label: LabelId,
        x: usize,
        y: usize,
    },
    /// Remove the morphological boundary of `label`.
    Erode {
        frame: usize,
        feature: usize,
        label: LabelId,
    },
    /// Grow `label` by one pixel into background.
    Dilate {
        frame: usize,
        feature: usize,
        label: LabelId,
    },
    /// Within the rectangle, claim bright raw pixels for `label`.
    Threshold {
        frame: usize,
        feature: usize,
        channel: usize,
        label: LabelId,
        x1: usize,
        y1: usize,
        x2: usize,
        y2: usize,
    },
    /// Split `label` in two by simultaneous growth from two seed pixels.
    Watershed {
        frame: usize,
        feature: usize,
        label: LabelId,
        x1: usize,
        y1: usize,
        x2: usize,
        y2: usize,
    },
    /// Merge: every pixel of `b` becomes `a`.
    Replace {
        feature: usize,
        a: LabelId,
        b: LabelId,
        #[serde(default)]
        frame: Option<usize>,
    },
    /// Exchange two ids.
    Swap {
        feature: usize,
        a: LabelId,
        b: LabelId,
        #[serde(default)]
        frame: Option<usize>,
    },
    /// Zero the id in one frame.
    Delete {
        frame: usize,
        feature: usize,
        label: LabelId,
    },
    /// Relabel the id's pixels in this frame with a fresh id.
    NewLabel {
        frame: usize,
        feature: usize,
        label: LabelId,
    },
    /// Fresh id from `frame` through the last frame.
    NewLabelStack {
        frame: usize,
        feature: usize,
        label: LabelId,
    },
    /// Match labels between consecutive frames by maximal overlap.
    Predict { feature: usize },
    /// Split a track: frames at or after `from_frame` get a fresh id.
    NewTrack { label: LabelId, from_frame: usize },
    /// Record a division.
    AddDaughter { parent: LabelId, daughter: LabelId },
    /// Unlink a recorded division.
    RemoveDaughter { daughter: LabelId },
    /// Zero the remainder of a track and truncate its lineage entry.
    DeleteTrack { label: LabelId, from_frame: usize },
    /// Overwrite one label frame wholesale (row-major, shape-checked).
    ReplaceFrame { frame: usize, labels: Vec<LabelId> },
}

impl Action {
    /// Tag string, as submitted over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Draw { .. } => "draw",
            Action::Flood { .. } => "flood",
            Action::Trim { .. } => "trim",
            Action::FillHole { .. } => "fill_hole",
            Action::Erode { .. } => "erode",
            Action::Dilate { .. } => "dilate",
            Action::Threshold { .. } => "threshold",
            Action::Watershed { .. } => "watershed",
            Action::Replace { .. } => "replace",
            Action::Swap { .. } => "swap",
            Action::Delete { .. } => "delete",
            Action::NewLabel { .. } => "new_label",
            Action::NewLabelStack { .. } => "new_label_stack",
            Action::Predict { .. } => "predict",
            Action::NewTrack { .. } => "new_track",
            Action::AddDaughter { .. } => "add_daughter",
            Action::RemoveDaughter { .. } => "remove_daughter",
            Action::DeleteTrack { .. } => "delete_track",
            Action::ReplaceFrame { .. } => "replace_frame",
        }
    }

    /// Whether an action is legal for a mode at all. Mode-specific parameter
    /// rules (e.g. track-mode `replace` must span all frames) are enforced
    /// during engine validation.
    pub fn allowed_in(&self, mode: EditMode) -> bool {
        match self {
            Action::Draw { .. }
            | Action::Flood { .. }
            | Action::Trim { .. }
            | Action::FillHole { .. }
            | Action::Watershed { .. }
            | Action::Replace { .. }
            | Action::Swap { .. } => true,
            Action::Erode { .. }
            | Action::Dilate { .. }
            | Action::Threshold { .. }
            | Action::Delete { .. }
            | Action::NewLabel { .. } => {
                matches!(mode, EditMode::Pixel | EditMode::ZStack)
            }
            Action::NewLabelStack { .. } | Action::Predict { .. } => {
                matches!(mode, EditMode::ZStack)
            }
            Action::NewTrack { .. }
            | Action::AddDaughter { .. }
            | Action::RemoveDaughter { .. }
            | Action::DeleteTrack { .. }
            | Action::ReplaceFrame { .. } => matches!(mode, EditMode::Track),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
