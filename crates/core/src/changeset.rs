//! Summary of what an action changed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::LabelId;

/// Reported after every successful action, undo, and redo so callers know
/// which cached artifacts (rendered frames, id lists) are stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Frames whose label data changed.
    pub frames_changed: BTreeSet<usize>,
    /// Raw channels never change today; kept so callers can subscribe once.
    pub raw_changed: bool,
    /// Any label pixel changed.
    pub labels_changed: bool,
    /// Id sets, lineage, or the allocation mark changed.
    pub metadata_changed: bool,
    /// New allocation high-water mark, when it moved.
    pub new_max_label: Option<LabelId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing to report.
    pub fn is_empty(&self) -> bool {
        self.frames_changed.is_empty()
            && !self.raw_changed
            && !self.labels_changed
            && !self.metadata_changed
            && self.new_max_label.is_none()
    }

    pub(crate) fn note_frame(&mut self, frame: usize) {
        self.frames_changed.insert(frame);
        self.labels_changed = true;
    }

    pub(crate) fn note_metadata(&mut self) {
        self.metadata_changed = true;
    }

    pub(crate) fn note_max_label(&mut self, id: LabelId) {
        self.new_max_label = Some(id);
        self.metadata_changed = true;
    }
}
