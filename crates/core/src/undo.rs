//! Bounded undo/redo snapshots (PRD-04).
//!
//! Each applied action captures the prior contents of every label slice it
//! touches, plus the prior allocation mark and (track mode) lineage table.
//! [`UndoEntry::restore`] swaps the stored state with the live state in
//! place, so restoring the same entry twice is a no-op pair: one entry
//! serves both undo and redo without reallocating. Stacks are ring buffers;
//! pushing past the cap drops the oldest entry.

use std::collections::{BTreeSet, VecDeque};

use crate::error::EngineError;
use crate::frame::{Buffer2D, FrameStore};
use crate::lineage::Lineage;
use crate::metadata::MetadataTracker;
use crate::types::LabelId;

/// Default undo/redo stack cap.
pub const DEFAULT_UNDO_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Prior contents of one (frame, feature) label slice.
#[derive(Debug, Clone)]
pub(crate) struct SliceSnapshot {
    pub frame: usize,
    pub feature: usize,
    pub buffer: Buffer2D<LabelId>,
}

/// Everything needed to invert one action.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    slices: Vec<SliceSnapshot>,
    max_label: LabelId,
    lineage: Option<Lineage>,
}

impl UndoEntry {
    /// Snapshot the slices an action is about to touch.
    pub(crate) fn capture(
        store: &FrameStore,
        metadata: &MetadataTracker,
        lineage: Option<&Lineage>,
        touched: &BTreeSet<(usize, usize)>,
    ) -> Result<Self, EngineError> {
        let mut slices = Vec::with_capacity(touched.len());
        for &(frame, feature) in touched {
            slices.push(SliceSnapshot {
                frame,
                feature,
                buffer: store.labels(frame, feature)?.clone(),
            });
        }
        Ok(Self {
            slices,
            max_label: metadata.max_label(),
            lineage: lineage.cloned(),
        })
    }

    /// Frames this entry touches.
    pub(crate) fn frames(&self) -> BTreeSet<usize> {
        self.slices.iter().map(|s| s.frame).collect()
    }

    pub(crate) fn has_lineage(&self) -> bool {
        self.lineage.is_some()
    }

    /// Swap the stored state with the live state.
    ///
    /// The entry afterwards holds the state it displaced, flipping it from
    /// an undo into a redo (and back). Returns whether any per-frame id set
    /// changed. Shape drift between capture and restore means the engine
    /// itself is broken, reported as `Apply`.
    pub(crate) fn restore(
        &mut self,
        store: &mut FrameStore,
        metadata: &mut MetadataTracker,
        lineage: Option<&mut Lineage>,
    ) -> Result<bool, EngineError> {
        for snap in &mut self.slices {
            let live = store.labels_mut(snap.frame, snap.feature)?;
            if live.width() != snap.buffer.width() || live.height() != snap.buffer.height() {
                return Err(EngineError::Apply(format!(
                    "Snapshot of frame {} feature {} no longer matches the stack shape",
                    snap.frame, snap.feature
                )));
            }
            std::mem::swap(live, &mut snap.buffer);
        }
        metadata.swap_max_label(&mut self.max_label);
        let mut ids_changed = false;
        for snap in &self.slices {
            ids_changed |= metadata.rescan_frame(store, snap.frame, snap.feature)?;
        }
        match (&mut self.lineage, lineage) {
            (Some(stored), Some(live)) => std::mem::swap(stored, live),
            (None, _) => {}
            (Some(_), None) => {
                return Err(EngineError::Apply(
                    "Snapshot carries a lineage table but the project has none".into(),
                ));
            }
        }
        Ok(ids_changed)
    }
}

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

/// Ring buffer of undo entries, oldest dropped first.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    depth: usize,
}

impl UndoStack {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            entries: VecDeque::with_capacity(depth),
            depth,
        }
    }

    pub fn push(&mut self, entry: UndoEntry) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
