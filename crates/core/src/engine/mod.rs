//! Action dispatch and undo/redo control (PRD-03).
//!
//! [`EditEngine`] drives every mutation of a project: it validates an
//! [`Action`] against the current state, snapshots the slices the action
//! will touch, executes it, and reports a [`ChangeSet`]. Failures after
//! validation roll the snapshot back before surfacing, so callers never see
//! a half-applied stack. Undo and redo replay the same snapshots in place.

pub(crate) mod ops;
pub(crate) mod track;

use std::collections::BTreeSet;

use tracing::{error, warn};

use crate::action::{Action, EditMode, MAX_BRUSH_SIZE, MAX_TRACE_POINTS};
use crate::changeset::ChangeSet;
use crate::error::EngineError;
use crate::frame::{Buffer2D, FrameStore};
use crate::lineage::Lineage;
use crate::metadata::MetadataTracker;
use crate::types::{LabelId, Point};
use crate::undo::{UndoEntry, UndoStack};

/// Mutable view of one project's state for the duration of a call.
pub struct EngineContext<'a> {
    pub store: &'a mut FrameStore,
    pub metadata: &'a mut MetadataTracker,
    /// Present in track mode only.
    pub lineage: Option<&'a mut Lineage>,
}

impl<'a> EngineContext<'a> {
    pub fn new(
        store: &'a mut FrameStore,
        metadata: &'a mut MetadataTracker,
        lineage: Option<&'a mut Lineage>,
    ) -> Self {
        Self {
            store,
            metadata,
            lineage,
        }
    }
}

fn missing_lineage() -> EngineError {
    EngineError::Apply("Track action dispatched without a lineage table".into())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Per-project action dispatcher and undo/redo controller.
#[derive(Debug)]
pub struct EditEngine {
    mode: EditMode,
    undo: UndoStack,
    redo: UndoStack,
}

impl EditEngine {
    pub fn new(mode: EditMode, undo_depth: usize) -> Self {
        Self {
            mode,
            undo: UndoStack::new(undo_depth),
            redo: UndoStack::new(undo_depth),
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Drop both stacks. Used when a project is finished.
    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Validate, snapshot, execute. A new action invalidates any redoable
    /// future even when it changes zero pixels.
    pub fn apply(
        &mut self,
        ctx: &mut EngineContext<'_>,
        action: &Action,
    ) -> Result<ChangeSet, EngineError> {
        if !action.allowed_in(self.mode) {
            return Err(EngineError::Validation(format!(
                "Action '{}' is not available in {} mode",
                action.kind(),
                self.mode.as_str()
            )));
        }
        let touched = self.validate(ctx, action)?;
        let mut entry =
            UndoEntry::capture(ctx.store, ctx.metadata, ctx.lineage.as_deref(), &touched)?;

        match self.execute(ctx, action) {
            Ok(changes) => {
                self.undo.push(entry);
                self.redo.clear();
                Ok(changes)
            }
            Err(err) => match entry.restore(ctx.store, ctx.metadata, ctx.lineage.as_deref_mut()) {
                Ok(_) => {
                    warn!(action = action.kind(), error = %err, "Action failed and was rolled back");
                    Err(err)
                }
                Err(rollback) => {
                    error!(
                        action = action.kind(),
                        error = %rollback,
                        "Rollback after failed action did not restore state"
                    );
                    Err(rollback)
                }
            },
        }
    }

    /// Revert the most recent action. `Ok(None)` when there is nothing to
    /// undo.
    pub fn undo(
        &mut self,
        ctx: &mut EngineContext<'_>,
    ) -> Result<Option<ChangeSet>, EngineError> {
        let Some(mut entry) = self.undo.pop() else {
            return Ok(None);
        };
        let changes = restore_entry(ctx, &mut entry)?;
        self.redo.push(entry);
        Ok(Some(changes))
    }

    /// Reapply the most recently undone action. `Ok(None)` when there is
    /// nothing to redo.
    pub fn redo(
        &mut self,
        ctx: &mut EngineContext<'_>,
    ) -> Result<Option<ChangeSet>, EngineError> {
        let Some(mut entry) = self.redo.pop() else {
            return Ok(None);
        };
        let changes = restore_entry(ctx, &mut entry)?;
        self.undo.push(entry);
        Ok(Some(changes))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check an action's parameters against the current state and return the
    /// (frame, feature) slices it may touch, for snapshotting. Nothing is
    /// mutated here.
    fn validate(
        &self,
        ctx: &EngineContext<'_>,
        action: &Action,
    ) -> Result<BTreeSet<(usize, usize)>, EngineError> {
        let store = &*ctx.store;
        match action {
            Action::Draw {
                frame,
                feature,
                trace,
                foreground,
                background,
                brush_size,
                ..
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                if trace.len() > MAX_TRACE_POINTS {
                    return Err(EngineError::Validation(format!(
                        "Trace of {} points exceeds the limit of {MAX_TRACE_POINTS}",
                        trace.len()
                    )));
                }
                for p in trace {
                    store.check_point(p.x, p.y)?;
                }
                if !(1..=MAX_BRUSH_SIZE).contains(brush_size) {
                    return Err(EngineError::Validation(format!(
                        "Invalid brush size {brush_size}. Must be between 1 and {MAX_BRUSH_SIZE}"
                    )));
                }
                self.require_writable(ctx, *feature, *foreground)?;
                if *background < 0 {
                    return Err(EngineError::Validation(format!(
                        "Invalid background id {background}. Must be zero or an existing id"
                    )));
                }
                if *background > 0 {
                    self.require_known(ctx, *feature, *background)?;
                }
                if foreground == background {
                    return Err(EngineError::Validation(
                        "Foreground and background ids must differ".into(),
                    ));
                }
                Ok(single(*frame, *feature))
            }
            Action::Flood {
                frame,
                feature,
                x,
                y,
                fill,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                store.check_point(*x, *y)?;
                self.require_writable(ctx, *feature, *fill)?;
                let seed = store.labels(*frame, *feature)?.get(*x, *y);
                if seed == Some(*fill) {
                    return Err(EngineError::Validation(format!(
                        "Pixel ({x}, {y}) already holds id {fill}"
                    )));
                }
                Ok(single(*frame, *feature))
            }
            Action::Trim {
                frame,
                feature,
                label,
                x,
                y,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                store.check_point(*x, *y)?;
                require_positive(*label)?;
                if store.labels(*frame, *feature)?.get(*x, *y) != Some(*label) {
                    return Err(EngineError::Validation(format!(
                        "Pixel ({x}, {y}) does not hold label {label}"
                    )));
                }
                Ok(single(*frame, *feature))
            }
            Action::FillHole {
                frame,
                feature,
                label,
                x,
                y,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                store.check_point(*x, *y)?;
                self.require_known(ctx, *feature, *label)?;
                if store.labels(*frame, *feature)?.get(*x, *y) != Some(0) {
                    return Err(EngineError::Validation(format!(
                        "Pixel ({x}, {y}) is not background"
                    )));
                }
                Ok(single(*frame, *feature))
            }
            Action::Erode {
                frame,
                feature,
                label,
            }
            | Action::Dilate {
                frame,
                feature,
                label,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                self.require_known(ctx, *feature, *label)?;
                Ok(single(*frame, *feature))
            }
            Action::Threshold {
                frame,
                feature,
                channel,
                label,
                x1,
                y1,
                x2,
                y2,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                store.check_channel(*channel)?;
                store.check_point(*x1, *y1)?;
                store.check_point(*x2, *y2)?;
                self.require_writable(ctx, *feature, *label)?;
                Ok(single(*frame, *feature))
            }
            Action::Watershed {
                frame,
                feature,
                label,
                x1,
                y1,
                x2,
                y2,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                store.check_point(*x1, *y1)?;
                store.check_point(*x2, *y2)?;
                self.require_known(ctx, *feature, *label)?;
                if (x1, y1) == (x2, y2) {
                    return Err(EngineError::Validation(
                        "Watershed seeds must differ".into(),
                    ));
                }
                let labels = store.labels(*frame, *feature)?;
                for (x, y) in [(*x1, *y1), (*x2, *y2)] {
                    if labels.get(x, y) != Some(*label) {
                        return Err(EngineError::Validation(format!(
                            "Pixel ({x}, {y}) does not hold label {label}"
                        )));
                    }
                }
                Ok(single(*frame, *feature))
            }
            Action::Replace { feature, a, b, frame }
            | Action::Swap { feature, a, b, frame } => {
                store.check_feature(*feature)?;
                if a == b {
                    return Err(EngineError::Validation(format!(
                        "Labels {a} and {b} must differ"
                    )));
                }
                self.require_known(ctx, *feature, *a)?;
                self.require_known(ctx, *feature, *b)?;
                match self.mode {
                    EditMode::Pixel => {
                        let Some(f) = frame else {
                            return Err(EngineError::Validation(format!(
                                "Action '{}' in pixel mode targets a single frame",
                                action.kind()
                            )));
                        };
                        store.check_frame(*f)?;
                        Ok(single(*f, *feature))
                    }
                    EditMode::ZStack => match frame {
                        Some(f) => {
                            store.check_frame(*f)?;
                            Ok(single(*f, *feature))
                        }
                        None => Ok(all_frames(store, *feature)),
                    },
                    EditMode::Track => {
                        if frame.is_some() {
                            return Err(EngineError::Validation(format!(
                                "Action '{}' in track mode always spans all frames",
                                action.kind()
                            )));
                        }
                        let lineage = ctx.lineage.as_deref().ok_or_else(missing_lineage)?;
                        let mut touched = BTreeSet::new();
                        for id in [*a, *b] {
                            if let Some(rec) = lineage.get(id) {
                                touched.extend(rec.frames.iter().map(|&f| (f, 0)));
                            }
                        }
                        Ok(touched)
                    }
                }
            }
            Action::Delete {
                frame,
                feature,
                label,
            }
            | Action::NewLabel {
                frame,
                feature,
                label,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                self.require_known(ctx, *feature, *label)?;
                Ok(single(*frame, *feature))
            }
            Action::NewLabelStack {
                frame,
                feature,
                label,
            } => {
                store.check_frame(*frame)?;
                store.check_feature(*feature)?;
                self.require_known(ctx, *feature, *label)?;
                Ok((*frame..store.shape().frames)
                    .map(|f| (f, *feature))
                    .collect())
            }
            Action::Predict { feature } => {
                store.check_feature(*feature)?;
                Ok((1..store.shape().frames).map(|f| (f, *feature)).collect())
            }
            Action::NewTrack { label, from_frame }
            | Action::DeleteTrack { label, from_frame } => {
                store.check_frame(*from_frame)?;
                let lineage = ctx.lineage.as_deref().ok_or_else(missing_lineage)?;
                let Some(rec) = lineage.get(*label) else {
                    return Err(EngineError::Validation(format!(
                        "Unknown track id {label}"
                    )));
                };
                Ok(rec
                    .frames
                    .iter()
                    .filter(|&&f| f >= *from_frame)
                    .map(|&f| (f, 0))
                    .collect())
            }
            Action::AddDaughter { .. } | Action::RemoveDaughter { .. } => {
                // Lineage-only: parameter rules live in the lineage table.
                Ok(BTreeSet::new())
            }
            Action::ReplaceFrame { frame, labels } => {
                store.check_frame(*frame)?;
                let shape = store.shape();
                let expected = shape.height * shape.width;
                if labels.len() != expected {
                    return Err(EngineError::MalformedInput(format!(
                        "Replacement frame has {} pixels but the stack shape needs {expected}",
                        labels.len()
                    )));
                }
                let lineage = ctx.lineage.as_deref().ok_or_else(missing_lineage)?;
                for &v in labels {
                    if v < 0 {
                        return Err(EngineError::MalformedInput(format!(
                            "Replacement frame contains negative label {v}"
                        )));
                    }
                    if v != 0 && !lineage.contains(v) {
                        return Err(EngineError::Validation(format!(
                            "Label {v} is unknown to the lineage table"
                        )));
                    }
                }
                Ok(single(*frame, 0))
            }
        }
    }

    /// An id that must already exist. In track mode the lineage table is the
    /// authority, so an erased-but-recorded track still qualifies.
    fn require_known(
        &self,
        ctx: &EngineContext<'_>,
        feature: usize,
        id: LabelId,
    ) -> Result<(), EngineError> {
        require_positive(id)?;
        let known = match (self.mode, ctx.lineage.as_deref()) {
            (EditMode::Track, Some(lineage)) => lineage.contains(id),
            _ => ctx.metadata.is_readable(feature, id)?,
        };
        if known {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "Label {id} is not present in feature {feature}"
            )))
        }
    }

    /// An id a mutation may write: an existing id, or exactly the next
    /// allocation (`max_label + 1`).
    fn require_writable(
        &self,
        ctx: &EngineContext<'_>,
        feature: usize,
        id: LabelId,
    ) -> Result<(), EngineError> {
        require_positive(id)?;
        if id == ctx.metadata.max_label() + 1 {
            return Ok(());
        }
        self.require_known(ctx, feature, id).map_err(|_| {
            EngineError::Validation(format!(
                "Invalid label {id}. Must be an existing id or {}",
                ctx.metadata.max_label() + 1
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn execute(
        &self,
        ctx: &mut EngineContext<'_>,
        action: &Action,
    ) -> Result<ChangeSet, EngineError> {
        let max_before = ctx.metadata.max_label();
        let mut changes = ChangeSet::new();

        match action {
            Action::Draw {
                frame,
                feature,
                trace,
                foreground,
                background,
                brush_size,
                erase,
            } => {
                let (from, to) = if *erase {
                    (*foreground, *background)
                } else {
                    (*background, *foreground)
                };
                let changed = ops::stamp_trace(
                    ctx.store.labels_mut(*frame, *feature)?,
                    trace,
                    *brush_size,
                    from,
                    to,
                );
                if changed {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Flood {
                frame,
                feature,
                x,
                y,
                fill,
            } => {
                let seed = Point { x: *x, y: *y };
                let filled = ops::flood(ctx.store.labels_mut(*frame, *feature)?, seed, *fill);
                if filled > 0 {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Trim {
                frame,
                feature,
                label,
                x,
                y,
            } => {
                let seed = Point { x: *x, y: *y };
                let removed = ops::trim(ctx.store.labels_mut(*frame, *feature)?, *label, seed);
                if removed > 0 {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::FillHole {
                frame,
                feature,
                label,
                x,
                y,
            } => {
                let seed = Point { x: *x, y: *y };
                match ops::fill_hole(ctx.store.labels_mut(*frame, *feature)?, *label, seed) {
                    Some(_) => {
                        self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                    }
                    None => {
                        return Err(EngineError::Validation(format!(
                            "Pixel ({x}, {y}) is not enclosed by or adjacent to label {label}"
                        )));
                    }
                }
            }
            Action::Erode {
                frame,
                feature,
                label,
            } => {
                if ops::erode(ctx.store.labels_mut(*frame, *feature)?, *label) {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Dilate {
                frame,
                feature,
                label,
            } => {
                if ops::dilate(ctx.store.labels_mut(*frame, *feature)?, *label) {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Threshold {
                frame,
                feature,
                channel,
                label,
                x1,
                y1,
                x2,
                y2,
            } => {
                let rect = ops::Rect::normalized(*x1, *y1, *x2, *y2);
                let raw = ctx.store.raw(*frame, *channel)?.clone();
                let changed =
                    ops::threshold(ctx.store.labels_mut(*frame, *feature)?, &raw, rect, *label);
                if changed {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Watershed {
                frame,
                feature,
                label,
                x1,
                y1,
                x2,
                y2,
            } => {
                let new_id = max_before + 1;
                let changed = ops::watershed_split(
                    ctx.store.labels_mut(*frame, *feature)?,
                    *label,
                    Point { x: *x1, y: *y1 },
                    Point { x: *x2, y: *y2 },
                    new_id,
                );
                if changed {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::Replace { feature, a, b, frame } => {
                if self.mode == EditMode::Track {
                    let EngineContext {
                        store,
                        metadata,
                        lineage,
                    } = ctx;
                    let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                    for f in track::merge_tracks(store, metadata, lineage, *a, *b)? {
                        changes.note_frame(f);
                    }
                    changes.note_metadata();
                } else {
                    for f in frame_range(ctx.store, *frame) {
                        if ops::replace_value(ctx.store.labels_mut(f, *feature)?, *b, *a) {
                            self.commit_slice(ctx, f, *feature, max_before, &mut changes)?;
                        }
                    }
                }
            }
            Action::Swap { feature, a, b, frame } => {
                if self.mode == EditMode::Track {
                    let EngineContext {
                        store,
                        metadata,
                        lineage,
                    } = ctx;
                    let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                    for f in track::swap_tracks(store, metadata, lineage, *a, *b)? {
                        changes.note_frame(f);
                    }
                    changes.note_metadata();
                } else {
                    for f in frame_range(ctx.store, *frame) {
                        if ops::swap_values(ctx.store.labels_mut(f, *feature)?, *a, *b) {
                            self.commit_slice(ctx, f, *feature, max_before, &mut changes)?;
                        }
                    }
                }
            }
            Action::Delete {
                frame,
                feature,
                label,
            } => {
                if ops::replace_value(ctx.store.labels_mut(*frame, *feature)?, *label, 0) {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::NewLabel {
                frame,
                feature,
                label,
            } => {
                let new_id = max_before + 1;
                if ops::replace_value(ctx.store.labels_mut(*frame, *feature)?, *label, new_id) {
                    self.commit_slice(ctx, *frame, *feature, max_before, &mut changes)?;
                }
            }
            Action::NewLabelStack {
                frame,
                feature,
                label,
            } => {
                let new_id = max_before + 1;
                for f in *frame..ctx.store.shape().frames {
                    if ops::replace_value(ctx.store.labels_mut(f, *feature)?, *label, new_id) {
                        self.commit_slice(ctx, f, *feature, max_before, &mut changes)?;
                    }
                }
            }
            Action::Predict { feature } => {
                let frames = ctx.store.shape().frames;
                let mut next = max_before;
                for f in 1..frames {
                    let prev = ctx.store.labels(f - 1, *feature)?.clone();
                    let cur = ctx.store.labels_mut(f, *feature)?;
                    let changed = ops::overlap_relabel(&prev, cur, || {
                        next += 1;
                        next
                    });
                    if changed {
                        self.commit_slice(ctx, f, *feature, max_before, &mut changes)?;
                    }
                }
            }
            Action::NewTrack { label, from_frame } => {
                let EngineContext {
                    store,
                    metadata,
                    lineage,
                } = ctx;
                let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                for f in track::new_track(store, metadata, lineage, *label, *from_frame)? {
                    changes.note_frame(f);
                }
                changes.note_metadata();
            }
            Action::AddDaughter { parent, daughter } => {
                let lineage = ctx.lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                lineage.add_daughter(*parent, *daughter)?;
                changes.note_metadata();
            }
            Action::RemoveDaughter { daughter } => {
                let lineage = ctx.lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                lineage.remove_daughter(*daughter)?;
                changes.note_metadata();
            }
            Action::DeleteTrack { label, from_frame } => {
                let EngineContext {
                    store,
                    metadata,
                    lineage,
                } = ctx;
                let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                for f in track::delete_track(store, metadata, lineage, *label, *from_frame)? {
                    changes.note_frame(f);
                }
                changes.note_metadata();
            }
            Action::ReplaceFrame { frame, labels } => {
                let shape = ctx.store.shape();
                let buffer = Buffer2D::from_vec(shape.width, shape.height, labels.clone())?;
                let EngineContext {
                    store,
                    metadata,
                    lineage,
                } = ctx;
                let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
                track::replace_frame(store, metadata, lineage, *frame, buffer)?;
                changes.note_frame(*frame);
                changes.note_metadata();
            }
        }

        let max_after = ctx.metadata.max_label();
        if max_after != max_before {
            changes.note_max_label(max_after);
        }
        Ok(changes)
    }

    /// Post-mutation bookkeeping for one slice: record the change, resync
    /// the metadata, and in track mode reconcile lineage presence.
    fn commit_slice(
        &self,
        ctx: &mut EngineContext<'_>,
        frame: usize,
        feature: usize,
        max_before: LabelId,
        changes: &mut ChangeSet,
    ) -> Result<(), EngineError> {
        changes.note_frame(frame);
        if ctx.metadata.rescan_frame(ctx.store, frame, feature)? {
            changes.note_metadata();
        }
        if self.mode == EditMode::Track {
            let EngineContext {
                metadata, lineage, ..
            } = ctx;
            let lineage = lineage.as_deref_mut().ok_or_else(missing_lineage)?;
            track::reconcile_frame(lineage, metadata, frame, max_before)?;
        }
        Ok(())
    }
}

fn require_positive(id: LabelId) -> Result<(), EngineError> {
    if id <= 0 {
        return Err(EngineError::Validation(format!(
            "Invalid label id {id}. Must be positive"
        )));
    }
    Ok(())
}

fn single(frame: usize, feature: usize) -> BTreeSet<(usize, usize)> {
    [(frame, feature)].into_iter().collect()
}

fn all_frames(store: &FrameStore, feature: usize) -> BTreeSet<(usize, usize)> {
    (0..store.shape().frames).map(|f| (f, feature)).collect()
}

fn frame_range(store: &FrameStore, frame: Option<usize>) -> std::ops::Range<usize> {
    match frame {
        Some(f) => f..f + 1,
        None => 0..store.shape().frames,
    }
}

fn restore_entry(
    ctx: &mut EngineContext<'_>,
    entry: &mut UndoEntry,
) -> Result<ChangeSet, EngineError> {
    let max_before = ctx.metadata.max_label();
    let ids_changed = entry.restore(ctx.store, ctx.metadata, ctx.lineage.as_deref_mut())?;

    let mut changes = ChangeSet::new();
    for frame in entry.frames() {
        changes.note_frame(frame);
    }
    let max_after = ctx.metadata.max_label();
    if max_after != max_before {
        changes.note_max_label(max_after);
    }
    if ids_changed || entry.has_lineage() {
        changes.note_metadata();
    }
    Ok(changes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
