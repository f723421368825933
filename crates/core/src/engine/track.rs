//! Track-mode bookkeeping between pixels and lineage (PRD-09).
//!
//! Track projects hold a single feature whose label ids double as track ids.
//! The functions here perform the lineage half of each track action and keep
//! the lineage frame sets synchronized with the pixels after generic edits.
//! Callers (the engine) have already validated indices and snapshotted state.

use std::collections::BTreeSet;

use crate::engine::ops;
use crate::error::EngineError;
use crate::frame::{Buffer2D, FrameStore};
use crate::lineage::Lineage;
use crate::metadata::MetadataTracker;
use crate::types::LabelId;

/// Bring the lineage frame sets in line with a frame's actual id presence.
///
/// Ids above `max_before` were allocated by the running action and get a
/// fresh record; any other id without a record means validation let
/// something through, which surfaces as `Apply`.
pub(crate) fn reconcile_frame(
    lineage: &mut Lineage,
    metadata: &MetadataTracker,
    frame: usize,
    max_before: LabelId,
) -> Result<(), EngineError> {
    let present = metadata.frame_ids(frame, 0)?.clone();

    let mut vanished: Vec<LabelId> = Vec::new();
    for (&id, rec) in lineage.records() {
        if rec.frames.contains(&frame) && !present.contains(&id) {
            vanished.push(id);
        }
    }
    for id in vanished {
        lineage.note_absence(id, frame);
    }

    for &id in &present {
        if lineage.note_presence(id, frame) {
            continue;
        }
        if id > max_before {
            lineage.create(id, [frame].into_iter().collect());
        } else {
            return Err(EngineError::Apply(format!(
                "Label {id} appeared in frame {frame} without a lineage entry"
            )));
        }
    }
    Ok(())
}

/// Split a track: pixels of `label` in frames at or after `from_frame` are
/// relabeled with a fresh id under a fresh record. Returns the frames
/// rewritten.
pub(crate) fn new_track(
    store: &mut FrameStore,
    metadata: &mut MetadataTracker,
    lineage: &mut Lineage,
    label: LabelId,
    from_frame: usize,
) -> Result<BTreeSet<usize>, EngineError> {
    let new_id = metadata.allocate();
    let moved = lineage.split(label, new_id, from_frame)?;
    for &frame in &moved {
        ops::replace_value(store.labels_mut(frame, 0)?, label, new_id);
        metadata.rescan_frame(store, frame, 0)?;
    }
    Ok(moved)
}

/// Merge track `b` into `a` across the whole stack. Returns the frames
/// whose pixels changed.
pub(crate) fn merge_tracks(
    store: &mut FrameStore,
    metadata: &mut MetadataTracker,
    lineage: &mut Lineage,
    a: LabelId,
    b: LabelId,
) -> Result<BTreeSet<usize>, EngineError> {
    lineage.merge(a, b)?;
    let mut changed = BTreeSet::new();
    for frame in 0..store.shape().frames {
        if ops::replace_value(store.labels_mut(frame, 0)?, b, a) {
            metadata.rescan_frame(store, frame, 0)?;
            changed.insert(frame);
        }
    }
    Ok(changed)
}

/// Exchange two track identities across the whole stack.
pub(crate) fn swap_tracks(
    store: &mut FrameStore,
    metadata: &mut MetadataTracker,
    lineage: &mut Lineage,
    a: LabelId,
    b: LabelId,
) -> Result<BTreeSet<usize>, EngineError> {
    lineage.swap(a, b)?;
    let mut changed = BTreeSet::new();
    for frame in 0..store.shape().frames {
        if ops::swap_values(store.labels_mut(frame, 0)?, a, b) {
            metadata.rescan_frame(store, frame, 0)?;
            changed.insert(frame);
        }
    }
    Ok(changed)
}

/// Zero a track's pixels from `from_frame` on and truncate its record.
pub(crate) fn delete_track(
    store: &mut FrameStore,
    metadata: &mut MetadataTracker,
    lineage: &mut Lineage,
    label: LabelId,
    from_frame: usize,
) -> Result<BTreeSet<usize>, EngineError> {
    let removed = lineage.truncate(label, from_frame)?;
    for &frame in &removed {
        ops::replace_value(store.labels_mut(frame, 0)?, label, 0);
        metadata.rescan_frame(store, frame, 0)?;
    }
    Ok(removed)
}

/// Overwrite one label frame wholesale and resync lineage presence for every
/// id that gained or lost the frame. Ids in the new array were validated
/// against the lineage table before this runs.
pub(crate) fn replace_frame(
    store: &mut FrameStore,
    metadata: &mut MetadataTracker,
    lineage: &mut Lineage,
    frame: usize,
    labels: Buffer2D<LabelId>,
) -> Result<(), EngineError> {
    let max_before = metadata.max_label();
    store.set_labels(frame, 0, labels)?;
    metadata.rescan_frame(store, frame, 0)?;
    reconcile_frame(lineage, metadata, frame, max_before)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// 3 frames, 1 feature, 3x1. Track 1 spans all frames; track 2 appears
    /// in frames 1 and 2.
    fn fixture() -> (FrameStore, MetadataTracker, Lineage) {
        let raw = (0..3)
            .map(|_| vec![Buffer2D::new(3, 1, 0.0_f32)])
            .collect::<Vec<_>>();
        let labels = vec![
            vec![Buffer2D::from_vec(3, 1, vec![1, 0, 0]).unwrap()],
            vec![Buffer2D::from_vec(3, 1, vec![1, 0, 2]).unwrap()],
            vec![Buffer2D::from_vec(3, 1, vec![1, 0, 2]).unwrap()],
        ];
        let store = FrameStore::new(raw, labels).unwrap();
        let metadata = MetadataTracker::scan(&store).unwrap();
        let presence: Vec<BTreeSet<LabelId>> = (0..3)
            .map(|f| metadata.frame_ids(f, 0).unwrap().clone())
            .collect();
        let lineage = Lineage::derive_from(&presence);
        (store, metadata, lineage)
    }

    #[test]
    fn reconcile_tracks_gains_and_losses() {
        let (mut store, mut metadata, mut lineage) = fixture();
        let max_before = metadata.max_label();

        // Erase track 2 from frame 2 and paint a fresh id 3.
        let slice = store.labels_mut(2, 0).unwrap();
        slice.set(2, 0, 0);
        slice.set(1, 0, 3);
        metadata.rescan_frame(&store, 2, 0).unwrap();

        reconcile_frame(&mut lineage, &metadata, 2, max_before).unwrap();
        assert_eq!(
            lineage.get(2).unwrap().frames,
            [1].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(
            lineage.get(3).unwrap().frames,
            [2].into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn reconcile_rejects_unallocated_strangers() {
        let (mut store, mut metadata, mut lineage) = fixture();

        store.labels_mut(0, 0).unwrap().set(1, 0, 9);
        metadata.rescan_frame(&store, 0, 0).unwrap();
        // Pretend 9 was never allocated by passing the raised mark.
        let max_now = metadata.max_label();
        assert_matches!(
            reconcile_frame(&mut lineage, &metadata, 0, max_now),
            Err(EngineError::Apply(_))
        );
    }

    #[test]
    fn new_track_relabels_tail_frames() {
        let (mut store, mut metadata, mut lineage) = fixture();
        let moved = new_track(&mut store, &mut metadata, &mut lineage, 1, 1).unwrap();
        assert_eq!(moved, [1, 2].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(store.labels(0, 0).unwrap().get(0, 0), Some(1));
        assert_eq!(store.labels(1, 0).unwrap().get(0, 0), Some(3));
        assert_eq!(store.labels(2, 0).unwrap().get(0, 0), Some(3));
        assert_eq!(lineage.get(3).unwrap().frames, moved);
        assert_eq!(metadata.max_label(), 3);
    }

    #[test]
    fn merge_tracks_rewrites_all_frames() {
        let (mut store, mut metadata, mut lineage) = fixture();
        let changed = merge_tracks(&mut store, &mut metadata, &mut lineage, 1, 2).unwrap();
        assert_eq!(changed, [1, 2].into_iter().collect::<BTreeSet<_>>());
        assert!(!lineage.contains(2));
        assert_eq!(store.labels(1, 0).unwrap().get(2, 0), Some(1));
        assert!(!metadata.is_readable(0, 2).unwrap());
    }

    #[test]
    fn swap_tracks_exchanges_pixels_and_records() {
        let (mut store, mut metadata, mut lineage) = fixture();
        swap_tracks(&mut store, &mut metadata, &mut lineage, 1, 2).unwrap();
        assert_eq!(store.labels(1, 0).unwrap().get(0, 0), Some(2));
        assert_eq!(store.labels(1, 0).unwrap().get(2, 0), Some(1));
        assert_eq!(
            lineage.get(1).unwrap().frames,
            [1, 2].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(
            lineage.get(2).unwrap().frames,
            [0, 1, 2].into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn delete_track_zeroes_tail() {
        let (mut store, mut metadata, mut lineage) = fixture();
        let removed = delete_track(&mut store, &mut metadata, &mut lineage, 2, 2).unwrap();
        assert_eq!(removed, [2].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(store.labels(2, 0).unwrap().get(2, 0), Some(0));
        assert_eq!(store.labels(1, 0).unwrap().get(2, 0), Some(2));
        assert_eq!(
            lineage.get(2).unwrap().frames,
            [1].into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn replace_frame_resyncs_presence() {
        let (mut store, mut metadata, mut lineage) = fixture();
        // Frame 2 now holds only track 2.
        let fresh = Buffer2D::from_vec(3, 1, vec![0, 2, 2]).unwrap();
        replace_frame(&mut store, &mut metadata, &mut lineage, 2, fresh).unwrap();
        assert_eq!(
            lineage.get(1).unwrap().frames,
            [0, 1].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(lineage.get(2).unwrap().frames.contains(&2));
    }
}
