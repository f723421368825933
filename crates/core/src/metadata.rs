//! Derived per-project label facts (PRD-05).
//!
//! [`MetadataTracker`] caches facts the edit engine and renderer need between
//! actions: the allocation high-water mark, the set of ids present per frame
//! and per feature, and the stable color table. Everything here is derivable
//! from the label arrays; the engine recomputes only the frames an action
//! touched rather than rescanning the whole stack.

use std::collections::BTreeSet;

use crate::color::ColorMap;
use crate::error::EngineError;
use crate::frame::FrameStore;
use crate::types::LabelId;

/// Ids present in one feature's label slices.
#[derive(Debug, Clone)]
struct FeatureIds {
    /// Nonzero ids per frame.
    per_frame: Vec<BTreeSet<LabelId>>,
    /// Union of all frames.
    all: BTreeSet<LabelId>,
}

/// Cached derived facts for one project.
#[derive(Debug, Clone)]
pub struct MetadataTracker {
    /// Highest id ever present or allocated. Never lowered by deletes, so new
    /// ids are monotonically increasing; only undo restores an earlier value.
    max_label: LabelId,
    features: Vec<FeatureIds>,
    colors: ColorMap,
}

impl MetadataTracker {
    /// Scan every label slice of a store and build the tracker.
    pub fn scan(store: &FrameStore) -> Result<Self, EngineError> {
        let shape = store.shape();
        let mut tracker = Self {
            max_label: 0,
            features: (0..shape.features)
                .map(|_| FeatureIds {
                    per_frame: vec![BTreeSet::new(); shape.frames],
                    all: BTreeSet::new(),
                })
                .collect(),
            colors: ColorMap::new(),
        };
        for feature in 0..shape.features {
            for frame in 0..shape.frames {
                tracker.rescan_frame(store, frame, feature)?;
            }
        }
        Ok(tracker)
    }

    /// Highest id ever seen or allocated.
    pub fn max_label(&self) -> LabelId {
        self.max_label
    }

    /// Allocate a fresh id (`max_label + 1`) and assign its color.
    pub fn allocate(&mut self) -> LabelId {
        self.max_label += 1;
        self.colors.assign(self.max_label);
        self.max_label
    }

    /// Swap the high-water mark with a snapshot value (undo/redo support).
    pub(crate) fn swap_max_label(&mut self, other: &mut LabelId) {
        std::mem::swap(&mut self.max_label, other);
    }

    /// Ids currently present anywhere in a feature.
    pub fn readable_ids(&self, feature: usize) -> Result<&BTreeSet<LabelId>, EngineError> {
        self.feature(feature).map(|f| &f.all)
    }

    /// Whether an id is currently present in a feature.
    pub fn is_readable(&self, feature: usize, id: LabelId) -> Result<bool, EngineError> {
        Ok(self.feature(feature)?.all.contains(&id))
    }

    /// Ids present in one frame of a feature.
    pub fn frame_ids(
        &self,
        frame: usize,
        feature: usize,
    ) -> Result<&BTreeSet<LabelId>, EngineError> {
        let ids = self.feature(feature)?;
        ids.per_frame.get(frame).ok_or(EngineError::OutOfBounds {
            what: "frame",
            index: frame,
            extent: ids.per_frame.len(),
        })
    }

    /// Union of readable ids across all features, sorted.
    pub fn all_readable_ids(&self) -> Vec<LabelId> {
        let mut union = BTreeSet::new();
        for feature in &self.features {
            union.extend(feature.all.iter().copied());
        }
        union.into_iter().collect()
    }

    pub fn colors(&self) -> &ColorMap {
        &self.colors
    }

    /// Rescan one `(frame, feature)` slice after a mutation.
    ///
    /// Updates the per-frame id set, the feature union, the high-water mark,
    /// and assigns colors to newly seen ids. Returns whether the frame's id
    /// set changed.
    pub fn rescan_frame(
        &mut self,
        store: &FrameStore,
        frame: usize,
        feature: usize,
    ) -> Result<bool, EngineError> {
        let slice = store.labels(frame, feature)?;
        let mut ids = BTreeSet::new();
        for &v in slice.as_slice() {
            if v != 0 {
                ids.insert(v);
            }
        }

        for &id in &ids {
            if id > self.max_label {
                self.max_label = id;
            }
            self.colors.assign(id);
        }

        let entry = &mut self.features[feature].per_frame[frame];
        let changed = *entry != ids;
        *entry = ids;
        if changed {
            self.rebuild_union(feature);
        }
        Ok(changed)
    }

    fn rebuild_union(&mut self, feature: usize) {
        let ids = &mut self.features[feature];
        ids.all.clear();
        for frame in &ids.per_frame {
            ids.all.extend(frame.iter().copied());
        }
    }

    fn feature(&self, feature: usize) -> Result<&FeatureIds, EngineError> {
        self.features.get(feature).ok_or(EngineError::OutOfBounds {
            what: "feature",
            index: feature,
            extent: self.features.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Buffer2D;

    /// 2 frames, 1 channel, 1 feature, 4x2. Frame 0 holds ids {1, 2},
    /// frame 1 holds {2, 5}.
    fn store() -> FrameStore {
        let raw = vec![
            vec![Buffer2D::new(4, 2, 0.0_f32)],
            vec![Buffer2D::new(4, 2, 0.0_f32)],
        ];
        let f0 = Buffer2D::from_vec(4, 2, vec![1, 1, 0, 0, 2, 2, 0, 0]).unwrap();
        let f1 = Buffer2D::from_vec(4, 2, vec![0, 2, 2, 0, 0, 5, 5, 0]).unwrap();
        FrameStore::new(raw, vec![vec![f0], vec![f1]]).unwrap()
    }

    #[test]
    fn scan_collects_ids_and_max() {
        let tracker = MetadataTracker::scan(&store()).unwrap();
        assert_eq!(tracker.max_label(), 5);
        let ids: Vec<_> = tracker.readable_ids(0).unwrap().iter().copied().collect();
        assert_eq!(ids, vec![1, 2, 5]);
        assert_eq!(
            tracker.frame_ids(0, 0).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn scan_assigns_colors_once() {
        let tracker = MetadataTracker::scan(&store()).unwrap();
        assert!(tracker.colors().get(1).is_some());
        assert!(tracker.colors().get(5).is_some());
        assert!(tracker.colors().get(3).is_none());
    }

    #[test]
    fn allocate_is_monotonic() {
        let mut tracker = MetadataTracker::scan(&store()).unwrap();
        assert_eq!(tracker.allocate(), 6);
        assert_eq!(tracker.allocate(), 7);
        assert_eq!(tracker.max_label(), 7);
        assert!(tracker.colors().get(7).is_some());
    }

    #[test]
    fn rescan_reports_changes() {
        let mut store = store();
        let mut tracker = MetadataTracker::scan(&store).unwrap();

        // No mutation: rescan reports no change.
        assert!(!tracker.rescan_frame(&store, 0, 0).unwrap());

        // Erase id 1 from frame 0; the union keeps 2 (still in frame 1).
        for v in store.labels_mut(0, 0).unwrap().as_mut_slice() {
            if *v == 1 {
                *v = 0;
            }
        }
        assert!(tracker.rescan_frame(&store, 0, 0).unwrap());
        let ids: Vec<_> = tracker.readable_ids(0).unwrap().iter().copied().collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn deletes_do_not_lower_max_label() {
        let mut store = store();
        let mut tracker = MetadataTracker::scan(&store).unwrap();

        for frame in 0..2 {
            for v in store.labels_mut(frame, 0).unwrap().as_mut_slice() {
                if *v == 5 {
                    *v = 0;
                }
            }
            tracker.rescan_frame(&store, frame, 0).unwrap();
        }
        assert!(!tracker.readable_ids(0).unwrap().contains(&5));
        assert_eq!(tracker.max_label(), 5);
        assert_eq!(tracker.allocate(), 6);
    }

    #[test]
    fn colors_survive_disappearance() {
        let mut store = store();
        let mut tracker = MetadataTracker::scan(&store).unwrap();
        let before = tracker.colors().get(5).unwrap();

        for v in store.labels_mut(1, 0).unwrap().as_mut_slice() {
            if *v == 5 {
                *v = 0;
            }
        }
        tracker.rescan_frame(&store, 1, 0).unwrap();
        assert_eq!(tracker.colors().get(5), Some(before));
    }

    #[test]
    fn out_of_range_feature_is_rejected() {
        let tracker = MetadataTracker::scan(&store()).unwrap();
        assert!(tracker.readable_ids(4).is_err());
    }
}
