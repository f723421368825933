//! Track lineage table for time-lapse projects (PRD-09).
//!
//! Track-mode projects carry one [`TrackRecord`] per track id: the frames the
//! track occupies plus its division links (parent and daughters). The table
//! is the source of truth for track identity; pixel edits are reconciled
//! against it after every action. Links are kept mutually consistent: a
//! record's `parent` always lists it back as a daughter.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::LabelId;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One track's lifetime and division links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Frames the track has pixels in.
    pub frames: BTreeSet<usize>,
    /// Track this one divided from, if recorded.
    pub parent: Option<LabelId>,
    /// Tracks recorded as dividing from this one.
    pub daughters: BTreeSet<LabelId>,
}

impl TrackRecord {
    pub fn first_frame(&self) -> Option<usize> {
        self.frames.first().copied()
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.frames.last().copied()
    }
}

// ---------------------------------------------------------------------------
// Lineage table
// ---------------------------------------------------------------------------

/// Mapping from track id to its record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    records: BTreeMap<LabelId, TrackRecord>,
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from per-frame id presence, with no division links.
    pub fn derive_from(presence: &[BTreeSet<LabelId>]) -> Self {
        let mut records: BTreeMap<LabelId, TrackRecord> = BTreeMap::new();
        for (frame, ids) in presence.iter().enumerate() {
            for &id in ids {
                records.entry(id).or_default().frames.insert(frame);
            }
        }
        Self { records }
    }

    /// Check an externally supplied table against actual id presence.
    ///
    /// Every id on a frame must have a record listing that frame and vice
    /// versa, and division links must be mutually consistent.
    pub fn validate_against(&self, presence: &[BTreeSet<LabelId>]) -> Result<(), EngineError> {
        for (frame, ids) in presence.iter().enumerate() {
            for &id in ids {
                match self.records.get(&id) {
                    None => {
                        return Err(EngineError::MalformedInput(format!(
                            "Label {id} appears in frame {frame} but has no lineage entry"
                        )));
                    }
                    Some(rec) if !rec.frames.contains(&frame) => {
                        return Err(EngineError::MalformedInput(format!(
                            "Lineage entry for track {id} does not list frame {frame} where it appears"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        for (&id, rec) in &self.records {
            for &frame in &rec.frames {
                let present = presence
                    .get(frame)
                    .is_some_and(|ids| ids.contains(&id));
                if !present {
                    return Err(EngineError::MalformedInput(format!(
                        "Lineage entry for track {id} lists frame {frame} where it does not appear"
                    )));
                }
            }
            if let Some(parent) = rec.parent {
                if parent == id {
                    return Err(EngineError::MalformedInput(format!(
                        "Track {id} is recorded as its own parent"
                    )));
                }
                let linked = self
                    .records
                    .get(&parent)
                    .is_some_and(|p| p.daughters.contains(&id));
                if !linked {
                    return Err(EngineError::MalformedInput(format!(
                        "Track {id} names parent {parent} which does not list it as a daughter"
                    )));
                }
            }
            for &d in &rec.daughters {
                let linked = self.records.get(&d).is_some_and(|c| c.parent == Some(id));
                if !linked {
                    return Err(EngineError::MalformedInput(format!(
                        "Track {id} lists daughter {d} which does not name it as parent"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn records(&self) -> &BTreeMap<LabelId, TrackRecord> {
        &self.records
    }

    pub fn contains(&self, id: LabelId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn get(&self, id: LabelId) -> Option<&TrackRecord> {
        self.records.get(&id)
    }

    /// All track ids, ascending. Records persist even when pixel edits empty
    /// their frame set, so this is the readable-track universe.
    pub fn ids(&self) -> Vec<LabelId> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // -- frame bookkeeping --------------------------------------------------

    /// Start a record for a freshly allocated track id.
    pub(crate) fn create(&mut self, id: LabelId, frames: BTreeSet<usize>) {
        self.records.insert(
            id,
            TrackRecord {
                frames,
                parent: None,
                daughters: BTreeSet::new(),
            },
        );
    }

    /// Record that `id` now has pixels in `frame`. The record must exist.
    pub(crate) fn note_presence(&mut self, id: LabelId, frame: usize) -> bool {
        match self.records.get_mut(&id) {
            Some(rec) => {
                rec.frames.insert(frame);
                true
            }
            None => false,
        }
    }

    /// Record that `id` no longer has pixels in `frame`. The record persists
    /// even when its frame set empties; only `truncate` removes records.
    pub(crate) fn note_absence(&mut self, id: LabelId, frame: usize) {
        if let Some(rec) = self.records.get_mut(&id) {
            rec.frames.remove(&frame);
        }
    }

    // -- repair operations ----------------------------------------------------

    /// Merge track `b` into track `a`: frames union, daughters adopted, every
    /// remaining reference to `b` redirected to `a`.
    pub fn merge(&mut self, a: LabelId, b: LabelId) -> Result<(), EngineError> {
        if a == b {
            return Err(EngineError::Validation(format!(
                "Cannot merge track {a} with itself"
            )));
        }
        if !self.records.contains_key(&a) {
            return Err(unknown_track(a));
        }
        let Some(b_rec) = self.records.remove(&b) else {
            return Err(unknown_track(b));
        };

        // Unlink b before the sweep so its old parent does not adopt a.
        if let Some(p) = b_rec.parent {
            if let Some(rec) = self.records.get_mut(&p) {
                rec.daughters.remove(&b);
            }
        }
        for rec in self.records.values_mut() {
            if rec.parent == Some(b) {
                rec.parent = Some(a);
            }
            if rec.daughters.remove(&b) {
                rec.daughters.insert(a);
            }
        }

        let a_rec = self
            .records
            .get_mut(&a)
            .ok_or_else(|| unknown_track(a))?;
        a_rec.frames.extend(b_rec.frames.iter().copied());
        a_rec
            .daughters
            .extend(b_rec.daughters.iter().copied().filter(|&d| d != a));
        a_rec.daughters.remove(&a);
        if a_rec.parent == Some(a) || a_rec.parent == Some(b) {
            a_rec.parent = None;
        }
        if a_rec.parent.is_none() {
            a_rec.parent = b_rec.parent.filter(|&p| p != a);
        }
        let parent = a_rec.parent;
        if let Some(p) = parent {
            if let Some(rec) = self.records.get_mut(&p) {
                rec.daughters.insert(a);
            }
        }
        Ok(())
    }

    /// Exchange the identities of two tracks, rewriting every link through
    /// the `a <-> b` permutation.
    pub fn swap(&mut self, a: LabelId, b: LabelId) -> Result<(), EngineError> {
        if a == b {
            return Err(EngineError::Validation(format!(
                "Cannot swap track {a} with itself"
            )));
        }
        if !self.records.contains_key(&a) {
            return Err(unknown_track(a));
        }
        if !self.records.contains_key(&b) {
            return Err(unknown_track(b));
        }

        let permute = |id: LabelId| {
            if id == a {
                b
            } else if id == b {
                a
            } else {
                id
            }
        };
        for rec in self.records.values_mut() {
            rec.parent = rec.parent.map(permute);
            rec.daughters = rec.daughters.iter().map(|&d| permute(d)).collect();
        }
        // Both keys verified above.
        if let (Some(a_rec), Some(b_rec)) = (self.records.remove(&a), self.records.remove(&b)) {
            self.records.insert(a, b_rec);
            self.records.insert(b, a_rec);
        }
        Ok(())
    }

    /// Split a track: frames at or after `from_frame` move to a fresh record
    /// under `new_id`, along with the daughters (divisions belong to the
    /// track's later life). The new record has no parent. Returns the moved
    /// frames so the caller can relabel their pixels.
    pub fn split(
        &mut self,
        label: LabelId,
        new_id: LabelId,
        from_frame: usize,
    ) -> Result<BTreeSet<usize>, EngineError> {
        let rec = self.records.get(&label).ok_or_else(|| unknown_track(label))?;
        let (Some(first), Some(last)) = (rec.first_frame(), rec.last_frame()) else {
            return Err(EngineError::Validation(format!(
                "Track {label} has no frames to split"
            )));
        };
        if from_frame <= first || from_frame > last {
            return Err(EngineError::Validation(format!(
                "Split frame {from_frame} must fall inside track {label}'s range ({first}..={last})"
            )));
        }

        let rec = self
            .records
            .get_mut(&label)
            .ok_or_else(|| unknown_track(label))?;
        let moved = rec.frames.split_off(&from_frame);
        let daughters = std::mem::take(&mut rec.daughters);
        for &d in &daughters {
            if let Some(child) = self.records.get_mut(&d) {
                child.parent = Some(new_id);
            }
        }
        self.records.insert(
            new_id,
            TrackRecord {
                frames: moved.clone(),
                parent: None,
                daughters,
            },
        );
        Ok(moved)
    }

    /// Record a division: `daughter` divided from `parent`.
    pub fn add_daughter(&mut self, parent: LabelId, daughter: LabelId) -> Result<(), EngineError> {
        if parent == daughter {
            return Err(EngineError::Validation(format!(
                "Track {parent} cannot be its own daughter"
            )));
        }
        let parent_first = self
            .records
            .get(&parent)
            .ok_or_else(|| unknown_track(parent))?
            .first_frame();
        let daughter_rec = self
            .records
            .get(&daughter)
            .ok_or_else(|| unknown_track(daughter))?;
        if let Some(existing) = daughter_rec.parent {
            return Err(EngineError::Validation(format!(
                "Track {daughter} already has parent {existing}"
            )));
        }
        match (parent_first, daughter_rec.first_frame()) {
            (Some(p), Some(d)) if d > p => {}
            _ => {
                return Err(EngineError::Validation(format!(
                    "Daughter {daughter} must first appear after parent {parent}"
                )));
            }
        }
        if let Some(rec) = self.records.get_mut(&daughter) {
            rec.parent = Some(parent);
        }
        if let Some(rec) = self.records.get_mut(&parent) {
            rec.daughters.insert(daughter);
        }
        Ok(())
    }

    /// Unlink a recorded division.
    pub fn remove_daughter(&mut self, daughter: LabelId) -> Result<(), EngineError> {
        let rec = self
            .records
            .get_mut(&daughter)
            .ok_or_else(|| unknown_track(daughter))?;
        let Some(parent) = rec.parent.take() else {
            return Err(EngineError::Validation(format!(
                "Track {daughter} has no recorded parent"
            )));
        };
        if let Some(rec) = self.records.get_mut(&parent) {
            rec.daughters.remove(&daughter);
        }
        Ok(())
    }

    /// Drop frames at or after `from_frame` from a track. Removing the last
    /// frame removes the whole record (unlinking it from its parent), which
    /// is refused when daughters would be orphaned. Returns the dropped
    /// frames so the caller can zero their pixels.
    pub fn truncate(
        &mut self,
        label: LabelId,
        from_frame: usize,
    ) -> Result<BTreeSet<usize>, EngineError> {
        let rec = self.records.get(&label).ok_or_else(|| unknown_track(label))?;
        if !rec.frames.iter().any(|&f| f >= from_frame) {
            return Err(EngineError::Validation(format!(
                "Track {label} has no frames at or after frame {from_frame}"
            )));
        }
        let empties = rec.frames.iter().all(|&f| f >= from_frame);
        if empties && !rec.daughters.is_empty() {
            return Err(EngineError::Validation(format!(
                "Deleting all of track {label} would orphan its daughters"
            )));
        }

        let rec = self
            .records
            .get_mut(&label)
            .ok_or_else(|| unknown_track(label))?;
        let removed = rec.frames.split_off(&from_frame);
        if rec.frames.is_empty() {
            let parent = rec.parent;
            self.records.remove(&label);
            if let Some(p) = parent {
                if let Some(rec) = self.records.get_mut(&p) {
                    rec.daughters.remove(&label);
                }
            }
        }
        Ok(removed)
    }
}

fn unknown_track(id: LabelId) -> EngineError {
    EngineError::Validation(format!("Unknown track id {id}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn frames(list: &[usize]) -> BTreeSet<usize> {
        list.iter().copied().collect()
    }

    /// Tracks: 1 spans 0..=2 and divides into 2 (frames 3..=4) and 3
    /// (frames 3..=5).
    fn sample() -> Lineage {
        let mut lineage = Lineage::new();
        lineage.create(1, frames(&[0, 1, 2]));
        lineage.create(2, frames(&[3, 4]));
        lineage.create(3, frames(&[3, 4, 5]));
        lineage.add_daughter(1, 2).unwrap();
        lineage.add_daughter(1, 3).unwrap();
        lineage
    }

    // -- derive / validate ----------------------------------------------------

    #[test]
    fn derive_builds_frame_sets() {
        let presence = vec![
            [1, 2].into_iter().collect::<BTreeSet<LabelId>>(),
            [2].into_iter().collect(),
            [2, 4].into_iter().collect(),
        ];
        let lineage = Lineage::derive_from(&presence);
        assert_eq!(lineage.ids(), vec![1, 2, 4]);
        assert_eq!(lineage.get(2).unwrap().frames, frames(&[0, 1, 2]));
        assert_eq!(lineage.get(4).unwrap().parent, None);
        assert!(lineage.validate_against(&presence).is_ok());
    }

    #[test]
    fn validate_rejects_missing_entry() {
        let lineage = Lineage::derive_from(&[[1].into_iter().collect::<BTreeSet<LabelId>>()]);
        let presence = vec![[1, 9].into_iter().collect::<BTreeSet<LabelId>>()];
        assert_matches!(
            lineage.validate_against(&presence),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn validate_rejects_frame_mismatch() {
        let mut lineage = Lineage::new();
        lineage.create(1, frames(&[0, 1]));
        let presence = vec![[1].into_iter().collect::<BTreeSet<LabelId>>()];
        assert_matches!(
            lineage.validate_against(&presence),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn validate_rejects_one_way_links() {
        let mut lineage = Lineage::new();
        lineage.create(1, frames(&[0]));
        lineage.create(2, frames(&[1]));
        lineage.records.get_mut(&2).unwrap().parent = Some(1);
        let presence = vec![
            [1].into_iter().collect::<BTreeSet<LabelId>>(),
            [2].into_iter().collect(),
        ];
        assert_matches!(
            lineage.validate_against(&presence),
            Err(EngineError::MalformedInput(_))
        );
    }

    // -- merge ----------------------------------------------------------------

    #[test]
    fn merge_unions_frames_and_adopts_daughters() {
        let mut lineage = sample();
        lineage.create(4, frames(&[5, 6]));
        lineage.add_daughter(3, 4).unwrap();

        // Merge 3 into 2: 2 takes 3's frames, daughter 4, and keeps parent 1.
        lineage.merge(2, 3).unwrap();
        assert!(!lineage.contains(3));
        let rec = lineage.get(2).unwrap();
        assert_eq!(rec.frames, frames(&[3, 4, 5]));
        assert_eq!(rec.parent, Some(1));
        assert!(rec.daughters.contains(&4));
        assert_eq!(lineage.get(4).unwrap().parent, Some(2));
        // 3 vanished from 1's daughter list without replacing it by 2 twice.
        assert_eq!(lineage.get(1).unwrap().daughters, [2].into_iter().collect());
    }

    #[test]
    fn merge_inherits_parent_when_absent() {
        let mut lineage = sample();
        lineage.create(7, frames(&[4, 5]));
        // 7 has no parent; merging 2 into it hands over 2's parentage.
        lineage.merge(7, 2).unwrap();
        assert_eq!(lineage.get(7).unwrap().parent, Some(1));
        assert!(lineage.get(1).unwrap().daughters.contains(&7));
        assert!(!lineage.get(1).unwrap().daughters.contains(&2));
    }

    #[test]
    fn merge_daughter_into_parent_drops_link() {
        let mut lineage = sample();
        lineage.merge(1, 2).unwrap();
        let rec = lineage.get(1).unwrap();
        assert_eq!(rec.parent, None);
        assert_eq!(rec.daughters, [3].into_iter().collect());
        assert_eq!(rec.frames, frames(&[0, 1, 2, 3, 4]));
    }

    #[test]
    fn merge_rejects_self_and_unknown() {
        let mut lineage = sample();
        assert_matches!(lineage.merge(1, 1), Err(EngineError::Validation(_)));
        assert_matches!(lineage.merge(1, 9), Err(EngineError::Validation(_)));
        assert_matches!(lineage.merge(9, 1), Err(EngineError::Validation(_)));
        // Failed merges leave the table intact.
        assert_eq!(lineage.len(), 3);
    }

    // -- swap -----------------------------------------------------------------

    #[test]
    fn swap_exchanges_records_and_links() {
        let mut lineage = sample();
        lineage.swap(1, 2).unwrap();
        // Old track 1 (the parent) now answers to id 2 and vice versa.
        assert_eq!(lineage.get(2).unwrap().frames, frames(&[0, 1, 2]));
        assert_eq!(lineage.get(1).unwrap().frames, frames(&[3, 4]));
        assert_eq!(lineage.get(1).unwrap().parent, Some(2));
        assert_eq!(
            lineage.get(2).unwrap().daughters,
            [1, 3].into_iter().collect()
        );
        assert_eq!(lineage.get(3).unwrap().parent, Some(2));
    }

    // -- split ----------------------------------------------------------------

    #[test]
    fn split_moves_tail_and_daughters() {
        let mut lineage = sample();
        let moved = lineage.split(1, 9, 2).unwrap();
        assert_eq!(moved, frames(&[2]));
        assert_eq!(lineage.get(1).unwrap().frames, frames(&[0, 1]));
        assert!(lineage.get(1).unwrap().daughters.is_empty());
        let new = lineage.get(9).unwrap();
        assert_eq!(new.frames, frames(&[2]));
        assert_eq!(new.parent, None);
        assert_eq!(new.daughters, [2, 3].into_iter().collect());
        assert_eq!(lineage.get(2).unwrap().parent, Some(9));
    }

    #[test]
    fn split_rejects_boundaries() {
        let mut lineage = sample();
        // At the first frame the whole track would move.
        assert_matches!(lineage.split(1, 9, 0), Err(EngineError::Validation(_)));
        // Past the last frame nothing would move.
        assert_matches!(lineage.split(1, 9, 3), Err(EngineError::Validation(_)));
    }

    // -- daughters --------------------------------------------------------------

    #[test]
    fn add_daughter_rejects_relinking() {
        let mut lineage = sample();
        lineage.create(5, frames(&[4, 5]));
        assert_matches!(lineage.add_daughter(5, 5), Err(EngineError::Validation(_)));
        // 2 already divides from 1.
        assert_matches!(lineage.add_daughter(5, 2), Err(EngineError::Validation(_)));
        // 1 first appears before 5 does, so it cannot be 5's daughter.
        assert_matches!(lineage.add_daughter(5, 1), Err(EngineError::Validation(_)));
        lineage.add_daughter(2, 5).unwrap();
        assert_eq!(lineage.get(5).unwrap().parent, Some(2));
    }

    #[test]
    fn remove_daughter_unlinks_both_sides() {
        let mut lineage = sample();
        lineage.remove_daughter(2).unwrap();
        assert_eq!(lineage.get(2).unwrap().parent, None);
        assert_eq!(lineage.get(1).unwrap().daughters, [3].into_iter().collect());
        assert_matches!(lineage.remove_daughter(2), Err(EngineError::Validation(_)));
    }

    // -- truncate ---------------------------------------------------------------

    #[test]
    fn truncate_partial_keeps_record() {
        let mut lineage = sample();
        let removed = lineage.truncate(3, 4).unwrap();
        assert_eq!(removed, frames(&[4, 5]));
        assert_eq!(lineage.get(3).unwrap().frames, frames(&[3]));
        assert_eq!(lineage.get(3).unwrap().parent, Some(1));
    }

    #[test]
    fn truncate_to_empty_removes_and_unlinks() {
        let mut lineage = sample();
        let removed = lineage.truncate(2, 0).unwrap();
        assert_eq!(removed, frames(&[3, 4]));
        assert!(!lineage.contains(2));
        assert_eq!(lineage.get(1).unwrap().daughters, [3].into_iter().collect());
    }

    #[test]
    fn truncate_refuses_to_orphan() {
        let mut lineage = sample();
        assert_matches!(lineage.truncate(1, 0), Err(EngineError::Validation(_)));
        assert!(lineage.contains(1));
        // Dropping only the tail of 1 is fine.
        lineage.truncate(1, 2).unwrap();
        assert_eq!(lineage.get(1).unwrap().frames, frames(&[0, 1]));
    }

    #[test]
    fn truncate_rejects_empty_range() {
        let mut lineage = sample();
        assert_matches!(lineage.truncate(2, 9), Err(EngineError::Validation(_)));
    }
}
