//! Project composition and lifecycle (PRD-01).
//!
//! A [`Project`] wires one frame stack, its metadata, an optional lineage
//! table, and an edit engine behind a single handle. It is `Active` from
//! creation until [`Project::finish`], after which every mutating call fails
//! with [`EngineError::ProjectFinished`] while read-only queries keep
//! working.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{Action, EditMode};
use crate::changeset::ChangeSet;
use crate::engine::{EditEngine, EngineContext};
use crate::error::EngineError;
use crate::frame::{Buffer2D, FrameStore};
use crate::lineage::Lineage;
use crate::metadata::MetadataTracker;
use crate::render::{RenderInput, RenderSpec};
use crate::types::{LabelId, Timestamp};
use crate::undo::DEFAULT_UNDO_DEPTH;

/// Longest display edge before clients should downscale.
const DISPLAY_EDGE: f64 = 800.0;

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// Decoded arrays handed to [`Project::create`].
///
/// `raw` is indexed `[frame][channel]`, `labels` is `[frame][feature]`. A
/// lineage table is only meaningful for track projects; when omitted there,
/// one is derived from label presence.
#[derive(Debug, Clone)]
pub struct ProjectSource {
    pub raw: Vec<Vec<Buffer2D<f32>>>,
    pub labels: Vec<Vec<Buffer2D<LabelId>>>,
    pub lineage: Option<Lineage>,
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// One loaded label-correction job.
#[derive(Debug)]
pub struct Project {
    token: Uuid,
    store: FrameStore,
    metadata: MetadataTracker,
    lineage: Option<Lineage>,
    engine: EditEngine,
    finished_at: Option<Timestamp>,
}

impl Project {
    pub fn create(token: Uuid, mode: EditMode, source: ProjectSource) -> Result<Self, EngineError> {
        Self::with_undo_depth(token, mode, source, DEFAULT_UNDO_DEPTH)
    }

    pub fn with_undo_depth(
        token: Uuid,
        mode: EditMode,
        source: ProjectSource,
        undo_depth: usize,
    ) -> Result<Self, EngineError> {
        let store = FrameStore::new(source.raw, source.labels)?;
        let shape = store.shape();

        for frame in 0..shape.frames {
            for feature in 0..shape.features {
                if let Some(&bad) = store
                    .labels(frame, feature)?
                    .as_slice()
                    .iter()
                    .find(|&&v| v < 0)
                {
                    return Err(EngineError::MalformedInput(format!(
                        "Label frame {frame} feature {feature} contains negative id {bad}"
                    )));
                }
            }
        }

        let metadata = MetadataTracker::scan(&store)?;
        let lineage = match mode {
            EditMode::Track => {
                if shape.features != 1 {
                    return Err(EngineError::MalformedInput(format!(
                        "Track projects take exactly one label feature, got {}",
                        shape.features
                    )));
                }
                let presence: Vec<BTreeSet<LabelId>> = (0..shape.frames)
                    .map(|f| metadata.frame_ids(f, 0).cloned())
                    .collect::<Result<_, _>>()?;
                Some(match source.lineage {
                    Some(lineage) => {
                        lineage.validate_against(&presence)?;
                        lineage
                    }
                    None => Lineage::derive_from(&presence),
                })
            }
            EditMode::Pixel | EditMode::ZStack => {
                if source.lineage.is_some() {
                    return Err(EngineError::MalformedInput(
                        "Lineage tables only apply to track projects".to_string(),
                    ));
                }
                None
            }
        };

        Ok(Self {
            token,
            store,
            metadata,
            lineage,
            engine: EditEngine::new(mode, undo_depth),
            finished_at: None,
        })
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn mode(&self) -> EditMode {
        self.engine.mode()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    fn check_active(&self) -> Result<(), EngineError> {
        if self.is_finished() {
            return Err(EngineError::ProjectFinished);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    pub fn apply(&mut self, action: &Action) -> Result<ChangeSet, EngineError> {
        self.check_active()?;
        let mut ctx =
            EngineContext::new(&mut self.store, &mut self.metadata, self.lineage.as_mut());
        self.engine.apply(&mut ctx, action)
    }

    pub fn undo(&mut self) -> Result<Option<ChangeSet>, EngineError> {
        self.check_active()?;
        let mut ctx =
            EngineContext::new(&mut self.store, &mut self.metadata, self.lineage.as_mut());
        self.engine.undo(&mut ctx)
    }

    pub fn redo(&mut self) -> Result<Option<ChangeSet>, EngineError> {
        self.check_active()?;
        let mut ctx =
            EngineContext::new(&mut self.store, &mut self.metadata, self.lineage.as_mut());
        self.engine.redo(&mut ctx)
    }

    /// Seal the project. History is dropped, the final arrays are cloned
    /// out, and every later mutating call fails with `ProjectFinished`.
    pub fn finish(&mut self) -> Result<FinalState, EngineError> {
        self.check_active()?;
        self.engine.clear_history();
        let finished_at = chrono::Utc::now();
        self.finished_at = Some(finished_at);

        let shape = self.store.shape();
        let mut labels = Vec::with_capacity(shape.frames);
        for frame in 0..shape.frames {
            let mut per_frame = Vec::with_capacity(shape.features);
            for feature in 0..shape.features {
                per_frame.push(self.store.labels(frame, feature)?.clone());
            }
            labels.push(per_frame);
        }

        Ok(FinalState {
            token: self.token,
            mode: self.engine.mode(),
            finished_at,
            max_label: self.metadata.max_label(),
            labels,
            lineage: self.lineage.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Queries (valid on finished projects too)
    // -----------------------------------------------------------------------

    pub fn label_array(&self, frame: usize, feature: usize) -> Result<&Buffer2D<LabelId>, EngineError> {
        self.store.labels(frame, feature)
    }

    pub fn lineage(&self) -> Option<&Lineage> {
        self.lineage.as_ref()
    }

    /// Snapshot everything one render needs. The snapshot owns its data, so
    /// encoding can happen after the project has moved on.
    pub fn render_input(&self, spec: &RenderSpec) -> Result<RenderInput, EngineError> {
        match *spec {
            RenderSpec::Raw {
                frame,
                channel,
                window,
            } => Ok(RenderInput::Raw {
                buffer: self.store.raw(frame, channel)?.clone(),
                window,
            }),
            RenderSpec::Labeled { frame, feature } => Ok(RenderInput::Labeled {
                buffer: self.store.labels(frame, feature)?.clone(),
                colors: self.metadata.colors().clone(),
            }),
        }
    }

    pub fn metadata_summary(&self) -> ProjectMetadata {
        let shape = self.store.shape();
        ProjectMetadata {
            token: self.token,
            mode: self.engine.mode(),
            frames: shape.frames,
            channels: shape.channels,
            features: shape.features,
            height: shape.height,
            width: shape.width,
            max_label: self.metadata.max_label(),
            readable_ids: self.metadata.all_readable_ids(),
            readable_tracks: self.lineage.as_ref().map(Lineage::ids),
            scale_factor: scale_factor(shape.height, shape.width),
            finished_at: self.finished_at,
        }
    }
}

/// Display downscale hint; rendering itself is always 1:1.
fn scale_factor(height: usize, width: usize) -> f64 {
    let edge = height.max(width).max(1) as f64;
    (DISPLAY_EDGE / edge).min(1.0)
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Everything a client needs to set up its view of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub token: Uuid,
    pub mode: EditMode,
    pub frames: usize,
    pub channels: usize,
    pub features: usize,
    pub height: usize,
    pub width: usize,
    pub max_label: LabelId,
    /// Union of ids with pixels, across features.
    pub readable_ids: Vec<LabelId>,
    /// Track ids from the lineage table. Track mode only.
    pub readable_tracks: Option<Vec<LabelId>>,
    pub scale_factor: f64,
    pub finished_at: Option<Timestamp>,
}

/// The sealed result of a finished project, handed to an exporter exactly
/// once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalState {
    pub token: Uuid,
    pub mode: EditMode,
    pub finished_at: Timestamp,
    pub max_label: LabelId,
    /// Indexed `[frame][feature]`.
    pub labels: Vec<Vec<Buffer2D<LabelId>>>,
    pub lineage: Option<Lineage>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render;
    use crate::types::Point;
    use assert_matches::assert_matches;

    fn source(frames: usize, width: usize, height: usize) -> ProjectSource {
        let raw = (0..frames)
            .map(|_| vec![Buffer2D::new(width, height, 0.5_f32)])
            .collect();
        let labels = (0..frames)
            .map(|f| {
                let mut buf = Buffer2D::new(width, height, 0);
                buf.set(0, 0, 1);
                if f == 0 {
                    buf.set(width - 1, height - 1, 2);
                }
                vec![buf]
            })
            .collect();
        ProjectSource {
            raw,
            labels,
            lineage: None,
        }
    }

    fn paint(frame: usize, foreground: LabelId, x: usize, y: usize) -> Action {
        Action::Draw {
            frame,
            feature: 0,
            trace: vec![Point { x, y }],
            foreground,
            background: 0,
            brush_size: 1,
            erase: false,
        }
    }

    // -- ingest ----

    #[test]
    fn create_scans_metadata() {
        let project =
            Project::create(Uuid::new_v4(), EditMode::ZStack, source(2, 4, 4)).unwrap();
        let meta = project.metadata_summary();
        assert_eq!(meta.frames, 2);
        assert_eq!(meta.max_label, 2);
        assert_eq!(meta.readable_ids, vec![1, 2]);
        assert_eq!(meta.readable_tracks, None);
        assert_eq!(meta.scale_factor, 1.0);
        assert_eq!(meta.finished_at, None);
    }

    #[test]
    fn create_rejects_negative_label_ids() {
        let mut src = source(1, 3, 3);
        src.labels[0][0].set(1, 1, -4);
        assert_matches!(
            Project::create(Uuid::new_v4(), EditMode::Pixel, src),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn create_rejects_multi_feature_track_projects() {
        let mut src = source(2, 3, 3);
        for frame in &mut src.labels {
            frame.push(Buffer2D::new(3, 3, 0));
        }
        assert_matches!(
            Project::create(Uuid::new_v4(), EditMode::Track, src),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn create_rejects_lineage_outside_track_mode() {
        let mut src = source(2, 3, 3);
        src.lineage = Some(Lineage::new());
        assert_matches!(
            Project::create(Uuid::new_v4(), EditMode::Pixel, src),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn track_project_derives_lineage_from_presence() {
        let project =
            Project::create(Uuid::new_v4(), EditMode::Track, source(2, 4, 4)).unwrap();
        let lineage = project.lineage().unwrap();
        assert!(lineage.contains(1));
        assert!(lineage.contains(2));
        assert_eq!(
            project.metadata_summary().readable_tracks,
            Some(vec![1, 2])
        );
    }

    #[test]
    fn track_project_validates_supplied_lineage() {
        let mut src = source(2, 4, 4);
        // Claims label 9 exists; the arrays disagree.
        let mut lineage = Lineage::new();
        lineage.create(9, [0].into_iter().collect());
        src.lineage = Some(lineage);
        assert_matches!(
            Project::create(Uuid::new_v4(), EditMode::Track, src),
            Err(EngineError::MalformedInput(_))
        );
    }

    #[test]
    fn scale_factor_shrinks_large_stacks() {
        let project =
            Project::create(Uuid::new_v4(), EditMode::Pixel, source(1, 1600, 2)).unwrap();
        assert_eq!(project.metadata_summary().scale_factor, 0.5);
    }

    // -- lifecycle ----

    #[test]
    fn finish_seals_the_project() {
        let mut project =
            Project::create(Uuid::new_v4(), EditMode::ZStack, source(2, 4, 4)).unwrap();
        project.apply(&paint(1, 3, 2, 2)).unwrap();

        let state = project.finish().unwrap();
        assert_eq!(state.max_label, 3);
        assert_eq!(state.labels[1][0].get(2, 2), Some(3));
        assert!(state.lineage.is_none());

        assert_matches!(
            project.apply(&paint(0, 3, 3, 3)),
            Err(EngineError::ProjectFinished)
        );
        assert_matches!(project.undo(), Err(EngineError::ProjectFinished));
        assert_matches!(project.redo(), Err(EngineError::ProjectFinished));
        // The failed calls left the arrays alone.
        assert_eq!(project.label_array(1, 0).unwrap().get(2, 2), Some(3));
        assert!(project.metadata_summary().finished_at.is_some());
    }

    #[test]
    fn finish_twice_fails() {
        let mut project =
            Project::create(Uuid::new_v4(), EditMode::Pixel, source(1, 3, 3)).unwrap();
        project.finish().unwrap();
        assert_matches!(project.finish(), Err(EngineError::ProjectFinished));
    }

    #[test]
    fn queries_survive_finish() {
        let mut project =
            Project::create(Uuid::new_v4(), EditMode::ZStack, source(2, 4, 4)).unwrap();
        project.finish().unwrap();

        let input = project
            .render_input(&RenderSpec::Labeled { frame: 0, feature: 0 })
            .unwrap();
        assert!(render::render(&input).is_ok());
        assert_eq!(project.label_array(0, 0).unwrap().get(0, 0), Some(1));
    }

    #[test]
    fn finish_exports_track_lineage() {
        let mut project =
            Project::create(Uuid::new_v4(), EditMode::Track, source(3, 4, 4)).unwrap();
        let state = project.finish().unwrap();
        let lineage = state.lineage.unwrap();
        assert!(lineage.contains(1));
        assert_eq!(
            lineage.get(1).unwrap().frames,
            (0..3).collect::<BTreeSet<_>>()
        );
    }

    // -- undo depth ----

    #[test]
    fn undo_depth_caps_history() {
        let mut project =
            Project::with_undo_depth(Uuid::new_v4(), EditMode::ZStack, source(1, 8, 1), 2)
                .unwrap();
        // Three strokes with ids 3, 4, 5; depth 2 drops the first.
        project.apply(&paint(0, 3, 2, 0)).unwrap();
        project.apply(&paint(0, 4, 3, 0)).unwrap();
        project.apply(&paint(0, 5, 4, 0)).unwrap();

        assert!(project.undo().unwrap().is_some());
        assert!(project.undo().unwrap().is_some());
        assert!(project.undo().unwrap().is_none());
        // The first stroke is beyond the horizon and stays applied.
        assert_eq!(project.label_array(0, 0).unwrap().get(2, 0), Some(3));
        assert_eq!(project.label_array(0, 0).unwrap().get(3, 0), Some(0));
    }
}
