//! Interactive correction engine for cell segmentation and tracking labels.
//!
//! `cytolab-core` holds everything that edits a label stack, synchronously
//! and without I/O beyond PNG encoding:
//!
//! - [`frame`] — `Buffer2D` pixel buffers and the validated `FrameStore`
//!   (PRD-02).
//! - [`action`] / [`engine`] — the closed action vocabulary and the
//!   dispatcher that validates, applies, and rolls back edits (PRD-03).
//! - [`undo`] — bounded snapshot stacks behind undo/redo (PRD-04).
//! - [`metadata`] / [`color`] — derived label facts and stable per-id
//!   colors (PRD-05).
//! - [`render`] — cubehelix raw views and outlined label views as PNG
//!   (PRD-06).
//! - [`lineage`] — the track lineage table for time-lapse projects
//!   (PRD-09).
//! - [`project`] — the composition root and Active → Finished lifecycle
//!   (PRD-01).
//!
//! The async session layer lives in `cytolab-session`.

pub mod action;
pub mod changeset;
pub mod color;
pub mod engine;
pub mod error;
pub mod frame;
pub mod lineage;
pub mod metadata;
pub mod project;
pub mod render;
pub mod types;
pub mod undo;

pub use action::{Action, EditMode};
pub use changeset::ChangeSet;
pub use color::ColorMap;
pub use engine::{EditEngine, EngineContext};
pub use error::EngineError;
pub use frame::{Buffer2D, FrameStore, StackShape};
pub use lineage::{Lineage, TrackRecord};
pub use metadata::MetadataTracker;
pub use project::{FinalState, Project, ProjectMetadata, ProjectSource};
pub use render::{RenderInput, RenderKey, RenderKind, RenderSpec};
pub use types::{LabelId, Point, Timestamp};
