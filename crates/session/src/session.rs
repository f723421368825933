//! One loaded project behind its serialization point (PRD-08).
//!
//! A [`Session`] wraps a [`Project`] in a `Mutex`, so every apply, undo,
//! redo, query, and render snapshot for that project is strictly ordered.
//! Distinct sessions share nothing and run fully in parallel.
//!
//! Renders are two-phase: the slice and colormap are snapshotted under the
//! project lock and tagged with the current `revision`, then encoded on a
//! blocking thread. The result is cached only if the revision is unchanged
//! by the time encoding completes — a stale result is still returned to its
//! caller (it was consistent when snapshotted) but never cached.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use cytolab_core::render;
use cytolab_core::{
    Action, Buffer2D, ChangeSet, EngineError, FinalState, LabelId, Project, ProjectMetadata,
    RenderKey, RenderKind, RenderSpec, Timestamp,
};
use tokio::sync::Mutex;

use crate::error::SessionError;

// ---------------------------------------------------------------------------
// Render cache
// ---------------------------------------------------------------------------

/// Bounded PNG cache keyed by (frame, index, kind), evicting the oldest
/// insertion once full.
#[derive(Debug)]
struct RenderCache {
    capacity: usize,
    entries: HashMap<RenderKey, Arc<Vec<u8>>>,
    order: VecDeque<RenderKey>,
}

impl RenderCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &RenderKey) -> Option<Arc<Vec<u8>>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: RenderKey, bytes: Arc<Vec<u8>>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, bytes).is_none() {
            self.order.push_back(key);
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    /// Drop label renders of the given frames. Raw renders never go stale:
    /// raw channels are immutable for the life of a project.
    fn invalidate_frames(&mut self, frames: &BTreeSet<usize>) {
        if frames.is_empty() {
            return;
        }
        self.entries
            .retain(|key, _| !(key.2 == RenderKind::Labeled && frames.contains(&key.0)));
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The project plus its mutation counter. `revision` bumps on every
/// successful state change and tags render snapshots.
struct ProjectCell {
    project: Project,
    revision: u64,
}

/// A live project and its render cache.
pub struct Session {
    cell: Mutex<ProjectCell>,
    cache: Mutex<RenderCache>,
}

impl Session {
    pub(crate) fn new(project: Project, cache_capacity: usize) -> Self {
        Self {
            cell: Mutex::new(ProjectCell {
                project,
                revision: 0,
            }),
            cache: Mutex::new(RenderCache::new(cache_capacity)),
        }
    }

    pub(crate) async fn apply(&self, action: &Action) -> Result<ChangeSet, EngineError> {
        let mut cell = self.cell.lock().await;
        let changes = cell.project.apply(action)?;
        cell.revision += 1;
        self.cache.lock().await.invalidate_frames(&changes.frames_changed);
        Ok(changes)
    }

    pub(crate) async fn undo(&self) -> Result<Option<ChangeSet>, EngineError> {
        let mut cell = self.cell.lock().await;
        let changes = cell.project.undo()?;
        if let Some(changes) = &changes {
            cell.revision += 1;
            self.cache.lock().await.invalidate_frames(&changes.frames_changed);
        }
        Ok(changes)
    }

    pub(crate) async fn redo(&self) -> Result<Option<ChangeSet>, EngineError> {
        let mut cell = self.cell.lock().await;
        let changes = cell.project.redo()?;
        if let Some(changes) = &changes {
            cell.revision += 1;
            self.cache.lock().await.invalidate_frames(&changes.frames_changed);
        }
        Ok(changes)
    }

    /// Seal the project. Cached renders stay valid: the arrays are frozen
    /// from here on.
    pub(crate) async fn finish(&self) -> Result<FinalState, EngineError> {
        let mut cell = self.cell.lock().await;
        let state = cell.project.finish()?;
        cell.revision += 1;
        Ok(state)
    }

    pub(crate) async fn render(&self, spec: &RenderSpec) -> Result<Arc<Vec<u8>>, SessionError> {
        let key = spec.cache_key();
        if let Some(key) = key {
            if let Some(bytes) = self.cache.lock().await.get(&key) {
                return Ok(bytes);
            }
        }

        // Snapshot under the project lock; encode outside it.
        let (input, revision) = {
            let cell = self.cell.lock().await;
            (cell.project.render_input(spec)?, cell.revision)
        };
        let encoded = tokio::task::spawn_blocking(move || render::render(&input))
            .await
            .map_err(|e| SessionError::Render(e.to_string()))?;
        let bytes = Arc::new(encoded?);

        if let Some(key) = key {
            self.complete_render(key, revision, &bytes).await;
        }
        Ok(bytes)
    }

    /// Completion step of a render: cache the bytes only if the project is
    /// still at the revision the snapshot was tagged with. A stale result is
    /// dropped here so no later caller can observe it.
    async fn complete_render(&self, key: RenderKey, revision: u64, bytes: &Arc<Vec<u8>>) {
        // Lock order is always cell before cache.
        let cell = self.cell.lock().await;
        if cell.revision == revision {
            self.cache.lock().await.insert(key, Arc::clone(bytes));
        } else {
            tracing::debug!(
                tagged = revision,
                current = cell.revision,
                "Discarding stale render result from cache"
            );
        }
    }

    pub(crate) async fn label_array(
        &self,
        frame: usize,
        feature: usize,
    ) -> Result<Buffer2D<LabelId>, EngineError> {
        let cell = self.cell.lock().await;
        Ok(cell.project.label_array(frame, feature)?.clone())
    }

    pub(crate) async fn metadata(&self) -> ProjectMetadata {
        self.cell.lock().await.project.metadata_summary()
    }

    pub(crate) async fn finished_at(&self) -> Option<Timestamp> {
        self.cell.lock().await.project.finished_at()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cytolab_core::{EditMode, ProjectSource};
    use uuid::Uuid;

    fn key(frame: usize) -> RenderKey {
        (frame, 0, RenderKind::Labeled)
    }

    fn bytes(v: u8) -> Arc<Vec<u8>> {
        Arc::new(vec![v])
    }

    /// One 2x2 frame with label 1 in its top-left pixel.
    fn project() -> Project {
        let raw = vec![vec![Buffer2D::new(2, 2, 0.5_f32)]];
        let mut labels = Buffer2D::new(2, 2, 0);
        labels.set(0, 0, 1);
        let source = ProjectSource {
            raw,
            labels: vec![vec![labels]],
            lineage: None,
        };
        Project::create(Uuid::new_v4(), EditMode::Pixel, source).unwrap()
    }

    // -- cache ----

    #[test]
    fn cache_evicts_oldest_insertion_first() {
        let mut cache = RenderCache::new(2);
        cache.insert(key(0), bytes(0));
        cache.insert(key(1), bytes(1));
        cache.insert(key(2), bytes(2));

        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn cache_overwrite_keeps_insertion_age() {
        let mut cache = RenderCache::new(2);
        cache.insert(key(0), bytes(0));
        cache.insert(key(1), bytes(1));
        cache.insert(key(0), bytes(9));
        cache.insert(key(2), bytes(2));

        // key(0) was oldest despite the overwrite, so it went first.
        assert!(cache.get(&key(0)).is_none());
        assert_eq!(cache.get(&key(1)).unwrap().as_slice(), &[1]);
    }

    #[test]
    fn cache_invalidation_spares_raw_renders() {
        let mut cache = RenderCache::new(4);
        cache.insert(key(0), bytes(0));
        cache.insert((0, 0, RenderKind::Raw), bytes(7));
        cache.invalidate_frames(&[0].into_iter().collect());

        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&(0, 0, RenderKind::Raw)).is_some());
    }

    #[test]
    fn zero_capacity_cache_stores_nothing() {
        let mut cache = RenderCache::new(0);
        cache.insert(key(0), bytes(0));
        assert!(cache.get(&key(0)).is_none());
    }

    // -- render completion ----

    #[tokio::test]
    async fn completion_caches_result_at_matching_revision() {
        let session = Session::new(project(), 4);
        let encoded = bytes(7);

        session.complete_render(key(0), 0, &encoded).await;

        // The very Arc that was handed in is now served to later callers.
        let cached = session.cache.lock().await.get(&key(0)).unwrap();
        assert!(Arc::ptr_eq(&cached, &encoded));
    }

    #[tokio::test]
    async fn completion_discards_result_tagged_with_stale_revision() {
        let session = Session::new(project(), 4);
        let delete = Action::Delete {
            frame: 0,
            feature: 0,
            label: 1,
        };
        // The project moves on while the revision-0 snapshot is encoding.
        session.apply(&delete).await.unwrap();

        session.complete_render(key(0), 0, &bytes(7)).await;

        assert!(session.cache.lock().await.get(&key(0)).is_none());
    }
}
