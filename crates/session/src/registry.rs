//! Token-keyed session registry (PRD-08).
//!
//! [`SessionRegistry`] is the async boundary of the engine: hosts hand it
//! decoded arrays and get back a token, then drive edits, renders, and
//! queries through that token. Per-project calls serialize on the session's
//! own lock; the registry map itself is only held long enough to look the
//! session up, so projects never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use cytolab_core::{
    Action, Buffer2D, ChangeSet, EditMode, FinalState, LabelId, Project, ProjectMetadata,
    ProjectSource, RenderSpec,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::SessionError;
use crate::exporter::Exporter;
use crate::session::Session;

/// Owns every live project session.
///
/// Created once at host startup; the `Arc` is cheap to clone into handlers.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    config: RegistryConfig,
    exporter: Arc<dyn Exporter>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, exporter: Arc<dyn Exporter>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            exporter,
        }
    }

    /// Ingest decoded arrays as a new project and return its token.
    pub async fn create(
        &self,
        mode: EditMode,
        source: ProjectSource,
    ) -> Result<Uuid, SessionError> {
        let token = Uuid::new_v4();
        let project = Project::with_undo_depth(token, mode, source, self.config.undo_depth)?;
        let session = Arc::new(Session::new(project, self.config.render_cache));
        self.sessions.write().await.insert(token, session);
        tracing::info!(token = %token, mode = mode.as_str(), "Project session created");
        Ok(token)
    }

    async fn get(&self, token: Uuid) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(&token)
            .cloned()
            .ok_or(SessionError::NotFound(token))
    }

    // -----------------------------------------------------------------------
    // Action API
    // -----------------------------------------------------------------------

    pub async fn apply(&self, token: Uuid, action: &Action) -> Result<ChangeSet, SessionError> {
        let session = self.get(token).await?;
        let changes = session.apply(action).await?;
        tracing::debug!(
            token = %token,
            action = action.kind(),
            frames = changes.frames_changed.len(),
            "Action applied"
        );
        Ok(changes)
    }

    pub async fn undo(&self, token: Uuid) -> Result<Option<ChangeSet>, SessionError> {
        let session = self.get(token).await?;
        Ok(session.undo().await?)
    }

    pub async fn redo(&self, token: Uuid) -> Result<Option<ChangeSet>, SessionError> {
        let session = self.get(token).await?;
        Ok(session.redo().await?)
    }

    // -----------------------------------------------------------------------
    // Query API
    // -----------------------------------------------------------------------

    pub async fn render(
        &self,
        token: Uuid,
        spec: &RenderSpec,
    ) -> Result<Arc<Vec<u8>>, SessionError> {
        let session = self.get(token).await?;
        session.render(spec).await
    }

    pub async fn label_array(
        &self,
        token: Uuid,
        frame: usize,
        feature: usize,
    ) -> Result<Buffer2D<LabelId>, SessionError> {
        let session = self.get(token).await?;
        Ok(session.label_array(frame, feature).await?)
    }

    pub async fn metadata(&self, token: Uuid) -> Result<ProjectMetadata, SessionError> {
        let session = self.get(token).await?;
        Ok(session.metadata().await)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Seal a project and hand its final arrays to the exporter.
    ///
    /// The session stays registered for read-only queries until evicted or
    /// removed. A second call fails with `ProjectFinished` and never
    /// re-exports; an export failure also leaves the project finished.
    pub async fn finish(&self, token: Uuid) -> Result<FinalState, SessionError> {
        let session = self.get(token).await?;
        let state = session.finish().await?;
        self.exporter.export(&state).await.map_err(|e| {
            tracing::error!(token = %token, error = %e, "Export of finished project failed");
            SessionError::Export(e.to_string())
        })?;
        tracing::info!(token = %token, max_label = state.max_label, "Project finished and exported");
        Ok(state)
    }

    /// Drop a session outright, finished or not.
    pub async fn remove(&self, token: Uuid) -> Result<(), SessionError> {
        match self.sessions.write().await.remove(&token) {
            Some(_) => {
                tracing::info!(token = %token, "Session removed");
                Ok(())
            }
            None => Err(SessionError::NotFound(token)),
        }
    }

    /// Drop every session. Projects not finished are lost.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        tracing::info!(count, "Session registry shut down");
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Periodically evict finished sessions older than the configured TTL.
    /// Exits when the token is cancelled.
    pub async fn run_eviction(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.eviction_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session eviction loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let evicted = self.evict_finished().await;
                    if evicted > 0 {
                        tracing::info!(count = evicted, "Evicted finished sessions");
                    }
                }
            }
        }
    }

    /// Evict finished sessions whose TTL has elapsed. Returns how many went.
    pub async fn evict_finished(&self) -> usize {
        let now = chrono::Utc::now();
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (&token, session) in sessions.iter() {
                if let Some(finished_at) = session.finished_at().await {
                    let age = now.signed_duration_since(finished_at);
                    let old = age
                        .to_std()
                        .map(|d| d >= self.config.finished_ttl)
                        .unwrap_or(false);
                    if old {
                        expired.push(token);
                    }
                }
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for token in expired {
            if sessions.remove(&token).is_some() {
                tracing::info!(token = %token, "Evicted finished session");
                evicted += 1;
            }
        }
        evicted
    }
}
