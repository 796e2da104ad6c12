//! Generation Service - Two-phase batch generation of world-building records
//!
//! A run asks the transport for a manifest (the list of records to create),
//! then requests each item's details in manifest order. Every detail reply is
//! parsed, staged and committed on its own, so a failure late in the run
//! never loses the records already merged.
//!
//! ```text
//! Idle -> ManifestRequested -> ManifestReceived -> DetailLoop(i) -> Completed
//!              |                                       |
//!              +--> Failed                             +--> Failed (project gone, store error)
//! any non-terminal state --> Cancelled
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::application::ports::outbound::{GenerationTransportPort, ProjectStorePort};
use crate::application::services::accumulator::{Accumulator, CommitOutcome};
use crate::application::services::consistency_verifier::{
    ConsistencyVerifier, Verification, VerifyError,
};
use crate::application::services::llm::response_parser::{self, ManifestParseError};
use crate::domain::aggregates::ProjectAggregate;
use crate::domain::entities::{Element, GenerationManifestItem};
use crate::domain::value_objects::{Category, ElementId, GenerationRunId, ProjectId};

/// Progress reported once the manifest is in hand
const MANIFEST_PROGRESS: f32 = 0.1;

// ============================================================================
// Errors
// ============================================================================

/// Everything that can go wrong during a run
///
/// Only `ManifestParse`, `NoActiveProject`, `Store` and a manifest-phase
/// `Transport` stop a run; the rest are collected in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationError {
    #[error("Manifest could not be parsed: {reason}")]
    ManifestParse { reason: String },
    #[error("No records could be parsed for '{item_name}' ({category})")]
    DetailParse { item_name: String, category: Category },
    #[error("Transport failure: {reason}")]
    Transport {
        item_name: Option<String>,
        reason: String,
    },
    #[error("'{element_name}' ({element_id}) is missing from {category} after retry")]
    MergeVerification {
        element_id: ElementId,
        element_name: String,
        category: Category,
    },
    #[error("Project {project_id} is not available")]
    NoActiveProject { project_id: ProjectId },
    #[error("Project store failure: {reason}")]
    Store { reason: String },
}

impl GenerationError {
    /// Whether this error ends the run wherever it occurs
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ManifestParse { .. } | Self::NoActiveProject { .. } | Self::Store { .. }
        )
    }

    fn store(error: anyhow::Error) -> Self {
        Self::Store {
            reason: format!("{:#}", error),
        }
    }
}

impl From<ManifestParseError> for GenerationError {
    fn from(error: ManifestParseError) -> Self {
        Self::ManifestParse {
            reason: error.to_string(),
        }
    }
}

impl From<VerifyError> for GenerationError {
    fn from(error: VerifyError) -> Self {
        match error {
            VerifyError::NoActiveProject(project_id) => Self::NoActiveProject { project_id },
            VerifyError::Store(e) => Self::store(e),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    Idle,
    ManifestRequested,
    ManifestReceived,
    DetailLoop { index: usize },
    Completed,
    Cancelled,
    Failed,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ManifestRequested => "manifest_requested",
            Self::ManifestReceived => "manifest_received",
            Self::DetailLoop { .. } => "detail_loop",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Index of the manifest item being generated, if in the detail loop
    pub fn item_index(&self) -> Option<usize> {
        match self {
            Self::DetailLoop { index } => Some(*index),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub instruction: String,
    /// Category for manifest items that do not name one
    #[serde(default)]
    pub default_category: Option<Category>,
    /// Categories whose existing elements are sent along as context
    #[serde(default)]
    pub context_categories: Vec<Category>,
}

impl GenerationRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            default_category: None,
            context_categories: Vec::new(),
        }
    }

    pub fn with_default_category(mut self, category: Category) -> Self {
        self.default_category = Some(category);
        self
    }

    pub fn with_context_categories(mut self, categories: Vec<Category>) -> Self {
        self.context_categories = categories;
        self
    }
}

/// State of one run, owned by the service while the run executes
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSession {
    pub run_id: GenerationRunId,
    pub project_id: ProjectId,
    pub instruction: String,
    #[serde(flatten)]
    pub state: GenerationState,
    pub manifest: Vec<GenerationManifestItem>,
    pub completed_count: usize,
    pub generated_count: usize,
    pub failed_count: usize,
    pub progress: f32,
    pub cancelled: bool,
    pub errors: Vec<GenerationError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationSession {
    fn new(project_id: ProjectId, instruction: String) -> Self {
        Self {
            run_id: GenerationRunId::new(),
            project_id,
            instruction,
            state: GenerationState::Idle,
            manifest: Vec::new(),
            completed_count: 0,
            generated_count: 0,
            failed_count: 0,
            progress: 0.0,
            cancelled: false,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn summary(&self) -> GenerationSummary {
        GenerationSummary {
            run_id: self.run_id,
            project_id: self.project_id,
            state: self.state,
            elements_generated: self.generated_count,
            items_completed: self.completed_count,
            items_failed: self.failed_count,
            errors: self.errors.clone(),
        }
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub run_id: GenerationRunId,
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub state: GenerationState,
    pub elements_generated: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    pub errors: Vec<GenerationError>,
}

/// Shared cancellation flag, checked by the run between items
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A run about to be executed, together with its session
pub struct GenerationRun {
    session: GenerationSession,
    request: GenerationRequest,
    cancel: CancelToken,
    snapshots: watch::Sender<GenerationSession>,
}

/// Read-only view of a run, held by whoever started it
#[derive(Clone)]
pub struct GenerationRunHandle {
    pub run_id: GenerationRunId,
    pub project_id: ProjectId,
    cancel: CancelToken,
    snapshots: watch::Receiver<GenerationSession>,
}

impl GenerationRun {
    pub fn new(project_id: ProjectId, request: GenerationRequest) -> (Self, GenerationRunHandle) {
        let session = GenerationSession::new(project_id, request.instruction.clone());
        let (snapshots, receiver) = watch::channel(session.clone());
        let cancel = CancelToken::new();
        let handle = GenerationRunHandle {
            run_id: session.run_id,
            project_id,
            cancel: cancel.clone(),
            snapshots: receiver,
        };
        let run = Self {
            session,
            request,
            cancel,
            snapshots,
        };
        (run, handle)
    }

    pub fn run_id(&self) -> GenerationRunId {
        self.session.run_id
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.clone());
    }

    fn set_state(&mut self, state: GenerationState) {
        self.session.state = state;
        self.publish();
    }

    fn set_progress(&mut self, progress: f32) {
        // Never move backwards
        self.session.progress = progress.clamp(self.session.progress, 1.0);
    }

    fn finish(&mut self, state: GenerationState) -> GenerationSummary {
        self.session.state = state;
        self.session.finished_at = Some(Utc::now());
        self.publish();
        self.session.summary()
    }
}

impl GenerationRunHandle {
    /// Latest snapshot of the session
    pub fn snapshot(&self) -> GenerationSession {
        self.snapshots.borrow().clone()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the run reached a terminal state or was dropped without one
    pub fn is_finished(&self) -> bool {
        self.snapshots.borrow().state.is_terminal() || self.snapshots.has_changed().is_err()
    }
}

// ============================================================================
// Events
// ============================================================================

/// Notifications emitted while a run executes
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Progress {
        run_id: GenerationRunId,
        project_id: ProjectId,
        progress: f32,
        current_item: Option<String>,
        index: usize,
        total: usize,
    },
    CategoryUpdated {
        run_id: GenerationRunId,
        project_id: ProjectId,
        category: Category,
    },
    ItemFailed {
        run_id: GenerationRunId,
        project_id: ProjectId,
        item_name: String,
        category: Category,
        reason: String,
    },
    VerificationWarning {
        run_id: GenerationRunId,
        project_id: ProjectId,
        element_id: ElementId,
        element_name: String,
        category: Category,
    },
    Completed {
        summary: GenerationSummary,
    },
    Cancelled {
        summary: GenerationSummary,
    },
    Failed {
        summary: GenerationSummary,
        error: GenerationError,
    },
}

// ============================================================================
// Service
// ============================================================================

/// Drives generation runs against a transport and a project store
pub struct GenerationService<T: GenerationTransportPort + ?Sized, S: ProjectStorePort> {
    transport: Arc<T>,
    store: Arc<S>,
    verifier: ConsistencyVerifier<S>,
    events: UnboundedSender<GenerationEvent>,
}

impl<T: GenerationTransportPort + ?Sized, S: ProjectStorePort> GenerationService<T, S> {
    /// Create a new generation service
    ///
    /// # Arguments
    ///
    /// * `transport` - Remote generation protocol
    /// * `store` - Canonical project store
    /// * `verify_retry_delay` - Pause before the verifier's single retry
    /// * `events` - Channel the run's notifications are sent on
    pub fn new(
        transport: Arc<T>,
        store: Arc<S>,
        verify_retry_delay: Duration,
        events: UnboundedSender<GenerationEvent>,
    ) -> Self {
        Self {
            transport,
            verifier: ConsistencyVerifier::new(store.clone(), verify_retry_delay),
            store,
            events,
        }
    }

    /// Execute a run to its end
    ///
    /// Returns the summary for completed and cancelled runs and the fatal
    /// error for failed ones. In both cases the terminal event has already
    /// been sent.
    #[instrument(skip(self, run, accumulator), fields(run_id = %run.session.run_id, project_id = %run.session.project_id))]
    pub async fn run(
        &self,
        mut run: GenerationRun,
        accumulator: Arc<Mutex<Accumulator>>,
    ) -> Result<GenerationSummary, GenerationError> {
        match self.execute(&mut run, &accumulator).await {
            Ok(()) if run.session.cancelled => {
                let summary = run.finish(GenerationState::Cancelled);
                info!(
                    completed = summary.items_completed,
                    generated = summary.elements_generated,
                    "Generation cancelled"
                );
                self.emit(GenerationEvent::Cancelled {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Ok(()) => {
                run.set_progress(1.0);
                let total = run.session.manifest.len();
                self.emit_progress(&run, None, total, total);
                let summary = run.finish(GenerationState::Completed);
                info!(
                    completed = summary.items_completed,
                    failed = summary.items_failed,
                    generated = summary.elements_generated,
                    errors = summary.errors.len(),
                    "Generation completed"
                );
                self.emit(GenerationEvent::Completed {
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(err) => {
                error!("Generation failed: {}", err);
                let summary = run.finish(GenerationState::Failed);
                self.emit(GenerationEvent::Failed {
                    summary,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut GenerationRun,
        accumulator: &Mutex<Accumulator>,
    ) -> Result<(), GenerationError> {
        let project_id = run.session.project_id;
        let project = self
            .store
            .read(project_id)
            .await
            .map_err(GenerationError::store)?
            .ok_or(GenerationError::NoActiveProject { project_id })?;
        let context = gather_context(&project, &run.request.context_categories);

        if self.check_cancelled(run) {
            return Ok(());
        }

        // Phase 1: manifest
        run.set_progress(0.0);
        run.set_state(GenerationState::ManifestRequested);
        self.emit_progress(run, None, 0, 0);

        let raw = self
            .transport
            .request_manifest(&run.request.instruction, &context)
            .await
            .map_err(|e| GenerationError::Transport {
                item_name: None,
                reason: format!("{:#}", e),
            })?;
        let manifest = response_parser::parse_manifest(&raw, run.request.default_category)?;

        info!(items = manifest.len(), "Manifest received");
        run.session.manifest = manifest.clone();
        run.set_progress(MANIFEST_PROGRESS);
        run.set_state(GenerationState::ManifestReceived);

        // Phase 2: details, one item at a time
        let total = manifest.len();
        for (index, item) in manifest.iter().enumerate() {
            if self.check_cancelled(run) {
                return Ok(());
            }

            run.set_progress(MANIFEST_PROGRESS + (1.0 - MANIFEST_PROGRESS) * index as f32 / total as f32);
            run.set_state(GenerationState::DetailLoop { index });
            self.emit_progress(run, Some(item.name.clone()), index, total);

            let raw = match self
                .transport
                .request_detail(&item.name, item.category, &run.request.instruction, &context)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    self.record_item_failure(
                        run,
                        item,
                        GenerationError::Transport {
                            item_name: Some(item.name.clone()),
                            reason: format!("{:#}", e),
                        },
                    );
                    continue;
                }
            };

            let elements = response_parser::parse(&raw, item.category);
            if elements.is_empty() {
                self.record_item_failure(
                    run,
                    item,
                    GenerationError::DetailParse {
                        item_name: item.name.clone(),
                        category: item.category,
                    },
                );
                continue;
            }

            match self.commit_item(run, accumulator, item, elements).await {
                Ok(()) => {}
                // A project deleted under a cancelled run ends the run as cancelled
                Err(GenerationError::NoActiveProject { .. }) if self.check_cancelled(run) => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            run.session.completed_count += 1;
            run.publish();
        }

        Ok(())
    }

    /// Stage, commit, publish and verify the records of one manifest item
    async fn commit_item(
        &self,
        run: &mut GenerationRun,
        accumulator: &Mutex<Accumulator>,
        item: &GenerationManifestItem,
        elements: Vec<Element>,
    ) -> Result<(), GenerationError> {
        let project_id = run.session.project_id;
        let mut accumulator = accumulator.lock().await;

        for element in elements {
            accumulator.stage(item.category, element);
        }

        let snapshot = self
            .store
            .read(project_id)
            .await
            .map_err(GenerationError::store)?;
        let result = match accumulator.commit(snapshot.as_deref()) {
            CommitOutcome::Committed(result) => result,
            CommitOutcome::NoActiveProject => {
                accumulator.discard_staged();
                return Err(GenerationError::NoActiveProject { project_id });
            }
        };

        let updated_categories = result.updated_categories;
        let appended = result.appended;
        self.store
            .write(result.project)
            .await
            .map_err(GenerationError::store)?;

        debug!(item = %item.name, appended = appended.len(), "Committed generated records");
        for category in updated_categories {
            self.emit(GenerationEvent::CategoryUpdated {
                run_id: run.session.run_id,
                project_id,
                category,
            });
        }

        for element in &appended {
            match self
                .verifier
                .confirm(project_id, &mut accumulator, element)
                .await?
            {
                Verification::Confirmed | Verification::Recovered => {
                    run.session.generated_count += 1;
                }
                Verification::Missing => {
                    warn!(element_id = %element.id, name = %element.name, "Generated record lost");
                    run.session.errors.push(GenerationError::MergeVerification {
                        element_id: element.id,
                        element_name: element.name.clone(),
                        category: element.category,
                    });
                    self.emit(GenerationEvent::VerificationWarning {
                        run_id: run.session.run_id,
                        project_id,
                        element_id: element.id,
                        element_name: element.name.clone(),
                        category: element.category,
                    });
                }
            }
        }

        Ok(())
    }

    fn record_item_failure(
        &self,
        run: &mut GenerationRun,
        item: &GenerationManifestItem,
        error: GenerationError,
    ) {
        warn!(item = %item.name, category = %item.category, "Generation item failed: {}", error);
        self.emit(GenerationEvent::ItemFailed {
            run_id: run.session.run_id,
            project_id: run.session.project_id,
            item_name: item.name.clone(),
            category: item.category,
            reason: error.to_string(),
        });
        run.session.failed_count += 1;
        run.session.errors.push(error);
        run.publish();
    }

    fn check_cancelled(&self, run: &mut GenerationRun) -> bool {
        if run.cancel.is_cancelled() {
            run.session.cancelled = true;
            return true;
        }
        false
    }

    fn emit_progress(
        &self,
        run: &GenerationRun,
        current_item: Option<String>,
        index: usize,
        total: usize,
    ) {
        self.emit(GenerationEvent::Progress {
            run_id: run.session.run_id,
            project_id: run.session.project_id,
            progress: run.session.progress,
            current_item,
            index,
            total,
        });
    }

    fn emit(&self, event: GenerationEvent) {
        if self.events.send(event).is_err() {
            debug!("Generation event dropped: no listener");
        }
    }
}

/// Existing elements of the requested categories, in category order
fn gather_context(project: &ProjectAggregate, categories: &[Category]) -> Vec<Element> {
    let mut seen = HashSet::new();
    categories
        .iter()
        .filter(|c| seen.insert(**c))
        .flat_map(|c| project.elements(*c).iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use tokio::sync::{Notify, RwLock};

    use super::*;
    use crate::application::services::accumulator::ProjectAccumulators;
    use crate::application::services::project_service::{
        ProjectService, ProjectServiceImpl, UpdateProjectRequest,
    };
    use crate::domain::entities::Project;

    /// Transport with canned replies per item name
    struct ScriptedTransport {
        manifest: std::result::Result<String, String>,
        details: HashMap<String, std::result::Result<String, String>>,
        calls: StdMutex<Vec<String>>,
        /// Cancel this token once the named item has been requested
        cancel_after: Option<(String, CancelToken)>,
        /// Delete this project once the named item has been requested
        vanish_after: Option<(String, Arc<MemoryStore>, ProjectId)>,
    }

    impl ScriptedTransport {
        fn new(manifest: &str) -> Self {
            Self {
                manifest: Ok(manifest.to_string()),
                details: HashMap::new(),
                calls: StdMutex::new(Vec::new()),
                cancel_after: None,
                vanish_after: None,
            }
        }

        fn failing_manifest(reason: &str) -> Self {
            Self {
                manifest: Err(reason.to_string()),
                ..Self::new("")
            }
        }

        fn with_detail(mut self, name: &str, reply: &str) -> Self {
            self.details.insert(name.to_string(), Ok(reply.to_string()));
            self
        }

        fn with_detail_error(mut self, name: &str, reason: &str) -> Self {
            self.details.insert(name.to_string(), Err(reason.to_string()));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationTransportPort for ScriptedTransport {
        async fn request_manifest(&self, _instruction: &str, _context: &[Element]) -> Result<String> {
            self.manifest.clone().map_err(|e| anyhow!(e))
        }

        async fn request_detail(
            &self,
            item_name: &str,
            _category: Category,
            _instruction: &str,
            _context: &[Element],
        ) -> Result<String> {
            self.calls.lock().unwrap().push(item_name.to_string());
            if let Some((name, token)) = &self.cancel_after {
                if name == item_name {
                    token.cancel();
                }
            }
            if let Some((name, store, project_id)) = &self.vanish_after {
                if name == item_name {
                    store.delete(*project_id).await?;
                }
            }
            match self.details.get(item_name) {
                Some(reply) => reply.clone().map_err(|e| anyhow!(e)),
                None => Ok(String::new()),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        projects: RwLock<HashMap<ProjectId, Arc<ProjectAggregate>>>,
    }

    #[async_trait]
    impl ProjectStorePort for MemoryStore {
        async fn read(&self, id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>> {
            Ok(self.projects.read().await.get(&id).cloned())
        }

        async fn write(&self, project: ProjectAggregate) -> Result<()> {
            self.projects
                .write()
                .await
                .insert(*project.id(), Arc::new(project));
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
            Ok(self.projects.read().await.values().cloned().collect())
        }

        async fn delete(&self, id: ProjectId) -> Result<bool> {
            Ok(self.projects.write().await.remove(&id).is_some())
        }
    }

    /// Store that silently drops the first `drop_writes` writes
    #[derive(Default)]
    struct LossyStore {
        inner: MemoryStore,
        drop_writes: AtomicUsize,
    }

    #[async_trait]
    impl ProjectStorePort for LossyStore {
        async fn read(&self, id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>> {
            self.inner.read(id).await
        }

        async fn write(&self, project: ProjectAggregate) -> Result<()> {
            let dropped = self
                .drop_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if dropped {
                return Ok(());
            }
            self.inner.write(project).await
        }

        async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
            self.inner.list().await
        }

        async fn delete(&self, id: ProjectId) -> Result<bool> {
            self.inner.delete(id).await
        }
    }

    /// Store whose next write, once armed, waits for `release`
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ProjectStorePort for GatedStore {
        async fn read(&self, id: ProjectId) -> Result<Option<Arc<ProjectAggregate>>> {
            self.inner.read(id).await
        }

        async fn write(&self, project: ProjectAggregate) -> Result<()> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.write(project).await
        }

        async fn list(&self) -> Result<Vec<Arc<ProjectAggregate>>> {
            self.inner.list().await
        }

        async fn delete(&self, id: ProjectId) -> Result<bool> {
            self.inner.delete(id).await
        }
    }

    struct Harness {
        service: GenerationService<ScriptedTransport, MemoryStore>,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        accumulator: Arc<Mutex<Accumulator>>,
        events: UnboundedReceiver<GenerationEvent>,
        project_id: ProjectId,
    }

    async fn harness(transport: ScriptedTransport) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let project = ProjectAggregate::new(Project::new("Tides"));
        let project_id = *project.id();
        store.write(project).await.unwrap();

        let transport = Arc::new(transport);
        let (tx, rx) = unbounded_channel();
        Harness {
            service: GenerationService::new(transport.clone(), store.clone(), Duration::ZERO, tx),
            transport,
            store,
            accumulator: Arc::new(Mutex::new(Accumulator::new())),
            events: rx,
            project_id,
        }
    }

    fn drain(events: &mut UnboundedReceiver<GenerationEvent>) -> Vec<GenerationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn place_detail(name: &str) -> String {
        format!("名前: {}\n説明: A harbour town\n人口: 5000", name)
    }

    const THREE_PLACES: &str = r#"[
        {"name": "Port Azure", "category": "place"},
        {"name": "Red Desert", "category": "place"},
        {"name": "Glass Spire", "category": "場所"}
    ]"#;

    #[tokio::test]
    async fn test_three_places_scenario() {
        let transport = ScriptedTransport::new(THREE_PLACES)
            .with_detail("Port Azure", &place_detail("Port Azure"))
            .with_detail("Red Desert", &place_detail("Red Desert"))
            .with_detail("Glass Spire", &place_detail("Glass Spire"));
        let mut h = harness(transport).await;
        let (run, handle) = GenerationRun::new(h.project_id, GenerationRequest::new("three places"));

        let summary = h.service.run(run, h.accumulator.clone()).await.unwrap();

        assert_eq!(summary.state, GenerationState::Completed);
        assert_eq!(summary.elements_generated, 3);
        assert_eq!(summary.items_completed, 3);
        assert!(summary.errors.is_empty());

        let project = h.store.read(h.project_id).await.unwrap().unwrap();
        let places = project.elements(Category::Place);
        assert_eq!(places.len(), 3);
        let ids: HashSet<_> = places.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(places[0].description(), "A harbour town");

        let events = drain(&mut h.events);
        let updates = events
            .iter()
            .filter(|e| matches!(e, GenerationEvent::CategoryUpdated { category: Category::Place, .. }))
            .count();
        assert_eq!(updates, 3);
        assert!(matches!(events.last(), Some(GenerationEvent::Completed { .. })));

        let session = handle.snapshot();
        assert_eq!(session.progress, 1.0);
        assert!(handle.is_finished());
        assert!(h.accumulator.lock().await.is_updated(Category::Place));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_items() {
        let manifest = r#"[{"name": "A", "category": "place"}, {"name": "B", "category": "place"}, {"name": "C", "category": "place"}]"#;
        let transport = ScriptedTransport::new(manifest)
            .with_detail("A", &place_detail("A"))
            .with_detail_error("B", "connection reset")
            .with_detail("C", &place_detail("C"));
        let mut h = harness(transport).await;
        let (run, _handle) = GenerationRun::new(h.project_id, GenerationRequest::new("abc"));

        let summary = h.service.run(run, h.accumulator.clone()).await.unwrap();

        assert_eq!(summary.state, GenerationState::Completed);
        assert_eq!(summary.items_failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(
            &summary.errors[0],
            GenerationError::Transport { item_name: Some(name), .. } if name == "B"
        ));

        let project = h.store.read(h.project_id).await.unwrap().unwrap();
        let names: Vec<_> = project
            .elements(Category::Place)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "C"]);

        let failures: Vec<_> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                GenerationEvent::ItemFailed { item_name, .. } => Some(item_name),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_detail_is_a_parse_error() {
        let manifest = r#"[{"name": "A", "category": "rule"}, {"name": "B", "category": "rule"}]"#;
        let transport = ScriptedTransport::new(manifest)
            .with_detail("A", "")
            .with_detail("B", "名前: B\n起源: The old war");
        let h = harness(transport).await;
        let (run, _handle) = GenerationRun::new(h.project_id, GenerationRequest::new("rules"));

        let summary = h.service.run(run, h.accumulator.clone()).await.unwrap();

        assert_eq!(summary.state, GenerationState::Completed);
        assert_eq!(
            summary.errors,
            vec![GenerationError::DetailParse {
                item_name: "A".to_string(),
                category: Category::Rule,
            }]
        );
        let project = h.store.read(h.project_id).await.unwrap().unwrap();
        assert_eq!(project.elements(Category::Rule).len(), 1);
        assert_eq!(project.elements(Category::Rule)[0].text("origin"), "The old war");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let transport = ScriptedTransport::new(THREE_PLACES)
            .with_detail("Port Azure", &place_detail("Port Azure"))
            .with_detail("Glass Spire", &place_detail("Glass Spire"));
        let mut h = harness(transport).await;
        let (run, _handle) = GenerationRun::new(h.project_id, GenerationRequest::new("places"));

        h.service.run(run, h.accumulator.clone()).await.unwrap();

        let progress: Vec<f32> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                GenerationEvent::Progress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress.first(), Some(&0.0));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!((progress[1] - 0.1).abs() < f32::EPSILON);
        assert!((progress[3] - 0.7).abs() < 1e-5);
        assert_eq!(progress.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_committed_items() {
        let mut transport = ScriptedTransport::new(THREE_PLACES)
            .with_detail("Port Azure", &place_detail("Port Azure"))
            .with_detail("Red Desert", &place_detail("Red Desert"))
            .with_detail("Glass Spire", &place_detail("Glass Spire"));
        let h_project = ProjectAggregate::new(Project::new("Tides"));
        let project_id = *h_project.id();
        let (run, handle) = GenerationRun::new(project_id, GenerationRequest::new("places"));
        transport.cancel_after = Some(("Red Desert".to_string(), run.cancel.clone()));

        let mut h = harness(transport).await;
        h.store.write(h_project).await.unwrap();

        let summary = h.service.run(run, h.accumulator.clone()).await.unwrap();

        assert_eq!(summary.state, GenerationState::Cancelled);
        assert_eq!(summary.items_completed, 2);
        assert_eq!(h.transport.calls(), vec!["Port Azure", "Red Desert"]);
        let project = h.store.read(project_id).await.unwrap().unwrap();
        assert_eq!(project.elements(Category::Place).len(), 2);
        assert!(handle.snapshot().cancelled);
        assert!(matches!(
            drain(&mut h.events).last(),
            Some(GenerationEvent::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_start_sends_nothing() {
        let h = harness(ScriptedTransport::new(THREE_PLACES)).await;
        let (run, handle) = GenerationRun::new(h.project_id, GenerationRequest::new("places"));
        handle.cancel();

        let summary = h.service.run(run, h.accumulator.clone()).await.unwrap();

        assert_eq!(summary.state, GenerationState::Cancelled);
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_manifest_fails_the_run() {
        let mut h = harness(ScriptedTransport::new("[]")).await;
        let (run, handle) = GenerationRun::new(h.project_id, GenerationRequest::new("nothing"));

        let err = h.service.run(run, h.accumulator.clone()).await.unwrap_err();

        assert_eq!(
            err,
            GenerationError::ManifestParse {
                reason: "empty manifest".to_string()
            }
        );
        assert_eq!(handle.snapshot().state, GenerationState::Failed);
        assert!(matches!(
            drain(&mut h.events).last(),
            Some(GenerationEvent::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_manifest_transport_error_is_fatal() {
        let h = harness(ScriptedTransport::failing_manifest("timed out")).await;
        let (run, _handle) = GenerationRun::new(h.project_id, GenerationRequest::new("places"));

        let err = h.service.run(run, h.accumulator.clone()).await.unwrap_err();

        assert!(matches!(err, GenerationError::Transport { item_name: None, .. }));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_project_fails_before_any_request() {
        let h = harness(ScriptedTransport::new(THREE_PLACES)).await;
        let (run, _handle) = GenerationRun::new(ProjectId::new(), GenerationRequest::new("places"));

        let err = h.service.run(run, h.accumulator.clone()).await.unwrap_err();

        assert!(matches!(err, GenerationError::NoActiveProject { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_default_category_applies_to_untyped_items() {
        let transport = ScriptedTransport::new(r#"[{"name": "Tidefolk"}]"#)
            .with_detail("Tidefolk", "名前: Tidefolk\n宗教: Sea worship");
        let h = harness(transport).await;
        let request = GenerationRequest::new("a culture").with_default_category(Category::Culture);
        let (run, _handle) = GenerationRun::new(h.project_id, request);

        h.service.run(run, h.accumulator.clone()).await.unwrap();

        let project = h.store.read(h.project_id).await.unwrap().unwrap();
        assert_eq!(project.elements(Category::Culture)[0].text("religion"), "Sea worship");
    }

    #[test]
    fn test_gather_context_follows_requested_categories() {
        let mut project = ProjectAggregate::new(Project::new("Tides"));
        project.add_element(Element::new("Port Azure", Category::Place)).unwrap();
        project.add_element(Element::new("Salt Law", Category::Rule)).unwrap();

        let context = gather_context(&project, &[Category::Rule, Category::Rule]);

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].name, "Salt Law");
    }

    #[tokio::test]
    async fn test_lost_record_is_reported_and_run_completes() {
        let transport = Arc::new(
            ScriptedTransport::new(r#"[{"name": "Port Azure", "category": "place"}]"#)
                .with_detail("Port Azure", &place_detail("Port Azure")),
        );
        let store = Arc::new(LossyStore::default());
        let project = ProjectAggregate::new(Project::new("Tides"));
        let project_id = *project.id();
        store.inner.write(project).await.unwrap();
        // The commit and the verifier's retry both vanish
        store.drop_writes.store(2, Ordering::SeqCst);

        let (tx, mut rx) = unbounded_channel();
        let service = GenerationService::new(transport, store.clone(), Duration::ZERO, tx);
        let (run, handle) = GenerationRun::new(project_id, GenerationRequest::new("a harbour"));

        let summary = service
            .run(run, Arc::new(Mutex::new(Accumulator::new())))
            .await
            .unwrap();

        assert_eq!(summary.state, GenerationState::Completed);
        assert_eq!(summary.items_completed, 1);
        assert_eq!(summary.items_failed, 0);
        assert_eq!(summary.elements_generated, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(matches!(
            &summary.errors[0],
            GenerationError::MergeVerification { element_name, category: Category::Place, .. }
                if element_name == "Port Azure"
        ));

        let warnings = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, GenerationEvent::VerificationWarning { .. }))
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(handle.snapshot().state, GenerationState::Completed);
        let project = store.read(project_id).await.unwrap().unwrap();
        assert!(project.elements(Category::Place).is_empty());
    }

    #[tokio::test]
    async fn test_project_update_during_run_keeps_generated_records() {
        let store = Arc::new(GatedStore::default());
        let project = ProjectAggregate::new(Project::new("Tides"));
        let project_id = *project.id();
        store.inner.write(project).await.unwrap();

        let accumulators = Arc::new(ProjectAccumulators::new());
        let projects = Arc::new(ProjectServiceImpl::new(store.clone(), accumulators.clone()));
        let transport = Arc::new(
            ScriptedTransport::new(THREE_PLACES)
                .with_detail("Port Azure", &place_detail("Port Azure"))
                .with_detail("Red Desert", &place_detail("Red Desert"))
                .with_detail("Glass Spire", &place_detail("Glass Spire")),
        );
        let (tx, _rx) = unbounded_channel();
        let service = Arc::new(GenerationService::new(transport, store.clone(), Duration::ZERO, tx));

        // The title edit reads the project, then stalls before writing it back
        store.armed.store(true, Ordering::SeqCst);
        let update = tokio::spawn({
            let projects = projects.clone();
            async move {
                projects
                    .update_project(
                        project_id,
                        UpdateProjectRequest {
                            title: Some("Tides Renamed".to_string()),
                            ..Default::default()
                        },
                    )
                    .await
            }
        });
        store.reached.notified().await;

        let (run, _handle) = GenerationRun::new(project_id, GenerationRequest::new("three places"));
        let accumulator = accumulators.get(project_id).await;
        let generation = tokio::spawn({
            let service = service.clone();
            async move { service.run(run, accumulator).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.release.notify_one();

        update.await.unwrap().unwrap();
        let summary = generation.await.unwrap().unwrap();

        assert_eq!(summary.elements_generated, 3);
        let project = store.read(project_id).await.unwrap().unwrap();
        assert_eq!(project.project().title, "Tides Renamed");
        assert_eq!(project.elements(Category::Place).len(), 3);
    }

    #[tokio::test]
    async fn test_project_deleted_under_cancelled_run_ends_cancelled() {
        let mut transport = ScriptedTransport::new(THREE_PLACES)
            .with_detail("Port Azure", &place_detail("Port Azure"))
            .with_detail("Red Desert", &place_detail("Red Desert"));
        let store = Arc::new(MemoryStore::default());
        let project = ProjectAggregate::new(Project::new("Tides"));
        let project_id = *project.id();
        store.write(project).await.unwrap();

        let (run, handle) = GenerationRun::new(project_id, GenerationRequest::new("places"));
        transport.cancel_after = Some(("Red Desert".to_string(), run.cancel.clone()));
        transport.vanish_after = Some(("Red Desert".to_string(), store.clone(), project_id));
        let (tx, mut rx) = unbounded_channel();
        let service = GenerationService::new(Arc::new(transport), store.clone(), Duration::ZERO, tx);

        let summary = service
            .run(run, Arc::new(Mutex::new(Accumulator::new())))
            .await
            .unwrap();

        assert_eq!(summary.state, GenerationState::Cancelled);
        assert_eq!(summary.items_completed, 1);
        assert!(summary.errors.is_empty());
        assert!(handle.snapshot().cancelled);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(GenerationEvent::Cancelled { .. })
        ));
    }
}
