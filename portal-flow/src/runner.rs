//! FlowRunner – loads a session, executes exactly **one** graph step, and persists the updated
//! session back to storage.
//!
//! Interactive services run one step per request: the caller stores the user's input in the
//! session context, calls [`FlowRunner::run`], and returns the response. The next request picks
//! up where the session was left.
//!
//! ## Superseded steps
//!
//! A step is tied to the context generation current when it started. If a newer request (or a
//! cancel) advances the generation while the step is awaiting a remote call, the step's session
//! is not saved and the result comes back as [`ExecutionStatus::Superseded`]. Tasks that write
//! remote results into the context should check [`Context::is_current`](crate::Context::is_current)
//! before doing so.

use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, ExecutionStatus, Graph},
    storage::{Session, SessionStorage},
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    /// Create a new `FlowRunner` from an `Arc<Graph>` and any `SessionStorage` implementation.
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Execute **exactly one** step for the given `session_id` and persist the updated session.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let session = self.load(session_id).await?;
        let generation = session.context.generation();
        self.step(session, generation).await
    }

    /// Like [`FlowRunner::run`], but for the request that advanced the context to `generation`.
    ///
    /// Returns [`ExecutionStatus::Superseded`] without executing anything when a newer request
    /// already took over. Tasks see `generation` through
    /// [`Context::run_generation`](crate::Context::run_generation).
    pub async fn run_for(&self, session_id: &str, generation: u64) -> Result<ExecutionResult> {
        let session = self.load(session_id).await?;
        if !session.context.is_current(generation) {
            info!(session_id = %session_id, generation, "Request superseded before it ran");
            return Ok(superseded());
        }
        self.step(session, generation).await
    }

    async fn load(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))
    }

    async fn step(&self, mut session: Session, generation: u64) -> Result<ExecutionResult> {
        let session_id = session.id.clone();
        debug!(session_id = %session_id, task_id = %session.current_task_id, generation, "Running step");

        // 1. Execute current task (exactly one step) on a clone tagged with this run
        session.context = session.context.for_run(generation);
        let result = self.graph.execute_session(&mut session).await;
        session.context.detach();
        let result = result?;

        // 2. Drop the outcome if a newer request took over meanwhile
        if !session.context.is_current(generation) {
            info!(session_id = %session_id, generation, "Step superseded, discarding outcome");
            return Ok(superseded());
        }

        // 3. Persist new state so the next call starts where we left off
        self.storage.save(session).await?;

        Ok(result)
    }
}

fn superseded() -> ExecutionResult {
    ExecutionResult {
        response: None,
        status: ExecutionStatus::Superseded,
    }
}
