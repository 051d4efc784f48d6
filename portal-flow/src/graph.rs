use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::{
    context::Context,
    error::{GraphError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Edge between tasks in the graph
#[derive(Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub condition: Option<EdgeCondition>,
}

/// A graph of tasks that can be executed
pub struct Graph {
    pub id: String,
    tasks: DashMap<String, Arc<dyn Task>>,
    edges: RwLock<Vec<Edge>>,
    start_task_id: RwLock<Option<String>>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: DashMap::new(),
            edges: RwLock::new(Vec::new()),
            start_task_id: RwLock::new(None),
        }
    }

    /// Add a task to the graph
    pub fn add_task(&self, task: Arc<dyn Task>) -> &Self {
        let task_id = task.id().to_string();
        let is_first = self.tasks.is_empty();
        self.tasks.insert(task_id.clone(), task);

        // Set as start task if it's the first one
        if is_first {
            *write_lock(&self.start_task_id, "start task") = Some(task_id);
        }

        self
    }

    /// Set the starting task
    pub fn set_start_task(&self, task_id: impl Into<String>) -> &Self {
        let task_id = task_id.into();
        if self.tasks.contains_key(&task_id) {
            *write_lock(&self.start_task_id, "start task") = Some(task_id);
        } else {
            warn!(graph_id = %self.id, task_id = %task_id, "Ignoring unknown start task");
        }
        self
    }

    /// Add an edge between tasks
    pub fn add_edge(&self, from: impl Into<String>, to: impl Into<String>) -> &Self {
        self.push_edge(Edge {
            from: from.into(),
            to: to.into(),
            condition: None,
        });
        self
    }

    /// Add a binary branch: `yes` when the condition holds, `no` otherwise
    pub fn add_conditional_edge<F>(
        &self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> &Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        let from = from.into();
        self.push_edge(Edge {
            from: from.clone(),
            to: yes.into(),
            condition: Some(Arc::new(condition)),
        });
        self.push_edge(Edge {
            from,
            to: no.into(),
            condition: None,
        });
        self
    }

    fn push_edge(&self, edge: Edge) {
        write_lock(&self.edges, "edges").push(edge);
    }

    /// Execute the graph with session management.
    ///
    /// Runs the session's current task, then follows `ContinueAndExecute` and
    /// `GoToAndExecute` chains until a task hands control back.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let result = self
            .execute_single_task(&session.current_task_id, session.context.clone())
            .await?;

        session.status_message = result.status_message.clone();

        match &result.next_action {
            NextAction::Continue => {
                // Find the next task but don't execute it
                session.current_task_id = self
                    .find_next_task(&result.task_id, &session.context)
                    .unwrap_or_else(|| result.task_id.clone());

                Ok(ExecutionResult::waiting(result.response))
            }
            NextAction::ContinueAndExecute => {
                match self.find_next_task(&result.task_id, &session.context) {
                    Some(next_task_id) => {
                        debug!(from = %result.task_id, to = %next_task_id, "Continuing to next task");
                        session.current_task_id = next_task_id;
                        Box::pin(self.execute_session(session)).await
                    }
                    None => {
                        session.current_task_id = result.task_id.clone();
                        Ok(ExecutionResult::waiting(result.response))
                    }
                }
            }
            NextAction::GoTo(target_id) => {
                self.ensure_task(target_id)?;
                session.current_task_id = target_id.clone();
                Ok(ExecutionResult::waiting(result.response))
            }
            NextAction::GoToAndExecute(target_id) => {
                self.ensure_task(target_id)?;
                debug!(from = %result.task_id, to = %target_id, "Jumping to task");
                session.current_task_id = target_id.clone();
                Box::pin(self.execute_session(session)).await
            }
            NextAction::WaitForInput => {
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult::waiting(result.response))
            }
            NextAction::End => {
                session.current_task_id = result.task_id.clone();
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Completed,
                })
            }
        }
    }

    /// Execute a single task without following Continue actions
    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .get_task(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;

        // Set the task_id in the result to track which task generated it
        result.task_id = task_id.to_string();

        Ok(result)
    }

    fn ensure_task(&self, task_id: &str) -> Result<()> {
        if self.tasks.contains_key(task_id) {
            Ok(())
        } else {
            Err(GraphError::TaskNotFound(task_id.to_string()))
        }
    }

    /// Find the next task based on edges and conditions.
    ///
    /// Conditional edges win over unconditional ones regardless of insertion order.
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        let edges = read_lock(&self.edges, "edges");
        let mut fallback = None;

        for edge in edges.iter().filter(|edge| edge.from == current_task_id) {
            match &edge.condition {
                Some(condition) if condition(context) => return Some(edge.to.clone()),
                Some(_) => {}
                None => {
                    if fallback.is_none() {
                        fallback = Some(edge.to.clone());
                    }
                }
            }
        }

        fallback
    }

    /// Get the start task ID
    pub fn start_task_id(&self) -> Option<String> {
        read_lock(&self.start_task_id, "start task").clone()
    }

    /// Get a task by ID
    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).map(|entry| entry.clone())
    }
}

// Holders only push or replace whole values; a poisoned lock is logged and reused
fn read_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!(lock = name, "Graph lock poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, name: &str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!(lock = name, "Graph lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    pub fn add_task(self, task: Arc<dyn Task>) -> Self {
        self.graph.add_task(task);
        self
    }

    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.add_edge(from, to);
        self
    }

    pub fn add_conditional_edge<F>(
        self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.graph.add_conditional_edge(from, condition, yes, no);
        self
    }

    pub fn set_start_task(self, task_id: impl Into<String>) -> Self {
        self.graph.set_start_task(task_id);
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Status of graph execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    fn waiting(response: Option<String>) -> Self {
        Self {
            response,
            status: ExecutionStatus::WaitingForInput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Waiting for user input to continue
    WaitingForInput,
    /// Workflow completed successfully
    Completed,
    /// A newer request replaced this one before it finished; its outcome was dropped
    Superseded,
    /// Error occurred during execution
    Error(String),
}
