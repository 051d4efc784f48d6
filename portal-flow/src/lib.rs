pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod storage;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::FlowRunner;
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoTask {
        id: String,
        next: NextAction,
    }

    #[async_trait]
    impl Task for EchoTask {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            let mut visited: Vec<String> = context.get("visited").await.unwrap_or_default();
            visited.push(self.id.clone());
            context.set("visited", visited).await;

            Ok(TaskResult::new(Some(self.id.clone()), self.next.clone()))
        }
    }

    struct SlowTask;

    #[async_trait]
    impl Task for SlowTask {
        fn id(&self) -> &str {
            "slow"
        }

        async fn run(&self, _context: Context) -> Result<TaskResult> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(TaskResult::new(None, NextAction::End))
        }
    }

    struct RunTagTask;

    #[async_trait]
    impl Task for RunTagTask {
        fn id(&self) -> &str {
            "tag"
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            context.set("seen_generation", context.run_generation()).await;
            Ok(TaskResult::new(None, NextAction::End))
        }
    }

    fn echo(id: &str, next: NextAction) -> Arc<EchoTask> {
        Arc::new(EchoTask {
            id: id.to_string(),
            next,
        })
    }

    #[tokio::test]
    async fn continue_and_execute_follows_the_chain() {
        let graph = GraphBuilder::new("chain")
            .add_task(echo("a", NextAction::ContinueAndExecute))
            .add_task(echo("b", NextAction::WaitForInput))
            .add_edge("a", "b")
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "a");
        let result = graph.execute_session(&mut session).await.unwrap();

        assert_eq!(result.response.as_deref(), Some("b"));
        assert_eq!(result.status, ExecutionStatus::WaitingForInput);
        assert_eq!(session.current_task_id, "b");
        let visited: Vec<String> = session.context.get("visited").await.unwrap();
        assert_eq!(visited, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn conditional_edge_picks_branch_from_context() {
        let graph = GraphBuilder::new("branch")
            .add_task(echo("start", NextAction::Continue))
            .add_task(echo("yes", NextAction::End))
            .add_task(echo("no", NextAction::End))
            .add_conditional_edge(
                "start",
                |context| context.get_sync::<bool>("flag").unwrap_or(false),
                "yes",
                "no",
            )
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "start");
        graph.execute_session(&mut session).await.unwrap();
        assert_eq!(session.current_task_id, "no");

        let mut session = Session::new_from_task("s2".to_string(), "start");
        session.context.set("flag", true).await;
        graph.execute_session(&mut session).await.unwrap();
        assert_eq!(session.current_task_id, "yes");
    }

    #[tokio::test]
    async fn go_to_unknown_task_is_an_error() {
        let graph = GraphBuilder::new("broken")
            .add_task(echo("a", NextAction::GoTo("missing".to_string())))
            .build();

        let mut session = Session::new_from_task("s1".to_string(), "a");
        let err = graph.execute_session(&mut session).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn runner_persists_the_step() {
        let graph = Arc::new(
            GraphBuilder::new("runner")
                .add_task(echo("a", NextAction::Continue))
                .add_task(echo("b", NextAction::End))
                .add_edge("a", "b")
                .build(),
        );
        let storage = Arc::new(InMemorySessionStorage::new());
        storage
            .save(Session::new_from_task("s1".to_string(), "a"))
            .await
            .unwrap();

        let runner = FlowRunner::new(graph, storage.clone());
        runner.run("s1").await.unwrap();
        assert_eq!(storage.get("s1").await.unwrap().unwrap().current_task_id, "b");

        let result = runner.run("s1").await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn runner_discards_superseded_step() {
        let graph = Arc::new(GraphBuilder::new("slow").add_task(Arc::new(SlowTask)).build());
        let storage = Arc::new(InMemorySessionStorage::new());
        let mut session = Session::new_from_task("s1".to_string(), "slow");
        session.status_message = Some("before".to_string());
        let context = session.context.clone();
        storage.save(session).await.unwrap();

        let runner = FlowRunner::new(graph, storage.clone());
        let step = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run("s1").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        context.next_generation();

        let result = step.await.unwrap().unwrap();
        assert_eq!(result.status, ExecutionStatus::Superseded);
        let stored = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.status_message.as_deref(), Some("before"));
    }

    #[tokio::test]
    async fn run_for_stale_generation_runs_nothing() {
        let graph = Arc::new(
            GraphBuilder::new("stale")
                .add_task(echo("a", NextAction::Continue))
                .build(),
        );
        let storage = Arc::new(InMemorySessionStorage::new());
        let session = Session::new_from_task("s1".to_string(), "a");
        let context = session.context.clone();
        storage.save(session).await.unwrap();

        let first = context.next_generation();
        context.next_generation();

        let runner = FlowRunner::new(graph, storage);
        let result = runner.run_for("s1", first).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Superseded);
        assert!(!context.contains("visited"));
    }

    #[tokio::test]
    async fn tasks_see_the_generation_of_their_run() {
        let graph = Arc::new(GraphBuilder::new("tag").add_task(Arc::new(RunTagTask)).build());
        let storage = Arc::new(InMemorySessionStorage::new());
        let session = Session::new_from_task("s1".to_string(), "tag");
        let context = session.context.clone();
        storage.save(session).await.unwrap();

        let generation = context.next_generation();
        let runner = FlowRunner::new(graph, storage.clone());
        runner.run_for("s1", generation).await.unwrap();

        let seen: Option<u64> = context.get("seen_generation").await;
        assert_eq!(seen, Some(generation));
        let stored = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(stored.context.run_generation(), stored.context.generation());
    }

    #[tokio::test]
    async fn runner_reports_missing_session() {
        let graph = Arc::new(GraphBuilder::new("empty").build());
        let runner = FlowRunner::new(graph, Arc::new(InMemorySessionStorage::new()));

        let err = runner.run("nope").await.unwrap_err();
        assert!(matches!(err, GraphError::SessionNotFound(_)));
    }
}
