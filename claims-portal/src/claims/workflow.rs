use portal_flow::{Context, FlowRunner, Graph, GraphBuilder, SessionStorage};
use std::sync::Arc;

use super::stage::{ClaimFacts, ClaimStage};
use super::tasks::{
    BankDetailsTask, ClaimDetailsTask, ClaimTypeSelectionTask, ClaimTypeVerificationTask,
    ConfirmationTask, DuplicateWarningTask, EmployeeLookupTask, FinalVerificationTask,
    SubmitClaimTask,
};
use crate::backend::{ClaimsBackend, DocumentStore};

pub const CLAIM_GRAPH_ID: &str = "claim_sheet";

/// Edge condition: the facts in the context imply `stage`
fn derived_stage_is(stage: ClaimStage) -> impl Fn(&Context) -> bool + Send + Sync + 'static {
    move |context: &Context| ClaimFacts::from_context(context).stage() == stage
}

pub fn build_claim_workflow(
    backend: Arc<dyn ClaimsBackend>,
    documents: Arc<dyn DocumentStore>,
) -> Graph {
    use ClaimStage::*;

    GraphBuilder::new(CLAIM_GRAPH_ID)
        .add_task(Arc::new(EmployeeLookupTask::new(backend.clone())))
        .add_task(Arc::new(BankDetailsTask::new(backend.clone())))
        .add_task(Arc::new(ClaimTypeSelectionTask::new(backend.clone())))
        .add_task(Arc::new(ClaimTypeVerificationTask::new(backend.clone())))
        .add_task(Arc::new(DuplicateWarningTask))
        .add_task(Arc::new(ClaimDetailsTask))
        .add_task(Arc::new(FinalVerificationTask::new(backend.clone())))
        .add_task(Arc::new(ConfirmationTask))
        .add_task(Arc::new(SubmitClaimTask::new(backend, documents)))
        .add_conditional_edge(
            NoEmployee.as_str(),
            derived_stage_is(BankDetailsRequired),
            BankDetailsRequired.as_str(),
            SelectingClaimType.as_str(),
        )
        .add_edge(BankDetailsRequired.as_str(), SelectingClaimType.as_str())
        .add_conditional_edge(
            VerifyingClaimType.as_str(),
            derived_stage_is(DuplicateWarning),
            DuplicateWarning.as_str(),
            MainForm.as_str(),
        )
        .add_edge(DuplicateWarning.as_str(), MainForm.as_str())
        .add_edge(MainForm.as_str(), FinalVerifying.as_str())
        .add_edge(FinalVerifying.as_str(), FinalConfirmation.as_str())
        .add_edge(FinalConfirmation.as_str(), Submitting.as_str())
        .set_start_task(NoEmployee.as_str())
        .build()
}

pub fn create_flow_runner(
    backend: Arc<dyn ClaimsBackend>,
    documents: Arc<dyn DocumentStore>,
    session_storage: Arc<dyn SessionStorage>,
) -> FlowRunner {
    let graph = Arc::new(build_claim_workflow(backend, documents));
    FlowRunner::new(graph, session_storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, InMemoryDocumentStore};
    use crate::claims::keys::session_keys;
    use crate::claims::stage::EmployeeLookup;
    use crate::models::{EmployeeRecord, ProviderProfile};

    fn graph() -> Graph {
        build_claim_workflow(
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryDocumentStore::new()),
        )
    }

    #[test]
    fn every_stage_is_a_task() {
        let graph = graph();
        for stage in ClaimStage::ALL {
            assert!(graph.get_task(stage.as_str()).is_some(), "{stage}");
        }
        assert_eq!(graph.start_task_id().as_deref(), Some("no_employee"));
    }

    #[tokio::test]
    async fn lookup_routes_psna_provider_through_bank_gate() {
        let graph = graph();
        let context = Context::new();
        context
            .set(
                session_keys::PROVIDER,
                ProviderProfile {
                    user_id: "prov-1".to_string(),
                    is_psna: true,
                },
            )
            .await;
        let record = EmployeeRecord {
            id: "ph-1".to_string(),
            name: "Mary Kila".to_string(),
            gender: None,
            date_of_birth: None,
            has_bank_details: false,
        };
        context
            .set(session_keys::LOOKUP, EmployeeLookup::Valid(record.clone()))
            .await;
        assert_eq!(
            graph.find_next_task("no_employee", &context).as_deref(),
            Some("bank_details_required")
        );

        let record = EmployeeRecord {
            has_bank_details: true,
            ..record
        };
        context
            .set(session_keys::LOOKUP, EmployeeLookup::Valid(record))
            .await;
        assert_eq!(
            graph.find_next_task("no_employee", &context).as_deref(),
            Some("selecting_claim_type")
        );
    }
}
