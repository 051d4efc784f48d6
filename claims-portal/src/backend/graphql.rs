use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{BackendError, BackendResult, ClaimsBackend, RegistrationBackend};
use crate::models::{
    AddClaimRequest, BankDetails, ClaimReceipt, ClaimType, ClaimVerificationResult, PolicyHolder,
    VerifyClaimRequest,
};
use crate::registration::{Registration, RegistrationKind, RegistrationStatus, ReviewDecision};

const POLICY_HOLDER_QUERY: &str = r#"
query GetPolicyHolder($employeeNo: String!) {
  getPolicyHolder(employeeNo: $employeeNo) { id name gender dateOfBirth hasBankDetails }
}"#;

const CLAIM_TYPES_QUERY: &str = r#"
query ListClaimTypes {
  listClaimTypes { id group label }
}"#;

const VERIFY_CLAIM_QUERY: &str = r#"
query VerifyClaim($input: VerifyClaimInput!) {
  verifyClaim(input: $input) {
    claimLabel previousClaimId previousClaimAmount previousClaimDateTime previousClaimDescription
  }
}"#;

const ADD_CLAIM_MUTATION: &str = r#"
mutation AddClaim($input: AddClaimInput!) {
  addClaim(input: $input) { id }
}"#;

const ADD_BANK_MUTATION: &str = r#"
mutation AddBank($input: AddBankInput!) {
  addBank(input: $input) { policyHolderId }
}"#;

const REGISTRATION_FIELDS: &str =
    "id ownerId kind status values registrationNumber rejectionReason createdAt updatedAt";

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// Client for the portal's GraphQL API
pub struct GraphQlBackend {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl GraphQlBackend {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Run one operation and decode the named field of `data`
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &str,
    ) -> BackendResult<T> {
        debug!(endpoint = %self.endpoint, field = %field, "Sending GraphQL operation");

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }

        let response = request.send().await?.error_for_status()?;
        let body: GraphQlResponse = response.json().await?;

        if !body.errors.is_empty() {
            let message = body
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(field = %field, error = %message, "GraphQL operation returned errors");
            return Err(BackendError::GraphQl(message));
        }

        let value = body
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .unwrap_or(Value::Null);

        Ok(serde_json::from_value(value)?)
    }

    fn registration_query(name: &str, signature: &str, arguments: &str, mutation: bool) -> String {
        format!(
            "{} {name}{signature} {{ {name}{arguments} {{ {REGISTRATION_FIELDS} }} }}",
            if mutation { "mutation" } else { "query" },
        )
    }
}

#[async_trait]
impl ClaimsBackend for GraphQlBackend {
    async fn find_policy_holder(&self, employee_number: &str) -> BackendResult<Option<PolicyHolder>> {
        self.execute(
            POLICY_HOLDER_QUERY,
            json!({ "employeeNo": employee_number }),
            "getPolicyHolder",
        )
        .await
    }

    async fn claim_types(&self) -> BackendResult<Vec<ClaimType>> {
        let types: Option<Vec<ClaimType>> =
            self.execute(CLAIM_TYPES_QUERY, json!({}), "listClaimTypes").await?;
        Ok(types.unwrap_or_default())
    }

    async fn verify_claim(&self, request: &VerifyClaimRequest) -> BackendResult<ClaimVerificationResult> {
        let result: Option<ClaimVerificationResult> = self
            .execute(VERIFY_CLAIM_QUERY, json!({ "input": request }), "verifyClaim")
            .await?;
        result.ok_or_else(|| BackendError::Decode("verifyClaim returned null".to_string()))
    }

    async fn add_claim(&self, request: &AddClaimRequest) -> BackendResult<ClaimReceipt> {
        let receipt: Option<ClaimReceipt> = self
            .execute(ADD_CLAIM_MUTATION, json!({ "input": request }), "addClaim")
            .await?;
        receipt.ok_or_else(|| BackendError::Rejected("addClaim returned no claim id".to_string()))
    }

    async fn add_bank(&self, details: &BankDetails) -> BackendResult<()> {
        let created: Option<Value> = self
            .execute(ADD_BANK_MUTATION, json!({ "input": details }), "addBank")
            .await?;
        match created {
            Some(_) => Ok(()),
            None => Err(BackendError::Rejected("addBank returned nothing".to_string())),
        }
    }
}

#[async_trait]
impl RegistrationBackend for GraphQlBackend {
    async fn create_draft(
        &self,
        owner_id: &str,
        kind: RegistrationKind,
        values: &Value,
    ) -> BackendResult<Registration> {
        let query = Self::registration_query(
            "createRegistrationDraft",
            "($input: CreateRegistrationInput!)",
            "(input: $input)",
            true,
        );
        let input = json!({ "input": { "ownerId": owner_id, "kind": kind, "values": values } });
        self.execute(&query, input, "createRegistrationDraft").await
    }

    async fn update_draft(&self, id: &str, values: &Value) -> BackendResult<Registration> {
        let query = Self::registration_query(
            "updateRegistrationDraft",
            "($input: UpdateRegistrationInput!)",
            "(input: $input)",
            true,
        );
        let input = json!({ "input": { "id": id, "values": values } });
        self.execute(&query, input, "updateRegistrationDraft").await
    }

    async fn get_registration(&self, id: &str) -> BackendResult<Option<Registration>> {
        let query = Self::registration_query("getRegistration", "($id: ID!)", "(id: $id)", false);
        self.execute(&query, json!({ "id": id }), "getRegistration").await
    }

    async fn list_registrations(
        &self,
        status: Option<RegistrationStatus>,
    ) -> BackendResult<Vec<Registration>> {
        let query = Self::registration_query(
            "listRegistrations",
            "($status: String)",
            "(status: $status)",
            false,
        );
        let registrations: Option<Vec<Registration>> = self
            .execute(&query, json!({ "status": status }), "listRegistrations")
            .await?;
        Ok(registrations.unwrap_or_default())
    }

    async fn submit_registration(&self, id: &str) -> BackendResult<Registration> {
        let query =
            Self::registration_query("submitRegistration", "($id: ID!)", "(id: $id)", true);
        self.execute(&query, json!({ "id": id }), "submitRegistration").await
    }

    async fn review_registration(
        &self,
        id: &str,
        decision: &ReviewDecision,
    ) -> BackendResult<Registration> {
        let (field, variables) = match decision {
            ReviewDecision::Approve {
                registration_number,
            } => (
                "approveRegistration",
                json!({ "id": id, "registrationNumber": registration_number }),
            ),
            ReviewDecision::Reject { reason } => (
                "rejectRegistration",
                json!({ "id": id, "reason": reason }),
            ),
        };
        let query = match decision {
            ReviewDecision::Approve { .. } => Self::registration_query(
                field,
                "($id: ID!, $registrationNumber: String!)",
                "(id: $id, registrationNumber: $registrationNumber)",
                true,
            ),
            ReviewDecision::Reject { .. } => Self::registration_query(
                field,
                "($id: ID!, $reason: String!)",
                "(id: $id, reason: $reason)",
                true,
            ),
        };
        self.execute(&query, variables, field).await
    }
}
