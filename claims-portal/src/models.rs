use serde::{Deserialize, Serialize};

/// Attached supporting document. Bytes travel separately from the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// A file name usable as a single object-storage path segment
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Claim being assembled on the claim sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDraft {
    pub employee_number: String,
    pub claim_type_code: Option<String>,
    pub amount: f64,
    pub description: String,
    pub supporting_documents: Vec<FileRef>,
}

impl ClaimDraft {
    /// Semicolon-joined file names, as the add-claim mutation expects
    pub fn document_names(&self) -> String {
        self.supporting_documents
            .iter()
            .map(|doc| doc.name.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Policy holder as returned by the lookup query, before it is judged usable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyHolder {
    pub id: String,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub has_bank_details: Option<bool>,
}

/// Resolved policy holder snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    pub id: String,
    pub name: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub has_bank_details: bool,
}

impl EmployeeRecord {
    /// A lookup only resolves when the record carries a usable name
    pub fn from_lookup(holder: PolicyHolder) -> Option<Self> {
        let name = holder.name.filter(|name| !name.trim().is_empty())?;
        Some(Self {
            id: holder.id,
            name,
            gender: holder.gender,
            date_of_birth: holder.date_of_birth,
            has_bank_details: holder.has_bank_details.unwrap_or(false),
        })
    }
}

/// Outcome of the duplicate-claim check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVerificationResult {
    pub claim_label: Option<String>,
    pub previous_claim_id: Option<i64>,
    pub previous_claim_amount: Option<f64>,
    pub previous_claim_date_time: Option<String>,
    pub previous_claim_description: Option<String>,
}

impl ClaimVerificationResult {
    /// Both a missing id and id 0 mean "no previous claim"; the amount must be present too.
    pub fn is_duplicate(&self) -> bool {
        matches!(self.previous_claim_id, Some(id) if id != 0) && self.previous_claim_amount.is_some()
    }
}

/// Bank account fields captured on the bank details gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetailsInput {
    pub bank_name: String,
    pub branch_number: String,
    pub branch_name: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub bank_name: String,
    pub branch_number: String,
    pub branch_name: String,
    pub account_number: String,
    pub account_name: String,
    pub policy_holder_id: String,
}

impl BankDetails {
    pub fn for_policy_holder(input: BankDetailsInput, policy_holder_id: impl Into<String>) -> Self {
        Self {
            bank_name: input.bank_name,
            branch_number: input.branch_number,
            branch_name: input.branch_name,
            account_number: input.account_number,
            account_name: input.account_name,
            policy_holder_id: policy_holder_id.into(),
        }
    }
}

/// Benefit catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimType {
    pub id: String,
    pub group: String,
    pub label: String,
}

/// The signed-in provider filing claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub user_id: String,
    #[serde(default)]
    pub is_psna: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyClaimRequest {
    pub user_id: String,
    pub employee_no: String,
    pub claim_code: String,
    pub amount: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddClaimRequest {
    pub user_id: String,
    pub employee_no: String,
    pub claim_code: String,
    pub amount: f64,
    pub description: String,
    pub status: String,
    pub documents: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub id: i64,
}

/// Where an uploaded claim document lands in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    pub user_id: String,
    pub claim_id: i64,
    pub file_name: String,
}

impl DocumentKey {
    pub fn path(&self) -> String {
        format!(
            "private/{}/claims/{}/{}",
            self.user_id, self.claim_id, self.file_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub name: String,
    pub error: String,
}

/// Per-file outcome of the uploads that follow a successful add-claim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What the claim sheet reports once the claim has been filed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedClaim {
    pub claim_id: i64,
    pub employee_number: String,
    pub claim_type_code: String,
    pub amount: f64,
    pub uploads: UploadReport,
}
