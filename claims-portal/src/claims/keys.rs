// Context keys shared by the claim flow tasks
pub mod session_keys {
    pub const SESSION_ID: &str = "session_id";
    pub const PROVIDER: &str = "provider";
    /// Prefix of the per-request event slots, see [`event_key`]
    pub const EVENT_PREFIX: &str = "event:";
    pub const LOOKUP: &str = "employee_lookup";
    pub const DRAFT: &str = "draft";
    pub const ATTACHMENTS: &str = "attachments";
    pub const CLAIM_TYPES: &str = "claim_types";
    pub const VERIFICATION: &str = "verification";
    pub const WARNING_ACKNOWLEDGED: &str = "warning_acknowledged";
    pub const FINAL_VERIFICATION: &str = "final_verification";
    pub const SUBMITTING: &str = "submitting";
    pub const BANK_DETAILS_ADDED: &str = "bank_details_added";
    pub const LOADING: &str = "loading";
    pub const FIELD_ERRORS: &str = "field_errors";
    pub const NOTICE: &str = "notice";
    pub const LAST_SUBMITTED: &str = "last_submitted";

    /// Everything a cancel wipes; the provider, session id and last submission survive
    pub const CLAIM_FACTS: &[&str] = &[
        LOOKUP,
        DRAFT,
        ATTACHMENTS,
        VERIFICATION,
        WARNING_ACKNOWLEDGED,
        FINAL_VERIFICATION,
        SUBMITTING,
        BANK_DETAILS_ADDED,
        LOADING,
        FIELD_ERRORS,
        NOTICE,
    ];

    /// Slot holding the event of the request that advanced the context to `generation`
    pub fn event_key(generation: u64) -> String {
        format!("{EVENT_PREFIX}{generation}")
    }
}
