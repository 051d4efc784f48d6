//! The claim sheet: one graph task per stage, driven by user events.

pub mod events;
pub mod keys;
pub mod service;
pub mod stage;
pub mod tasks;
pub mod workflow;

pub use events::ClaimEvent;
pub use keys::session_keys;
pub use service::{ClaimOutcome, ClaimService, ClaimView};
pub use stage::{ClaimFacts, ClaimStage, EmployeeLookup};
pub use workflow::{CLAIM_GRAPH_ID, build_claim_workflow, create_flow_runner};
