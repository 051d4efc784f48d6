pub mod backend;
pub mod claims;
pub mod config;
pub mod error;
pub mod models;
pub mod registration;
pub mod service;

pub use config::{LogFormat, PortalConfig};
pub use error::{FieldErrors, PortalError, PortalResult};
pub use service::{AppState, build_router};

/// Router wired to the backends named by `config`
pub fn create_app(config: &PortalConfig) -> axum::Router {
    build_router(AppState::from_config(config))
}
