#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::struct_field_names,
    clippy::uninlined_format_args
)]

pub mod api;
pub mod channels;
pub mod config;
pub mod credentials;
pub mod gateway;
pub mod routes;
pub mod session;

pub use api::ApiClient;
pub use channels::{RealtimeChannel, UpdateEvent};
pub use config::Config;
pub use credentials::{CredentialStore, FileCredentialStore, TokenPair};
pub use gateway::{Gateway, GatewayError, NoRefresh, TokenRefresher};
pub use routes::{Navigator, RouteDecision, RouteRequirement};
pub use session::{Role, Session, SessionManager, SessionStatus, SessionStore, UserRef};
