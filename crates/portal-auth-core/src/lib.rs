// portal-auth-core — shared types for the portal session broker.
//
// Records stored in the token cache, the error taxonomy, configuration,
// logging setup and the error-reporting port used by every other crate.

pub mod db;
pub mod env;
pub mod error;
pub mod options;
pub mod report;
pub mod utils;

// Re-exports for convenience
pub use db::models::{
    AdapterAccount, AdapterSession, AdapterUser, ProviderKind, SessionError, SessionHandle,
    TokenRecord, TokenState, VerificationToken,
};
pub use error::{ErrorCode, PortalAuthError, Result};
pub use options::{PortalAuthOptions, ProviderSettings, SessionStrategy};
pub use report::{ErrorReporter, ReportedError, TracingErrorReporter};
