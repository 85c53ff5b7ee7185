pub mod models;

pub use models::{
    AdapterAccount, AdapterSession, AdapterUser, ProviderKind, SessionError, SessionHandle,
    TokenRecord, TokenState, VerificationToken,
};
