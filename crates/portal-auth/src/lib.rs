// portal-auth — server-side session and credential broker.
//
// Signs users in against OIDC providers, keeps provider tokens in the cache
// store, refreshes them on demand and hands the browser nothing but an
// opaque, signed session id.

pub mod accessor;
pub mod adapter;
pub mod broker;
pub mod cookies;
pub mod crypto;
pub mod error;
pub mod init;
pub mod notify;

pub use accessor::{RequestContext, ServerTokenAccessor};
pub use adapter::{CacheAdapter, NewUser, SessionAdapter, SessionPatch, UserPatch};
pub use broker::{
    AccessTokenState, ClientSession, ClientUser, IdentityAssertion, SessionBroker, SignIn,
    SignInStatus,
};
pub use cookies::SessionCookie;
pub use error::{AdapterError, BrokerError};
pub use init::PortalAuth;
pub use notify::{HttpProfileNotifier, NotifyError, SignInEvent, SignInNotifier};
