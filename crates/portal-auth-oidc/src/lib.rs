// portal-auth-oidc — identity provider client.
//
// Authorization-code exchange and refresh-token grants against an OIDC
// provider's token endpoint, with every accepted response shape normalized
// into `TokenGrant` on ingress.

pub mod client;
pub mod pkce;
pub mod provider;
pub mod tokens;

// Re-exports
pub use client::{IdentityProvider, OidcClient};
pub use pkce::{generate_code_challenge, generate_code_verifier};
pub use provider::{AuthenticationMethod, OidcProviderConfig};
pub use tokens::{normalize_token_response, RefreshError, TokenEndpointError, TokenGrant};
