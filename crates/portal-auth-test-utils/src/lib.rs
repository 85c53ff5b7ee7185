// portal-auth-test-utils — test doubles for the session broker.
//
// - `RecordingStore` for asserting on the TTL of every write
// - `OfflineStore` for fail-closed behaviour when the cache is down
// - `StubIdentityProvider` for scripted token-endpoint responses
// - Record and grant fixtures

pub mod fixtures;
pub mod idp;
pub mod stores;

pub use idp::StubIdentityProvider;
pub use stores::{OfflineStore, RecordingStore, RecordedWrite};
