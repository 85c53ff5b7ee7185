// portal-auth-redis — token cache store.
//
// A `CacheStore` trait with a Redis implementation (lazy, reconnecting,
// multiplexed connection) and an in-memory implementation for tests and
// single-process development.

pub mod connection;
pub mod keys;
pub mod storage;

pub use connection::RedisConnection;
pub use storage::{
    CacheStore, InMemoryCacheStore, RedisCacheStore, RedisLikeConnection, StoreError,
};
