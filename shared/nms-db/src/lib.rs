//! NMS database access
//!
//! PostgreSQL connection pooling shared by the billing and provisioning
//! services.

mod error;
mod pool;

pub use error::{DbError, Result};
pub use pool::{DbPool, PoolConfig, PoolStats};

/// Re-export tokio-postgres types for convenience
pub use tokio_postgres::{
    types::{FromSql, ToSql},
    Row,
};
