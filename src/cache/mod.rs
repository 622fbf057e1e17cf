//! Versioned response cache.
//!
//! This module provides the storage side of the offline cache controller:
//! - Named cache generations, exactly one of which is current at a time
//! - Request/response entries keyed by method + absolute URL
//! - Result metadata describing where a controller response came from

mod key;
mod storage;
mod traits;

pub use key::RequestKey;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::CacheResult;
#[cfg(test)]
pub use traits::CacheSource;
