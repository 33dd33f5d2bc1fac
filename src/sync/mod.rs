//! Best-effort mirroring of local award state to a remote REST store.
//!
//! The local store stays authoritative; the remote may lag behind or miss
//! operations that were dropped after exhausting retries.

pub mod gateway;
pub mod names;
pub mod remote;

mod errors;
pub mod models;

pub use errors::{Disposition, SyncError};
pub use gateway::{SyncCounters, SyncGateway, SyncHandle};
pub use models::*;
pub use names::NameResolver;
pub use remote::{RemoteStore, RestRemoteStore};
