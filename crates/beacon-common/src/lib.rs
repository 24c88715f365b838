//! Types shared by every Beacon crate.

pub mod errors;
pub mod id;

pub use errors::{BeaconError, ConfigError};
pub use id::{new_correlation_id, new_id, ListenerId, SubscriptionId};

pub type Result<T> = std::result::Result<T, BeaconError>;
