use std::fmt::Debug;

use super::{BulkLoadTrace, Key};

///////////////////////////////////////// DatabaseInterface ////////////////////////////////////////

/// The operations a [crate::Session] drives.  Every method takes `&self` because a session shares
/// one database across all of its worker threads.
pub trait DatabaseInterface: Send + Sync {
    type Error: Debug + Send + 'static;

    /// Called once, on a worker thread, when the session initializes.
    fn initialize_database(&self) -> Result<(), Self::Error>;
    /// Called once, on a worker thread, when the session terminates.
    fn shutdown_database(&self) -> Result<(), Self::Error>;

    /// Load every record of `load`.  The trace may be empty.
    fn bulk_load(&self, load: &BulkLoadTrace) -> Result<(), Self::Error>;

    fn insert(&self, key: Key, value: &[u8]) -> Result<(), Self::Error>;
    fn update(&self, key: Key, value: &[u8]) -> Result<(), Self::Error>;
    /// Returns `None` when `key` does not exist.
    fn read(&self, key: Key) -> Result<Option<Vec<u8>>, Self::Error>;
    /// Returns up to `amount` records with keys at or after `start`, in key order.
    fn scan(&self, start: Key, amount: usize) -> Result<Vec<(Key, Vec<u8>)>, Self::Error>;
}
