//! phased_workload generates YCSB-style workloads and replays them against anything that
//! implements [DatabaseInterface].
//!
//! A workload has a load phase, which produces a [BulkLoadTrace] of distinct keys, and zero or
//! more run phases, which produce [Trace]s of reads, updates, scans, and inserts.  Traces are
//! deterministic for a fixed seed.  A [Session] owns the worker threads that drive a database
//! through those traces.

use std::fmt::{Display, Formatter};

use biometrics::Collector;

pub mod config;
pub mod distribution;

mod database;
mod session;
mod trace;
mod workload;

pub use database::DatabaseInterface;
pub use session::{LoadResult, ReplayStats, Session};
pub use trace::{BulkLoadTrace, Operation, Request, Trace};
pub use workload::PhasedWorkload;

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Keys are fixed-width unsigned integers.
pub type Key = u64;

/// Every record starts with its key.
pub const KEY_SIZE_BYTES: usize = std::mem::size_of::<Key>();

/// The record size used when the configuration does not specify one.
pub const DEFAULT_RECORD_SIZE_BYTES: usize = 16;

/// The largest record a workload may ask for.
pub const MAX_RECORD_SIZE_BYTES: usize = 1 << 30;

/// The seed used when the caller does not specify one.
pub const DEFAULT_PRNG_SEED: u64 = 42;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

/// Register this crate's biometrics with the collector.
pub fn register_biometrics(collector: &Collector) {
    session::register_biometrics(collector);
    workload::register_biometrics(collector);
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    InvalidWorkload(String),
    InvalidThreadCount,
    NoDatabase,
    AlreadyInitialized,
    NotInitialized,
    Terminated,
    Database(String),
    WorkerLost,
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Io(err) => write!(fmt, "I/O error: {}", err),
            Error::Yaml(err) => write!(fmt, "could not parse workload: {}", err),
            Error::InvalidWorkload(what) => write!(fmt, "invalid workload: {}", what),
            Error::InvalidThreadCount => write!(fmt, "a session needs at least one thread"),
            Error::NoDatabase => write!(fmt, "no database set on the session"),
            Error::AlreadyInitialized => write!(fmt, "session already initialized"),
            Error::NotInitialized => write!(fmt, "session not initialized"),
            Error::Terminated => write!(fmt, "session already terminated"),
            Error::Database(what) => write!(fmt, "database error: {}", what),
            Error::WorkerLost => write!(fmt, "a session worker exited before finishing its job"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err)
    }
}
