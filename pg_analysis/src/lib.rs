//! pg_analysis extracts the datasets that phased workloads load, so they can be studied offline.

use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use biometrics::{Collector, Counter};

use phased_workload::{BulkLoadTrace, DatabaseInterface, Key, PhasedWorkload, Session};

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// The record size used when dumping datasets.  Values are discarded, so it only needs to hold a
/// key.
pub const RECORD_SIZE_BYTES: usize = 16;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static EXTRACTIONS: Counter = Counter::new("pg_analysis.extract");
static KEYS_CAPTURED: Counter = Counter::new("pg_analysis.extract.keys_captured");
static IGNORED_WRITES: Counter = Counter::new("pg_analysis.extract.ignored_writes");
static KEYS_WRITTEN: Counter = Counter::new("pg_analysis.write.keys");

/// Register this crate's biometrics with the collector.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&EXTRACTIONS);
    collector.register_counter(&KEYS_CAPTURED);
    collector.register_counter(&IGNORED_WRITES);
    collector.register_counter(&KEYS_WRITTEN);
    phased_workload::register_biometrics(collector);
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Workload(phased_workload::Error),
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Io(err) => write!(fmt, "I/O error: {}", err),
            Error::Workload(err) => write!(fmt, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Workload(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<phased_workload::Error> for Error {
    fn from(err: phased_workload::Error) -> Self {
        Self::Workload(err)
    }
}

////////////////////////////////////////// DatasetExtractor ////////////////////////////////////////

/// A database that remembers the keys it was bulk loaded with and nothing else.
///
/// Point writes succeed without effect, reads find nothing, and scans return nothing.
#[derive(Debug, Default)]
pub struct DatasetExtractor {
    dataset: Mutex<Vec<Key>>,
}

impl DatasetExtractor {
    /// A copy of the keys captured so far, in load order.
    pub fn dataset(&self) -> Vec<Key> {
        self.lock().clone()
    }

    /// Move the captured keys out, leaving the extractor empty.
    pub fn take_dataset(&self) -> Vec<Key> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Key>> {
        // A poisoned dataset is still a valid prefix of the load.
        self.dataset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DatabaseInterface for DatasetExtractor {
    type Error = Infallible;

    fn initialize_database(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn shutdown_database(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn bulk_load(&self, load: &BulkLoadTrace) -> Result<(), Self::Error> {
        let mut dataset = self.lock();
        dataset.reserve(load.len());
        for index in 0..load.len() {
            dataset.push(load.key_at(index));
        }
        KEYS_CAPTURED.count(load.len() as u64);
        Ok(())
    }

    fn insert(&self, _: Key, _: &[u8]) -> Result<(), Self::Error> {
        IGNORED_WRITES.click();
        Ok(())
    }

    fn update(&self, _: Key, _: &[u8]) -> Result<(), Self::Error> {
        IGNORED_WRITES.click();
        Ok(())
    }

    fn read(&self, _: Key) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(None)
    }

    fn scan(&self, _: Key, _: usize) -> Result<Vec<(Key, Vec<u8>)>, Self::Error> {
        Ok(vec![])
    }
}

////////////////////////////////////////// extract_workload ////////////////////////////////////////

/// Replay the load phase of the workload at `workload_config` and return the captured keys.
pub fn extract_workload<P: AsRef<Path>>(
    workload_config: P,
    record_size_bytes: usize,
) -> Result<Arc<DatasetExtractor>, Error> {
    println!("Loading workload...");
    let workload = PhasedWorkload::from_file(workload_config, Some(record_size_bytes))?;
    extract_from_workload(&workload)
}

/// Replay the load phase of `workload` on a single-threaded session and return the captured keys.
pub fn extract_from_workload(workload: &PhasedWorkload) -> Result<Arc<DatasetExtractor>, Error> {
    EXTRACTIONS.click();
    let db = Arc::new(DatasetExtractor::default());
    println!("Starting session...");
    let mut session = Session::new(1)?;
    session.set_database(Arc::clone(&db))?;
    session.initialize()?;
    println!("Running bulk load...");
    // An early return drops the session, which terminates it.
    let load = workload.get_load_trace()?;
    session.replay_bulk_load_trace(&load)?;
    println!("Done.");
    session.terminate()?;
    Ok(db)
}

/////////////////////////////////////////// write_dataset //////////////////////////////////////////

/// Sort `dataset` and write it to `output`, one key per line.
pub fn write_dataset<W: Write>(dataset: &mut [Key], output: W) -> Result<(), Error> {
    dataset.sort_unstable();
    let mut output = BufWriter::new(output);
    for key in dataset.iter() {
        writeln!(output, "{}", key)?;
    }
    output.flush()?;
    KEYS_WRITTEN.count(dataset.len() as u64);
    Ok(())
}

/// Sort `dataset` and write it to the file at `path`, replacing anything already there.
pub fn write_dataset_to_file<P: AsRef<Path>>(dataset: &mut [Key], path: P) -> Result<(), Error> {
    let file = File::create(path)?;
    write_dataset(dataset, &file)?;
    file.sync_all()?;
    Ok(())
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
