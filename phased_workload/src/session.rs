use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use biometrics::{Collector, Counter};

use super::{BulkLoadTrace, DatabaseInterface, Error, Operation, PhasedWorkload, Trace};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static INITIALIZE: Counter = Counter::new("phased_workload.session.initialize");
static TERMINATE: Counter = Counter::new("phased_workload.session.terminate");
static TERMINATE_ON_DROP: Counter = Counter::new("phased_workload.session.terminate_on_drop");
static WORKER_LOST: Counter = Counter::new("phased_workload.session.worker_lost");
static DATABASE_ERROR: Counter = Counter::new("phased_workload.session.database_error");

static BULK_LOAD: Counter = Counter::new("phased_workload.session.bulk_load");
static BULK_LOAD_RECORDS: Counter = Counter::new("phased_workload.session.bulk_load.records");

static INSERT: Counter = Counter::new("phased_workload.session.requests.insert");
static READ: Counter = Counter::new("phased_workload.session.requests.read");
static UPDATE: Counter = Counter::new("phased_workload.session.requests.update");
static SCAN: Counter = Counter::new("phased_workload.session.requests.scan");

pub(crate) fn register_biometrics(collector: &Collector) {
    collector.register_counter(&INITIALIZE);
    collector.register_counter(&TERMINATE);
    collector.register_counter(&TERMINATE_ON_DROP);
    collector.register_counter(&WORKER_LOST);
    collector.register_counter(&DATABASE_ERROR);
    collector.register_counter(&BULK_LOAD);
    collector.register_counter(&BULK_LOAD_RECORDS);
    collector.register_counter(&INSERT);
    collector.register_counter(&READ);
    collector.register_counter(&UPDATE);
    collector.register_counter(&SCAN);
}

///////////////////////////////////////////// LoadResult ///////////////////////////////////////////

/// The outcome of replaying a load trace.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadResult {
    pub records: usize,
    pub elapsed: Duration,
}

//////////////////////////////////////////// ReplayStats ///////////////////////////////////////////

/// The outcome of replaying run phases.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReplayStats {
    pub inserts: u64,
    pub reads: u64,
    pub reads_found: u64,
    pub updates: u64,
    pub scans: u64,
    pub scanned_keys: u64,
    pub elapsed: Duration,
}

impl ReplayStats {
    pub fn requests(&self) -> u64 {
        self.inserts + self.reads + self.updates + self.scans
    }

    fn merge(&mut self, other: &ReplayStats) {
        self.inserts += other.inserts;
        self.reads += other.reads;
        self.reads_found += other.reads_found;
        self.updates += other.updates;
        self.scans += other.scans;
        self.scanned_keys += other.scanned_keys;
    }
}

fn replay_trace<D: DatabaseInterface>(db: &D, trace: &Trace) -> Result<ReplayStats, D::Error> {
    let mut stats = ReplayStats::default();
    let start = Instant::now();
    for (request, value) in trace.iter() {
        match request.op {
            Operation::Insert => {
                db.insert(request.key, value)?;
                stats.inserts += 1;
                INSERT.click();
            }
            Operation::Read => {
                if db.read(request.key)?.is_some() {
                    stats.reads_found += 1;
                }
                stats.reads += 1;
                READ.click();
            }
            Operation::Update => {
                db.update(request.key, value)?;
                stats.updates += 1;
                UPDATE.click();
            }
            Operation::Scan => {
                let scanned = db.scan(request.key, request.scan_amount)?;
                stats.scanned_keys += scanned.len() as u64;
                stats.scans += 1;
                SCAN.click();
            }
        }
    }
    stats.elapsed = start.elapsed();
    Ok(stats)
}

////////////////////////////////////////////// Worker //////////////////////////////////////////////

type Job<D> = Box<dyn FnOnce(&D) + Send + 'static>;

struct Worker<D> {
    jobs: Sender<Job<D>>,
    thread: JoinHandle<()>,
}

/////////////////////////////////////////////// State //////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Fresh,
    Initialized,
    Terminated,
}

////////////////////////////////////////////// Session /////////////////////////////////////////////

/// A session binds a database to a fixed number of worker threads.
///
/// The lifecycle is `set_database`, `initialize`, any number of replays, then `terminate`.  The
/// workers exist from `initialize` until `terminate`.  Dropping an initialized session terminates
/// it, so a replay that fails with `?` still releases the workers and shuts the database down.
pub struct Session<D: DatabaseInterface + 'static> {
    num_threads: usize,
    database: Option<Arc<D>>,
    workers: Vec<Worker<D>>,
    state: State,
}

impl<D: DatabaseInterface + 'static> Session<D> {
    pub fn new(num_threads: usize) -> Result<Self, Error> {
        if num_threads == 0 {
            return Err(Error::InvalidThreadCount);
        }
        Ok(Self {
            num_threads,
            database: None,
            workers: Vec::new(),
            state: State::Fresh,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn database(&self) -> Option<&Arc<D>> {
        self.database.as_ref()
    }

    /// Bind the database.  Only legal before `initialize`.
    pub fn set_database(&mut self, database: Arc<D>) -> Result<(), Error> {
        match self.state {
            State::Fresh => {
                self.database = Some(database);
                Ok(())
            }
            State::Initialized => Err(Error::AlreadyInitialized),
            State::Terminated => Err(Error::Terminated),
        }
    }

    /// Start the workers and initialize the database on the first of them.
    pub fn initialize(&mut self) -> Result<(), Error> {
        match self.state {
            State::Fresh => {}
            State::Initialized => return Err(Error::AlreadyInitialized),
            State::Terminated => return Err(Error::Terminated),
        }
        let database = self.database.clone().ok_or(Error::NoDatabase)?;
        for index in 0..self.num_threads {
            let (jobs, queue) = mpsc::channel::<Job<D>>();
            let db = Arc::clone(&database);
            let spawned = std::thread::Builder::new()
                .name(format!("phased-workload-{}", index))
                .spawn(move || {
                    for job in queue.iter() {
                        job(db.as_ref());
                    }
                });
            match spawned {
                Ok(thread) => self.workers.push(Worker { jobs, thread }),
                Err(err) => {
                    self.join_workers();
                    return Err(err.into());
                }
            }
        }
        self.state = State::Initialized;
        INITIALIZE.click();
        Self::wait(self.submit(0, |db| db.initialize_database()))
    }

    /// Replay `load` through the database's `bulk_load` on the first worker.
    pub fn replay_bulk_load_trace(&self, load: &BulkLoadTrace) -> Result<LoadResult, Error> {
        self.check_initialized()?;
        let load = load.clone();
        let records = load.len();
        let elapsed = Self::wait(self.submit(0, move |db| {
            let start = Instant::now();
            db.bulk_load(&load).map(|_| start.elapsed())
        }))?;
        BULK_LOAD.click();
        BULK_LOAD_RECORDS.count(records as u64);
        Ok(LoadResult { records, elapsed })
    }

    /// Replay every run phase of `workload`, one phase at a time, across all workers.
    pub fn run_phased_workload(&self, workload: &PhasedWorkload) -> Result<ReplayStats, Error> {
        self.check_initialized()?;
        let phases = workload.get_run_traces(self.num_threads)?;
        let start = Instant::now();
        let mut stats = ReplayStats::default();
        for traces in phases {
            let pending: Vec<_> = traces
                .into_iter()
                .enumerate()
                .map(|(index, trace)| self.submit(index, move |db| replay_trace(db, &trace)))
                .collect();
            // Every worker finishes the phase before any error surfaces.
            let mut first_err = None;
            for results in pending {
                match Self::wait(results) {
                    Ok(worker_stats) => stats.merge(&worker_stats),
                    Err(err) => {
                        first_err.get_or_insert(err);
                    }
                }
            }
            if let Some(err) = first_err {
                return Err(err);
            }
        }
        stats.elapsed = start.elapsed();
        Ok(stats)
    }

    /// Shut the database down on the first worker and join every worker.  Only the first call
    /// does any work; later calls succeed trivially.
    pub fn terminate(&mut self) -> Result<(), Error> {
        match self.state {
            State::Fresh => {
                self.state = State::Terminated;
                return Ok(());
            }
            State::Initialized => {}
            State::Terminated => return Ok(()),
        }
        self.state = State::Terminated;
        let shutdown = Self::wait(self.submit(0, |db| db.shutdown_database()));
        let joined = self.join_workers();
        TERMINATE.click();
        shutdown?;
        if joined {
            Ok(())
        } else {
            Err(Error::WorkerLost)
        }
    }

    fn check_initialized(&self) -> Result<(), Error> {
        match self.state {
            State::Fresh => Err(Error::NotInitialized),
            State::Initialized => Ok(()),
            State::Terminated => Err(Error::Terminated),
        }
    }

    fn submit<T, F>(&self, worker: usize, f: F) -> Receiver<Result<T, D::Error>>
    where
        T: Send + 'static,
        F: FnOnce(&D) -> Result<T, D::Error> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job<D> = Box::new(move |db: &D| {
            let _ = tx.send(f(db));
        });
        // A failed send drops the job and its sender, which the receiver sees as a lost worker.
        let _ = self.workers[worker].jobs.send(job);
        rx
    }

    fn wait<T>(results: Receiver<Result<T, D::Error>>) -> Result<T, Error> {
        match results.recv() {
            Ok(Ok(t)) => Ok(t),
            Ok(Err(err)) => {
                DATABASE_ERROR.click();
                Err(Error::Database(format!("{:?}", err)))
            }
            Err(_) => {
                WORKER_LOST.click();
                Err(Error::WorkerLost)
            }
        }
    }

    /// Close every job queue and join every worker.  Returns false if any worker panicked.
    fn join_workers(&mut self) -> bool {
        let mut clean = true;
        for worker in std::mem::take(&mut self.workers) {
            drop(worker.jobs);
            if worker.thread.join().is_err() {
                WORKER_LOST.click();
                clean = false;
            }
        }
        clean
    }
}

impl<D: DatabaseInterface + 'static> Drop for Session<D> {
    fn drop(&mut self) {
        if self.state == State::Initialized {
            TERMINATE_ON_DROP.click();
            if let Err(err) = self.terminate() {
                eprintln!("session terminated with error: {}", err);
            }
        }
    }
}
