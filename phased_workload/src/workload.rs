use std::collections::HashSet;
use std::path::Path;

use biometrics::{Collector, Counter};
use guacamole::Guacamole;

use super::config::{PhaseConfig, RequestDistributionConfig, WorkloadConfig};
use super::distribution::{load_keys, uniform_at_most, InsertKeys, KeyChooser};
use super::trace::ValuePool;
use super::{
    BulkLoadTrace, Error, Key, Operation, Request, Trace, DEFAULT_PRNG_SEED,
    DEFAULT_RECORD_SIZE_BYTES, KEY_SIZE_BYTES, MAX_RECORD_SIZE_BYTES,
};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static WORKLOADS: Counter = Counter::new("phased_workload.workload.new");
static LOAD_TRACES: Counter = Counter::new("phased_workload.workload.load_trace");
static RUN_TRACES: Counter = Counter::new("phased_workload.workload.run_trace");
static INVALID: Counter = Counter::new("phased_workload.workload.invalid");

pub(crate) fn register_biometrics(collector: &Collector) {
    collector.register_counter(&WORKLOADS);
    collector.register_counter(&LOAD_TRACES);
    collector.register_counter(&RUN_TRACES);
    collector.register_counter(&INVALID);
}

////////////////////////////////////////// PhasedWorkload //////////////////////////////////////////

/// A validated workload that generates deterministic traces for a fixed seed.
#[derive(Clone, Debug)]
pub struct PhasedWorkload {
    config: WorkloadConfig,
    record_size_bytes: usize,
    prng_seed: u64,
    custom_load: Option<Vec<Key>>,
}

impl PhasedWorkload {
    /// Read the workload at `path`.  `set_record_size_bytes` overrides the configured size.
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        set_record_size_bytes: Option<usize>,
    ) -> Result<Self, Error> {
        Self::from_config(WorkloadConfig::from_file(path)?, set_record_size_bytes)
    }

    /// Parse the workload in `yaml`.  `set_record_size_bytes` overrides the configured size.
    pub fn from_yaml(yaml: &str, set_record_size_bytes: Option<usize>) -> Result<Self, Error> {
        Self::from_config(WorkloadConfig::from_yaml(yaml)?, set_record_size_bytes)
    }

    pub fn from_config(
        config: WorkloadConfig,
        set_record_size_bytes: Option<usize>,
    ) -> Result<Self, Error> {
        let record_size_bytes = set_record_size_bytes
            .or(config.record_size_bytes)
            .unwrap_or(DEFAULT_RECORD_SIZE_BYTES);
        if record_size_bytes < KEY_SIZE_BYTES {
            INVALID.click();
            return Err(Error::InvalidWorkload(format!(
                "record size {} cannot hold a {} byte key",
                record_size_bytes, KEY_SIZE_BYTES
            )));
        }
        if record_size_bytes > MAX_RECORD_SIZE_BYTES {
            INVALID.click();
            return Err(Error::InvalidWorkload(format!(
                "record size {} exceeds the {} byte limit",
                record_size_bytes, MAX_RECORD_SIZE_BYTES
            )));
        }
        if let Err(err) = config.validate() {
            INVALID.click();
            return Err(err);
        }
        WORKLOADS.click();
        Ok(Self {
            config,
            record_size_bytes,
            prng_seed: DEFAULT_PRNG_SEED,
            custom_load: None,
        })
    }

    pub fn with_prng_seed(mut self, prng_seed: u64) -> Self {
        self.prng_seed = prng_seed;
        self
    }

    /// Supply the keys of a `custom` load distribution, in load order.  There must be exactly
    /// `num_records` of them and they must be distinct.
    pub fn set_custom_load_dataset(&mut self, keys: Vec<Key>) -> Result<(), Error> {
        if keys.len() as u64 != self.config.load.num_records {
            return Err(Error::InvalidWorkload(format!(
                "custom dataset has {} keys but the load phase wants {}",
                keys.len(),
                self.config.load.num_records
            )));
        }
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != keys.len() {
            return Err(Error::InvalidWorkload(
                "custom dataset has duplicate keys".to_string(),
            ));
        }
        self.custom_load = Some(keys);
        Ok(())
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn record_size_bytes(&self) -> usize {
        self.record_size_bytes
    }

    pub fn value_size_bytes(&self) -> usize {
        self.record_size_bytes - KEY_SIZE_BYTES
    }

    pub fn prng_seed(&self) -> u64 {
        self.prng_seed
    }

    pub fn num_phases(&self) -> usize {
        self.config.run.len()
    }

    /// The records of the load phase.
    pub fn get_load_trace(&self) -> Result<BulkLoadTrace, Error> {
        LOAD_TRACES.click();
        let mut guac = Guacamole::new(self.prng_seed);
        let keys = load_keys(
            &self.config.load.distribution,
            self.config.load.num_records,
            self.custom_load.as_deref(),
            &mut guac,
        )?;
        let values = ValuePool::new(self.value_size_bytes(), &mut guac);
        Ok(BulkLoadTrace::new(keys, values))
    }

    /// The requests of every run phase, split across `num_workers` workers.  The outer vector is
    /// indexed by phase and the inner by worker.
    pub fn get_run_traces(&self, num_workers: usize) -> Result<Vec<Vec<Trace>>, Error> {
        if num_workers == 0 {
            return Err(Error::InvalidThreadCount);
        }
        RUN_TRACES.click();
        let mut population = self.get_load_trace()?.keys().to_vec();
        let mut existing: HashSet<Key> = population.iter().copied().collect();
        let mut phases = Vec::with_capacity(self.config.run.len());
        for (index, phase) in self.config.run.iter().enumerate() {
            let mut guac = Guacamole::new(self.phase_seed(index));
            let requests = generate_phase(phase, &mut guac, &mut population, &mut existing)?;
            let values = ValuePool::new(self.value_size_bytes(), &mut guac);
            phases.push(split(requests, num_workers, &values));
        }
        Ok(phases)
    }

    fn phase_seed(&self, index: usize) -> u64 {
        self.prng_seed
            .wrapping_add((u64::MAX / 1024).wrapping_mul(index as u64 + 1))
    }
}

////////////////////////////////////////// generate_phase //////////////////////////////////////////

fn generate_phase(
    phase: &PhaseConfig,
    guac: &mut Guacamole,
    population: &mut Vec<Key>,
    existing: &mut HashSet<Key>,
) -> Result<Vec<Request>, Error> {
    let n = population.len() as u64;
    let chooser = |distribution: &RequestDistributionConfig| {
        if n > 0 {
            Some(KeyChooser::new(distribution, n))
        } else {
            None
        }
    };
    let read = phase.read.as_ref().and_then(|r| chooser(&r.distribution));
    let update = phase.update.as_ref().and_then(|u| chooser(&u.distribution));
    let scan = phase.scan.as_ref().and_then(|s| chooser(&s.distribution));
    let mut inserts = phase
        .insert
        .as_ref()
        .map(|i| InsertKeys::new(i.distribution.clone()));
    let max_scan_length = phase.scan.as_ref().map(|s| s.max_length).unwrap_or(1);
    let [read_pct, update_pct, scan_pct, _] = phase.proportions();
    let read_thresh = read_pct as u64;
    let update_thresh = read_thresh + update_pct as u64;
    let scan_thresh = update_thresh + scan_pct as u64;

    let choose = |chooser: &Option<KeyChooser>, guac: &mut Guacamole| -> Result<Key, Error> {
        match chooser {
            Some(chooser) => Ok(population[chooser.choose(guac)]),
            None => Err(Error::InvalidWorkload(
                "no existing keys to choose from".to_string(),
            )),
        }
    };

    let mut requests = Vec::with_capacity(phase.num_requests as usize);
    let mut inserted = Vec::new();
    for _ in 0..phase.num_requests {
        let pct = uniform_at_most(guac, 99);
        let request = if pct < read_thresh {
            Request {
                op: Operation::Read,
                key: choose(&read, guac)?,
                scan_amount: 0,
            }
        } else if pct < update_thresh {
            Request {
                op: Operation::Update,
                key: choose(&update, guac)?,
                scan_amount: 0,
            }
        } else if pct < scan_thresh {
            Request {
                op: Operation::Scan,
                key: choose(&scan, guac)?,
                scan_amount: 1 + uniform_at_most(guac, max_scan_length as u64 - 1) as usize,
            }
        } else {
            let inserts = inserts.as_mut().ok_or_else(|| {
                Error::InvalidWorkload("phase inserts without an insert distribution".to_string())
            })?;
            let key = inserts.next(guac, existing)?;
            existing.insert(key);
            inserted.push(key);
            Request {
                op: Operation::Insert,
                key,
                scan_amount: 0,
            }
        };
        requests.push(request);
    }
    // Keys inserted in this phase become readable in the next.
    population.extend(inserted);
    Ok(requests)
}

/////////////////////////////////////////////// split //////////////////////////////////////////////

fn split(requests: Vec<Request>, num_workers: usize, values: &ValuePool) -> Vec<Trace> {
    let base = requests.len() / num_workers;
    let extra = requests.len() % num_workers;
    let mut requests = requests.into_iter();
    (0..num_workers)
        .map(|worker| {
            let take = base + usize::from(worker < extra);
            Trace::new(requests.by_ref().take(take).collect(), values.clone())
        })
        .collect()
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
