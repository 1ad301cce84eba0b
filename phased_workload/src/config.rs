//! The YAML description of a phased workload.
//!
//! ```yaml
//! record_size_bytes: 16
//! load:
//!   num_records: 1000
//!   distribution:
//!     type: uniform
//!     range_min: 1
//!     range_max: 1000000
//! run:
//! - num_requests: 1000
//!   read:
//!     proportion_pct: 95
//!     distribution:
//!       type: zipfian
//!       theta: 0.99
//!   update:
//!     proportion_pct: 5
//!     distribution:
//!       type: uniform
//! ```

use std::path::Path;

use serde::Deserialize;

use super::{Error, Key};

/// The zipfian skew used when a configuration names no theta.
pub const DEFAULT_ZIPFIAN_THETA: f64 = 0.99;

fn default_zipfian_theta() -> f64 {
    DEFAULT_ZIPFIAN_THETA
}

////////////////////////////////////////// WorkloadConfig //////////////////////////////////////////

/// A complete workload:  one load phase and any number of run phases.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    /// Bytes per record, key included.
    pub record_size_bytes: Option<usize>,
    pub load: LoadConfig,
    #[serde(default)]
    pub run: Vec<PhaseConfig>,
}

impl WorkloadConfig {
    /// Parse a configuration from YAML.  The result is not yet validated.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.  The result is not yet validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check every constraint that does not depend on the record size or custom dataset.
    pub fn validate(&self) -> Result<(), Error> {
        self.load.validate()?;
        for (index, phase) in self.run.iter().enumerate() {
            phase
                .validate(self.load.num_records)
                .map_err(|what| invalid(format!("run phase {}: {}", index, what)))?;
        }
        Ok(())
    }
}

//////////////////////////////////////////// LoadConfig ////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoadConfig {
    pub num_records: u64,
    pub distribution: KeyDistributionConfig,
}

impl LoadConfig {
    fn validate(&self) -> Result<(), Error> {
        self.distribution
            .check_capacity(self.num_records)
            .map_err(|what| invalid(format!("load: {}", what)))
    }
}

////////////////////////////////////// KeyDistributionConfig ///////////////////////////////////////

/// How new keys get chosen, both for the load phase and for inserts.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyDistributionConfig {
    /// Distinct keys drawn uniformly from `[range_min, range_max]`.
    Uniform { range_min: Key, range_max: Key },
    /// `start_key`, `start_key + step_size`, `start_key + 2 * step_size`, ...
    Linspace { start_key: Key, step_size: Key },
    /// Keys supplied by the program rather than the configuration.
    Custom,
}

impl KeyDistributionConfig {
    fn check_capacity(&self, num_records: u64) -> Result<(), String> {
        match self {
            KeyDistributionConfig::Uniform {
                range_min,
                range_max,
            } => {
                if range_min > range_max {
                    return Err(format!(
                        "range_min {} exceeds range_max {}",
                        range_min, range_max
                    ));
                }
                let span = (*range_max - *range_min) as u128 + 1;
                if span < num_records as u128 {
                    return Err(format!(
                        "range [{}, {}] cannot hold {} distinct keys",
                        range_min, range_max, num_records
                    ));
                }
                Ok(())
            }
            KeyDistributionConfig::Linspace {
                start_key,
                step_size,
            } => {
                if num_records > 1 && *step_size == 0 {
                    return Err("linspace step_size must be positive".to_string());
                }
                if num_records > 0 {
                    step_size
                        .checked_mul(num_records - 1)
                        .and_then(|span| span.checked_add(*start_key))
                        .ok_or_else(|| {
                            format!(
                                "linspace from {} by {} overflows before {} keys",
                                start_key, step_size, num_records
                            )
                        })?;
                }
                Ok(())
            }
            KeyDistributionConfig::Custom => Ok(()),
        }
    }
}

///////////////////////////////////// RequestDistributionConfig ////////////////////////////////////

/// How existing keys get chosen for reads, updates, and scans.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestDistributionConfig {
    Uniform,
    Zipfian {
        #[serde(default = "default_zipfian_theta")]
        theta: f64,
    },
}

impl RequestDistributionConfig {
    fn validate(&self) -> Result<(), String> {
        match self {
            RequestDistributionConfig::Uniform => Ok(()),
            RequestDistributionConfig::Zipfian { theta } => {
                if *theta > 0.0 && *theta < 1.0 {
                    Ok(())
                } else {
                    Err(format!("zipfian theta {} must lie in (0, 1)", theta))
                }
            }
        }
    }
}

//////////////////////////////////////////// PhaseConfig ///////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    pub num_requests: u64,
    pub read: Option<RequestConfig>,
    pub update: Option<RequestConfig>,
    pub scan: Option<ScanConfig>,
    pub insert: Option<InsertConfig>,
}

impl PhaseConfig {
    /// The read, update, scan, and insert percentages, in that order.
    pub fn proportions(&self) -> [u32; 4] {
        [
            self.read.as_ref().map(|r| r.proportion_pct).unwrap_or(0),
            self.update.as_ref().map(|u| u.proportion_pct).unwrap_or(0),
            self.scan.as_ref().map(|s| s.proportion_pct).unwrap_or(0),
            self.insert.as_ref().map(|i| i.proportion_pct).unwrap_or(0),
        ]
    }

    fn validate(&self, loaded: u64) -> Result<(), String> {
        let proportions = self.proportions();
        let total: u64 = proportions.iter().map(|p| *p as u64).sum();
        if total != 100 {
            return Err(format!("proportions sum to {}, not 100", total));
        }
        if loaded == 0 && proportions[..3].iter().any(|p| *p > 0) {
            return Err("reads, updates, and scans need a non-empty load".to_string());
        }
        if let Some(read) = &self.read {
            read.distribution.validate()?;
        }
        if let Some(update) = &self.update {
            update.distribution.validate()?;
        }
        if let Some(scan) = &self.scan {
            scan.distribution.validate()?;
            if scan.max_length == 0 {
                return Err("scan max_length must be positive".to_string());
            }
        }
        if let Some(insert) = &self.insert {
            if insert.distribution == KeyDistributionConfig::Custom {
                return Err("inserts cannot use a custom distribution".to_string());
            }
            insert.distribution.check_capacity(1)?;
        }
        Ok(())
    }
}

/////////////////////////////////////////// RequestConfig //////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub proportion_pct: u32,
    pub distribution: RequestDistributionConfig,
}

//////////////////////////////////////////// ScanConfig ////////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub proportion_pct: u32,
    pub max_length: usize,
    pub distribution: RequestDistributionConfig,
}

/////////////////////////////////////////// InsertConfig ///////////////////////////////////////////

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InsertConfig {
    pub proportion_pct: u32,
    pub distribution: KeyDistributionConfig,
}

////////////////////////////////////////////// invalid /////////////////////////////////////////////

fn invalid(what: String) -> Error {
    Error::InvalidWorkload(what)
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const YCSB_A: &str = r#"
record_size_bytes: 64
load:
  num_records: 100
  distribution:
    type: uniform
    range_min: 1
    range_max: 1000
run:
- num_requests: 50
  read:
    proportion_pct: 50
    distribution:
      type: zipfian
  update:
    proportion_pct: 50
    distribution:
      type: uniform
"#;

    #[test]
    fn parse_ycsb_a() {
        let config = WorkloadConfig::from_yaml(YCSB_A).unwrap();
        assert_eq!(Some(64), config.record_size_bytes);
        assert_eq!(100, config.load.num_records);
        assert_eq!(
            KeyDistributionConfig::Uniform {
                range_min: 1,
                range_max: 1000
            },
            config.load.distribution
        );
        assert_eq!(1, config.run.len());
        assert_eq!([50, 50, 0, 0], config.run[0].proportions());
        assert_eq!(
            Some(RequestDistributionConfig::Zipfian {
                theta: DEFAULT_ZIPFIAN_THETA
            }),
            config.run[0].read.as_ref().map(|r| r.distribution.clone())
        );
        config.validate().unwrap();
    }

    #[test]
    fn parse_load_only() {
        let config = WorkloadConfig::from_yaml(
            "load:\n  num_records: 3\n  distribution:\n    type: linspace\n    start_key: 10\n    step_size: 5\n",
        )
        .unwrap();
        assert_eq!(None, config.record_size_bytes);
        assert!(config.run.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn unknown_field() {
        let err = WorkloadConfig::from_yaml(
            "load:\n  num_records: 3\n  distribution:\n    type: custom\nbogus: 1\n",
        );
        assert!(matches!(err, Err(Error::Yaml(_))), "{:?}", err);
    }

    #[test]
    fn unknown_distribution() {
        let err = WorkloadConfig::from_yaml(
            "load:\n  num_records: 3\n  distribution:\n    type: gaussian\n",
        );
        assert!(matches!(err, Err(Error::Yaml(_))), "{:?}", err);
    }

    #[test]
    fn range_too_small() {
        let config = WorkloadConfig::from_yaml(
            "load:\n  num_records: 11\n  distribution:\n    type: uniform\n    range_min: 0\n    range_max: 9\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidWorkload(_))));
    }

    #[test]
    fn range_exactly_full() {
        let config = WorkloadConfig::from_yaml(
            "load:\n  num_records: 10\n  distribution:\n    type: uniform\n    range_min: 0\n    range_max: 9\n",
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn full_key_space() {
        let config = WorkloadConfig::from_yaml(&format!(
            "load:\n  num_records: 10\n  distribution:\n    type: uniform\n    range_min: 0\n    range_max: {}\n",
            u64::MAX
        ))
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn linspace_overflow() {
        let config = WorkloadConfig::from_yaml(&format!(
            "load:\n  num_records: 3\n  distribution:\n    type: linspace\n    start_key: {}\n    step_size: 1\n",
            u64::MAX - 1
        ))
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidWorkload(_))));
    }

    #[test]
    fn proportions_must_sum_to_100() {
        let config = WorkloadConfig::from_yaml(
            r#"
load:
  num_records: 10
  distribution:
    type: linspace
    start_key: 0
    step_size: 1
run:
- num_requests: 10
  read:
    proportion_pct: 60
    distribution:
      type: uniform
  scan:
    proportion_pct: 30
    max_length: 4
    distribution:
      type: uniform
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidWorkload(_))));
    }

    #[test]
    fn reads_need_a_load() {
        let config = WorkloadConfig::from_yaml(
            r#"
load:
  num_records: 0
  distribution:
    type: custom
run:
- num_requests: 10
  read:
    proportion_pct: 100
    distribution:
      type: uniform
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidWorkload(_))));
    }

    #[test]
    fn theta_out_of_range() {
        let config = WorkloadConfig::from_yaml(
            r#"
load:
  num_records: 10
  distribution:
    type: linspace
    start_key: 0
    step_size: 1
run:
- num_requests: 10
  update:
    proportion_pct: 100
    distribution:
      type: zipfian
      theta: 1.5
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidWorkload(_))));
    }

    #[test]
    fn proportions_that_wrap_around() {
        let config = WorkloadConfig::from_yaml(
            r#"
load:
  num_records: 10
  distribution:
    type: linspace
    start_key: 0
    step_size: 1
run:
- num_requests: 10
  read:
    proportion_pct: 4294967295
    distribution:
      type: uniform
  update:
    proportion_pct: 101
    distribution:
      type: uniform
"#,
        )
        .unwrap();
        assert_eq!([u32::MAX, 101, 0, 0], config.run[0].proportions());
        match config.validate() {
            Err(Error::InvalidWorkload(what)) => {
                assert!(what.contains("4294967396"), "{}", what)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
