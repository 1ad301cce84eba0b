//! Key generation and key selection.
//!
//! Generators produce keys that do not exist yet (load and insert).  Choosers pick an index into
//! the population of keys that do exist (read, update, scan).

use std::collections::HashSet;

use guacamole::{FromGuacamole, Guacamole, Zipf};

use super::config::{KeyDistributionConfig, RequestDistributionConfig};
use super::{Error, Key};

/// The largest prime below 2^64.  Multiplying by it permutes any smaller modulus.
const SCRAMBLE_PRIME: u128 = 18_446_744_073_709_551_557;

/// How many times a uniform insert generator redraws before giving up on a crowded range.
const MAX_INSERT_ATTEMPTS: usize = 1 << 16;

////////////////////////////////////////////// helpers /////////////////////////////////////////////

/// Draw uniformly from `[0, bound]`.
pub fn uniform_at_most(guac: &mut Guacamole, bound: u64) -> u64 {
    let x = u64::from_guacamole(&mut (), guac);
    if bound == u64::MAX {
        x
    } else {
        x % (bound + 1)
    }
}

/// Shuffle `items` in place (Fisher-Yates).
pub fn shuffle<T>(guac: &mut Guacamole, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = uniform_at_most(guac, i as u64) as usize;
        items.swap(i, j);
    }
}

/// Choose `count` distinct offsets from `[0, max_offset]` using Floyd's algorithm.  The caller
/// guarantees the range holds at least `count` values.
fn sample_distinct(guac: &mut Guacamole, max_offset: u64, count: u64) -> Vec<u64> {
    let mut chosen = HashSet::with_capacity(count as usize);
    let mut offsets = Vec::with_capacity(count as usize);
    if count == 0 {
        return offsets;
    }
    let lower = max_offset - (count - 1);
    for i in 0..count {
        let j = lower + i;
        let t = uniform_at_most(guac, j);
        let pick = if chosen.contains(&t) { j } else { t };
        chosen.insert(pick);
        offsets.push(pick);
    }
    offsets
}

//////////////////////////////////////////// load_keys /////////////////////////////////////////////

/// Generate the keys of a load phase.  `custom` supplies the keys of a custom distribution.
pub fn load_keys(
    distribution: &KeyDistributionConfig,
    num_records: u64,
    custom: Option<&[Key]>,
    guac: &mut Guacamole,
) -> Result<Vec<Key>, Error> {
    match distribution {
        KeyDistributionConfig::Uniform {
            range_min,
            range_max,
        } => {
            let mut keys: Vec<Key> = sample_distinct(guac, range_max - range_min, num_records)
                .into_iter()
                .map(|offset| range_min + offset)
                .collect();
            shuffle(guac, &mut keys);
            Ok(keys)
        }
        KeyDistributionConfig::Linspace {
            start_key,
            step_size,
        } => Ok((0..num_records)
            .map(|i| start_key + i * step_size)
            .collect()),
        KeyDistributionConfig::Custom => match custom {
            Some(keys) => Ok(keys.to_vec()),
            None => Err(Error::InvalidWorkload(
                "custom load distribution without a custom dataset".to_string(),
            )),
        },
    }
}

/////////////////////////////////////////// InsertKeys /////////////////////////////////////////////

/// Generates keys for inserts, skipping any key that already exists.
#[derive(Clone, Debug)]
pub struct InsertKeys {
    distribution: KeyDistributionConfig,
    next_index: u64,
}

impl InsertKeys {
    pub fn new(distribution: KeyDistributionConfig) -> Self {
        Self {
            distribution,
            next_index: 0,
        }
    }

    /// The next key to insert.  It will not be in `existing`.
    pub fn next(&mut self, guac: &mut Guacamole, existing: &HashSet<Key>) -> Result<Key, Error> {
        match &self.distribution {
            KeyDistributionConfig::Uniform {
                range_min,
                range_max,
            } => {
                for _ in 0..MAX_INSERT_ATTEMPTS {
                    let key = range_min + uniform_at_most(guac, range_max - range_min);
                    if !existing.contains(&key) {
                        return Ok(key);
                    }
                }
                Err(Error::InvalidWorkload(format!(
                    "insert range [{}, {}] is exhausted",
                    range_min, range_max
                )))
            }
            KeyDistributionConfig::Linspace {
                start_key,
                step_size,
            } => loop {
                let key = self
                    .next_index
                    .checked_mul(*step_size)
                    .and_then(|offset| offset.checked_add(*start_key))
                    .ok_or_else(|| {
                        Error::InvalidWorkload(format!(
                            "insert linspace from {} by {} overflowed",
                            start_key, step_size
                        ))
                    })?;
                self.next_index += 1;
                if !existing.contains(&key) {
                    return Ok(key);
                }
                if *step_size == 0 {
                    return Err(Error::InvalidWorkload(format!(
                        "insert linspace stuck on existing key {}",
                        key
                    )));
                }
            },
            KeyDistributionConfig::Custom => Err(Error::InvalidWorkload(
                "inserts cannot use a custom distribution".to_string(),
            )),
        }
    }
}

//////////////////////////////////////////// KeyChooser ////////////////////////////////////////////

/// Picks indices into a population of `n` existing keys.
#[derive(Clone, Debug)]
pub enum KeyChooser {
    Uniform { n: u64 },
    Zipfian { n: u64, zipf: Zipf },
}

impl KeyChooser {
    /// Create a chooser over `n > 0` keys.
    pub fn new(distribution: &RequestDistributionConfig, n: u64) -> Self {
        match distribution {
            RequestDistributionConfig::Uniform => KeyChooser::Uniform { n },
            RequestDistributionConfig::Zipfian { theta } => KeyChooser::Zipfian {
                n,
                zipf: Zipf::from_theta(n, *theta),
            },
        }
    }

    /// An index in `[0, n)`.
    pub fn choose(&self, guac: &mut Guacamole) -> usize {
        match self {
            KeyChooser::Uniform { n } => uniform_at_most(guac, n - 1) as usize,
            KeyChooser::Zipfian { n, zipf } => {
                // Zipf ranks start at one; rank zero is the hottest key.
                let rank = zipf.next(guac).saturating_sub(1).min(n - 1);
                ((rank as u128 * SCRAMBLE_PRIME) % *n as u128) as usize
            }
        }
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
