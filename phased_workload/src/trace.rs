use std::sync::Arc;

use guacamole::Guacamole;

use super::Key;

/// Values are windows into a shared pool of random bytes.  The pool carries this much slack past
/// one value so that neighboring records see different bytes.
const VALUE_POOL_SLACK: usize = 251;

///////////////////////////////////////////// ValuePool ////////////////////////////////////////////

#[derive(Clone, Debug)]
pub(crate) struct ValuePool {
    value_size: usize,
    bytes: Arc<[u8]>,
}

impl ValuePool {
    pub(crate) fn new(value_size: usize, guac: &mut Guacamole) -> Self {
        let mut bytes = vec![0u8; value_size + VALUE_POOL_SLACK];
        guac.generate(&mut bytes);
        Self {
            value_size,
            bytes: bytes.into(),
        }
    }

    fn value(&self, index: usize) -> &[u8] {
        let offset = index % VALUE_POOL_SLACK;
        &self.bytes[offset..offset + self.value_size]
    }
}

/////////////////////////////////////////// BulkLoadTrace //////////////////////////////////////////

/// The records of a load phase, in the order they are to be loaded.  Cloning is cheap.
#[derive(Clone, Debug)]
pub struct BulkLoadTrace {
    keys: Arc<[Key]>,
    values: ValuePool,
}

impl BulkLoadTrace {
    pub(crate) fn new(keys: Vec<Key>, values: ValuePool) -> Self {
        Self {
            keys: keys.into(),
            values,
        }
    }

    /// A load trace over exactly `keys` with values of `value_size` bytes.
    pub fn from_keys(keys: Vec<Key>, value_size: usize) -> Self {
        let mut guac = Guacamole::new(crate::DEFAULT_PRNG_SEED);
        Self::new(keys, ValuePool::new(value_size, &mut guac))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key of the `index`'th record.  Panics if `index >= self.len()`.
    pub fn key_at(&self, index: usize) -> Key {
        self.keys[index]
    }

    /// The value of the `index`'th record.  Panics if `index >= self.len()`.
    pub fn value_at(&self, index: usize) -> &[u8] {
        assert!(index < self.keys.len());
        self.values.value(index)
    }

    pub fn value_size(&self) -> usize {
        self.values.value_size
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &[u8])> + '_ {
        self.keys
            .iter()
            .enumerate()
            .map(|(index, key)| (*key, self.values.value(index)))
    }
}

///////////////////////////////////////////// Operation ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Insert,
    Read,
    Update,
    Scan,
}

////////////////////////////////////////////// Request /////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request {
    pub op: Operation,
    pub key: Key,
    /// Number of keys to scan.  Zero for everything but scans.
    pub scan_amount: usize,
}

/////////////////////////////////////////////// Trace //////////////////////////////////////////////

/// A sequence of requests for one worker of one run phase.
#[derive(Clone, Debug)]
pub struct Trace {
    requests: Vec<Request>,
    values: ValuePool,
}

impl Trace {
    pub(crate) fn new(requests: Vec<Request>, values: ValuePool) -> Self {
        Self { requests, values }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Each request paired with the value an insert or update should write.
    pub fn iter(&self) -> impl Iterator<Item = (&Request, &[u8])> + '_ {
        self.requests
            .iter()
            .enumerate()
            .map(|(index, request)| (request, self.values.value(index)))
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
