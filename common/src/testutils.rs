use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};

use sha2::Digest;

use crate::error::Error;
use crate::locator::Locator;
use crate::provider::{Provider, Source, SourceHandle, TargetHandle};

#[derive(Default)]
struct Store {
    buckets: HashSet<String>,
    objects: HashMap<Locator, Vec<u8>>,
    hashes: HashMap<Locator, String>,
    declared_lengths: HashMap<Locator, u64>,
    unreachable: HashSet<Locator>,
    failing_writes: HashMap<Locator, u64>,
    failing_closes: HashSet<Locator>,
    primed: HashMap<Locator, (String, u64)>,
    closes: HashMap<Locator, usize>,
    written: HashMap<Locator, u64>,
    discarded: HashSet<Locator>,
}

/// In-memory provider with fault injection.
///
/// Clones share the same store, so a test keeps one clone for inspection after handing another
/// to the code under test.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    store: Arc<Mutex<Store>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&self, bucket: &str) {
        self.store.lock().unwrap().buckets.insert(bucket.to_string());
    }

    /// Stores an object, creating its bucket; the hash is the hex SHA-256 of `data`.
    pub fn put_object(&self, locator: &Locator, data: &[u8]) {
        let mut store = self.store.lock().unwrap();
        store.buckets.insert(locator.bucket().to_string());
        store.objects.insert(locator.clone(), data.to_vec());
        store
            .hashes
            .insert(locator.clone(), hex::encode(sha2::Sha256::digest(data)));
    }

    pub fn set_hash(&self, locator: &Locator, hash: &str) {
        let mut store = self.store.lock().unwrap();
        store.hashes.insert(locator.clone(), hash.to_string());
    }

    /// Makes the source declare `length` bytes regardless of how many it holds.
    pub fn declare_length(&self, locator: &Locator, length: u64) {
        let mut store = self.store.lock().unwrap();
        store.declared_lengths.insert(locator.clone(), length);
    }

    pub fn make_unreachable(&self, locator: &Locator) {
        let mut store = self.store.lock().unwrap();
        store.unreachable.insert(locator.clone());
    }

    /// Writes to `locator` fail once more than `bytes` bytes would have been accepted.
    pub fn fail_writes_after(&self, locator: &Locator, bytes: u64) {
        let mut store = self.store.lock().unwrap();
        store.failing_writes.insert(locator.clone(), bytes);
    }

    pub fn fail_close(&self, locator: &Locator) {
        let mut store = self.store.lock().unwrap();
        store.failing_closes.insert(locator.clone());
    }

    pub fn object(&self, locator: &Locator) -> Option<Vec<u8>> {
        self.store.lock().unwrap().objects.get(locator).cloned()
    }

    /// Hash and length a target was opened with, `None` if it was never acquired.
    pub fn primed_with(&self, locator: &Locator) -> Option<(String, u64)> {
        self.store.lock().unwrap().primed.get(locator).cloned()
    }

    pub fn close_count(&self, locator: &Locator) -> usize {
        self.store
            .lock()
            .unwrap()
            .closes
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the target handle of `locator` was aborted instead of closed.
    pub fn was_discarded(&self, locator: &Locator) -> bool {
        self.store.lock().unwrap().discarded.contains(locator)
    }

    /// Bytes accepted by the target handle of `locator` before it was closed.
    pub fn bytes_written(&self, locator: &Locator) -> u64 {
        self.store
            .lock()
            .unwrap()
            .written
            .get(locator)
            .copied()
            .unwrap_or(0)
    }

    fn check(&self, locator: &Locator) -> Result<(), Error> {
        let store = self.store.lock().unwrap();
        if store.unreachable.contains(locator) {
            return Err(Error::Resolution {
                locator: locator.clone(),
                source: anyhow::anyhow!("endpoint unreachable"),
            });
        }
        if !store.buckets.contains(locator.bucket()) {
            return Err(Error::Validation {
                locator: locator.clone(),
                source: anyhow::anyhow!("bucket '{}' does not exist", locator.bucket()),
            });
        }
        Ok(())
    }
}

impl Provider for MemoryProvider {
    fn acquire_source(&self, locator: &Locator) -> Result<Source, Error> {
        self.check(locator)?;
        let store = self.store.lock().unwrap();
        let data = store
            .objects
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::SourceRead {
                locator: locator.clone(),
                source: anyhow::anyhow!("object does not exist"),
            })?;
        let length = store
            .declared_lengths
            .get(locator)
            .copied()
            .unwrap_or(data.len() as u64);
        let hash = store.hashes.get(locator).cloned().unwrap_or_default();
        Ok(Source {
            handle: Box::new(MemorySource {
                locator: locator.clone(),
                data: std::io::Cursor::new(data),
                store: self.store.clone(),
            }),
            length,
            hash,
        })
    }

    fn acquire_target(
        &self,
        locator: &Locator,
        hash: &str,
        length: u64,
    ) -> Result<Box<dyn TargetHandle>, Error> {
        self.check(locator)?;
        let mut store = self.store.lock().unwrap();
        store
            .primed
            .insert(locator.clone(), (hash.to_string(), length));
        let fail_after = store.failing_writes.get(locator).copied();
        Ok(Box::new(MemoryTarget {
            locator: locator.clone(),
            buffer: Vec::new(),
            fail_after,
            store: self.store.clone(),
        }))
    }
}

struct MemorySource {
    locator: Locator,
    data: std::io::Cursor<Vec<u8>>,
    store: Arc<Mutex<Store>>,
}

impl Read for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl SourceHandle for MemorySource {
    fn close(self: Box<Self>) -> anyhow::Result<()> {
        let mut store = self.store.lock().unwrap();
        *store.closes.entry(self.locator.clone()).or_default() += 1;
        if store.failing_closes.contains(&self.locator) {
            return Err(anyhow::anyhow!("injected close failure"));
        }
        Ok(())
    }
}

struct MemoryTarget {
    locator: Locator,
    buffer: Vec<u8>,
    fail_after: Option<u64>,
    store: Arc<Mutex<Store>>,
}

impl std::io::Write for MemoryTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let accepted = self.buffer.len() as u64 + buf.len() as u64;
        if self.fail_after.is_some_and(|limit| accepted > limit) {
            return Err(std::io::Error::other("injected write failure"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl MemoryTarget {
    fn release(self, commit: bool) -> anyhow::Result<()> {
        let MemoryTarget {
            locator,
            buffer,
            store,
            ..
        } = self;
        let mut store = store.lock().unwrap();
        *store.closes.entry(locator.clone()).or_default() += 1;
        store.written.insert(locator.clone(), buffer.len() as u64);
        if !commit {
            store.discarded.insert(locator.clone());
        }
        if store.failing_closes.contains(&locator) {
            return Err(anyhow::anyhow!("injected close failure"));
        }
        if commit {
            store.objects.insert(locator, buffer);
        }
        Ok(())
    }
}

impl TargetHandle for MemoryTarget {
    fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.release(true)
    }

    fn abort(self: Box<Self>) -> anyhow::Result<()> {
        self.release(false)
    }
}
