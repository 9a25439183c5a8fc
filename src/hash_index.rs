//! Extendible hash index mapping column values to row ids.
//!
//! The directory holds `2^global_depth` slots addressed by the low
//! `global_depth` bits of a key's hash. Slots point into an arena of buckets,
//! so several slots share one bucket whenever that bucket's local depth is
//! below the global depth. All growth goes through `split_overflowing`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::storage::{Table, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Bob Jenkins' one-at-a-time hash.
pub fn one_at_a_time(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in bytes {
        hash = hash.wrapping_add(byte as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

/// Keys hash by their text rendering, so an integer key and its float
/// spelling land in the same bucket. `-0.0` renders as `0`.
pub fn key_hash(key: &Value) -> u32 {
    match key {
        Value::Float(v) if *v == 0.0 => one_at_a_time(b"0"),
        _ => one_at_a_time(key.to_string().as_bytes()),
    }
}

fn low_bits(hash: u32, depth: u32) -> usize {
    ((hash as u64) & ((1u64 << depth) - 1)) as usize
}

fn keys_equal(a: &Value, b: &Value) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

#[derive(Debug, Clone)]
struct Bucket {
    entries: Vec<(Value, usize)>,
    local_depth: u32,
}

impl Bucket {
    fn empty(local_depth: u32) -> Self {
        Self {
            entries: Vec::new(),
            local_depth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtendibleHashIndex {
    global_depth: u32,
    capacity: usize,
    max_depth: u32,
    directory: Vec<usize>,
    buckets: Vec<Bucket>,
    len: usize,
}

impl ExtendibleHashIndex {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            global_depth: 1,
            capacity: config.bucket_capacity,
            max_depth: config.max_global_depth,
            directory: vec![0, 1],
            buckets: vec![Bucket::empty(1), Bucket::empty(1)],
            len: 0,
        })
    }

    pub fn with_capacity(capacity: usize) -> EngineResult<Self> {
        Self::new(&EngineConfig::default().with_bucket_capacity(capacity))
    }

    /// Indexes the non-null values of `column` over the table's live rows.
    pub fn build(table: &Table, column: &str, config: &EngineConfig) -> EngineResult<Self> {
        let idx = table.column_index(column).ok_or_else(|| {
            EngineError::schema(format!(
                "column {} does not exist in table {}",
                column,
                table.name()
            ))
        })?;
        let mut index = Self::new(config)?;
        for (row_id, row) in table.live_rows() {
            if !row[idx].is_null() {
                index.insert(row[idx].clone(), row_id)?;
            }
        }
        debug!(
            table = table.name(),
            column,
            entries = index.len,
            global_depth = index.global_depth,
            "built hash index"
        );
        Ok(index)
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_for(&self, hash: u32) -> usize {
        self.directory[low_bits(hash, self.global_depth)]
    }

    /// Adds `(key, row_id)`. If the entry cannot be placed without some
    /// bucket exceeding capacity even at the maximum depth, nothing changes
    /// and an `Index` error is returned.
    pub fn insert(&mut self, key: Value, row_id: usize) -> EngineResult<()> {
        if key.is_null() {
            return Err(EngineError::index("cannot index a NULL key"));
        }
        let hash = key_hash(&key);
        let bucket = self.bucket_for(hash);
        if self.buckets[bucket].entries.len() >= self.capacity {
            self.ensure_splittable(bucket, hash)?;
        }
        self.buckets[bucket].entries.push((key, row_id));
        self.len += 1;
        if self.buckets[bucket].entries.len() > self.capacity {
            self.split_overflowing(bucket);
        }
        Ok(())
    }

    // Entries agreeing on every addressable bit can never be separated.
    fn ensure_splittable(&self, bucket: usize, hash: u32) -> EngineResult<()> {
        let mut groups: HashMap<usize, usize> = HashMap::new();
        let hashes = self.buckets[bucket]
            .entries
            .iter()
            .map(|(key, _)| key_hash(key))
            .chain(std::iter::once(hash));
        for h in hashes {
            let count = groups.entry(low_bits(h, self.max_depth)).or_insert(0);
            *count += 1;
            if *count > self.capacity {
                return Err(EngineError::index(format!(
                    "more than {} entries share the same {} hash bits; bucket cannot split",
                    self.capacity, self.max_depth
                )));
            }
        }
        Ok(())
    }

    fn split_overflowing(&mut self, bucket: usize) {
        let mut pending = vec![bucket];
        while let Some(bucket) = pending.pop() {
            if self.buckets[bucket].entries.len() <= self.capacity {
                continue;
            }
            let local_depth = self.buckets[bucket].local_depth;
            if local_depth == self.global_depth {
                self.double_directory();
            }

            let split_bit = 1usize << local_depth;
            let image = self.buckets.len();
            let entries = std::mem::take(&mut self.buckets[bucket].entries);
            self.buckets[bucket].local_depth = local_depth + 1;
            self.buckets.push(Bucket::empty(local_depth + 1));
            for (slot, target) in self.directory.iter_mut().enumerate() {
                if *target == bucket && slot & split_bit != 0 {
                    *target = image;
                }
            }
            for (key, row_id) in entries {
                let target = if low_bits(key_hash(&key), self.global_depth) & split_bit != 0 {
                    image
                } else {
                    bucket
                };
                self.buckets[target].entries.push((key, row_id));
            }
            debug!(
                bucket,
                image,
                local_depth = local_depth + 1,
                global_depth = self.global_depth,
                "split hash bucket"
            );
            pending.push(bucket);
            pending.push(image);
        }
    }

    // Slot `d` gains the twin `d + 2^old_depth`, i.e. the bit string `1·d`.
    fn double_directory(&mut self) {
        self.directory.extend_from_within(..);
        self.global_depth += 1;
        debug!(global_depth = self.global_depth, "doubled hash directory");
    }

    /// First row id stored under `key`.
    pub fn find(&self, key: &Value) -> Option<usize> {
        if key.is_null() {
            return None;
        }
        self.buckets[self.bucket_for(key_hash(key))]
            .entries
            .iter()
            .find(|(k, _)| keys_equal(k, key))
            .map(|(_, row_id)| *row_id)
    }

    /// Every row id stored under `key`, in insertion order.
    pub fn find_all(&self, key: &Value) -> Vec<usize> {
        if key.is_null() {
            return Vec::new();
        }
        self.buckets[self.bucket_for(key_hash(key))]
            .entries
            .iter()
            .filter(|(k, _)| keys_equal(k, key))
            .map(|(_, row_id)| *row_id)
            .collect()
    }

    /// Removes one `(key, row_id)` pair. Buckets are never merged.
    pub fn delete(&mut self, key: &Value, row_id: usize) -> bool {
        if key.is_null() {
            return false;
        }
        let bucket = self.bucket_for(key_hash(key));
        let entries = &mut self.buckets[bucket].entries;
        match entries
            .iter()
            .position(|(k, id)| *id == row_id && keys_equal(k, key))
        {
            Some(pos) => {
                entries.remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Checks the directory invariants: every bucket is referenced by exactly
    /// `2^(global_depth - local_depth)` slots, holds at most `capacity`
    /// entries, and only holds keys whose low `local_depth` bits match its slots.
    pub fn verify(&self) -> EngineResult<()> {
        if self.directory.len() != 1usize << self.global_depth {
            return Err(EngineError::index(format!(
                "directory has {} slots at global depth {}",
                self.directory.len(),
                self.global_depth
            )));
        }
        let mut references = vec![0usize; self.buckets.len()];
        for (slot, &bucket) in self.directory.iter().enumerate() {
            references[bucket] += 1;
            let local_depth = self.buckets[bucket].local_depth;
            for (key, _) in &self.buckets[bucket].entries {
                if low_bits(key_hash(key), local_depth) != low_bits(slot as u32, local_depth) {
                    return Err(EngineError::index(format!(
                        "key {} stored in bucket {} does not hash to slot {}",
                        key, bucket, slot
                    )));
                }
            }
        }
        for (idx, bucket) in self.buckets.iter().enumerate() {
            if bucket.local_depth > self.global_depth {
                return Err(EngineError::index(format!(
                    "bucket {} local depth {} exceeds global depth {}",
                    idx, bucket.local_depth, self.global_depth
                )));
            }
            let expected = 1usize << (self.global_depth - bucket.local_depth);
            if references[idx] != expected {
                return Err(EngineError::index(format!(
                    "bucket {} referenced by {} slots, expected {}",
                    idx, references[idx], expected
                )));
            }
            if bucket.entries.len() > self.capacity {
                return Err(EngineError::index(format!(
                    "bucket {} holds {} entries, capacity {}",
                    idx,
                    bucket.entries.len(),
                    self.capacity
                )));
            }
        }
        Ok(())
    }
}
