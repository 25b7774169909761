//! Key-value store holding IBC state.
//!
//! The store supports nested child transactions.  While a checkpoint is
//! active, every mutation records the previous value of the key in an undo
//! journal.  Rolling back a checkpoint replays the journal backwards up to the
//! point the checkpoint was taken; committing simply forgets the checkpoint
//! (the journal entries are kept for any enclosing checkpoint).

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use ibc_ids::Path;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct Store {
    entries: BTreeMap<String, Vec<u8>>,
    journal: Vec<(String, Option<Vec<u8>>)>,
    depth: usize,
}

/// Token of an open child transaction.
///
/// Must be passed to [`Store::commit`] or [`Store::rollback`].  Checkpoints
/// must be resolved in reverse order of creation.
#[must_use]
#[derive(Debug)]
pub struct Checkpoint {
    depth: usize,
    journal_len: usize,
}

impl Store {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool { self.entries.contains_key(key) }

    pub fn set(&mut self, key: String, value: Vec<u8>) {
        log::debug!("store: set {key}");
        let old = self.entries.insert(key.clone(), value);
        self.record(key, old);
    }

    /// Deletes the key.  Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                log::debug!("store: delete {key}");
                self.record(key.into(), Some(old));
                true
            }
            None => false,
        }
    }

    fn record(&mut self, key: String, old: Option<Vec<u8>>) {
        if self.depth > 0 {
            self.journal.push((key, old));
        }
    }

    /// Iterates over all entries whose key starts with given prefix.
    pub fn prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.entries
            .range::<str, _>((
                core::ops::Bound::Included(prefix),
                core::ops::Bound::Unbounded,
            ))
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_str(), value.as_slice()))
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries.iter().map(|(key, value)| (key.as_str(), value.as_slice()))
    }

    // ==== Typed access =======================================================

    pub fn get_raw(&self, path: &Path) -> Option<&[u8]> {
        self.get(&path.to_key())
    }

    pub fn set_raw(&mut self, path: &Path, value: Vec<u8>) {
        self.set(path.to_key(), value)
    }

    pub fn delete_path(&mut self, path: &Path) -> bool {
        self.delete(&path.to_key())
    }

    pub fn has(&self, path: &Path) -> bool { self.contains(&path.to_key()) }

    /// Reads and decodes a borsh-encoded value.
    pub fn get_borsh<T: BorshDeserialize>(
        &self,
        path: &Path,
    ) -> Result<Option<T>> {
        let key = path.to_key();
        self.get(&key)
            .map(|bytes| {
                T::try_from_slice(bytes).map_err(|_| Error::Decode { key })
            })
            .transpose()
    }

    pub fn set_borsh<T: BorshSerialize>(
        &mut self,
        path: &Path,
        value: &T,
    ) -> Result {
        let bytes = value
            .try_to_vec()
            .map_err(|_| Error::Internal("borsh serialisation failed"))?;
        self.set_raw(path, bytes);
        Ok(())
    }

    /// Reads a big-endian `u64` sequence number.
    pub fn get_sequence(&self, path: &Path) -> Result<Option<u64>> {
        self.get_raw(path)
            .map(|bytes| {
                <[u8; 8]>::try_from(bytes)
                    .map(u64::from_be_bytes)
                    .map_err(|_| Error::Decode { key: path.to_key() })
            })
            .transpose()
    }

    /// Reads a sequence number which must exist.
    pub fn sequence(&self, path: &Path) -> Result<u64> {
        self.get_sequence(path)?
            .ok_or_else(|| Error::MissingSequence(path.to_key()))
    }

    pub fn set_sequence(&mut self, path: &Path, sequence: u64) {
        self.set_raw(path, sequence.to_be_bytes().to_vec())
    }

    // ==== Transactions =======================================================

    /// Opens a child transaction.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint { depth: self.depth, journal_len: self.journal.len() }
    }

    /// Keeps all changes made since the checkpoint.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        self.depth = checkpoint.depth - 1;
        if self.depth == 0 {
            self.journal.clear();
        }
    }

    /// Discards all changes made since the checkpoint.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.journal_len {
            let Some((key, old)) = self.journal.pop() else { break };
            match old {
                Some(value) => self.entries.insert(key, value),
                None => self.entries.remove(&key),
            };
        }
        self.depth = checkpoint.depth - 1;
        if self.depth == 0 {
            self.journal.clear();
        }
    }

    /// Returns whether a child transaction is open.
    pub fn in_transaction(&self) -> bool { self.depth > 0 }
}
