// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::deadpool::LocatedAnnouncement;
use crate::primitives::Hash256;
use crate::vm::AnnounceView;
use bincode::error::EncodeError as BincodeEncodeErr;
use bincode::{Decode, Encode};
use log::{debug, warn};
use rocksdb::Error as RocksDBErr;
use rocksdb::{
    Direction, IteratorMode, MultiThreaded, Options, TransactionDB, TransactionDBOptions,
    WriteBatchWithTransaction,
};
use std::path::Path;
use triomphe::Arc;

pub type DB = TransactionDB<MultiThreaded>;
pub type WriteBatch = WriteBatchWithTransaction<true>;

const DB_DEADPOOL_ANN: u8 = b'a';

/// Value stored per announcement: inclusion height and the committed
/// claim hash.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ClaimValue {
    pub height: i64,
    pub claim_hash: Hash256,
}

#[derive(Debug)]
pub enum AnnounceDbErr {
    /// Rocksdb error
    RocksDB(RocksDBErr),

    /// Bincode encode error
    BincodeEncode(BincodeEncodeErr),
}

impl From<RocksDBErr> for AnnounceDbErr {
    fn from(other: RocksDBErr) -> Self {
        Self::RocksDB(other)
    }
}

impl From<BincodeEncodeErr> for AnnounceDbErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::BincodeEncode(other)
    }
}

/// Consensus-critical store of committed announcements.
///
/// Keyed by deadpool id and creating outpoint, written strictly in
/// block connect order on the validation sequence and consulted by the
/// announcement check during script execution. Unlike the deadpool
/// index this database cannot be rebuilt from the chain without a full
/// rescan.
pub struct AnnounceDb {
    db: Arc<DB>,
}

impl AnnounceDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AnnounceDbErr> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_keep_log_file_num(1);

        let db = DB::open(&opts, &TransactionDBOptions::default(), path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn make_key(deadpool_id: &Hash256, locator: &crate::primitives::OutPoint) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 32 + 36);
        key.push(DB_DEADPOOL_ANN);
        key.extend_from_slice(&deadpool_id.0);
        key.extend_from_slice(&locator.to_key_bytes());
        key
    }

    /// Records the given announcements, one batch.
    pub fn add_announcements(&self, list: &[LocatedAnnouncement]) -> Result<(), AnnounceDbErr> {
        let mut batch = WriteBatch::default();

        for located in list {
            let entry = located.announcement.n_hash();
            debug!(
                "announcedb: added announcement ({}:{}) at height {} for entry {}",
                located.locator.txid.to_hex(),
                located.locator.n,
                located.announcement.height,
                entry.to_hex()
            );
            let value = ClaimValue {
                height: located.announcement.height,
                claim_hash: located.announcement.claim_hash(),
            };
            batch.put(
                Self::make_key(&entry, &located.locator),
                crate::codec::encode_to_vec(&value)?,
            );
        }

        self.db.write(batch)?;
        debug!("announcedb: committed {} announcements", list.len());
        Ok(())
    }

    /// Removes the given announcements, the disconnect inverse of
    /// [`AnnounceDb::add_announcements`].
    pub fn remove_announcements(&self, list: &[LocatedAnnouncement]) -> Result<(), AnnounceDbErr> {
        let mut batch = WriteBatch::default();

        for located in list {
            let entry = located.announcement.n_hash();
            debug!(
                "announcedb: removed announcement ({}:{}) for entry {}",
                located.locator.txid.to_hex(),
                located.locator.n,
                entry.to_hex()
            );
            batch.delete(Self::make_key(&entry, &located.locator));
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Whether a committed announcement for `deadpool_id` with the
    /// given claim hash exists in the height window.
    #[must_use]
    pub fn claim_exists(
        &self,
        deadpool_id: &Hash256,
        claim: &Hash256,
        min_height: i64,
        max_height: i64,
    ) -> bool {
        let mut prefix = Vec::with_capacity(1 + 32);
        prefix.push(DB_DEADPOOL_ANN);
        prefix.extend_from_slice(&deadpool_id.0);

        let iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(err) => {
                    warn!("announcedb: iterator error: {err}");
                    return false;
                }
            };

            if !key.starts_with(&prefix) {
                break;
            }

            let value: ClaimValue = match crate::codec::decode(&value) {
                Ok(v) => v,
                Err(_) => {
                    warn!("announcedb: undecodable record, skipping");
                    continue;
                }
            };

            if value.height <= max_height && value.height >= min_height && value.claim_hash == *claim
            {
                debug!(
                    "announcedb: found claim {} for entry {}",
                    claim.to_hex(),
                    deadpool_id.to_hex()
                );
                return true;
            }
        }

        false
    }

    /// Number of stored records, linear scan. Test and diagnostics
    /// helper.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.db
            .iterator(IteratorMode::Start)
            .filter_map(Result::ok)
            .filter(|(key, _)| key.first() == Some(&DB_DEADPOOL_ANN))
            .count()
    }
}

impl AnnounceView for AnnounceDb {
    fn claim_exists(
        &self,
        deadpool_id: &Hash256,
        claim_hash: &Hash256,
        min_height: i64,
        max_height: i64,
    ) -> bool {
        AnnounceDb::claim_exists(self, deadpool_id, claim_hash, min_height, max_height)
    }
}
