// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::deadpool::{
    extract_announcements, get_entry_n_hash, get_solution_from_script_sig, is_deadpool_entry,
};
use crate::primitives::{Block, Hash256, OutPoint, TxOut};
use bincode::error::{DecodeError as BincodeDecodeErr, EncodeError as BincodeEncodeErr};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use rocksdb::Error as RocksDBErr;
use rocksdb::{
    Direction, IteratorMode, MultiThreaded, Options, TransactionDB, TransactionDBOptions,
    WriteBatchWithTransaction,
};
use std::path::Path;
use std::thread::{self, JoinHandle};
use triomphe::Arc;

pub type DB = TransactionDB<MultiThreaded>;
pub type WriteBatch = WriteBatchWithTransaction<true>;

const DB_DEADPOOL_ENTRY: u8 = b'd';
const DB_DEADPOOL_ANNOUNCE: u8 = b'a';
const DB_DEADPOOL_CLAIMS: u8 = b'c';
const DB_BEST_BLOCK: u8 = b'B';

/// Entry or announcement returned from an index lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadpoolIndexEntry {
    pub deadpool_id: Hash256,
    pub locator: OutPoint,
    pub height: i64,
    pub tx_out: TxOut,
}

/// Claim record returned from an index lookup. A claim height of zero
/// means the entry is unclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadpoolIndexClaim {
    pub entry_locator: OutPoint,
    pub deadpool_id: Hash256,
    pub claim_height: i64,
    pub claim_block_hash: Hash256,
    pub claim_tx_hash: Hash256,
    pub solution: Vec<u8>,
}

#[derive(Debug)]
pub enum IndexErr {
    /// Rocksdb error
    RocksDB(RocksDBErr),

    /// Bincode encode error
    BincodeEncode(BincodeEncodeErr),

    /// Bincode decode error
    BincodeDecode(BincodeDecodeErr),

    /// The index best block diverged from the chain and the index
    /// needs a rebuild
    Inconsistent,
}

impl From<RocksDBErr> for IndexErr {
    fn from(other: RocksDBErr) -> Self {
        Self::RocksDB(other)
    }
}

impl From<BincodeEncodeErr> for IndexErr {
    fn from(other: BincodeEncodeErr) -> Self {
        Self::BincodeEncode(other)
    }
}

impl From<BincodeDecodeErr> for IndexErr {
    fn from(other: BincodeDecodeErr) -> Self {
        Self::BincodeDecode(other)
    }
}

/// Blocks the index can replay during catch-up
pub trait BlockSource {
    fn tip_height(&self) -> i64;
    fn block_at(&self, height: i64) -> Option<Block>;
}

/// Index over deadpool entries, announcements and claims.
///
/// Not consensus critical; answers the RPC surface and can always be
/// rebuilt from blocks. Every key derives from the creating outpoint,
/// so replaying a block after a crash only repeats upserts.
pub struct DeadpoolIndex {
    db: Arc<DB>,
}

impl DeadpoolIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexErr> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_keep_log_file_num(1);

        let db = DB::open(&opts, &TransactionDBOptions::default(), path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn id_key(tag: u8, deadpool_id: &Hash256, locator: &OutPoint) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 32 + 36);
        key.push(tag);
        key.extend_from_slice(&deadpool_id.0);
        key.extend_from_slice(&locator.to_key_bytes());
        key
    }

    fn claim_key(locator: &OutPoint, deadpool_id: &Hash256) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 36 + 32);
        key.push(DB_DEADPOOL_CLAIMS);
        key.extend_from_slice(&locator.to_key_bytes());
        key.extend_from_slice(&deadpool_id.0);
        key
    }

    /// Best block the index has processed
    pub fn best_block(&self) -> Result<Option<(Hash256, i64)>, IndexErr> {
        match self.db.get([DB_BEST_BLOCK])? {
            Some(bytes) => Ok(Some(crate::codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_entry_or_announce(
        batch: &mut WriteBatch,
        tag: u8,
        deadpool_id: &Hash256,
        locator: &OutPoint,
        height: i64,
        tx_out: &TxOut,
    ) -> Result<(), IndexErr> {
        // key = (tag, deadpoolId, outpoint), value = (height, txOut)
        batch.put(
            Self::id_key(tag, deadpool_id, locator),
            crate::codec::encode_to_vec(&(height, tx_out.clone()))?,
        );
        Ok(())
    }

    fn write_claim_record(
        batch: &mut WriteBatch,
        locator: &OutPoint,
        deadpool_id: &Hash256,
        claim_height: i64,
        claim_block_hash: &Hash256,
        claim_tx_hash: &Hash256,
        solution: &[u8],
    ) -> Result<(), IndexErr> {
        batch.put(
            Self::claim_key(locator, deadpool_id),
            crate::codec::encode_to_vec(&(
                claim_height,
                *claim_block_hash,
                *claim_tx_hash,
                solution.to_vec(),
            ))?,
        );
        Ok(())
    }

    fn read_entry_or_announce(&self, tag: u8, deadpool_id: &Hash256) -> Vec<DeadpoolIndexEntry> {
        let mut prefix = Vec::with_capacity(1 + 32);
        prefix.push(tag);
        prefix.extend_from_slice(&deadpool_id.0);

        let mut list = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let Ok((key, value)) = item else { break };
            if !key.starts_with(&prefix) {
                break;
            }

            let Ok(locator) = OutPoint::from_key_bytes(&key[33..]) else {
                warn!("deadpoolindex: malformed key, skipping");
                continue;
            };

            match crate::codec::decode::<(i64, TxOut)>(&value) {
                Ok((height, tx_out)) => list.push(DeadpoolIndexEntry {
                    deadpool_id: *deadpool_id,
                    locator,
                    height,
                    tx_out,
                }),
                Err(_) => warn!("deadpoolindex: undecodable record, skipping"),
            }
        }

        list
    }

    /// All indexed entries for a deadpool id
    #[must_use]
    pub fn find_entries(&self, deadpool_id: &Hash256) -> Vec<DeadpoolIndexEntry> {
        self.read_entry_or_announce(DB_DEADPOOL_ENTRY, deadpool_id)
    }

    /// All indexed announcements for a deadpool id
    #[must_use]
    pub fn find_announces(&self, deadpool_id: &Hash256) -> Vec<DeadpoolIndexEntry> {
        self.read_entry_or_announce(DB_DEADPOOL_ANNOUNCE, deadpool_id)
    }

    /// All entries created at or above the given height
    #[must_use]
    pub fn find_entries_since_height(&self, min_height: i64) -> Vec<DeadpoolIndexEntry> {
        let prefix = [DB_DEADPOOL_ENTRY];
        let mut list = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));

        for item in iter {
            let Ok((key, value)) = item else { break };
            if key.first() != Some(&DB_DEADPOOL_ENTRY) {
                break;
            }
            if key.len() != 1 + 32 + 36 {
                continue;
            }

            let mut id = [0u8; 32];
            id.copy_from_slice(&key[1..33]);
            let Ok(locator) = OutPoint::from_key_bytes(&key[33..]) else {
                continue;
            };

            match crate::codec::decode::<(i64, TxOut)>(&value) {
                Ok((height, tx_out)) => {
                    if height < min_height {
                        continue;
                    }
                    list.push(DeadpoolIndexEntry {
                        deadpool_id: Hash256(id),
                        locator,
                        height,
                        tx_out,
                    });
                }
                Err(_) => warn!("deadpoolindex: undecodable record, skipping"),
            }
        }

        list
    }

    /// The claim record of an entry outpoint
    #[must_use]
    pub fn find_claim(&self, outpoint: &OutPoint) -> Option<DeadpoolIndexClaim> {
        let mut prefix = Vec::with_capacity(1 + 36);
        prefix.push(DB_DEADPOOL_CLAIMS);
        prefix.extend_from_slice(&outpoint.to_key_bytes());

        let mut iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));

        let (key, value) = iter.next()?.ok()?;
        if !key.starts_with(&prefix) || key.len() != 1 + 36 + 32 {
            return None;
        }

        let mut id = [0u8; 32];
        id.copy_from_slice(&key[37..]);

        let (claim_height, claim_block_hash, claim_tx_hash, solution): (
            i64,
            Hash256,
            Hash256,
            Vec<u8>,
        ) = crate::codec::decode(&value).ok()?;

        Some(DeadpoolIndexClaim {
            entry_locator: *outpoint,
            deadpool_id: Hash256(id),
            claim_height,
            claim_block_hash,
            claim_tx_hash,
            solution,
        })
    }

    /// Whether the entry at `outpoint` is indexed and unclaimed,
    /// returning its deadpool id.
    #[must_use]
    pub fn is_unclaimed_entry(&self, outpoint: &OutPoint) -> Option<Hash256> {
        let record = self.find_claim(outpoint)?;
        if record.claim_height == 0 && !record.deadpool_id.is_zero() {
            return Some(record.deadpool_id);
        }
        None
    }

    /// Applies one connected block: indexes entries and announcements,
    /// seeds unclaimed records and upgrades the records of spent
    /// entries. Commits atomically together with the best block
    /// marker.
    pub fn connect_block(
        &self,
        block: &Block,
        height: i64,
        block_hash: &Hash256,
    ) -> Result<(), IndexErr> {
        let mut batch = WriteBatch::default();

        let mut n_anns = 0usize;
        let mut n_entries = 0usize;
        let mut n_claims = 0usize;

        // Entries seeded in this batch are not yet visible to reads,
        // track them so a claim in the same block still resolves.
        let mut pending_unclaimed: std::collections::HashMap<OutPoint, Hash256> =
            std::collections::HashMap::new();

        // Genesis outputs are not spendable, do not index them.
        if height > 0 {
            for tx in &block.txs {
                let txid = tx.txid();

                for located in extract_announcements(tx, height) {
                    let nhash = located.announcement.n_hash();
                    Self::write_entry_or_announce(
                        &mut batch,
                        DB_DEADPOOL_ANNOUNCE,
                        &nhash,
                        &located.locator,
                        height,
                        &located.announcement.out,
                    )?;
                    debug!(
                        "deadpoolindex: found announcement txid={} height={} nhash={}",
                        txid.to_hex(),
                        height,
                        nhash.to_hex()
                    );
                    n_anns += 1;
                }

                for (i, out) in tx.outputs.iter().enumerate() {
                    if !is_deadpool_entry(out) {
                        continue;
                    }

                    let nhash = get_entry_n_hash(out);
                    let locator = OutPoint::new(txid, i as u32);

                    Self::write_entry_or_announce(
                        &mut batch,
                        DB_DEADPOOL_ENTRY,
                        &nhash,
                        &locator,
                        height,
                        out,
                    )?;

                    // seed the claim record as unclaimed
                    Self::write_claim_record(
                        &mut batch,
                        &locator,
                        &nhash,
                        0,
                        &Hash256::zero(),
                        &Hash256::zero(),
                        &[],
                    )?;
                    pending_unclaimed.insert(locator, nhash);

                    debug!(
                        "deadpoolindex: found entry txid={} height={} nhash={}",
                        txid.to_hex(),
                        height,
                        nhash.to_hex()
                    );
                    n_entries += 1;
                }

                for input in &tx.inputs {
                    if input.prevout.txid.is_zero() {
                        continue;
                    }

                    let unclaimed = pending_unclaimed
                        .get(&input.prevout)
                        .copied()
                        .or_else(|| self.is_unclaimed_entry(&input.prevout));

                    if let Some(nhash) = unclaimed {
                        let solution = get_solution_from_script_sig(input);
                        Self::write_claim_record(
                            &mut batch,
                            &input.prevout,
                            &nhash,
                            height,
                            block_hash,
                            &txid,
                            &solution.serialize(),
                        )?;

                        debug!(
                            "deadpoolindex: found claim txid={} height={} nhash={}",
                            txid.to_hex(),
                            height,
                            nhash.to_hex()
                        );
                        n_claims += 1;
                    }
                }
            }
        }

        batch.put(
            [DB_BEST_BLOCK],
            crate::codec::encode_to_vec(&(*block_hash, height))?,
        );
        self.db.write(batch)?;

        debug!(
            "deadpoolindex: hash={} height={} anns={} entries={} claims={}",
            block_hash.to_hex(),
            height,
            n_anns,
            n_entries,
            n_claims
        );

        Ok(())
    }

    /// Inverts the writes of [`DeadpoolIndex::connect_block`] for a
    /// disconnected block.
    pub fn disconnect_block(&self, block: &Block, height: i64) -> Result<(), IndexErr> {
        let mut batch = WriteBatch::default();

        // Undo in reverse transaction order so claims revert to
        // unclaimed before the entries they spent are dropped.
        if height > 0 {
            for tx in block.txs.iter().rev() {
                let txid = tx.txid();

                for input in &tx.inputs {
                    if input.prevout.txid.is_zero() {
                        continue;
                    }

                    if let Some(record) = self.find_claim(&input.prevout) {
                        if record.claim_height == height {
                            Self::write_claim_record(
                                &mut batch,
                                &input.prevout,
                                &record.deadpool_id,
                                0,
                                &Hash256::zero(),
                                &Hash256::zero(),
                                &[],
                            )?;
                        }
                    }
                }

                for located in extract_announcements(tx, height) {
                    let nhash = located.announcement.n_hash();
                    batch.delete(Self::id_key(
                        DB_DEADPOOL_ANNOUNCE,
                        &nhash,
                        &located.locator,
                    ));
                }

                for (i, out) in tx.outputs.iter().enumerate() {
                    if !is_deadpool_entry(out) {
                        continue;
                    }

                    let nhash = get_entry_n_hash(out);
                    let locator = OutPoint::new(txid, i as u32);
                    batch.delete(Self::id_key(DB_DEADPOOL_ENTRY, &nhash, &locator));
                    batch.delete(Self::claim_key(&locator, &nhash));
                }
            }
        }

        batch.put(
            [DB_BEST_BLOCK],
            crate::codec::encode_to_vec(&(block.header.prev_hash, height - 1))?,
        );
        self.db.write(batch)?;

        debug!("deadpoolindex: disconnected height={height}");
        Ok(())
    }

    /// Replays blocks from the saved best block up to the source tip.
    /// Fails with [`IndexErr::Inconsistent`] when the saved best block
    /// is not on the source chain; the caller rebuilds in that case.
    pub fn sync<B: BlockSource>(&self, source: &B) -> Result<(), IndexErr> {
        let start_height = match self.best_block()? {
            Some((best_hash, best_height)) => {
                let on_chain = source
                    .block_at(best_height)
                    .map(|b| b.hash() == best_hash)
                    .unwrap_or(false);
                if !on_chain {
                    error!(
                        "deadpoolindex: best block {} at height {} not on the active chain",
                        best_hash.to_hex(),
                        best_height
                    );
                    return Err(IndexErr::Inconsistent);
                }
                best_height + 1
            }
            None => 0,
        };

        let tip = source.tip_height();
        if start_height > tip {
            return Ok(());
        }

        info!("deadpoolindex: syncing blocks {start_height}..={tip}");
        for height in start_height..=tip {
            let block = source.block_at(height).ok_or(IndexErr::Inconsistent)?;
            let hash = block.hash();
            self.connect_block(&block, height, &hash)?;
        }

        Ok(())
    }

    /// Full dump of the index key space, diagnostics and test helper.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.db
            .iterator(IteratorMode::Start)
            .filter_map(Result::ok)
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }
}

/// Events consumed by the index worker
pub enum IndexEvent {
    Connected {
        block: Arc<Block>,
        height: i64,
        hash: Hash256,
    },
    Disconnected {
        block: Arc<Block>,
        height: i64,
    },
    Shutdown,
}

/// Single worker draining block events into the index in order.
///
/// The worker always finishes the batch it is on; shutdown is only
/// honored between events so the database stays consistent.
pub struct IndexWorker {
    sender: Sender<IndexEvent>,
    handle: Option<JoinHandle<()>>,
}

impl IndexWorker {
    #[must_use]
    pub fn start(index: Arc<DeadpoolIndex>) -> Self {
        let (sender, receiver): (Sender<IndexEvent>, Receiver<IndexEvent>) = unbounded();

        let handle = thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    IndexEvent::Connected {
                        block,
                        height,
                        hash,
                    } => {
                        if let Err(err) = index.connect_block(&block, height, &hash) {
                            error!("deadpoolindex: connect failed at {height}: {err:?}");
                        }
                    }

                    IndexEvent::Disconnected { block, height } => {
                        if let Err(err) = index.disconnect_block(&block, height) {
                            error!("deadpoolindex: disconnect failed at {height}: {err:?}");
                        }
                    }

                    IndexEvent::Shutdown => break,
                }
            }
        });

        Self {
            sender,
            handle: Some(handle),
        }
    }

    pub fn notify(&self, event: IndexEvent) {
        // send fails only after shutdown
        let _ = self.sender.send(event);
    }

    /// Signals shutdown and waits for the current batch to finish.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(IndexEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IndexWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(IndexEvent::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadpool::{deadpool_announce_script, deadpool_entry_script, make_test_target};
    use crate::primitives::{Transaction, TxIn};
    use crate::vm::{make_claim_hash, Op, Script, ScriptBignum};
    use rand::Rng;

    fn temp_index() -> DeadpoolIndex {
        let mut path = std::env::temp_dir();
        path.push(hex::encode(rand::thread_rng().gen::<[u8; 16]>()));
        path.push("factorn-deadpoolindex");
        DeadpoolIndex::open(path).unwrap()
    }

    fn coinbase(height: i64) -> Transaction {
        let mut script_sig = Script::new();
        script_sig.push_data(&height.to_le_bytes());
        Transaction {
            version: 1,
            inputs: vec![TxIn::new(OutPoint::new(Hash256::zero(), u32::MAX), script_sig)],
            outputs: vec![TxOut::new(50 * crate::consensus::COIN, Script::new())],
            lock_time: 0,
        }
    }

    fn block_with(txs: Vec<Transaction>, height: i64, prev: Hash256) -> Block {
        let mut all = vec![coinbase(height)];
        all.extend(txs);
        let mut block = Block {
            header: crate::primitives::genesis_block(crate::consensus::Network::Regtest).header,
            txs: all,
        };
        block.header.prev_hash = prev;
        block.header.merkle_root = block.compute_merkle_root();
        block
    }

    fn claim_script() -> Script {
        let mut s = Script::new();
        s.push_op(Op::Zero).push_data(&[7u8; 20]);
        s
    }

    #[test]
    fn connect_indexes_entries_and_announcements() {
        let index = temp_index();
        let n = make_test_target();
        let deadpool_id = hash_n_value_of(&n);

        let mut entry_tx = Transaction::default();
        entry_tx
            .outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(&n)));

        let solution = ScriptBignum::from_i64(11);
        let claim_hash = make_claim_hash(&solution, &claim_script());
        let mut ann_tx = Transaction::default();
        ann_tx
            .outputs
            .push(TxOut::new(1_000_000, deadpool_announce_script(&n, &claim_hash)));

        let block = block_with(vec![entry_tx.clone(), ann_tx.clone()], 1, Hash256::zero());
        index.connect_block(&block, 1, &block.hash()).unwrap();

        let entries = index.find_entries(&deadpool_id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].locator, OutPoint::new(entry_tx.txid(), 0));
        assert_eq!(entries[0].height, 1);

        let anns = index.find_announces(&deadpool_id);
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].locator, OutPoint::new(ann_tx.txid(), 0));

        let claim = index.find_claim(&entries[0].locator).unwrap();
        assert_eq!(claim.claim_height, 0);
        assert_eq!(claim.deadpool_id, deadpool_id);
        assert!(index.is_unclaimed_entry(&entries[0].locator).is_some());

        assert_eq!(index.best_block().unwrap(), Some((block.hash(), 1)));
    }

    fn hash_n_value_of(n: &ScriptBignum) -> Hash256 {
        crate::deadpool::hash_n_value(&n.serialize())
    }

    #[test]
    fn claim_spend_upgrades_the_record() {
        let index = temp_index();
        let n = make_test_target();
        let deadpool_id = hash_n_value_of(&n);

        let mut entry_tx = Transaction::default();
        entry_tx
            .outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(&n)));
        let entry_outpoint = OutPoint::new(entry_tx.txid(), 0);

        let block1 = block_with(vec![entry_tx], 1, Hash256::zero());
        index.connect_block(&block1, 1, &block1.hash()).unwrap();

        let solution = ScriptBignum::from_i64(11);
        let claim_tx = crate::deadpool::create_claim_tx(
            &[entry_outpoint],
            50_000_000,
            &solution,
            &claim_script(),
            10,
        );
        let block2 = block_with(vec![claim_tx.clone()], 2, block1.hash());
        index.connect_block(&block2, 2, &block2.hash()).unwrap();

        let claim = index.find_claim(&entry_outpoint).unwrap();
        assert_eq!(claim.claim_height, 2);
        assert_eq!(claim.claim_block_hash, block2.hash());
        assert_eq!(claim.claim_tx_hash, claim_tx.txid());
        assert_eq!(claim.solution, solution.serialize());
        assert_eq!(claim.deadpool_id, deadpool_id);
        assert!(index.is_unclaimed_entry(&entry_outpoint).is_none());

        // disconnecting the claim block restores the unclaimed record
        index.disconnect_block(&block2, 2).unwrap();
        let restored = index.find_claim(&entry_outpoint).unwrap();
        assert_eq!(restored.claim_height, 0);
        assert!(index.is_unclaimed_entry(&entry_outpoint).is_some());
    }

    #[test]
    fn connect_disconnect_is_byte_identical() {
        let index = temp_index();
        let n = make_test_target();

        let genesis = block_with(vec![], 0, Hash256::zero());
        index.connect_block(&genesis, 0, &genesis.hash()).unwrap();
        let before = index.snapshot();

        let mut entry_tx = Transaction::default();
        entry_tx
            .outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(&n)));

        let solution = ScriptBignum::from_i64(11);
        let claim_hash = make_claim_hash(&solution, &claim_script());
        let mut ann_tx = Transaction::default();
        ann_tx
            .outputs
            .push(TxOut::new(1_000_000, deadpool_announce_script(&n, &claim_hash)));

        let block = block_with(vec![entry_tx, ann_tx], 1, genesis.hash());
        index.connect_block(&block, 1, &block.hash()).unwrap();
        assert_ne!(index.snapshot(), before);

        index.disconnect_block(&block, 1).unwrap();

        // disconnect rewinds the best block marker to the genesis hash
        let mut after = index.snapshot();
        let mut expected = before;
        after.sort();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn entries_since_height_filters() {
        let index = temp_index();
        let n1 = make_test_target();
        let n2 = ScriptBignum::from_integer(rug::Integer::from(n1.inner() + 2));

        let mut tx1 = Transaction::default();
        tx1.outputs
            .push(TxOut::new(1_000, deadpool_entry_script(&n1)));
        let block1 = block_with(vec![tx1], 1, Hash256::zero());
        index.connect_block(&block1, 1, &block1.hash()).unwrap();

        let mut tx2 = Transaction::default();
        tx2.outputs
            .push(TxOut::new(2_000, deadpool_entry_script(&n2)));
        let block2 = block_with(vec![tx2], 2, block1.hash());
        index.connect_block(&block2, 2, &block2.hash()).unwrap();

        assert_eq!(index.find_entries_since_height(0).len(), 2);
        assert_eq!(index.find_entries_since_height(2).len(), 1);
        assert_eq!(
            index.find_entries_since_height(2)[0].deadpool_id,
            hash_n_value_of(&n2)
        );
        assert!(index.find_entries_since_height(3).is_empty());
    }

    struct VecSource(Vec<Block>);

    impl BlockSource for VecSource {
        fn tip_height(&self) -> i64 {
            self.0.len() as i64 - 1
        }

        fn block_at(&self, height: i64) -> Option<Block> {
            if height < 0 {
                return None;
            }
            self.0.get(height as usize).cloned()
        }
    }

    #[test]
    fn sync_catches_up_from_best_block() {
        let index = temp_index();
        let n = make_test_target();

        let genesis = block_with(vec![], 0, Hash256::zero());
        let mut entry_tx = Transaction::default();
        entry_tx
            .outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(&n)));
        let block1 = block_with(vec![entry_tx], 1, genesis.hash());
        let block2 = block_with(vec![], 2, block1.hash());

        let source = VecSource(vec![genesis.clone(), block1, block2.clone()]);

        index.connect_block(&genesis, 0, &genesis.hash()).unwrap();
        index.sync(&source).unwrap();

        assert_eq!(index.best_block().unwrap(), Some((block2.hash(), 2)));
        assert_eq!(index.find_entries(&hash_n_value_of(&n)).len(), 1);

        // replaying the sync is a no-op
        index.sync(&source).unwrap();
        assert_eq!(index.best_block().unwrap(), Some((block2.hash(), 2)));
    }

    #[test]
    fn sync_detects_divergence() {
        let index = temp_index();

        let genesis = block_with(vec![], 0, Hash256::zero());
        let other = block_with(vec![], 0, Hash256::hash_from_slice(b"fork"));

        index.connect_block(&genesis, 0, &genesis.hash()).unwrap();

        let source = VecSource(vec![other]);
        assert!(matches!(index.sync(&source), Err(IndexErr::Inconsistent)));
    }

    #[test]
    fn worker_processes_events_in_order() {
        let index = Arc::new(temp_index());
        let n = make_test_target();

        let mut entry_tx = Transaction::default();
        entry_tx
            .outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(&n)));
        let block1 = block_with(vec![entry_tx], 1, Hash256::zero());

        let worker = IndexWorker::start(index.clone());
        worker.notify(IndexEvent::Connected {
            block: Arc::new(block1.clone()),
            height: 1,
            hash: block1.hash(),
        });
        worker.shutdown();

        assert_eq!(index.find_entries(&hash_n_value_of(&n)).len(), 1);
        assert_eq!(index.best_block().unwrap(), Some((block1.hash(), 1)));
    }
}
