// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{
    check_proof_of_work, get_next_work_required, ChainParams, HeaderView, PowErr,
};
use crate::deadpool::announcedb::AnnounceDbErr;
use crate::deadpool::index::IndexEvent;
use crate::deadpool::{
    check_txout_deadpool_integers, extract_announcements, is_deadpool_entry, AnnounceDb,
    DeadpoolIndex, IndexWorker,
};
use crate::primitives::{Block, BlockHeader, OutPoint, TxOut};
use crate::vm::{
    verify_claim_spend, BigNumCheckErr, Script, ScriptErr, ScriptExecContext,
};
use log::{debug, info};
use std::collections::HashMap;
use triomphe::Arc;

/// An unspent output with its creation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub out: TxOut,
    pub height: i64,
    pub coinbase: bool,
}

/// Read access to the UTXO set. The set itself is owned by the
/// embedding node; the deadpool rules only look coins up.
pub trait CoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// In-memory coin view
#[derive(Default)]
pub struct MemoryCoinView {
    coins: HashMap<OutPoint, Coin>,
}

impl MemoryCoinView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.remove(outpoint)
    }

    /// Applies a block's outputs and spends
    pub fn apply_block(&mut self, block: &Block, height: i64) {
        for (tx_index, tx) in block.txs.iter().enumerate() {
            for input in &tx.inputs {
                if !input.prevout.txid.is_zero() {
                    self.spend_coin(&input.prevout);
                }
            }

            let txid = tx.txid();
            for (i, out) in tx.outputs.iter().enumerate() {
                self.add_coin(
                    OutPoint::new(txid, i as u32),
                    Coin {
                        out: out.clone(),
                        height,
                        coinbase: tx_index == 0,
                    },
                );
            }
        }
    }
}

impl CoinView for MemoryCoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }
}

#[derive(Debug)]
pub enum ChainErr {
    /// Proof of work failure
    Pow(PowErr),

    /// Declared bits differ from the required work
    UnexpectedBits,

    /// Script level failure, carries the reject reason
    Script(ScriptErr),

    /// Deadpool integer failure, carries the reject reason
    BigNum(BigNumCheckErr),

    /// Spent output not present in the coin view
    MissingCoin,

    /// A claim transaction needs a destination output
    MissingClaimOutput,

    /// Announcement database failure
    AnnounceDb(AnnounceDbErr),
}

impl ChainErr {
    /// Reject reason as reported through validation state
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Pow(err) => err.reason(),
            Self::UnexpectedBits => "bad-diffbits",
            Self::Script(err) => err.reason(),
            Self::BigNum(err) => err.reason(),
            Self::MissingCoin => "bad-txns-inputs-missingorspent",
            Self::MissingClaimOutput => "deadpool-claim-no-output",
            Self::AnnounceDb(_) => "announcedb-error",
        }
    }
}

impl From<PowErr> for ChainErr {
    fn from(other: PowErr) -> Self {
        Self::Pow(other)
    }
}

impl From<ScriptErr> for ChainErr {
    fn from(other: ScriptErr) -> Self {
        Self::Script(other)
    }
}

impl From<BigNumCheckErr> for ChainErr {
    fn from(other: BigNumCheckErr) -> Self {
        Self::BigNum(other)
    }
}

impl From<AnnounceDbErr> for ChainErr {
    fn from(other: AnnounceDbErr) -> Self {
        Self::AnnounceDb(other)
    }
}

/// Contextual header validation: the declared bits must match the
/// retarget schedule and the factorization proof must hold.
pub fn validate_block_header(
    header: &BlockHeader,
    view: &dyn HeaderView,
    params: &ChainParams,
) -> Result<(), ChainErr> {
    let required = get_next_work_required(view, i64::from(header.time), params);
    if header.bits != required {
        return Err(ChainErr::UnexpectedBits);
    }

    check_proof_of_work(header, params)?;
    Ok(())
}

/// The destination script of a claim transaction: its single non-fee
/// output.
fn claim_destination(outputs: &[TxOut]) -> Result<&Script, ChainErr> {
    outputs
        .first()
        .map(|out| &out.script_pubkey)
        .ok_or(ChainErr::MissingClaimOutput)
}

/// Applies the deadpool consensus rules to a block.
///
/// Once the softfork is `active` every deadpool output must carry a
/// canonical integer and every spend of an entry coin must reveal a
/// valid factor backed by a matured announcement. Before activation
/// the same rules are policy only and blocks pass.
///
/// Claims are evaluated against the announcement database state prior
/// to this block, so a block cannot self-mature its announcements.
pub fn check_block_deadpool_rules(
    block: &Block,
    height: i64,
    coins: &dyn CoinView,
    announce_db: &AnnounceDb,
    params: &ChainParams,
    active: bool,
) -> Result<(), ChainErr> {
    if !active {
        return Ok(());
    }

    for tx in &block.txs {
        for out in &tx.outputs {
            check_txout_deadpool_integers(out)?;
        }

        for input in &tx.inputs {
            if input.prevout.txid.is_zero() {
                continue;
            }

            let Some(coin) = coins.get_coin(&input.prevout) else {
                return Err(ChainErr::MissingCoin);
            };

            if !is_deadpool_entry(&coin.out) {
                continue;
            }

            let ctx = ScriptExecContext {
                tip_height: height,
                claim_script: claim_destination(&tx.outputs)?,
                announces: announce_db,
                announce_maturity: params.deadpool_announce_maturity,
                announce_validity: params.deadpool_announce_validity,
            };

            verify_claim_spend(&input.script_sig, &coin.out.script_pubkey, &ctx)?;
        }
    }

    Ok(())
}

/// Explicit context threaded through the subsystems at node startup.
/// Owns the consensus announcement database and the optional deadpool
/// index worker.
pub struct ChainContext {
    params: ChainParams,
    announce_db: Arc<AnnounceDb>,
    index: Option<Arc<DeadpoolIndex>>,
    worker: Option<IndexWorker>,
}

impl ChainContext {
    #[must_use]
    pub fn new(
        params: ChainParams,
        announce_db: Arc<AnnounceDb>,
        index: Option<Arc<DeadpoolIndex>>,
    ) -> Self {
        let worker = index.as_ref().map(|index| IndexWorker::start(index.clone()));
        Self {
            params,
            announce_db,
            index,
            worker,
        }
    }

    #[must_use]
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    #[must_use]
    pub fn announce_db(&self) -> &AnnounceDb {
        &self.announce_db
    }

    #[must_use]
    pub fn index(&self) -> Option<&Arc<DeadpoolIndex>> {
        self.index.as_ref()
    }

    /// Connects a block: verifies the deadpool rules against the
    /// pre-block state, then records the block's announcements and
    /// hands the block to the index worker.
    pub fn connect_block(
        &self,
        block: &Block,
        height: i64,
        coins: &dyn CoinView,
        active: bool,
    ) -> Result<(), ChainErr> {
        check_block_deadpool_rules(block, height, coins, &self.announce_db, &self.params, active)?;

        let mut anns = Vec::new();
        for tx in &block.txs {
            anns.extend(extract_announcements(tx, height));
        }

        // Announcements below the burn floor never enter the
        // consensus database; claims against them must fail.
        anns.retain(|a| a.announcement.out.value >= self.params.deadpool_announce_min_burn);

        if !anns.is_empty() {
            self.announce_db.add_announcements(&anns)?;
            debug!(
                "chain: recorded {} announcements at height {}",
                anns.len(),
                height
            );
        }

        if let Some(worker) = &self.worker {
            worker.notify(IndexEvent::Connected {
                block: Arc::new(block.clone()),
                height,
                hash: block.hash(),
            });
        }

        Ok(())
    }

    /// Disconnects a block on reorg, inverting the announcement
    /// writes and notifying the index worker.
    pub fn disconnect_block(&self, block: &Block, height: i64) -> Result<(), ChainErr> {
        let mut anns = Vec::new();
        for tx in &block.txs {
            anns.extend(extract_announcements(tx, height));
        }
        anns.retain(|a| a.announcement.out.value >= self.params.deadpool_announce_min_burn);

        if !anns.is_empty() {
            self.announce_db.remove_announcements(&anns)?;
        }

        if let Some(worker) = &self.worker {
            worker.notify(IndexEvent::Disconnected {
                block: Arc::new(block.clone()),
                height,
            });
        }

        Ok(())
    }

    /// Stops the index worker after the current batch.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        info!("chain: context shut down");
    }
}
