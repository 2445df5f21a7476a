// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::chain::CoinView;
use crate::consensus::{ChainParams, Money, COIN};
use crate::deadpool::{
    create_claim_tx, deadpool_announce_script, deadpool_entry_script, get_entry_n, hash_n_value,
    is_deadpool_entry, DeadpoolIndex, UniqueDeadpoolIds,
};
use crate::primitives::{Address, Hash256, OutPoint, Transaction, TxOut};
use crate::vm::{check_deadpool_integer, make_claim_hash, ScriptBignum};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tarpc::context;
use triomphe::Arc;

/// Fee rate applied to generated claim transactions, satoshi per byte
const CLAIM_FEE_RATE: Money = 10;

/// Renders satoshis as a decimal coin amount
#[must_use]
pub fn format_money(amount: Money) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let magnitude = amount.unsigned_abs();
    format!("{sign}{}.{:08}", magnitude / COIN as u64, magnitude % COIN as u64)
}

/// Parses a decimal coin amount into satoshis
pub fn parse_money(text: &str) -> Result<Money, RpcErr> {
    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (text, ""),
    };

    if whole.is_empty() || frac.len() > 8 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(RpcErr::InvalidAmount);
    }

    let whole: Money = whole.parse().map_err(|_| RpcErr::InvalidAmount)?;
    if whole < 0 {
        return Err(RpcErr::InvalidAmount);
    }

    let mut frac_sats: Money = 0;
    if !frac.is_empty() {
        let padded = format!("{frac:0<8}");
        frac_sats = padded.parse().map_err(|_| RpcErr::InvalidAmount)?;
    }

    whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac_sats))
        .ok_or(RpcErr::InvalidAmount)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcOutPoint {
    pub txid: String,
    pub vout: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadpoolEntryDetail {
    pub txid: String,
    pub vout: u32,
    pub amount: String,
    pub height: i64,
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_blockhash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadpoolAnnouncementDetail {
    pub txid: String,
    pub vout: u32,
    pub burn_amount: String,
    pub height: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadpoolEntryInfo {
    pub n: String,
    pub bits: u64,
    pub deadpoolid: String,
    pub bounty: String,
    pub entries: Vec<DeadpoolEntryDetail>,
    pub announcements: Vec<DeadpoolAnnouncementDetail>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadpoolSummary {
    pub deadpoolid: String,
    pub bounty: String,
    pub entries: u64,
    pub announcements: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RpcErr {
    /// The deadpool softfork has not activated yet
    NotActivated,

    /// The node runs without the deadpool index
    IndexUnavailable,

    /// Malformed decimal number
    InvalidNumber(String),

    /// Number fails the deadpool integer checks, carries the reason
    InvalidInteger(String),

    /// Malformed or wrong-network address
    InvalidAddress(String),

    /// Burn amount below the floor
    InsufficientBurn(String),

    /// The solution does not divide the target
    InvalidSolution,

    /// Malformed amount
    InvalidAmount,

    /// Malformed deadpool id or hash
    InvalidId,

    /// No entries found for the query
    NoEntries,

    /// A referenced outpoint is not a deadpool entry
    NotAnEntry(String),

    /// A referenced outpoint is unknown to the coin view
    UnknownEntry(String),

    /// Inputs target different deadpool numbers
    EntryMismatch(String),
}

/// Everything the deadpool RPC handlers read, assembled at node
/// startup.
pub struct NodeRpcContext {
    pub params: ChainParams,
    pub index: Option<Arc<DeadpoolIndex>>,
    pub coins: Box<dyn CoinView + Send + Sync>,
    tip_height: RwLock<i64>,
    deadpool_active: AtomicBool,
}

impl NodeRpcContext {
    #[must_use]
    pub fn new(
        params: ChainParams,
        index: Option<Arc<DeadpoolIndex>>,
        coins: Box<dyn CoinView + Send + Sync>,
    ) -> Self {
        Self {
            params,
            index,
            coins,
            tip_height: RwLock::new(0),
            deadpool_active: AtomicBool::new(false),
        }
    }

    /// Called by the validation thread on tip changes
    pub fn update_tip(&self, height: i64, deadpool_active: bool) {
        *self.tip_height.write() = height;
        self.deadpool_active.store(deadpool_active, Ordering::Release);
    }

    #[must_use]
    pub fn tip_height(&self) -> i64 {
        *self.tip_height.read()
    }

    #[must_use]
    pub fn deadpool_active(&self) -> bool {
        self.deadpool_active.load(Ordering::Acquire)
    }
}

#[tarpc::service]
pub trait DeadpoolRpc {
    /// Returns the deadpool id (hash) of a number
    async fn get_deadpool_id(n: String) -> Result<String, RpcErr>;

    /// Returns the deadpool entry for a given deadpool id
    async fn get_deadpool_entry(deadpool_id: String) -> Result<DeadpoolEntryInfo, RpcErr>;

    /// Returns a list of deadpool entries and their stats
    async fn list_deadpool_entries(
        num_blocks: Option<i64>,
        limit: Option<u64>,
        include_claimed: Option<bool>,
        include_announced: Option<bool>,
    ) -> Result<Vec<DeadpoolSummary>, RpcErr>;

    /// Creates a transaction template for a deadpool entry. The
    /// template is funded and broadcast by the wallet.
    async fn create_deadpool_entry(amount: String, n: String) -> Result<String, RpcErr>;

    /// Creates a transaction template announcing a future claim
    async fn announce_deadpool_claim(
        burn_amount: String,
        address: String,
        entry_n: String,
        solution: String,
    ) -> Result<String, RpcErr>;

    /// Creates a claim transaction spending the given entry outpoints
    async fn claim_deadpool_txs(
        inputs: Vec<RpcOutPoint>,
        to_address: String,
        solution: String,
    ) -> Result<String, RpcErr>;

    /// Creates a claim transaction for every unclaimed entry of a
    /// deadpool id
    async fn claim_deadpool_id(
        deadpool_id: String,
        to_address: String,
        solution: String,
    ) -> Result<String, RpcErr>;
}

/// Serves the deadpool RPC over a TCP json transport until the
/// listener shuts down.
pub async fn serve_rpc(
    server: DeadpoolRpcServer,
    listen: std::net::SocketAddr,
) -> std::io::Result<()> {
    use futures::{future, StreamExt};
    use tarpc::server::incoming::Incoming;
    use tarpc::server::{BaseChannel, Channel};
    use tarpc::tokio_serde::formats::Json;

    async fn spawn(fut: impl std::future::Future<Output = ()> + Send + 'static) {
        tokio::spawn(fut);
    }

    let mut listener = tarpc::serde_transport::tcp::listen(&listen, Json::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);

    listener
        .filter_map(|r| future::ready(r.ok()))
        .map(BaseChannel::with_defaults)
        .max_channels_per_key(8, |t| t.transport().peer_addr().unwrap().ip())
        .map(|channel| {
            let server = server.clone();
            channel.execute(server.serve()).for_each(spawn)
        })
        .buffer_unordered(32)
        .for_each(|_| async {})
        .await;

    Ok(())
}

/// RPC server for the deadpool category
#[derive(Clone)]
pub struct DeadpoolRpcServer {
    pub ctx: Arc<NodeRpcContext>,
}

impl DeadpoolRpcServer {
    #[must_use]
    pub fn new(ctx: Arc<NodeRpcContext>) -> Self {
        Self { ctx }
    }

    fn require_active(&self) -> Result<(), RpcErr> {
        if !self.ctx.deadpool_active() {
            return Err(RpcErr::NotActivated);
        }
        Ok(())
    }

    fn require_index(&self) -> Result<&Arc<DeadpoolIndex>, RpcErr> {
        self.ctx.index.as_ref().ok_or(RpcErr::IndexUnavailable)
    }

    fn parse_checked_number(&self, text: &str) -> Result<ScriptBignum, RpcErr> {
        let n = ScriptBignum::from_dec_str(text);
        if !n.is_valid() {
            return Err(RpcErr::InvalidNumber(text.to_owned()));
        }
        check_deadpool_integer(&n)
            .map_err(|err| RpcErr::InvalidInteger(err.reason().to_owned()))?;
        Ok(n)
    }

    fn parse_address(&self, text: &str) -> Result<Address, RpcErr> {
        Address::from_bech32_checked(text, self.ctx.params.network)
            .map_err(|_| RpcErr::InvalidAddress(text.to_owned()))
    }

    fn parse_solution(&self, text: &str) -> Result<ScriptBignum, RpcErr> {
        let p = ScriptBignum::from_dec_str(text);
        if !p.is_valid() {
            return Err(RpcErr::InvalidNumber(text.to_owned()));
        }
        Ok(p)
    }

    fn check_solution(n: &ScriptBignum, p: &ScriptBignum) -> Result<(), RpcErr> {
        if *p == 0 || n.modulus(p) != 0 {
            return Err(RpcErr::InvalidSolution);
        }
        Ok(())
    }
}

#[tarpc::server]
impl DeadpoolRpc for DeadpoolRpcServer {
    async fn get_deadpool_id(self, _: context::Context, n: String) -> Result<String, RpcErr> {
        let n = self.parse_checked_number(&n)?;
        Ok(hash_n_value(&n.serialize()).to_hex_be())
    }

    async fn get_deadpool_entry(
        self,
        _: context::Context,
        deadpool_id: String,
    ) -> Result<DeadpoolEntryInfo, RpcErr> {
        self.require_active()?;
        let index = self.require_index()?;

        let deadpool_id = Hash256::from_hex_be(&deadpool_id).map_err(|_| RpcErr::InvalidId)?;

        let entries = index.find_entries(&deadpool_id);
        if entries.is_empty() {
            return Err(RpcErr::NoEntries);
        }

        let anns = index.find_announces(&deadpool_id);

        let mut total: Money = 0;
        let mut data_n: Option<Vec<u8>> = None;
        let mut res_entries = Vec::with_capacity(entries.len());

        for entry in &entries {
            if data_n.is_none() {
                data_n = get_entry_n(&entry.tx_out);
            }

            let claim = index
                .find_claim(&entry.locator)
                .filter(|claim| claim.claim_height > 0);

            let detail = match claim {
                Some(claim) => DeadpoolEntryDetail {
                    txid: entry.locator.txid.to_hex_be(),
                    vout: entry.locator.n,
                    amount: format_money(entry.tx_out.value),
                    height: entry.height,
                    claimed: true,
                    claim_height: Some(claim.claim_height),
                    claim_blockhash: Some(claim.claim_block_hash.to_hex_be()),
                    claim_txid: Some(claim.claim_tx_hash.to_hex_be()),
                    solution: Some(ScriptBignum::from_bytes(&claim.solution).to_dec()),
                },
                None => DeadpoolEntryDetail {
                    txid: entry.locator.txid.to_hex_be(),
                    vout: entry.locator.n,
                    amount: format_money(entry.tx_out.value),
                    height: entry.height,
                    claimed: false,
                    claim_height: None,
                    claim_blockhash: None,
                    claim_txid: None,
                    solution: None,
                },
            };

            res_entries.push(detail);
            total += entry.tx_out.value;
        }

        let n = ScriptBignum::from_bytes(&data_n.unwrap_or_default());

        let announcements = anns
            .iter()
            .map(|ann| DeadpoolAnnouncementDetail {
                txid: ann.locator.txid.to_hex_be(),
                vout: ann.locator.n,
                burn_amount: format_money(ann.tx_out.value),
                height: ann.height,
            })
            .collect();

        Ok(DeadpoolEntryInfo {
            n: n.to_dec(),
            bits: u64::from(n.bits()),
            deadpoolid: deadpool_id.to_hex_be(),
            bounty: format_money(total),
            entries: res_entries,
            announcements,
        })
    }

    async fn list_deadpool_entries(
        self,
        _: context::Context,
        num_blocks: Option<i64>,
        limit: Option<u64>,
        include_claimed: Option<bool>,
        include_announced: Option<bool>,
    ) -> Result<Vec<DeadpoolSummary>, RpcErr> {
        self.require_active()?;
        let index = self.require_index()?;

        let num_blocks = num_blocks.unwrap_or(1000);
        let limit = limit.unwrap_or(1000);
        let include_claimed = include_claimed.unwrap_or(false);
        let include_announced = include_announced.unwrap_or(true);

        let target_height = std::cmp::max(self.ctx.tip_height() - num_blocks, 1);

        let found = index.find_entries_since_height(target_height);

        let mut results = Vec::new();
        let mut processed: UniqueDeadpoolIds = UniqueDeadpoolIds::new();

        for entry in found {
            if results.len() as u64 >= limit {
                break;
            }

            // only process each deadpool id once
            if !processed.insert(entry.deadpool_id) {
                continue;
            }

            // announcements first, they can filter the id out
            let anns = index.find_announces(&entry.deadpool_id);
            if !include_announced && !anns.is_empty() {
                continue;
            }

            let mut total: Money = 0;
            let mut num_entries = 0u64;

            for other in index.find_entries(&entry.deadpool_id) {
                if !include_claimed {
                    let claimed = index
                        .find_claim(&other.locator)
                        .map(|claim| claim.claim_height > 0)
                        .unwrap_or(false);
                    if claimed {
                        continue;
                    }
                }

                total += other.tx_out.value;
                num_entries += 1;
            }

            if num_entries > 0 {
                results.push(DeadpoolSummary {
                    deadpoolid: entry.deadpool_id.to_hex_be(),
                    bounty: format_money(total),
                    entries: num_entries,
                    announcements: anns.len() as u64,
                });
            }
        }

        Ok(results)
    }

    async fn create_deadpool_entry(
        self,
        _: context::Context,
        amount: String,
        n: String,
    ) -> Result<String, RpcErr> {
        self.require_active()?;

        let amount = parse_money(&amount)?;
        let n = self.parse_checked_number(&n)?;

        let mut tx = Transaction::default();
        tx.outputs.push(TxOut::new(amount, deadpool_entry_script(&n)));

        Ok(tx.to_hex())
    }

    async fn announce_deadpool_claim(
        self,
        _: context::Context,
        burn_amount: String,
        address: String,
        entry_n: String,
        solution: String,
    ) -> Result<String, RpcErr> {
        self.require_active()?;

        let amount = parse_money(&burn_amount)?;
        let min_burn = self.ctx.params.deadpool_announce_min_burn;
        if amount < min_burn {
            return Err(RpcErr::InsufficientBurn(format!(
                "Burn amount should be at least {}",
                format_money(min_burn)
            )));
        }

        let destination = self.parse_address(&address)?;
        let n = self.parse_checked_number(&entry_n)?;
        let p = self.parse_solution(&solution)?;
        Self::check_solution(&n, &p)?;

        let claim_hash = make_claim_hash(&p, &destination.script_pubkey());

        let mut tx = Transaction::default();
        tx.outputs
            .push(TxOut::new(amount, deadpool_announce_script(&n, &claim_hash)));

        Ok(tx.to_hex())
    }

    async fn claim_deadpool_txs(
        self,
        _: context::Context,
        inputs: Vec<RpcOutPoint>,
        to_address: String,
        solution: String,
    ) -> Result<String, RpcErr> {
        self.require_active()?;

        let destination = self.parse_address(&to_address)?;
        let p = self.parse_solution(&solution)?;

        if inputs.is_empty() {
            return Err(RpcErr::NoEntries);
        }

        let mut entry_n: Option<Vec<u8>> = None;
        let mut entries = Vec::with_capacity(inputs.len());
        let mut total_bounty: Money = 0;

        for input in &inputs {
            let txid = Hash256::from_hex_be(&input.txid).map_err(|_| RpcErr::InvalidId)?;
            let locator = OutPoint::new(txid, input.vout);

            let Some(coin) = self.ctx.coins.get_coin(&locator) else {
                return Err(RpcErr::UnknownEntry(format!(
                    "{}:{}",
                    input.txid, input.vout
                )));
            };

            if !is_deadpool_entry(&coin.out) {
                return Err(RpcErr::NotAnEntry(format!("{}:{}", input.txid, input.vout)));
            }

            let this_n = get_entry_n(&coin.out);
            match &entry_n {
                None => entry_n = this_n,
                Some(expected) => {
                    if this_n.as_ref() != Some(expected) {
                        return Err(RpcErr::EntryMismatch(format!(
                            "{}:{}",
                            input.txid, input.vout
                        )));
                    }
                }
            }

            entries.push(locator);
            total_bounty += coin.out.value;
        }

        let n = ScriptBignum::from_bytes(&entry_n.unwrap_or_default());
        Self::check_solution(&n, &p)?;

        let tx = create_claim_tx(
            &entries,
            total_bounty,
            &p,
            &destination.script_pubkey(),
            CLAIM_FEE_RATE,
        );
        Ok(tx.to_hex())
    }

    async fn claim_deadpool_id(
        self,
        _: context::Context,
        deadpool_id: String,
        to_address: String,
        solution: String,
    ) -> Result<String, RpcErr> {
        self.require_active()?;

        let destination = self.parse_address(&to_address)?;
        let p = self.parse_solution(&solution)?;
        let deadpool_id = Hash256::from_hex_be(&deadpool_id).map_err(|_| RpcErr::InvalidId)?;

        let index = self.require_index()?;
        let entries = index.find_entries(&deadpool_id);
        if entries.is_empty() {
            return Err(RpcErr::NoEntries);
        }

        let mut entry_n: Option<Vec<u8>> = None;
        let mut unclaimed = Vec::new();
        let mut total_bounty: Money = 0;

        for entry in entries {
            // spent entries are no longer in the coin view
            let Some(coin) = self.ctx.coins.get_coin(&entry.locator) else {
                continue;
            };

            if entry_n.is_none() {
                entry_n = get_entry_n(&coin.out);
            }

            unclaimed.push(entry.locator);
            total_bounty += coin.out.value;
        }

        if unclaimed.is_empty() || entry_n.is_none() {
            return Err(RpcErr::NoEntries);
        }

        let n = ScriptBignum::from_bytes(&entry_n.unwrap_or_default());
        Self::check_solution(&n, &p)?;

        let tx = create_claim_tx(
            &unclaimed,
            total_bounty,
            &p,
            &destination.script_pubkey(),
            CLAIM_FEE_RATE,
        );
        Ok(tx.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Coin, MemoryCoinView};
    use crate::consensus::Network;
    use crate::deadpool::make_test_target;
    use crate::primitives::Block;
    use rand::Rng;

    fn temp_index() -> Arc<DeadpoolIndex> {
        let mut path = std::env::temp_dir();
        path.push(hex::encode(rand::thread_rng().gen::<[u8; 16]>()));
        path.push("factorn-rpcindex");
        Arc::new(DeadpoolIndex::open(path).unwrap())
    }

    fn server_with(coins: MemoryCoinView, index: Arc<DeadpoolIndex>) -> DeadpoolRpcServer {
        let ctx = NodeRpcContext::new(ChainParams::regtest(), Some(index), Box::new(coins));
        ctx.update_tip(100, true);
        DeadpoolRpcServer::new(Arc::new(ctx))
    }

    fn test_address() -> String {
        Address([7u8; 20]).to_bech32(Network::Regtest.bech32_hrp())
    }

    fn entry_block(n: &ScriptBignum) -> (Block, OutPoint) {
        let mut tx = Transaction::default();
        tx.outputs
            .push(TxOut::new(50_000_000, deadpool_entry_script(n)));
        let outpoint = OutPoint::new(tx.txid(), 0);

        let mut block = crate::primitives::genesis_block(Network::Regtest);
        block.txs = vec![tx];
        block.header.merkle_root = block.compute_merkle_root();
        (block, outpoint)
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(1_000_000), "0.01000000");
        assert_eq!(format_money(COIN), "1.00000000");
        assert_eq!(format_money(0), "0.00000000");
        assert_eq!(format_money(123_456_789), "1.23456789");
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money("0.01").unwrap(), 1_000_000);
        assert_eq!(parse_money("1").unwrap(), COIN);
        assert_eq!(parse_money("1.23456789").unwrap(), 123_456_789);
        assert!(parse_money("1.234567891").is_err());
        assert!(parse_money("-1").is_err());
        assert!(parse_money("banana").is_err());
        assert_eq!(parse_money(&format_money(987_654_321)).unwrap(), 987_654_321);
    }

    #[tokio::test]
    async fn deadpool_id_round_trips_through_hex() {
        let server = server_with(MemoryCoinView::new(), temp_index());
        let n = make_test_target();

        let id = server
            .clone()
            .get_deadpool_id(context::current(), n.to_dec())
            .await
            .unwrap();

        let expected = hash_n_value(&n.serialize()).to_hex_be();
        assert_eq!(id, expected);
    }

    #[tokio::test]
    async fn deadpool_id_rejects_bad_input() {
        let server = server_with(MemoryCoinView::new(), temp_index());

        assert!(matches!(
            server
                .clone()
                .get_deadpool_id(context::current(), "banana".into())
                .await,
            Err(RpcErr::InvalidNumber(_))
        ));

        assert_eq!(
            server
                .clone()
                .get_deadpool_id(context::current(), "319".into())
                .await,
            Err(RpcErr::InvalidInteger("bad-bigint-too-small".into()))
        );
    }

    #[tokio::test]
    async fn entry_lookup_and_listing() {
        let n = make_test_target();
        let index = temp_index();

        let (block, outpoint) = entry_block(&n);
        index.connect_block(&block, 1, &block.hash()).unwrap();

        let mut coins = MemoryCoinView::new();
        coins.add_coin(
            outpoint,
            Coin {
                out: block.txs[0].outputs[0].clone(),
                height: 1,
                coinbase: false,
            },
        );

        let server = server_with(coins, index);
        let id = hash_n_value(&n.serialize()).to_hex_be();

        let info = server
            .clone()
            .get_deadpool_entry(context::current(), id.clone())
            .await
            .unwrap();
        assert_eq!(info.n, n.to_dec());
        assert_eq!(info.bits, 161);
        assert_eq!(info.deadpoolid, id);
        assert_eq!(info.bounty, "0.50000000");
        assert_eq!(info.entries.len(), 1);
        assert!(!info.entries[0].claimed);
        assert!(info.announcements.is_empty());

        let list = server
            .clone()
            .list_deadpool_entries(context::current(), None, None, None, None)
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].deadpoolid, id);
        assert_eq!(list[0].entries, 1);
    }

    #[tokio::test]
    async fn entry_lookup_requires_activation() {
        let server = server_with(MemoryCoinView::new(), temp_index());
        server.ctx.update_tip(100, false);

        assert_eq!(
            server
                .clone()
                .get_deadpool_entry(context::current(), "00".repeat(32))
                .await,
            Err(RpcErr::NotActivated)
        );
    }

    #[tokio::test]
    async fn create_entry_template() {
        let server = server_with(MemoryCoinView::new(), temp_index());
        let n = make_test_target();

        let hex_tx = server
            .clone()
            .create_deadpool_entry(context::current(), "0.5".into(), n.to_dec())
            .await
            .unwrap();

        let tx = Transaction::from_hex(&hex_tx).unwrap();
        assert!(tx.inputs.is_empty());
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 50_000_000);
        assert!(is_deadpool_entry(&tx.outputs[0]));
    }

    #[tokio::test]
    async fn announce_enforces_burn_floor_and_solution() {
        let server = server_with(MemoryCoinView::new(), temp_index());
        let n = make_test_target();

        assert!(matches!(
            server
                .clone()
                .announce_deadpool_claim(
                    context::current(),
                    "0.001".into(),
                    test_address(),
                    n.to_dec(),
                    "11".into(),
                )
                .await,
            Err(RpcErr::InsufficientBurn(_))
        ));

        assert_eq!(
            server
                .clone()
                .announce_deadpool_claim(
                    context::current(),
                    "0.01".into(),
                    test_address(),
                    n.to_dec(),
                    "7".into(),
                )
                .await,
            Err(RpcErr::InvalidSolution)
        );

        let hex_tx = server
            .clone()
            .announce_deadpool_claim(
                context::current(),
                "0.01".into(),
                test_address(),
                n.to_dec(),
                "11".into(),
            )
            .await
            .unwrap();

        let tx = Transaction::from_hex(&hex_tx).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 1_000_000);
        assert!(tx.outputs[0].script_pubkey.is_unspendable());
    }

    #[tokio::test]
    async fn announce_rejects_bad_address() {
        let server = server_with(MemoryCoinView::new(), temp_index());
        let n = make_test_target();

        assert!(matches!(
            server
                .clone()
                .announce_deadpool_claim(
                    context::current(),
                    "0.01".into(),
                    "not-an-address".into(),
                    n.to_dec(),
                    "11".into(),
                )
                .await,
            Err(RpcErr::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn claim_by_outpoints() {
        let n = make_test_target();
        let index = temp_index();
        let (block, outpoint) = entry_block(&n);

        let mut coins = MemoryCoinView::new();
        coins.add_coin(
            outpoint,
            Coin {
                out: block.txs[0].outputs[0].clone(),
                height: 1,
                coinbase: false,
            },
        );

        let server = server_with(coins, index);

        let hex_tx = server
            .clone()
            .claim_deadpool_txs(
                context::current(),
                vec![RpcOutPoint {
                    txid: outpoint.txid.to_hex_be(),
                    vout: 0,
                }],
                test_address(),
                "11".into(),
            )
            .await
            .unwrap();

        let tx = Transaction::from_hex(&hex_tx).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].prevout, outpoint);
        assert_eq!(tx.outputs.len(), 1);
        assert!(tx.outputs[0].value < 50_000_000);

        // unknown outpoint
        assert!(matches!(
            server
                .clone()
                .claim_deadpool_txs(
                    context::current(),
                    vec![RpcOutPoint {
                        txid: Hash256::hash_from_slice(b"missing").to_hex_be(),
                        vout: 0,
                    }],
                    test_address(),
                    "11".into(),
                )
                .await,
            Err(RpcErr::UnknownEntry(_))
        ));
    }

    #[tokio::test]
    async fn claim_by_deadpool_id_skips_spent_entries() {
        let n = make_test_target();
        let index = temp_index();
        let (block, outpoint) = entry_block(&n);
        index.connect_block(&block, 1, &block.hash()).unwrap();

        // entry indexed but no longer in the coin view: nothing to
        // claim
        let server = server_with(MemoryCoinView::new(), index.clone());
        let id = hash_n_value(&n.serialize()).to_hex_be();

        assert_eq!(
            server
                .clone()
                .claim_deadpool_id(context::current(), id.clone(), test_address(), "11".into())
                .await,
            Err(RpcErr::NoEntries)
        );

        // with the coin present the claim builds
        let mut coins = MemoryCoinView::new();
        coins.add_coin(
            outpoint,
            Coin {
                out: block.txs[0].outputs[0].clone(),
                height: 1,
                coinbase: false,
            },
        );
        let server = server_with(coins, index);

        let hex_tx = server
            .clone()
            .claim_deadpool_id(context::current(), id, test_address(), "11".into())
            .await
            .unwrap();
        let tx = Transaction::from_hex(&hex_tx).unwrap();
        assert_eq!(tx.inputs[0].prevout, outpoint);
    }
}
