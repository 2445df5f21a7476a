// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

pub mod announcedb;
pub mod index;

use crate::consensus::Money;
use crate::primitives::{Hash256, OutPoint, Transaction, TxIn, TxOut};
use crate::vm::{
    check_deadpool_integer_bytes, make_claim_hash, BigNumCheckErr, Script, ScriptBignum,
    ScriptEntry, TxoutType,
};
use bincode::{Decode, Encode};
use std::collections::HashSet;

pub use crate::deadpool::announcedb::AnnounceDb;
pub use crate::deadpool::index::{
    DeadpoolIndex, DeadpoolIndexClaim, DeadpoolIndexEntry, IndexWorker,
};

pub type UniqueDeadpoolIds = HashSet<Hash256>;

/// The deadpool identifier of a target: sha256 over the raw pushed
/// bytes.
#[must_use]
pub fn hash_n_value(data_n: &[u8]) -> Hash256 {
    Hash256::hash_from_slice(data_n)
}

/// An announcement output together with its inclusion height
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Announce {
    pub out: TxOut,
    pub height: i64,
}

impl Announce {
    #[must_use]
    pub fn new(out: TxOut, height: i64) -> Self {
        Self { out, height }
    }

    fn pushes(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let entries = self.out.script_pubkey.parse().ok()?;
        match entries.as_slice() {
            [ScriptEntry::Op(crate::vm::Op::Announce), ScriptEntry::Push(claim), ScriptEntry::Push(n)] => {
                Some((claim.clone(), n.clone()))
            }
            _ => None,
        }
    }

    /// The committed claim hash
    #[must_use]
    pub fn claim_hash(&self) -> Hash256 {
        match self.pushes() {
            Some((claim, _)) if claim.len() == 32 => Hash256::from(claim),
            _ => Hash256::zero(),
        }
    }

    /// The announced target bytes
    #[must_use]
    pub fn read_n(&self) -> Option<Vec<u8>> {
        self.pushes().map(|(_, n)| n)
    }

    /// Deadpool id of the announced target, zero when unreadable
    #[must_use]
    pub fn n_hash(&self) -> Hash256 {
        match self.read_n() {
            Some(n) => hash_n_value(&n),
            None => Hash256::zero(),
        }
    }

    /// Compact form holding only the deadpool id and the claim hash
    #[must_use]
    pub fn compact(&self) -> (Hash256, Hash256) {
        (self.n_hash(), self.claim_hash())
    }
}

/// An announcement pinned to its creating output
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LocatedAnnouncement {
    pub locator: OutPoint,
    pub announcement: Announce,
}

/// Collects all announcements from a transaction.
#[must_use]
pub fn extract_announcements(tx: &Transaction, height: i64) -> Vec<LocatedAnnouncement> {
    let txid = tx.txid();
    let mut anns = Vec::new();

    for (i, out) in tx.outputs.iter().enumerate() {
        if out.script_pubkey.solve() == TxoutType::DeadpoolAnnounce {
            anns.push(LocatedAnnouncement {
                locator: OutPoint::new(txid, i as u32),
                announcement: Announce::new(out.clone(), height),
            });
        }
    }

    anns
}

/// Collects the deadpool ids announced by a list of outputs. Returns
/// whether any announcement was present.
pub fn extract_deadpool_announce_ids(outs: &[TxOut], ids: &mut UniqueDeadpoolIds) -> bool {
    let mut found = false;
    for out in outs {
        if is_deadpool_announcement(out) {
            found = true;
            ids.insert(Announce::new(out.clone(), 0).n_hash());
        }
    }
    found
}

/// Collects the deadpool ids targeted by a list of entry outputs.
/// Returns whether any entry was present.
pub fn extract_deadpool_entry_ids(outs: &[TxOut], ids: &mut UniqueDeadpoolIds) -> bool {
    let mut found = false;
    for out in outs {
        if is_deadpool_entry(out) {
            found = true;
            ids.insert(get_entry_n_hash(out));
        }
    }
    found
}

#[must_use]
pub fn is_deadpool_entry(out: &TxOut) -> bool {
    out.script_pubkey.solve() == TxoutType::DeadpoolEntry
}

#[must_use]
pub fn is_deadpool_announcement(out: &TxOut) -> bool {
    out.script_pubkey.solve() == TxoutType::DeadpoolAnnounce
}

/// The raw target bytes of an entry output
#[must_use]
pub fn get_entry_n(out: &TxOut) -> Option<Vec<u8>> {
    out.script_pubkey.first_push()
}

/// Deadpool id of an entry output, the zero hash when there is no
/// pushed target.
#[must_use]
pub fn get_entry_n_hash(out: &TxOut) -> Hash256 {
    match get_entry_n(out) {
        Some(n) => hash_n_value(&n),
        None => Hash256::zero(),
    }
}

/// The claim hash a spending input commits to, the zero hash when the
/// first push is not 32 bytes.
#[must_use]
pub fn get_claim_hash_from_script_sig(input: &TxIn) -> Hash256 {
    match input.script_sig.pushes_only().as_deref() {
        Some([first, ..]) if first.len() == 32 => Hash256::from(first.clone()),
        _ => Hash256::zero(),
    }
}

/// The solution revealed by a spending input
#[must_use]
pub fn get_solution_from_script_sig(input: &TxIn) -> ScriptBignum {
    match input.script_sig.pushes_only().as_deref() {
        Some([_, second, ..]) => ScriptBignum::from_bytes(second),
        _ => ScriptBignum::from_bytes(&[0x80]),
    }
}

/// Consensus checks over the integers carried by deadpool outputs.
/// Non-deadpool outputs pass unconditionally.
pub fn check_txout_deadpool_integers(out: &TxOut) -> Result<(), BigNumCheckErr> {
    let entry_n = match out.script_pubkey.solve() {
        TxoutType::DeadpoolEntry => get_entry_n(out),
        TxoutType::DeadpoolAnnounce => Announce::new(out.clone(), 0).read_n(),
        _ => return Ok(()),
    };

    match entry_n {
        Some(n) => check_deadpool_integer_bytes(&n, true),
        None => Err(BigNumCheckErr::Zero),
    }
}

/// Builds the output script of a deadpool entry for a target.
#[must_use]
pub fn deadpool_entry_script(n: &ScriptBignum) -> Script {
    use crate::vm::Op;
    let mut script = Script::new();
    script
        .push_data(&n.serialize())
        .push_op(Op::CheckDivVerify)
        .push_op(Op::Drop)
        .push_op(Op::AnnounceVerify)
        .push_op(Op::Drop)
        .push_op(Op::Drop)
        .push_op(Op::True);
    script
}

/// Builds the output script of a claim announcement.
#[must_use]
pub fn deadpool_announce_script(n: &ScriptBignum, claim_hash: &Hash256) -> Script {
    use crate::vm::Op;
    let mut script = Script::new();
    script
        .push_op(Op::Announce)
        .push_data(claim_hash.as_bytes())
        .push_data(&n.serialize());
    script
}

/// Assembles an unsigned claim transaction spending the given entry
/// outpoints to `claim_script`, with the fee taken from the bounty.
#[must_use]
pub fn create_claim_tx(
    entries: &[OutPoint],
    total_value: Money,
    solution: &ScriptBignum,
    claim_script: &Script,
    fee_rate: Money,
) -> Transaction {
    let claim_hash = make_claim_hash(solution, claim_script);

    let mut script_sig = Script::new();
    script_sig
        .push_data(claim_hash.as_bytes())
        .push_data(&solution.serialize());

    let mut tx = Transaction::default();
    for entry in entries {
        tx.inputs.push(TxIn::new(*entry, script_sig.clone()));
    }

    // size of the claim output on top of the inputs: script, its
    // length prefix, the amount and the locktime
    let tx_size = tx.wire_size() + claim_script.as_bytes().len() + 1 + 8 + 4;

    let amount_after_fee = total_value - tx_size as Money * fee_rate;
    tx.outputs
        .push(TxOut::new(amount_after_fee, claim_script.clone()));

    tx
}

/// A canonical-width target divisible by 11, large enough to pass the
/// entry template and the integer range checks.
#[cfg(test)]
pub(crate) fn make_test_target() -> ScriptBignum {
    let k = (rug::Integer::from(1) << 160) / 11 + 1;
    ScriptBignum::from_integer(k * 11)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Op;

    fn valid_n_bytes() -> Vec<u8> {
        hex::decode("000000000000000000000000000000000000013f").unwrap()
    }

    fn valid_n_hash() -> Hash256 {
        Hash256::from(
            hex::decode("cadb7d0d071506edc955a377b26875136bd74bbaa48eb85bf3f090dfeddb17b3")
                .unwrap(),
        )
    }

    fn entry_out(n: &[u8]) -> TxOut {
        let mut script = Script::new();
        script
            .push_data(n)
            .push_op(Op::CheckDivVerify)
            .push_op(Op::Drop)
            .push_op(Op::AnnounceVerify)
            .push_op(Op::Drop)
            .push_op(Op::Drop)
            .push_op(Op::True);
        TxOut::new(1000, script)
    }

    #[test]
    fn entry_recognition_and_id() {
        let out = entry_out(&valid_n_bytes());
        assert_eq!(
            out.script_pubkey.to_hex(),
            "14000000000000000000000000000000000000013fb975b8757551"
        );
        assert!(is_deadpool_entry(&out));
        assert_eq!(hash_n_value(&valid_n_bytes()), valid_n_hash());
        assert_eq!(get_entry_n_hash(&out), valid_n_hash());

        let mut ids = UniqueDeadpoolIds::new();
        assert!(extract_deadpool_entry_ids(&[out], &mut ids));
        assert!(ids.contains(&valid_n_hash()));
    }

    #[test]
    fn extra_padding_keeps_the_same_id() {
        // two leading zero bytes more than needed still match the
        // template, and the id hashes the raw push
        let padded = hex::decode("0000000000000000000000000000000000000000013f").unwrap();
        let out = entry_out(&padded);
        assert!(is_deadpool_entry(&out));
        assert_eq!(hash_n_value(&padded), valid_n_hash());
        assert_eq!(get_entry_n_hash(&out), valid_n_hash());
    }

    #[test]
    fn entry_without_push_is_rejected() {
        let mut script = Script::new();
        script
            .push_op(Op::CheckDivVerify)
            .push_op(Op::Drop)
            .push_op(Op::AnnounceVerify)
            .push_op(Op::Drop)
            .push_op(Op::Drop)
            .push_op(Op::True);
        let out = TxOut::new(1000, script);
        assert!(!is_deadpool_entry(&out));

        let mut ids = UniqueDeadpoolIds::new();
        assert!(!extract_deadpool_entry_ids(&[out], &mut ids));
        assert!(ids.is_empty());
    }

    #[test]
    fn underpadded_entry_is_rejected_but_hashes_alike() {
        let unpadded = hex::decode("013f").unwrap();
        let out = entry_out(&unpadded);
        assert!(!is_deadpool_entry(&out));
        assert_eq!(hash_n_value(&unpadded), valid_n_hash());
    }

    #[test]
    fn announcement_recognition() {
        let claim_hash = Hash256::from(
            hex::decode("0100000000000000000000000000000000000000000000000000000000000001")
                .unwrap(),
        );
        let n = ScriptBignum::from_bytes(&valid_n_bytes());
        let script = deadpool_announce_script(&n, &claim_hash);

        // canonical serialization drops the padding, the id differs
        // from the padded entry id accordingly; announce with the raw
        // bytes to match
        let mut raw_script = Script::new();
        raw_script
            .push_op(Op::Announce)
            .push_data(claim_hash.as_bytes())
            .push_data(&valid_n_bytes());

        assert!(script.is_unspendable());
        assert!(raw_script.is_unspendable());
        assert_eq!(raw_script.solve(), TxoutType::DeadpoolAnnounce);

        let out = TxOut::new(1000, raw_script);
        assert!(is_deadpool_announcement(&out));

        let ann = Announce::new(out.clone(), 1);
        assert_eq!(ann.claim_hash(), claim_hash);
        assert_eq!(ann.read_n().unwrap(), valid_n_bytes());
        assert_eq!(ann.n_hash(), valid_n_hash());
        assert_eq!(ann.compact(), (valid_n_hash(), claim_hash));

        let mut ids = UniqueDeadpoolIds::new();
        assert!(extract_deadpool_announce_ids(&[out], &mut ids));
        assert!(ids.contains(&valid_n_hash()));
    }

    #[test]
    fn extract_announcements_locates_outputs() {
        let claim_hash = Hash256::hash_from_slice(b"claim");
        let n = ScriptBignum::from_bytes(&valid_n_bytes());

        let mut tx = Transaction::default();
        tx.outputs.push(TxOut::new(500, Script::new()));
        tx.outputs
            .push(TxOut::new(1_000_000, deadpool_announce_script(&n, &claim_hash)));

        let anns = extract_announcements(&tx, 42);
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].locator, OutPoint::new(tx.txid(), 1));
        assert_eq!(anns[0].announcement.height, 42);
        assert_eq!(anns[0].announcement.claim_hash(), claim_hash);
    }

    #[test]
    fn script_sig_accessors() {
        let solution = ScriptBignum::from_i64(11);
        let claim_hash = Hash256::hash_from_slice(b"claim");

        let mut script_sig = Script::new();
        script_sig
            .push_data(claim_hash.as_bytes())
            .push_data(&solution.serialize());

        let input = TxIn::new(OutPoint::new(Hash256::zero(), 0), script_sig);
        assert_eq!(get_claim_hash_from_script_sig(&input), claim_hash);
        assert_eq!(get_solution_from_script_sig(&input), solution);

        // short first push yields the zero hash
        let mut bad_sig = Script::new();
        bad_sig.push_data(&[1, 2, 3]);
        let bad_input = TxIn::new(OutPoint::new(Hash256::zero(), 0), bad_sig);
        assert_eq!(get_claim_hash_from_script_sig(&bad_input), Hash256::zero());
    }

    #[test]
    fn txout_integer_checks() {
        let out = entry_out(&valid_n_bytes());
        // padded 319 is non-canonical and far too small
        assert!(check_txout_deadpool_integers(&out).is_err());

        let n = ScriptBignum::from_integer(rug::Integer::from(1) << 229);
        let good = TxOut::new(1000, deadpool_entry_script(&n));
        assert!(check_txout_deadpool_integers(&good).is_ok());

        // unrelated outputs pass
        assert!(check_txout_deadpool_integers(&TxOut::new(1, Script::new())).is_ok());
    }

    #[test]
    fn claim_tx_spends_entries_to_destination() {
        let solution = ScriptBignum::from_i64(11);
        let mut claim_script = Script::new();
        claim_script.push_op(Op::Zero).push_data(&[7u8; 20]);

        let entries = vec![
            OutPoint::new(Hash256::hash_from_slice(b"a"), 0),
            OutPoint::new(Hash256::hash_from_slice(b"b"), 1),
        ];

        let tx = create_claim_tx(&entries, 100_000, &solution, &claim_script, 10);

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].script_pubkey, claim_script);
        assert!(tx.outputs[0].value < 100_000);
        assert_eq!(
            get_claim_hash_from_script_sig(&tx.inputs[0]),
            make_claim_hash(&solution, &claim_script)
        );
        assert_eq!(get_solution_from_script_sig(&tx.inputs[1]), solution);
    }
}
