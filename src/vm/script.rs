// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::primitives::Hash256;
use crate::vm::bignum::ScriptBignum;
use crate::vm::opcodes::{Op, OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4};
use bincode::{Decode, Encode};
use rug::Integer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Max size of a single pushed element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Max script size in bytes
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Max stack size during execution
pub const MAX_STACK_SIZE: usize = 1_000;

/// Smallest push accepted as a deadpool entry target, the byte size of
/// the minimum deadpool integer.
pub const DEADPOOL_MIN_ENTRY_BYTES: usize = 20;

#[derive(PartialEq, Eq, Clone, Default, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

#[derive(PartialEq, Debug, Clone)]
pub enum ScriptEntry {
    /// Data push
    Push(Vec<u8>),

    /// Known opcode
    Op(Op),

    /// Opcode byte without an assigned meaning
    Unknown(u8),
}

/// Standard output script templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxoutType {
    /// A deadpool bounty entry
    DeadpoolEntry,

    /// A deadpool claim announcement, provably unspendable
    DeadpoolAnnounce,

    /// Witness program: 20 byte key hash
    WitnessV0KeyHash,

    /// Data carrier
    NullData,

    NonStandard,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, &'static str> {
        Ok(Self(hex::decode(hex_str).map_err(|_| "invalid hex")?))
    }

    /// Appends a minimally encoded data push
    pub fn push_data(&mut self, data: &[u8]) -> &mut Self {
        match data.len() {
            0 => self.0.push(Op::Zero.to_byte()),
            len if len < OP_PUSHDATA1 as usize => {
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len if len <= 0xff => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
                self.0.extend_from_slice(data);
            }
            len if len <= 0xffff => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            len => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        self
    }

    pub fn push_op(&mut self, op: Op) -> &mut Self {
        self.0.push(op.to_byte());
        self
    }

    /// Whether the script can never be spent. Data carriers and
    /// announcement outputs qualify, as does anything oversized.
    #[must_use]
    pub fn is_unspendable(&self) -> bool {
        (!self.0.is_empty()
            && (self.0[0] == Op::Return.to_byte() || self.0[0] == Op::Announce.to_byte()))
            || self.0.len() > MAX_SCRIPT_SIZE
    }

    /// Tokenizes the script. Fails on truncated pushes or oversized
    /// scripts.
    pub fn parse(&self) -> Result<Vec<ScriptEntry>, ScriptErr> {
        if self.0.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptErr::ScriptSize);
        }

        let mut entries = Vec::new();
        let mut i = 0;
        let bytes = &self.0;

        while i < bytes.len() {
            let byte = bytes[i];
            i += 1;

            let push_len = match byte {
                b if b > 0 && b < OP_PUSHDATA1 => Some(b as usize),
                OP_PUSHDATA1 => {
                    if i >= bytes.len() {
                        return Err(ScriptErr::BadPush);
                    }
                    let len = bytes[i] as usize;
                    i += 1;
                    Some(len)
                }
                OP_PUSHDATA2 => {
                    if i + 2 > bytes.len() {
                        return Err(ScriptErr::BadPush);
                    }
                    let len = u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
                    i += 2;
                    Some(len)
                }
                OP_PUSHDATA4 => {
                    if i + 4 > bytes.len() {
                        return Err(ScriptErr::BadPush);
                    }
                    let len =
                        u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
                            as usize;
                    i += 4;
                    Some(len)
                }
                _ => None,
            };

            match push_len {
                Some(len) => {
                    if i + len > bytes.len() {
                        return Err(ScriptErr::BadPush);
                    }
                    entries.push(ScriptEntry::Push(bytes[i..i + len].to_vec()));
                    i += len;
                }
                None => match Op::from_byte(byte) {
                    Some(op) => entries.push(ScriptEntry::Op(op)),
                    None => entries.push(ScriptEntry::Unknown(byte)),
                },
            }
        }

        Ok(entries)
    }

    /// Matches the script against the standard templates.
    #[must_use]
    pub fn solve(&self) -> TxoutType {
        let Ok(entries) = self.parse() else {
            return TxoutType::NonStandard;
        };

        use ScriptEntry::{Op as E, Push};

        match entries.as_slice() {
            [Push(n), E(Op::CheckDivVerify), E(Op::Drop), E(Op::AnnounceVerify), E(Op::Drop), E(Op::Drop), E(Op::True)]
                if n.len() >= DEADPOOL_MIN_ENTRY_BYTES && n.len() <= MAX_SCRIPT_ELEMENT_SIZE =>
            {
                TxoutType::DeadpoolEntry
            }

            [E(Op::Announce), Push(claim_hash), Push(n)]
                if claim_hash.len() == 32 && !n.is_empty() && n.len() <= MAX_SCRIPT_ELEMENT_SIZE =>
            {
                TxoutType::DeadpoolAnnounce
            }

            [E(Op::Zero), Push(program)] if program.len() == 20 => TxoutType::WitnessV0KeyHash,

            [E(Op::Return), ..] => TxoutType::NullData,

            _ => TxoutType::NonStandard,
        }
    }

    /// The first pushed element, if any. Deadpool entries carry their
    /// target there.
    #[must_use]
    pub fn first_push(&self) -> Option<Vec<u8>> {
        match self.parse().ok()?.into_iter().next()? {
            ScriptEntry::Push(data) => Some(data),
            _ => None,
        }
    }

    /// All pushed elements in order, `None` if any entry is not a push.
    #[must_use]
    pub fn pushes_only(&self) -> Option<Vec<Vec<u8>>> {
        let entries = self.parse().ok()?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            match e {
                ScriptEntry::Push(data) => out.push(data),
                ScriptEntry::Op(Op::Zero) => out.push(Vec::new()),
                _ => return None,
            }
        }
        Some(out)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Script").field(&self.to_hex()).finish()
    }
}

/// Read access to the consensus announcement database during script
/// execution. Injected so the executor runs without a chain.
pub trait AnnounceView {
    /// Whether a committed announcement exists for the given deadpool
    /// id and claim hash with an inclusion height inside
    /// `[min_height, max_height]`.
    fn claim_exists(
        &self,
        deadpool_id: &Hash256,
        claim_hash: &Hash256,
        min_height: i64,
        max_height: i64,
    ) -> bool;
}

/// Everything a claim spend needs from its surroundings: the height
/// the spend validates at, the destination script of the spending
/// transaction and the announcement window parameters.
pub struct ScriptExecContext<'a> {
    pub tip_height: i64,
    pub claim_script: &'a Script,
    pub announces: &'a dyn AnnounceView,
    pub announce_maturity: i64,
    pub announce_validity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErr {
    /// Script exceeds the size limit
    ScriptSize,

    /// Truncated or oversized push
    BadPush,

    /// Unassigned opcode executed
    BadOpcode,

    /// Execution of an unspendable script
    Unspendable,

    /// Stack under- or overflow
    InvalidStackOperation,

    /// The script sig of a claim may only push data
    SigPushOnly,

    /// Final stack evaluates to false
    EvalFalse,

    /// Pushed integer failed to decode
    InvalidBigNum,

    /// Divisor is zero
    DivisorZero,

    /// The revealed factor does not divide the target
    NotADivisor,

    /// Factor out of the canonical range `1 < p <= N/p`
    FactorOutOfOrder,

    /// The revealed solution and destination do not hash to the
    /// committed claim hash
    ClaimHashMismatch,

    /// No matured, unexpired announcement matches the claim
    NoAnnouncement,
}

impl ScriptErr {
    /// Reject reason as reported through validation state
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ScriptSize => "script-size",
            Self::BadPush => "bad-push",
            Self::BadOpcode => "bad-opcode",
            Self::Unspendable => "unspendable-script",
            Self::InvalidStackOperation => "invalid-stack-operation",
            Self::SigPushOnly => "scriptsig-not-pushonly",
            Self::EvalFalse => "script-eval-false",
            Self::InvalidBigNum => "bad-bigint-invalid-number",
            Self::DivisorZero => "OP_CHECKDIVVERIFY zero divisor",
            Self::NotADivisor => "OP_CHECKDIVVERIFY not a divisor",
            Self::FactorOutOfOrder => "OP_CHECKDIVVERIFY factor out of order",
            Self::ClaimHashMismatch => "OP_ANNOUNCEVERIFY Claim-Hash does not match",
            Self::NoAnnouncement => "deadpool-claim-no-announce",
        }
    }
}

/// The claim commitment: `sha256(sha256(p) || sha256(dest))` over the
/// canonical solution bytes and the destination output script.
#[must_use]
pub fn make_claim_hash(solution: &ScriptBignum, claim_script: &Script) -> Hash256 {
    let p_hash = Sha256::digest(solution.serialize());
    let script_hash = Sha256::digest(claim_script.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(p_hash);
    hasher.update(script_hash);

    let mut out = Hash256::zero();
    out.0.copy_from_slice(&hasher.finalize());
    out
}

fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != 0 {
            // negative zero counts as false
            if i == bytes.len() - 1 && *byte == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}

/// Verifies the spend of a deadpool entry output.
///
/// The script sig must push the claim hash and the solution; the
/// entry script then runs with the committed target, the divisibility
/// check and the announcement check against the injected view.
pub fn verify_claim_spend(
    script_sig: &Script,
    script_pubkey: &Script,
    ctx: &ScriptExecContext,
) -> Result<(), ScriptErr> {
    if script_pubkey.is_unspendable() {
        return Err(ScriptErr::Unspendable);
    }

    let mut stack: Vec<Vec<u8>> = script_sig.pushes_only().ok_or(ScriptErr::SigPushOnly)?;

    let entry_n = script_pubkey.first_push();
    let entries = script_pubkey.parse()?;

    for entry in &entries {
        step(entry, &mut stack, entry_n.as_deref(), ctx)?;

        if stack.len() > MAX_STACK_SIZE {
            return Err(ScriptErr::InvalidStackOperation);
        }
    }

    match stack.last() {
        Some(top) if cast_to_bool(top) => Ok(()),
        _ => Err(ScriptErr::EvalFalse),
    }
}

fn step(
    entry: &ScriptEntry,
    stack: &mut Vec<Vec<u8>>,
    entry_n: Option<&[u8]>,
    ctx: &ScriptExecContext,
) -> Result<(), ScriptErr> {
    match entry {
        ScriptEntry::Push(data) => {
            if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                return Err(ScriptErr::BadPush);
            }
            stack.push(data.clone());
            Ok(())
        }

        ScriptEntry::Op(Op::Zero) => {
            stack.push(Vec::new());
            Ok(())
        }

        ScriptEntry::Op(Op::True) => {
            stack.push(vec![1]);
            Ok(())
        }

        ScriptEntry::Op(Op::Drop) => {
            stack.pop().ok_or(ScriptErr::InvalidStackOperation)?;
            Ok(())
        }

        ScriptEntry::Op(Op::Dup) => {
            let top = stack.last().ok_or(ScriptErr::InvalidStackOperation)?.clone();
            stack.push(top);
            Ok(())
        }

        ScriptEntry::Op(Op::Return) | ScriptEntry::Op(Op::Announce) => Err(ScriptErr::Unspendable),

        ScriptEntry::Op(Op::CheckDivVerify) => exec_checkdiv(stack),

        ScriptEntry::Op(Op::AnnounceVerify) => exec_announce_verify(stack, entry_n, ctx),

        ScriptEntry::Unknown(_) => Err(ScriptErr::BadOpcode),
    }
}

/// `<p> <N> OP_CHECKDIVVERIFY` passes iff `p != 0`, `N mod p == 0` and
/// `1 < p <= N/p`. The stack is left untouched.
fn exec_checkdiv(stack: &[Vec<u8>]) -> Result<(), ScriptErr> {
    if stack.len() < 2 {
        return Err(ScriptErr::InvalidStackOperation);
    }

    let n = ScriptBignum::from_bytes(&stack[stack.len() - 1]);
    let p = ScriptBignum::from_bytes(&stack[stack.len() - 2]);

    if !n.is_valid() || !p.is_valid() {
        return Err(ScriptErr::InvalidBigNum);
    }

    if p == 0 {
        return Err(ScriptErr::DivisorZero);
    }

    if n.modulus(&p) != 0 {
        return Err(ScriptErr::NotADivisor);
    }

    // factor ordering matches the proof of work rule
    let quotient = Integer::from(n.inner() / p.inner());
    if !(p > 1 && *p.inner() <= quotient) {
        return Err(ScriptErr::FactorOutOfOrder);
    }

    Ok(())
}

/// `<claimHash> <p> OP_ANNOUNCEVERIFY` passes iff the claim hash
/// recomputed from the revealed solution and the spending destination
/// matches the committed one, and the announcement database holds a
/// matching record whose height is at least `maturity` and at most
/// `validity` confirmations old. The stack is left untouched.
fn exec_announce_verify(
    stack: &[Vec<u8>],
    entry_n: Option<&[u8]>,
    ctx: &ScriptExecContext,
) -> Result<(), ScriptErr> {
    if stack.len() < 2 {
        return Err(ScriptErr::InvalidStackOperation);
    }

    let claim_hash_bytes = &stack[stack.len() - 2];
    if claim_hash_bytes.len() != 32 {
        return Err(ScriptErr::ClaimHashMismatch);
    }
    let claim_hash = Hash256::from(claim_hash_bytes.clone());

    let solution = ScriptBignum::from_bytes(&stack[stack.len() - 1]);
    if !solution.is_valid() {
        return Err(ScriptErr::InvalidBigNum);
    }

    if make_claim_hash(&solution, ctx.claim_script) != claim_hash {
        return Err(ScriptErr::ClaimHashMismatch);
    }

    let entry_n = entry_n.ok_or(ScriptErr::InvalidStackOperation)?;
    let deadpool_id = Hash256::hash_from_slice(entry_n);

    let min_height = ctx.tip_height - ctx.announce_validity;
    let max_height = ctx.tip_height - ctx.announce_maturity;

    if !ctx
        .announces
        .claim_exists(&deadpool_id, &claim_hash, min_height, max_height)
    {
        return Err(ScriptErr::NoAnnouncement);
    }

    Ok(())
}
