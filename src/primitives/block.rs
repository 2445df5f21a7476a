// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::Network;
use crate::primitives::{Hash256, OutPoint, TxIn, TxOut, Transaction, U1024};
use crate::primitives::transaction::{read_compact_size, write_compact_size, TxDecodeErr};
use crate::vm::opcodes::OP_CHECKSIG;
use crate::vm::Script;
use bincode::{Decode, Encode};
use std::io::{self, Read, Write};

/// Serialized header size on the wire
pub const HEADER_WIRE_SIZE: usize = 218;

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
/// Header of a factoring proof-of-work block.
///
/// `bits` declares the bit size of the semiprime submitted for this
/// block; it is a small integer, not a compact difficulty target.
/// `w_offset` displaces the semiprime from the seed derived by the pow
/// hash and `p1` reveals its smaller prime factor.
pub struct BlockHeader {
    /// Block version
    pub version: i32,

    /// Previous block hash
    pub prev_hash: Hash256,

    /// Merkle root over the block transactions
    pub merkle_root: Hash256,

    /// Block timestamp
    pub time: u32,

    /// Bit size of the submitted semiprime
    pub bits: u16,

    /// Miner nonce
    pub nonce: u64,

    /// Signed displacement of the semiprime from the derived seed
    pub w_offset: i64,

    /// Smaller prime factor of the semiprime
    pub p1: U1024,
}

impl BlockHeader {
    /// Header hash: double sha256 over the wire encoding
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        Hash256::hash_from_slice_double(self.to_wire_bytes())
    }

    #[must_use]
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_WIRE_SIZE);
        self.write_wire(&mut out).expect("vec write");
        debug_assert_eq!(out.len(), HEADER_WIRE_SIZE);
        out
    }

    pub fn write_wire<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.prev_hash.0)?;
        writer.write_all(&self.merkle_root.0)?;
        writer.write_all(&self.time.to_le_bytes())?;
        writer.write_all(&self.bits.to_le_bytes())?;
        writer.write_all(&self.nonce.to_le_bytes())?;
        writer.write_all(&self.w_offset.to_le_bytes())?;
        writer.write_all(&self.p1.0)
    }

    pub fn read_wire<R: Read>(reader: &mut R) -> Result<Self, TxDecodeErr> {
        let mut read_exact = |buf: &mut [u8]| {
            reader
                .read_exact(buf)
                .map_err(|_| TxDecodeErr::UnexpectedEof)
        };

        let mut version = [0u8; 4];
        read_exact(&mut version)?;
        let mut prev_hash = [0u8; 32];
        read_exact(&mut prev_hash)?;
        let mut merkle_root = [0u8; 32];
        read_exact(&mut merkle_root)?;
        let mut time = [0u8; 4];
        read_exact(&mut time)?;
        let mut bits = [0u8; 2];
        read_exact(&mut bits)?;
        let mut nonce = [0u8; 8];
        read_exact(&mut nonce)?;
        let mut w_offset = [0u8; 8];
        read_exact(&mut w_offset)?;
        let mut p1 = [0u8; 128];
        read_exact(&mut p1)?;

        Ok(Self {
            version: i32::from_le_bytes(version),
            prev_hash: Hash256(prev_hash),
            merkle_root: Hash256(merkle_root),
            time: u32::from_le_bytes(time),
            bits: u16::from_le_bytes(bits),
            nonce: u64::from_le_bytes(nonce),
            w_offset: i64::from_le_bytes(w_offset),
            p1: U1024(p1),
        })
    }

    /// Increment nonce. Returns `None` if the nonce overflows.
    pub fn increment_nonce(&mut self) -> Option<u64> {
        self.nonce = self.nonce.checked_add(1)?;
        Some(self.nonce)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Merkle root over the transaction ids, pairwise double sha256
    /// with the last node duplicated on odd levels.
    #[must_use]
    pub fn compute_merkle_root(&self) -> Hash256 {
        let mut level: Vec<Hash256> = self.txs.iter().map(Transaction::txid).collect();

        if level.is_empty() {
            return Hash256::zero();
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                let concat = [pair[0].0.as_slice(), right.0.as_slice()].concat();
                next.push(Hash256::hash_from_slice_double(concat));
            }
            level = next;
        }

        level[0]
    }

    #[must_use]
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.header.write_wire(&mut out).expect("vec write");
        write_compact_size(&mut out, self.txs.len() as u64).expect("vec write");
        for tx in &self.txs {
            tx.write_wire(&mut out).expect("vec write");
        }
        out
    }

    pub fn read_wire<R: Read>(reader: &mut R) -> Result<Self, TxDecodeErr> {
        let header = BlockHeader::read_wire(reader)?;
        let count = read_compact_size(reader)?;
        if count > 1_000_000 {
            return Err(TxDecodeErr::OversizedCount);
        }
        let mut txs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            txs.push(Transaction::read_wire(reader)?);
        }
        Ok(Self { header, txs })
    }
}

const GENESIS_TIMESTAMP: &str =
    "The Times 4/20/2022 Russia Strikes Hard as It Pushes to Seize Donbas Region";

const GENESIS_OUTPUT_KEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

/// Builds the genesis block for the given network.
#[must_use]
pub fn genesis_block(network: Network) -> Block {
    let (time, nonce, bits, version, w_offset, p1_hex) = match network {
        Network::Mainnet => (
            1_650_449_340,
            4_081_969_520,
            230,
            0,
            2375,
            "0x5b541e0fc53ad9c40daa99c31c17b",
        ),
        Network::Testnet => (
            1_650_442_708,
            4_143_631_544,
            210,
            0,
            -2813,
            "0x166ad939aed84a268f7c2ae4f5d",
        ),
        Network::Signet => (1_640_995_299, 52_613_770, 33, 1, 0, "0x0"),
        Network::Regtest => (1_650_443_545, 2_706_135_317, 32, 0, 254, "0xb5ff"),
    };

    let mut script_sig = Script::new();
    script_sig
        .push_data(&486_604_799_u32.to_le_bytes())
        .push_data(&[4])
        .push_data(GENESIS_TIMESTAMP.as_bytes());

    let mut output_script = Script::new();
    output_script.push_data(&hex::decode(GENESIS_OUTPUT_KEY).expect("genesis key hex"));
    output_script.0.push(OP_CHECKSIG);

    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxIn {
            prevout: OutPoint::new(Hash256::zero(), u32::MAX),
            script_sig,
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut::new(0, output_script)],
        lock_time: 0,
    };

    let mut block = Block {
        header: BlockHeader {
            version,
            prev_hash: Hash256::zero(),
            merkle_root: Hash256::zero(),
            time,
            bits,
            nonce,
            w_offset,
            p1: U1024::from_hex_be(p1_hex).expect("genesis p1 hex"),
        },
        txs: vec![coinbase],
    };

    block.header.merkle_root = block.compute_merkle_root();
    block
}
