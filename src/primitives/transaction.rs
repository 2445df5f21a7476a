// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::Money;
use crate::primitives::{Hash256, OutPoint};
use crate::vm::Script;
use bincode::{Decode, Encode};
use std::io::{self, Read, Write};

pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub struct TxOut {
    pub value: Money,
    pub script_pubkey: Script,
}

impl TxOut {
    #[must_use]
    pub fn new(value: Money, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    #[must_use]
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Encode, Decode)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }
}

impl Transaction {
    /// Transaction id: double sha256 over the wire encoding
    #[must_use]
    pub fn txid(&self) -> Hash256 {
        Hash256::hash_from_slice_double(self.to_wire_bytes())
    }

    #[must_use]
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_size());
        self.write_wire(&mut out).expect("vec write");
        out
    }

    #[must_use]
    pub fn wire_size(&self) -> usize {
        let mut size = 4 + 4;
        size += compact_size_len(self.inputs.len() as u64);
        for input in &self.inputs {
            size += 36 + compact_size_len(input.script_sig.0.len() as u64);
            size += input.script_sig.0.len() + 4;
        }
        size += compact_size_len(self.outputs.len() as u64);
        for output in &self.outputs {
            size += 8 + compact_size_len(output.script_pubkey.0.len() as u64);
            size += output.script_pubkey.0.len();
        }
        size
    }

    pub fn write_wire<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.version.to_le_bytes())?;

        write_compact_size(writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            writer.write_all(&input.prevout.txid.0)?;
            writer.write_all(&input.prevout.n.to_le_bytes())?;
            write_compact_size(writer, input.script_sig.0.len() as u64)?;
            writer.write_all(&input.script_sig.0)?;
            writer.write_all(&input.sequence.to_le_bytes())?;
        }

        write_compact_size(writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            writer.write_all(&output.value.to_le_bytes())?;
            write_compact_size(writer, output.script_pubkey.0.len() as u64)?;
            writer.write_all(&output.script_pubkey.0)?;
        }

        writer.write_all(&self.lock_time.to_le_bytes())
    }

    pub fn read_wire<R: Read>(reader: &mut R) -> Result<Self, TxDecodeErr> {
        let version = i32::from_le_bytes(read_array(reader)?);

        let input_count = read_compact_size(reader)?;
        if input_count > 100_000 {
            return Err(TxDecodeErr::OversizedCount);
        }
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let txid = Hash256(read_array(reader)?);
            let n = u32::from_le_bytes(read_array(reader)?);
            let script_sig = Script(read_sized_vec(reader)?);
            let sequence = u32::from_le_bytes(read_array(reader)?);
            inputs.push(TxIn {
                prevout: OutPoint { txid, n },
                script_sig,
                sequence,
            });
        }

        let output_count = read_compact_size(reader)?;
        if output_count > 100_000 {
            return Err(TxDecodeErr::OversizedCount);
        }
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            let value = Money::from_le_bytes(read_array(reader)?);
            let script_pubkey = Script(read_sized_vec(reader)?);
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }

        let lock_time = u32::from_le_bytes(read_array(reader)?);

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_wire_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, TxDecodeErr> {
        let bytes = hex::decode(hex_str).map_err(|_| TxDecodeErr::InvalidHex)?;
        let mut cursor = bytes.as_slice();
        let tx = Self::read_wire(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(TxDecodeErr::TrailingBytes);
        }
        Ok(tx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDecodeErr {
    /// Not valid hex
    InvalidHex,

    /// Truncated input
    UnexpectedEof,

    /// Element count exceeds sanity limit
    OversizedCount,

    /// Bytes left over after decoding
    TrailingBytes,
}

fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], TxDecodeErr> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|_| TxDecodeErr::UnexpectedEof)?;
    Ok(buf)
}

fn read_sized_vec<R: Read>(reader: &mut R) -> Result<Vec<u8>, TxDecodeErr> {
    let len = read_compact_size(reader)?;
    if len > 1_000_000 {
        return Err(TxDecodeErr::OversizedCount);
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|_| TxDecodeErr::UnexpectedEof)?;
    Ok(buf)
}

pub(crate) fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub(crate) fn write_compact_size<W: Write>(writer: &mut W, n: u64) -> io::Result<()> {
    match n {
        0..=0xfc => writer.write_all(&[n as u8]),
        0xfd..=0xffff => {
            writer.write_all(&[0xfd])?;
            writer.write_all(&(n as u16).to_le_bytes())
        }
        0x10000..=0xffff_ffff => {
            writer.write_all(&[0xfe])?;
            writer.write_all(&(n as u32).to_le_bytes())
        }
        _ => {
            writer.write_all(&[0xff])?;
            writer.write_all(&n.to_le_bytes())
        }
    }
}

pub(crate) fn read_compact_size<R: Read>(reader: &mut R) -> Result<u64, TxDecodeErr> {
    let first: [u8; 1] = read_array(reader)?;
    Ok(match first[0] {
        0xfd => u16::from_le_bytes(read_array(reader)?) as u64,
        0xfe => u32::from_le_bytes(read_array(reader)?) as u64,
        0xff => u64::from_le_bytes(read_array(reader)?),
        b => b as u64,
    })
}
