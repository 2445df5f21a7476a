// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use bincode::{Decode, Encode};
use rug::integer::Order;
use rug::Integer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::Hash as HashTrait;

#[derive(
    PartialEq,
    Eq,
    Encode,
    Decode,
    Clone,
    HashTrait,
    PartialOrd,
    Ord,
    Default,
    Copy,
    Serialize,
    Deserialize,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn zero() -> Self {
        Self([0; 32])
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hash from big-endian hex, the display convention of
    /// block explorers and RPC.
    pub fn from_hex_be(hex_str: &str) -> Result<Self, &'static str> {
        let mut bytes = hex::decode(hex_str).map_err(|_| "invalid hex")?;
        if bytes.len() != 32 {
            return Err("invalid hash length");
        }
        bytes.reverse();
        let mut out = [0; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Renders the hash in the big-endian hex convention of RPC output.
    #[must_use]
    pub fn to_hex_be(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }

    /// Single sha256 of the given slice
    #[inline]
    pub fn hash_from_slice<T: AsRef<[u8]>>(slice: T) -> Self {
        let mut out_hash = Hash256([0; 32]);
        out_hash.0.copy_from_slice(&Sha256::digest(slice.as_ref()));
        out_hash
    }

    /// Double sha256 of the given slice, the identifier hash of blocks
    /// and transactions.
    #[inline]
    pub fn hash_from_slice_double<T: AsRef<[u8]>>(slice: T) -> Self {
        let first = Sha256::digest(slice.as_ref());
        let mut out_hash = Hash256([0; 32]);
        out_hash.0.copy_from_slice(&Sha256::digest(first));
        out_hash
    }
}

impl From<Vec<u8>> for Hash256 {
    fn from(v: Vec<u8>) -> Self {
        debug_assert_eq!(v.len(), 32);
        let mut h: Self = Default::default();
        h.0.copy_from_slice(&v);
        h
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash256").field(&self.to_hex()).finish()
    }
}

#[derive(
    PartialEq, Eq, Encode, Decode, Clone, HashTrait, PartialOrd, Ord, Copy, Debug, Serialize,
    Deserialize,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub n: u32,
}

impl OutPoint {
    #[must_use]
    pub fn new(txid: Hash256, n: u32) -> Self {
        Self { txid, n }
    }

    /// Fixed-width key bytes for database indexing: txid followed by
    /// the little-endian output index.
    #[must_use]
    pub fn to_key_bytes(&self) -> [u8; 36] {
        let mut out = [0; 36];
        out[..32].copy_from_slice(&self.txid.0);
        out[32..].copy_from_slice(&self.n.to_le_bytes());
        out
    }

    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.len() != 36 {
            return Err("invalid outpoint length");
        }
        let mut txid = [0; 32];
        txid.copy_from_slice(&bytes[..32]);
        let mut n = [0; 4];
        n.copy_from_slice(&bytes[32..]);
        Ok(Self {
            txid: Hash256(txid),
            n: u32::from_le_bytes(n),
        })
    }
}

/// Fixed 1024-bit little-endian buffer. Carries the small prime factor
/// in block headers and the truncated seed produced by the pow hash.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct U1024(pub [u8; 128]);

impl U1024 {
    #[must_use]
    pub fn zero() -> Self {
        Self([0; 128])
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_integer(&self) -> Integer {
        Integer::from_digits(&self.0, Order::Lsf)
    }

    /// Truncating import: only the low 1024 bits of `n` are stored.
    #[must_use]
    pub fn from_integer(n: &Integer) -> Self {
        let digits = n.to_digits::<u8>(Order::Lsf);
        let mut out = Self::zero();
        let take = std::cmp::min(digits.len(), 128);
        out.0[..take].copy_from_slice(&digits[..take]);
        out
    }

    /// Parses from big-endian hex with an optional `0x` prefix, the
    /// notation chain parameters are written in.
    pub fn from_hex_be(hex_str: &str) -> Result<Self, &'static str> {
        let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let padded = if trimmed.len() % 2 == 1 {
            format!("0{trimmed}")
        } else {
            trimmed.to_owned()
        };
        let mut bytes = hex::decode(padded).map_err(|_| "invalid hex")?;
        if bytes.len() > 128 {
            return Err("value does not fit in 1024 bits");
        }
        bytes.reverse();
        let mut out = Self::zero();
        out.0[..bytes.len()].copy_from_slice(&bytes);
        Ok(out)
    }

    /// Bit length of the contained integer, zero for zero.
    #[must_use]
    pub fn bits(&self) -> u32 {
        for (i, byte) in self.0.iter().enumerate().rev() {
            if *byte != 0 {
                return i as u32 * 8 + (8 - byte.leading_zeros());
            }
        }
        0
    }
}

impl Default for U1024 {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for U1024 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("U1024")
            .field(&self.to_integer().to_string_radix(16))
            .finish()
    }
}

impl Encode for U1024 {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> core::result::Result<(), bincode::error::EncodeError> {
        bincode::Encode::encode(&self.0, encoder)
    }
}

impl Decode for U1024 {
    fn decode<D: bincode::de::Decoder>(
        decoder: &mut D,
    ) -> core::result::Result<Self, bincode::error::DecodeError> {
        let v: [u8; 128] = bincode::Decode::decode(decoder)?;
        Ok(Self(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_single_empty() {
        assert_eq!(
            Hash256::hash_from_slice([]).to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash256_hex_be_roundtrip() {
        let h = Hash256::hash_from_slice(b"factorn");
        let hex_be = h.to_hex_be();
        assert_eq!(Hash256::from_hex_be(&hex_be).unwrap(), h);
    }

    #[test]
    fn u1024_integer_roundtrip() {
        let n = Integer::from(0x13f);
        let buf = U1024::from_integer(&n);
        assert_eq!(buf.to_integer(), n);
        assert_eq!(buf.bits(), 9);
    }

    #[test]
    fn u1024_from_hex() {
        let buf = U1024::from_hex_be("0xb5ff").unwrap();
        assert_eq!(buf.to_integer(), Integer::from(0xb5ff));
        assert_eq!(buf.0[0], 0xff);
        assert_eq!(buf.0[1], 0xb5);
    }

    #[test]
    fn u1024_bits_zero() {
        assert_eq!(U1024::zero().bits(), 0);
    }

    #[test]
    fn outpoint_key_roundtrip() {
        let op = OutPoint::new(Hash256::hash_from_slice(b"tx"), 7);
        let key = op.to_key_bytes();
        assert_eq!(OutPoint::from_key_bytes(&key).unwrap(), op);
    }
}
