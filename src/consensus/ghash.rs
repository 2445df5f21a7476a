// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::params::ChainParams;
use crate::primitives::{BlockHeader, U1024};
use blake2::Blake2b512;
use rug::integer::Order;
use rug::Integer;
use scrypt::{scrypt, Params as ScryptParams};
use sha2::Digest;
use sha3::Sha3_512;
use whirlpool::Whirlpool;

/// scrypt cost parameters: N = 2^12, r = 2, p = 1, roughly 1 MiB of
/// scratch memory per derivation. For reference, Litecoin runs
/// N = 1024, r = 1, p = 1.
const SCRYPT_LOG_N: u8 = 12;
const SCRYPT_R: u32 = 2;
const SCRYPT_P: u32 = 1;

/// Size of the derived seed buffer
const SEED_BYTES: usize = 256;

#[inline]
fn popcount(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| u64::from(b.count_ones())).sum()
}

/// Derives the deterministic seed `W` for a block header.
///
/// The header fields are split into an scrypt password (prev hash,
/// merkle root, nonce) and salt (version, bits, time). The derived
/// 2048-bit buffer is then stirred with a cocktail of digests selected
/// by popcounts and with modular inverses of integers read out of the
/// buffer itself, and finally truncated to exactly `bits` bits with
/// the top bit forced on.
///
/// Every step is fixed by consensus, including the digest write
/// geometry: the half updates write 64-byte digests over the leading
/// half of each 128-byte region and leave the tail bytes in place, and
/// the per-iteration selector popcount covers the leading 8 bytes of
/// the buffer only. The export scratch carries stale tail bytes
/// between iterations of a round. None of this may be normalized.
///
/// Pure and allocation-bounded; safe to call from multiple threads.
#[must_use]
pub fn ghash(header: &BlockHeader, params: &ChainParams) -> U1024 {
    debug_assert!(header.bits >= 8 && header.bits < 1024);

    ////////////////////////////////////////////////////
    // pass = hashPrevBlock + hashMerkleRoot + nNonce //
    // salt = nVersion      + nBits          + nTime  //
    ////////////////////////////////////////////////////
    let mut pass = [0u8; 72];
    pass[..32].copy_from_slice(&header.prev_hash.0);
    pass[32..64].copy_from_slice(&header.merkle_root.0);
    pass[64..].copy_from_slice(&header.nonce.to_le_bytes());

    let mut salt = [0u8; 10];
    salt[..4].copy_from_slice(&header.version.to_le_bytes());
    salt[4..6].copy_from_slice(&header.bits.to_le_bytes());
    salt[6..].copy_from_slice(&header.time.to_le_bytes());

    let scrypt_params =
        ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, SEED_BYTES).expect("scrypt parameters");

    let mut buf = [0u8; SEED_BYTES];
    scrypt(&pass, &salt, &scrypt_params, &mut buf).expect("scrypt output length");

    for _round in 0..params.hash_rounds {
        // Memory expensive re-derivation with the buffer as its own
        // password.
        let input = buf;
        scrypt(&input, &salt, &scrypt_params, &mut buf).expect("scrypt output length");

        // Hash each 1024-bit half with a digest selected by its
        // popcount parity.
        let pcnt_half1 = popcount(&buf[..128]);
        let pcnt_half2 = popcount(&buf[128..]);

        if pcnt_half1 % 2 == 0 {
            let digest = Blake2b512::digest(&buf[..128]);
            buf[..64].copy_from_slice(&digest);
        } else {
            let digest = Sha3_512::digest(&buf[..128]);
            buf[..64].copy_from_slice(&digest);
        }

        if pcnt_half2 % 2 == 0 {
            let digest = Blake2b512::digest(&buf[128..]);
            buf[128..192].copy_from_slice(&digest);
        } else {
            let digest = Sha3_512::digest(&buf[128..]);
            buf[128..192].copy_from_slice(&digest);
        }

        // Grunt work: a = floor(sqrt(M)), p = nextprime(floor(sqrt(a))),
        // then fold a^-1 mod p into the buffer.
        let m = Integer::from_digits(&buf, Order::Lsf);
        let a = m.sqrt();
        let prime = Integer::from(a.sqrt_ref()).next_prime();

        let mut a_inverse = a.invert(&prime).unwrap_or_else(|_| Integer::new());

        // The scratch keeps stale high bytes across exports within a
        // round.
        let mut data = [0u8; SEED_BYTES];
        let digits = a_inverse.to_digits::<u8>(Order::Lsf);
        data[..digits.len()].copy_from_slice(&digits);

        for (b, d) in buf.iter_mut().zip(data.iter()) {
            *b ^= d;
        }

        let irounds = popcount(&data) & 0x7f;

        for _ in 0..irounds {
            // selector popcount over the leading 8 bytes
            let br = popcount(&buf[..8]);

            a_inverse = a_inverse
                .pow_mod(&Integer::from(irounds), &prime)
                .expect("positive modulus");

            let digits = a_inverse.to_digits::<u8>(Order::Lsf);
            data[..digits.len()].copy_from_slice(&digits);

            for (b, d) in buf.iter_mut().zip(data.iter()) {
                *b ^= d;
            }

            match br % 3 {
                0 => {
                    let digest = Sha3_512::digest(&buf[..128]);
                    buf[..64].copy_from_slice(&digest);
                }
                2 => {
                    let digest = Blake2b512::digest(&buf[128..]);
                    buf[192..].copy_from_slice(&digest);
                }
                _ => {
                    let digest = Whirlpool::digest(&buf[..]);
                    buf[112..176].copy_from_slice(&digest);
                }
            }
        }
    }

    // Truncate to exactly `bits` bits and force the top bit on.
    let all_bytes = (header.bits / 8) as usize;
    let rem_bits = u32::from(header.bits % 8);

    let mut w = U1024::zero();
    let copy = std::cmp::min(128, all_bytes + 1);
    w.0[..copy].copy_from_slice(&buf[..copy]);

    if all_bytes < 128 {
        w.0[all_bytes] &= ((1u16 << rem_bits) - 1) as u8;
    }

    if rem_bits == 0 {
        w.0[all_bytes - 1] |= 128;
    } else {
        w.0[all_bytes] |= 1 << (rem_bits - 1);
    }

    w
}
