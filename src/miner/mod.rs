// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::{ghash, ChainParams};
use crate::primitives::{BlockHeader, U1024};
use log::trace;
use rug::integer::IsPrime;
use rug::ops::RemRoundingAssign;
use rug::Integer;

/// f(z) = z^2 + 1 mod n
fn f(z: &mut Integer, n: &Integer) {
    let mut next = Integer::from(&*z * &*z);
    next += 1u32;
    next.rem_euc_assign(n);
    *z = next;
}

/// Pollard rho factoring.
///
/// Returns the smaller prime factor when `n` splits into exactly two
/// probable primes, `None` when `n` is prime or the walk fails to
/// produce such a split.
#[must_use]
pub fn rho(n: &Integer) -> Option<Integer> {
    // 25 rounds leave a false positive chance of 4^-25
    if n.is_probably_prime(25) != IsPrime::No {
        return None;
    }

    let mut x = Integer::from(2);
    let mut y = Integer::from(2);
    let mut g = Integer::from(1);

    while g == 1 {
        f(&mut x, n);
        // y walks the sequence twice as fast
        f(&mut y, n);
        f(&mut y, n);

        g = Integer::from(&x - &y).abs().gcd(n);
    }

    if g == *n {
        return None;
    }

    let cofactor = Integer::from(n / &g);

    if g.is_probably_prime(30) == IsPrime::No || cofactor.is_probably_prime(30) == IsPrime::No {
        return None;
    }

    Some(if g <= cofactor { g } else { cofactor })
}

/// Scans the offset window around the header's seed for a semiprime
/// with balanced prime factors. Returns the offset and the smaller
/// factor on success.
#[must_use]
pub fn find_solution(header: &BlockHeader, params: &ChainParams) -> Option<(i64, U1024)> {
    let w = ghash(header, params).to_integer();
    let bits = u32::from(header.bits);
    let expected_factor_bits = u32::from((header.bits >> 1) + (header.bits & 1));
    let max_offset = 16 * i64::from(header.bits);

    for offset in -max_offset..=max_offset {
        let n = Integer::from(&w + offset);

        if n.significant_bits() != bits {
            continue;
        }

        let Some(p1) = rho(&n) else { continue };

        if p1.significant_bits() != expected_factor_bits {
            continue;
        }

        trace!("miner: solution at offset {offset}");
        return Some((offset, U1024::from_integer(&p1)));
    }

    None
}

/// Grinds nonces until a header carries a valid factorization proof.
/// Bounded by `max_nonces`; the solved offset and factor are written
/// into the header.
pub fn mine(header: &mut BlockHeader, params: &ChainParams, max_nonces: u64) -> bool {
    for _ in 0..max_nonces {
        if let Some((offset, p1)) = find_solution(header, params) {
            header.w_offset = offset;
            header.p1 = p1;
            return true;
        }

        if header.increment_nonce().is_none() {
            return false;
        }
    }

    false
}
