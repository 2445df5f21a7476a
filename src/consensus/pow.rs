// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::ghash::ghash;
use crate::consensus::params::{ChainParams, MAX_POW_BITS};
use crate::consensus::view::{HeaderRecord, HeaderView};
use crate::primitives::BlockHeader;
use log::debug;
use rug::integer::IsPrime;
use rug::Integer;
use std::cmp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowErr {
    /// Declared semiprime size outside the allowed range
    BitsOutOfRange,

    /// Offset magnitude exceeds 16 times the declared size
    BadOffset,

    /// The displaced seed does not have the declared bit length
    WrongBitLength,

    /// The submitted factor does not divide the semiprime
    NotAFactor,

    /// The submitted factor does not have ceil(bits / 2) bits
    WrongFactorSize,

    /// The submitted factor must be the smaller of the two
    FactorOrder,

    /// At least one factor is composite
    CompositeFactor,
}

impl PowErr {
    /// Reject reason as reported through validation state
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BitsOutOfRange => "bad-bits",
            Self::BadOffset => "bad-woffset",
            Self::WrongBitLength => "bad-n-bitlength",
            Self::NotAFactor => "bad-factorization",
            Self::WrongFactorSize => "bad-factor-size",
            Self::FactorOrder => "bad-factor-order",
            Self::CompositeFactor => "bad-factor-composite",
        }
    }
}

/// Validates the factorization proof carried by a block header.
///
/// Derives the seed `W`, displaces it by the declared offset and
/// checks that the result is a semiprime of the declared size whose
/// smaller prime factor was submitted.
pub fn check_proof_of_work(header: &BlockHeader, params: &ChainParams) -> Result<(), PowErr> {
    if header.bits < params.pow_limit || header.bits >= MAX_POW_BITS {
        return Err(PowErr::BitsOutOfRange);
    }

    let w = ghash(header, params).to_integer();

    // |wOffset| <= 16 * bits
    let abs_offset = header.w_offset.unsigned_abs();
    if abs_offset > 16 * u64::from(header.bits) {
        return Err(PowErr::BadOffset);
    }

    // n = w + offset
    let n = if header.w_offset >= 0 {
        w + abs_offset
    } else {
        w - abs_offset
    };

    debug!("pow: N = {}", n);

    if n.significant_bits() != u32::from(header.bits) {
        return Err(PowErr::WrongBitLength);
    }

    let p1 = header.p1.to_integer();
    if p1 <= 0 {
        return Err(PowErr::NotAFactor);
    }

    let p2 = Integer::from(&n / &p1);

    let expected_bits = (header.bits >> 1) + (header.bits & 1);
    if p1.significant_bits() != u32::from(expected_bits) {
        return Err(PowErr::WrongFactorSize);
    }

    if Integer::from(&p1 * &p2) != n {
        return Err(PowErr::NotAFactor);
    }

    if p1 > p2 {
        return Err(PowErr::FactorOrder);
    }

    let rounds = params.miller_rabin_rounds;
    if p1.is_probably_prime(rounds) == IsPrime::No || p2.is_probably_prime(rounds) == IsPrime::No {
        return Err(PowErr::CompositeFactor);
    }

    Ok(())
}

/// Required semiprime size for the block following the current tip.
#[must_use]
pub fn get_next_work_required(
    view: &dyn HeaderView,
    new_block_time: i64,
    params: &ChainParams,
) -> u16 {
    let tip_height = view.height();
    let tip = view.header_at(tip_height).expect("tip header");

    let interval = params.difficulty_adjustment_interval() as i64;

    // Only change once per difficulty adjustment interval
    if (tip_height + 1) % interval != 0 {
        if params.pow_allow_min_difficulty_blocks {
            // Special difficulty rule for testnet: if no block arrived
            // for twice the target spacing, a minimum difficulty block
            // is allowed.
            if new_block_time > i64::from(tip.time) + 2 * params.pow_target_spacing as i64 {
                return params.pow_limit;
            }

            // Otherwise return the last non-special-minimum bits
            let mut record = tip;
            while record.height > 0
                && record.height % interval != 0
                && record.bits == params.pow_limit
            {
                record = view.header_at(record.height - 1).expect("header");
            }
            return record.bits;
        }
        return tip.bits;
    }

    let first = view
        .header_at(tip_height - (interval - 1))
        .expect("window start header");

    calculate_next_work_required(&tip, i64::from(first.time), params)
}

/// Applies the retarget rule at an adjustment boundary.
///
/// Difficulty is discrete. One bit is shed when the window overran its
/// target by more than a thirtieth and one is added only when the
/// network compressed the window below ninety percent.
#[must_use]
pub fn calculate_next_work_required(
    last: &HeaderRecord,
    first_block_time: i64,
    params: &ChainParams,
) -> u16 {
    if params.pow_no_retargeting {
        return last.bits;
    }

    let actual_timespan = i64::from(last.time) - first_block_time;
    let proportion = actual_timespan as f64 / params.pow_target_timespan as f64;

    let mut retarget: i32 = 0;

    if proportion > 1.0333 {
        retarget = -1;
    }

    if proportion < 0.90 {
        retarget = 1;
    }

    let next = i32::from(last.bits) + retarget;
    cmp::max(next, i32::from(params.pow_limit)) as u16
}

/// Additive work value of a block.
///
/// The honest cost estimate for factoring comes from ECM and is about
/// `e^sqrt(2 ln p ln ln p)` for the smallest prime factor `p`. Summing
/// that directly over blocks would collapse into a product, so the
/// exponent is carried in integer form instead: with
/// `a = sqrt(2 b log2 b)` for `b = bits(p1)`,
///
/// `work = 2^floor(a) + floor(1024 frac(a)) * 2^(floor(a) - 11)`
///
/// which stays order-preserving in `b` and additive across blocks of
/// heterogeneous factor sizes.
#[must_use]
pub fn get_block_proof(header: &BlockHeader) -> Integer {
    let p1_bits = f64::from(header.p1.bits());

    if p1_bits < 16.0 {
        return Integer::new();
    }

    let a = (2.0 * p1_bits * p1_bits.log2()).sqrt();
    let a_int = a.floor() as u32;
    let a_fra = a - a.floor();
    let trail = (1024.0 * a_fra).floor() as u32;

    (Integer::from(1) << a_int) + (Integer::from(trail) << (a_int - 11))
}
