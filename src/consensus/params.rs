// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use static_assertions::const_assert;

/// Money type, amount in satoshis. Can be negative.
pub type Money = i64;

/// Satoshis per coin
pub const COIN: Money = 100_000_000;

/// No amount larger than this is valid. Not a supply cap but a sanity
/// check: the largest multiple of `COIN` that stays positive under a
/// signed 64-bit interpretation.
pub const MAX_MONEY: Money = 46_116_860_184 * COIN;

/// Money range check
#[must_use]
pub fn money_range(amount: Money) -> bool {
    (0..=MAX_MONEY).contains(&amount)
}

/// Headers with a declared semiprime size at or above this many bits
/// do not fit the factor field and are rejected outright.
pub const MAX_POW_BITS: u16 = 1024;

const_assert!(COIN > 0);
const_assert!(MAX_MONEY > 0);
const_assert!(MAX_MONEY / COIN == 46_116_860_184);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "main",
            Self::Testnet => "test",
            Self::Signet => "signet",
            Self::Regtest => "regtest",
        }
    }

    #[must_use]
    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Self::Mainnet => "fact",
            Self::Testnet => "tfact",
            Self::Signet => "tb",
            Self::Regtest => "bcrt",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, &'static str> {
        match name {
            "main" | "mainnet" => Ok(Self::Mainnet),
            "test" | "testnet" => Ok(Self::Testnet),
            "signet" => Ok(Self::Signet),
            "regtest" => Ok(Self::Regtest),
            _ => Err("unknown network"),
        }
    }
}

/// Versionbits deployment window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentParams {
    /// Signalling bit in the block version
    pub bit: u8,

    /// Start of the signalling period as a unix timestamp
    pub start_time: i64,

    /// Timeout as a unix timestamp
    pub timeout: i64,

    /// Earliest height at which the deployment can become active
    pub min_activation_height: i64,
}

impl DeploymentParams {
    /// Sentinel start time for an always-active deployment
    pub const ALWAYS_ACTIVE: i64 = -1;

    /// Sentinel timeout for deployments without one
    pub const NO_TIMEOUT: i64 = i64::MAX;
}

#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,

    /// Minimum allowed semiprime size in bits
    pub pow_limit: u16,

    /// Retargeting window in seconds
    pub pow_target_timespan: u64,

    /// Target block spacing in seconds
    pub pow_target_spacing: u64,

    /// Testnet rule: allow a minimum difficulty block when no block
    /// arrived for twice the target spacing
    pub pow_allow_min_difficulty_blocks: bool,

    pub pow_no_retargeting: bool,

    /// Primality test rounds. False positive rate of 4^-rounds.
    pub miller_rabin_rounds: u32,

    /// Rounds of the pow seed hash
    pub hash_rounds: u32,

    /// Blocks that must signal within a window to lock a deployment in
    pub rule_change_activation_threshold: u32,

    /// Versionbits window length in blocks
    pub miner_confirmation_window: u32,

    /// Deadpool softfork deployment window
    pub deadpool_deployment: DeploymentParams,

    /// Confirmations before an announcement can back a claim
    pub deadpool_announce_maturity: i64,

    /// Confirmations after which an announcement expires
    pub deadpool_announce_validity: i64,

    /// Minimum value burned by an announcement
    pub deadpool_announce_min_burn: Money,
}

impl ChainParams {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            pow_limit: 230,
            pow_target_timespan: 14 * 24 * 60 * 60,
            pow_target_spacing: 30 * 60,
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: false,
            miller_rabin_rounds: 50,
            hash_rounds: 1,
            rule_change_activation_threshold: 639, // 95% of 672
            miner_confirmation_window: 672,        // timespan / spacing
            deadpool_deployment: DeploymentParams {
                bit: 27,
                start_time: 1_735_689_600, // 2025-01-01
                timeout: 1_748_736_000,    // 2025-06-01
                min_activation_height: 155_000,
            },
            deadpool_announce_maturity: 100,
            deadpool_announce_validity: 672,
            deadpool_announce_min_burn: 1_000_000, // 0.01 COIN
        }
    }

    #[must_use]
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            pow_limit: 210,
            pow_target_timespan: 24 * 60 * 60,
            pow_target_spacing: 5 * 60,
            pow_allow_min_difficulty_blocks: true,
            pow_no_retargeting: false,
            miller_rabin_rounds: 50,
            hash_rounds: 1,
            rule_change_activation_threshold: 90, // 75% for testchains
            miner_confirmation_window: 288,
            deadpool_deployment: DeploymentParams {
                bit: 27,
                start_time: 1_735_689_600,
                timeout: DeploymentParams::NO_TIMEOUT,
                min_activation_height: 0,
            },
            deadpool_announce_maturity: 5,
            deadpool_announce_validity: 100,
            deadpool_announce_min_burn: 1_000_000,
        }
    }

    #[must_use]
    pub fn signet() -> Self {
        Self {
            network: Network::Signet,
            pow_limit: 32,
            pow_target_timespan: 14 * 24 * 60 * 60,
            pow_target_spacing: 30 * 60,
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: false,
            miller_rabin_rounds: 50,
            hash_rounds: 1,
            rule_change_activation_threshold: 1815,
            miner_confirmation_window: 672,
            deadpool_deployment: DeploymentParams {
                bit: 27,
                start_time: 0,
                timeout: DeploymentParams::NO_TIMEOUT,
                min_activation_height: 4 * 672,
            },
            deadpool_announce_maturity: 5,
            deadpool_announce_validity: 100,
            deadpool_announce_min_burn: 1_000_000,
        }
    }

    #[must_use]
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            pow_limit: 32,
            pow_target_timespan: 14 * 24 * 60 * 60,
            pow_target_spacing: 30 * 60,
            pow_allow_min_difficulty_blocks: true,
            pow_no_retargeting: true,
            miller_rabin_rounds: 50,
            hash_rounds: 1,
            rule_change_activation_threshold: 24, // 75% for testchains
            miner_confirmation_window: 32,
            deadpool_deployment: DeploymentParams {
                bit: 27,
                start_time: 0,
                timeout: DeploymentParams::NO_TIMEOUT,
                min_activation_height: 4 * 32,
            },
            deadpool_announce_maturity: 5,
            deadpool_announce_validity: 100,
            deadpool_announce_min_burn: 1_000_000,
        }
    }

    #[must_use]
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Signet => Self::signet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Blocks between difficulty adjustments
    #[must_use]
    pub fn difficulty_adjustment_interval(&self) -> u64 {
        self.pow_target_timespan / self.pow_target_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_money_checks() {
        assert!(!money_range(-1));
        assert!(money_range(0));
        assert!(money_range(1));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(MAX_MONEY + 1));
    }

    #[test]
    fn mainnet_retarget_interval() {
        assert_eq!(ChainParams::mainnet().difficulty_adjustment_interval(), 672);
    }

    #[test]
    fn network_name_roundtrip() {
        for network in [
            Network::Mainnet,
            Network::Testnet,
            Network::Signet,
            Network::Regtest,
        ] {
            assert_eq!(Network::from_name(network.name()).unwrap(), network);
        }
        assert!(Network::from_name("banana").is_err());
    }

    #[test]
    fn min_burn_is_one_cent() {
        assert_eq!(ChainParams::mainnet().deadpool_announce_min_burn * 100, COIN);
    }
}
