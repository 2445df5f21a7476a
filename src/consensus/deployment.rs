// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::params::{ChainParams, DeploymentParams};
use crate::consensus::view::{median_time_past, HeaderView};

/// Version numbers signal through the versionbits scheme only when
/// their top three bits match this prefix.
pub const VERSIONBITS_TOP_MASK: u32 = 0xE000_0000;
pub const VERSIONBITS_TOP_BITS: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

#[must_use]
fn signals_bit(version: i32, bit: u8) -> bool {
    let version = version as u32;
    version & VERSIONBITS_TOP_MASK == VERSIONBITS_TOP_BITS && version >> bit & 1 == 1
}

fn count_signals(view: &dyn HeaderView, from: i64, to: i64, bit: u8) -> u32 {
    let mut count = 0;
    for height in from..=to {
        if let Some(record) = view.header_at(height) {
            if signals_bit(record.version, bit) {
                count += 1;
            }
        }
    }
    count
}

/// Deployment state governing the window that contains `height`.
///
/// Transitions are evaluated at window boundaries only, so every block
/// inside one confirmation window observes the same state.
#[must_use]
pub fn deployment_state_at(
    view: &dyn HeaderView,
    height: i64,
    params: &ChainParams,
) -> ThresholdState {
    let dep = params.deadpool_deployment;

    if dep.start_time == DeploymentParams::ALWAYS_ACTIVE {
        return ThresholdState::Active;
    }

    let window = i64::from(params.miner_confirmation_window);
    let threshold = params.rule_change_activation_threshold;

    if height < 0 {
        return ThresholdState::Defined;
    }

    let target_boundary = height - height.rem_euclid(window);

    let mut state = ThresholdState::Defined;
    let mut boundary = window;

    while boundary <= target_boundary {
        state = match state {
            ThresholdState::Defined => {
                let mtp = median_time_past(view, boundary - 1);
                if mtp >= dep.timeout {
                    ThresholdState::Failed
                } else if mtp >= dep.start_time {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }

            ThresholdState::Started => {
                let mtp = median_time_past(view, boundary - 1);
                if count_signals(view, boundary - window, boundary - 1, dep.bit) >= threshold {
                    ThresholdState::LockedIn
                } else if mtp >= dep.timeout {
                    ThresholdState::Failed
                } else {
                    ThresholdState::Started
                }
            }

            ThresholdState::LockedIn => {
                if boundary >= dep.min_activation_height {
                    ThresholdState::Active
                } else {
                    ThresholdState::LockedIn
                }
            }

            terminal => terminal,
        };

        boundary += window;
    }

    state
}

/// Whether the deadpool rules apply to the block following the tip at
/// `tip_height`.
#[must_use]
pub fn deadpool_active_after(
    view: &dyn HeaderView,
    tip_height: i64,
    params: &ChainParams,
) -> bool {
    deployment_state_at(view, tip_height + 1, params) == ThresholdState::Active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::view::MemoryHeaderChain;

    fn signalling_version(bit: u8) -> i32 {
        (VERSIONBITS_TOP_BITS | (1u32 << bit)) as i32
    }

    fn regtest_chain(blocks: usize, signal: bool) -> MemoryHeaderChain {
        let params = ChainParams::regtest();
        let version = if signal {
            signalling_version(params.deadpool_deployment.bit)
        } else {
            0
        };
        let mut chain = MemoryHeaderChain::new();
        for i in 0..blocks {
            chain.push(1_650_443_545 + i as u32 * 60, 32, version);
        }
        chain
    }

    #[test]
    fn regtest_activates_after_four_windows() {
        let params = ChainParams::regtest();
        let chain = regtest_chain(129, true);

        // windows: defined, started+lockin, locked, waiting for the
        // min activation height at block 128
        assert_eq!(
            deployment_state_at(&chain, 127, &params),
            ThresholdState::LockedIn
        );
        assert_eq!(
            deployment_state_at(&chain, 128, &params),
            ThresholdState::Active
        );
        assert!(deadpool_active_after(&chain, 128, &params));
    }

    #[test]
    fn no_signal_never_locks_in() {
        let params = ChainParams::regtest();
        let chain = regtest_chain(256, false);
        assert_eq!(
            deployment_state_at(&chain, 255, &params),
            ThresholdState::Started
        );
        assert!(!deadpool_active_after(&chain, 255, &params));
    }

    #[test]
    fn mainnet_defined_before_start_time() {
        let params = ChainParams::mainnet();
        let mut chain = MemoryHeaderChain::new();
        // all timestamps well before the 2025 start
        for i in 0u32..(672 * 2) {
            chain.push(1_650_449_340 + i * 60, 230, signalling_version(27));
        }
        assert_eq!(
            deployment_state_at(&chain, 672 * 2 - 1, &params),
            ThresholdState::Defined
        );
    }

    #[test]
    fn signal_requires_top_bits() {
        assert!(signals_bit(signalling_version(27), 27));
        assert!(!signals_bit(1 << 27, 27));
        assert!(!signals_bit(signalling_version(27), 28));
    }
}
