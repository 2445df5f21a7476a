// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use crate::consensus::Network;
use crate::vm::{Op, Script};
use bech32::{self, FromBase32, ToBase32, Variant};
use bincode::{Decode, Encode};

pub const ADDRESS_BYTES: usize = 20;

/// Version 0 witness program address carrying a 20 byte key hash.
/// Claim destinations are expressed as these.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, Encode, Decode)]
pub struct Address(pub [u8; ADDRESS_BYTES]);

impl Address {
    #[must_use]
    pub fn zero() -> Self {
        Self([0; ADDRESS_BYTES])
    }

    #[must_use]
    pub fn to_bech32(&self, hrp: &str) -> String {
        let mut data = vec![bech32::u5::try_from_u8(0).unwrap()];
        data.extend(self.0.to_base32());
        bech32::encode(hrp, data, Variant::Bech32).unwrap()
    }

    pub fn from_bech32(encoded: &str) -> Result<(Self, String), &'static str> {
        let (hrp, data, variant) = bech32::decode(encoded).map_err(|_| "invalid address")?;

        if variant != Variant::Bech32 {
            return Err("invalid address");
        }

        if data.is_empty() || data[0].to_u8() != 0 {
            return Err("invalid witness version");
        }

        let program = Vec::<u8>::from_base32(&data[1..]).map_err(|_| "invalid address")?;
        if program.len() != ADDRESS_BYTES {
            return Err("invalid witness program");
        }

        let mut out = Self::zero();
        out.0.copy_from_slice(&program);
        Ok((out, hrp))
    }

    /// Decodes and checks the human readable part against the network.
    pub fn from_bech32_checked(encoded: &str, network: Network) -> Result<Self, &'static str> {
        let (address, hrp) = Self::from_bech32(encoded)?;
        if hrp != network.bech32_hrp() {
            return Err("address for wrong network");
        }
        Ok(address)
    }

    /// The output script paying to this address
    #[must_use]
    pub fn script_pubkey(&self) -> Script {
        let mut script = Script::new();
        script.push_op(Op::Zero).push_data(&self.0);
        script
    }
}
