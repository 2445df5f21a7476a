// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! # Factorn
//! Core consensus implementation of the Factorn blockchain, a proof of
//! work chain whose mining puzzle is integer factorization.
//!
//! ## What lives here
//! * **Proof of work**: a memory-hard seed hash derives a random
//!   target region of the integers for every block header; miners
//!   submit a semiprime from that region together with its smaller
//!   prime factor, and validation checks the size, the factorization
//!   and the primality of both factors.
//! * **Work accounting**: an integer approximation of the ECM
//!   factoring cost that stays additive across blocks with
//!   heterogeneous factor sizes.
//! * **The deadpool**: bounties on composite integers. Entries lock
//!   coins behind a factorization challenge, announcements commit to a
//!   claim ahead of time, and claims reveal the factor after a
//!   maturity window that defends against mempool sniping. A durable
//!   index answers bounty queries over RPC and a consensus-critical
//!   announcement database backs the script-level announcement check.
//!
//! The surrounding node (networking, mempool, wallet) is out of scope;
//! the crate exposes the interfaces it needs from it: a coin view, a
//! header view and block connect/disconnect notifications.

pub mod chain;
pub mod codec;
pub mod consensus;
pub mod deadpool;
pub mod miner;
pub mod node;
pub mod primitives;
pub mod settings;
pub mod vm;
