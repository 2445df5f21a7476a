// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

pub mod bignum;
pub mod opcodes;
pub mod script;

pub use crate::vm::bignum::*;
pub use crate::vm::opcodes::Op;
pub use crate::vm::script::*;
