// Copyright (c) 2022 The Factorn Core developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

/// Header data consensus computations need from the active chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub height: i64,
    pub time: u32,
    pub bits: u16,
    pub version: i32,
}

/// Read access to the active header chain. Retargeting and deployment
/// tracking are written against this so they can run off an in-memory
/// chain in tests.
pub trait HeaderView {
    /// Height of the chain tip
    fn height(&self) -> i64;

    /// Header record at the given height on the active chain
    fn header_at(&self, height: i64) -> Option<HeaderRecord>;
}

/// Median of the timestamps of the last 11 blocks ending at `height`
pub fn median_time_past(view: &dyn HeaderView, height: i64) -> i64 {
    let mut times = Vec::with_capacity(11);
    let start = std::cmp::max(height - 10, 0);
    for h in start..=height {
        if let Some(record) = view.header_at(h) {
            times.push(i64::from(record.time));
        }
    }

    if times.is_empty() {
        return 0;
    }

    times.sort_unstable();
    times[times.len() / 2]
}

/// In-memory header chain
#[derive(Default, Clone)]
pub struct MemoryHeaderChain {
    records: Vec<HeaderRecord>,
}

impl MemoryHeaderChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: u32, bits: u16, version: i32) {
        let height = self.records.len() as i64;
        self.records.push(HeaderRecord {
            height,
            time,
            bits,
            version,
        });
    }

    pub fn pop(&mut self) -> Option<HeaderRecord> {
        self.records.pop()
    }
}

impl HeaderView for MemoryHeaderChain {
    fn height(&self) -> i64 {
        self.records.len() as i64 - 1
    }

    fn header_at(&self, height: i64) -> Option<HeaderRecord> {
        if height < 0 {
            return None;
        }
        self.records.get(height as usize).copied()
    }
}
