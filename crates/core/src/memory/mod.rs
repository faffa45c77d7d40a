// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// A simple flat memory storage
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr < self.end_addr()
    }

    pub fn end_addr(&self) -> u64 {
        self.base_addr.saturating_add(self.data.len() as u64)
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        if self.contains(addr) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        if self.contains(addr) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    /// Fills `[start, end)` with `value`, clamped to this memory.
    pub fn fill(&mut self, start: u64, end: u64, value: u8) {
        let start = start.clamp(self.base_addr, self.end_addr());
        let end = end.clamp(start, self.end_addr());
        let lo = (start - self.base_addr) as usize;
        let hi = (end - self.base_addr) as usize;
        self.data[lo..hi].fill(value);
    }

    /// Little-endian words covering the whole memory.
    pub fn words(&self) -> Vec<u32> {
        self.data
            .chunks(4)
            .map(|c| {
                c.iter()
                    .enumerate()
                    .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (i * 8)))
            })
            .collect()
    }
}
