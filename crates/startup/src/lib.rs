// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Runtime bring-up and the DMA probe workload.
//!
//! Everything here runs on the target core with no allocator and no error
//! channel: a run either reaches the halt state with the expected memory
//! image or it never halts. Memory is reached only through [`Mmio`], so the
//! same code drives real hardware ([`Volatile`]) and the simulator bus.

pub mod map;
pub mod mmio;
pub mod probe;

pub use map::{DeviceRegion, DmaRegion, MemoryMap};
pub use mmio::{Mmio, Volatile, Width};
pub use probe::{Phase, Probe};

/// Mask value written at the start of the workload: every line masked.
pub const IRQ_MASK_ALL: u32 = 0xFF;

/// Machine word size in bytes (RV32).
pub const WORD_BYTES: u32 = 4;

/// Writes zero to every word in `[bss_start, bss_end)`.
///
/// An inverted pair (`bss_end < bss_start`) is a zero-length span.
pub fn zero_bss<M: Mmio + ?Sized>(io: &mut M, map: &MemoryMap) {
    let mut addr = map.bss_start;
    while addr < map.bss_end {
        match clear_word(io, addr) {
            Some(next) => addr = next,
            None => break,
        }
    }
}

/// Clears one word and returns the next address, or `None` past the top of
/// the address space.
pub(crate) fn clear_word<M: Mmio + ?Sized>(io: &mut M, addr: u32) -> Option<u32> {
    io.write(addr, Width::Word, 0);
    addr.checked_add(WORD_BYTES)
}

/// Single write to the interrupt-mask register. No read-modify-write.
pub fn set_irq_mask<M: Mmio + ?Sized>(io: &mut M, map: &MemoryMap, mask: u32) {
    io.write(map.irq_mask, Width::Word, mask);
}

/// One pass of the workload body.
///
/// Stores `counter` into cell `counter`, then derives the next counter from
/// whatever the cell reads back. On plain memory that is `counter + 1`; on a
/// peripheral that does not echo, it is not.
pub fn workload_iteration<M: Mmio + ?Sized>(
    io: &mut M,
    map: &MemoryMap,
    counter: u32,
) -> u32 {
    let addr = map.dma_cell(counter);
    io.write(addr, map.dma.width, counter);
    io.read(addr, map.dma.width).wrapping_add(1)
}

/// Masks all interrupt lines, then walks the DMA region. Returns the final
/// counter once it reaches `data_size`; may never return if the region does
/// not echo what was written.
pub fn run_workload<M: Mmio + ?Sized>(io: &mut M, map: &MemoryMap) -> u32 {
    set_irq_mask(io, map, IRQ_MASK_ALL);

    let mut counter = 0;
    while counter < map.data_size {
        counter = workload_iteration(io, map, counter);
    }
    counter
}

/// Bring-up followed by the workload. This is the whole program.
pub fn entry<M: Mmio + ?Sized>(io: &mut M, map: &MemoryMap) {
    zero_bss(io, map);
    run_workload(io, map);
}


#[cfg(test)]
mod tests {
    use super::testing::{Op, RecordingMemory};
    use super::*;

    fn map(bss_start: u32, bss_end: u32, data_size: u32) -> MemoryMap {
        MemoryMap {
            bss_start,
            bss_end,
            heap_start: bss_end,
            data_start: 0x100,
            data_end: 0x100,
            soc: DeviceRegion::SENTINEL,
            irq_mask: 0x0200_0000,
            dma: DmaRegion {
                offset: 0x0100_0000,
                width: Width::Word,
            },
            data_size,
        }
    }

    #[test]
    fn zero_bss_clears_span_only() {
        let mut mem = RecordingMemory::with_words(0x1000, &[0xAA; 8]);
        zero_bss(&mut mem, &map(0x1004, 0x1014, 0));

        assert_eq!(mem.word(0x1000), 0xAA);
        for addr in (0x1004..0x1014).step_by(4) {
            assert_eq!(mem.word(addr), 0, "word at {addr:#x}");
        }
        assert_eq!(mem.word(0x1014), 0xAA);
        assert_eq!(mem.writes().count(), 4);
    }

    #[test]
    fn zero_bss_writes_each_word_exactly_once() {
        let mut mem = RecordingMemory::default();
        zero_bss(&mut mem, &map(0x700, 0x780, 0));

        let mut addrs: Vec<u32> = mem.writes().map(|(a, _, _)| a).collect();
        assert_eq!(addrs.len(), 32);
        addrs.dedup();
        assert_eq!(addrs, (0x700..0x780).step_by(4).collect::<Vec<u32>>());
    }

    #[test]
    fn zero_bss_empty_span_writes_nothing() {
        let mut mem = RecordingMemory::with_words(0x1000, &[7; 4]);
        zero_bss(&mut mem, &map(0x1008, 0x1008, 0));
        assert!(mem.log.is_empty());
    }

    #[test]
    fn zero_bss_inverted_span_writes_nothing() {
        let mut mem = RecordingMemory::default();
        zero_bss(&mut mem, &map(0x2000, 0x1000, 0));
        assert!(mem.log.is_empty());
    }

    #[test]
    fn zero_bss_stops_at_top_of_address_space() {
        let mut mem = RecordingMemory::default();
        zero_bss(&mut mem, &map(0xFFFF_FFF8, 0xFFFF_FFFF, 0));
        let addrs: Vec<u32> = mem.writes().map(|(a, _, _)| a).collect();
        assert_eq!(addrs, vec![0xFFFF_FFF8, 0xFFFF_FFFC]);
    }

    #[test]
    fn workload_four_cells() {
        let m = map(0, 0, 4);
        let mut mem = RecordingMemory::default();
        let counter = run_workload(&mut mem, &m);

        assert_eq!(counter, 4);
        for i in 0..4 {
            assert_eq!(mem.word(m.dma_cell(i)), i);
        }
        // mask write first, then write/read pairs
        assert_eq!(mem.log[0], Op::Write(m.irq_mask, Width::Word, IRQ_MASK_ALL));
        assert_eq!(mem.log.len(), 1 + 2 * 4);
        assert_eq!(mem.log[1], Op::Write(m.dma_cell(0), Width::Word, 0));
        assert_eq!(mem.log[2], Op::Read(m.dma_cell(0), Width::Word));
    }

    #[test]
    fn workload_zero_size_only_masks() {
        let m = map(0, 0, 0);
        let mut mem = RecordingMemory::default();
        assert_eq!(run_workload(&mut mem, &m), 0);
        assert_eq!(mem.log, vec![Op::Write(m.irq_mask, Width::Word, 0xFF)]);
    }

    #[test]
    fn iteration_follows_readback_not_counter() {
        struct Stuck;
        impl Mmio for Stuck {
            fn read(&mut self, _addr: u32, _width: Width) -> u32 {
                41
            }
            fn write(&mut self, _addr: u32, _width: Width, _value: u32) {}
        }
        assert_eq!(workload_iteration(&mut Stuck, &map(0, 0, 4), 3), 42);
    }

    #[test]
    fn entry_clears_bss_before_touching_devices() {
        let m = map(0x1000, 0x1008, 2);
        let mut mem = RecordingMemory::with_words(0x1000, &[0xDEAD, 0xBEEF]);
        entry(&mut mem, &m);

        assert_eq!(mem.log[0], Op::Write(0x1000, Width::Word, 0));
        assert_eq!(mem.log[1], Op::Write(0x1004, Width::Word, 0));
        assert_eq!(mem.log[2], Op::Write(m.irq_mask, Width::Word, 0xFF));
        assert_eq!(mem.word(m.dma_cell(1)), 1);
    }
}
