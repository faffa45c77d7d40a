// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#![no_std]
#![no_main]
#![allow(clippy::empty_loop)]

use core::ptr::addr_of;
use dmaprobe_startup::{DeviceRegion, DmaRegion, MemoryMap, Volatile, Width};
use panic_halt as _;
use riscv_rt::entry;

// Only the addresses of these symbols are meaningful.
extern "C" {
    static _sprobe_bss: u32;
    static _eprobe_bss: u32;
    static _sheap: u32;
    static _sdata: u32;
    static _edata: u32;
    static _soc_base: u32;
    static _dma_data: u32;
    static _irq_mask: u32;
    static _dma_data_size: u32;
}

/// Backing for `.probe_bss`. Only the fixture's bring-up writes it.
#[used]
#[link_section = ".probe_bss"]
static mut PROBE_BSS: [u32; 32] = [0; 32];

#[cfg(feature = "cells-8")]
const CELL_WIDTH: Width = Width::Byte;
#[cfg(all(feature = "cells-16", not(feature = "cells-8")))]
const CELL_WIDTH: Width = Width::Half;
#[cfg(not(any(feature = "cells-8", feature = "cells-16")))]
const CELL_WIDTH: Width = Width::Word;

fn linker_map() -> MemoryMap {
    let addr = |p: *const u32| p as usize as u32;
    // SAFETY: taking the address of an extern static never reads it.
    let (soc, dma) = unsafe { (addr(addr_of!(_soc_base)), addr(addr_of!(_dma_data))) };

    unsafe {
        MemoryMap {
            bss_start: addr(addr_of!(_sprobe_bss)),
            bss_end: addr(addr_of!(_eprobe_bss)),
            heap_start: addr(addr_of!(_sheap)),
            data_start: addr(addr_of!(_sdata)),
            data_end: addr(addr_of!(_edata)),
            soc: DeviceRegion::at(soc),
            irq_mask: addr(addr_of!(_irq_mask)),
            dma: DmaRegion {
                offset: dma.wrapping_sub(soc),
                width: CELL_WIDTH,
            },
            data_size: addr(addr_of!(_dma_data_size)),
        }
    }
}

#[entry]
fn main() -> ! {
    let map = linker_map();

    // SAFETY: the linker script describes this SoC's memory map and nothing
    // else runs on the core.
    let mut io = unsafe { Volatile::new() };
    dmaprobe_startup::entry(&mut io, &map);

    // Halted: the harness inspects memory from here.
    loop {}
}
