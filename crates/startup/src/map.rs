// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::Width;

/// Opaque descriptor for the SoC device window.
///
/// The platform maps its device window at address zero, so the sentinel
/// descriptor has base 0. It does not alias code or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRegion {
    base: u32,
}

impl DeviceRegion {
    pub const SENTINEL: DeviceRegion = DeviceRegion { base: 0 };

    pub const fn at(base: u32) -> Self {
        Self { base }
    }

    pub const fn base(&self) -> u32 {
        self.base
    }
}

/// The DMA data window inside the device region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// Byte offset from the device region base.
    pub offset: u32,
    /// Width of one cell.
    pub width: Width,
}

/// Addresses the linker would otherwise provide as symbols.
///
/// `bss_start`/`bss_end` must be word aligned. `heap_start`, `data_start`
/// and `data_end` only describe the layout; nothing here reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    pub bss_start: u32,
    pub bss_end: u32,
    pub heap_start: u32,
    pub data_start: u32,
    pub data_end: u32,
    pub soc: DeviceRegion,
    /// Address of the interrupt-mask register.
    pub irq_mask: u32,
    pub dma: DmaRegion,
    /// Number of DMA cells the workload walks.
    pub data_size: u32,
}

impl MemoryMap {
    /// Address of DMA cell `index`.
    pub const fn dma_cell(&self, index: u32) -> u32 {
        self.soc
            .base
            .wrapping_add(self.dma.offset)
            .wrapping_add(index.wrapping_mul(self.dma.width.bytes()))
    }

    /// Base address of the DMA window.
    pub const fn dma_base(&self) -> u32 {
        self.dma_cell(0)
    }

    /// Number of words bring-up will clear. Zero for an inverted span.
    pub const fn bss_words(&self) -> u32 {
        self.bss_end.saturating_sub(self.bss_start) / crate::WORD_BYTES
    }
}
