// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, SimResult, SimulationError};
use dmaprobe_startup::Width;
use std::any::Any;

bitflags::bitflags! {
    /// Interrupt lines gated by the mask register. Bit set = line masked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqLines: u32 {
        const LINE0 = 1 << 0;
        const LINE1 = 1 << 1;
        const LINE2 = 1 << 2;
        const LINE3 = 1 << 3;
        const LINE4 = 1 << 4;
        const LINE5 = 1 << 5;
        const LINE6 = 1 << 6;
        const LINE7 = 1 << 7;
    }
}

/// Write-only 32-bit interrupt-mask register.
///
/// Firmware reads fault. The byte-level debug view exposes the latched value
/// so a harness can inspect it after the run.
#[derive(Debug, Default, serde::Serialize)]
pub struct IrqMask {
    value: u32,
    writes: u32,
}

impl IrqMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Number of firmware writes seen.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn masked_lines(&self) -> IrqLines {
        IrqLines::from_bits_retain(self.value)
    }

    fn merge(&mut self, offset: u64, width: Width, value: u32) {
        let shift = (offset % 4) as u32 * 8;
        let mask = match width {
            Width::Word => u32::MAX,
            w => ((1u32 << w.bits()) - 1) << shift,
        };
        self.value = (self.value & !mask) | ((value << shift) & mask);
    }
}

impl Peripheral for IrqMask {
    fn read(&self, offset: u64) -> SimResult<u8> {
        let byte_offset = (offset % 4) as u32;
        Ok(((self.value >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        self.merge(offset, Width::Byte, u32::from(value));
        Ok(())
    }

    fn read_access(&mut self, offset: u64, _width: Width) -> SimResult<u32> {
        tracing::warn!("Firmware read of write-only IRQ mask (offset {:#x})", offset);
        Err(SimulationError::WriteOnly(offset))
    }

    fn write_access(&mut self, offset: u64, width: Width, value: u32) -> SimResult<()> {
        self.merge(offset, width, value);
        self.writes += 1;
        tracing::debug!(
            "IRQ mask <- {:#x} (masked: {:?})",
            self.value,
            self.masked_lines()
        );
        Ok(())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
