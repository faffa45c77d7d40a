// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod machine;
pub mod memory;
pub mod peripherals;
pub mod snapshot;

use dmaprobe_startup::Width;
use std::any::Any;

pub use machine::{Machine, StopReason};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Read of write-only register at {0:#x}")]
    WriteOnly(u64),
}

impl SimulationError {
    /// Rebases a peripheral-relative offset onto the bus address space.
    pub fn offset_by(self, base: u64) -> Self {
        match self {
            SimulationError::MemoryViolation(off) => SimulationError::MemoryViolation(base + off),
            SimulationError::WriteOnly(off) => SimulationError::WriteOnly(base + off),
        }
    }

    pub fn addr(&self) -> u64 {
        match self {
            SimulationError::MemoryViolation(addr) | SimulationError::WriteOnly(addr) => *addr,
        }
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait representing a memory-mapped peripheral
///
/// `read`/`write` are debugger-style byte accesses and must not trigger
/// device side effects. Firmware traffic arrives through `read_access` /
/// `write_access`, which a device overrides when an access means more than
/// storing bytes.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;

    fn read_access(&mut self, offset: u64, width: Width) -> SimResult<u32> {
        let mut value = 0;
        for i in 0..width.bytes() {
            value |= u32::from(self.read(offset + u64::from(i))?) << (i * 8);
        }
        Ok(value)
    }

    fn write_access(&mut self, offset: u64, width: Width, value: u32) -> SimResult<()> {
        for i in 0..width.bytes() {
            self.write(offset + u64::from(i), (value >> (i * 8)) as u8)?;
        }
        Ok(())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;

    fn read_u16(&self, addr: u64) -> SimResult<u16> {
        let b0 = self.read_u8(addr)? as u16;
        let b1 = self.read_u8(addr + 1)? as u16;
        // Little Endian
        Ok(b0 | (b1 << 8))
    }

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let b0 = self.read_u8(addr)? as u32;
        let b1 = self.read_u8(addr + 1)? as u32;
        let b2 = self.read_u8(addr + 2)? as u32;
        let b3 = self.read_u8(addr + 3)? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        self.write_u8(addr + 2, ((value >> 16) & 0xFF) as u8)?;
        self.write_u8(addr + 3, ((value >> 24) & 0xFF) as u8)?;
        Ok(())
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        Ok(())
    }
}
