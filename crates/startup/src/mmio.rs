// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use core::ptr;

/// Access width of a single memory-mapped transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    /// Truncates `value` to this width.
    pub const fn truncate(self, value: u32) -> u32 {
        match self {
            Width::Byte => value & 0xFF,
            Width::Half => value & 0xFFFF,
            Width::Word => value,
        }
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Width::Byte),
            16 => Some(Width::Half),
            32 => Some(Width::Word),
            _ => None,
        }
    }
}

/// Memory-mapped I/O capability.
///
/// Reads take `&mut self` because a device read may have side effects.
/// Writes store `width.truncate(value)`; reads are zero-extended. Neither can
/// fail: a bad address is the platform's problem, not the firmware's.
pub trait Mmio {
    fn read(&mut self, addr: u32, width: Width) -> u32;
    fn write(&mut self, addr: u32, width: Width, value: u32);
}

impl<M: Mmio + ?Sized> Mmio for &mut M {
    fn read(&mut self, addr: u32, width: Width) -> u32 {
        (**self).read(addr, width)
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        (**self).write(addr, width, value)
    }
}

/// Direct volatile access to the physical address space.
#[derive(Debug)]
pub struct Volatile {
    _private: (),
}

impl Volatile {
    /// # Safety
    ///
    /// Every address later passed to [`Mmio`] must be valid and suitably
    /// aligned for its width on the running platform, and nothing else may
    /// hold references into the memory being accessed. Address zero is
    /// allowed when the platform maps a device there.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Mmio for Volatile {
    fn read(&mut self, addr: u32, width: Width) -> u32 {
        let addr = addr as usize;
        // SAFETY: upheld by the contract of `Volatile::new`.
        unsafe {
            match width {
                Width::Byte => u32::from(ptr::read_volatile(addr as *const u8)),
                Width::Half => u32::from(ptr::read_volatile(addr as *const u16)),
                Width::Word => ptr::read_volatile(addr as *const u32),
            }
        }
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        let addr = addr as usize;
        // SAFETY: upheld by the contract of `Volatile::new`.
        unsafe {
            match width {
                Width::Byte => ptr::write_volatile(addr as *mut u8, value as u8),
                Width::Half => ptr::write_volatile(addr as *mut u16, value as u16),
                Width::Word => ptr::write_volatile(addr as *mut u32, value),
            }
        }
    }
}
