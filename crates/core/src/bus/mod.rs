// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::memory::LinearMemory;
use crate::peripherals::dma_region::{DmaRegion, EchoModel};
use crate::peripherals::irq_mask::IrqMask;
use crate::{Bus, Peripheral, SimResult, SimulationError};
use anyhow::Context;
use dmaprobe_config::{parse_size, FixtureManifest};
use dmaprobe_startup::{Mmio, Width};

pub const IRQ_MASK: &str = "irq_mask";
pub const DMA: &str = "dma";

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

/// One completed firmware access, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BusAccess {
    pub kind: AccessKind,
    pub addr: u32,
    pub bytes: u32,
    pub value: u32,
}

pub struct SystemBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
    access_log: Option<Vec<BusAccess>>,
    fault: Option<SimulationError>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    pub fn new() -> Self {
        // Default layout for tests: 2KB RAM in segment 0, a 16-word DMA
        // window in segment 1, the IRQ mask in segment 2.
        let mut bus = Self::with_ram(LinearMemory::new(2048, 0x0));
        let dma = DmaRegion::new(Width::Word, 16, EchoModel::Plain);
        bus.add_peripheral(DMA, 0x0100_0000, dma.size_bytes(), Box::new(dma));
        bus.add_peripheral(IRQ_MASK, 0x0200_0000, 4, Box::new(IrqMask::new()));
        bus
    }

    pub fn with_ram(ram: LinearMemory) -> Self {
        Self {
            ram,
            peripherals: Vec::new(),
            access_log: None,
            fault: None,
        }
    }

    pub fn from_config(manifest: &FixtureManifest) -> anyhow::Result<Self> {
        let ram_size = parse_size(&manifest.ram.size)
            .with_context(|| format!("Invalid RAM size for fixture '{}'", manifest.name))?;
        let mut bus = Self::with_ram(LinearMemory::new(ram_size as usize, manifest.ram.base));

        let dma = DmaRegion::new(
            manifest.dma.cell_width()?,
            manifest.dma.depth as usize,
            EchoModel::from(&manifest.dma.echo),
        );
        tracing::debug!(
            "Mapping {} x {}-bit DMA cells at {:#x} ({:?})",
            manifest.dma.depth,
            manifest.dma.width,
            manifest.dma.offset,
            manifest.dma.echo
        );
        let dma_size = dma.size_bytes();
        bus.add_peripheral(DMA, u64::from(manifest.dma.offset), dma_size, Box::new(dma));
        bus.add_peripheral(
            IRQ_MASK,
            u64::from(manifest.irq_mask.address),
            4,
            Box::new(IrqMask::new()),
        );

        Ok(bus)
    }

    pub fn add_peripheral(&mut self, name: &str, base: u64, size: u64, dev: Box<dyn Peripheral>) {
        self.peripherals.push(PeripheralEntry {
            name: name.to_string(),
            base,
            size,
            dev,
        });
    }

    /// Start keeping an ordered log of firmware accesses.
    pub fn record_accesses(&mut self) {
        self.access_log.get_or_insert_with(Vec::new);
    }

    pub fn access_log(&self) -> &[BusAccess] {
        self.access_log.as_deref().unwrap_or(&[])
    }

    /// First fault since the last call, if any.
    pub fn take_fault(&mut self) -> Option<SimulationError> {
        self.fault.take()
    }

    pub fn peripheral<T: 'static>(&self, name: &str) -> Option<&T> {
        self.peripherals
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.dev.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn irq_mask(&self) -> Option<&IrqMask> {
        self.peripheral::<IrqMask>(IRQ_MASK)
    }

    pub fn dma(&self) -> Option<&DmaRegion> {
        self.peripheral::<DmaRegion>(DMA)
    }

    fn access_read(&mut self, addr: u64, width: Width) -> SimResult<u32> {
        if self.ram.contains(addr) {
            let mut value = 0;
            for i in 0..width.bytes() {
                let a = addr + u64::from(i);
                let byte = self.ram.read_u8(a).ok_or(SimulationError::MemoryViolation(a))?;
                value |= u32::from(byte) << (i * 8);
            }
            return Ok(value);
        }

        for p in &mut self.peripherals {
            if addr >= p.base && addr < p.base + p.size {
                return p
                    .dev
                    .read_access(addr - p.base, width)
                    .map_err(|e| e.offset_by(p.base));
            }
        }

        Err(SimulationError::MemoryViolation(addr))
    }

    fn access_write(&mut self, addr: u64, width: Width, value: u32) -> SimResult<()> {
        if self.ram.contains(addr) {
            for i in 0..width.bytes() {
                let a = addr + u64::from(i);
                if !self.ram.write_u8(a, (value >> (i * 8)) as u8) {
                    return Err(SimulationError::MemoryViolation(a));
                }
            }
            return Ok(());
        }

        for p in &mut self.peripherals {
            if addr >= p.base && addr < p.base + p.size {
                return p
                    .dev
                    .write_access(addr - p.base, width, value)
                    .map_err(|e| e.offset_by(p.base));
            }
        }

        Err(SimulationError::MemoryViolation(addr))
    }

    fn record(&mut self, kind: AccessKind, addr: u32, width: Width, value: u32) {
        if let Some(log) = &mut self.access_log {
            log.push(BusAccess {
                kind,
                addr,
                bytes: width.bytes(),
                value,
            });
        }
    }

    fn raise(&mut self, err: SimulationError) {
        tracing::warn!("Bus fault: {}", err);
        self.fault.get_or_insert(err);
    }
}

impl Bus for SystemBus {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        if let Some(val) = self.ram.read_u8(addr) {
            return Ok(val);
        }

        for p in &self.peripherals {
            if addr >= p.base && addr < p.base + p.size {
                return p.dev.read(addr - p.base).map_err(|e| e.offset_by(p.base));
            }
        }

        Err(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if self.ram.write_u8(addr, value) {
            return Ok(());
        }

        for p in &mut self.peripherals {
            if addr >= p.base && addr < p.base + p.size {
                return p
                    .dev
                    .write(addr - p.base, value)
                    .map_err(|e| e.offset_by(p.base));
            }
        }

        Err(SimulationError::MemoryViolation(addr))
    }
}

/// Firmware-facing view. Faults are latched for the harness; a faulting read
/// returns zero so the firmware keeps going exactly as it would on silicon
/// without a bus-error trap.
impl Mmio for SystemBus {
    fn read(&mut self, addr: u32, width: Width) -> u32 {
        match self.access_read(u64::from(addr), width) {
            Ok(value) => {
                self.record(AccessKind::Read, addr, width, value);
                value
            }
            Err(e) => {
                self.raise(e);
                0
            }
        }
    }

    fn write(&mut self, addr: u32, width: Width, value: u32) {
        let value = width.truncate(value);
        match self.access_write(u64::from(addr), width, value) {
            Ok(()) => self.record(AccessKind::Write, addr, width, value),
            Err(e) => self.raise(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
name: "bus-test"
ram:
  base: 0x0
  size: "1KB"
symbols:
  bss_start: 0x100
  bss_end: 0x140
irq_mask:
  address: 0x02000000
dma:
  offset: 0x01000000
  width: 16
  depth: 8
data_size: 8
"#;

    #[test]
    fn test_system_bus_from_config() {
        let manifest = FixtureManifest::from_yaml(MANIFEST).unwrap();
        let bus = SystemBus::from_config(&manifest).expect("Failed to create bus from config");

        // human-size reads "KB" as 1024 bytes
        assert_eq!(bus.ram.data.len(), 1024);
        let dma = bus.peripherals.iter().find(|p| p.name == DMA).unwrap();
        assert_eq!(dma.base, 0x0100_0000);
        assert_eq!(dma.size, 16);
        assert_eq!(bus.dma().unwrap().width(), Width::Half);
        assert_eq!(bus.irq_mask().unwrap().value(), 0);
    }

    #[test]
    fn test_mmio_routes_and_logs() {
        let mut bus = SystemBus::new();
        bus.record_accesses();

        bus.write(0x10, Width::Word, 0xDEAD_BEEF);
        assert_eq!(bus.read(0x10, Width::Half), 0xBEEF);
        bus.write(0x0200_0000, Width::Word, 0xFF);
        bus.write(0x0100_0004, Width::Word, 1);
        assert_eq!(bus.read(0x0100_0004, Width::Word), 1);

        assert!(bus.take_fault().is_none());
        assert_eq!(bus.irq_mask().unwrap().value(), 0xFF);
        assert_eq!(bus.dma().unwrap().cells()[1], 1);
        assert_eq!(bus.read_u32(0x10).unwrap(), 0xDEAD_BEEF);

        let log = bus.access_log();
        assert_eq!(log.len(), 5);
        assert_eq!(
            log[1],
            BusAccess {
                kind: AccessKind::Read,
                addr: 0x10,
                bytes: 2,
                value: 0xBEEF
            }
        );
    }

    #[test]
    fn test_unmapped_access_latches_first_fault() {
        let mut bus = SystemBus::new();
        assert_eq!(bus.read(0x3000_0000, Width::Word), 0);
        bus.write(0x3000_0004, Width::Word, 1);
        assert_eq!(
            bus.take_fault(),
            Some(SimulationError::MemoryViolation(0x3000_0000))
        );
        assert!(bus.take_fault().is_none());
    }

    #[test]
    fn test_irq_mask_read_is_a_fault() {
        let mut bus = SystemBus::new();
        bus.read(0x0200_0000, Width::Word);
        let fault = bus.take_fault().unwrap();
        assert_eq!(fault, SimulationError::WriteOnly(0x0200_0000));
        // rebased from the peripheral offset onto the bus address
        assert_eq!(fault.addr(), 0x0200_0000);
        // debugger view still works
        assert_eq!(bus.read_u32(0x0200_0000).unwrap(), 0);
    }

    #[test]
    fn test_dma_past_depth_faults() {
        let mut bus = SystemBus::new();
        bus.write(0x0100_0040, Width::Word, 16);
        assert_eq!(
            bus.take_fault(),
            Some(SimulationError::MemoryViolation(0x0100_0040))
        );
    }
}
