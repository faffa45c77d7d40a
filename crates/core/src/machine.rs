// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::SystemBus;
use crate::snapshot::{MachineSnapshot, MemoryDump};
use crate::{Bus, SimResult};
use dmaprobe_config::FixtureManifest;
use dmaprobe_startup::{MemoryMap, Phase, Probe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halt,
    MaxStepsReached,
}

/// The firmware program bound to a simulated bus.
///
/// The firmware cannot report failure, so the harness owns every bound: a
/// step budget for runs that never halt and the bus fault latch for accesses
/// outside the map.
pub struct Machine {
    pub bus: SystemBus,
    probe: Probe,
    steps: u64,
}

impl Machine {
    pub fn new(bus: SystemBus, map: MemoryMap) -> Self {
        Self {
            bus,
            probe: Probe::new(map),
            steps: 0,
        }
    }

    pub fn from_manifest(manifest: &FixtureManifest) -> anyhow::Result<Self> {
        let bus = SystemBus::from_config(manifest)?;
        let map = manifest.to_memory_map()?;
        tracing::info!(
            "Fixture '{}': bss {:#x}..{:#x}, {} DMA cells at {:#x}",
            manifest.name,
            map.bss_start,
            map.bss_end,
            map.data_size,
            map.dma_base()
        );
        Ok(Self::new(bus, map))
    }

    pub fn map(&self) -> &MemoryMap {
        self.probe.map()
    }

    pub fn phase(&self) -> Phase {
        self.probe.phase()
    }

    pub fn is_halted(&self) -> bool {
        self.probe.is_done()
    }

    pub fn counter(&self) -> Option<u32> {
        self.probe.counter()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// One firmware step. A bus fault raised during the step is returned
    /// after the step completes.
    pub fn step(&mut self) -> SimResult<Phase> {
        let phase = self.probe.step(&mut self.bus);
        self.steps += 1;
        tracing::trace!("step {}: {:?}", self.steps, phase);
        match self.bus.take_fault() {
            Some(err) => Err(err),
            None => Ok(phase),
        }
    }

    /// Steps until halt or until `max_steps` more steps have run.
    pub fn run(&mut self, max_steps: Option<u64>) -> SimResult<StopReason> {
        let mut steps = 0;
        loop {
            if self.probe.is_done() {
                tracing::info!(
                    "Halted after {} steps, counter = {:?}",
                    self.steps,
                    self.counter()
                );
                return Ok(StopReason::Halt);
            }
            if let Some(max) = max_steps {
                if steps >= max {
                    tracing::info!("Step limit {} reached in {:?}", max, self.phase());
                    return Ok(StopReason::MaxStepsReached);
                }
            }
            self.step()?;
            steps += 1;
        }
    }

    pub fn read_memory(&self, addr: u32, len: usize) -> SimResult<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        for i in 0..len {
            data.push(self.bus.read_u8(u64::from(addr) + i as u64)?);
        }
        Ok(data)
    }

    pub fn read_word(&self, addr: u32) -> SimResult<u32> {
        self.bus.read_u32(u64::from(addr))
    }

    /// Stored DMA cell contents, without triggering device reads.
    pub fn dma_cells(&self) -> Vec<u32> {
        self.bus.dma().map(|d| d.cells().to_vec()).unwrap_or_default()
    }

    pub fn irq_mask_value(&self) -> Option<u32> {
        self.bus.irq_mask().map(|m| m.value())
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            phase: self.phase().into(),
            steps: self.steps,
            counter: self.counter(),
            ram: MemoryDump {
                base: self.bus.ram.base_addr,
                words: self.bus.ram.words(),
            },
            peripherals: self
                .bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{AccessKind, DMA};
    use crate::snapshot::PhaseSnapshot;
    use crate::SimulationError;
    use dmaprobe_startup::{DeviceRegion, DmaRegion, Width};

    fn map(bss_start: u32, bss_end: u32, data_size: u32) -> MemoryMap {
        MemoryMap {
            bss_start,
            bss_end,
            heap_start: bss_end,
            data_start: bss_start,
            data_end: bss_start,
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
    fn test_run_four_cells() {
        let mut machine = Machine::new(SystemBus::new(), map(0x100, 0x100, 4));
        assert_eq!(machine.run(Some(100)), Ok(StopReason::Halt));
        assert_eq!(machine.dma_cells()[..5], [0, 1, 2, 3, 0]);
        assert_eq!(machine.counter(), Some(4));
        assert_eq!(machine.steps(), 5);
        assert_eq!(machine.irq_mask_value(), Some(0xFF));
    }

    #[test]
    fn test_step_limit_is_not_a_halt() {
        let mut machine = Machine::new(SystemBus::new(), map(0x100, 0x100, 16));
        assert_eq!(machine.run(Some(3)), Ok(StopReason::MaxStepsReached));
        assert_eq!(machine.phase(), Phase::Workload { counter: 2 });
        assert_eq!(machine.run(None), Ok(StopReason::Halt));
    }

    #[test]
    fn test_bss_cleared_and_neighbours_untouched() {
        let mut bus = SystemBus::new();
        bus.ram.fill(0x0FC, 0x114, 0xA5);
        let mut machine = Machine::new(bus, map(0x100, 0x110, 0));
        assert_eq!(machine.run(None), Ok(StopReason::Halt));

        assert_eq!(machine.read_word(0x0FC).unwrap(), 0xA5A5_A5A5);
        assert_eq!(machine.read_memory(0x100, 16).unwrap(), vec![0; 16]);
        assert_eq!(machine.read_word(0x110).unwrap(), 0xA5A5_A5A5);
    }

    #[test]
    fn test_mask_precedes_dma_traffic() {
        let mut bus = SystemBus::new();
        bus.record_accesses();
        let mut machine = Machine::new(bus, map(0x100, 0x108, 2));
        machine.run(None).unwrap();

        let log = machine.bus.access_log();
        let mask_writes: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, a)| a.addr == 0x0200_0000)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(mask_writes, vec![2]);
        assert_eq!(log[2].kind, AccessKind::Write);
        assert_eq!(log[2].value, 0xFF);
        assert!(log[..2].iter().all(|a| a.addr < 0x0100_0000));
        assert_eq!(log.len(), 2 + 1 + 4);
    }

    #[test]
    fn test_dma_overrun_surfaces_fault() {
        let mut machine = Machine::new(SystemBus::new(), map(0x100, 0x100, 17));
        let err = machine.run(Some(100)).unwrap_err();
        assert_eq!(err, SimulationError::MemoryViolation(0x0100_0040));
        assert!(!machine.is_halted());
    }

    #[test]
    fn test_snapshot_reports_state() {
        let mut machine = Machine::new(SystemBus::new(), map(0x100, 0x104, 1));
        machine.run(None).unwrap();
        let snap = machine.snapshot();
        assert_eq!(snap.phase, PhaseSnapshot::Done { counter: 1 });
        assert_eq!(snap.ram.words.len(), 512);
        assert_eq!(snap.peripherals[DMA]["cells"][0], 0);
        assert_eq!(snap.peripherals["irq_mask"]["value"], 0xFF);
    }
}
