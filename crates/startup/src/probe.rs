// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{clear_word, set_irq_mask, workload_iteration, MemoryMap, Mmio, IRQ_MASK_ALL};

/// Where the program is. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Clearing bss; `next` is the next word to zero.
    BringUp { next: u32 },
    /// About to write the interrupt mask.
    MaskIrq,
    /// Walking the DMA region.
    Workload { counter: u32 },
    /// Halted.
    Done { counter: u32 },
}

/// [`crate::entry`] as a resumable state machine.
///
/// Every [`Probe::step`] performs exactly one unit of work: one bss word,
/// the mask write, or one workload iteration. A harness uses this to put a
/// bound on a run that may never halt.
#[derive(Debug, Clone)]
pub struct Probe {
    map: MemoryMap,
    phase: Phase,
}

impl Probe {
    pub fn new(map: MemoryMap) -> Self {
        let phase = settle(&map, Phase::BringUp { next: map.bss_start });
        Self { map, phase }
    }

    pub fn map(&self) -> &MemoryMap {
        &self.map
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done { .. })
    }

    /// Current workload counter, once the workload has started.
    pub fn counter(&self) -> Option<u32> {
        match self.phase {
            Phase::Workload { counter } | Phase::Done { counter } => Some(counter),
            Phase::BringUp { .. } | Phase::MaskIrq => None,
        }
    }

    /// Performs one unit of work and returns the new phase. A no-op once done.
    pub fn step<M: Mmio + ?Sized>(&mut self, io: &mut M) -> Phase {
        let next = match self.phase {
            Phase::BringUp { next } => match clear_word(io, next) {
                Some(addr) => Phase::BringUp { next: addr },
                None => Phase::MaskIrq,
            },
            Phase::MaskIrq => {
                set_irq_mask(io, &self.map, IRQ_MASK_ALL);
                Phase::Workload { counter: 0 }
            }
            Phase::Workload { counter } => Phase::Workload {
                counter: workload_iteration(io, &self.map, counter),
            },
            done @ Phase::Done { .. } => done,
        };
        self.phase = settle(&self.map, next);
        self.phase
    }
}

/// Skips phases whose loop guard is already false.
fn settle(map: &MemoryMap, phase: Phase) -> Phase {
    match phase {
        Phase::BringUp { next } if next >= map.bss_end => Phase::MaskIrq,
        Phase::Workload { counter } if counter >= map.data_size => Phase::Done { counter },
        other => other,
    }
}
