// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use dmaprobe_startup::Phase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MachineSnapshot {
    pub phase: PhaseSnapshot,
    pub steps: u64,
    pub counter: Option<u32>,
    pub ram: MemoryDump,
    pub peripherals: HashMap<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhaseSnapshot {
    BringUp { next: u32 },
    MaskIrq,
    Workload { counter: u32 },
    Done { counter: u32 },
}

impl From<Phase> for PhaseSnapshot {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::BringUp { next } => PhaseSnapshot::BringUp { next },
            Phase::MaskIrq => PhaseSnapshot::MaskIrq,
            Phase::Workload { counter } => PhaseSnapshot::Workload { counter },
            Phase::Done { counter } => PhaseSnapshot::Done { counter },
        }
    }
}

/// Word image of a memory range.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemoryDump {
    pub base: u64,
    pub words: Vec<u32>,
}
