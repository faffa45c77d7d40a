// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Peripheral, SimResult, SimulationError};
use dmaprobe_config::EchoConfig;
use dmaprobe_startup::Width;
use std::any::Any;
use std::collections::VecDeque;

/// What a firmware read of a cell returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoModel {
    /// The stored value.
    Plain,
    /// Always this value.
    Stuck(u32),
    /// The stored value plus a signed delta.
    Offset(i32),
    /// Queued values first, then the stored value.
    Scripted(VecDeque<u32>),
}

impl From<&EchoConfig> for EchoModel {
    fn from(cfg: &EchoConfig) -> Self {
        match cfg {
            EchoConfig::Plain => EchoModel::Plain,
            EchoConfig::Stuck { value } => EchoModel::Stuck(*value),
            EchoConfig::Offset { delta } => EchoModel::Offset(*delta),
            EchoConfig::Scripted { values } => EchoModel::Scripted(values.iter().copied().collect()),
        }
    }
}

/// DMA-visible data window: `depth` cells of `width` each.
#[derive(Debug)]
pub struct DmaRegion {
    width: Width,
    cells: Vec<u32>,
    echo: EchoModel,
    reads: u64,
    writes: u64,
}

impl DmaRegion {
    pub fn new(width: Width, depth: usize, echo: EchoModel) -> Self {
        Self {
            width,
            cells: vec![0; depth],
            echo,
            reads: 0,
            writes: 0,
        }
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn size_bytes(&self) -> u64 {
        self.cells.len() as u64 * u64::from(self.width.bytes())
    }

    /// Stored cell contents, as the debugger sees them.
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Cell index for a whole-cell access, `None` for anything narrower or
    /// misaligned. Fails if any byte of the access is past the window.
    fn cell_index(&self, offset: u64, width: Width) -> SimResult<Option<usize>> {
        if offset.saturating_add(u64::from(width.bytes())) > self.size_bytes() {
            return Err(SimulationError::MemoryViolation(offset));
        }
        let index = (offset / u64::from(self.width.bytes())) as usize;
        if width == self.width && offset % u64::from(self.width.bytes()) == 0 {
            Ok(Some(index))
        } else {
            Ok(None)
        }
    }

    fn echo(&mut self, stored: u32) -> u32 {
        let value = match &mut self.echo {
            EchoModel::Plain => stored,
            EchoModel::Stuck(v) => *v,
            EchoModel::Offset(delta) => stored.wrapping_add_signed(*delta),
            EchoModel::Scripted(queue) => queue.pop_front().unwrap_or(stored),
        };
        self.width.truncate(value)
    }
}

impl Peripheral for DmaRegion {
    fn read(&self, offset: u64) -> SimResult<u8> {
        let w = u64::from(self.width.bytes());
        let cell = self
            .cells
            .get((offset / w) as usize)
            .ok_or(SimulationError::MemoryViolation(offset))?;
        Ok((*cell >> ((offset % w) * 8)) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        let w = u64::from(self.width.bytes());
        let cell = self
            .cells
            .get_mut((offset / w) as usize)
            .ok_or(SimulationError::MemoryViolation(offset))?;
        let shift = (offset % w) * 8;
        *cell = (*cell & !(0xFF << shift)) | (u32::from(value) << shift);
        Ok(())
    }

    fn read_access(&mut self, offset: u64, width: Width) -> SimResult<u32> {
        let index = self.cell_index(offset, width)?;
        self.reads += 1;
        match index {
            Some(index) => {
                let stored = self.cells[index];
                let value = self.echo(stored);
                tracing::trace!("DMA[{}] -> {:#x} (stored {:#x})", index, value, stored);
                Ok(value)
            }
            None => {
                let mut value = 0;
                for i in 0..width.bytes() {
                    value |= u32::from(self.read(offset + u64::from(i))?) << (i * 8);
                }
                Ok(value)
            }
        }
    }

    fn write_access(&mut self, offset: u64, width: Width, value: u32) -> SimResult<()> {
        let index = self.cell_index(offset, width)?;
        self.writes += 1;
        match index {
            Some(index) => {
                self.cells[index] = self.width.truncate(value);
                tracing::trace!("DMA[{}] <- {:#x}", index, self.cells[index]);
                Ok(())
            }
            None => {
                for i in 0..width.bytes() {
                    self.write(offset + u64::from(i), (value >> (i * 8)) as u8)?;
                }
                Ok(())
            }
        }
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "width_bits": self.width.bits(),
            "cells": self.cells,
            "reads": self.reads,
            "writes": self.writes,
        })
    }
}
