// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use dmaprobe_startup::{DeviceRegion, DmaRegion, MemoryMap, Width, WORD_BYTES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_cell_width() -> u32 {
    32
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "2KB"
}

/// Values the linker script would export as symbols.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkerSymbols {
    pub bss_start: u32,
    pub bss_end: u32,
    #[serde(default)]
    pub heap_start: Option<u32>,
    #[serde(default)]
    pub data_start: Option<u32>,
    #[serde(default)]
    pub data_end: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IrqMaskConfig {
    pub address: u32,
}

/// How the DMA region answers a read of a cell that was just written.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EchoConfig {
    /// Plain storage: reads return what was written.
    #[default]
    Plain,
    /// Every read returns `value`.
    Stuck { value: u32 },
    /// Reads return the stored value plus `delta` (wrapping).
    Offset { delta: i32 },
    /// Reads return `values` in order, then fall back to plain storage.
    Scripted { values: Vec<u32> },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DmaConfig {
    /// Byte offset from the SoC device window (which sits at address 0).
    pub offset: u32,
    /// Cell width in bits: 8, 16 or 32.
    #[serde(default = "default_cell_width")]
    pub width: u32,
    /// Number of cells backed by the region.
    pub depth: u32,
    /// `plain`, or a single-key map such as `stuck: { value: 0 }`.
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub echo: EchoConfig,
}

impl DmaConfig {
    pub fn cell_width(&self) -> Result<Width> {
        Width::from_bits(self.width).with_context(|| {
            format!("Unsupported DMA cell width {} (expected 8, 16 or 32)", self.width)
        })
    }

    pub fn size_bytes(&self) -> Result<u64> {
        Ok(u64::from(self.depth) * u64::from(self.cell_width()?.bytes()))
    }
}

/// Everything needed to lay out one fixture run.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FixtureManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    pub ram: MemoryRange,
    pub symbols: LinkerSymbols,
    pub irq_mask: IrqMaskConfig,
    pub dma: DmaConfig,
    pub data_size: u32,
}

impl FixtureManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read fixture manifest at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Fixture Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let sym = &self.symbols;
        if sym.bss_start % WORD_BYTES != 0 || sym.bss_end % WORD_BYTES != 0 {
            anyhow::bail!(
                "bss bounds {:#x}..{:#x} must be {}-byte aligned",
                sym.bss_start,
                sym.bss_end,
                WORD_BYTES
            );
        }
        if sym.bss_end < sym.bss_start {
            tracing::warn!(
                "bss_end {:#x} precedes bss_start {:#x}; bring-up will clear nothing",
                sym.bss_end,
                sym.bss_start
            );
        }

        let width = self.dma.cell_width()?;
        if self.dma.depth == 0 {
            anyhow::bail!("DMA region depth must be greater than zero");
        }
        if self.data_size > self.dma.depth {
            tracing::warn!(
                "data_size {} exceeds DMA depth {}; the workload will run off the region",
                self.data_size,
                self.dma.depth
            );
        }
        if width != Width::Word && u64::from(self.data_size) > 1u64 << width.bits() {
            tracing::warn!(
                "data_size {} cannot be echoed by {}-bit cells; the workload will not halt",
                self.data_size,
                width.bits()
            );
        }

        let ram_base = self.ram.base;
        let ram_end = match ram_base.checked_add(parse_size(&self.ram.size)?) {
            Some(end) => end,
            None => anyhow::bail!("RAM range overflows the address space"),
        };
        if sym.bss_start < sym.bss_end
            && (u64::from(sym.bss_start) < ram_base || u64::from(sym.bss_end) > ram_end)
        {
            anyhow::bail!(
                "bss {:#x}..{:#x} lies outside RAM {:#x}..{:#x}",
                sym.bss_start,
                sym.bss_end,
                ram_base,
                ram_end
            );
        }

        let dma_start = u64::from(self.dma.offset);
        let dma_end = dma_start + self.dma.size_bytes()?;
        if dma_start < ram_end && ram_base < dma_end {
            anyhow::bail!(
                "DMA region {:#x}..{:#x} overlaps RAM {:#x}..{:#x}",
                dma_start,
                dma_end,
                ram_base,
                ram_end
            );
        }
        let mask = u64::from(self.irq_mask.address);
        if mask % u64::from(WORD_BYTES) != 0 {
            anyhow::bail!("irq_mask address {:#x} must be word aligned", mask);
        }
        if (mask < ram_end && ram_base < mask + 4) || (mask < dma_end && dma_start < mask + 4) {
            anyhow::bail!("irq_mask address {:#x} overlaps RAM or the DMA region", mask);
        }

        Ok(())
    }

    /// The memory map handed to the firmware routines.
    pub fn to_memory_map(&self) -> Result<MemoryMap> {
        let sym = &self.symbols;
        Ok(MemoryMap {
            bss_start: sym.bss_start,
            bss_end: sym.bss_end,
            heap_start: sym.heap_start.unwrap_or(sym.bss_end),
            data_start: sym.data_start.unwrap_or(sym.bss_start),
            data_end: sym.data_end.unwrap_or(sym.bss_start),
            soc: DeviceRegion::SENTINEL,
            irq_mask: self.irq_mask.address,
            dma: DmaRegion {
                offset: self.dma.offset,
                width: self.dma.cell_width()?,
            },
            data_size: self.data_size,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    #[serde(default)]
    pub manifest: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_steps: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    MaxSteps,
    MemoryViolation,
    Halt,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueDetails {
    pub address: u32,
    pub expected_value: u32,
    #[serde(default)]
    pub mask: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueAssertion {
    pub memory_value: MemoryValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DmaCellsAssertion {
    pub dma_cells: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct IrqMaskAssertion {
    pub irq_mask_value: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct FinalCounterAssertion {
    pub final_counter: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    ExpectedStopReason(StopReasonAssertion),
    MemoryValue(MemoryValueAssertion),
    DmaCells(DmaCellsAssertion),
    IrqMask(IrqMaskAssertion),
    FinalCounter(FinalCounterAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open test script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self
            .inputs
            .manifest
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            anyhow::bail!("Input 'manifest' path cannot be empty");
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
