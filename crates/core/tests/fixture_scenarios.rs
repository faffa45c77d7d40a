// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use dmaprobe_config::FixtureManifest;
use dmaprobe_core::bus::AccessKind;
use dmaprobe_core::{Machine, SimulationError, StopReason};
use dmaprobe_startup::Phase;

fn manifest(width: u32, depth: u32, data_size: u32, echo: &str) -> FixtureManifest {
    let yaml = format!(
        r#"
name: "scenario"
ram:
  base: 0x0
  size: "2KB"
symbols:
  bss_start: 0x700
  bss_end: 0x720
irq_mask:
  address: 0x02000000
dma:
  offset: 0x01000000
  width: {width}
  depth: {depth}
  echo: {echo}
data_size: {data_size}
"#
    );
    FixtureManifest::from_yaml(&yaml).unwrap()
}

#[test]
fn test_plain_word_region_of_four() {
    let mut machine = Machine::from_manifest(&manifest(32, 4, 4, "plain")).unwrap();
    machine.bus.record_accesses();

    assert_eq!(machine.run(Some(1000)), Ok(StopReason::Halt));
    assert_eq!(machine.dma_cells(), vec![0, 1, 2, 3]);
    assert_eq!(machine.counter(), Some(4));

    // counter trace 0 -> 1 -> 2 -> 3 -> 4, read back from each cell
    let reads: Vec<u32> = machine
        .bus
        .access_log()
        .iter()
        .filter(|a| a.kind == AccessKind::Read)
        .map(|a| a.value + 1)
        .collect();
    assert_eq!(reads, vec![1, 2, 3, 4]);
}

#[test]
fn test_zero_data_size_only_masks() {
    let mut machine = Machine::from_manifest(&manifest(32, 4, 0, "plain")).unwrap();
    machine.bus.record_accesses();

    assert_eq!(machine.run(Some(1000)), Ok(StopReason::Halt));
    let log = machine.bus.access_log();
    // 8 bss words, then the mask, then nothing
    assert_eq!(log.len(), 9);
    assert_eq!(log[8].addr, 0x0200_0000);
    assert_eq!(machine.bus.dma().unwrap().reads(), 0);
    assert_eq!(machine.bus.dma().unwrap().writes(), 0);
    assert_eq!(machine.bus.irq_mask().unwrap().writes(), 1);
}

#[test]
fn test_sixteen_cells_every_width() {
    // memory32, memory16 and memory8 regions, 16 cells each
    for width in [32, 16, 8] {
        let mut machine = Machine::from_manifest(&manifest(width, 16, 16, "plain")).unwrap();
        assert_eq!(machine.run(Some(1000)), Ok(StopReason::Halt), "width {width}");
        assert_eq!(machine.dma_cells(), (0..16).collect::<Vec<u32>>());
    }
}

#[test]
fn test_byte_cells_cannot_count_past_256() {
    let mut machine = Machine::from_manifest(&manifest(8, 512, 300, "plain")).unwrap();
    assert_eq!(machine.run(Some(5000)), Ok(StopReason::MaxStepsReached));
    assert!(matches!(machine.phase(), Phase::Workload { counter } if counter <= 256));
}

#[test]
fn test_stuck_cell_never_halts() {
    let mut machine = Machine::from_manifest(&manifest(32, 4, 4, "{stuck: {value: 0}}")).unwrap();
    assert_eq!(machine.run(Some(500)), Ok(StopReason::MaxStepsReached));
    assert_eq!(machine.counter(), Some(1));
    assert_eq!(machine.dma_cells(), vec![0, 1, 0, 0]);
}

#[test]
fn test_scripted_echo_skips_cells() {
    // first read returns 2, so the walk jumps from cell 0 to cell 3
    let mut machine =
        Machine::from_manifest(&manifest(32, 8, 6, "{scripted: {values: [2]}}")).unwrap();
    assert_eq!(machine.run(Some(100)), Ok(StopReason::Halt));
    assert_eq!(machine.dma_cells(), vec![0, 0, 0, 3, 4, 5, 0, 0]);
    assert_eq!(machine.steps(), 8 + 1 + 4);
}

#[test]
fn test_inflated_echo_runs_off_the_region() {
    let mut machine =
        Machine::from_manifest(&manifest(32, 4, 8, "{offset: {delta: 1}}")).unwrap();
    // each read adds one, so the walk strides by two: 0, 2, 4 -> out of range
    let err = machine.run(Some(100)).unwrap_err();
    assert_eq!(err, SimulationError::MemoryViolation(0x0100_0010));
}

#[test]
fn test_inverted_bss_is_a_no_op() {
    let yaml = r#"
name: "inverted"
ram:
  base: 0x0
  size: "2KB"
symbols:
  bss_start: 0x720
  bss_end: 0x700
irq_mask:
  address: 0x02000000
dma:
  offset: 0x01000000
  depth: 2
data_size: 2
"#;
    let manifest = FixtureManifest::from_yaml(yaml).unwrap();
    let mut machine = Machine::from_manifest(&manifest).unwrap();
    machine.bus.ram.fill(0x6F0, 0x730, 0x5A);
    machine.bus.record_accesses();

    assert_eq!(machine.run(None), Ok(StopReason::Halt));
    assert!(machine.bus.access_log().iter().all(|a| a.addr >= 0x0100_0000));
    assert_eq!(machine.read_word(0x700).unwrap(), 0x5A5A_5A5A);
}
