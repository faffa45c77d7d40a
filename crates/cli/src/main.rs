// dmaprobe - DMA Bring-Up Fixture
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use dmaprobe_config::{FixtureManifest, StopReason, TestAssertion, TestLimits, TestScript};
use dmaprobe_core::{Machine, SimulationError};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(author, version, about = "dmaprobe fixture runner", long_about = None)]
struct Cli {
    /// Enable per-access tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a fixture until it halts or the step limit is hit.
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the fixture manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Maximum number of firmware steps
    #[arg(long, default_value = "100000")]
    max_steps: u64,

    /// Write the final machine state (JSON) here
    #[arg(long)]
    dump: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Path to the fixture manifest (overrides the script input)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Override max steps (takes precedence over script)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Directory to write test artifacts (result.json, memory.json)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    steps_executed: u64,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limits: Option<TestLimits>,
    assertions: Vec<AssertionResult>,
    manifest_hash: String,
    config: TestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct TestConfig {
    manifest: Option<PathBuf>,
    script: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_fixture(args),
        Commands::Test(args) => run_test(args),
    }
}

fn stop_reason_for(err: &SimulationError) -> StopReason {
    match err {
        SimulationError::MemoryViolation(_) | SimulationError::WriteOnly(_) => {
            StopReason::MemoryViolation
        }
    }
}

struct LoopResult {
    stop_reason: StopReason,
    stop_message: Option<String>,
}

fn run_simulation_loop(machine: &mut Machine, max_steps: u64) -> LoopResult {
    info!("Running for at most {} steps...", max_steps);
    match machine.run(Some(max_steps)) {
        Ok(dmaprobe_core::StopReason::Halt) => LoopResult {
            stop_reason: StopReason::Halt,
            stop_message: None,
        },
        Ok(dmaprobe_core::StopReason::MaxStepsReached) => LoopResult {
            stop_reason: StopReason::MaxSteps,
            stop_message: Some(format!(
                "Firmware did not halt within {} steps ({:?})",
                max_steps,
                machine.phase()
            )),
        },
        Err(e) => {
            error!(
                "Simulation error at step {} (address {:#x}): {}",
                machine.steps(),
                e.addr(),
                e
            );
            LoopResult {
                stop_reason: stop_reason_for(&e),
                stop_message: Some(e.to_string()),
            }
        }
    }
}

fn report(machine: &Machine) {
    info!("Simulation loop finished.");
    info!("Steps: {}", machine.steps());
    info!("Phase: {:?}", machine.phase());
    if let Some(mask) = machine.irq_mask_value() {
        info!("IRQ mask: {:#x}", mask);
    }
    info!("DMA cells: {:?}", machine.dma_cells());
}

fn run_fixture(args: RunArgs) -> ExitCode {
    let manifest = match FixtureManifest::from_file(&args.manifest) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to load manifest {:?}: {:#}", args.manifest, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let mut machine = match Machine::from_manifest(&manifest) {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to build machine: {:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let result = run_simulation_loop(&mut machine, args.max_steps);
    report(&machine);

    if let Some(path) = &args.dump {
        if let Err(e) = write_json(path, &machine.snapshot()) {
            error!("Failed to write dump {:?}: {:#}", path, e);
        }
    }

    match result.stop_reason {
        StopReason::Halt => ExitCode::from(EXIT_PASS),
        _ => {
            if let Some(msg) = result.stop_message {
                error!("{}", msg);
            }
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn run_test(args: TestArgs) -> ExitCode {
    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load test script: {:#}", e);
            write_config_error_outputs(&args, None, format!("{:#}", e));
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let manifest_path = args.manifest.clone().or_else(|| {
        script
            .inputs
            .manifest
            .as_deref()
            .map(|m| resolve_script_path(&args.script, m))
    });
    let Some(manifest_path) = manifest_path else {
        let msg = "No manifest given (use --manifest or inputs.manifest)".to_string();
        error!("{}", msg);
        write_config_error_outputs(&args, None, msg);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    };

    let manifest_bytes = match std::fs::read(&manifest_path) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("Failed to read manifest {:?}: {}", manifest_path, e);
            error!("{}", msg);
            write_config_error_outputs(&args, Some(&manifest_path), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let machine = String::from_utf8(manifest_bytes.clone())
        .map_err(anyhow::Error::from)
        .and_then(|yaml| FixtureManifest::from_yaml(&yaml))
        .and_then(|manifest| Machine::from_manifest(&manifest));
    let mut machine = match machine {
        Ok(m) => m,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("Invalid manifest {:?}: {}", manifest_path, msg);
            write_config_error_outputs(&args, Some(&manifest_path), msg);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mut limits = script.limits.clone();
    if let Some(max_steps) = args.max_steps {
        limits.max_steps = max_steps;
    }

    let result = run_simulation_loop(&mut machine, limits.max_steps);
    report(&machine);

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in &script.assertions {
        let passed = evaluate(assertion, &machine, &result.stop_reason);

        if matches!(assertion, TestAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }
        if !passed {
            all_passed = false;
            error!("Assertion failed: {:?}", assertion);
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let abnormal_stop = result.stop_reason != StopReason::Halt && !expected_stop_reason_matched;
    let (status, code) = if !all_passed {
        ("fail", EXIT_ASSERT_FAIL)
    } else if abnormal_stop {
        ("error", EXIT_RUNTIME_ERROR)
    } else {
        ("pass", EXIT_PASS)
    };

    let test_result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        steps_executed: machine.steps(),
        stop_reason: result.stop_reason,
        message: result.stop_message,
        limits: Some(limits),
        assertions: assertion_results,
        manifest_hash: sha256_hex(&manifest_bytes),
        config: TestConfig {
            manifest: Some(manifest_path),
            script: args.script.clone(),
        },
    };
    write_outputs(&args, &test_result, Some(&machine));

    ExitCode::from(code)
}

fn evaluate(assertion: &TestAssertion, machine: &Machine, stop_reason: &StopReason) -> bool {
    match assertion {
        TestAssertion::ExpectedStopReason(a) => a.expected_stop_reason == *stop_reason,
        TestAssertion::MemoryValue(a) => {
            let details = &a.memory_value;
            let mask = details.mask.unwrap_or(u32::MAX);
            match machine.read_word(details.address) {
                Ok(value) => value & mask == details.expected_value & mask,
                Err(e) => {
                    warn!("memory_value at {:#x} unreadable: {}", details.address, e);
                    false
                }
            }
        }
        TestAssertion::DmaCells(a) => {
            let cells = machine.dma_cells();
            cells.get(..a.dma_cells.len()) == Some(&a.dma_cells[..])
        }
        TestAssertion::IrqMask(a) => machine.irq_mask_value() == Some(a.irq_mask_value),
        TestAssertion::FinalCounter(a) => {
            machine.is_halted() && machine.counter() == Some(a.final_counter)
        }
    }
}

fn write_outputs(args: &TestArgs, result: &TestResult, machine: Option<&Machine>) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    if let Err(e) = write_json(&output_dir.join("result.json"), result) {
        error!("Failed to write result.json: {:#}", e);
    }
    if let Some(machine) = machine {
        if let Err(e) = write_json(&output_dir.join("memory.json"), &machine.snapshot()) {
            error!("Failed to write memory.json: {:#}", e);
        }
    }
}

fn write_config_error_outputs(args: &TestArgs, manifest: Option<&PathBuf>, message: String) {
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        stop_reason: StopReason::ConfigError,
        message: Some(message),
        limits: None,
        assertions: Vec::new(),
        manifest_hash: manifest
            .and_then(|p| std::fs::read(p).ok())
            .map(|b| sha256_hex(&b))
            .unwrap_or_default(),
        config: TestConfig {
            manifest: manifest.cloned(),
            script: args.script.clone(),
        },
    };
    write_outputs(args, &result, None);
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let f = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(f, value)?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn resolve_script_path(script_path: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() {
        return p;
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(p)
}
