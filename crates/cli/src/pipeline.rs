//! Batch pipelines: instrument, inject, verify, fuzz.
//!
//! Each pipeline fans out over input files with rayon where the work is pure
//! per-file computation; each worker owns its `SourceModel` copy and the only
//! shared state is the append-only injection log. Per-unit failures are
//! recorded and never abort the batch.

use crate::config::RunConfig;
use anyhow::{Context, Result};
use detectors::{DetectorConfig, StateDetector};
use instrument::Instrumenter;
use mutation::{MutationAssembler, VariantGenerator};
use output::{InjectionLog, InjectionRecord, Operation, Outcome, RunSummary};
use rayon::prelude::*;
use regex::Regex;
use runner::{analyze_fuzzer_log, CancelFlag, FuzzConfig, FuzzStatus, FuzzerRunner, SolcVerifier};
use serde::{Deserialize, Serialize};
use source::SourceModel;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

/// `withdraw_<template>` for a mutant carrying an injection marker.
fn injected_entrypoint(model: &SourceModel) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[INJECTED:([A-Za-z_]\w*)\]").unwrap());
    re.captures(&model.text())
        .map(|caps| format!("withdraw_{}", &caps[1]))
}

/// Output path mirroring the input's position under the input directory.
/// Discovery is recursive, so flattening would let same-named files in
/// different subdirectories clobber each other's output.
fn mirrored_output(config: &RunConfig, input: &Path, file_name: &str) -> PathBuf {
    let rel_dir = input
        .strip_prefix(&config.input_dir)
        .ok()
        .and_then(|rel| rel.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    config.output_dir.join(rel_dir).join(file_name)
}

fn write_output(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

fn detector_for(config: &RunConfig) -> StateDetector {
    StateDetector::new(DetectorConfig {
        exhaustive: config.exhaustive,
        ..DetectorConfig::default()
    })
}

/// Generate mutants for every (file, target, template) combination.
pub struct InjectPipeline<'a> {
    config: &'a RunConfig,
    log: &'a InjectionLog,
}

impl<'a> InjectPipeline<'a> {
    pub fn new(config: &'a RunConfig, log: &'a InjectionLog) -> Self {
        Self { config, log }
    }

    pub fn run(&self, files: &[PathBuf]) -> Result<RunSummary> {
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("creating output dir {}", self.config.output_dir.display())
        })?;

        files.par_iter().for_each(|file| self.process_file(file));
        Ok(self.log.summary())
    }

    fn process_file(&self, path: &Path) {
        let started = Instant::now();
        let model = match SourceModel::from_file(path) {
            Ok(model) => model,
            Err(err) => {
                self.log.append(
                    InjectionRecord::new(
                        path,
                        "-",
                        Operation::Inject,
                        Outcome::Failed(err.to_string()),
                    )
                    .with_elapsed(started.elapsed().as_secs_f64()),
                );
                return;
            }
        };

        let detector = detector_for(self.config);
        let detection = detector.detect(&model);
        for warning in &detection.warnings {
            tracing::warn!(file = %path.display(), %warning);
        }

        let assembler = MutationAssembler::new();
        for target in detector.pair_targets(&detection) {
            for template in VariantGenerator::variants(&target) {
                let started = Instant::now();
                let record = match assembler.assemble(&model, &target, &template) {
                    Ok(mutant) => {
                        let out_path = mirrored_output(self.config, path, &mutant.file_name());
                        match write_output(&out_path, &mutant.text) {
                            Ok(()) => InjectionRecord::new(
                                path,
                                target.descriptor(),
                                Operation::Inject,
                                Outcome::Generated,
                            )
                            .with_template(template.id.as_str())
                            .with_output(out_path),
                            Err(err) => InjectionRecord::new(
                                path,
                                target.descriptor(),
                                Operation::Inject,
                                Outcome::Failed(format!("write failed: {err}")),
                            )
                            .with_template(template.id.as_str()),
                        }
                    }
                    Err(err) => InjectionRecord::new(
                        path,
                        target.descriptor(),
                        Operation::Inject,
                        Outcome::Failed(err.to_string()),
                    )
                    .with_template(template.id.as_str()),
                };
                self.log
                    .append(record.with_elapsed(started.elapsed().as_secs_f64()));
            }
        }
    }
}

/// Instrument every input with the solvency invariant.
pub struct InstrumentPipeline<'a> {
    config: &'a RunConfig,
    log: &'a InjectionLog,
}

impl<'a> InstrumentPipeline<'a> {
    pub fn new(config: &'a RunConfig, log: &'a InjectionLog) -> Self {
        Self { config, log }
    }

    pub fn run(&self, files: &[PathBuf]) -> Result<RunSummary> {
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("creating output dir {}", self.config.output_dir.display())
        })?;

        files.par_iter().for_each(|file| self.process_file(file));
        Ok(self.log.summary())
    }

    fn process_file(&self, path: &Path) {
        let started = Instant::now();
        let model = match SourceModel::from_file(path) {
            Ok(model) => model,
            Err(err) => {
                self.log.append(
                    InjectionRecord::new(
                        path,
                        "-",
                        Operation::Instrument,
                        Outcome::Failed(err.to_string()),
                    )
                    .with_elapsed(started.elapsed().as_secs_f64()),
                );
                return;
            }
        };

        let detector = detector_for(self.config);
        let detection = detector.detect(&model);
        let Some(target) = detector.pair_targets(&detection).into_iter().next() else {
            self.log.append(
                InjectionRecord::new(
                    path,
                    "-",
                    Operation::Instrument,
                    Outcome::Failed("no accounting target".to_string()),
                )
                .with_elapsed(started.elapsed().as_secs_f64()),
            );
            return;
        };

        let result = Instrumenter::default().instrument(&model, &target);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "contract.sol".to_string());
        let out_path = mirrored_output(self.config, path, &file_name);

        let outcome = match write_output(&out_path, &result.model.text()) {
            Err(err) => Outcome::Failed(err.to_string()),
            Ok(()) if result.stats.is_noop() => Outcome::SkippedDuplicate,
            Ok(()) if result.stats.flagged_resets > 0 => Outcome::FlaggedForReview,
            Ok(()) => Outcome::Generated,
        };
        self.log.append(
            InjectionRecord::new(path, target.descriptor(), Operation::Instrument, outcome)
                .with_output(out_path)
                .with_elapsed(started.elapsed().as_secs_f64()),
        );
    }
}

/// Result of compile-verifying one batch of mutants.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VerifyReport {
    pub total: usize,
    pub passed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

/// Run `solc` over every mutant, in parallel.
pub fn run_verify(
    config: &RunConfig,
    files: &[PathBuf],
    cancel: &CancelFlag,
) -> Result<VerifyReport> {
    let verifier = SolcVerifier::new()
        .with_solc_path(config.solc_path.clone())
        .with_timeout(config.tool_timeout);

    let results: Vec<(PathBuf, Result<runner::VerifyOutcome, runner::RunnerError>)> = files
        .par_iter()
        .map(|file| (file.clone(), verifier.verify(file, cancel)))
        .collect();

    let mut report = VerifyReport {
        total: files.len(),
        ..VerifyReport::default()
    };
    for (file, result) in results {
        match result {
            Ok(outcome) if outcome.passed => report.passed += 1,
            Ok(outcome) => report.failures.push((file, outcome.diagnostic)),
            Err(err) => report.failures.push((file, err.to_string())),
        }
    }
    Ok(report)
}

/// One fuzzing row, mirroring the detection-results report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzRecord {
    pub file: String,
    pub contract: String,
    pub status: FuzzStatus,
    pub detected: bool,
    pub time_secs: f64,
    /// Seconds from fuzzing start to first falsification, when the log
    /// carries timestamps.
    pub secs_to_detection: Option<f64>,
    /// Whether the vulnerable withdrawal entrypoint appears in a reported
    /// call sequence.
    pub entrypoint_activated: bool,
}

/// Aggregated fuzzing outcome for one batch.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FuzzReport {
    pub total: usize,
    pub detected: usize,
    pub undetected: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub detection_rate: f64,
    pub records: Vec<FuzzRecord>,
}

impl FuzzReport {
    fn from_records(records: Vec<FuzzRecord>) -> Self {
        let total = records.len();
        let detected = records.iter().filter(|r| r.detected).count();
        let undetected = records
            .iter()
            .filter(|r| r.status == FuzzStatus::Undetected)
            .count();
        let errors = records
            .iter()
            .filter(|r| r.status == FuzzStatus::Error)
            .count();
        let timeouts = records
            .iter()
            .filter(|r| r.status == FuzzStatus::Timeout)
            .count();
        let detection_rate = if total > 0 {
            detected as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            detected,
            undetected,
            errors,
            timeouts,
            detection_rate,
            records,
        }
    }
}

/// Run the fuzzer over every mutant, sequentially (each run is heavy and
/// owns a corpus directory), honoring the shared cancellation flag.
pub fn run_fuzz(config: &RunConfig, files: &[PathBuf], cancel: &CancelFlag) -> Result<FuzzReport> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating results dir {}", config.output_dir.display()))?;

    let runner = FuzzerRunner::new(FuzzConfig {
        echidna_path: config.echidna_path.clone(),
        timeout: config.tool_timeout,
        test_limit: config.test_limit,
        corpus_dir: config.output_dir.clone(),
    });

    let mut records = Vec::with_capacity(files.len());
    for file in files {
        if cancel.is_cancelled() {
            break;
        }
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        // The contract name the assembler derived is the first declaration;
        // the injection marker names the vulnerable entrypoint.
        let model = SourceModel::from_file(file).ok();
        let contract = model
            .as_ref()
            .and_then(|m| m.contract_name())
            .unwrap_or_else(|| file_name.trim_end_matches(".sol").to_string());
        let entrypoint = model
            .as_ref()
            .and_then(injected_entrypoint)
            .unwrap_or_else(|| "withdraw".to_string());

        let record = match runner.run(file, &contract, cancel) {
            Ok(verdict) => {
                let raw_path = config.output_dir.join(format!("{file_name}.txt"));
                if let Err(err) = fs::write(&raw_path, &verdict.raw_output) {
                    tracing::warn!(path = %raw_path.display(), %err, "failed to save fuzzer output");
                }
                let analysis = analyze_fuzzer_log(&verdict.raw_output, &entrypoint);
                FuzzRecord {
                    file: file_name,
                    contract,
                    detected: verdict.status == FuzzStatus::Detected,
                    status: verdict.status,
                    time_secs: verdict.elapsed_secs,
                    secs_to_detection: analysis.seconds_to_detection,
                    entrypoint_activated: analysis.entrypoint_activated,
                }
            }
            Err(err) => {
                tracing::error!(file = %file.display(), %err, "fuzzer run failed");
                FuzzRecord {
                    file: file_name,
                    contract,
                    status: FuzzStatus::Error,
                    detected: false,
                    time_secs: 0.0,
                    secs_to_detection: None,
                    entrypoint_activated: false,
                }
            }
        };
        records.push(record);
    }

    let report = FuzzReport::from_records(records);
    write_fuzz_reports(config, &report)?;
    Ok(report)
}

fn write_fuzz_reports(config: &RunConfig, report: &FuzzReport) -> Result<()> {
    let csv_path = config.output_dir.join("detection_results.csv");
    let mut csv = String::from(
        "file,contract,status,detected,time_secs,secs_to_detection,entrypoint_activated\n",
    );
    for record in &report.records {
        csv.push_str(&format!(
            "{},{},{},{},{:.2},{},{}\n",
            output::csv::escape(&record.file),
            output::csv::escape(&record.contract),
            record.status.label(),
            record.detected,
            record.time_secs,
            record
                .secs_to_detection
                .map(|s| format!("{s:.2}"))
                .unwrap_or_default(),
            record.entrypoint_activated
        ));
    }
    fs::write(&csv_path, csv).with_context(|| format!("writing {}", csv_path.display()))?;

    let json_path = config.output_dir.join("summary.json");
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"pragma solidity ^0.8.0;

contract Bank {
    mapping(address => uint256) public balances;

    function deposit() public payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw(uint256 amount) public {
        require(balances[msg.sender] >= amount);
        balances[msg.sender] -= amount;
        payable(msg.sender).transfer(amount);
    }
}
"#;

    fn config_in(dir: &Path) -> RunConfig {
        RunConfig {
            input_dir: dir.join("contracts"),
            output_dir: dir.join("out"),
            log_dir: dir.join("logs"),
            ..RunConfig::default()
        }
    }

    #[test]
    fn inject_pipeline_writes_five_mutants_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.input_dir).unwrap();
        let input = config.input_dir.join("Bank.sol");
        fs::write(&input, BANK).unwrap();

        let log = InjectionLog::new();
        let summary = InjectPipeline::new(&config, &log)
            .run(&[input])
            .unwrap();

        assert_eq!(summary.generated, 5);
        assert_eq!(summary.failed, 0);
        let written: Vec<_> = fs::read_dir(&config.output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(written.len(), 5);
        assert!(written
            .iter()
            .any(|name| name == "Bank_balances_classic_call.sol"));
    }

    #[test]
    fn inject_pipeline_records_unreadable_files_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let log = InjectionLog::new();
        let summary = InjectPipeline::new(&config, &log)
            .run(&[dir.path().join("Missing.sol")])
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.generated, 0);
    }

    #[test]
    fn rerun_overwrites_rather_than_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(&config.input_dir).unwrap();
        let input = config.input_dir.join("Bank.sol");
        fs::write(&input, BANK).unwrap();

        for _ in 0..2 {
            let log = InjectionLog::new();
            InjectPipeline::new(&config, &log).run(&[input.clone()]).unwrap();
        }
        assert_eq!(fs::read_dir(&config.output_dir).unwrap().count(), 5);
    }

    #[test]
    fn instrument_pipeline_is_idempotent_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        fs::create_dir_all(&config.input_dir).unwrap();
        let input = config.input_dir.join("Bank.sol");
        fs::write(&input, BANK).unwrap();

        let log = InjectionLog::new();
        let summary = InstrumentPipeline::new(&config, &log).run(&[input]).unwrap();
        assert_eq!(summary.generated, 1);

        let first_pass = fs::read_to_string(config.output_dir.join("Bank.sol")).unwrap();
        assert!(first_pass.contains("echidna_test_solvency"));

        // Feed the instrumented output back in.
        config.input_dir = config.output_dir.clone();
        config.output_dir = dir.path().join("out2");
        let log = InjectionLog::new();
        let summary = InstrumentPipeline::new(&config, &log)
            .run(&[config.input_dir.join("Bank.sol")])
            .unwrap();
        assert_eq!(summary.skipped_duplicates, 1);

        let second_pass = fs::read_to_string(config.output_dir.join("Bank.sol")).unwrap();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn same_named_inputs_in_subdirectories_keep_separate_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(config.input_dir.join("a")).unwrap();
        fs::create_dir_all(config.input_dir.join("b")).unwrap();
        let vault = config.input_dir.join("a/Bank.sol");
        let treasury = config.input_dir.join("b/Bank.sol");
        fs::write(&vault, BANK.replace("contract Bank", "contract Vault")).unwrap();
        fs::write(&treasury, BANK.replace("contract Bank", "contract Treasury")).unwrap();

        let log = InjectionLog::new();
        let summary = InstrumentPipeline::new(&config, &log)
            .run(&[vault, treasury])
            .unwrap();

        assert_eq!(summary.generated, 2);
        assert_eq!(summary.failed, 0);
        let a = fs::read_to_string(config.output_dir.join("a/Bank.sol")).unwrap();
        let b = fs::read_to_string(config.output_dir.join("b/Bank.sol")).unwrap();
        assert!(a.contains("contract Vault"));
        assert!(b.contains("contract Treasury"));
    }

    #[test]
    fn mutants_mirror_the_input_subdirectory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        fs::create_dir_all(config.input_dir.join("a")).unwrap();
        fs::create_dir_all(config.input_dir.join("b")).unwrap();
        let first = config.input_dir.join("a/Bank.sol");
        let second = config.input_dir.join("b/Bank.sol");
        fs::write(&first, BANK).unwrap();
        fs::write(&second, BANK.replace("contract Bank", "contract Treasury")).unwrap();

        let log = InjectionLog::new();
        let summary = InjectPipeline::new(&config, &log)
            .run(&[first, second])
            .unwrap();

        assert_eq!(summary.generated, 10);
        let a_mutant = config.output_dir.join("a/Bank_balances_classic_call.sol");
        let b_mutant = config.output_dir.join("b/Bank_balances_classic_call.sol");
        assert!(fs::read_to_string(&a_mutant)
            .unwrap()
            .contains("contract Bank_Inj_balances_classic_call"));
        assert!(fs::read_to_string(&b_mutant)
            .unwrap()
            .contains("contract Treasury_Inj_balances_classic_call"));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn fuzz_pipeline_classifies_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.echidna_path = fake_tool(
            dir.path(),
            "fake-echidna",
            "#!/bin/sh\necho 'echidna_test_classic_call: falsified!'\n",
        );
        let mutant = dir.path().join("Bank_balances_classic_call.sol");
        fs::write(&mutant, BANK.replace("contract Bank", "contract Bank_Inj")).unwrap();

        let report = run_fuzz(&config, &[mutant], &CancelFlag::new()).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.detected, 1);
        assert_eq!(report.detection_rate, 100.0);
        assert!(config.output_dir.join("detection_results.csv").exists());
        assert!(config.output_dir.join("summary.json").exists());
        let raw = fs::read_to_string(
            config
                .output_dir
                .join("Bank_balances_classic_call.sol.txt"),
        )
        .unwrap();
        assert!(raw.contains("falsified"));
    }

    #[cfg(unix)]
    #[test]
    fn fuzz_csv_quotes_awkward_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.echidna_path = fake_tool(
            dir.path(),
            "fake-echidna",
            "#!/bin/sh\necho 'echidna_test_classic_call: falsified!'\n",
        );
        let mutant = dir.path().join("Bank,legacy.sol");
        fs::write(&mutant, BANK).unwrap();

        run_fuzz(&config, &[mutant], &CancelFlag::new()).unwrap();
        let csv =
            fs::read_to_string(config.output_dir.join("detection_results.csv")).unwrap();
        assert!(csv.contains("\"Bank,legacy.sol\""));
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with(",false") || row.ends_with(",true"));
    }

    #[cfg(unix)]
    #[test]
    fn verify_report_groups_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.solc_path = fake_tool(
            dir.path(),
            "fake-solc",
            "#!/bin/sh\ncase \"$2\" in *Good*) exit 0;; *) echo 'Error: boom' >&2; exit 1;; esac\n",
        );
        let good = dir.path().join("Good.sol");
        let bad = dir.path().join("Bad.sol");
        fs::write(&good, "contract G {}").unwrap();
        fs::write(&bad, "contract B {").unwrap();

        let report = run_verify(&config, &[good, bad], &CancelFlag::new()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].1, "Error: boom");
    }
}
