//! Command-line surface: argument parsing, command dispatch, report writing.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use output::{ConsoleFormatter, CsvFormatter, InjectionLog, JsonFormatter};
use runner::CancelFlag;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::RunConfig;
use crate::discovery::discover_contracts;
use crate::pipeline::{run_fuzz, run_verify, InjectPipeline, InstrumentPipeline};

/// Standard exit codes for CI integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitCode {
    Success = 0,       // every unit processed cleanly
    UnitFailures = 1,  // some files failed or some mutants did not compile
    AnalysisError = 2, // batch-level failure (missing input dir, unwritable output)
    ConfigError = 3,   // bad CLI arguments
    InternalError = 4, // bugs and unexpected panics
}

impl ExitCode {
    pub fn as_code(&self) -> i32 {
        *self as i32
    }

    pub fn exit(&self) -> ! {
        std::process::exit(self.as_code())
    }
}

/// The top-level application: parses arguments, runs one subcommand, and
/// writes the CSV/JSON reports next to the console summary.
pub struct CliApp;

impl CliApp {
    pub fn run() -> ExitCode {
        Self::run_with_args(std::env::args().collect())
    }

    pub fn run_with_args(args: Vec<String>) -> ExitCode {
        let matches = match Self::command().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(err) => {
                // clap handles --help/--version by "erroring" with exit 0.
                let _ = err.print();
                return if err.use_stderr() {
                    ExitCode::ConfigError
                } else {
                    ExitCode::Success
                };
            }
        };

        match Self::dispatch(&matches) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:#}");
                ExitCode::AnalysisError
            }
        }
    }

    fn command() -> Command {
        let input = Arg::new("input")
            .short('i')
            .long("input")
            .help("Directory scanned recursively for .sol files")
            .value_name("DIR")
            .default_value("contracts");
        let output = Arg::new("output")
            .short('o')
            .long("output")
            .help("Directory results are written to")
            .value_name("DIR");
        let log_dir = Arg::new("log-dir")
            .long("log-dir")
            .help("Directory for the CSV/JSON run reports")
            .value_name("DIR")
            .default_value("logs");
        let timeout = Arg::new("timeout")
            .long("timeout")
            .help("Per-contract budget for external tool runs, in seconds")
            .value_name("SECS")
            .value_parser(clap::value_parser!(u64))
            .default_value("120");

        Command::new("solmutate")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Reentrancy mutation harness for custodial Solidity contracts")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(
                Command::new("inject")
                    .about("Generate the five-variant mutant catalogue for each contract")
                    .arg(input.clone())
                    .arg(output.clone())
                    .arg(log_dir.clone())
                    .arg(
                        Arg::new("exhaustive")
                            .long("exhaustive")
                            .help("Mutate every detected balance mapping, not just the first")
                            .action(ArgAction::SetTrue),
                    ),
            )
            .subcommand(
                Command::new("instrument")
                    .about("Insert the solvency oracle and aggregate mirroring")
                    .arg(input.clone())
                    .arg(output.clone())
                    .arg(log_dir.clone()),
            )
            .subcommand(
                Command::new("verify")
                    .about("Check that every generated mutant compiles standalone")
                    .arg(input.clone())
                    .arg(
                        Arg::new("solc")
                            .long("solc")
                            .help("Path to the solc binary")
                            .value_name("PATH")
                            .default_value("solc"),
                    )
                    .arg(timeout.clone()),
            )
            .subcommand(
                Command::new("fuzz")
                    .about("Run the property fuzzer over each mutant and report detection")
                    .arg(input)
                    .arg(output)
                    .arg(
                        Arg::new("echidna")
                            .long("echidna")
                            .help("Path to the echidna binary")
                            .value_name("PATH")
                            .default_value("echidna"),
                    )
                    .arg(
                        Arg::new("test-limit")
                            .long("test-limit")
                            .help("Maximum number of fuzzer test cases per contract")
                            .value_name("N")
                            .value_parser(clap::value_parser!(u64))
                            .default_value("1000000"),
                    )
                    .arg(timeout),
            )
    }

    fn dispatch(matches: &ArgMatches) -> Result<ExitCode> {
        match matches.subcommand() {
            Some(("inject", sub)) => Self::run_inject(sub),
            Some(("instrument", sub)) => Self::run_instrument(sub),
            Some(("verify", sub)) => Self::run_verify(sub),
            Some(("fuzz", sub)) => Self::run_fuzz(sub),
            _ => unreachable!("subcommand_required"),
        }
    }

    fn base_config(matches: &ArgMatches, default_output: &str) -> RunConfig {
        let mut config = RunConfig::default();
        if let Some(dir) = matches.try_get_one::<String>("input").ok().flatten() {
            config.input_dir = PathBuf::from(dir);
        }
        config.output_dir = matches
            .try_get_one::<String>("output")
            .ok()
            .flatten()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default_output));
        if let Some(dir) = matches.try_get_one::<String>("log-dir").ok().flatten() {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(secs) = matches.try_get_one::<u64>("timeout").ok().flatten() {
            config.tool_timeout = Duration::from_secs(*secs);
        }
        config
    }

    fn run_inject(matches: &ArgMatches) -> Result<ExitCode> {
        let mut config = Self::base_config(matches, "injected-contracts");
        config.exhaustive = matches.get_flag("exhaustive");

        let files = discover_contracts(&config.input_dir)?;
        tracing::info!(count = files.len(), input = %config.input_dir.display(), "starting injection run");

        let log = InjectionLog::new();
        let summary = InjectPipeline::new(&config, &log).run(&files)?;
        Self::write_run_reports(&config, &log)?;
        print!("{}", ConsoleFormatter::new().format(&log.snapshot()));

        Ok(if summary.failed > 0 {
            ExitCode::UnitFailures
        } else {
            ExitCode::Success
        })
    }

    fn run_instrument(matches: &ArgMatches) -> Result<ExitCode> {
        let config = Self::base_config(matches, "instrumented-contracts");

        let files = discover_contracts(&config.input_dir)?;
        tracing::info!(count = files.len(), input = %config.input_dir.display(), "starting instrumentation run");

        let log = InjectionLog::new();
        let summary = InstrumentPipeline::new(&config, &log).run(&files)?;
        Self::write_run_reports(&config, &log)?;
        print!("{}", ConsoleFormatter::new().format(&log.snapshot()));

        if summary.flagged_for_review > 0 {
            println!(
                "{} file(s) contain balance resets; search the output for [MANUAL] markers.",
                summary.flagged_for_review
            );
        }
        Ok(if summary.failed > 0 {
            ExitCode::UnitFailures
        } else {
            ExitCode::Success
        })
    }

    fn run_verify(matches: &ArgMatches) -> Result<ExitCode> {
        let mut config = Self::base_config(matches, "injected-contracts");
        if let Some(path) = matches.get_one::<String>("solc") {
            config.solc_path = path.clone();
        }

        let files = discover_contracts(&config.input_dir)?;
        let report = run_verify(&config, &files, &CancelFlag::new())?;

        println!("Verified {}/{} mutants.", report.passed, report.total);
        for (file, diagnostic) in &report.failures {
            println!("  [FAILED] {}: {}", file.display(), diagnostic);
        }
        Ok(if report.failures.is_empty() {
            ExitCode::Success
        } else {
            ExitCode::UnitFailures
        })
    }

    fn run_fuzz(matches: &ArgMatches) -> Result<ExitCode> {
        let mut config = Self::base_config(matches, "echidna-results");
        if let Some(path) = matches.get_one::<String>("echidna") {
            config.echidna_path = path.clone();
        }
        if let Some(limit) = matches.get_one::<u64>("test-limit") {
            config.test_limit = *limit;
        }

        let files = discover_contracts(&config.input_dir)?;
        let report = run_fuzz(&config, &files, &CancelFlag::new())?;

        println!(
            "Fuzzed {} mutant(s): {} detected, {} undetected, {} error(s), {} timeout(s).",
            report.total, report.detected, report.undetected, report.errors, report.timeouts
        );
        println!("Detection rate: {:.1}%", report.detection_rate);
        println!(
            "Reports written to {}.",
            config.output_dir.display()
        );
        Ok(if report.errors > 0 {
            ExitCode::UnitFailures
        } else {
            ExitCode::Success
        })
    }

    fn write_run_reports(config: &RunConfig, log: &InjectionLog) -> Result<()> {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;
        let records = log.snapshot();

        let csv_path = config.log_dir.join("injection_report.csv");
        fs::write(&csv_path, CsvFormatter::new().format(&records))
            .with_context(|| format!("writing {}", csv_path.display()))?;

        let json_path = config.log_dir.join("injection_report.json");
        let json = JsonFormatter::new()
            .with_pretty_print(true)
            .format(&records)
            .context("serializing injection report")?;
        fs::write(&json_path, json)
            .with_context(|| format!("writing {}", json_path.display()))?;
        Ok(())
    }
}
