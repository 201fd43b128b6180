#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Binary entry point for the allocation strategy benchmark.
//!
//! This module is excluded from mutation testing because its behavior is process entry and exit.
//! The integration tests in `tests/cli.rs` exercise it by running the built binary.

use std::io::{self, Write};
use std::process::ExitCode;

use alloc_matrix::{
    ArgumentError, CasePlan, CaseReport, Harness, HarnessError, Isolation, IsolationError,
    OutputFormat, WorkerCommand, parse_float_lenient, parse_int_lenient, validate_reference,
};
use arena_pools::NATURAL_ALIGN_CAP;
use argh::FromArgs;
use tracing::Level;

/// Exit code for failures of the harness itself, as opposed to failed benchmark cases.
const INTERNAL_ERROR_EXIT_CODE: u8 = 70;

const MIB: usize = 1 << 20;

/// Options that consume the next argument as their value.
const VALUE_OPTIONS: &[&str] = &[
    "--overaligned",
    "--arena-mib",
    "--arena-bytes",
    "--arena-growth-mib",
    "--arena-growth-bytes",
    "--seed",
];

/// Measures one container workload under one memory allocation strategy and prints its wall
/// clock time relative to the heap baseline.
#[derive(FromArgs)]
struct Args {
    /// log2 of the total number of elements (1..=30)
    #[argh(positional)]
    size: String,

    /// log2 of the number of elements per container (1..=size)
    #[argh(positional)]
    split: String,

    /// container shape (1..=12)
    #[argh(positional)]
    ds: String,

    /// allocation strategy (1..=14)
    #[argh(positional, arg_name = "as")]
    strategy: String,

    /// wall time of the baseline in seconds, 0 when measuring a baseline (1 or 8)
    #[argh(positional)]
    reference: String,

    /// run all 14 strategies for the shape, each relative to its own baseline
    #[argh(switch)]
    sweep: bool,

    /// print system, user and wall time per case instead of one CSV line
    #[argh(switch)]
    text: bool,

    /// run cases in this process instead of an isolated worker
    #[argh(switch)]
    in_process: bool,

    /// isolate cases by starting a new worker process even where fork is available
    #[argh(switch)]
    spawn: bool,

    /// measure heap baselines without fragmenting the heap first
    #[argh(switch)]
    no_churn: bool,

    /// honor alignments up to this power of two in arena-backed strategies
    #[argh(option)]
    overaligned: Option<usize>,

    /// size of the preallocated arena buffer in MiB
    #[argh(option, default = "1024")]
    arena_mib: usize,

    /// size of the preallocated arena buffer in bytes, overrides --arena-mib
    #[argh(option)]
    arena_bytes: Option<usize>,

    /// how many MiB an arena may take from the heap beyond its buffer (unlimited by default)
    #[argh(option)]
    arena_growth_mib: Option<usize>,

    /// how many bytes an arena may take from the heap beyond its buffer, overrides
    /// --arena-growth-mib
    #[argh(option)]
    arena_growth_bytes: Option<usize>,

    /// seed for the generated workload data
    #[argh(option, default = "0")]
    seed: u64,

    /// log harness activity to stderr
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// internal: run one case in this process and write its binary result record to stdout
    #[argh(switch)]
    worker: bool,
}

impl Args {
    fn plan(&self) -> Result<(CasePlan, Option<f64>), ArgumentError> {
        let plan = CasePlan::from_arguments(
            parse_int_lenient(&self.size),
            parse_int_lenient(&self.split),
            parse_int_lenient(&self.ds),
            parse_int_lenient(&self.strategy),
        )?;

        // Workers are started by a harness that already validated the reference.
        let reference = if self.worker {
            None
        } else {
            validate_reference(plan.strategy(), parse_float_lenient(&self.reference))?
        };

        Ok((plan, reference))
    }

    fn max_align(&self) -> Result<Option<usize>, ArgumentError> {
        match self.overaligned {
            Some(max_align) if !max_align.is_power_of_two() || max_align < NATURAL_ALIGN_CAP => {
                Err(ArgumentError::Usage {
                    message: format!(
                        "--overaligned must be a power of two of at least {NATURAL_ALIGN_CAP}, got {max_align}"
                    ),
                })
            }
            max_align => Ok(max_align),
        }
    }

    fn isolation(&self) -> Result<Isolation, IsolationError> {
        if self.in_process || self.worker {
            Ok(Isolation::InProcess)
        } else if self.spawn {
            WorkerCommand::current_exe()
                .map(Isolation::Spawn)
                .map_err(IsolationError::Spawn)
        } else {
            Isolation::platform_default().map_err(IsolationError::Spawn)
        }
    }

    fn harness(&self, max_align: Option<usize>) -> Result<Harness, HarnessError> {
        let arena_bytes = self
            .arena_bytes
            .unwrap_or_else(|| self.arena_mib.saturating_mul(MIB));

        let mut builder = Harness::builder()
            .arena_bytes(arena_bytes)
            .isolation(self.isolation()?)
            .seed(self.seed);

        if self.no_churn {
            builder = builder.no_churn();
        }

        if let Some(max_align) = max_align {
            builder = builder.overaligned(max_align);
        }

        let growth_limit = self
            .arena_growth_bytes
            .or_else(|| self.arena_growth_mib.map(|mib| mib.saturating_mul(MIB)));

        if let Some(growth_limit) = growth_limit {
            builder = builder.arena_growth_limit(growth_limit);
        }

        builder.build()
    }

    fn format(&self) -> OutputFormat {
        if self.text {
            OutputFormat::Text
        } else {
            OutputFormat::Csv
        }
    }
}

fn print(report: &CaseReport, format: OutputFormat) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    report.write_to(format, &mut stdout)?;
    stdout.flush()
}

fn run(
    args: &Args,
    plan: &CasePlan,
    reference: Option<f64>,
    max_align: Option<usize>,
) -> Result<(), HarnessError> {
    let mut harness = args.harness(max_align)?;

    if args.worker {
        return harness.run_worker(plan, &mut io::stdout().lock());
    }

    let format = args.format();

    if args.sweep {
        return harness.sweep(plan.shape(), plan.scale(), |report| print(report, format));
    }

    let report = harness.run_and_report(plan, reference)?;
    print(&report, format)?;

    Ok(())
}

fn is_negative_number(arg: &str) -> bool {
    arg.strip_prefix('-')
        .and_then(|rest| rest.chars().next())
        .is_some_and(|next| next.is_ascii_digit() || next == '.')
}

/// Moves the positional arguments behind a `--` separator, keeping their order.
///
/// The parser treats anything starting with `-` as a switch, which would turn a negative size or
/// reference into a usage error instead of a range error.
fn positionals_last<'a>(args: &[&'a str]) -> Vec<&'a str> {
    let mut options = Vec::with_capacity(args.len() + 1);
    let mut positionals = Vec::new();
    let mut remaining = args.iter().copied();

    while let Some(arg) = remaining.next() {
        if arg == "--" {
            positionals.extend(remaining.by_ref());
        } else if !arg.starts_with('-') || is_negative_number(arg) {
            positionals.push(arg);
        } else {
            options.push(arg);

            if VALUE_OPTIONS.contains(&arg) {
                options.extend(remaining.next());
            }
        }
    }

    if !positionals.is_empty() {
        options.push("--");
        options.append(&mut positionals);
    }

    options
}

// Process entry and exit codes are covered by the integration tests instead.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    let env_args: Vec<String> = std::env::args().collect();
    let str_args: Vec<&str> = env_args.iter().map(String::as_str).collect();

    let program_name = str_args.first().copied().unwrap_or(env!("CARGO_BIN_NAME"));

    let ordered = positionals_last(str_args.get(1..).unwrap_or(&[]));

    let args = match Args::from_args(&[program_name], &ordered) {
        Ok(args) => args,
        Err(early_exit) => {
            return if early_exit.status.is_ok() {
                println!("{}", early_exit.output);
                ExitCode::SUCCESS
            } else {
                eprintln!("{}", early_exit.output);
                ExitCode::from(
                    ArgumentError::Usage {
                        message: early_exit.output,
                    }
                    .exit_code(),
                )
            };
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .with_writer(io::stderr)
        .init();

    let (plan, reference) = match args.plan() {
        Ok(validated) => validated,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let max_align = match args.max_align() {
        Ok(max_align) => max_align,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code());
        }
    };

    match run(&args, &plan, reference, max_align) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(INTERNAL_ERROR_EXIT_CODE)
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn negative_numbers_are_positionals() {
        assert_eq!(
            positionals_last(&["-1", "4", "-.5", "--no-churn", "2", "-0.5"]),
            ["--no-churn", "--", "-1", "4", "-.5", "2", "-0.5"]
        );
    }

    #[test]
    fn option_values_stay_with_their_option() {
        assert_eq!(
            positionals_last(&["4", "--seed", "-3", "2", "--arena-mib", "8", "1"]),
            ["--seed", "-3", "--arena-mib", "8", "--", "4", "2", "1"]
        );
    }

    #[test]
    fn explicit_separator_ends_options() {
        assert_eq!(
            positionals_last(&["4", "--", "--sweep", "2"]),
            ["--", "4", "--sweep", "2"]
        );
    }

    #[test]
    fn switches_alone_get_no_separator() {
        assert_eq!(positionals_last(&["--help"]), ["--help"]);
        assert!(positionals_last(&[]).is_empty());
    }
}
