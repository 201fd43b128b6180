use std::io::{self, Write};

use crate::{CaseOutcome, CasePlan, Percentage};

/// How result lines are written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
    /// One comma-separated line per case: wall time, percentage, shape, strategy.
    #[default]
    Csv,

    /// A heading per case followed by an indented line with all three clocks.
    Text,
}

/// The result of one case, ready to be printed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaseReport {
    plan: CasePlan,
    outcome: CaseOutcome,
    percentage: Percentage,
}

impl CaseReport {
    /// Bundles the result of a case.
    #[must_use]
    pub fn new(plan: CasePlan, outcome: CaseOutcome, percentage: Percentage) -> Self {
        Self {
            plan,
            outcome,
            percentage,
        }
    }

    /// The case that was run.
    #[must_use]
    pub fn plan(&self) -> &CasePlan {
        &self.plan
    }

    /// What running it produced.
    #[must_use]
    pub fn outcome(&self) -> &CaseOutcome {
        &self.outcome
    }

    /// How it compares to its baseline.
    #[must_use]
    pub fn percentage(&self) -> Percentage {
        self.percentage
    }

    /// Writes the report in `format`.
    ///
    /// # Errors
    ///
    /// Returns any error from `out`.
    pub fn write_to(&self, format: OutputFormat, out: &mut impl Write) -> io::Result<()> {
        match format {
            OutputFormat::Csv => self.write_csv(out),
            OutputFormat::Text => self.write_text(out),
        }
    }

    fn write_csv(&self, out: &mut impl Write) -> io::Result<()> {
        let shape = self.plan.shape();
        let strategy = self.plan.strategy();

        match self.outcome {
            CaseOutcome::Completed(timings) => writeln!(
                out,
                "{:.6}, {}, {shape}, {strategy}",
                timings.wall().as_secs_f64(),
                self.percentage
            ),
            CaseOutcome::Failed(_) => writeln!(out, "(failed), (failed%), {shape}, {strategy}"),
        }
    }

    fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{}, {}", self.plan.shape(), self.plan.strategy())?;

        match self.outcome {
            CaseOutcome::Completed(timings) => writeln!(
                out,
                "   sys: {:.6} user: {:.6} wall: {:.6}, {}",
                timings.system().as_secs_f64(),
                timings.user().as_secs_f64(),
                timings.wall().as_secs_f64(),
                self.percentage
            )?,
            CaseOutcome::Failed(cause) => writeln!(out, "   (failed: {cause})")?,
        }

        writeln!(out)
    }
}
