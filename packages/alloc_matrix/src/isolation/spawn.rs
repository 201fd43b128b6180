use std::ffi::OsString;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::isolation::{WorkerCommand, decode_record};
use crate::{CaseOutcome, FailureCause, IsolationError};

/// Runs a worker process with `case_args` appended to `command` and reads its outcome from
/// the worker's standard output.
///
/// The worker's standard error is passed through. A worker that exits unsuccessfully yields a
/// [`FailureCause::WorkerCrashed`] outcome rather than an error.
pub(crate) fn run_spawned(
    command: &WorkerCommand,
    case_args: &[OsString],
) -> Result<CaseOutcome, IsolationError> {
    let output = Command::new(command.program())
        .args(command.args())
        .args(case_args)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(IsolationError::Spawn)?;

    if output.status.success() {
        return decode_record(&output.stdout);
    }

    // Without an exit code the worker was killed by a signal.
    let status = output.status.code().unwrap_or(-1);
    debug!(status, "spawned worker did not exit cleanly");

    Ok(CaseOutcome::Failed(FailureCause::WorkerCrashed { status }))
}
