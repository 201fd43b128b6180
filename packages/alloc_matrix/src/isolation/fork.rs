use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::isolation::{PANIC_EXIT_CODE, RECORD_LEN, decode_record, encode_record};
use crate::{CaseOutcome, FailureCause, IsolationError};

/// Runs `work` in a forked child process and reads its outcome back over a pipe.
///
/// The child never returns from this function: it sends its record and leaves through
/// `_exit()`, so no destructor, atexit handler or stdio buffer inherited from the parent runs
/// twice. Callers must flush any buffered output before calling this.
///
/// A child that panics, is killed or otherwise exits unsuccessfully yields a
/// [`FailureCause::WorkerCrashed`] outcome rather than an error.
#[cfg_attr(test, mutants::skip)] // Process plumbing, exercised end to end by the CLI tests.
pub(crate) fn run_forked<F>(work: F) -> Result<CaseOutcome, IsolationError>
where
    F: FnOnce() -> CaseOutcome,
{
    let (reader, writer) = pipe()?;

    // SAFETY: The harness is single-threaded while measuring. The child only runs `work`,
    // writes to its end of the pipe and leaves via `_exit()`.
    let pid = unsafe { libc::fork() };

    if pid < 0 {
        return Err(IsolationError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        drop(reader);
        run_child(writer, work);
    }

    drop(writer);

    let mut record = Vec::with_capacity(RECORD_LEN);
    let read = File::from(reader).read_to_end(&mut record);

    // Reap the child even if reading failed, so no zombie is left behind.
    let status = wait_for(pid)?;
    read.map_err(IsolationError::Read)?;

    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 {
        decode_record(&record)
    } else {
        debug!(pid, status, "forked worker did not exit cleanly");
        Ok(CaseOutcome::Failed(FailureCause::WorkerCrashed { status }))
    }
}

fn pipe() -> Result<(OwnedFd, OwnedFd), IsolationError> {
    let mut fds = [0; 2];

    // SAFETY: `fds` has room for the two descriptors `pipe()` writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(IsolationError::Pipe(io::Error::last_os_error()));
    }

    // SAFETY: `pipe()` succeeded, so both descriptors are open and owned by nobody else.
    let reader = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    // SAFETY: As above.
    let writer = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    Ok((reader, writer))
}

fn run_child<F>(writer: OwnedFd, work: F) -> !
where
    F: FnOnce() -> CaseOutcome,
{
    let code = match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(outcome) => match File::from(writer).write_all(&encode_record(&outcome)) {
            Ok(()) => 0,
            Err(_) => 1,
        },
        Err(_) => PANIC_EXIT_CODE,
    };

    // SAFETY: Terminates the child immediately. Nothing it owns needs cleanup that the
    // kernel does not do on exit.
    unsafe { libc::_exit(code) }
}

fn wait_for(pid: libc::pid_t) -> Result<libc::c_int, IsolationError> {
    loop {
        let mut status = 0;

        // SAFETY: `pid` is our own child and `status` is a valid place to store its status.
        let result = unsafe { libc::waitpid(pid, &raw mut status, 0) };

        if result == pid {
            return Ok(status);
        }

        let error = io::Error::last_os_error();

        if error.kind() != io::ErrorKind::Interrupted {
            return Err(IsolationError::Wait(error));
        }
    }
}
