//! Running a case in a separate process so that one case cannot disturb the heap, the page
//! tables or the survival of the next one.

#[cfg(unix)]
mod fork;
mod record;
mod spawn;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
pub(crate) use fork::run_forked;
pub(crate) use record::{RECORD_LEN, decode_record, encode_record};
pub(crate) use spawn::run_spawned;

/// Exit status of a worker whose case panicked.
#[cfg(unix)]
pub(crate) const PANIC_EXIT_CODE: i32 = 101;

/// Where a case runs relative to the harness process.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Isolation {
    /// In the harness process itself. Cheapest, but a case that aborts takes the harness down
    /// with it and every case sees the heap left behind by the previous ones.
    #[default]
    InProcess,

    /// In a forked copy of the harness process.
    #[cfg(unix)]
    Fork,

    /// In a freshly started worker process that reports back over its standard output.
    Spawn(WorkerCommand),
}

impl Isolation {
    /// The strongest isolation available on this platform: forking where it exists, else
    /// re-running the current executable as a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the current executable cannot be determined.
    #[cfg(unix)]
    pub fn platform_default() -> io::Result<Self> {
        Ok(Self::Fork)
    }

    /// The strongest isolation available on this platform: forking where it exists, else
    /// re-running the current executable as a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the current executable cannot be determined.
    #[cfg(not(unix))]
    pub fn platform_default() -> io::Result<Self> {
        Ok(Self::Spawn(WorkerCommand::current_exe()?))
    }
}

/// The program and leading arguments that start a worker process.
///
/// The harness appends the arguments describing the case, so the command must end up running
/// `alloc_matrix --worker` or something that speaks the same result record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    /// A worker command that runs `program` with no leading arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A worker command that re-runs the executable of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the current executable cannot be determined.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Adds a leading argument that goes before the case arguments.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The program to run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The leading arguments.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn worker_command_collects_arguments() {
        let command = WorkerCommand::new("/bin/worker").arg("-x").arg("1");

        assert_eq!(command.program(), Path::new("/bin/worker"));
        assert_eq!(command.args(), [OsString::from("-x"), OsString::from("1")]);
    }

    #[test]
    fn current_exe_points_at_this_binary() {
        let command = WorkerCommand::current_exe().unwrap();

        assert!(command.program().is_absolute());
        assert!(command.args().is_empty());
    }

    #[test]
    fn default_isolation_is_in_process() {
        assert_eq!(Isolation::default(), Isolation::InProcess);
    }

    #[cfg(unix)]
    #[test]
    fn platform_default_forks_on_unix() {
        assert_eq!(Isolation::platform_default().unwrap(), Isolation::Fork);
    }
}
