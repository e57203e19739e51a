// Resource caps for the indexing worker and classification of its exit

use std::process::ExitStatus;
use tracing::{debug, warn};

use crate::config::LimitsConfig;

/// Cap this process's address space and CPU time.
///
/// Called by the worker on itself right after startup, so the limits bind
/// only the indexing process. Exceeding the CPU cap delivers SIGXCPU; an
/// allocation beyond the memory cap aborts the process.
#[cfg(unix)]
pub fn apply_self_limits(limits: &LimitsConfig) -> nix::Result<()> {
    use nix::sys::resource::{setrlimit, Resource};

    if limits.cpu_secs > 0 {
        // hard limit a little above soft so SIGXCPU arrives before SIGKILL
        setrlimit(
            Resource::RLIMIT_CPU,
            limits.cpu_secs as _,
            (limits.cpu_secs + 5) as _,
        )?;
        debug!("Worker CPU limit set to {}s", limits.cpu_secs);
    }

    #[cfg(target_os = "linux")]
    if limits.memory_mb > 0 {
        let bytes = limits.memory_mb.saturating_mul(1024 * 1024);
        setrlimit(Resource::RLIMIT_AS, bytes as _, bytes as _)?;
        debug!("Worker memory limit set to {} MiB", limits.memory_mb);
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn apply_self_limits(_limits: &LimitsConfig) -> std::io::Result<()> {
    warn!("Resource limits are not supported on this platform");
    Ok(())
}

/// How the worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    /// Non-zero exit; the worker recorded its own failure
    Failed(i32),
    /// Killed for exceeding its memory or CPU cap
    LimitExceeded(String),
    /// Terminated by some other signal
    Signaled(String),
}

pub fn classify_exit(status: ExitStatus) -> WorkerExit {
    if status.success() {
        return WorkerExit::Success;
    }
    if let Some(code) = status.code() {
        return WorkerExit::Failed(code);
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        use std::os::unix::process::ExitStatusExt;

        if let Some(raw) = status.signal() {
            return match Signal::try_from(raw) {
                Ok(Signal::SIGXCPU) => WorkerExit::LimitExceeded("CPU time limit exceeded".to_string()),
                // allocation failure under RLIMIT_AS aborts or faults
                Ok(Signal::SIGABRT) | Ok(Signal::SIGSEGV) | Ok(Signal::SIGBUS) => {
                    WorkerExit::LimitExceeded(format!(
                        "memory limit likely exceeded (worker died with {})",
                        Signal::try_from(raw).map(|s| s.as_str()).unwrap_or("signal")
                    ))
                }
                Ok(signal) => WorkerExit::Signaled(signal.as_str().to_string()),
                Err(_) => WorkerExit::Signaled(format!("signal {}", raw)),
            };
        }
    }

    warn!("Worker ended with unrecognised status: {:?}", status);
    WorkerExit::Signaled("unknown".to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_classify_exit() {
        assert_eq!(classify_exit(ExitStatus::from_raw(0)), WorkerExit::Success);
        // exit code 2 is encoded in the high byte
        assert_eq!(classify_exit(ExitStatus::from_raw(2 << 8)), WorkerExit::Failed(2));

        let xcpu = nix::sys::signal::Signal::SIGXCPU as i32;
        assert_eq!(
            classify_exit(ExitStatus::from_raw(xcpu)),
            WorkerExit::LimitExceeded("CPU time limit exceeded".to_string())
        );

        let abrt = nix::sys::signal::Signal::SIGABRT as i32;
        assert!(matches!(
            classify_exit(ExitStatus::from_raw(abrt)),
            WorkerExit::LimitExceeded(_)
        ));

        let term = nix::sys::signal::Signal::SIGTERM as i32;
        assert_eq!(
            classify_exit(ExitStatus::from_raw(term)),
            WorkerExit::Signaled("SIGTERM".to_string())
        );
    }
}
