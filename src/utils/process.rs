//! Child process execution with an optional hard timeout.
//!
//! Children run on a small process-wide tokio runtime so a deadline bounds
//! the wall time of a call, even when a grandchild keeps the pipes open.
//! Callers are synchronous; from async code go through `spawn_blocking`.

use once_cell::sync::OnceCell;
use std::future::Future;
use std::io;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};

static PROCESS_RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> io::Result<&'static Runtime> {
    PROCESS_RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("process-runner")
            .enable_all()
            .build()
    })
}

async fn with_deadline<T>(work: impl Future<Output = io::Result<T>>, timeout: Option<Duration>) -> io::Result<T> {
    let Some(timeout) = timeout else {
        return work.await;
    };
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {:.1}s", timeout.as_secs_f64()),
        )),
    }
}

/// Runs `cmd` to completion, capturing stdout and stderr.
///
/// With a timeout, a child still running at the deadline is killed and an
/// [`io::ErrorKind::TimedOut`] error is returned without waiting for its
/// pipes to close.
pub fn run_captured(cmd: &mut Command, timeout: Option<Duration>) -> io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    runtime()?.block_on(async {
        let child = cmd.spawn()?;
        // Dropping the child on timeout kills it.
        with_deadline(child.wait_with_output(), timeout).await
    })
}

/// Runs `cmd` with stdout and stderr sent to the null device and returns
/// its exit status. The timeout behaves as in [`run_captured`].
pub fn run_quiet(cmd: &mut Command, timeout: Option<Duration>) -> io::Result<ExitStatus> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    runtime()?.block_on(async {
        let mut child = cmd.spawn()?;
        with_deadline(child.wait(), timeout).await
    })
}
