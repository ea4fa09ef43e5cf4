//! CLI command handlers, one module per subcommand.
//!
//! Every handler returns the process exit code it wants (see spec.md's
//! CLI exit codes: 0 success, 1 generic error, 2 partial success, 3
//! cancelled) rather than bailing through `anyhow` for outcomes that are
//! expected, not exceptional.

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_PARTIAL: i32 = 2;
pub const EXIT_CANCELLED: i32 = 3;

pub mod decompose;
pub mod emit;
pub mod loop_cmd;
pub mod merge;
pub mod scatter;
pub mod shred;
pub mod validate;

use tokio::sync::mpsc;

/// Drain an event channel onto the tracing log for the duration of a
/// command, so progress is visible without the caller threading a sink
/// through every call site.
pub fn spawn_event_logger<E>(mut rx: mpsc::Receiver<E>) -> tokio::task::JoinHandle<()>
where
    E: std::fmt::Debug + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tracing::info!(?event, "progress");
        }
    })
}

/// Build a cooperative cancellation token that flips on Ctrl-C.
pub fn cancel_on_ctrl_c() -> tokio_util::sync::CancellationToken {
    let token = tokio_util::sync::CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}
