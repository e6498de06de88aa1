//! Subcommand handlers, split by workflow.
//!
//! Each workflow runs on at most one background task. The handler drains
//! that task's channel, prints, and turns Ctrl-C into a cooperative cancel.

mod media;
mod separate;
mod setup;
mod status;

pub use media::{convert, download, recent, scan};
pub use separate::separate;
pub use setup::{doctor, switch};
pub use status::status;

use amv_core::{CancellationToken, ProgressEvent};
use tokio::sync::mpsc::UnboundedReceiver;

/// Print events until the sender side closes.
///
/// With a token, the first Ctrl-C cancels it; work stops at the next step
/// or phase boundary and the channel closes as usual.
pub(crate) async fn pump<T>(
    mut rx: UnboundedReceiver<T>,
    token: Option<&CancellationToken>,
    mut print: impl FnMut(&T),
) {
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let cancellable = token.is_some();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => print(&event),
                None => break,
            },
            _ = &mut ctrl_c, if cancellable && !token.is_some_and(|t| t.is_cancelled()) => {
                if let Some(token) = token {
                    token.cancel();
                    eprintln!("Cancelling after the current step...");
                }
            }
        }
    }
}

pub(crate) fn print_progress(event: &ProgressEvent) {
    if event.is_indeterminate() {
        println!("[{}] {}", event.stage, event.message);
    } else {
        println!("[{}] {:>3}% {}", event.stage, event.percent, event.message);
    }
}
