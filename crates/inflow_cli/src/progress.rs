//! Progress rendering for sync runs.
//!
//! In a terminal, events drive an indicatif spinner; otherwise they are
//! logged through tracing so structured output stays machine-readable.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use inflow::sync::{ProgressCallback, SyncProgress};

/// Build a progress callback appropriate for the current terminal.
pub(crate) fn make_callback(interactive: bool) -> ProgressCallback {
    if interactive {
        interactive_callback()
    } else {
        logging_callback()
    }
}

fn interactive_callback() -> ProgressCallback {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    let bar = Arc::new(bar);

    Box::new(move |event| match event {
        SyncProgress::Started { repo, resumed_from } => {
            let note = match resumed_from {
                Some(_) => " (resuming from checkpoint)",
                None => "",
            };
            bar.set_message(format!("{repo}{note}"));
        }
        SyncProgress::PageSynced {
            page,
            count,
            total_so_far,
        } => {
            bar.set_message(format!(
                "page {page}: {count} items ({total_so_far} total)"
            ));
        }
        SyncProgress::Retrying {
            attempt,
            category,
            delay,
        } => {
            bar.println(format!(
                "  {} fetch failed ({category}), retry {attempt} in {:.1}s",
                style("!").yellow(),
                delay.as_secs_f64()
            ));
        }
        SyncProgress::RateLimitPause { wait } => {
            bar.println(format!(
                "  {} rate limited, pausing {}s",
                style("!").yellow(),
                wait.as_secs()
            ));
        }
        SyncProgress::Pruned { count } => {
            bar.println(format!("  pruned {count} stale issues"));
        }
        SyncProgress::Finished {
            repo,
            termination,
            pages,
        } => {
            let mark = if termination.is_complete() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            bar.println(format!("{mark} {repo}: {termination} after {pages} pages"));
            bar.set_message(String::new());
        }
        _ => {}
    })
}

fn logging_callback() -> ProgressCallback {
    Box::new(|event| match event {
        SyncProgress::Started { repo, resumed_from } => {
            tracing::info!(repo, resumed = resumed_from.is_some(), "sync started");
        }
        SyncProgress::PageSynced {
            page,
            count,
            total_so_far,
        } => {
            tracing::info!(page, count, total_so_far, "page synced");
        }
        SyncProgress::Retrying {
            attempt,
            category,
            delay,
        } => {
            tracing::warn!(attempt, %category, delay_ms = delay.as_millis() as u64, "retrying fetch");
        }
        SyncProgress::RateLimitPause { wait } => {
            tracing::warn!(wait_secs = wait.as_secs(), "rate limit pause");
        }
        SyncProgress::Pruned { count } => {
            tracing::info!(count, "pruned stale issues");
        }
        SyncProgress::Finished {
            repo,
            termination,
            pages,
        } => {
            tracing::info!(repo, %termination, pages, "sync finished");
        }
        _ => {}
    })
}
