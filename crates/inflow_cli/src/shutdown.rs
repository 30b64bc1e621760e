use console::Term;

use inflow::CancelFlag;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C cancels the returned flag so in-flight runs stop at
/// the next page boundary with their checkpoints saved. A second Ctrl+C
/// force quits.
pub(crate) fn setup_shutdown_handler() -> CancelFlag {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current page...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current page");
        }

        handler_flag.cancel();

        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install second Ctrl+C handler");

        if is_tty {
            eprintln!("Force quit!");
        }
        std::process::exit(130);
    });

    cancel
}
