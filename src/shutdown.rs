use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Cancel the returned token on SIGINT or SIGTERM (Ctrl-C only on non-unix).
///
/// The first signal starts a graceful shutdown; a second one exits at once,
/// even while the session is still being closed.
pub fn install_signal_handlers() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    received = interrupt.recv() => match received {
                        Some(()) => "SIGINT",
                        None => break,
                    },
                    received = terminate.recv() => match received {
                        Some(()) => "SIGTERM",
                        None => break,
                    },
                };
                if tx.send(name).is_err() {
                    break;
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send("Ctrl-C").is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(escalate(rx, token.clone(), || {
        std::process::exit(FORCED_EXIT_CODE)
    }));

    Ok(token)
}

async fn escalate<F: FnOnce()>(
    mut signals: mpsc::UnboundedReceiver<&'static str>,
    token: CancellationToken,
    force_exit: F,
) {
    let Some(first) = signals.recv().await else {
        return;
    };
    tracing::debug!(signal = first, "shutting down");
    token.cancel();

    if let Some(second) = signals.recv().await {
        tracing::warn!(signal = second, "second signal, exiting immediately");
        force_exit();
    }
}

/// Run `fut` unless `token` is cancelled first; `None` means cancelled.
pub async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = fut => Some(output),
    }
}
