use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Turns SIGINT/SIGTERM into cancellation of one shared token that the
/// scheduler and long-running commands watch.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();
        tokio::spawn(async move {
            let received = wait_for_signal().await;
            info!(signal = received, "Shutdown requested, finishing in-flight work");
            cancel_token.cancel();
        });
    }

    /// Only a signal cancels the token, so this doubles as "was interrupted".
    pub fn is_shutdown_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

async fn wait_for_signal() -> &'static str {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    /// Conventional status for a process stopped by SIGINT.
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_success(ok: bool) -> Self {
        if ok { ExitCode::Success } else { ExitCode::Failure }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_shell_conventions() {
        assert_eq!(ExitCode::from_success(true).as_i32(), 0);
        assert_eq!(ExitCode::from_success(false).as_i32(), 1);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn cancelled_token_reads_as_shutdown() {
        let token = CancellationToken::new();
        let shutdown = ShutdownCoordinator::new(token.clone());
        assert!(!shutdown.is_shutdown_requested());
        token.cancel();
        assert!(shutdown.is_shutdown_requested());
    }
}
