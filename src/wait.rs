//! Blocking waits for transitions the hypervisor does not report.
//!
//! The tool exposes no push notification, so readiness is polled at a fixed
//! interval. A wait ends when the condition holds, when the optional maximum
//! elapses, or when the cancellation token fires (Ctrl+C in `main`).

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::B2dError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits until the condition holds or the token is cancelled.
    pub max_wait: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Poll `ready` until it returns `true`.
///
/// The condition is checked immediately, then once per `policy.interval`.
pub async fn wait_until<F, Fut>(
    policy: &WaitPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut ready: F,
) -> Result<(), B2dError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let spinner = std::io::stderr().is_terminal().then(|| {
        let s = ProgressBar::new_spinner();
        s.set_message(format!("Waiting for {what}..."));
        s.enable_steady_tick(Duration::from_millis(120));
        s
    });

    let result = loop {
        if cancel.is_cancelled() {
            break Err(B2dError::Cancelled { what: what.into() });
        }
        if ready().await {
            break Ok(());
        }
        if let Some(max) = policy.max_wait
            && started.elapsed() >= max
        {
            break Err(B2dError::WaitTimeout {
                what: what.into(),
                secs: max.as_secs(),
            });
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                break Err(B2dError::Cancelled { what: what.into() });
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }
    };

    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    tracing::debug!(
        what,
        elapsed_ms = started.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "wait finished"
    );
    result
}
