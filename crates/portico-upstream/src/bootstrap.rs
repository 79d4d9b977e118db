//! Bounded wait for the upstream binding after process start. The credential
//! can arrive from a separate authorization flow at any time, so the relay
//! polls instead of assuming the binding exists, and gives up after a fixed
//! retry budget rather than spinning forever.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info};

use crate::BindingSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Waiting,
    Bound,
    Failed,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Polls before giving up.
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// After this many failed polls the re-initialization action fires once.
    pub rebuild_attempt: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            poll_interval: Duration::from_millis(500),
            rebuild_attempt: 3,
        }
    }
}

/// Transition counts, so tests can assert on the machine instead of on log
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub state: BootstrapState,
    pub attempts: u32,
    pub rebuilds: u32,
}

/// Polls the slot until the binding reports ready (`Bound`) or the retry
/// budget is spent (`Failed`). The rebuild action forces a fresh binding
/// object instead of waiting longer on the same one.
///
/// `Failed` is terminal for relay startup: the caller must not attach event
/// listeners, and logs here are the only fatal signal. The host process
/// keeps running either way.
pub async fn wait_for_binding<F, Fut>(
    slot: &BindingSlot,
    config: &BootstrapConfig,
    rebuild: F,
) -> BootstrapReport
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut attempts = 0;
    let mut rebuilds = 0;

    while attempts < config.max_attempts {
        if slot.ready().await {
            info!(attempts, "upstream binding ready");
            return BootstrapReport {
                state: BootstrapState::Bound,
                attempts,
                rebuilds,
            };
        }

        attempts += 1;
        info!(
            attempt = attempts,
            max_attempts = config.max_attempts,
            "waiting for upstream binding"
        );
        tokio::time::sleep(config.poll_interval).await;

        if attempts == config.rebuild_attempt {
            info!("binding still absent, forcing re-initialization");
            rebuild().await;
            rebuilds += 1;
        }
    }

    if slot.ready().await {
        info!(attempts, "upstream binding ready");
        return BootstrapReport {
            state: BootstrapState::Bound,
            attempts,
            rebuilds,
        };
    }

    error!(
        attempts,
        "upstream binding never became ready; live relay disabled"
    );
    BootstrapReport {
        state: BootstrapState::Failed,
        attempts,
        rebuilds,
    }
}
