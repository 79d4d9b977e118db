use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use portico_relay::{events, live_router, RelayConfig, RelayState};
use portico_upstream::bootstrap::{self, BootstrapState};
use portico_upstream::{discord, BindingSlot, UpstreamEvents};

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portico=info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    let slot = Arc::new(BindingSlot::new());
    let hub = UpstreamEvents::default();
    let state = RelayState::new(
        slot.clone(),
        hub.clone(),
        RelayConfig {
            history_limit: config.relay.history_limit,
        },
    );

    // CLI/env token overrides the config file.
    let token = args
        .token
        .or_else(|| config.upstream.token.clone())
        .filter(|t| !t.trim().is_empty());

    // The listener comes up right away; binding to the upstream happens in
    // the background so a slow gateway never delays subscribers.
    match token {
        Some(token) => {
            let bootstrap_config = config.upstream.bootstrap();
            tokio::spawn(bind_upstream(token, bootstrap_config, state.clone()));
        }
        None => tracing::warn!("no upstream token configured, serving without live data"),
    }

    let app = live_router().with_state(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("listening on {}", config.server.bind_address);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down (ctrl-c)...");
        })
        .await?;

    Ok(())
}

/// Starts the upstream client, waits through the bootstrap, and only
/// attaches the delta loop once the binding is ready.
async fn bind_upstream(
    token: String,
    bootstrap_config: bootstrap::BootstrapConfig,
    state: RelayState,
) {
    let hub = state.events.clone();
    let slot = state.slot.clone();

    if let Err(e) = discord::spawn_client(&token, hub.clone(), slot.clone()).await {
        tracing::error!("failed to start the upstream client: {e}");
        return;
    }

    let rebuild = {
        let token = token.clone();
        let hub = hub.clone();
        let slot = slot.clone();
        move || {
            let token = token.clone();
            let hub = hub.clone();
            let slot = slot.clone();
            async move {
                if let Err(e) = discord::rebase_client(&token, hub, slot).await {
                    tracing::error!("failed to rebuild the upstream client: {e}");
                }
            }
        }
    };

    let report = bootstrap::wait_for_binding(&slot, &bootstrap_config, rebuild).await;
    match report.state {
        BootstrapState::Bound => {
            events::attach(state);
        }
        // Subscribers can still connect; they just never receive snapshots
        // or deltas until a restart fixes the upstream.
        _ => tracing::error!(
            attempts = report.attempts,
            rebuilds = report.rebuilds,
            "upstream never became ready, serving without live data"
        ),
    }
}
