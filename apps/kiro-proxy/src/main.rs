//! Process entrypoint, grounded in the teacher's `apps/gproxy/src/main.rs`:
//! bootstrap from config, build the identity pool and upstream client,
//! mount the router, serve. Simplified relative to the teacher in one
//! respect — no database, no admin UI — and strengthened in another: the
//! teacher declares `tracing-subscriber` but never initializes it; here it
//! actually runs.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use kiro_common::IdentityStatus;
use kiro_engine::events::TracingEventSink;
use kiro_engine::{load_config, EventHub, OAuthRefresher, RequestEngine, UpstreamClient};
use kiro_identity::{CooldownTable, CredentialRefresher, CredentialStore, Identity, RateLimiter, Scheduler};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).with_context(|| format!("loading config {}", cli.config.display()))?;

    let refresher: Arc<dyn CredentialRefresher> = Arc::new(OAuthRefresher::new()?);
    let store = Arc::new(CredentialStore::new(refresher));
    for identity_config in &config.identities {
        store
            .register(Identity {
                id: identity_config.id.clone().into(),
                display_name: identity_config.display_name.clone(),
                enabled: identity_config.enabled,
                credential_path: identity_config.credential_path.clone(),
                request_count: 0,
                error_count: 0,
                last_used: None,
                status: if identity_config.enabled { IdentityStatus::Active } else { IdentityStatus::Suspended },
                affinity_opt_in: identity_config.affinity_opt_in,
            })
            .await;
    }

    let cooldowns = Arc::new(CooldownTable::new());
    let scheduler = Arc::new(Scheduler::new(store.clone(), cooldowns.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let upstream = UpstreamClient::new(config.non_stream_timeout, config.stream_timeout)?;

    let events = EventHub::default();
    events.add_sink(Arc::new(TracingEventSink)).await;

    let engine = RequestEngine::new(
        store,
        scheduler,
        cooldowns,
        rate_limiter,
        upstream,
        events,
        config.error_markers.clone(),
        config.upstream_url.clone(),
    );

    let state = Arc::new(kiro_router::RouterState::new(engine, config.history_budget));
    let app = kiro_router::router(state);

    let bind = format!("{}:{}", config.bind_host, config.bind_port);
    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, identities = config.identities.len(), "kiro-proxy listening");
    axum::serve(listener, app).await?;
    Ok(())
}
