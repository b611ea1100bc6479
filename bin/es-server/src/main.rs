//! EventStream Server
//!
//! Single-process dispatch host:
//! - Subscription store seeded from config
//! - Webhook transport plus in-process log sinks for the other enabled transports
//! - Event bus fed by newline-delimited JSON commands on stdin
//! - Optional Prometheus exporter
//!
//! Stdin commands:
//! {"op":"publish","eventType":"order.placed","payload":{...},"originId":"G1","scope":"origin_members"}
//! {"op":"add_member","groupId":"G1","userId":"U2"}
//! {"op":"remove_member","groupId":"G1","userId":"U2"}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use es_common::{AudienceScope, DomainEvent, OwnerId};
use es_config::{AppConfig, ConfigLoader, SubscriptionSeed};
use es_dispatch::{
    BusConfig, CallbackTransport, DeliveryDispatcher, DeliveryLog, EventBus, EventMatcher,
    EventPublisher, GroupDirectory, GroupMembershipHandler, InMemoryDeliveryLog, RetryPolicy,
    TransportRegistry, WebhookTransport, WebhookTransportConfig,
};
use es_subscription::{
    InMemorySubscriptionStore, NewSubscription, SubscriptionService, TransportCatalog,
    TransportConfig, TransportKind, WebhookConfig,
};

/// EventStream dispatch server
#[derive(Parser, Debug)]
#[command(name = "es-server")]
#[command(about = "Deliver domain events to registered subscribers")]
struct Args {
    /// Path to a TOML config file (default: search standard locations)
    #[arg(long, env = "ESTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Print an example config file and exit
    #[arg(long)]
    print_example_config: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    #[serde(rename_all = "camelCase")]
    Publish {
        event_type: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        origin_id: Option<String>,
        #[serde(default)]
        scope: AudienceScope,
    },
    #[serde(rename_all = "camelCase")]
    AddMember { group_id: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    RemoveMember { group_id: String, user_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    es_common::logging::init_logging("es-server");

    let args = Args::parse();
    if args.print_example_config {
        println!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => ConfigLoader::with_path(path.clone()).load(),
        None => ConfigLoader::new().load(),
    }
    .context("Failed to load configuration")?;

    info!("Starting EventStream server");

    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid metrics listen address: {}", config.metrics.listen_addr))?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let catalog = TransportCatalog::new(&config.transports.enabled, &config.transports.config_required);
    let store = Arc::new(InMemorySubscriptionStore::new());
    let service = SubscriptionService::new(store.clone(), catalog.clone());
    seed_subscriptions(&service, &config.subscriptions).await;

    let registry = build_registry(&config, &catalog)?;
    let directory = Arc::new(GroupDirectory::new());
    let dispatcher = DeliveryDispatcher::new(
        EventMatcher::with_audience(store, directory.clone()),
        Arc::new(registry),
        RetryPolicy::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.initial_backoff_ms),
            config.retry.backoff_multiplier,
            Duration::from_millis(config.retry.max_backoff_ms),
        ),
        config.dispatch.max_concurrent_deliveries,
    );

    let log = Arc::new(InMemoryDeliveryLog::new(config.dispatch.delivery_log_capacity));
    let bus = Arc::new(EventBus::start(
        Arc::new(dispatcher),
        log.clone(),
        BusConfig {
            queue_capacity: config.dispatch.queue_capacity,
            max_in_flight_events: config.dispatch.max_in_flight_events,
            shutdown_grace: Duration::from_millis(config.dispatch.shutdown_grace_ms),
            store_retry_limit: config.dispatch.store_retry_limit,
            store_retry_delay: Duration::from_millis(config.dispatch.store_retry_delay_ms),
        },
    ));
    let groups = GroupMembershipHandler::new(directory, bus.clone());

    info!("EventStream server started, reading commands from stdin");

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        result = read_commands(bus.as_ref(), &groups) => {
            if let Err(e) = result {
                error!(error = %e, "Stdin reader failed");
            }
            info!("Input closed");
        }
    }

    bus.shutdown().await;

    let recorded = log.recent(usize::MAX);
    let succeeded = recorded.iter().filter(|a| a.outcome.is_success()).count();
    info!(
        deliveries = recorded.len(),
        succeeded,
        "EventStream server shutdown complete"
    );
    Ok(())
}

async fn seed_subscriptions(service: &SubscriptionService, seeds: &[SubscriptionSeed]) {
    for seed in seeds {
        let mut input = NewSubscription::new(&seed.transport, &seed.owner);
        if let Some(types) = &seed.event_types {
            input = input.with_event_types(types.iter().cloned());
        }
        if let Some(url) = &seed.webhook_url {
            let mut webhook = WebhookConfig::new(url);
            if let Some(secret) = &seed.webhook_secret {
                webhook = webhook.with_secret(secret);
            }
            input = input.with_transport_config(TransportConfig::Webhook(webhook));
        }
        if let Some(config) = &seed.transport_config {
            input = input.with_transport_config(TransportConfig::Opaque(config.clone()));
        }

        match service.create(input).await {
            Ok(sub) => info!(
                subscription_id = %sub.id(),
                transport = %sub.transport(),
                owner = %sub.owner(),
                "Seeded subscription"
            ),
            Err(e) => warn!(owner = %seed.owner, transport = %seed.transport, error = %e, "Skipped subscription seed"),
        }
    }
}

fn build_registry(config: &AppConfig, catalog: &TransportCatalog) -> Result<TransportRegistry> {
    let mut registry = TransportRegistry::new();

    for kind in catalog.kinds() {
        if kind.is_webhook() {
            let webhook = WebhookTransport::new(WebhookTransportConfig {
                timeout: Duration::from_millis(config.webhook.timeout_ms),
                connect_timeout: Duration::from_millis(config.webhook.connect_timeout_ms),
                user_agent: config.webhook.user_agent.clone(),
                sign_requests: config.webhook.sign_requests,
            })
            .context("Failed to build webhook client")?;
            registry.register(kind.as_str(), Arc::new(webhook));
        } else {
            registry.register(kind.as_str(), Arc::new(log_sink(kind)));
        }
    }

    info!(transports = registry.len(), "Transport registry built");
    Ok(registry)
}

/// In-process sink that writes each delivery to the log
fn log_sink(kind: &TransportKind) -> CallbackTransport {
    let transport = kind.to_string();
    CallbackTransport::from_fn(kind.as_str(), move |sub, event| {
        info!(
            transport = %transport,
            subscription_id = %sub.id(),
            owner = %sub.owner(),
            event_id = %event.id,
            event_type = %event.event_type,
            payload = %event.payload,
            "Event delivered"
        );
        Ok(())
    })
}

async fn read_commands(bus: &EventBus, groups: &GroupMembershipHandler) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed command");
                continue;
            }
        };

        let outcome = match command {
            Command::Publish { event_type, payload, origin_id, scope } => {
                let event = DomainEvent::new(event_type, payload, origin_id).with_scope(scope);
                bus.publish_event(event).await.map(|id| info!(event_id = %id, "Event accepted"))
            }
            Command::AddMember { group_id, user_id } => groups
                .add_member(&group_id, &OwnerId::new(user_id))
                .await
                .map(|m| info!(member_id = %m.member_id, group_id = %m.group_id, "Member added")),
            Command::RemoveMember { group_id, user_id } => groups
                .remove_member(&group_id, &OwnerId::new(user_id))
                .await
                .map(|m| info!(group_id = %group_id, removed = m.is_some(), "Member removal processed")),
        };

        if let Err(e) = outcome {
            error!(error = %e, "Command failed");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
