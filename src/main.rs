use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use matchnotify::auth::JwtAuth;
use matchnotify::config::{self, Config};
use matchnotify::jobs;
use matchnotify::notification::factory;
use matchnotify::notification::push::{HttpPushSender, NoopPushSender, PushSender};
use matchnotify::notification::NotificationService;
use matchnotify::realtime::fanout::{self, Fanout, LocalFanout, RedisFanout};
use matchnotify::realtime::SessionRegistry;
use matchnotify::store::memory::MemoryStore;
use matchnotify::store::postgres::PgStore;
use matchnotify::store::NotificationStore;
use matchnotify::AppState;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG and MATCHNOTIFY_LOG_JSON may come from .env
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port, ephemeral }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, ephemeral).await
        }
        Some(cli::Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::PurgeExpired) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            let removed = jobs::expiry::sweep(&db).await?;
            println!("Purged {} expired notification(s).", removed);
            Ok(())
        }
        Some(cli::Commands::Token { command }) => handle_token_command(&cfg, command),
        Some(cli::Commands::Notify { command }) => handle_notify_command(cfg, command).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port, false).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    opentelemetry::global::shutdown_tracer_provider();
    result
}

fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // OTLP export is opt-in via OTEL_EXPORTER_OTLP_ENDPOINT
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "matchnotify"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json_logs = matches!(
        std::env::var("MATCHNOTIFY_LOG_JSON").as_deref(),
        Ok("1") | Ok("true")
    );
    let (json_layer, text_layer) = if json_logs {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "matchnotify=debug,tower_http=debug".into()),
        ))
        .with(json_layer)
        .with(text_layer)
        .with(telemetry_layer)
        .init();
    Ok(())
}

/// Real-time fan-out: cross-instance through Redis when configured, otherwise
/// this process only.
async fn build_fanout(cfg: &Config, registry: &SessionRegistry) -> anyhow::Result<Arc<dyn Fanout>> {
    let local = LocalFanout::new(registry.clone());
    let Some(redis_url) = cfg.redis_url.as_deref() else {
        tracing::info!("MATCHNOTIFY_REDIS_URL not set; fan-out limited to this instance");
        return Ok(Arc::new(local));
    };

    tracing::info!("Connecting to Redis...");
    let client = redis::Client::open(redis_url)?;
    let conn = redis::aio::ConnectionManager::new(client.clone()).await?;
    let origin = Uuid::new_v4();
    fanout::spawn_subscriber(client, cfg.fanout_channel.clone(), origin, local.clone());
    tracing::info!(channel = %cfg.fanout_channel, origin = %origin, "Redis fan-out enabled");

    Ok(Arc::new(RedisFanout::new(
        local,
        conn,
        cfg.fanout_channel.clone(),
        origin,
    )))
}

fn build_push(cfg: &Config) -> anyhow::Result<Arc<dyn PushSender>> {
    match cfg.push_url.clone() {
        Some(url) => {
            tracing::info!(url = %url, "push gateway configured");
            Ok(Arc::new(HttpPushSender::new(url, cfg.push_secret.clone())?))
        }
        None => {
            tracing::warn!("MATCHNOTIFY_PUSH_URL not set; push notifications disabled");
            Ok(Arc::new(NoopPushSender))
        }
    }
}

async fn run_server(cfg: Config, port: u16, ephemeral: bool) -> anyhow::Result<()> {
    let store: Arc<dyn NotificationStore> = if ephemeral {
        tracing::warn!("Running with in-memory store; notifications are lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Connecting to database...");
        let db = PgStore::connect(&cfg.database_url).await?;
        tracing::info!("Running migrations...");
        db.migrate().await?;
        Arc::new(db)
    };

    let registry = SessionRegistry::new();
    let fanout = build_fanout(&cfg, &registry).await?;
    let push = build_push(&cfg)?;
    let notifications = NotificationService::new(store.clone(), fanout, push);

    jobs::expiry::spawn(store.clone(), Duration::from_secs(cfg.expiry_sweep_secs));
    tracing::info!(
        every_secs = cfg.expiry_sweep_secs,
        "Background expiry job started"
    );

    let state = Arc::new(AppState {
        store,
        registry,
        notifications,
        auth: JwtAuth::new(&cfg.jwt_secret),
        config: cfg,
    });
    let app = matchnotify::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("matchnotify listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn handle_token_command(cfg: &Config, cmd: cli::TokenCommands) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Issue { user, ttl_secs } => {
            if ttl_secs <= 0 {
                anyhow::bail!("--ttl-secs must be positive");
            }
            let token = JwtAuth::new(&cfg.jwt_secret).issue(user, ttl_secs)?;
            println!("{}", token);
        }
    }
    Ok(())
}

async fn handle_notify_command(cfg: Config, cmd: cli::NotifyCommands) -> anyhow::Result<()> {
    match cmd {
        cli::NotifyCommands::System {
            user,
            title,
            message,
            link,
        } => {
            let db = PgStore::connect(&cfg.database_url).await?;
            let store: Arc<dyn NotificationStore> = Arc::new(db);
            // No sockets live in this process; Redis carries the event to the servers
            let registry = SessionRegistry::new();
            let fanout = build_fanout(&cfg, &registry).await?;
            let push = build_push(&cfg)?;
            let service = NotificationService::new(store, fanout, push);

            let notification = service
                .create_and_flush(factory::system_announcement(user, &title, &message, link))
                .await?;
            println!(
                "Notification created:\n  ID:       {}\n  User:     {}\n  Priority: {}",
                notification.id, notification.user_id, notification.priority
            );
        }
    }
    Ok(())
}
