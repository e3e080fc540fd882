use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use fame_domain::config::{Config, ConfigSeverity, CorsConfig};
use fame_domain::error::Error;
use fame_gateway::api;
use fame_gateway::bootstrap;
use fame_gateway::cli::{self, Cli, Command, ConfigCommand};
use fame_gateway::state::AppState;

/// Host process exit codes.
const EXIT_CONFIG: i32 = 1;
const EXIT_REGISTRY: i32 = 2;
const EXIT_DEPENDENCY: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let config = match cli::load_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("config error: {e}");
                    std::process::exit(EXIT_CONFIG);
                }
            };
            run_server(Arc::new(config)).await;
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = match cli::load_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("config error: {e}");
                    std::process::exit(EXIT_CONFIG);
                }
            };
            if !cli::config::validate(&config, &cli.config) {
                std::process::exit(EXIT_CONFIG);
            }
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            match cli::load_config(&cli.config) {
                Ok(config) => cli::config::show(&config),
                Err(e) => {
                    eprintln!("config error: {e}");
                    std::process::exit(EXIT_CONFIG);
                }
            }
        }
        Some(Command::Version) => {
            println!("fame {}", env!("CARGO_PKG_VERSION"));
        }
    }
}

/// Structured JSON tracing for the serve path.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fame_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) {
    tracing::info!("FAME starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        tracing::error!("config validation failed");
        std::process::exit(EXIT_CONFIG);
    }

    // ── Orchestrator (registry, gate, sessions, sandbox, metrics) ────
    let orchestrator = match bootstrap::build_orchestrator(config.clone()).await {
        Ok(built) => built,
        Err(e @ Error::PluginLoad(_)) => {
            tracing::error!(error = %e, "plugin registry failed");
            std::process::exit(EXIT_REGISTRY);
        }
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    tracing::info!(
        plugins = orchestrator.registry().len(),
        "orchestrator ready"
    );

    let state = AppState {
        config: config.clone(),
        orchestrator,
    };

    // ── CORS ─────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure) ─────────────────────────────
    let max_concurrent = config.server.max_concurrent;
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Per-IP rate limit (token bucket via governor) ────────────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: Arc::new(gov_config),
        }
    });

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(governor) = governor_layer {
        router.layer(governor).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "bind failed");
            std::process::exit(EXIT_DEPENDENCY);
        }
    };
    tracing::info!(addr = %addr, "FAME listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(EXIT_DEPENDENCY);
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins. A literal
/// `"*"` allows everything; entries ending in `:*` match any port on that
/// host.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            // Remainder after the prefix must be digits only, so
            // "http://localhost:3000.evil.com" cannot sneak through.
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
