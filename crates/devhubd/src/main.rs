//! devhubd - devhub gateway daemon
//!
//! Local capability gateway between client applications and plugin
//! backends.
//!
//! Usage:
//!   devhubd [config.toml]
//!
//! With no config file the daemon listens on 127.0.0.1:4035 with origin
//! enforcement off and the built-in demo plugin registered.

mod config;
mod demo;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devhub_api::AppState;
use devhub_auth::{OriginPolicy, TokenAuthority};
use devhub_gateway::{EventBroker, PluginRegistry, RegistryListener, RequestRouter};

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args { config_path: None };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            a if !a.starts_with('-') => {
                result.config_path = Some(a.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }
    result
}

fn print_help() {
    eprintln!(
        r#"devhubd - devhub gateway daemon

Usage: devhubd [OPTIONS] [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run with defaults (demo plugin, no origin enforcement)
  devhubd

  # Run with a config file
  devhubd config.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "devhubd=info,devhub_api=info,devhub_gateway=debug,devhub_auth=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting devhubd (devhub gateway daemon)");

    let args = parse_args();
    let cfg = config::load(args.config_path.as_deref())?;

    // Origin policy, optionally persisted, seeded from config
    let policy = match &cfg.origin.allowlist_path {
        Some(path) => OriginPolicy::load(cfg.origin.enforce, path)
            .map_err(|e| anyhow::anyhow!("allowlist load failed: {e}"))?,
        None => OriginPolicy::new(cfg.origin.enforce),
    };
    for entry in &cfg.origin.entries {
        if let Err(e) = policy.add(&entry.pattern, &entry.title) {
            tracing::warn!(pattern = %entry.pattern, error = %e, "Skipping origin entry");
        }
    }
    let policy = Arc::new(policy);

    let authority = Arc::new(TokenAuthority::new(
        cfg.auth.grant_ttl(),
        cfg.auth.retention(),
    ));
    let registry = Arc::new(PluginRegistry::new());
    let router = Arc::new(RequestRouter::new(cfg.router.to_router_config()));
    let broker = Arc::new(EventBroker::new(Arc::clone(&authority)));

    // The broker re-issues event registrations when plugins come back
    registry.add_listener(Arc::clone(&broker) as Arc<dyn RegistryListener>);

    // Periodic token garbage collection
    {
        let authority = Arc::clone(&authority);
        let interval = cfg.auth.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = authority.cleanup();
                if removed > 0 {
                    tracing::info!(removed, "Token cleanup pass");
                }
            }
        });
    }

    if cfg.demo_plugin {
        demo::spawn(
            Arc::clone(&registry),
            Arc::clone(&router),
            Arc::clone(&broker),
        );
    }

    let state = AppState::new(registry, router, broker, authority, policy);
    let app = devhub_api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen).await?;
    tracing::info!(listen = %cfg.listen, "devhubd listening");
    axum::serve(listener, app).await?;

    Ok(())
}
