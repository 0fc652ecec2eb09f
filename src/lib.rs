pub mod api;
pub mod config;
pub mod constants;
pub mod db;
pub mod domain;
pub mod entities;
pub mod services;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;

use anyhow::Context;
pub use config::Config;
use db::Store;
use domain::ApprovalState;
use services::{
    AuthService, LettreNotifier, MemberService, NoopNotifier, Notifier, SeaOrmAuthService,
    SeaOrmMemberService,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" | "-s" | "--serve" => run_server(config, prometheus_handle).await,

        "pending" | "p" => cmd_pending(&config).await,

        "approve" | "a" => {
            if args.len() < 3 {
                println!("Usage: klabu approve <identifier>");
                println!("Example: klabu approve alice@example.org");
                return Ok(());
            }
            cmd_decide(&config, &args[2], true).await
        }

        "reject" | "r" => {
            if args.len() < 3 {
                println!("Usage: klabu reject <identifier>");
                return Ok(());
            }
            cmd_decide(&config, &args[2], false).await
        }

        "remind" => cmd_remind(&config).await,

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Klabu - Club Membership Backend");
    println!("Registration, approval workflow and member onboarding");
    println!();
    println!("USAGE:");
    println!("  klabu <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  serve                 Run the web API server");
    println!("  pending               List members awaiting approval");
    println!("  approve <identifier>  Approve a pending member");
    println!("  reject <identifier>   Reject a pending member");
    println!("  remind                Mail members with an overdue profile picture");
    println!("  init                  Create default config file");
    println!("  help                  Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  klabu serve                       # Start the API server");
    println!("  klabu pending                     # Show the approval queue");
    println!("  klabu approve alice               # Approve by username");
    println!("  klabu approve alice@example.org   # ...or by email");
    println!("  klabu reject STU-4521             # ...or by registration number");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the server, mail and rate limits.");
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Klabu v{} starting server...",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.server.port;
    let api_state = api::create_app_state(config, prometheus_handle).await?;

    // Expired rate-limit windows for idle clients are reclaimed in the
    // background; the limiter itself only prunes lazily per key.
    let prune_handle = {
        let limiter = api_state.limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.prune(Instant::now());
            }
        })
    };

    let app = api::router(api_state).await;
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🌐 Web Server running at http://0.0.0.0:{}", port);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        {
            error!("Web server error: {}", e);
        }
    });

    info!("Server running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    prune_handle.abort();
    server_handle.abort();
    info!("Server stopped");

    Ok(())
}

async fn build_member_service(
    config: &Config,
    store: &Store,
) -> anyhow::Result<SeaOrmMemberService> {
    let notifier: Arc<dyn Notifier> = if config.mail.enabled {
        Arc::new(LettreNotifier::from_config(&config.mail)?)
    } else {
        Arc::new(NoopNotifier)
    };

    Ok(SeaOrmMemberService::new(
        store.clone(),
        notifier,
        config.security.clone(),
        config.onboarding.clone(),
    ))
}

async fn cmd_pending(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let service = build_member_service(config, &store).await?;

    let pending = service
        .list(Some(ApprovalState::Pending), 1, 500)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if pending.is_empty() {
        println!("No members awaiting approval.");
        return Ok(());
    }

    println!("Members awaiting approval:");
    println!("{:-<72}", "");
    for member in &pending {
        println!(
            "[{}] {} <{}> ({})",
            member.id, member.full_name, member.email, member.reg_number
        );
        println!(
            "    Registered: {} | Username: {}",
            member.registered_at.to_rfc3339(),
            member.username
        );
        println!();
    }
    println!("{} member(s) pending.", pending.len());

    Ok(())
}

async fn cmd_decide(config: &Config, identifier: &str, approve: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let auth = SeaOrmAuthService::new(store.clone(), &config.security)?;
    let service = build_member_service(config, &store).await?;

    let Some(account) = auth
        .resolve(identifier)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?
    else {
        println!("No member matches '{identifier}'.");
        return Ok(());
    };

    let changed = if approve {
        service.approve(account.id, "cli").await
    } else {
        service.reject(account.id, "cli").await
    }
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let verb = if approve { "Approved" } else { "Rejected" };
    if changed {
        println!("✓ {} {} <{}>", verb, account.username, account.email);
    } else {
        println!(
            "No change: {} is already {}.",
            account.username, account.approval_state
        );
    }

    Ok(())
}

async fn cmd_remind(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let service = build_member_service(config, &store).await?;

    let reminded = service
        .send_picture_reminders()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Sent {reminded} picture reminder(s).");

    Ok(())
}
