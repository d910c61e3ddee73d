use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rescuepc_licensing::config::Config;
use rescuepc_licensing::db::{AppState, create_pool, init_db, queries};
use rescuepc_licensing::email::{self, EmailService, Mailer};
use rescuepc_licensing::handlers;
use rescuepc_licensing::models::LicenseStatus;
use rescuepc_licensing::rate_limit::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "rescuepc-licensing")]
#[command(about = "License issuance and verification service for RescuePC")]
struct Cli {
    /// Set the status of one license and exit (issued, active, revoked, ...)
    #[arg(long, requires = "license_key")]
    set_status: Option<LicenseStatus>,

    /// License key for --set-status
    #[arg(long, requires = "set_status")]
    license_key: Option<String>,

    /// Send a sample license email to this address and exit
    #[arg(long)]
    test_email: Option<String>,
}

fn set_license_status(state: &AppState, license_key: &str, status: LicenseStatus) {
    let conn = state.db.get().expect("Failed to get db connection");
    match queries::set_license_status(&conn, license_key, status) {
        Ok(true) => tracing::info!(license_key, status = %status, "License status updated"),
        Ok(false) => {
            eprintln!("ERROR: license {} not found", license_key);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}

/// Periodically drop expired rate-limit windows so idle clients don't accumulate.
fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            let pruned = rate_limiter.prune_expired();
            if pruned > 0 {
                tracing::debug!(
                    pruned,
                    remaining = rate_limiter.tracked_buckets(),
                    "Pruned expired rate-limit buckets"
                );
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rescuepc_licensing=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(environment = %config.environment, version = %config.version, "Starting");

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let mailer = Arc::new(EmailService::new(&config.email));
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        environment: config.environment.clone(),
        version: config.version.clone(),
        stripe: config.stripe.clone(),
        enterprise_enabled: config.enterprise_enabled,
        jwt_secret: config.jwt_secret.clone(),
        license_term_days: config.license_term_days,
        download: config.download.clone(),
        email_alert_to: config.email.alert_to.clone(),
        rate_limiter: rate_limiter.clone(),
        mailer: mailer.clone(),
    };

    if let (Some(status), Some(license_key)) = (cli.set_status, cli.license_key.as_deref()) {
        set_license_status(&state, license_key, status);
        return;
    }

    if let Some(ref to) = cli.test_email {
        match mailer.deliver(&email::sample_license_email(to)).await {
            Ok(result) => tracing::info!(to = %to, ?result, "Test email finished"),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is empty: webhooks will be rejected");
    }
    if config.is_production() && config.email.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY is not set: license emails will not be delivered");
    }

    spawn_cleanup_task(rate_limiter);

    let app = handlers::app(state, &config.cors, config.csp_report_uri.as_deref());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("RescuePC licensing API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
