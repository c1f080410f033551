use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questiongo::auth::{FirebaseVerifier, IdentityVerifier};
use questiongo::config::Config;
use questiongo::db::{AppState, DbPool, create_pool, init_db};
use questiongo::email::{DisabledNotifier, Notifier, ResendNotifier};
use questiongo::handlers;
use questiongo::ledger;
use questiongo::payments::Gateways;
use questiongo::rate_limit::RateLimiters;

#[derive(Parser, Debug)]
#[command(name = "questiongo")]
#[command(about = "Payment ledger service for the QuestionGo Q&A marketplace")]
struct Cli {
    /// Delete a user's balance and exit (transaction history is kept)
    #[arg(long, value_name = "USER_ID")]
    reset_balance: Option<String>,
}

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, e);
    std::process::exit(1);
}

fn open_database(path: &str) -> DbPool {
    let pool = create_pool(path).unwrap_or_else(|e| fail("Failed to create database pool", e));
    let conn = pool
        .get()
        .unwrap_or_else(|e| fail("Failed to get connection", e));
    init_db(&conn).unwrap_or_else(|e| fail("Failed to initialize database", e));
    drop(conn);
    pool
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questiongo=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let db = open_database(&config.database_path);

    // Maintenance command: runs against the database and exits
    if let Some(user_id) = cli.reset_balance {
        let conn = db.get().unwrap_or_else(|e| fail("Failed to get connection", e));
        match ledger::reset_balance(&conn, &user_id) {
            Ok(true) => println!("Balance for {} deleted.", user_id),
            Ok(false) => println!("No balance found for {}.", user_id),
            Err(e) => fail("Failed to reset balance", e),
        }
        return;
    }

    let identity: Option<Arc<dyn IdentityVerifier>> = match &config.firebase_project_id {
        Some(project_id) => Some(Arc::new(FirebaseVerifier::new(project_id))),
        None => {
            tracing::warn!("FIREBASE_PROJECT_ID not set; authenticated endpoints will return 503");
            None
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.resend_api_key {
        Some(api_key) => Arc::new(ResendNotifier::new(api_key.clone(), config.email_from.clone())),
        None => {
            tracing::info!("RESEND_API_KEY not set; email notifications disabled");
            Arc::new(DisabledNotifier)
        }
    };

    let gateways = Gateways::from_config(&config);
    tracing::info!(
        stripe = gateways.stripe.is_some(),
        abacatepay = gateways.abacatepay.is_some(),
        "Payment gateways configured"
    );

    let state = AppState {
        db,
        base_url: config.base_url.clone(),
        identity,
        gateways,
        notifier,
    };

    let mut limits = RateLimiters::new(&config.rate_limit)
        .unwrap_or_else(|e| fail("Failed to build rate limiters", e));

    let app = handlers::router(Some(&limits))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    limits.spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| fail("Failed to bind to address", e));

    tracing::info!("QuestionGo server listening on {}", addr);

    // Connect info feeds the per-IP rate limiter
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        fail("Server error", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
