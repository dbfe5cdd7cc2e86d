//! memoir — chat with your diary.
//! Entries are chunked and embedded on write; questions are answered from
//! the closest chunks, grounded, with a session-scoped transcript.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use memoir::{ai, api, db, AppState, EmbedCache};

#[derive(Parser)]
#[command(name = "memoir", version, about = "Grounded diary chat service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3900", env = "MEMOIR_PORT")]
    port: u16,

    /// SQLite database path
    #[arg(short, long, default_value = "memoir.db", env = "MEMOIR_DB")]
    db: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let diary = db::DiaryDB::open(&args.db).expect("failed to open database");

    let ai_cfg = ai::AiConfig::from_env();
    let ai_status = match &ai_cfg {
        Some(cfg) => format!("llm={}, embed={}", cfg.llm_model, cfg.embed_model),
        None => "disabled".into(),
    };

    let api_key = std::env::var("MEMOIR_API_KEY").ok();
    let auth_status = if api_key.is_some() { "enabled" } else { "disabled" };

    let state = AppState {
        db: Arc::new(diary),
        ai: ai_cfg,
        api_key,
        embed_cache: EmbedCache::new(128),
        started_at: std::time::Instant::now(),
    };
    let app = api::router(state);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        db = %args.db,
        ai = %ai_status,
        auth = auth_status,
        "memoir starting"
    );

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutting down");
}
