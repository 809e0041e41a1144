use anyhow::Result;
use clap::Parser;
use dqa_backend::config::Settings;
use dqa_backend::server::{self, bootstrap};
use dqa_backend::services::user;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "dqa-user-service", about = "User management service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8001")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;
    bootstrap::init_tracing(&settings.log);

    let state = user::UserServiceState::new();
    let shutdown = Arc::new(Notify::new());

    let handle = tokio::spawn({
        let listen = cli.listen.clone();
        let shutdown = shutdown.clone();
        async move { server::run_server("user-service", &listen, state, shutdown, user::handle).await }
    });

    bootstrap::wait_for_shutdown(&shutdown).await;
    handle.await??;

    Ok(())
}
