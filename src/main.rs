//! case-lifecycle: anonymous case submission, advisor responses and identity reveals

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use case_lifecycle::config::Config;
use case_lifecycle::http::create_router;
use case_lifecycle::service::CaseService;

#[derive(Parser)]
#[command(name = "case-lifecycle")]
#[command(about = "Case lifecycle and identity-reveal service")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "case-lifecycle.toml")]
    config: PathBuf,

    /// Directory of the sled database
    #[arg(short, long, env = "CASES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "CASES_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("case_lifecycle=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    info!(config = %cli.config.display(), "starting case-lifecycle");
    info!(data_dir = %config.storage.data_dir.display(), "opening store");

    let db = Arc::new(sled::open(&config.storage.data_dir)?);
    let service = CaseService::new(db, &config)?;

    if let Some(admin) = &config.admin {
        service.bootstrap_admin(&admin.email, &admin.password)?;
    }

    let app = create_router(service.clone(), config.server.body_limit);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    service.flush()?;
    info!("shut down cleanly");

    Ok(())
}
