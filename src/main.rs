use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tubenote::api::{start_http_server, AppState};
use tubenote::config::{CredentialStore, Settings};
use tubenote::pipeline::SessionPipeline;
use tubenote::store::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("tubenote=info,tower_http=info,warn")
        .init();

    let matches = Command::new("tubenote")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn a video URL into structured notes")
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Directory for session state and audio artifacts"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("HTTP API listen port"),
        )
        .get_matches();

    let mut settings = Settings::load();
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        settings.data_dir = PathBuf::from(data_dir);
    }
    if let Some(port) = matches.get_one::<String>("port") {
        settings.port = port.parse()?;
    }

    info!("🚀 tubenote starting...");
    info!("📁 Data directory: {}", settings.data_dir.display());
    info!("🔗 Service base URL: {}", settings.base_url);

    let store = SessionStore::open(&settings.data_dir).await?;
    let credentials = CredentialStore::new(&settings.data_dir);
    let pipeline = Arc::new(SessionPipeline::new(
        store.clone(),
        credentials.clone(),
        settings.base_url.clone(),
    ));

    let state = AppState {
        store,
        credentials,
        pipeline,
        base_url: settings.base_url.clone(),
    };

    start_http_server(state, settings.port).await
}
