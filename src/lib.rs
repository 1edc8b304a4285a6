use camino::Utf8PathBuf;

use crate::config::Config;

pub mod capture;
pub mod config;
pub mod db;
pub mod import;
pub(crate) mod schema;
pub mod server;
pub mod upload;

/// # Errors
pub async fn serve_dev_app(host: String, port: u16) -> anyhow::Result<()> {
    server::serve(None, None, Some((host, port))).await
}

/// # Errors
pub async fn serve_prod_app(config: Config, log_dir: Option<Utf8PathBuf>) -> anyhow::Result<()> {
    server::serve(log_dir, Some(config), None).await
}
