use std::fs;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Args, serde::Deserialize, Clone)]
pub struct Config {
    #[arg(long)]
    #[serde(default)]
    secrets_dir: Option<Utf8PathBuf>,
    #[arg(long, env = "BLOOM_DB_USER", default_value_t = String::from("postgres"))]
    db_user: String,
    #[arg(long, env = "BLOOM_DB_PASSWORD", default_value_t)]
    db_password: String,
    #[arg(long, env = "BLOOM_DB_HOST", default_value_t = String::from("localhost"))]
    db_host: String,
    #[arg(long, env = "BLOOM_DB_PORT", default_value_t = 5432)]
    db_port: u16,
    #[arg(long, env = "BLOOM_DB_NAME", default_value_t = String::from("bloom"))]
    db_name: String,
    #[arg(long, env = "BLOOM_UPLOAD_API_URL")]
    #[serde(default)]
    upload_api_url: Option<Url>,
    #[arg(long, env = "BLOOM_UPLOAD_API_TOKEN", default_value_t)]
    #[serde(default)]
    upload_api_token: String,
    #[arg(long, env = "BLOOM_HOST", default_value_t = String::from("localhost"))]
    host: String,
    #[arg(long, env = "BLOOM_PORT", default_value_t = 8105)]
    port: u16,
}

impl Config {
    /// # Errors
    pub fn from_toml_file(path: &Utf8PathBuf) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(path).context(format!("failed to read config file {path}"))?;

        Ok(toml::from_str(&contents)?)
    }

    /// Credentials mounted as individual files override whatever the
    /// environment supplied.
    ///
    /// # Errors
    pub fn read_secrets(&mut self) -> anyhow::Result<()> {
        let Self {
            secrets_dir,
            db_password,
            upload_api_token,
            ..
        } = self;

        let Some(secrets_dir) = secrets_dir else {
            return Ok(());
        };

        let read_secret = |name: &str| {
            fs::read_to_string(secrets_dir.join(name))
                .context(format!("failed to read secret {name}"))
        };

        *db_password = read_secret("db_password")?;
        *upload_api_token = read_secret("upload_api_token")?;

        Ok(())
    }

    #[must_use]
    pub fn app_address(&self) -> String {
        let Self { host, port, .. } = self;

        format!("{host}:{port}")
    }

    #[must_use]
    pub fn db_url(&self) -> String {
        let Self {
            db_user,
            db_password,
            db_host,
            db_port,
            db_name,
            ..
        } = self;

        format!("postgres://{db_user}:{db_password}@{db_host}:{db_port}/{db_name}")
    }

    #[must_use]
    pub fn upload_api(&self) -> Option<(Url, &str)> {
        let Self {
            upload_api_url,
            upload_api_token,
            ..
        } = self;

        upload_api_url
            .as_ref()
            .map(|url| (url.clone(), upload_api_token.as_str()))
    }
}

#[derive(Parser)]
#[command(name = "bloom-backend", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run against a disposable containerized database
    Dev {
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 8105)]
        port: u16,
    },
    /// Run against a configured database
    Prod {
        /// Read the configuration from a TOML file instead of
        /// flags/environment
        #[arg(long)]
        config_path: Option<Utf8PathBuf>,
        #[command(flatten)]
        config: Config,
        #[arg(long, env = "BLOOM_LOG_DIR")]
        log_dir: Option<Utf8PathBuf>,
    },
}
