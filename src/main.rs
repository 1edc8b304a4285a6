use bloom_backend::{
    config::{Cli, Command, Config},
    serve_dev_app, serve_prod_app,
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().unwrap_or_default();
    let Cli { command } = Cli::parse();

    match command {
        Command::Dev { host, port } => serve_dev_app(host, port).await?,
        Command::Prod {
            config_path,
            config,
            log_dir,
        } => {
            let config = match config_path {
                Some(path) => Config::from_toml_file(&path)?,
                None => config,
            };

            serve_prod_app(config, log_dir).await?;
        }
    }

    Ok(())
}
