use std::sync::Arc;

use anyhow::{Context, anyhow};
use axum::{Router, routing::get};
use camino::Utf8PathBuf;
use diesel_async::{
    AsyncPgConnection,
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{AsyncDieselConnectionManager, deadpool::Pool},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::{config::Config, db, upload::ScanUploader};
use util::DevPostgres;

mod api;
pub mod util;

/// # Errors
pub(crate) async fn serve(
    log_dir: Option<Utf8PathBuf>,
    config: Option<Config>,
    dev_addr: Option<(String, u16)>,
) -> anyhow::Result<()> {
    initialize_logging(log_dir);

    let app_addr = match (&config, dev_addr) {
        (Some(config), None) => config.app_address(),
        (None, Some((host, port))) => format!("{host}:{port}"),
        _ => {
            return Err(anyhow!(
                "exactly one of `config` or `dev_addr` must be supplied"
            ));
        }
    };

    let app_state = AppState::new(config)
        .await
        .context("failed to initialize app state")?;
    tracing::info!("initialized app state");

    let db_conn = app_state
        .db_conn()
        .await
        .context("failed to connect to database")?;
    run_migrations(db_conn)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("ran database migrations");

    let app = app(app_state.clone());

    let listener = TcpListener::bind(&app_addr)
        .await
        .context(format!("failed to listen on {app_addr}"))?;
    tracing::info!("bloom backend listening on {app_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .context("failed to serve app")?;

    Ok(())
}

fn initialize_logging(log_dir: Option<Utf8PathBuf>) {
    use tracing::Level;
    use tracing_subscriber::{filter::Targets, prelude::*};

    let log_layer = tracing_subscriber::fmt::layer();

    match log_dir {
        None => {
            let dev_test_log_filter = Targets::new()
                .with_target("bloom_backend", Level::DEBUG)
                .with_target("tower_http", Level::TRACE);
            let log_layer = log_layer.pretty().with_filter(dev_test_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
        Some(path) => {
            let log_writer = tracing_appender::rolling::daily(path, "bloom-backend.log");
            let prod_log_filter = Targets::new().with_target("bloom_backend", Level::INFO);
            let log_layer = log_layer
                .json()
                .with_writer(log_writer)
                .with_filter(prod_log_filter);

            tracing_subscriber::registry().with(log_layer).init();
        }
    }
}

#[derive(Clone)]
pub(crate) enum AppState {
    Dev {
        db_pool: Pool<AsyncPgConnection>,
        _pg_container: Arc<DevPostgres>,
        http_client: reqwest::Client,
    },
    Prod {
        db_pool: Pool<AsyncPgConnection>,
        http_client: reqwest::Client,
        config: Arc<Config>,
    },
}

impl AppState {
    async fn new(config: Option<Config>) -> anyhow::Result<Self> {
        let state = match config {
            None => {
                let pg_container = DevPostgres::new("bloom-backend_dev")
                    .await
                    .context("failed to start postgres container instance")?;
                let db_root_url = pg_container.db_url().await?;

                let db_config =
                    AsyncDieselConnectionManager::<AsyncPgConnection>::new(&db_root_url);
                let db_pool = Pool::builder(db_config).build()?;

                Self::Dev {
                    db_pool,
                    _pg_container: Arc::new(pg_container),
                    http_client: reqwest::Client::new(),
                }
            }
            Some(mut config) => {
                config
                    .read_secrets()
                    .context("failed to read secrets directory")?;

                let db_config =
                    AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.db_url());
                let db_pool = Pool::builder(db_config).build()?;

                Self::Prod {
                    db_pool,
                    http_client: reqwest::Client::new(),
                    config: Arc::new(config),
                }
            }
        };

        Ok(state)
    }

    pub(crate) async fn db_conn(
        &self,
    ) -> db::error::Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>>
    {
        use AppState::{Dev, Prod};

        match self {
            Dev { db_pool, .. } | Prod { db_pool, .. } => Ok(db_pool.get().await?),
        }
    }

    /// `None` outside prod, or when no upload API was configured; scan
    /// upload is the one feature that needs the remote collaborator.
    pub(crate) fn uploader(&self) -> Option<ScanUploader> {
        use AppState::{Dev, Prod};

        let (http_client, upload_api): (_, Option<(Url, &str)>) = match self {
            Dev { .. } => return None,
            Prod {
                http_client,
                config,
                ..
            } => (http_client, config.upload_api()),
        };

        upload_api.map(|(base_url, token)| {
            ScanUploader::new(http_client.clone(), base_url, token.to_string())
        })
    }
}

pub(crate) async fn run_migrations(
    db_conn: diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>,
) -> anyhow::Result<()> {
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut wrapper: AsyncConnectionWrapper<
        diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>,
    > = AsyncConnectionWrapper::from(db_conn);

    tokio::task::spawn_blocking(move || {
        wrapper.run_pending_migrations(MIGRATIONS).unwrap();
    })
    .await?;

    Ok(())
}

fn app(app_state: AppState) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .route("/health", get(async || ()))
        .with_state(app_state)
}

// Dropping the app state is what tears down the dev database container
async fn shutdown_signal(app_state: AppState) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        () = ctrl_c => {drop(app_state);},
        () = terminate => {drop(app_state)},
    }
}
