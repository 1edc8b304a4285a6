use testcontainers_modules::{
    postgres::Postgres,
    testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
};

/// A disposable PostgreSQL instance backing `dev` mode and the test suites.
pub struct DevPostgres(ContainerAsync<Postgres>);

impl DevPostgres {
    /// # Errors
    pub async fn new(container_name: &str) -> anyhow::Result<Self> {
        let container = Postgres::default()
            .with_host_auth()
            .with_tag("17-alpine")
            .with_container_name(container_name)
            .start()
            .await?;

        Ok(Self(container))
    }

    /// # Errors
    pub async fn host_port(&self) -> anyhow::Result<(String, u16)> {
        let Self(container) = self;

        Ok((
            container.get_host().await?.to_string(),
            container.get_host_port_ipv4(5432).await?,
        ))
    }

    /// # Errors
    pub async fn db_url(&self) -> anyhow::Result<String> {
        let (host, port) = self.host_port().await?;

        Ok(format!("postgres://postgres@{host}:{port}/postgres"))
    }
}
