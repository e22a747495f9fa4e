use mongobox::{InstanceStatus, Server, ServerOptions};

#[derive(serde::Serialize)]
struct Started<'a> {
    uri: String,
    #[serde(flatten)]
    status: &'a InstanceStatus,
    executable: &'a std::path::Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = ServerOptions::from_env();
    tracing::debug!(?options, "starting mongod");
    let server = Server::new(options).await?;

    let status = server.status();
    let line = Started {
        uri: server.connection().uri(),
        status: &status,
        executable: server.executable(),
    };
    println!("{}", serde_json::to_string(&line)?);

    tokio::signal::ctrl_c().await?;
    tracing::info!(instance = %server.id(), "interrupt received, shutting down");
    server.shutdown().await;
    Ok(())
}
