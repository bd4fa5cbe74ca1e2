use std::sync::Arc;

use clap::Parser;
use kube::client::Client;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use gopass_operator::config::ServerConfig;
use gopass_operator::{
    telemetry, GpgKeyring, KubeCredentialProvider, KubeSecretStore, RepositoryServer,
    SecretPublisher, SyncEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    //init dotenv
    dotenv::dotenv().ok();
    let config = ServerConfig::parse();
    telemetry::init();

    let kubernetes_client = Client::try_default().await?;

    let keyring = GpgKeyring::new(config.gpg_binary.clone());
    let engine = SyncEngine::new(Arc::new(keyring), config.gpg_binary.clone());
    let server = RepositoryServer::new(
        Arc::new(engine),
        Arc::new(KubeCredentialProvider::new(kubernetes_client.clone())),
        SecretPublisher::new(Arc::new(KubeSecretStore::new(kubernetes_client))),
    );

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sig_term.recv() => info!("SIGTERM received"),
            _ = sig_int.recv() => info!("SIGINT received"),
        }
    };

    server.serve(config.listen_addr, shutdown).await?;
    Ok(())
}
