use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::deployment::ServerTemplate;

/// Operator managing one gopass-server per GopassRepository
#[derive(Parser, Debug, Clone)]
#[command(name = "gopass-operator", version)]
pub struct OperatorConfig {
    /// Namespace the gopass-server deployments and services are created in
    #[arg(long, env = "GOPASS_OPERATOR_NAMESPACE", default_value = "default")]
    pub namespace: String,

    #[arg(long, env = "GOPASS_SERVER_IMAGE", default_value = "gopass-server:latest")]
    pub server_image: String,

    #[arg(long, env = "GOPASS_IMAGE_PULL_POLICY", default_value = "IfNotPresent")]
    pub image_pull_policy: String,

    /// Service account of the gopass-server pods; needs read access to the referenced secrets
    #[arg(long, env = "GOPASS_SERVER_SERVICE_ACCOUNT")]
    pub service_account: Option<String>,

    /// Address serving /health and /metrics
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    pub health_addr: SocketAddr,

    /// Print the CustomResourceDefinition and exit
    #[arg(long)]
    pub crd: bool,
}

impl OperatorConfig {
    pub fn server_template(&self) -> ServerTemplate {
        ServerTemplate {
            namespace: self.namespace.clone(),
            image: self.server_image.clone(),
            image_pull_policy: self.image_pull_policy.clone(),
            service_account: self.service_account.clone(),
        }
    }
}

/// Per-repository server cloning a gopass repository and rendering it into a secret
#[derive(Parser, Debug, Clone)]
#[command(name = "gopass-server", version)]
pub struct ServerConfig {
    #[arg(long, env = "GOPASS_SERVER_ADDR", default_value = "0.0.0.0:9000")]
    pub listen_addr: SocketAddr,

    #[arg(long, env = "GPG_BINARY", default_value = "gpg")]
    pub gpg_binary: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_defaults() {
        let config = OperatorConfig::try_parse_from(["gopass-operator"]).unwrap();
        let template = config.server_template();

        assert_eq!(template, ServerTemplate::default());
        assert_eq!(config.health_addr.port(), 8080);
        assert!(!config.crd);
    }

    #[test]
    fn operator_flags_override_defaults() {
        let config = OperatorConfig::try_parse_from([
            "gopass-operator",
            "--namespace",
            "gopass-system",
            "--server-image",
            "registry.example.com/gopass-server:1.0",
            "--service-account",
            "gopass-server",
        ])
        .unwrap();
        let template = config.server_template();

        assert_eq!(template.namespace, "gopass-system");
        assert_eq!(template.image, "registry.example.com/gopass-server:1.0");
        assert_eq!(template.service_account.as_deref(), Some("gopass-server"));
    }

    #[test]
    fn server_listens_on_grpc_port() {
        let config = ServerConfig::try_parse_from(["gopass-server"]).unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.gpg_binary, PathBuf::from("gpg"));
    }
}
