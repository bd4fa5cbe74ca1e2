//! Operator side of the repository service.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tonic::transport::Channel;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::deployment::SERVER_PORT;
use crate::proto;
use crate::{Error, Result};

/// The four remote calls the controller drives against a gopass-server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RepositoryClient: Send {
    async fn initialize_repository(
        &mut self,
        request: proto::RepositoryInitialization,
    ) -> Result<proto::RepositoryResponse>;

    async fn update_repository(
        &mut self,
        request: proto::Repository,
    ) -> Result<proto::RepositoryResponse>;

    async fn update_all_passwords(
        &mut self,
        request: proto::Repository,
    ) -> Result<proto::RepositoryResponse>;

    async fn delete_secret(&mut self, request: proto::Repository)
        -> Result<proto::RepositoryResponse>;
}

/// Opens a client for the gopass-server behind a service.
///
/// The returned client owns its connection; dropping it closes the channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RepositoryConnector: Send + Sync {
    async fn connect(&self, endpoint: &Service) -> Result<Box<dyn RepositoryClient>>;
}

#[async_trait]
impl RepositoryClient for proto::Client<Channel> {
    async fn initialize_repository(
        &mut self,
        request: proto::RepositoryInitialization,
    ) -> Result<proto::RepositoryResponse> {
        let response = proto::Client::initialize_repository(self, request).await?;
        Ok(response.into_inner())
    }

    async fn update_repository(
        &mut self,
        request: proto::Repository,
    ) -> Result<proto::RepositoryResponse> {
        let response = proto::Client::update_repository(self, request).await?;
        Ok(response.into_inner())
    }

    async fn update_all_passwords(
        &mut self,
        request: proto::Repository,
    ) -> Result<proto::RepositoryResponse> {
        let response = proto::Client::update_all_passwords(self, request).await?;
        Ok(response.into_inner())
    }

    async fn delete_secret(
        &mut self,
        request: proto::Repository,
    ) -> Result<proto::RepositoryResponse> {
        let response = proto::Client::delete_secret(self, request).await?;
        Ok(response.into_inner())
    }
}

/// Connects over plaintext gRPC using in-cluster service DNS.
#[derive(Clone, Debug, Default)]
pub struct GrpcConnector;

pub fn endpoint_url(endpoint: &Service) -> String {
    let namespace = endpoint.namespace().unwrap_or_else(|| "default".to_string());
    format!(
        "http://{}.{}.svc:{}",
        endpoint.name_any(),
        namespace,
        SERVER_PORT
    )
}

#[async_trait]
impl RepositoryConnector for GrpcConnector {
    async fn connect(&self, endpoint: &Service) -> Result<Box<dyn RepositoryClient>> {
        let url = endpoint_url(endpoint);
        debug!(%url, "connecting to repository server");
        let client = proto::Client::connect(url)
            .await
            .map_err(Error::TransportError)?;
        Ok(Box::new(client))
    }
}

/// Turns a delivered but unsuccessful envelope into an error.
pub fn ensure_successful(
    operation: &'static str,
    response: proto::RepositoryResponse,
) -> Result<()> {
    if response.successful {
        Ok(())
    } else {
        Err(Error::OperationFailed {
            operation,
            message: response.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn endpoint_uses_service_dns_and_grpc_port() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("store-x7k2p".to_string()),
                namespace: Some("gopass-system".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            endpoint_url(&service),
            "http://store-x7k2p.gopass-system.svc:9000"
        );
    }

    #[test]
    fn unsuccessful_envelope_is_an_error() {
        assert!(ensure_successful(
            "InitializeRepository",
            proto::RepositoryResponse {
                successful: true,
                error_message: String::new(),
            }
        )
        .is_ok());

        let err = ensure_successful(
            "UpdateRepository",
            proto::RepositoryResponse {
                successful: false,
                error_message: "repository with URL 'x' not found".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "UpdateRepository not successful: repository with URL 'x' not found"
        );
    }
}
