//! Cluster access needed by the lifecycle controller.
//!
//! The controller only talks to Kubernetes through [`ClusterOps`], so the
//! reconcile state machine can be exercised against an in-memory cluster.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::deployment::{label_selector, select_single};
use crate::finalizer;
use crate::gopass_repository_crd::GopassRepository;
use crate::{Error, Result};

/// Identity of a GopassRepository, used to correlate its dependents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub name: String,
    pub namespace: String,
}

impl RepositoryRef {
    pub fn from_resource(repository: &GopassRepository) -> Result<Self> {
        let namespace = repository.namespace().ok_or_else(|| {
            Error::UserInputError("GopassRepository CRD must have a namespace".to_owned())
        })?;
        Ok(Self {
            name: repository.name_any(),
            namespace,
        })
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterOps: Send + Sync {
    async fn add_finalizer(&self, repository: &GopassRepository) -> Result<()>;

    async fn remove_finalizer(&self, repository: &GopassRepository) -> Result<()>;

    /// Returns the single deployment labelled for `owner`, or [`Error::TooMany`].
    async fn find_deployment(&self, owner: &RepositoryRef) -> Result<Option<Deployment>>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;

    async fn delete_deployment(&self, deployment: &Deployment) -> Result<()>;

    /// Returns the single service labelled for `owner`, or [`Error::TooMany`].
    async fn find_service(&self, owner: &RepositoryRef) -> Result<Option<Service>>;

    async fn create_service(&self, service: &Service) -> Result<Service>;

    async fn delete_service(&self, service: &Service) -> Result<()>;
}

/// [`ClusterOps`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    /// Namespace holding the dependent deployments and services
    namespace: String,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn add_finalizer(&self, repository: &GopassRepository) -> Result<()> {
        finalizer::add(self.client.clone(), repository).await?;
        Ok(())
    }

    async fn remove_finalizer(&self, repository: &GopassRepository) -> Result<()> {
        finalizer::delete(self.client.clone(), repository).await?;
        Ok(())
    }

    async fn find_deployment(&self, owner: &RepositoryRef) -> Result<Option<Deployment>> {
        let params = ListParams::default().labels(&label_selector(owner));
        let deployments = self.deployments().list(&params).await?;
        select_single(deployments.items, "deployment")
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let created = self
            .deployments()
            .create(&PostParams::default(), deployment)
            .await?;
        info!("Created deployment {}", created.name_any());
        Ok(created)
    }

    async fn delete_deployment(&self, deployment: &Deployment) -> Result<()> {
        self.deployments()
            .delete(&deployment.name_any(), &DeleteParams::default())
            .await?;
        info!("Deleted deployment {}", deployment.name_any());
        Ok(())
    }

    async fn find_service(&self, owner: &RepositoryRef) -> Result<Option<Service>> {
        let params = ListParams::default().labels(&label_selector(owner));
        let services = self.services().list(&params).await?;
        select_single(services.items, "service")
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let created = self
            .services()
            .create(&PostParams::default(), service)
            .await?;
        info!("Created service {}", created.name_any());
        Ok(created)
    }

    async fn delete_service(&self, service: &Service) -> Result<()> {
        self.services()
            .delete(&service.name_any(), &DeleteParams::default())
            .await?;
        info!("Deleted service {}", service.name_any());
        Ok(())
    }
}
