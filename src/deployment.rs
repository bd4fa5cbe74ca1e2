use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};

use crate::cluster::RepositoryRef;
use crate::gopass_repository_crd::GopassRepository;
use crate::{Error, Result};

pub const APP_LABEL: &str = "app";
pub const REPO_NAME_LABEL: &str = "gopassRepoName";
pub const REPO_NAMESPACE_LABEL: &str = "gopassRepoNamespace";
pub const SERVER_PORT: i32 = 9000;

/// How the per-repository gopass-server pods are launched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerTemplate {
    /// Namespace the dependent deployments and services are created in
    pub namespace: String,
    pub image: String,
    pub image_pull_policy: String,
    pub service_account: Option<String>,
}

impl Default for ServerTemplate {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image: "gopass-server:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            service_account: None,
        }
    }
}

/// Labels correlating a dependent object with its GopassRepository.
pub fn dependent_labels(owner: &RepositoryRef) -> BTreeMap<String, String> {
    BTreeMap::from([
        (REPO_NAME_LABEL.to_string(), owner.name.clone()),
        (REPO_NAMESPACE_LABEL.to_string(), owner.namespace.clone()),
    ])
}

pub fn label_selector(owner: &RepositoryRef) -> String {
    dependent_labels(owner)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn matches_owner(labels: &BTreeMap<String, String>, owner: &RepositoryRef) -> bool {
    dependent_labels(owner)
        .iter()
        .all(|(k, v)| labels.get(k) == Some(v))
}

/// Maps a dependent object back to the GopassRepository it was created for.
pub fn owner_of<K: Resource>(dependent: &K) -> Option<ObjectRef<GopassRepository>> {
    let labels = dependent.labels();
    let name = labels.get(REPO_NAME_LABEL)?;
    let namespace = labels.get(REPO_NAMESPACE_LABEL)?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Reduces a label query result to zero or one object.
///
/// More than one match means the cluster is in an inconsistent state which
/// is reported as [`Error::TooMany`] rather than picking one of them.
pub fn select_single<T>(mut items: Vec<T>, kind: &'static str) -> Result<Option<T>> {
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.pop()),
        count => Err(Error::TooMany { kind, count }),
    }
}

pub fn build_deployment(owner: &RepositoryRef, template: &ServerTemplate) -> Deployment {
    let app_name = format!("{}-{}", owner.name, uuid::Uuid::new_v4());

    let mut labels = dependent_labels(owner);
    labels.insert(APP_LABEL.to_string(), app_name.clone());
    let selector = BTreeMap::from([(APP_LABEL.to_string(), app_name)]);

    Deployment {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", owner.name)),
            namespace: Some(template.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: template.service_account.clone(),
                    containers: vec![Container {
                        name: owner.name.clone(),
                        image: Some(template.image.clone()),
                        image_pull_policy: Some(template.image_pull_policy.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: SERVER_PORT,
                            name: Some("grpc".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn available_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .unwrap_or(0)
}

pub fn app_label(deployment: &Deployment) -> Option<&String> {
    deployment.metadata.labels.as_ref()?.get(APP_LABEL)
}
