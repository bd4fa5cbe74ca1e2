use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tokio::time::Duration;
use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::client::{ensure_successful, RepositoryConnector};
use crate::cluster::{ClusterOps, RepositoryRef};
use crate::deployment::{app_label, available_replicas, build_deployment, ServerTemplate, APP_LABEL};
use crate::finalizer::has_finalizer;
use crate::gopass_repository_crd::GopassRepository;
use crate::proto;
use crate::secret::SecretTarget;
use crate::service::build_service;
use crate::{Error, Metrics, Result};

/// Delay before looking again at dependents that are still starting up.
pub const NOT_READY_REQUEUE: Duration = Duration::from_secs(5);

pub struct ContextData {
    pub cluster: Arc<dyn ClusterOps>,
    pub connector: Arc<dyn RepositoryConnector>,
    pub template: ServerTemplate,
    pub metrics: Metrics,
}

impl ContextData {
    pub fn new(
        cluster: Arc<dyn ClusterOps>,
        connector: Arc<dyn RepositoryConnector>,
        template: ServerTemplate,
        metrics: Metrics,
    ) -> Self {
        Self {
            cluster,
            connector,
            template,
            metrics,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RepositoryAction {
    AddFinalizer,
    Teardown,
    NoOp,
    Sync,
}

enum DependentState {
    Progressing,
    Ready(Service),
}

#[instrument(skip(repository, context), fields(name = %repository.name_any(), namespace = ?repository.namespace()))]
pub async fn reconcile(
    repository: Arc<GopassRepository>,
    context: Arc<ContextData>,
) -> Result<Action> {
    let _timer = context.metrics.count_and_measure();
    let owner = RepositoryRef::from_resource(&repository)?;

    match determine_action(&repository) {
        RepositoryAction::AddFinalizer => {
            context.cluster.add_finalizer(&repository).await?;
            info!("Added finalizer to {}", owner);
            Ok(Action::await_change())
        }
        RepositoryAction::Teardown => {
            teardown(&owner, &repository, &context).await?;
            Ok(Action::await_change())
        }
        RepositoryAction::NoOp => Ok(Action::await_change()),
        RepositoryAction::Sync => {
            repository
                .spec
                .validate()
                .map_err(|e| Error::UserInputError(e.to_string()))?;

            match ensure_dependents(&owner, &context).await? {
                DependentState::Progressing => Ok(Action::requeue(NOT_READY_REQUEUE)),
                DependentState::Ready(service) => {
                    sync(&owner, &repository, &service, &context).await
                }
            }
        }
    }
}

//determine action to take based on the state of the GopassRepository
pub fn determine_action(repository: &GopassRepository) -> RepositoryAction {
    let deleting = repository.meta().deletion_timestamp.is_some();
    match (deleting, has_finalizer(repository)) {
        (true, true) => RepositoryAction::Teardown,
        (true, false) => RepositoryAction::NoOp,
        (false, false) => RepositoryAction::AddFinalizer,
        (false, true) => RepositoryAction::Sync,
    }
}

// creates missing dependents; a pass that had to create or is waiting on one stops here
async fn ensure_dependents(owner: &RepositoryRef, context: &ContextData) -> Result<DependentState> {
    let cluster = &context.cluster;

    let deployment = match cluster.find_deployment(owner).await? {
        Some(deployment) => deployment,
        None => {
            let deployment = build_deployment(owner, &context.template);
            cluster.create_deployment(&deployment).await?
        }
    };

    let service = match cluster.find_service(owner).await? {
        Some(service) => Some(service),
        None => {
            let app_name = app_label(&deployment).ok_or_else(|| {
                Error::NotFound(format!(
                    "label '{}' on deployment {}",
                    APP_LABEL,
                    deployment.name_any()
                ))
            })?;
            let service = build_service(owner, app_name, &context.template.namespace);
            cluster.create_service(&service).await?;
            None
        }
    };

    if available_replicas(&deployment) == 0 {
        info!("Deployment {} for {} not ready yet", deployment.name_any(), owner);
        return Ok(DependentState::Progressing);
    }

    match service {
        Some(service) => Ok(DependentState::Ready(service)),
        None => Ok(DependentState::Progressing),
    }
}

fn authentication(owner: &RepositoryRef, repository: &GopassRepository) -> proto::Authentication {
    proto::Authentication {
        namespace: owner.namespace.clone(),
        username: repository.spec.user_name.clone(),
        secret_ref: repository.spec.secret_key_ref.name.clone(),
        secret_key: repository.spec.secret_key_ref.key.clone(),
    }
}

fn secret_target(owner: &RepositoryRef) -> SecretTarget {
    SecretTarget {
        namespace: owner.namespace.clone(),
        name: owner.name.clone(),
    }
}

async fn sync(
    owner: &RepositoryRef,
    repository: &GopassRepository,
    service: &Service,
    context: &ContextData,
) -> Result<Action> {
    let spec = &repository.spec;
    let mut client = context.connector.connect(service).await?;

    let remote = proto::Repository {
        repository_url: spec.repository_url.clone(),
        authentication: Some(authentication(owner, repository)),
        secret_name: None,
    };

    let response = client
        .initialize_repository(proto::RepositoryInitialization {
            repository: Some(remote.clone()),
            gpg_key_reference: Some(proto::GpgKeyReference {
                gpg_key_ref: spec.gpg_key_ref.name.clone(),
                gpg_key_ref_key: spec.gpg_key_ref.key.clone(),
            }),
        })
        .await?;
    ensure_successful("InitializeRepository", response)?;

    let response = client.update_repository(remote.clone()).await?;
    ensure_successful("UpdateRepository", response)?;

    let response = client
        .update_all_passwords(proto::Repository {
            secret_name: Some((&secret_target(owner)).into()),
            ..remote
        })
        .await?;
    ensure_successful("UpdateAllPasswords", response)?;

    info!("Synchronized {} from {}", owner, spec.repository_url);
    match spec.refresh_interval()? {
        Some(interval) => Ok(Action::requeue(interval)),
        None => Ok(Action::await_change()),
    }
}

async fn teardown(
    owner: &RepositoryRef,
    repository: &GopassRepository,
    context: &ContextData,
) -> Result<()> {
    let cluster = &context.cluster;
    let service = cluster.find_service(owner).await?;

    match &service {
        Some(service) => {
            let mut client = context.connector.connect(service).await?;
            let response = client
                .delete_secret(proto::Repository {
                    secret_name: Some((&secret_target(owner)).into()),
                    ..Default::default()
                })
                .await?;
            ensure_successful("DeleteSecret", response)?;
        }
        None => warn!("No service for {}, secret is left in place", owner),
    }

    if let Some(deployment) = cluster.find_deployment(owner).await? {
        cluster.delete_deployment(&deployment).await?;
    }
    if let Some(service) = service {
        cluster.delete_service(&service).await?;
    }

    cluster.remove_finalizer(repository).await?;
    info!("Tore down {}", owner);
    Ok(())
}

//error handling
pub fn on_error(repository: Arc<GopassRepository>, error: &Error, context: Arc<ContextData>) -> Action {
    error!(
        name = %repository.name_any(),
        namespace = ?repository.namespace(),
        "Reconciliation error: {}",
        error
    );
    context.metrics.reconcile_failure(error);
    Action::requeue(NOT_READY_REQUEUE)
}
