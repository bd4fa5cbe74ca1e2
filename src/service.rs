use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::cluster::RepositoryRef;
use crate::deployment::{dependent_labels, APP_LABEL, SERVER_PORT};

//service forwarding the grpc port to the pods of the deployment labelled `app`
pub fn build_service(owner: &RepositoryRef, app_name: &str, namespace: &str) -> Service {
    let mut labels = dependent_labels(owner);
    labels.insert(APP_LABEL.to_string(), app_name.to_string());

    Service {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", owner.name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                APP_LABEL.to_string(),
                app_name.to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("grpc".to_string()),
                protocol: Some("TCP".to_string()),
                port: SERVER_PORT,
                target_port: Some(IntOrString::Int(SERVER_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::{REPO_NAMESPACE_LABEL, REPO_NAME_LABEL};

    #[test]
    fn service_selects_the_deployment_pods() {
        let owner = RepositoryRef {
            name: "repoName".to_string(),
            namespace: "repoNamespace".to_string(),
        };
        let service = build_service(&owner, "repoName-1234", "gopass-system");

        let labels = service.metadata.labels.unwrap();
        assert_eq!(labels[REPO_NAME_LABEL], "repoName");
        assert_eq!(labels[REPO_NAMESPACE_LABEL], "repoNamespace");
        assert_eq!(service.metadata.namespace.as_deref(), Some("gopass-system"));

        let spec = service.spec.unwrap();
        assert_eq!(spec.selector.unwrap()[APP_LABEL], "repoName-1234");
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 9000);
        assert_eq!(port.target_port, Some(IntOrString::Int(9000)));
    }
}
