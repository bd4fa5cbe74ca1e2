use crate::gopass_repository_crd::GopassRepository;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Error, ResourceExt};
use serde_json::{json, Value};

pub const FINALIZER_NAME: &str = "gopass.repository.finalizer";

pub fn has_finalizer(repository: &GopassRepository) -> bool {
    repository.finalizers().iter().any(|f| f == FINALIZER_NAME)
}

//finalizer list with ours appended, other finalizers untouched
pub fn with_finalizer(finalizers: &[String]) -> Vec<String> {
    let mut finalizers = finalizers.to_vec();
    if !finalizers.iter().any(|f| f == FINALIZER_NAME) {
        finalizers.push(FINALIZER_NAME.to_string());
    }
    finalizers
}

//finalizer list with ours removed, other finalizers untouched
pub fn without_finalizer(finalizers: &[String]) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| *f != FINALIZER_NAME)
        .cloned()
        .collect()
}

// resourceVersion turns a patch based on a stale read into a conflict
fn finalizer_patch(repository: &GopassRepository, finalizers: Vec<String>) -> Value {
    json!({
        "metadata": {
            "resourceVersion": repository.resource_version(),
            "finalizers": finalizers
        }
    })
}

//add finalizer
pub async fn add(client: Client, repository: &GopassRepository) -> Result<GopassRepository, Error> {
    let namespace = repository.namespace().unwrap_or_default();
    let api: Api<GopassRepository> = Api::namespaced(client, &namespace);
    let finalizer = finalizer_patch(repository, with_finalizer(repository.finalizers()));

    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    api.patch(&repository.name_any(), &PatchParams::default(), &patch)
        .await
}

//delete finalizer
pub async fn delete(
    client: Client,
    repository: &GopassRepository,
) -> Result<GopassRepository, Error> {
    let namespace = repository.namespace().unwrap_or_default();
    let api: Api<GopassRepository> = Api::namespaced(client, &namespace);
    let finalizer = finalizer_patch(repository, without_finalizer(repository.finalizers()));

    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    api.patch(&repository.name_any(), &PatchParams::default(), &patch)
        .await
}
