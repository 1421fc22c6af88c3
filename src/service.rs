use crate::credentials::RegistryAuth;
use crate::error::{Error, SubmissionError};
use crate::reference::ImageReference;
use crate::registry::{Platform, RegistryInspector};
use crate::resolver;
use crate::util::null_as_default;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The parts of a service specification this crate reads or writes.
///
/// Every field it does not model is kept in `extra` and sent back as is.
#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub struct ServiceSpec {
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "Labels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "TaskTemplate", default)]
    pub task_template: TaskSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub struct TaskSpec {
    #[serde(rename = "ContainerSpec", default)]
    pub container_spec: ContainerSpec,
    #[serde(rename = "Placement", default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub struct ContainerSpec {
    #[serde(rename = "Image", default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub struct Placement {
    #[serde(
        rename = "Constraints",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub constraints: Vec<String>,
    #[serde(
        rename = "Platforms",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub platforms: Vec<Platform>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceSpec {
    pub fn new(name: &str, image: &str) -> ServiceSpec {
        let mut spec = ServiceSpec::default();
        spec.name = name.to_string();
        spec.task_template.container_spec.image = image.to_string();
        return spec;
    }
}

#[derive(Default, Clone, Debug)]
pub struct ServiceCreateOptions {
    /// Pin the image to the digest its registry reports.
    pub query_registry: bool,
    pub registry_auth: Option<RegistryAuth>,
}

#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub struct ServiceCreateResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Warnings", default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait ServiceSubmitter: Send + Sync {
    async fn submit(
        &self,
        spec: &ServiceSpec,
        auth: Option<&RegistryAuth>,
    ) -> Result<ServiceCreateResponse, SubmissionError>;
}

/// Creates a service, pinning its image first.
///
/// An unparseable image aborts the creation, an image whose registry cannot
/// be reached is submitted unpinned and reported in the response warnings.
pub async fn create_service(
    inspector: &dyn RegistryInspector,
    submitter: &dyn ServiceSubmitter,
    mut spec: ServiceSpec,
    options: &ServiceCreateOptions,
) -> Result<ServiceCreateResponse, Error> {
    let auth = options.registry_auth.as_ref();
    let mut unpinned_image = None;

    // The daemon rejects specs without an image itself
    if !spec.task_template.container_spec.image.is_empty() {
        let reference = ImageReference::parse(&spec.task_template.container_spec.image)?;
        let decision = resolver::resolve(&reference, options.query_registry, inspector, auth).await;
        if decision.resolution.as_fallback().is_some() {
            unpinned_image = Some(decision.image.clone());
        }
        spec.task_template.container_spec.image = decision.image;
        if !decision.platforms.is_empty() {
            spec.task_template
                .placement
                .get_or_insert_with(Placement::default)
                .platforms = decision.platforms;
        }
    }

    let mut response = submitter.submit(&spec, auth).await?;
    if let Some(image) = unpinned_image {
        response.warnings.push(digest_warning(&image));
    }
    return Ok(response);
}

fn digest_warning(image: &str) -> String {
    return format!(
        "image {} could not be accessed on a registry to record its digest. \
         Each node will access {} independently, possibly leading to different \
         nodes running different versions of the image.",
        image, image,
    );
}
