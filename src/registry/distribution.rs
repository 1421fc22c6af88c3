use crate::credentials::RegistryAuth;
use crate::error::InspectionError;
use crate::reference::{ImageReference, DEFAULT_TAG};
use crate::registry::{Inspection, Platform, RegistryInspector};
use async_trait::async_trait;
use dkregistry::mediatypes::MediaTypes;
use dkregistry::v2::manifest::Manifest;
use dkregistry::v2::Client;
use log::debug;
use serde::Deserialize;

const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";

/// The fields of an image config blob that describe its platform.
#[derive(Debug, Deserialize)]
struct ImageConfig {
    architecture: Option<String>,
    os: Option<String>,
}

/// Inspects images by talking to their registry directly over the
/// distribution API, no daemon involved.
#[derive(Clone, Debug, Default)]
pub struct RegistryClient {
    insecure: bool,
}

impl RegistryClient {
    pub fn new(insecure: bool) -> RegistryClient {
        return RegistryClient { insecure };
    }

    fn client(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Client, InspectionError> {
        let accepted_types = Some(vec![
            (MediaTypes::ManifestV2S2, Some(0.5)),
            (MediaTypes::ManifestV2S1Signed, Some(0.4)),
            (MediaTypes::ManifestList, Some(0.5)),
            (MediaTypes::OCIImageIndexV1, Some(0.5)),
        ]);
        let mut config = Client::configure()
            .registry(registry_host(reference))
            .insecure_registry(self.insecure)
            .accepted_types(accepted_types);
        if let Some(auth) = auth {
            config = config
                .username(Some(auth.username.clone()))
                .password(Some(auth.password.clone()));
        }
        return Ok(config.build()?);
    }

    async fn authenticated_client(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Client, InspectionError> {
        let scope = format!("repository:{}:pull", reference.path());
        let client = self.client(reference, auth)?;
        return Ok(client.authenticate(&[scope.as_str()]).await?);
    }

    async fn manifest_digest(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Option<String>, InspectionError> {
        let tag = manifest_reference(reference);

        // Public images usually answer without a token
        let direct_result = async {
            self.client(reference, auth)?
                .get_manifestref(reference.path(), tag)
                .await
                .map_err(InspectionError::from)
        }
        .await;
        match direct_result {
            Ok(digest) => return Ok(digest),
            Err(err) => debug!("anonymous manifest lookup for {} failed: {}", reference, err),
        }

        let client = self.authenticated_client(reference, auth).await?;
        return Ok(client.get_manifestref(reference.path(), tag).await?);
    }

    /// Fetches the manifest along with the client that could read it, so
    /// blobs it points at are fetched with the same credentials.
    async fn manifest(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<(Client, Manifest), InspectionError> {
        let tag = manifest_reference(reference);

        // Open registries send no auth challenge, so token auth fails there
        let client = self.client(reference, auth)?;
        match client.get_manifest(reference.path(), tag).await {
            Ok(manifest) => return Ok((client, manifest)),
            Err(err) => debug!("anonymous manifest fetch for {} failed: {}", reference, err),
        }

        let client = self.authenticated_client(reference, auth).await?;
        let manifest = client.get_manifest(reference.path(), tag).await?;
        return Ok((client, manifest));
    }

    async fn platforms(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Vec<Platform>, InspectionError> {
        let (client, manifest) = self.manifest(reference, auth).await?;

        let config_digest = match manifest {
            Manifest::ML(manifest_list) => {
                return Ok(manifest_list
                    .manifests
                    .iter()
                    .map(|m| Platform::new(&m.platform.architecture, &m.platform.os))
                    .collect());
            }
            Manifest::S2(schema2) => schema2.manifest_spec.config().digest.clone(),
            _ => return Ok(vec![]),
        };

        // A single-platform image only names its platform in the config blob
        let blob = client.get_blob(reference.path(), &config_digest).await?;
        let config: ImageConfig = serde_json::from_slice(&blob)?;
        return match (config.architecture, config.os) {
            (Some(architecture), Some(os)) => Ok(vec![Platform { architecture, os }]),
            _ => Ok(vec![]),
        };
    }
}

#[async_trait]
impl RegistryInspector for RegistryClient {
    async fn inspect(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Inspection, InspectionError> {
        let digest = self.manifest_digest(reference, auth).await?;
        let platforms = match self.platforms(reference, auth).await {
            Ok(p) => p,
            Err(err) => {
                debug!("could not list platforms of {}: {}", reference, err);
                vec![]
            }
        };
        return Ok(Inspection { digest, platforms });
    }
}

/// Docker Hub serves the registry API from a different host than its name.
fn registry_host(reference: &ImageReference) -> &str {
    if reference.is_default_registry() {
        return DOCKER_HUB_REGISTRY;
    }
    return reference.domain();
}

fn manifest_reference(reference: &ImageReference) -> &str {
    return reference
        .digest()
        .or(reference.tag())
        .unwrap_or(DEFAULT_TAG);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_auth(registry: &str) -> (mockito::Mock, mockito::Mock) {
        let auth_mock = mockito::mock("GET", "/v2/")
            .with_status(401)
            .with_header(
                "WWW-Authenticate",
                format!(r#"Bearer realm="http://{}/token",service="registry""#, registry).as_str(),
            )
            .with_body("{}")
            .create();
        let token_mock = mockito::mock("GET", "/token")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"token": "hunter2"}"#)
            .create();
        return (auth_mock, token_mock);
    }

    #[test]
    fn it_uses_the_docker_hub_api_host() {
        let reference = ImageReference::parse("postgres:15").unwrap();
        assert_eq!(registry_host(&reference), "registry-1.docker.io");
        assert_eq!(reference.path(), "library/postgres");

        let reference = ImageReference::parse("ghcr.io/user/app").unwrap();
        assert_eq!(registry_host(&reference), "ghcr.io");
        assert_eq!(manifest_reference(&reference), "latest");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn it_inspects_multi_platform_images() {
        let registry = mockito::server_address().to_string();
        let _auth_mocks = mock_auth(&registry);
        let _digest_mock = mockito::mock("HEAD", "/v2/library/alpine/manifests/edge")
            .with_status(200)
            .with_header("docker-content-digest", "sha256:listdigest")
            .create();
        let _manifest_mock = mockito::mock("GET", "/v2/library/alpine/manifests/edge")
            .with_status(200)
            .with_header(
                "content-type",
                "application/vnd.docker.distribution.manifest.list.v2+json",
            )
            .with_body(
                r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
                "manifests": [
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "size": 528,
                        "digest": "sha256:amd64digest",
                        "platform": {"architecture": "amd64", "os": "linux"}
                    },
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "size": 528,
                        "digest": "sha256:arm64digest",
                        "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}
                    }
                ]
            }"#,
            )
            .create();

        let reference = ImageReference::parse(&format!("{}/library/alpine:edge", registry)).unwrap();
        let inspection = RegistryClient::new(true)
            .inspect(&reference, None)
            .await
            .unwrap();

        assert_eq!(inspection.digest, Some("sha256:listdigest".to_string()));
        assert_eq!(
            inspection.platforms,
            vec![Platform::new("amd64", "linux"), Platform::new("arm64", "linux")],
        );
        mockito::reset();
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn it_reads_the_platform_of_single_platform_images() {
        let registry = mockito::server_address().to_string();
        let _auth_mocks = mock_auth(&registry);

        // The config digest must match the SHA256 of the blob content
        let blob_content = r#"{"architecture":"arm64","os":"linux","created":"2024-11-03T10:23:45Z","config":{}}"#;
        let config_digest = "sha256:525c49d32e898fe01057da0c1c26fffd7ae3ec166d5899e6eca6505f544a81a2";

        let _digest_mock = mockito::mock("HEAD", "/v2/team/worker/manifests/v2")
            .with_status(200)
            .with_header("docker-content-digest", "sha256:workerdigest")
            .create();
        let _manifest_mock = mockito::mock("GET", "/v2/team/worker/manifests/v2")
            .with_status(200)
            .with_header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
            .with_body(format!(
                r#"{{
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "config": {{
                    "mediaType": "application/vnd.docker.container.image.v1+json",
                    "size": {},
                    "digest": "{}"
                }},
                "layers": []
            }}"#,
                blob_content.len(),
                config_digest,
            ))
            .create();
        let _blob_mock = mockito::mock("GET", format!("/v2/team/worker/blobs/{}", config_digest).as_str())
            .with_status(200)
            .with_body(blob_content)
            .create();

        let reference = ImageReference::parse(&format!("{}/team/worker:v2", registry)).unwrap();
        let inspection = RegistryClient::new(true)
            .inspect(&reference, None)
            .await
            .unwrap();

        assert_eq!(inspection.digest, Some("sha256:workerdigest".to_string()));
        assert_eq!(inspection.platforms, vec![Platform::new("arm64", "linux")]);
        mockito::reset();
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn it_inspects_registries_without_auth() {
        let registry = mockito::server_address().to_string();
        // A plain registry answers the API check without a challenge
        let _api_mock = mockito::mock("GET", "/v2/")
            .with_status(200)
            .with_body("{}")
            .create();
        let _digest_mock = mockito::mock("HEAD", "/v2/team/open/manifests/latest")
            .with_status(200)
            .with_header("docker-content-digest", "sha256:opendigest")
            .create();
        let _manifest_mock = mockito::mock("GET", "/v2/team/open/manifests/latest")
            .with_status(200)
            .with_header(
                "content-type",
                "application/vnd.docker.distribution.manifest.list.v2+json",
            )
            .with_body(
                r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
                "manifests": [
                    {
                        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                        "size": 528,
                        "digest": "sha256:s390xdigest",
                        "platform": {"architecture": "s390x", "os": "linux"}
                    }
                ]
            }"#,
            )
            .create();

        let reference = ImageReference::parse(&format!("{}/team/open", registry)).unwrap();
        let inspection = RegistryClient::new(true)
            .inspect(&reference, None)
            .await
            .unwrap();

        assert_eq!(inspection.digest, Some("sha256:opendigest".to_string()));
        assert_eq!(inspection.platforms, vec![Platform::new("s390x", "linux")]);
        mockito::reset();
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn it_keeps_the_digest_when_platforms_are_unavailable() {
        let registry = mockito::server_address().to_string();
        let _auth_mocks = mock_auth(&registry);
        let _digest_mock = mockito::mock("HEAD", "/v2/team/app/manifests/v1")
            .with_status(200)
            .with_header("docker-content-digest", "sha256:appdigest")
            .create();
        let _manifest_mock = mockito::mock("GET", "/v2/team/app/manifests/v1")
            .with_status(500)
            .create();

        let reference = ImageReference::parse(&format!("{}/team/app:v1", registry)).unwrap();
        let inspection = RegistryClient::new(true)
            .inspect(&reference, None)
            .await
            .unwrap();

        assert_eq!(inspection.digest, Some("sha256:appdigest".to_string()));
        assert!(inspection.platforms.is_empty());
        mockito::reset();
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn it_finds_no_digest_for_missing_manifests() {
        let registry = mockito::server_address().to_string();
        let _auth_mocks = mock_auth(&registry);
        let _digest_mock = mockito::mock("HEAD", "/v2/team/missing/manifests/latest")
            .with_status(404)
            .create();

        let reference = ImageReference::parse(&format!("{}/team/missing", registry)).unwrap();
        let result = RegistryClient::new(true).inspect(&reference, None).await;

        assert!(!matches!(result, Ok(Inspection { digest: Some(_), .. })));
        mockito::reset();
    }
}
