use crate::config::Config;
use crate::credentials::RegistryAuth;
use crate::error::{Error, InspectionError, SubmissionError};
use crate::reference::ImageReference;
use crate::registry::{Inspection, Platform, RegistryInspector};
use crate::service::{ServiceCreateResponse, ServiceSpec, ServiceSubmitter};
use crate::util::{self, null_as_default};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

#[derive(Debug, Deserialize)]
struct DistributionInspect {
    #[serde(rename = "Descriptor", default)]
    descriptor: Descriptor,
    #[serde(rename = "Platforms", default, deserialize_with = "null_as_default")]
    platforms: Vec<OciPlatform>,
}

#[derive(Debug, Default, Deserialize)]
struct Descriptor {
    #[serde(default)]
    digest: String,
}

#[derive(Debug, Deserialize)]
struct OciPlatform {
    architecture: String,
    os: String,
}

impl From<DistributionInspect> for Inspection {
    fn from(inspect: DistributionInspect) -> Self {
        let digest = Some(inspect.descriptor.digest).filter(|d| !d.is_empty());
        let platforms = inspect
            .platforms
            .into_iter()
            .map(|p| Platform {
                architecture: p.architecture,
                os: p.os,
            })
            .collect();
        return Inspection { digest, platforms };
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Client for the daemon's distribution and service endpoints.
#[derive(Clone, Debug)]
pub struct DaemonClient {
    base: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(config: &Config) -> Result<DaemonClient, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(util::user_agent())
            .build()
            .map_err(|e| Error::Config(format!("could not build HTTP client: {}", e)))?;
        return Ok(DaemonClient {
            base: config.host.as_str().trim_end_matches('/').to_string(),
            http,
        });
    }

    fn url(&self, path: &str) -> String {
        return format!("{}{}", self.base, path);
    }
}

#[async_trait]
impl RegistryInspector for DaemonClient {
    async fn inspect(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Inspection, InspectionError> {
        let url = self.url(&format!("/distribution/{}/json", reference));
        debug!("GET {}", url);
        let mut request = self.http.get(url);
        if let Some(auth) = auth {
            request = request.header(REGISTRY_AUTH_HEADER, auth.encode());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(InspectionError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        let inspect: DistributionInspect = serde_json::from_str(&body)?;
        return Ok(inspect.into());
    }
}

#[async_trait]
impl ServiceSubmitter for DaemonClient {
    async fn submit(
        &self,
        spec: &ServiceSpec,
        auth: Option<&RegistryAuth>,
    ) -> Result<ServiceCreateResponse, SubmissionError> {
        let url = self.url("/services/create");
        debug!("POST {}", url);
        let mut request = self.http.post(url).json(spec);
        if let Some(auth) = auth {
            request = request.header(REGISTRY_AUTH_HEADER, auth.encode());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SubmissionError::Daemon {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        return Ok(serde_json::from_str(&body)?);
    }
}

/// The daemon wraps errors as `{"message": ...}`, anything else is passed
/// on verbatim.
fn error_message(body: &str) -> String {
    return match serde_json::from_str::<ErrorResponse>(body) {
        Ok(e) => e.message,
        Err(_) => body.trim().to_string(),
    };
}
