pub mod distribution;

use crate::credentials::RegistryAuth;
use crate::error::InspectionError;
use crate::reference::ImageReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An architecture and operating system an image variant runs on.
///
/// Serialized the way a service's placement lists it.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Platform {
    #[serde(rename = "Architecture")]
    pub architecture: String,
    #[serde(rename = "OS")]
    pub os: String,
}

impl Platform {
    pub fn new(architecture: &str, os: &str) -> Platform {
        return Platform {
            architecture: architecture.to_string(),
            os: os.to_string(),
        };
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

/// What a registry knows about a tagged image.
#[derive(Default, PartialEq, Clone, Debug)]
pub struct Inspection {
    pub digest: Option<String>,
    pub platforms: Vec<Platform>,
}

#[async_trait]
pub trait RegistryInspector: Send + Sync {
    async fn inspect(
        &self,
        reference: &ImageReference,
        auth: Option<&RegistryAuth>,
    ) -> Result<Inspection, InspectionError>;
}
