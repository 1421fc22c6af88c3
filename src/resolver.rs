use crate::credentials::RegistryAuth;
use crate::error::InspectionError;
use crate::reference::{self, ImageReference};
use crate::registry::{Inspection, Platform, RegistryInspector};
use enum_as_inner::EnumAsInner;
use log::{debug, warn};

/// Which path the resolver took for a reference.
#[derive(Debug, EnumAsInner)]
pub enum Resolution {
    /// The user already supplied a digest, the registry was not consulted.
    AlreadyPinned,
    /// Registry lookups were disabled.
    NotQueried,
    PinnedByDigest(String),
    /// The registry answered but returned no usable digest.
    NoDigest,
    /// The registry could not be inspected, the reference stays unpinned.
    Fallback(InspectionError),
}

#[derive(Debug)]
pub struct PinningDecision {
    /// Image string to put in the service's container spec.
    pub image: String,
    /// Platforms offered by the image, in registry order.
    pub platforms: Vec<Platform>,
    pub resolution: Resolution,
}

/// Decides the image a service should run.
///
/// References that carry a digest are returned exactly as the user wrote
/// them. Anything else gets the `latest` tag when it has none and, when
/// `query_registry` is set, is pinned to the digest the registry reports.
/// A failed lookup never fails the resolution: it degrades to the unpinned
/// reference with no platforms.
pub async fn resolve(
    reference: &ImageReference,
    query_registry: bool,
    inspector: &dyn RegistryInspector,
    auth: Option<&RegistryAuth>,
) -> PinningDecision {
    if reference.is_pinned() {
        debug!("{} is already pinned", reference.original());
        return PinningDecision {
            image: reference.original().to_string(),
            platforms: vec![],
            resolution: Resolution::AlreadyPinned,
        };
    }

    let tagged = reference.with_default_tag();
    if !query_registry {
        return PinningDecision {
            image: tagged.to_string(),
            platforms: vec![],
            resolution: Resolution::NotQueried,
        };
    }

    let Inspection { digest, platforms } = match inspector.inspect(&tagged, auth).await {
        Ok(inspection) => inspection,
        Err(err) => {
            warn!("could not resolve {} to a digest: {}", tagged, err);
            return PinningDecision {
                image: tagged.to_string(),
                platforms: vec![],
                resolution: Resolution::Fallback(err),
            };
        }
    };

    return match digest {
        Some(digest) if reference::is_digest(&digest) => {
            let pinned = tagged.with_digest(&digest);
            debug!("pinned {} to {}", tagged, pinned);
            PinningDecision {
                image: pinned.to_string(),
                platforms,
                resolution: Resolution::PinnedByDigest(digest),
            }
        }
        other => {
            if let Some(digest) = other {
                warn!("registry returned malformed digest {:?} for {}", digest, tagged);
            }
            PinningDecision {
                image: tagged.to_string(),
                platforms,
                resolution: Resolution::NoDigest,
            }
        }
    };
}
