use crate::error::Error;
use miette::NamedSource;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DOMAIN: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const NAME_TOTAL_LENGTH_MAX: usize = 255;

lazy_static! {
    // Lowercase alphanumerics, separated by a period, one or two
    // underscores, or any number of dashes.
    static ref PATH_COMPONENT: Regex =
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap();
    static ref DOMAIN: Regex = Regex::new(
        r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?$"
    )
    .unwrap();
    static ref TAG: Regex = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap();
    static ref DIGEST: Regex = Regex::new(
        r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$"
    )
    .unwrap();
    static ref IMAGE_ID: Regex = Regex::new(r"^[a-f0-9]{64}$").unwrap();
}

/// A parsed and normalized image reference.
///
/// Normalization makes the registry explicit (`alpine` lives at
/// `docker.io/library/alpine`) while `Display` renders the familiar form
/// users type: references on the default registry drop the registry and
/// the `library/` namespace, everything else stays fully qualified.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ImageReference {
    original: String,
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn parse(text: &str) -> Result<ImageReference, Error> {
        if text.is_empty() {
            return Err(invalid(
                text,
                "repository name must have at least one component",
                (0, 0),
                None,
            ));
        }

        let (remainder, digest) = match text.find('@') {
            Some(at) => {
                let digest = &text[at + 1..];
                if !is_digest(digest) {
                    return Err(invalid(
                        text,
                        "invalid digest",
                        (at + 1, digest.len()),
                        Some("digests look like sha256:<64 hexadecimal characters>"),
                    ));
                }
                (&text[..at], Some(digest.to_string()))
            }
            None => (text, None),
        };

        // A colon only starts a tag when no slash follows it, otherwise it
        // separates a registry host from its port.
        let (name, tag) = match remainder.rfind(':') {
            Some(colon) if !remainder[colon..].contains('/') => {
                let tag = &remainder[colon + 1..];
                if !TAG.is_match(tag) {
                    return Err(invalid(
                        text,
                        "invalid tag",
                        (colon + 1, tag.len()),
                        Some("tags are up to 128 letters, digits, underscores, periods and dashes"),
                    ));
                }
                (&remainder[..colon], Some(tag.to_string()))
            }
            _ => (remainder, None),
        };

        if name.is_empty() {
            return Err(invalid(
                text,
                "repository name must have at least one component",
                (0, remainder.len()),
                None,
            ));
        }
        if IMAGE_ID.is_match(text) {
            return Err(invalid(
                text,
                "cannot specify 64-byte hexadecimal strings",
                (0, text.len()),
                Some("image IDs cannot be used as a repository name"),
            ));
        }
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(invalid(
                text,
                "repository name must not be more than 255 characters",
                (0, name.len()),
                None,
            ));
        }

        let (domain, path) = split_domain(name);
        let path_offset = match domain {
            Some(d) => {
                if !DOMAIN.is_match(d) {
                    return Err(invalid(text, "invalid registry host", (0, d.len()), None));
                }
                d.len() + 1
            }
            None => 0,
        };

        if path.to_lowercase() != path {
            return Err(invalid(
                text,
                "repository name must be lowercase",
                (path_offset, path.len()),
                None,
            ));
        }
        let mut offset = path_offset;
        for component in path.split('/') {
            if !PATH_COMPONENT.is_match(component) {
                return Err(invalid(
                    text,
                    "invalid repository name component",
                    (offset, component.len()),
                    Some(
                        r#"here are some examples of valid references:
 - alpine
 - alpine:edge
 - library/alpine@sha256:<digest>
 - ghcr.io/owner/app:v1
 - localhost:5000/team/app"#,
                    ),
                ));
            }
            offset += component.len() + 1;
        }

        let domain = match domain {
            None | Some(LEGACY_DEFAULT_DOMAIN) => DEFAULT_DOMAIN,
            Some(d) => d,
        };
        let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
            format!("{}{}", OFFICIAL_REPO_PREFIX, path)
        } else {
            path.to_string()
        };

        return Ok(ImageReference {
            original: text.to_string(),
            domain: domain.to_string(),
            path,
            tag,
            digest,
        });
    }

    /// The text this reference was parsed from, byte for byte.
    pub fn original(&self) -> &str {
        return &self.original;
    }

    pub fn domain(&self) -> &str {
        return &self.domain;
    }

    /// Repository path within the registry, e.g. `library/alpine`.
    pub fn path(&self) -> &str {
        return &self.path;
    }

    pub fn tag(&self) -> Option<&str> {
        return self.tag.as_deref();
    }

    pub fn digest(&self) -> Option<&str> {
        return self.digest.as_deref();
    }

    pub fn is_default_registry(&self) -> bool {
        return self.domain == DEFAULT_DOMAIN;
    }

    /// A reference carrying a digest names immutable content.
    pub fn is_pinned(&self) -> bool {
        return self.digest.is_some();
    }

    /// Fully qualified repository name, e.g. `docker.io/library/alpine`.
    pub fn name(&self) -> String {
        return format!("{}/{}", self.domain, self.path);
    }

    pub fn familiar_name(&self) -> String {
        if !self.is_default_registry() {
            return self.name();
        }
        return match self.path.strip_prefix(OFFICIAL_REPO_PREFIX) {
            Some(short) if !short.contains('/') => short.to_string(),
            _ => self.path.clone(),
        };
    }

    /// Adds the `latest` tag to a reference that has neither tag nor digest.
    pub fn with_default_tag(&self) -> ImageReference {
        let mut reference = self.clone();
        if reference.tag.is_none() && reference.digest.is_none() {
            reference.tag = Some(DEFAULT_TAG.to_string());
        }
        return reference;
    }

    /// Pins the reference to `digest`, keeping its tag for display.
    pub fn with_digest(&self, digest: &str) -> ImageReference {
        let mut reference = self.clone();
        reference.digest = Some(digest.to_string());
        return reference;
    }

    pub fn canonical_string(&self) -> String {
        return self.render(self.name());
    }

    fn render(&self, name: String) -> String {
        let mut rendered = name;
        if let Some(tag) = &self.tag {
            rendered.push(':');
            rendered.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            rendered.push('@');
            rendered.push_str(digest);
        }
        return rendered;
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.familiar_name()))
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageReference::parse(s)
    }
}

/// Whether `text` is a well-formed content digest such as `sha256:<hex>`.
///
/// Registered algorithms must carry exactly as many hex characters as their
/// hash produces.
pub fn is_digest(text: &str) -> bool {
    if !DIGEST.is_match(text) {
        return false;
    }
    return match text.split_once(':') {
        Some(("sha256", hex)) => hex.len() == 64,
        Some(("sha384", hex)) => hex.len() == 96,
        Some(("sha512", hex)) => hex.len() == 128,
        _ => true,
    };
}

fn split_domain(name: &str) -> (Option<&str>, &str) {
    return match name.split_once('/') {
        Some((first, rest))
            if first.contains(|c: char| c == '.' || c == ':')
                || first == "localhost"
                || first.to_lowercase() != first =>
        {
            (Some(first), rest)
        }
        _ => (None, name),
    };
}

fn invalid(text: &str, reason: &str, span: (usize, usize), help: Option<&str>) -> Error {
    return Error::InvalidReference {
        reason: reason.to_string(),
        src: NamedSource::new("image reference", text.to_string()),
        span: span.into(),
        help: help.map(|h| h.to_string()),
    };
}
