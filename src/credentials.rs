use crate::reference::DEFAULT_DOMAIN;
use base64::{engine::general_purpose, Engine};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

const DOCKER_HUB_AUTH_KEYS: [&str; 3] = ["https://index.docker.io/v1/", "index.docker.io", "docker.io"];

/// Credentials for a single registry.
#[derive(PartialEq, Eq, Clone, Default)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server_address: String,
}

impl RegistryAuth {
    pub fn new(username: &str, password: &str, server_address: &str) -> RegistryAuth {
        return RegistryAuth {
            username: username.to_string(),
            password: password.to_string(),
            server_address: server_address.to_string(),
        };
    }

    /// Value of the `X-Registry-Auth` header: the JSON auth config,
    /// base64url encoded.
    pub fn encode(&self) -> String {
        let mut config = serde_json::json!({
            "username": self.username,
            "password": self.password,
        });
        if !self.server_address.is_empty() {
            config["serveraddress"] = serde_json::Value::String(self.server_address.clone());
        }
        return general_purpose::URL_SAFE.encode(config.to_string());
    }
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Looks up credentials for `registry` (a reference's domain).
///
/// Checked in order:
/// 1. `DOCKERHUB_USERNAME` and `DOCKERHUB_TOKEN`, for Docker Hub only
/// 2. the `auths` section of the docker client's `config.json`
pub fn for_registry(registry: &str) -> Option<RegistryAuth> {
    if let Some(auth) = from_env(registry) {
        debug!("using credentials from environment for {}", registry);
        return Some(auth);
    }
    let path = docker_config_path()?;
    let auth = from_docker_config(&path, registry);
    if auth.is_some() {
        debug!("using credentials from {} for {}", path.display(), registry);
    }
    return auth;
}

fn from_env(registry: &str) -> Option<RegistryAuth> {
    if registry != DEFAULT_DOMAIN {
        return None;
    }
    if let (Ok(username), Ok(token)) = (
        std::env::var("DOCKERHUB_USERNAME"),
        std::env::var("DOCKERHUB_TOKEN"),
    ) {
        return Some(RegistryAuth::new(&username, &token, DOCKER_HUB_AUTH_KEYS[0]));
    }
    return None;
}

fn docker_config_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(Path::new(&dir).join("config.json"));
    }
    let home = std::env::var("HOME").ok()?;
    return Some(Path::new(&home).join(".docker").join("config.json"));
}

pub fn from_docker_config(path: &Path, registry: &str) -> Option<RegistryAuth> {
    let contents = std::fs::read_to_string(path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&contents).ok()?;
    let auths = config.get("auths")?.as_object()?;

    let keys: Vec<String> = if registry == DEFAULT_DOMAIN {
        DOCKER_HUB_AUTH_KEYS.iter().map(|k| k.to_string()).collect()
    } else {
        vec![
            registry.to_string(),
            format!("https://{}", registry),
            format!("http://{}", registry),
        ]
    };

    for key in keys {
        let encoded = match auths.get(&key).and_then(|a| a.get("auth")).and_then(|a| a.as_str()) {
            Some(e) => e,
            None => continue,
        };
        // "auth" holds base64 encoded "username:password"
        let decoded = match general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let decoded = match String::from_utf8(decoded) {
            Ok(d) => d,
            Err(_) => continue,
        };
        if let Some((username, password)) = decoded.split_once(':') {
            return Some(RegistryAuth::new(username, password, &key));
        }
    }
    return None;
}
