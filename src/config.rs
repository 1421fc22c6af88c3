use crate::error::Error;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "http://localhost:2375";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the daemon API.
    pub host: Url,
    /// Applies to every request sent to the daemon.
    pub timeout: Duration,
    /// Look up digests before creating services.
    pub query_registry: bool,
    /// Inspect images on their registry instead of through the daemon.
    pub direct: bool,
    /// Talk plain HTTP to registries when inspecting directly.
    pub insecure: bool,
}

impl Default for Config {
    fn default() -> Self {
        return Config {
            host: Url::parse(DEFAULT_HOST).expect("default host is a valid URL"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            query_registry: true,
            direct: false,
            insecure: false,
        };
    }
}

impl Config {
    /// Parses a daemon address the way `DOCKER_HOST` spells it.
    ///
    /// `tcp://` addresses are spoken to over plain HTTP.
    pub fn parse_host(host: &str) -> Result<Url, Error> {
        let url = Url::parse(host)
            .map_err(|e| Error::Config(format!("invalid daemon host {:?}: {}", host, e)))?;
        return match url.scheme() {
            "http" | "https" => Ok(url),
            "tcp" => {
                let rewritten = format!("http{}", &host["tcp".len()..]);
                Url::parse(&rewritten)
                    .map_err(|e| Error::Config(format!("invalid daemon host {:?}: {}", host, e)))
            }
            "unix" | "npipe" => Err(Error::Config(format!(
                "{} sockets are not supported, use tcp://",
                url.scheme(),
            ))),
            other => Err(Error::Config(format!(
                "unsupported scheme {:?} in daemon host {:?}",
                other, host,
            ))),
        };
    }
}
