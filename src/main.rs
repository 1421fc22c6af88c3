use clap::{Parser, Subcommand};
use digestpin::config::{self, Config};
use digestpin::credentials;
use digestpin::daemon::DaemonClient;
use digestpin::registry::distribution::RegistryClient;
use digestpin::registry::RegistryInspector;
use digestpin::resolver;
use digestpin::service::{self, ServiceCreateOptions, ServiceSpec};
use digestpin::ImageReference;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "digestpin", version)]
#[command(about = "Pin container image references to registry digests")]
struct Cli {
    /// Daemon API address
    #[arg(long, global = true, env = "DOCKER_HOST", default_value = config::DEFAULT_HOST)]
    host: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Use plain HTTP when talking to registries directly
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an image reference to a digest-pinned reference
    Resolve {
        image: String,

        /// Only normalize the reference, skip the registry lookup
        #[arg(long)]
        no_query: bool,

        /// Query the image's registry directly instead of the daemon
        #[arg(long)]
        direct: bool,
    },
    /// Create a service running the pinned image
    Create {
        image: String,

        /// Service name
        #[arg(long)]
        name: Option<String>,

        /// Service label, as key=value
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,

        /// Submit the image without pinning it
        #[arg(long)]
        no_query: bool,
    },
}

fn parse_label(value: &str) -> Result<(String, String), String> {
    return match value.split_once('=') {
        Some((key, v)) if !key.is_empty() => Ok((key.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", value)),
    };
}

impl Cli {
    fn uses_daemon(&self) -> bool {
        return match &self.command {
            Commands::Resolve { no_query, direct, .. } => !no_query && !direct,
            Commands::Create { .. } => true,
        };
    }

    fn config(&self) -> Result<Config, digestpin::error::Error> {
        let mut config = Config::default();
        // DOCKER_HOST often names a unix socket, only reject it when it is dialed
        if self.uses_daemon() {
            config.host = Config::parse_host(&self.host)?;
        }
        config.timeout = Duration::from_secs(self.timeout);
        config.insecure = self.insecure;
        match &self.command {
            Commands::Resolve { no_query, direct, .. } => {
                config.query_registry = !no_query;
                config.direct = *direct;
            }
            Commands::Create { no_query, .. } => {
                config.query_registry = !no_query;
            }
        }
        return Ok(config);
    }
}

async fn resolve(config: &Config, image: &str) -> miette::Result<()> {
    let reference = ImageReference::parse(image)?;
    let inspector: Box<dyn RegistryInspector> = if config.direct || !config.query_registry {
        Box::new(RegistryClient::new(config.insecure))
    } else {
        Box::new(DaemonClient::new(config)?)
    };
    let auth = credentials::for_registry(reference.domain());

    let decision =
        resolver::resolve(&reference, config.query_registry, inspector.as_ref(), auth.as_ref()).await;
    if let Some(err) = decision.resolution.as_fallback() {
        eprintln!("warning: {} was not pinned: {}", decision.image, err);
    }
    println!("{}", decision.image);
    for platform in &decision.platforms {
        println!("platform: {}", platform);
    }
    return Ok(());
}

async fn create(
    config: &Config,
    image: &str,
    name: Option<String>,
    labels: Vec<(String, String)>,
) -> miette::Result<()> {
    let client = DaemonClient::new(config)?;
    let mut spec = ServiceSpec::new(name.as_deref().unwrap_or_default(), image);
    spec.labels = labels.into_iter().collect();

    let registry_auth = match ImageReference::parse(image) {
        Ok(reference) => credentials::for_registry(reference.domain()),
        Err(_) => None,
    };
    let options = ServiceCreateOptions {
        query_registry: config.query_registry,
        registry_auth,
    };

    let response = service::create_service(&client, &client, spec, &options).await?;
    println!("{}", response.id);
    for warning in &response.warnings {
        eprintln!("warning: {}", warning);
    }
    return Ok(());
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = cli.config()?;
    return match cli.command {
        Commands::Resolve { image, .. } => resolve(&config, &image).await,
        Commands::Create {
            image,
            name,
            labels,
            ..
        } => create(&config, &image, name, labels).await,
    };
}
