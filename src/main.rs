use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tircloud::prelude::*;
use tracing_subscriber::EnvFilter;

/// Declarative lifecycle for TIR GPU cloud resources
#[derive(Parser, Debug)]
#[command(name = "tircloud", version, about, long_about = None)]
struct Args {
    /// API key sent as the `apikey` query parameter
    #[arg(long, env = API_KEY_VAR, hide_env_values = true)]
    api_key: Option<String>,

    /// Bearer token
    #[arg(long, env = AUTH_TOKEN_VAR, hide_env_values = true)]
    auth_token: Option<String>,

    /// API base url
    #[arg(long, env = API_ENDPOINT_VAR)]
    api_endpoint: Option<String>,

    /// File holding the last applied config and state of every resource
    #[arg(long, env = "TIR_STORE", default_value = DEFAULT_STORE_FILE)]
    store: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or delete resources until they match the manifest
    Apply {
        /// YAML or JSON manifest
        manifest: PathBuf,
    },
    /// Delete every resource recorded in the store
    Destroy,
    /// List the teams of the account
    Teams {
        #[arg(long)]
        active_iam: String,
    },
    /// List the projects of a team
    Projects {
        #[arg(long)]
        team_id: String,
        #[arg(long)]
        active_iam: String,
    },
    /// List the IAMs the credentials can act as
    Iams,
    /// List notebook images and their versions
    Images {
        #[arg(long)]
        active_iam: String,
    },
    /// List SKU plans of a service
    Plans {
        #[arg(long)]
        active_iam: String,
        #[command(subcommand)]
        service: Service,
    },
}

#[derive(Subcommand, Debug)]
enum Service {
    Notebook {
        #[arg(long)]
        image_name: String,
        #[arg(long)]
        image_version: String,
    },
    InferenceService {
        #[arg(long)]
        framework: String,
    },
    PrivateCloud,
}

impl From<Service> for PlanQuery {
    fn from(service: Service) -> Self {
        match service {
            Service::Notebook {
                image_name,
                image_version,
            } => PlanQuery::Notebook {
                image_name,
                image_version,
            },
            Service::InferenceService { framework } => PlanQuery::InferenceService { framework },
            Service::PrivateCloud => PlanQuery::PrivateCloud,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.log_level);

    let config = ProviderConfig::resolve(args.api_key, args.auth_token, args.api_endpoint)
        .context("Missing provider credentials")?;
    tracing::debug!("Using {:?}", config);
    let client = TirClient::new(&config).context("Could not build the API client")?;

    let rt = tokio::runtime::Runtime::new()?;
    let mut cloud = TirCloud::new(Datastore::new(FileStorage::new(args.store)));
    cloud.init_registry(rt.handle().clone(), client.clone());
    let tir = cloud.tir_provider(rt.handle(), client);

    match args.command {
        Command::Apply { manifest } => {
            let manifest = Manifest::from_path(&manifest)
                .with_context(|| format!("Could not load {}", manifest.display()))?;
            let ids = cloud
                .declare(&tir, &manifest)
                .context("Invalid manifest")?;
            tracing::info!("Declared {} resources", ids.len());
            cloud
                .apply()
                .context("Could not apply cloud infrastructure")
        }
        Command::Destroy => cloud
            .destroy()
            .context("Could not destroy cloud infrastructure"),
        Command::Teams { active_iam } => print(tir.teams(&active_iam)),
        Command::Projects {
            team_id,
            active_iam,
        } => print(tir.projects(&team_id, &active_iam)),
        Command::Iams => print(tir.iams()),
        Command::Images { active_iam } => print(tir.images(&active_iam)),
        Command::Plans {
            active_iam,
            service,
        } => print(tir.plans(&PlanQuery::from(service), &active_iam)),
    }
}

fn print<T: Serialize>(listing: Result<Listing<T>, ApiError>) -> anyhow::Result<()> {
    let listing = listing.context("Lookup failed")?;
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
