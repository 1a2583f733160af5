use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use carenav_lib::{
    application::{services::sample_data, TriageRequest},
    build_environment, build_environment_at,
    infrastructure::{http_client::KeySource, CredentialSources},
    init_tracing, AppHandles,
};

#[derive(Parser)]
#[command(name = "carenav")]
#[command(about = "Healthcare facility navigator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides CARENAV_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a natural-language request through the function classifier
    Query {
        /// Free-text request, e.g. "urgent care near downtown"
        text: String,
    },

    /// Invoke one catalog function directly with JSON arguments
    Call {
        name: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },

    /// Emergency triage: recommend nearby hospitals for a situation
    Triage(TriageArgs),

    /// List every facility as a map marker
    Facilities,

    /// Find facilities whose attribute equals a JSON value
    Attribute {
        key: String,

        /// Expected value as JSON (bare words are taken as strings)
        value: String,

        #[arg(long = "type")]
        facility_type: Option<String>,
    },

    /// Write the demo facilities into an empty store
    Seed,

    /// Store a classifier API key in the data directory's .env file
    SaveKey {
        key: String,
    },

    /// Show which source an API key would be loaded from
    KeyStatus {
        /// Only consult this source: env, file or api
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Args)]
struct TriageArgs {
    message: String,

    /// critical, serious or stable
    #[arg(long, default_value = "critical")]
    severity: String,

    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let handles = match &cli.data_dir {
        Some(dir) => build_environment_at(dir),
        None => build_environment(),
    }
    .context("failed to bootstrap CareNav environment")?;

    run(cli.command, &handles)
}

fn run(command: Commands, handles: &AppHandles) -> Result<()> {
    match command {
        Commands::Query { text } => print_json(&handles.navigator.process_query(&text)),
        Commands::Call { name, arguments } => {
            let arguments: Value =
                serde_json::from_str(&arguments).context("arguments must be valid JSON")?;
            let result = handles.dispatcher.dispatch(&name, arguments);
            print_json(&result)?;
            if result.get("error").is_some() {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Triage(args) => {
            let mut request = TriageRequest::new(args.message).with_severity(args.severity);
            if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
                request = request.at(lat, lon);
            }
            print_json(&handles.navigator.triage(&request)?)
        }
        Commands::Facilities => print_json(&handles.navigator.map_facilities()?),
        Commands::Attribute {
            key,
            value,
            facility_type,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let matches =
                handles
                    .navigator
                    .search_by_attribute(&key, value, facility_type.as_deref())?;
            print_json(&matches)
        }
        Commands::Seed => {
            let seeded = sample_data::seed_if_empty(handles.store.as_ref())?;
            print_json(&serde_json::json!({ "seeded": seeded }))
        }
        Commands::SaveKey { key } => {
            if key.trim().is_empty() {
                bail!("API key must not be empty");
            }
            let path = CredentialSources::new(&handles.data_dir).save_to_dotenv(key.trim())?;
            print_json(&serde_json::json!({ "saved": path }))
        }
        Commands::KeyStatus { source } => {
            let only = source.as_deref().map(str::parse::<KeySource>).transpose()?;
            let found = CredentialSources::new(&handles.data_dir).resolve(only);
            print_json(&serde_json::json!({
                "available": found.is_some(),
                "source": found.map(|(_, source)| source.to_string()),
            }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
