//! zkv-relayer
//!
//! Command line entry point for the zkVerify relay pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use zkv_common::ArtifactStore;
use zkv_relayer::{config, Relayer, RelayerConfig, RelayerError, VerifyArgs};

#[derive(Parser)]
#[command(
    name = "zkv-relayer",
    about = "Submit proofs to zkVerify and collect their aggregation paths"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit the proof bundle and write aggregation.json.
    Submit(SubmitArgs),
    /// Resolve the verification key hash and write vkey.json.
    VkeyHash(ArtifactArgs),
    /// Print the verifyProof arguments from aggregation.json.
    VerifyArgs(ArtifactArgs),
}

#[derive(Args)]
struct ArtifactArgs {
    /// Directory holding the proof artifacts (defaults to ARTIFACT_DIR).
    #[arg(long)]
    artifact_dir: Option<PathBuf>,
}

#[derive(Args)]
struct SubmitArgs {
    #[command(flatten)]
    artifacts: ArtifactArgs,

    /// Aggregation domain (defaults to ZKVERIFY_DOMAIN_ID).
    #[arg(long)]
    domain_id: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let result = match cli.command {
        Commands::Submit(args) => submit(args).await,
        Commands::VkeyHash(args) => vkey_hash(args).await,
        Commands::VerifyArgs(args) => verify_args(args),
    };

    if let Err(err) = &result {
        match err.downcast_ref::<RelayerError>() {
            Some(relayer_err) => error!(code = relayer_err.error_code(), "{:#}", err),
            None => error!("{:#}", err),
        }
    }
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zkv_relayer=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(artifacts: ArtifactArgs) -> Result<RelayerConfig> {
    let mut config = RelayerConfig::from_env()?;
    if let Some(dir) = artifacts.artifact_dir {
        config.artifact_dir = dir;
    }
    Ok(config)
}

async fn submit(args: SubmitArgs) -> Result<()> {
    let mut config = load_config(args.artifacts)?;
    if let Some(domain_id) = args.domain_id {
        config.submission.domain_id = domain_id;
    }

    info!("Starting zkv-relayer");
    info!("Node: {}", config.session.ws_url);
    info!("Artifacts: {}", config.artifact_dir.display());

    let relayer = Relayer::from_config(config)?;
    let record = relayer.submit().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("failed to encode aggregation record")?
    );
    Ok(())
}

async fn vkey_hash(args: ArtifactArgs) -> Result<()> {
    let config = load_config(args)?;
    let relayer = Relayer::from_config(config)?;
    let hash = relayer.resolve_vkey_hash().await?;
    println!("ZKVERIFY_VKEY_HASH={}", hash);
    Ok(())
}

fn verify_args(args: ArtifactArgs) -> Result<()> {
    let dir = args
        .artifact_dir
        .unwrap_or_else(|| config::artifact_dir(&config::env_var));
    let store = ArtifactStore::new(dir);

    let verify = VerifyArgs::load(&store, config::test_contract(&config::env_var))?;
    if verify.contract.is_none() {
        info!("ZKVERIFY_TEST_CONTRACT is not set; printing arguments only");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&verify).context("failed to encode verify arguments")?
    );
    Ok(())
}
