//! zg - command line client for zg chain nodes.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use zg_client::{ClientConfig, ClientError, ClientHandle, ClientResult};
use zg_core::ModuleError;
use zg_executor::{CompletionPolicy, LocalSigner, Operation, Signer};
use zg_telemetry::Metrics;

/// zg chain node client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via ZG_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Node address, overriding the configuration file
    #[arg(short, long)]
    address: Option<String>,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap, report the session and disconnect
    Status,
    /// Decode a `{pallet, error}` pair through the node's error table
    LookupError {
        /// Pallet index or name
        #[arg(long)]
        pallet: String,
        /// Error index within the pallet
        #[arg(long)]
        error: u32,
    },
    /// Sign, submit and follow an operation
    Submit {
        #[arg(long)]
        pallet: String,
        #[arg(long)]
        call: String,
        /// Call arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        /// Event representing the operation's effect (`Pallet.Name`)
        #[arg(long)]
        expect_event: Option<String>,
        /// Stop following after this many milliseconds
        #[arg(long)]
        wait_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize TLS crypto provider (must be before any WS connections)
    zg_ws::init_crypto();

    let args = Args::parse();
    zg_telemetry::init_logging()?;

    info!("Starting zg v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > ZG_CONFIG env var > default
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("ZG_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let mut config = ClientConfig::load(&config_path)
        .with_context(|| format!("loading {config_path}"))?;
    if let Some(address) = &args.address {
        config.address = address.clone();
    }

    let result = run(&config, args.command).await;

    if args.metrics {
        print!("{}", Metrics::render()?);
    }

    match result {
        Ok(code) => Ok(code),
        Err(e) => {
            error!(tag = e.tag(), error = %e, "Command failed");
            eprintln!("error[{}]: {e}", e.tag());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(config: &ClientConfig, command: Command) -> ClientResult<ExitCode> {
    let client = ClientHandle::connect(config).await?;

    let code = match command {
        Command::Status => status(&client)?,
        Command::LookupError { pallet, error } => lookup_error(&client, &pallet, error)?,
        Command::Submit {
            pallet,
            call,
            args,
            expect_event,
            wait_ms,
        } => {
            let signer = load_signer(config)?;
            let args: Value = serde_json::from_str(&args)
                .map_err(|e| ClientError::Config(format!("--args is not JSON: {e}")))?;
            let policy = match expect_event.as_deref() {
                Some(spec) => CompletionPolicy::parse_event(spec).ok_or_else(|| {
                    ClientError::Config(format!("--expect-event must be Pallet.Name, got {spec}"))
                })?,
                None => CompletionPolicy::AllEvents,
            };
            let operation = Operation::new(pallet, call, args);
            submit(&client, operation, &signer, policy, wait_ms.map(Duration::from_millis)).await?
        }
    };

    client.disconnect()?;
    Ok(code)
}

fn status(client: &ClientHandle) -> ClientResult<ExitCode> {
    let table = client.error_table()?;
    println!("address:        {}", client.address());
    println!("metadata:       v{}", table.version());
    println!("fetched at:     {}", table.fetched_at().to_rfc3339());
    println!("pallets:        {}", table.pallet_count());
    println!("error entries:  {}", table.len());
    match client.aux_service()? {
        Some(aux) => println!("aux service:    {} (available)", aux.url()),
        None => println!("aux service:    unavailable"),
    }
    Ok(ExitCode::SUCCESS)
}

fn lookup_error(client: &ClientHandle, pallet: &str, error: u32) -> ClientResult<ExitCode> {
    let table = client.error_table()?;
    let index = match pallet.parse::<u32>() {
        Ok(index) => index,
        Err(_) => match table.pallet_index(pallet) {
            Some(index) => index,
            None => {
                println!("unknown pallet: {pallet}");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    let decoded = client.decode_module_error(ModuleError::new(index, error))?;
    if decoded.entry().is_some() {
        println!("{decoded}");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("not found: {decoded}");
        Ok(ExitCode::FAILURE)
    }
}

fn load_signer(config: &ClientConfig) -> ClientResult<LocalSigner> {
    let signer = config
        .signer
        .as_ref()
        .ok_or_else(|| ClientError::Config("submit requires a [signer] table".to_string()))?;
    Ok(LocalSigner::load(
        signer.key_source()?,
        signer.expected_address()?,
    )?)
}

async fn submit(
    client: &ClientHandle,
    operation: Operation,
    signer: &dyn Signer,
    policy: CompletionPolicy,
    wait: Option<Duration>,
) -> ClientResult<ExitCode> {
    let mut tx = client.submit(operation, signer, policy).await?;
    println!("submitted {} (subscription {})", tx.id(), tx.subscription_id());

    let follow = async {
        while let Some(update) = tx.next_status().await {
            match &update.block {
                Some(block) => println!("status: {} {block}", update.tag),
                None => println!("status: {}", update.tag),
            }
        }
        tx.wait().await
    };

    let outcome = match wait {
        Some(limit) => match tokio::time::timeout(limit, follow).await {
            Ok(outcome) => outcome,
            Err(_) => {
                println!("still pending after {}ms; stopped following", limit.as_millis());
                tx.cancel();
                return Ok(ExitCode::FAILURE);
            }
        },
        None => follow.await,
    };

    match outcome {
        Ok(done) => {
            println!("finalized with {} events", done.events.len());
            for event in &done.events {
                println!("  {}.{} {}", event.pallet, event.name, event.fields);
            }
            if let Some(selected) = done.selected {
                println!("effect: {}.{} {}", selected.pallet, selected.name, selected.fields);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("error[{}]: {e}", e.tag());
            Ok(ExitCode::FAILURE)
        }
    }
}
