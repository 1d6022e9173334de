/*
 * Responsibility
 * - CLI entry point: parse args, load Config, wire SoftwareCrypto into PopTokenGenerator
 * - Print req_cnf data or a signed SHR (no logic beyond wiring)
 */
use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pop_token::{PopTokenGenerator, ShrParameters, SoftwareCrypto, config::Config};

/// Generate Proof-of-Possession artifacts (req_cnf, Signed HTTP Request JWT)
/// with an Ed25519 key.
#[derive(Parser, Debug)]
#[command(name = "shr-gen", version, about)]
struct Args {
    /// Path to the Ed25519 private key in PEM (PKCS#8). Overrides POP_PRIVATE_KEY_PEM.
    #[arg(long, value_name = "FILE", global = true)]
    private_pem: Option<PathBuf>,

    /// Correlation id for logs. Overrides POP_CORRELATION_ID.
    #[arg(long, global = true)]
    correlation_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print kid, req_cnf and req_cnf hash for the key.
    Cnf {
        /// Print as a JSON object
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Sign a SHR binding an access token to an HTTP request.
    Sign {
        /// Access token to bind (`at`)
        #[arg(long)]
        access_token: String,

        /// HTTP method (`m`), e.g. GET/POST
        #[arg(long)]
        method: Option<String>,

        /// Full resource URL (`u`, `p`, `q`)
        #[arg(long)]
        url: Option<String>,

        /// Server-provided nonce. Default: random UUID v4.
        #[arg(long)]
        nonce: Option<String>,

        /// Opaque application claims (`client_claims`)
        #[arg(long)]
        client_claims: Option<String>,

        /// Extra claim merged last, NAME=JSON (repeatable). Non-JSON values are taken as strings.
        #[arg(long = "claim", value_name = "NAME=JSON", value_parser = parse_claim)]
        claims: Vec<(String, Value)>,

        /// Print only the SHR (no extra lines)
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
}

fn init_tracing() {
    // Prefer RUST_LOG if set. Logs go to stderr so stdout stays pipeable.
    // Ex:
    // RUST_LOG=pop_token=debug shr-gen sign ...
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_claim(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=JSON, got {raw:?}"))?;
    if name.is_empty() {
        return Err(format!("empty claim name in {raw:?}"));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::from_env()?;
    let pem = match &args.private_pem {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => config.require_private_key_pem()?.to_string(),
    };
    let correlation_id = args
        .correlation_id
        .clone()
        .unwrap_or_else(|| config.correlation_id.clone());

    let crypto = SoftwareCrypto::from_pkcs8_pem(&pem)?;
    let key_id = crypto
        .pinned_kid()
        .context("pinned key has no thumbprint")?
        .to_string();
    let generator = PopTokenGenerator::new(Arc::new(crypto));

    tracing::debug!(correlation_id = %correlation_id, kid = %key_id, "shr-gen ready");

    match args.command {
        Command::Cnf { json } => {
            let data = generator
                .generate_cnf(&ShrParameters::new(correlation_id))
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("kid: {}", data.kid);
                println!("req_cnf: {}", data.req_cnf_string);
                println!("req_cnf_hash: {}", data.req_cnf_hash);
            }
        }
        Command::Sign {
            access_token,
            method,
            url,
            nonce,
            client_claims,
            claims,
            quiet,
        } => {
            let request = ShrParameters {
                resource_request_method: method,
                resource_request_uri: url,
                shr_claims: client_claims,
                shr_nonce: nonce,
                correlation_id,
            };
            let extra: Map<String, Value> = claims.into_iter().collect();
            let extra = (!extra.is_empty()).then_some(&extra);

            let shr = generator
                .sign_payload(&access_token, &key_id, &request, extra)
                .await?;

            if quiet {
                println!("{}", shr);
                return Ok(());
            }

            println!("SHR: {}", shr);
            println!("kid: {}", key_id);
        }
    }

    Ok(())
}
