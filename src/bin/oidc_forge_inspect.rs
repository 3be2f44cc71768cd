// ABOUTME: oidc-forge-inspect - command-line tool to inspect pipelines, generate keys and decode tokens
// ABOUTME: Builds providers from OIDC_FORGE_* environment variables the same way a host would
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oidc-forge contributors
//!
//! Usage:
//! ```bash
//! # List every server pipeline with handler order, activation and filters
//! oidc-forge-inspect pipelines
//!
//! # Only the token endpoint stages, as JSON
//! oidc-forge-inspect pipelines --context Token --format json
//!
//! # Resource-server pipelines
//! oidc-forge-inspect pipelines --validation
//!
//! # Generate a base64 master key for OIDC_FORGE_SIGNING_KEY
//! oidc-forge-inspect generate-key
//!
//! # Decode a token issued with OIDC_FORGE_SIGNING_KEY
//! oidc-forge-inspect decode <token>
//! ```

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use oidc_forge::config::{ServerOptions, ValidationOptions};
use oidc_forge::formats::{
    read_token_with_candidates, KeyProvider, StaticKeyProvider, TokenFormatKind, TokenFormats,
};
use oidc_forge::logging::{LogFormat, LoggingConfig};
use oidc_forge::pipeline::{ErasedDescriptor, HandlerRegistry};
use oidc_forge::server::ServerProvider;
use oidc_forge::validation::ValidationProvider;
use oidc_forge_core::models::TokenType;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "oidc-forge-inspect",
    about = "Inspect oidc-forge handler pipelines and tokens",
    long_about = "Builds the server or validation provider from OIDC_FORGE_* environment variables and reports what it would run."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[non_exhaustive]
#[derive(Subcommand)]
enum Command {
    /// List the resolved handler pipelines
    Pipelines {
        /// Only show contexts whose name contains this text
        #[arg(long)]
        context: Option<String>,

        /// Inspect the validation provider instead of the server
        #[arg(long)]
        validation: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate a random base64 master key
    GenerateKey,

    /// Decode a token with the configured signing key
    Decode {
        /// Token to decode
        token: String,

        /// Token format to read
        #[arg(long, default_value = "sealed")]
        token_format: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    LoggingConfig {
        level: level.to_owned(),
        ..LoggingConfig::default()
    }
    .with_format(LogFormat::Compact)
    .init()?;

    match cli.command {
        Command::Pipelines {
            context,
            validation,
            format,
        } => print_pipelines(context.as_deref(), validation, format),
        Command::GenerateKey => generate_key(),
        Command::Decode {
            token,
            token_format,
        } => decode(&token, &token_format),
    }
}

fn print_pipelines(filter: Option<&str>, validation: bool, format: OutputFormat) -> Result<()> {
    if validation {
        let mut options = ValidationOptions::from_env();
        if options.signing_key.is_none() {
            options = options.with_signing_key(STANDARD.encode(random_key()?));
        }
        let provider = ValidationProvider::builder(options).build()?;
        render(&collect(provider.registry(), filter), format)
    } else {
        let provider = ServerProvider::builder(ServerOptions::from_env()).build()?;
        render(&collect(provider.registry(), filter), format)
    }
}

fn render(pipelines: &[(&'static str, &[ErasedDescriptor])], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let listing: Vec<Value> = pipelines
                .iter()
                .map(|(context, descriptors)| {
                    json!({
                        "context": context,
                        "handlers": descriptors.iter().map(describe).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            for (context, descriptors) in pipelines {
                println!("{context}");
                for descriptor in descriptors.iter() {
                    let filters = descriptor.filter_names();
                    let filters = if filters.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", filters.join(", "))
                    };
                    println!(
                        "  {:>8}  {:<9}  {}{filters}",
                        descriptor.order(),
                        descriptor.activation(),
                        descriptor.handler_type().short_name(),
                    );
                }
            }
        }
    }
    Ok(())
}

fn collect<'a>(
    registry: &'a HandlerRegistry,
    filter: Option<&str>,
) -> Vec<(&'static str, &'a [ErasedDescriptor])> {
    registry
        .pipelines()
        .into_iter()
        .filter(|(name, _)| filter.is_none_or(|needle| name.contains(needle)))
        .collect()
}

fn describe(descriptor: &ErasedDescriptor) -> Value {
    json!({
        "handler": descriptor.handler_type().short_name(),
        "order": descriptor.order(),
        "activation": descriptor.activation(),
        "filters": descriptor.filter_names(),
    })
}

fn random_key() -> Result<Vec<u8>> {
    let keys = StaticKeyProvider::generate()?;
    Ok(keys.master_key()?.to_vec())
}

fn generate_key() -> Result<()> {
    println!("{}", STANDARD.encode(random_key()?));
    Ok(())
}

fn decode(token: &str, token_format: &str) -> Result<()> {
    let kind = TokenFormatKind::parse(token_format)
        .ok_or_else(|| anyhow!("unknown token format '{token_format}', expected sealed or jwt"))?;
    let options = ServerOptions::from_env();
    let Some(encoded) = options.signing_key.as_deref() else {
        bail!("OIDC_FORGE_SIGNING_KEY must be set to decode tokens");
    };
    let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::from_base64(encoded)?);
    let formats = TokenFormats::new(keys, options.issuer.clone());

    debug!(format = %kind, "decoding token");
    match read_token_with_candidates(formats.get(kind), token, &TokenType::CANDIDATES)? {
        Some((token_type, principal)) => {
            let output = json!({
                "token_type": token_type.as_str(),
                "claims": principal,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        None => bail!("the token could not be read as a {kind} token"),
    }
}
