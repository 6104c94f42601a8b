//! Secure Invoke CLI
//!
//! Sends HPKE-encrypted requests to a bidding gateway, singly or in batch.

mod commands;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use secure_invoke_core::SecureInvokeConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// Secure Invoke CLI: encrypted requests to a bidding gateway.
#[derive(Parser, Debug)]
#[command(name = "secure-invoke", version, about)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Output format.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Connection options. Each one overrides the value from `--config`.
#[derive(Args, Debug, Default)]
struct Settings {
    /// TOML configuration file.
    #[arg(long, env = "SECURE_INVOKE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// KMS host serving `/listpubkeys`.
    #[arg(long, env = "SECURE_INVOKE_KMS_HOST", global = true)]
    kms_host: Option<String>,

    /// Gateway (buyer front-end) host.
    #[arg(long, env = "SECURE_INVOKE_BUYER_HOST", global = true)]
    buyer_host: Option<String>,

    /// Target service name.
    #[arg(long, global = true)]
    target_service: Option<String>,

    /// Extra request headers as a JSON object.
    #[arg(long, global = true)]
    headers: Option<String>,

    /// Client certificate for mTLS.
    #[arg(long, global = true, requires = "client_key")]
    client_cert: Option<PathBuf>,

    /// Client private key for mTLS.
    #[arg(long, global = true, requires = "client_cert")]
    client_key: Option<PathBuf>,

    /// CA bundle for verifying the gateway.
    #[arg(long, global = true)]
    ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true)]
    insecure: bool,

    /// Attempts per batch entry, and transport retries per request.
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum concurrent requests in batch mode.
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Delay between attempts in milliseconds.
    #[arg(long, global = true)]
    retry_delay_ms: Option<u64>,

    /// Client IP sent as `x-bna-client-ip`.
    #[arg(long, global = true)]
    client_ip: Option<String>,

    /// User agent sent as `x-user-agent`.
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Accept-Language sent as `x-accept-language`.
    #[arg(long, global = true)]
    accept_language: Option<String>,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Settings {
    /// Load `--config` if given, then apply command-line overrides.
    fn to_config(&self) -> anyhow::Result<SecureInvokeConfig> {
        let mut config = match &self.config {
            Some(path) => SecureInvokeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SecureInvokeConfig::new("", ""),
        };

        if let Some(host) = &self.kms_host {
            config.kms_host.clone_from(host);
        }
        if let Some(host) = &self.buyer_host {
            config.buyer_host.clone_from(host);
        }
        if let Some(service) = &self.target_service {
            config = config.with_target_service(service);
        }
        if let Some(raw) = &self.headers {
            let headers: HashMap<String, String> =
                serde_json::from_str(raw).context("--headers must be a JSON object of strings")?;
            config.headers.extend(headers);
        }
        if let (Some(cert), Some(key)) = (&self.client_cert, &self.client_key) {
            config = config.with_client_identity(cert, key);
        }
        if let Some(ca) = &self.ca_cert {
            config = config.with_ca_cert(ca);
        }
        if self.insecure {
            config = config.with_insecure(true);
        }
        if let Some(retries) = self.retries {
            config = config.with_retries(retries);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_concurrent {
            config = config.with_max_concurrent_requests(max);
        }
        if let Some(ms) = self.retry_delay_ms {
            config = config.with_retry_delay(Duration::from_millis(ms));
        }
        if let Some(ip) = &self.client_ip {
            config.client_ip.clone_from(ip);
        }
        if let Some(ua) = &self.user_agent {
            config.client_user_agent.clone_from(ua);
        }
        if let Some(lang) = &self.accept_language {
            config.client_accept_language.clone_from(lang);
        }
        if self.verbose {
            config = config.with_verbose(true);
        }

        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request from a JSON file.
    Invoke(commands::invoke::InvokeArgs),
    /// Process a JSONL batch file.
    Batch(commands::batch::BatchArgs),
    /// Fetch the current public key from the KMS.
    TestKms,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.settings.to_config()?;

    let default_level = if config.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(
        kms = %config.kms_host,
        gateway = %config.buyer_host,
        retries = config.retries,
        max_concurrent = config.max_concurrent_requests,
        "configuration loaded"
    );

    match cli.command {
        Command::Invoke(args) => commands::invoke::run(config, &args, &cli.format).await,
        Command::Batch(args) => commands::batch::run(config, &args, &cli.format).await,
        Command::TestKms => commands::test_kms::run(config, &cli.format).await,
    }
}
