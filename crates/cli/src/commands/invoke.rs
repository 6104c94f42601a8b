use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use secure_invoke_client::SecureInvokeClient;
use secure_invoke_core::SecureInvokeConfig;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// JSON file holding the request object.
    #[arg(long, short)]
    pub input: PathBuf,
    /// Fetch a fresh key from the KMS before sending.
    #[arg(long)]
    pub refresh_key: bool,
}

pub async fn run(
    config: SecureInvokeConfig,
    args: &InvokeArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?;
    let request: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", args.input.display()))?;

    let client = SecureInvokeClient::new(config)?;
    let response = client.get_bids(request, args.refresh_key).await;
    client.close().await;
    let response = response?;

    match format {
        OutputFormat::Json => println!("{response}"),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&response)?),
    }
    Ok(())
}
