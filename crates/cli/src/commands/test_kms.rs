use anyhow::bail;
use secure_invoke_client::{HttpKeySource, KeySource};
use secure_invoke_core::SecureInvokeConfig;

use crate::OutputFormat;

/// Characters of the base64 key shown in text output.
const KEY_PREVIEW_LEN: usize = 16;

/// Key source for the configured KMS. Only `kms_host` is required.
pub fn key_source(config: &SecureInvokeConfig) -> anyhow::Result<HttpKeySource> {
    if config.kms_host.trim().is_empty() {
        bail!("--kms-host is required");
    }
    Ok(HttpKeySource::new(
        &config.kms_host,
        config.insecure,
        config.timeout(),
    )?)
}

pub async fn run(config: SecureInvokeConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let source = key_source(&config)?;
    tracing::debug!(url = %source.url(), "fetching public key");
    let key = source.fetch_key().await?;

    let encoded = key.to_base64();
    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({"id": key.id(), "key": encoded});
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            let preview: String = encoded.chars().take(KEY_PREVIEW_LEN).collect();
            println!("Key ID: {}", key.id());
            println!("Key:    {preview}...");
        }
    }
    Ok(())
}
