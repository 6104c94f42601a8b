use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use secure_invoke_client::{BatchProcessor, FAILURE_LOG, SUCCESS_LOG, SecureInvokeClient};
use secure_invoke_core::SecureInvokeConfig;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSONL file, one `{"id": .., "request": {..}}` per line.
    #[arg(long, short)]
    pub input: PathBuf,
    /// Directory for the result logs. Defaults to the input file's directory.
    #[arg(long, short)]
    pub output_dir: Option<PathBuf>,
}

pub async fn run(
    config: SecureInvokeConfig,
    args: &BatchArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let client = Arc::new(SecureInvokeClient::new(config)?);
    let processor = BatchProcessor::new(client);

    let result = processor
        .process_batch_file(&args.input, args.output_dir.as_deref())
        .await?;

    let log_dir = args.output_dir.clone().unwrap_or_else(|| {
        args.input
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default()
    });

    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "total": result.total,
                "successful": result.successful,
                "failed": result.failed,
                "success_rate": result.success_rate(),
                "success_log": log_dir.join(SUCCESS_LOG),
                "failure_log": log_dir.join(FAILURE_LOG),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("Total:        {}", result.total);
            println!("Successful:   {}", result.successful);
            println!("Failed:       {}", result.failed);
            println!("Success rate: {:.1}%", result.success_rate());
            println!("Logs:         {}", log_dir.join(SUCCESS_LOG).display());
            println!("              {}", log_dir.join(FAILURE_LOG).display());
        }
    }
    Ok(())
}
