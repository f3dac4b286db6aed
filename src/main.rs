use card_gateway::application::gateway::NetworkGateway;
use card_gateway::config::GatewayConfig;
use card_gateway::interfaces::csv::response_writer::ResponseWriter;
use card_gateway::interfaces::csv::transaction_reader::TransactionReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gateway configuration (TOML)
    #[arg(long)]
    config: PathBuf,

    /// Input transactions CSV file
    input: PathBuf,

    /// Close the batch after all transactions are sent and print the summary
    #[arg(long)]
    close_batch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::load(&cli.config).into_diagnostic()?;
    let gateway = NetworkGateway::connect(&config).into_diagnostic()?;
    info!(primary = %config.primary, "gateway ready");

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = TransactionReader::new(file);
    let stdout = io::stdout();
    let mut writer = ResponseWriter::new(stdout.lock());

    for request in reader.transactions() {
        match request {
            Ok(request) => match gateway.send(&request).await {
                Ok(response) => writer.write_response(&response).into_diagnostic()?,
                Err(e) => error!("Error processing transaction: {}", e),
            },
            Err(e) => error!("Error reading transaction: {}", e),
        }
    }
    writer.flush().into_diagnostic()?;

    if cli.close_batch {
        let summary = gateway.close_batch().await.into_diagnostic()?;
        writer.finish_with_summary(&summary).into_diagnostic()?;
    }

    Ok(())
}
