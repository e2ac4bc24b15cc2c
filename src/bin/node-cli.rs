use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "node-cli")]
#[command(about = "Inspect and control a running node", long_about = None)]
struct Cli {
    /// Info server base URL.
    #[arg(long, default_value = "http://127.0.0.1:26658")]
    info_url: String,

    /// Debug server base URL.
    #[arg(long, default_value = "http://127.0.0.1:6060")]
    debug_url: String,

    /// Query server base URL.
    #[arg(long, default_value = "http://127.0.0.1:10997")]
    query_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Node status
    Status,
    /// Chain summary
    Chain,
    /// Registered network listeners
    Network,
    /// Block at a height
    Block { height: u64 },
    /// Keys in the key store
    Keys,
    /// Runtime variables from the debug server
    Vars,
    /// Ask the node to shut down
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/status", cli.info_url)),
        Commands::Chain => client.get(format!("{}/chain", cli.info_url)),
        Commands::Network => client.get(format!("{}/network", cli.info_url)),
        Commands::Block { height } => client.get(format!("{}/blocks/{height}", cli.query_url)),
        Commands::Keys => client.get(format!("{}/keys", cli.query_url)),
        Commands::Vars => client.get(format!("{}/debug/vars", cli.debug_url)),
        Commands::Shutdown => client.post(format!("{}/debug/shutdown", cli.debug_url)),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: node returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
