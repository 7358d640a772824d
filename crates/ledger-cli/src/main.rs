use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for a ledger node")]
struct Cli {
    /// Node base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node's chain
    Chain,
    /// Mine an arbitrary JSON payload into a block
    Mine {
        /// Payload, parsed as JSON when possible
        data: String,
    },
    /// Pay from the node's wallet
    Transact {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: u64,
    },
    /// Print the pending transaction pool
    Pool,
    /// Print the node wallet's address and balance
    Wallet,
    /// Mine the pending pool plus a reward
    MineTransactions,
}

#[derive(Serialize)]
struct TransactBody {
    recipient: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();

    let request = match cli.cmd {
        Command::Chain => client.get(format!("{node}/api/blocks")),
        Command::Mine { data } => {
            let data = serde_json::from_str::<Value>(&data).unwrap_or(Value::String(data));
            client
                .post(format!("{node}/api/mine"))
                .json(&serde_json::json!({ "data": data }))
        }
        Command::Transact { recipient, amount } => client
            .post(format!("{node}/api/transact"))
            .json(&TransactBody { recipient, amount }),
        Command::Pool => client.get(format!("{node}/api/transaction-pool-map")),
        Command::Wallet => client.get(format!("{node}/api/wallet-info")),
        Command::MineTransactions => client.post(format!("{node}/api/mine-transactions")),
    };

    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;
    debug!("{status} from {node}");
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
