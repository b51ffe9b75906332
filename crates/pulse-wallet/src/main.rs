use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use num_bigint::BigUint;
use pulse_crypto::Keypair;
use pulse_ledger::{sender_address, Ledger, Store};
use pulse_types::Transaction;
use serde_json::json;

/// Pulse wallet: key management, signing, and ledger queries.
///
/// Query commands open the node's data directory directly; `send` produces a
/// signed, submission-ready transaction on stdout for any transport to carry
/// to a node.
#[derive(Parser)]
#[command(name = "pulse-wallet", version, about = "Pulse blockchain wallet CLI")]
struct Cli {
    /// Data directory of the node to query.
    #[arg(short, long, default_value = "./pulse-data", env = "PULSE_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new keypair and print its address.
    GenerateWallet,

    /// Re-derive a wallet from a hex secret key.
    ImportWallet { secret: String },

    /// Print an account's balance.
    GetBalance { address: String },

    /// Print an account's next expected nonce.
    GetNonce { address: String },

    /// Sign a transfer and print the submission-ready transaction JSON.
    Send {
        secret: String,
        to: String,
        amount: String,
        fee: Option<String>,

        /// Override the nonce instead of reading it from the ledger.
        #[arg(long)]
        nonce: Option<u64>,
    },

    /// Look a transaction up in committed blocks by hash.
    GetTransaction { hash: String },

    /// Print one block by number.
    GetBlock { number: u64 },

    /// Print the chain tip.
    GetLatestBlock,

    /// Print chain statistics.
    GetStats,
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::GenerateWallet => {
            print_wallet(&Keypair::generate());
            Ok(())
        }

        Commands::ImportWallet { secret } => {
            let keypair = Keypair::from_secret_hex(&secret).context("invalid secret key")?;
            print_wallet(&keypair);
            Ok(())
        }

        Commands::GetBalance { address } => {
            let ledger = open_ledger(&cli.data_dir)?;
            println!("{}", ledger.balance(&address));
            Ok(())
        }

        Commands::GetNonce { address } => {
            let ledger = open_ledger(&cli.data_dir)?;
            println!("{}", ledger.nonce_of(&address));
            Ok(())
        }

        Commands::Send {
            secret,
            to,
            amount,
            fee,
            nonce,
        } => {
            let keypair = Keypair::from_secret_hex(&secret).context("invalid secret key")?;
            let amount: BigUint = amount.parse().context("amount must be a decimal integer")?;
            let fee: BigUint = fee
                .as_deref()
                .unwrap_or("0")
                .parse()
                .context("fee must be a decimal integer")?;

            let mut tx = Transaction::new(keypair.public_hex(), to, amount, fee, 0);
            tx.nonce = match nonce {
                Some(nonce) => nonce,
                None => {
                    let ledger = open_ledger(&cli.data_dir)?;
                    let sender = sender_address(&tx)
                        .ok_or_else(|| anyhow!("cannot derive sender address"))?;
                    ledger.nonce_of(&sender)
                }
            };
            tx.sign(&keypair)?;

            println!("{}", tx.to_json()?);
            Ok(())
        }

        Commands::GetTransaction { hash } => {
            let ledger = open_ledger(&cli.data_dir)?;
            let found = ledger
                .blocks()
                .iter()
                .flat_map(|block| block.transactions.iter())
                .find(|tx| tx.hash == hash);
            match found {
                Some(tx) => println!("{}", tx.to_json()?),
                None => println!("null"),
            }
            Ok(())
        }

        Commands::GetBlock { number } => {
            let ledger = open_ledger(&cli.data_dir)?;
            match ledger.block(number) {
                Some(block) => println!("{}", block.to_json()?),
                None => println!("null"),
            }
            Ok(())
        }

        Commands::GetLatestBlock => {
            let ledger = open_ledger(&cli.data_dir)?;
            println!("{}", ledger.tip().to_json()?);
            Ok(())
        }

        Commands::GetStats => {
            let ledger = open_ledger(&cli.data_dir)?;
            let transactions: usize = ledger
                .blocks()
                .iter()
                .map(|block| block.transactions.len())
                .sum();
            let stats = json!({
                "blockHeight": ledger.height(),
                "chainLength": ledger.chain_len(),
                "totalTransactions": transactions,
                "chainValid": ledger.is_chain_valid(),
            });
            println!("{stats}");
            Ok(())
        }
    }
}

fn open_ledger(data_dir: &PathBuf) -> Result<Ledger> {
    let store = Store::open(data_dir)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?;
    Ok(Ledger::open(store)?)
}

fn print_wallet(keypair: &Keypair) {
    let wallet = json!({
        "address": keypair.address(),
        "publicKey": keypair.public_hex(),
        "secretKey": keypair.secret_hex(),
    });
    println!("{wallet}");
}
