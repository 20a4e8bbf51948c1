use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use khqr_settle::application::gateway::{GatewaySettings, PaymentGateway, PaymentRequest};
use khqr_settle::config::Config;
use khqr_settle::domain::amount::{Amount, Currency};
use khqr_settle::domain::fingerprint::Fingerprint;
use khqr_settle::domain::payload::{
    AccountInfo, AdditionalData, EncodedPayload, IndividualAccount, QrPayload,
};
use khqr_settle::domain::ports::{SettlementOutcome, SharedSettlementClient, SharedTransactionStore};
use khqr_settle::domain::tlv;
use khqr_settle::infrastructure::bakong::BakongClient;
use khqr_settle::infrastructure::in_memory::InMemoryTransactionStore;
#[cfg(feature = "storage-rocksdb")]
use khqr_settle::infrastructure::rocksdb::RocksDBStore;
use khqr_settle::interfaces::csv::payload_writer::PayloadWriter;
use khqr_settle::interfaces::csv::request_reader::PaymentRequestReader;
use miette::{IntoDiagnostic, Result};
use serde_json::json;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a payment code and print it with its fingerprint
    Generate(GenerateArgs),
    /// Check the trailing checksum of a payment code
    Verify { payload: String },
    /// Print the top-level fields of a payment code
    Decode { payload: String },
    /// Encode a code for every row of a CSV file
    Batch { input: PathBuf },
    /// Ask the settlement authority once about a fingerprint
    Check { fingerprint: String },
    /// Create a payment for the configured account and poll until it resolves
    Track(TrackArgs),
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    account_id: String,
    #[arg(long)]
    merchant_name: String,
    #[arg(long)]
    merchant_city: Option<String>,
    /// Omit for a static code
    #[arg(long)]
    amount: Option<Amount>,
    #[arg(long, default_value = "KHR")]
    currency: Currency,
    /// Makes this a merchant code; requires --acquiring-bank
    #[arg(long)]
    merchant_id: Option<String>,
    #[arg(long)]
    acquiring_bank: Option<String>,
    #[arg(long)]
    account_information: Option<String>,
    #[arg(long)]
    bill_number: Option<String>,
    #[arg(long)]
    mobile_number: Option<String>,
    #[arg(long)]
    store_label: Option<String>,
    #[arg(long)]
    terminal_label: Option<String>,
    #[arg(long)]
    purpose: Option<String>,
    /// Defaults to the current time
    #[arg(long)]
    timestamp_ms: Option<i64>,
}

impl GenerateArgs {
    fn into_payload(self, default_city: &str) -> QrPayload {
        let account = match self.merchant_id {
            Some(merchant_id) => AccountInfo::merchant(
                self.account_id,
                merchant_id,
                self.acquiring_bank.unwrap_or_default(),
            ),
            None => AccountInfo::Individual(IndividualAccount {
                account_id: self.account_id,
                account_information: self.account_information,
                acquiring_bank: self.acquiring_bank,
            }),
        };
        let city = self.merchant_city.unwrap_or_else(|| default_city.to_string());
        let timestamp_ms = self
            .timestamp_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        let payload = QrPayload::new(account, self.merchant_name, city, self.currency, timestamp_ms)
            .with_additional_data(AdditionalData {
                bill_number: self.bill_number,
                mobile_number: self.mobile_number,
                store_label: self.store_label,
                terminal_label: self.terminal_label,
                purpose: self.purpose,
            });
        match self.amount {
            Some(amount) => payload.with_amount(amount),
            None => payload,
        }
    }
}

#[derive(Args)]
struct TrackArgs {
    #[arg(long)]
    amount: Amount,
    #[arg(long, default_value = "KHR")]
    currency: Currency,
    #[arg(long, default_value = "")]
    description: String,
    /// Overrides BAKONG_ACCOUNT_ID
    #[arg(long)]
    account_id: Option<String>,
    /// Overrides MERCHANT_NAME
    #[arg(long)]
    merchant_name: Option<String>,
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => {
            let config = load_config()?;
            let payload = args.into_payload(&config.merchant_city);
            let encoded = EncodedPayload::encode(&payload)
                .into_diagnostic()?;
            print_json(&json!({
                "qr": encoded.as_str(),
                "fingerprint": encoded.fingerprint(),
                "checksum": encoded.checksum(),
            }))?;
        }
        Command::Verify { payload } => {
            let valid = tlv::verify(payload.trim());
            print_json(&json!({ "valid": valid }))?;
            if !valid {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Decode { payload } => {
            let fields = tlv::decode(payload.trim()).into_diagnostic()?;
            print_json(&fields)?;
        }
        Command::Batch { input } => {
            let config = load_config()?;
            let file = File::open(input).into_diagnostic()?;
            let reader = PaymentRequestReader::new(file);
            let stdout = io::stdout();
            let mut writer = PayloadWriter::new(stdout.lock());
            let mut failed = 0usize;

            for (line, row) in reader.rows().enumerate() {
                let timestamp_ms = Utc::now().timestamp_millis();
                let encoded = row.and_then(|row| {
                    let payload = row.to_payload(&config.merchant_city, timestamp_ms)?;
                    let encoded = EncodedPayload::encode(&payload)?;
                    Ok((row.account_id, encoded))
                });
                match encoded {
                    Ok((account_id, encoded)) => {
                        writer.write_payload(&account_id, &encoded).into_diagnostic()?
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(row = line + 1, error = %e, "Skipping row");
                    }
                }
            }
            writer.flush().into_diagnostic()?;
            if failed > 0 {
                tracing::warn!(failed, "Some rows were not encoded");
            }
        }
        Command::Check { fingerprint } => {
            let fingerprint = Fingerprint::parse(&fingerprint).into_diagnostic()?;
            let config = load_config()?;
            let gateway = gateway(&config, None)?;
            let outcome = gateway
                .check_settlement(&fingerprint)
                .await
                .into_diagnostic()?;
            let report = match outcome {
                SettlementOutcome::Settled(data) => json!({ "status": "SETTLED", "data": data }),
                SettlementOutcome::Failed => json!({ "status": "FAILED" }),
                SettlementOutcome::NotFound => json!({ "status": "NOT_FOUND" }),
            };
            print_json(&report)?;
        }
        Command::Track(args) => {
            let config = load_config()?;
            let gateway = gateway(&config, args.db_path)?;
            let account_id = args
                .account_id
                .or_else(|| config.account_id.clone())
                .ok_or_else(|| miette::miette!("No account id: pass --account-id or set BAKONG_ACCOUNT_ID"))?;
            let merchant_name = args
                .merchant_name
                .or_else(|| config.merchant_name.clone())
                .ok_or_else(|| miette::miette!("No merchant name: pass --merchant-name or set MERCHANT_NAME"))?;

            let request = PaymentRequest::new(
                AccountInfo::individual(account_id),
                merchant_name,
                args.amount,
                args.currency,
            )
            .with_description(args.description);
            let tx = gateway.create_payment(request).await.into_diagnostic()?;
            print_json(&json!({
                "transaction_id": tx.id,
                "fingerprint": tx.fingerprint,
                "qr": tx.encoded_payload,
                "expires_at": tx.expires_at,
            }))?;

            gateway.begin_tracking(&tx);
            let check_every = gateway.settings().poll_interval;
            let outcome = tokio::select! {
                result = gateway.wait_for_resolution(tx.id, check_every) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            gateway.shutdown().await;

            let tx = match outcome {
                Some(result) => result.into_diagnostic()?,
                None => {
                    tracing::warn!(transaction_id = %tx.id, "Interrupted, payment left pending");
                    gateway.status(tx.id).await.into_diagnostic()?
                }
            };
            print_json(&tx)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config() -> Result<Config> {
    Config::from_env().into_diagnostic()
}

fn gateway(config: &Config, db_path: Option<PathBuf>) -> Result<PaymentGateway> {
    let store = open_store(db_path)?;
    let client = BakongClient::new(
        config.api_url.clone(),
        config.require_token().into_diagnostic()?,
        config.request_timeout,
    )
    .into_diagnostic()?;
    let settlement: SharedSettlementClient = Arc::new(client);
    let settings: GatewaySettings = config.gateway_settings();
    Ok(PaymentGateway::new(store, settlement, settings))
}

fn open_store(db_path: Option<PathBuf>) -> Result<SharedTransactionStore> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryTransactionStore::new()))
        }
        None => Ok(Arc::new(InMemoryTransactionStore::new())),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
