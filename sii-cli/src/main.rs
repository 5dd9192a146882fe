use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sii_core::api::SiiClient;
use sii_core::cert::CertificateStore;
use sii_core::config::{SiiConfig, TsaConfig};
use sii_core::invoice::Invoice;
use sii_core::signer::XmlSigner;
use sii_core::transform::transform_invoice;

#[derive(Parser)]
#[command(name = "sii")]
#[command(about = "AEAT SII invoice submission toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an invoice JSON file into its SII registration record.
    Transform {
        #[arg(long)]
        invoice: PathBuf,
    },
    /// Sign an XML document with an enveloped signature.
    Sign {
        #[arg(long)]
        xml: PathBuf,
        #[arg(long)]
        certificate: PathBuf,
        #[arg(long, env = "SII_CERTIFICATE_PASSWORD")]
        password: String,
        /// Write the signed document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Verify every signature in a signed XML document.
    Verify {
        #[arg(long)]
        xml: PathBuf,
    },
    /// Show the signing identity inside a PKCS#12 keystore.
    Identity {
        #[arg(long)]
        certificate: PathBuf,
        #[arg(long, env = "SII_CERTIFICATE_PASSWORD")]
        password: String,
    },
    /// Submit an invoice to AEAT. Connection settings come from SII_*
    /// environment variables.
    Submit {
        #[arg(long)]
        invoice: PathBuf,
        /// Timestamp authority URL; timestamping is skipped when absent.
        #[arg(long, env = "SII_TSA_URL")]
        tsa_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transform { invoice } => {
            let record = transform_invoice(&read_invoice(&invoice)?);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Sign {
            xml,
            certificate,
            password,
            output,
        } => {
            let identity = CertificateStore::new()
                .load_from_p12(&certificate, &password)
                .with_context(|| format!("could not load identity from {}", certificate.display()))?;
            let document = std::fs::read_to_string(&xml)
                .with_context(|| format!("could not read {}", xml.display()))?;
            let signed = XmlSigner::new().sign(
                &document,
                identity.private_key_pem(),
                identity.certificate_pem(),
            )?;
            match output {
                Some(path) => std::fs::write(&path, signed)
                    .with_context(|| format!("could not write {}", path.display()))?,
                None => println!("{signed}"),
            }
        }
        Commands::Verify { xml } => {
            let document = std::fs::read_to_string(&xml)
                .with_context(|| format!("could not read {}", xml.display()))?;
            let report = XmlSigner::new().verify(&document)?;
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            if report.valid {
                println!("signature valid");
            } else {
                for error in &report.errors {
                    eprintln!("error: {error}");
                }
                bail!("signature verification failed");
            }
        }
        Commands::Identity {
            certificate,
            password,
        } => {
            let store = CertificateStore::new();
            let identity = store
                .load_from_p12(&certificate, &password)
                .with_context(|| format!("could not load identity from {}", certificate.display()))?;
            println!("{}", store.identity_summary(&identity));
        }
        Commands::Submit { invoice, tsa_url } => {
            let config = SiiConfig::from_env()?;
            let mut client = SiiClient::new(config)?;
            if let Some(url) = tsa_url {
                client = client.with_timestamping(TsaConfig::new(url));
            }
            let result = client.submit_invoice(&read_invoice(&invoice)?).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!("submission failed");
            }
        }
    }

    Ok(())
}

fn read_invoice(path: &PathBuf) -> Result<Invoice> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid invoice JSON in {}", path.display()))
}
