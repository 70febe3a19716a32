use certsync_core::{CERTIFICATES_PATH, encode_certificates};
use certsync_server::config::{DEFAULT_CERT_DIR, SyncConfig};
use certsync_server::store::{CertificateSynchronizer, InMemorySecretLister};
use certsync_server::tls::{
    AiaChainResolver, CertificateBuilder, CertificateRecord, DiskPersister, default_certificate,
    install_crypto_provider, verify_against_root,
};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// certsync - TLS certificate lifecycle for a reverse proxy
#[derive(Parser)]
#[command(name = "certsync")]
#[command(version)]
#[command(about = "certsync - TLS certificate lifecycle for a reverse proxy")]
pub struct Cli {
    /// Directory certificate files are written to
    #[arg(long, global = true, env = "CERTSYNC_CERT_DIR", default_value = DEFAULT_CERT_DIR)]
    pub cert_dir: PathBuf,

    /// Keep keypair certificates in memory instead of writing them to disk
    #[arg(
        long,
        global = true,
        env = "CERTSYNC_DYNAMIC_CERTIFICATES",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub dynamic_certificates: bool,

    /// Fetch missing intermediate certificates
    #[arg(long, global = true, env = "CERTSYNC_CHAIN_COMPLETION")]
    pub chain_completion: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a certificate (and key) and print its details
    Inspect {
        /// PEM certificate
        #[arg(long)]
        cert: PathBuf,
        /// PEM private key; without it the certificate is treated as a CA
        #[arg(long)]
        key: Option<PathBuf>,
        /// CA the certificate must chain up to
        #[arg(long)]
        ca: Option<PathBuf>,
    },
    /// Sync every secret manifest (*.json) in a directory
    Sync {
        #[arg(long)]
        secrets: PathBuf,
    },
    /// Install a DH parameters file
    Dhparam {
        #[arg(long, default_value = "dh-param")]
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Generate and store the default self-signed certificate
    DefaultCert,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            cert_dir: self.cert_dir.clone(),
            enable_dynamic_certificates: self.dynamic_certificates,
            enable_chain_completion: self.chain_completion,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    install_crypto_provider();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.sync_config();

    match cli.command {
        Commands::Inspect { cert, key, ca } => {
            inspect(&config, &cert, key.as_deref(), ca.as_deref()).await
        }
        Commands::Sync { secrets } => sync_dir(config, &secrets).await,
        Commands::Dhparam { name, file } => {
            let raw = std::fs::read(&file)?;
            let persister = DiskPersister::new(&config.cert_dir);
            persister.init()?;
            let path = persister.add_or_update_auxiliary_parameter(&name, &raw)?;
            println!("Installed {}", path.display());
            Ok(())
        }
        Commands::DefaultCert => {
            let persister = DiskPersister::new(&config.cert_dir);
            persister.init()?;
            let record = default_certificate(&persister)?;
            print_record("default", &record);
            Ok(())
        }
    }
}

async fn inspect(
    config: &SyncConfig,
    cert_path: &Path,
    key_path: Option<&Path>,
    ca_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cert = std::fs::read(cert_path)?;

    let builder = if config.enable_chain_completion {
        CertificateBuilder::with_chain_resolver(Arc::new(AiaChainResolver::http()?))
    } else {
        CertificateBuilder::new()
    };

    let record = match key_path {
        Some(key_path) => {
            let key = std::fs::read(key_path)?;
            builder.build_keypair_certificate(&cert, &key).await?
        }
        None => builder.build_ca_only_certificate(&cert)?,
    };

    if let Some(ca_path) = ca_path {
        let ca = std::fs::read(ca_path)?;
        verify_against_root(record.certificate.x509(), &ca)?;
        println!("Chain:    verified against {}", ca_path.display());
    }

    print_record(&cert_path.display().to_string(), &record);
    Ok(())
}

async fn sync_dir(config: SyncConfig, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let secrets = Arc::new(InMemorySecretLister::new());
    let loaded = secrets.load_dir(dir)?;
    tracing::info!(count = loaded, dir = %dir.display(), "Loaded secret manifests");

    // at most one notification per secret
    let (tx, mut rx) = mpsc::channel(loaded.max(1));
    let synchronizer = CertificateSynchronizer::new(config, secrets.clone(), tx)?;

    let mut failed = 0;
    for key in secrets.keys() {
        if let Err(e) = synchronizer.handle_secret_change(&key).await
            && !e.is_auth_only()
        {
            failed += 1;
        }
    }

    let mut changes = 0;
    while rx.try_recv().is_ok() {
        changes += 1;
    }

    for key in synchronizer.cache().keys() {
        let record = synchronizer.lookup(&key)?;
        print_record(&key.to_string(), &record);
    }

    let payload = encode_certificates(&synchronizer.host_certificates())?;
    println!(
        "{} secrets, {} changes, {} failed, {} payload {} bytes",
        loaded,
        changes,
        failed,
        CERTIFICATES_PATH,
        payload.len()
    );
    Ok(())
}

fn print_record(label: &str, record: &CertificateRecord) {
    let status = if record.is_expired() {
        "EXPIRED"
    } else if record.days_until_expiry() < 30 {
        "EXPIRING SOON"
    } else {
        "OK"
    };

    println!("{}", label);
    println!("  Subject:  {}", record.certificate.subject());
    if record.is_ca_only() {
        println!("  Type:     CA only");
    } else {
        println!("  Names:    {}", record.common_names.join(", "));
    }
    println!(
        "  Expires:  {} ({} days)",
        OffsetDateTime::from(record.expire_time),
        record.days_until_expiry()
    );
    println!("  Status:   {}", status);
    if let Some(path) = &record.stored_file_path {
        println!("  File:     {}", path.display());
    }
    if let Some(checksum) = &record.checksum {
        println!("  Checksum: {}", checksum);
    }
}
