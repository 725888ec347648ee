//! ecup: client-side encryption for content-addressed uploads
//!
//! Commands:
//!   encrypt <input> --out <file>          - encrypt a file and wrap its key via the KMS
//!   decrypt <ciphertext> --metadata <car|cid> --out <file>
//!                                         - recover the key and decrypt
//!   fetch <cid>                           - fetch, verify, and print a metadata record
//!   keygen --out <file>                   - create an Ed25519 issuer key
//!   config show                           - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::{StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use zeroize::Zeroizing;

use ecup_block::{CidHasher, EncryptedMetadata, RAW};
use ecup_core::config::{expand_tilde, EcupConfig, IdentityConfig};
use ecup_crypto::{cipher_for, ByteStream, CryptoError};
use ecup_gateway::GatewayClient;
use ecup_kms::{CryptoAdapter, DecryptionConfig, Delegation, EncryptionConfig, Issuer, KmsKeyWrap};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ecup",
    version,
    about = "Encrypt files before upload and recover their keys later",
    long_about = "ecup: stream files through AES-256, wrap keys with a remote key-custody \
                  service, and verify metadata fetched from content gateways"
)]
struct Cli {
    /// Path to ecup.toml configuration file
    #[arg(long, short = 'c', env = "ECUP_CONFIG", default_value = "~/.config/ecup/ecup.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging].level
    #[arg(long, env = "ECUP_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging].format
    #[arg(long, env = "ECUP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file and write its ciphertext and metadata archive
    Encrypt {
        /// Plaintext input file
        input: PathBuf,
        /// Ciphertext output file
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Metadata CAR output (default: <out>.metadata.car)
        #[arg(long, short = 'm')]
        metadata: Option<PathBuf>,
    },

    /// Decrypt a file using its metadata record
    Decrypt {
        /// Ciphertext input file
        ciphertext: PathBuf,
        /// Metadata CAR file, or the CID of one to fetch from the gateway
        #[arg(long, short = 'm')]
        metadata: String,
        /// Plaintext output file
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Storage space to decrypt for (default: [identity].space_did)
        #[arg(long)]
        space: Option<String>,
    },

    /// Fetch a metadata record by CID, verify it, and print it as JSON
    Fetch {
        cid: String,
    },

    /// Generate an Ed25519 issuer key (hex secret, mode 0600)
    Keygen {
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = EcupConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None if config.logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, format);

    match cli.command {
        Commands::Encrypt { input, out, metadata } => {
            let metadata = metadata.unwrap_or_else(|| default_metadata_path(&out));
            cmd_encrypt(&config, &input, &out, &metadata).await
        }
        Commands::Decrypt { ciphertext, metadata, out, space } => {
            cmd_decrypt(&config, &ciphertext, &metadata, &out, space).await
        }
        Commands::Fetch { cid } => cmd_fetch(&config, &cid).await,
        Commands::Keygen { out, force } => cmd_keygen(&expand_tilde(&out), force),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Identity and adapter ──────────────────────────────────────────────────────

/// Issuer from `[identity]`, or `None` when it is not configured.
fn load_issuer(identity: &IdentityConfig) -> Result<Option<Issuer>> {
    let (Some(did), Some(key_file)) = (&identity.issuer_did, &identity.signing_key_file) else {
        return Ok(None);
    };
    let path = expand_tilde(key_file);
    let text = Zeroizing::new(
        std::fs::read_to_string(&path)
            .with_context(|| format!("reading signing key: {}", path.display()))?,
    );
    let secret = Zeroizing::new(
        hex::decode(text.trim())
            .with_context(|| format!("signing key is not hex: {}", path.display()))?,
    );
    let issuer = Issuer::from_secret_bytes(did.as_str(), &secret)
        .with_context(|| format!("loading signing key: {}", path.display()))?;
    Ok(Some(issuer))
}

/// Delegations from the proof file, one per line; blank lines and `#` comments are skipped.
fn load_proofs(identity: &IdentityConfig) -> Result<Vec<Delegation>> {
    let Some(proof_file) = &identity.proof_file else {
        return Ok(Vec::new());
    };
    let path = expand_tilde(proof_file);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("reading proofs: {}", path.display()))?;
    Ok(parse_proofs(&content))
}

fn parse_proofs(content: &str) -> Vec<Delegation> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Delegation::new)
        .collect()
}

fn build_adapter(config: &EcupConfig) -> Result<CryptoAdapter> {
    let key_wrap = KmsKeyWrap::from_config(&config.kms).context("configuring KMS key wrap")?;
    Ok(CryptoAdapter::new(
        cipher_for(config.crypto.cipher),
        Arc::new(key_wrap),
    ))
}

// ── File streaming ────────────────────────────────────────────────────────────

async fn file_stream(path: &Path, chunk_size: usize) -> Result<ByteStream> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(ReaderStream::with_capacity(file, chunk_size)
        .map_err(CryptoError::from)
        .boxed())
}

/// Drain `stream` into `out`, feeding every chunk to `hasher` when given.
async fn write_stream(
    mut stream: ByteStream,
    out: &Path,
    mut hasher: Option<&mut CidHasher>,
    pb: &ProgressBar,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(out)
        .await
        .with_context(|| format!("creating {}", out.display()))?;
    let mut written = 0u64;

    while let Some(chunk) = stream.try_next().await? {
        if let Some(h) = hasher.as_deref_mut() {
            h.update(&chunk);
        }
        file.write_all(&chunk)
            .await
            .with_context(|| format!("writing {}", out.display()))?;
        written += chunk.len() as u64;
        pb.set_message(fmt_bytes(written));
    }
    file.flush().await?;
    Ok(written)
}

/// Like [`write_stream`], but into a `.part` sibling that is renamed onto
/// `out` only after the whole stream succeeded.
async fn persist_stream(
    stream: ByteStream,
    out: &Path,
    hasher: Option<&mut CidHasher>,
    pb: &ProgressBar,
) -> Result<u64> {
    let partial = partial_path(out);
    let written = match write_stream(stream, &partial, hasher, pb).await {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    tokio::fs::rename(&partial, out)
        .await
        .with_context(|| format!("moving {} into place", out.display()))?;
    Ok(written)
}

async fn hash_file(path: &Path, chunk_size: usize) -> Result<ecup_block::Cid> {
    let mut stream = file_stream(path, chunk_size).await?;
    let mut hasher = CidHasher::new(RAW);
    while let Some(chunk) = stream.try_next().await? {
        hasher.update(&chunk);
    }
    Ok(hasher.finalize()?)
}

fn default_metadata_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".metadata.car");
    PathBuf::from(name)
}

fn partial_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ── `ecup encrypt` ────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &EcupConfig,
    input: &Path,
    out: &Path,
    metadata_out: &Path,
) -> Result<()> {
    let adapter = build_adapter(config)?;
    let wrap_config = EncryptionConfig {
        space: config.identity.space_did.clone(),
        issuer: load_issuer(&config.identity)?,
        proofs: load_proofs(&config.identity)?,
    };

    let plaintext = file_stream(input, config.crypto.chunk_size).await?;
    let encrypted = adapter.encrypt_stream(plaintext);

    // Wrap before streaming so a refused setup costs nothing
    let pb = make_spinner("wrap");
    pb.set_message(format!("requesting key setup from {}", config.kms.url));
    let wrapped = adapter
        .encrypt_symmetric_key(&encrypted.key_material, &wrap_config)
        .await
        .context("wrapping content key")?;
    pb.finish_with_message("key wrapped");

    let pb = make_spinner("encrypt");
    let mut hasher = CidHasher::new(RAW);
    let written = persist_stream(encrypted.ciphertext, out, Some(&mut hasher), &pb)
        .await
        .with_context(|| format!("encrypting {}", input.display()))?;
    let data_cid = hasher.finalize()?;
    pb.finish_with_message(format!("{} written", fmt_bytes(written)));

    let archived = wrapped
        .into_metadata(data_cid)
        .context("building metadata record")?
        .archive()
        .context("archiving metadata record")?;
    tokio::fs::write(metadata_out, &archived.bytes)
        .await
        .with_context(|| format!("writing {}", metadata_out.display()))?;

    tracing::info!(%data_cid, metadata = %archived.cid, "encrypted {}", input.display());
    println!("Encrypted {} ({})", input.display(), adapter.algorithm());
    println!("  ciphertext: {} ({})", out.display(), fmt_bytes(written));
    println!("  data CID:   {data_cid}");
    println!("  metadata:   {} ({})", metadata_out.display(), archived.cid);
    Ok(())
}

// ── `ecup decrypt` ────────────────────────────────────────────────────────────

/// A local CAR file when `arg` names one, otherwise a CID to fetch.
async fn load_metadata(config: &EcupConfig, arg: &str) -> Result<EncryptedMetadata> {
    let path = expand_tilde(Path::new(arg));
    if path.is_file() {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        return EncryptedMetadata::extract(&bytes)
            .with_context(|| format!("decoding metadata archive {}", path.display()));
    }

    let gateway = GatewayClient::new(&config.gateway).context("configuring gateway")?;
    let pb = make_spinner("fetch");
    pb.set_message(format!("{arg} from {}", config.gateway.url));
    let metadata = gateway
        .fetch_metadata(arg)
        .await
        .with_context(|| format!("fetching metadata {arg}"))?;
    pb.finish_with_message("verified");
    Ok(metadata)
}

async fn cmd_decrypt(
    config: &EcupConfig,
    ciphertext: &Path,
    metadata_arg: &str,
    out: &Path,
    space: Option<String>,
) -> Result<()> {
    let adapter = build_adapter(config)?;
    let metadata = load_metadata(config, metadata_arg).await?;

    let actual = hash_file(ciphertext, config.crypto.chunk_size).await?;
    if &actual != metadata.encrypted_data_cid() {
        anyhow::bail!(
            "{} does not match the metadata record: expected {}, found {}",
            ciphertext.display(),
            metadata.encrypted_data_cid(),
            actual
        );
    }

    let space = space.or_else(|| config.identity.space_did.clone()).or_else(|| match &metadata {
        EncryptedMetadata::Kms(record) => Some(record.space.clone()),
        EncryptedMetadata::ThresholdNetwork(_) => None,
    });
    let unwrap_config = DecryptionConfig {
        space,
        issuer: load_issuer(&config.identity)?,
        proofs: load_proofs(&config.identity)?,
        metadata,
    };

    let pb = make_spinner("unwrap");
    pb.set_message(format!("requesting key from {}", config.kms.url));
    let input = file_stream(ciphertext, config.crypto.chunk_size).await?;
    let plaintext = adapter
        .decrypt_with_metadata(input, &unwrap_config)
        .await
        .context("recovering content key")?;
    pb.finish_with_message("key recovered");

    let pb = make_spinner("decrypt");
    let written = persist_stream(plaintext, out, None, &pb)
        .await
        .with_context(|| format!("decrypting {}", ciphertext.display()))?;
    pb.finish_with_message(format!("{} written", fmt_bytes(written)));

    println!("Decrypted {} → {}", ciphertext.display(), out.display());
    Ok(())
}

// ── `ecup fetch` ──────────────────────────────────────────────────────────────

async fn cmd_fetch(config: &EcupConfig, cid: &str) -> Result<()> {
    let gateway = GatewayClient::new(&config.gateway).context("configuring gateway")?;
    let metadata = gateway
        .fetch_metadata(cid)
        .await
        .with_context(|| format!("fetching metadata {cid}"))?;
    println!("{}", serde_json::to_string_pretty(&metadata.to_json())?);
    Ok(())
}

// ── `ecup keygen` ─────────────────────────────────────────────────────────────

fn cmd_keygen(out: &Path, force: bool) -> Result<()> {
    use std::io::Write;

    let signing_key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let secret = Zeroizing::new(hex::encode(signing_key.to_bytes()));

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(out).with_context(|| {
        format!("creating key file {} (use --force to replace)", out.display())
    })?;
    file.write_all(secret.as_bytes())?;
    file.write_all(b"\n")?;

    println!("Wrote issuer key to {}", out.display());
    println!(
        "  public key: {}",
        hex::encode(signing_key.verifying_key().as_bytes())
    );
    println!("Set [identity].signing_key_file and issuer_did to use it.");
    Ok(())
}

// ── `ecup config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &EcupConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    print!("{}", toml::to_string_pretty(config).context("serializing config")?);
    Ok(())
}
