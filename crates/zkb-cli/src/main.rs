//! zkb: zerok-billing command-line interface
//!
//! Offline commands:
//!   hash <doc.json>            - canonical SHA-256 digest of a quote / invoice
//!   hash-file <path>           - SHA-256 digest of raw file bytes
//!   archive create|open        - password-protected export archives
//!   config show                - display the effective configuration
//!
//! Proof server commands (client section of the config):
//!   proofs send|verify|list|delete|cleanup

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde_json::Value;
use std::path::{Path, PathBuf};

use zkb_core::config::ZkbConfig;
use zkb_crypto::{
    canonicalize, create_archive, hash_document, hash_reader, open_archive, Archive,
    ArchiveBundle, DocumentKind, KdfParams,
};
use zkb_sync::ProofClient;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkb",
    version,
    about = "zerok-billing client",
    long_about = "zkb: hash billing documents, manage export archives, and sync integrity proofs"
)]
struct Cli {
    /// Path to the zkb configuration file
    #[arg(long, short = 'c', env = "ZKB_CONFIG", default_value = "~/.config/zkb/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ZKB_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the canonical digest of a quote or invoice JSON document
    Hash {
        /// JSON file holding one document
        document: PathBuf,
        /// Document kind: devis / quote or facture / invoice
        #[arg(long, short = 'k', default_value = "facture")]
        kind: DocumentKind,
        /// Also print the canonical form that was hashed
        #[arg(long)]
        canonical: bool,
    },

    /// Print the SHA-256 digest of a file's raw bytes
    #[command(name = "hash-file")]
    HashFile { path: PathBuf },

    /// Export archive management
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },

    /// Proof server operations
    Proofs {
        #[command(subcommand)]
        action: ProofsAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ArchiveAction {
    /// Encrypt a bundle JSON (clients, devis, factures, layoutProfiles, societe)
    Create {
        bundle: PathBuf,
        /// Archive destination
        #[arg(long, short = 'o')]
        out: PathBuf,
        /// Archive password (prompted when unset)
        #[arg(long, env = "ZKB_ARCHIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt an archive and write or summarise its bundle
    Open {
        archive: PathBuf,
        /// Write the decrypted bundle here instead of printing a summary
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        #[arg(long, env = "ZKB_ARCHIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ProofsAction {
    /// Hash documents and upsert their proofs
    Send {
        /// JSON files, each holding one document or an array of documents
        #[arg(required = true)]
        documents: Vec<PathBuf>,
        #[arg(long, short = 'k', default_value = "facture")]
        kind: DocumentKind,
    },

    /// Re-hash documents and compare with the stored proofs
    Verify {
        #[arg(required = true)]
        documents: Vec<PathBuf>,
        #[arg(long, short = 'k', default_value = "facture")]
        kind: DocumentKind,
    },

    /// List stored proofs, most recent first
    List {
        /// List vault file proofs instead of document proofs
        #[arg(long)]
        files: bool,
    },

    /// Delete one proof
    Delete {
        id: String,
        #[arg(long)]
        files: bool,
    },

    /// Delete every proof whose id is not listed
    Cleanup {
        /// Ids to keep
        #[arg(long = "keep")]
        keep: Vec<String>,
        #[arg(long)]
        files: bool,
        /// Required when no id is kept, since that removes everything
        #[arg(long)]
        all: bool,
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
    init_logging(&cli.log);

    let config_path = expand_tilde(&cli.config);
    let config = ZkbConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    match cli.command {
        Commands::Hash {
            document,
            kind,
            canonical,
        } => cmd_hash(&document, kind, canonical),
        Commands::HashFile { path } => cmd_hash_file(&path),
        Commands::Archive { action } => match action {
            ArchiveAction::Create {
                bundle,
                out,
                password,
            } => cmd_archive_create(&config, &bundle, &out, password),
            ArchiveAction::Open {
                archive,
                out,
                password,
            } => cmd_archive_open(&archive, out.as_deref(), password),
        },
        Commands::Proofs { action } => {
            let client = ProofClient::new(&config.client).context("building proof client")?;
            cmd_proofs(&client, action).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("~/")) {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

// ── Offline commands ──────────────────────────────────────────────────────────

fn read_json(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Documents from files holding either one object or an array of them
fn read_documents(paths: &[PathBuf]) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for path in paths {
        match read_json(path)? {
            Value::Array(items) => documents.extend(items),
            doc @ Value::Object(_) => documents.push(doc),
            _ => bail!("{}: expected a JSON object or array", path.display()),
        }
    }
    Ok(documents)
}

fn cmd_hash(path: &Path, kind: DocumentKind, show_canonical: bool) -> Result<()> {
    let document = read_json(path)?;
    if show_canonical {
        println!("{}", canonicalize(Some(&document), kind));
    }
    println!("{}", hash_document(Some(&document), kind));
    Ok(())
}

fn cmd_hash_file(path: &Path) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let digest = hash_reader(std::io::BufReader::new(file))
        .with_context(|| format!("reading {}", path.display()))?;
    println!("{digest}  {}", path.display());
    Ok(())
}

fn password(provided: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(p) = provided {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("Archive password: ").context("reading password")?;
    if first.is_empty() {
        bail!("archive password must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password("Repeat password: ").context("reading password")?;
        if first != second {
            bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn cmd_archive_create(
    config: &ZkbConfig,
    bundle_path: &Path,
    out: &Path,
    provided: Option<String>,
) -> Result<()> {
    let bundle: ArchiveBundle = serde_json::from_value(read_json(bundle_path)?)
        .with_context(|| format!("{} is not an export bundle", bundle_path.display()))?;
    let password = password(provided, true)?;

    let archive = create_archive(&bundle, &password, &KdfParams::from(&config.crypto))?;
    std::fs::write(out, archive.to_json()?).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Archive written to {} ({} clients, {} quotes, {} invoices)",
        out.display(),
        bundle.clients.len(),
        bundle.quotes.len(),
        bundle.invoices.len(),
    );
    Ok(())
}

fn cmd_archive_open(
    archive_path: &Path,
    out: Option<&Path>,
    provided: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(archive_path)
        .with_context(|| format!("reading {}", archive_path.display()))?;
    let archive = Archive::from_json(&content)?;
    let password = password(provided, false)?;

    let bundle = open_archive(&archive, &password)?;

    match out {
        Some(out) => {
            std::fs::write(out, serde_json::to_string_pretty(&bundle)?)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Bundle written to {}", out.display());
        }
        None => {
            println!("clients:        {}", bundle.clients.len());
            println!("devis:          {}", bundle.quotes.len());
            println!("factures:       {}", bundle.invoices.len());
            println!("layoutProfiles: {}", bundle.layout_profiles.len());
            println!("societe:        {}", if bundle.company.is_some() { "yes" } else { "no" });
        }
    }
    Ok(())
}

fn cmd_config_show(config: &ZkbConfig, path: &Path) -> Result<()> {
    let mut shown = config.clone();
    // Token values are credentials
    shown.auth.tokens = shown
        .auth
        .tokens
        .into_values()
        .map(|owner| (format!("[redacted:{owner}]"), owner))
        .collect();
    if shown.client.token.is_some() {
        shown.client.token = Some("[redacted]".into());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&shown).context("rendering config")?);
    Ok(())
}

// ── Proof server commands ─────────────────────────────────────────────────────

async fn cmd_proofs(client: &ProofClient, action: ProofsAction) -> Result<()> {
    match action {
        ProofsAction::Send { documents, kind } => {
            let documents = read_documents(&documents)?;
            let mut sent = 0usize;
            for doc in &documents {
                match client.send_proof(doc, kind).await? {
                    Some(digest) => {
                        sent += 1;
                        let id = doc.get("id").and_then(Value::as_str).unwrap_or_default();
                        println!("{id}  {digest}");
                    }
                    None => eprintln!("skipped a document without id"),
                }
            }
            println!("{sent} proof(s) sent to {}", client.base_url());
        }

        ProofsAction::Verify { documents, kind } => {
            let documents = read_documents(&documents)?;
            let results = client.verify_documents(kind, &documents).await?;
            let failed = results.iter().filter(|r| !r.verified).count();
            for r in &results {
                println!("{}  {}", if r.verified { "ok  " } else { "FAIL" }, r.invoice_id);
            }
            if failed > 0 {
                bail!("{failed} of {} document(s) failed verification", results.len());
            }
        }

        ProofsAction::List { files: false } => {
            for p in client.list_proofs().await? {
                println!("{}  {}  {}", p.signed_at.to_rfc3339(), p.invoice_hash, p.invoice_id);
            }
        }
        ProofsAction::List { files: true } => {
            for p in client.list_file_proofs().await? {
                println!(
                    "{}  {}  {:>10}  {}  {}",
                    p.uploaded_at.to_rfc3339(),
                    p.file_hash,
                    p.size,
                    p.document_id,
                    p.filename
                );
            }
        }

        ProofsAction::Delete { id, files: false } => {
            if client.delete_proof(&id).await? {
                println!("deleted proof {id}");
            } else {
                println!("no proof stored for {id}");
            }
        }
        ProofsAction::Delete { id, files: true } => {
            client.delete_file_proof(&id).await?;
            println!("deleted file proof {id}");
        }

        ProofsAction::Cleanup { keep, files, all } => {
            if keep.is_empty() && !all {
                bail!("no --keep ids given; pass --all to delete every proof");
            }
            let removed = if files {
                client.cleanup_file_proofs(&keep).await?
            } else {
                client.cleanup_proofs(&keep).await?
            };
            println!("{removed} proof(s) removed, {} kept", keep.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_kind_flag_accepts_both_spellings() {
        let cli = Cli::try_parse_from(["zkb", "hash", "doc.json", "--kind", "quote"]).unwrap();
        assert!(matches!(cli.command, Commands::Hash { kind: DocumentKind::Quote, .. }));
        let cli = Cli::try_parse_from(["zkb", "hash", "doc.json", "-k", "facture"]).unwrap();
        assert!(matches!(cli.command, Commands::Hash { kind: DocumentKind::Invoice, .. }));
    }

    #[test]
    fn test_read_documents_flattens_arrays() {
        let tmp = tempfile::TempDir::new().unwrap();
        let one = tmp.path().join("one.json");
        let many = tmp.path().join("many.json");
        std::fs::write(&one, r#"{"id":"f1"}"#).unwrap();
        std::fs::write(&many, r#"[{"id":"f2"},{"id":"f3"}]"#).unwrap();

        let docs = read_documents(&[one, many]).unwrap();
        assert_eq!(docs.len(), 3);

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, "42").unwrap();
        assert!(read_documents(&[bad]).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/test");
        assert_eq!(
            expand_tilde(Path::new("~/.config/zkb/config.toml")),
            PathBuf::from("/home/test/.config/zkb/config.toml")
        );
        assert_eq!(expand_tilde(Path::new("/etc/zkb")), PathBuf::from("/etc/zkb"));
    }
}
