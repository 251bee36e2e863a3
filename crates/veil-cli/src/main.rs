mod directory;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use veil_client::Session;
use veil_proto::{MemoryFeed, MessageFeed, MessageRecord, UserDirectory};
use veil_store::{
    paths, DecryptedKeyCache, FileKeyStorage, LocalKeyStore, RecoveryHandshake,
    RegenerationConfirmation, StoreSettings,
};

use crate::directory::JsonFileDirectory;

#[derive(Parser)]
#[command(name = "veil")]
#[command(about = "End-to-end encryption keys and messages for Veil", long_about = None)]
struct Cli {
    /// Data directory (defaults to the platform data dir or $VEIL_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Password; prompted for when omitted
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and publish a key pair for a new account
    Init {
        user: String,
    },

    /// Check that the password unseals the local key
    Unlock {
        user: String,
    },

    /// Show the published fingerprint and local key state
    Whoami {
        user: String,
    },

    /// Re-seal a key from archived recovery material
    Restore {
        user: String,
        /// Base64 private key; prompted for when omitted
        #[arg(long)]
        material: Option<String>,
    },

    /// Replace the key pair; every earlier message becomes unreadable
    Regenerate {
        user: String,
        /// Required: acknowledges that history is lost
        #[arg(long)]
        confirm: bool,
    },

    /// Encrypt a message for every participant and print the record as JSON
    Encrypt {
        user: String,
        /// Other participants (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,
        #[arg(long, default_value = "default")]
        conversation: String,
        text: String,
    },

    /// Decrypt records (JSON object or array) from a file, or stdin with "-"
    Decrypt {
        user: String,
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Delete the local sealed key
    Forget {
        user: String,
    },
}

struct Workspace {
    base: PathBuf,
    settings: StoreSettings,
}

impl Workspace {
    fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        match data_dir {
            Some(base) => {
                let mut settings = StoreSettings::load(&base.join("settings.json"))?;
                if settings.data_dir.is_none() {
                    settings.data_dir = Some(base.join("keys"));
                }
                Ok(Self { base, settings })
            }
            None => Ok(Self {
                base: paths::data_dir()?,
                settings: StoreSettings::load_default()?,
            }),
        }
    }

    fn directory(&self) -> Arc<JsonFileDirectory> {
        Arc::new(JsonFileDirectory::new(self.base.join("directory.json")))
    }

    async fn session(&self, user: &str, feed: Arc<dyn MessageFeed>) -> Result<Session> {
        let keys_dir = self.settings.resolved_data_dir()?;
        let storage = FileKeyStorage::open(&keys_dir)
            .await
            .with_context(|| format!("opening key store at {}", keys_dir.display()))?;
        let keystore = LocalKeyStore::with_settings(
            Arc::new(storage),
            Arc::new(DecryptedKeyCache::new()),
            &self.settings,
        );
        Ok(Session::new(user, keystore, self.directory(), feed))
    }
}

fn password(cli_password: &Option<String>) -> Result<String> {
    match cli_password {
        Some(pw) => Ok(pw.clone()),
        None => Ok(rpassword::prompt_password("Password: ")?),
    }
}

/// Print the one-time recovery material and close the handshake.
fn show_recovery_material(mut handshake: RecoveryHandshake) -> Result<()> {
    let material = handshake.present()?;
    eprintln!("Recovery key (shown once, store it somewhere safe):");
    println!("{material}");
    handshake.confirm()?;
    eprintln!("Public key fingerprint: {}", handshake.public_key().fingerprint());
    Ok(())
}

fn read_records(input: &Path) -> Result<Vec<MessageRecord>> {
    let raw = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let workspace = Workspace::open(cli.data_dir.clone())?;
    veil_client::logging::init(&workspace.settings.log_filter);

    let feed = Arc::new(MemoryFeed::new());

    match cli.command {
        Commands::Init { user } => {
            let session = workspace.session(&user, feed).await?;
            let pw = password(&cli.password)?;
            show_recovery_material(session.enroll(&pw).await?)?;
        }

        Commands::Unlock { user } => {
            let session = workspace.session(&user, feed).await?;
            let pw = password(&cli.password)?;
            match session.unlock(&pw).await {
                Ok(()) => {
                    let fingerprint = session
                        .public_key()
                        .map(|k| k.fingerprint())
                        .unwrap_or_default();
                    println!("unlocked {user} ({fingerprint})");
                }
                Err(err) if err.requires_recovery() => {
                    bail!("cannot unlock {user}: {err}. Use `restore` or `regenerate --confirm`.")
                }
                Err(err) => return Err(err.into()),
            }
        }

        Commands::Whoami { user } => {
            let session = workspace.session(&user, feed).await?;
            let published = workspace.directory().get_public_key(&user).await?;
            let sealed = session.keystore().has_sealed_key(&user).await?;
            let output = serde_json::json!({
                "user": user,
                "fingerprint": published.map(|k| k.fingerprint()),
                "publicKey": published.map(|k| k.to_b64()),
                "sealedKeyOnDevice": sealed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Restore { user, material } => {
            let session = workspace.session(&user, feed).await?;
            let material = match material {
                Some(m) => m,
                None => rpassword::prompt_password("Recovery key: ")?,
            };
            let pw = password(&cli.password)?;
            session.restore(&material, &pw).await?;
            println!("restored key for {user}");
        }

        Commands::Regenerate { user, confirm } => {
            if !confirm {
                bail!(
                    "regenerating destroys access to every earlier message; re-run with --confirm"
                );
            }
            let session = workspace.session(&user, feed).await?;
            let pw = password(&cli.password)?;
            let handshake = session
                .regenerate(&pw, RegenerationConfirmation::user_confirmed())
                .await?;
            show_recovery_material(handshake)?;
        }

        Commands::Encrypt { user, to, conversation, text } => {
            let session = workspace.session(&user, feed).await?;
            let pw = password(&cli.password)?;
            session.unlock(&pw).await?;

            let mut participants = vec![user.clone()];
            participants.extend(to.into_iter().filter(|p| *p != user));
            let record = session.send(&conversation, &participants, &text).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::Decrypt { user, input } => {
            let records = read_records(&input)?;
            let session = workspace.session(&user, feed.clone()).await?;
            let pw = password(&cli.password)?;
            session.unlock(&pw).await?;

            let mut conversations: Vec<String> =
                records.iter().map(|r| r.conversation_id.clone()).collect();
            conversations.sort();
            conversations.dedup();
            let mut senders: Vec<String> = records.iter().map(|r| r.sender_id.clone()).collect();
            senders.sort();
            senders.dedup();

            for record in records {
                feed.publish(record).await?;
            }
            let mut messages = Vec::new();
            for conversation in &conversations {
                let subscription = session.subscribe(conversation, &senders).await?;
                messages.extend(subscription.messages());
            }
            if messages.is_empty() {
                return Err(anyhow!("no readable messages for {user}"));
            }
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }

        Commands::Forget { user } => {
            let session = workspace.session(&user, feed).await?;
            session.keystore().remove(&user).await?;
            println!("removed local key for {user}");
        }
    }

    Ok(())
}
