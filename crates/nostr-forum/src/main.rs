use anyhow::Context;
use clap::{Parser, Subcommand};
use nostr::{Keypair, Metadata, ThreadMetadata, Vote};
use nostr_forum::{ForumConfig, ForumSession};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(
    name = "nostr-forum",
    about = "Threads, replies, votes and zaps on a Nostr relay",
    version
)]
struct Cli {
    /// Config file (defaults to ~/.config/nostr-forum/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Relay URL, overriding the config file
    #[arg(long, global = true, env = "NOSTR_FORUM_RELAY")]
    relay: Option<String>,

    /// Thread-tag namespace, overriding the config file
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Hex secret key of the acting identity
    #[arg(long, global = true, env = "NOSTR_FORUM_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new identity and print its keys
    Keygen,
    /// List recent threads
    Threads {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Show a thread with its replies
    Thread { id: String },
    /// Start a thread
    PostThread {
        name: String,
        about: String,
        #[arg(long)]
        picture: Option<String>,
    },
    /// Reply to a thread
    Reply { thread_id: String, text: String },
    /// Comment on a reply
    Comment { reply_id: String, text: String },
    /// Vote on an event: "+" or "-"
    Vote {
        target_id: String,
        target_author: String,
        #[arg(allow_hyphen_values = true)]
        vote: String,
    },
    /// Print the vote score of an event
    Tally { target_id: String },
    /// Print the sats zapped to an event
    Zaps { target_id: String },
    /// Sign a zap request and print it as JSON
    ZapRequest {
        target_id: String,
        recipient: String,
        amount_msats: u64,
    },
    /// Wait until a receipt for the invoice is seen
    WaitZap { target_id: String, bolt11: String },
    /// Request deletion of one of your events
    Delete {
        target_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show a profile (your own by default)
    Profile { pubkey: Option<String> },
    /// Replace your profile
    SetProfile {
        name: String,
        #[arg(long, default_value = "")]
        about: String,
        #[arg(long, default_value = "")]
        picture: String,
        #[arg(long)]
        lud16: Option<String>,
    },
}

impl Command {
    /// Commands that write events must be signed by a real identity.
    fn needs_identity(&self) -> bool {
        matches!(
            self,
            Command::PostThread { .. }
                | Command::Reply { .. }
                | Command::Comment { .. }
                | Command::Vote { .. }
                | Command::ZapRequest { .. }
                | Command::Delete { .. }
                | Command::SetProfile { .. }
        )
    }

    fn needs_connection(&self) -> bool {
        !matches!(self, Command::Keygen | Command::ZapRequest { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Command::Keygen = cli.command {
        let keys = Keypair::generate();
        println!("secret key: {}", keys.secret_key_hex());
        println!("public key: {}", keys.public_key_hex());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => ForumConfig::load_from(path)?.with_env_overrides(),
        None => ForumConfig::load()?,
    };
    if let Some(relay) = cli.relay {
        config = config.with_relay(relay);
    }
    if let Some(namespace) = cli.namespace {
        config = config.with_namespace(namespace);
    }

    let keys = match cli.secret_key.as_deref() {
        Some(secret) => Keypair::from_secret_key_hex(secret).context("invalid secret key")?,
        None if cli.command.needs_identity() => {
            anyhow::bail!("this command needs --secret-key or NOSTR_FORUM_SECRET_KEY")
        }
        None => {
            debug!("No identity given, reading with an ephemeral key");
            Keypair::generate()
        }
    };

    let thread_limit = config.thread_limit;
    let session = ForumSession::new(config, Arc::new(keys));
    if cli.command.needs_connection() {
        session
            .connect_default()
            .await
            .with_context(|| format!("connecting to {}", session.config().relay_url))?;
    }

    let result = run(&session, cli.command, thread_limit).await;
    session.disconnect().await.ok();
    result
}

async fn run(session: &ForumSession, command: Command, thread_limit: u64) -> anyhow::Result<()> {
    match command {
        Command::Keygen => {}
        Command::Threads { limit } => {
            let threads = session.list_threads(limit.unwrap_or(thread_limit)).await?;
            if threads.is_empty() {
                println!("No threads in {}", session.config().namespace);
            }
            for thread in threads {
                println!("{}  {}  ({})", thread.id, thread.metadata.name, thread.created_at);
            }
        }
        Command::Thread { id } => {
            let thread = session.get_thread(&id).await?;
            println!("{}", thread.metadata.name);
            println!("by {} at {}", thread.author, thread.created_at);
            if !thread.metadata.about.is_empty() {
                println!();
                println!("{}", thread.metadata.about);
            }
            println!();
            for reply in session.list_replies(&id).await? {
                let score = session.vote_tally(&reply.id).await?;
                println!("[{:+}] {} {}: {}", score, reply.id, reply.author, reply.content);
                for comment in session.list_comments(&reply.id).await? {
                    println!("      {}: {}", comment.author, comment.content);
                }
            }
        }
        Command::PostThread {
            name,
            about,
            picture,
        } => {
            let mut metadata = ThreadMetadata::new(name, about);
            if let Some(picture) = picture {
                metadata = metadata.with_picture(picture);
            }
            println!("{}", session.create_thread(&metadata).await?);
        }
        Command::Reply { thread_id, text } => {
            println!("{}", session.post_reply(&thread_id, &text).await?);
        }
        Command::Comment { reply_id, text } => {
            let reply = session.get_reply(&reply_id).await?;
            println!(
                "{}",
                session.post_comment(&reply.id, &reply.author, &text).await?
            );
        }
        Command::Vote {
            target_id,
            target_author,
            vote,
        } => {
            let vote: Vote = vote.parse()?;
            println!("{}", session.vote(&target_id, &target_author, vote).await?);
        }
        Command::Tally { target_id } => {
            println!("{}", session.vote_tally(&target_id).await?);
        }
        Command::Zaps { target_id } => {
            println!("{} sats", session.payment_total(&target_id).await?);
        }
        Command::ZapRequest {
            target_id,
            recipient,
            amount_msats,
        } => {
            let blob = session.request_payment(&target_id, &recipient, amount_msats)?;
            println!("{}", blob.as_json());
        }
        Command::WaitZap { target_id, bolt11 } => {
            let receipt = session.wait_for_payment(&target_id, &bolt11).await?;
            println!("paid: receipt {}", receipt.id);
        }
        Command::Delete { target_id, reason } => {
            println!("{}", session.delete(&target_id, reason.as_deref()).await?);
        }
        Command::Profile { pubkey } => {
            let pubkey = match pubkey {
                Some(pubkey) => pubkey,
                None => session.public_key()?,
            };
            let profile = session.get_profile(&pubkey).await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::SetProfile {
            name,
            about,
            picture,
            lud16,
        } => {
            let metadata = Metadata {
                about,
                picture,
                lud16,
                ..Metadata::new(name)
            };
            println!("{}", session.update_profile(&metadata).await?);
        }
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
