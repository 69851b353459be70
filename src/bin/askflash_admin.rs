use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use askflash_widget::{
    config::Config,
    db,
    models::credential::DEFAULT_KEY_NAME,
    repositories::credential::PgCredentialRepository,
    services::api_key::ApiKeyVerifier,
    widget::{
        client::{Bubble, HttpTransport, WidgetClient},
        identity::{IdentityStore, MemoryStorage},
        page::{plan_placement, PageSnapshot},
    },
};

#[derive(Parser)]
#[command(name = "askflash-admin")]
#[command(about = "Operator tools for AskFlash widget stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue (or rotate) a widget API key for a store
    IssueKey {
        /// Store the key belongs to
        #[arg(long)]
        store_id: Uuid,

        /// Key name; re-issuing an existing name rotates it
        #[arg(long, default_value = DEFAULT_KEY_NAME)]
        name: String,
    },

    /// Deactivate a widget API key
    RevokeKey {
        /// Store the key belongs to
        #[arg(long)]
        store_id: Uuid,

        /// Key name
        #[arg(long, default_value = DEFAULT_KEY_NAME)]
        name: String,
    },

    /// Chat with a store's widget from the terminal
    Chat {
        /// Base URL of the widget API
        #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:3000")]
        api_url: String,

        /// The store's widget API key
        #[arg(long, env = "ASKFLASH_API_KEY")]
        api_key: String,

        /// JSON page snapshot to chat from (defaults to a blank page)
        #[arg(long)]
        page: Option<PathBuf>,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,

        /// Messages to send; reads stdin line by line when empty
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::IssueKey { store_id, name } => {
            let verifier = credential_verifier()?;
            let issued = verifier.issue(store_id, &name).await?;
            println!("Store:      {}", store_id);
            println!("Key name:   {}", name.trim());
            println!("API key:    {}", issued.api_key);
            println!("API secret: {}", issued.api_secret.as_str());
            println!();
            println!("The secret is shown once. Embed the widget with:");
            println!(
                "  <script src=\"{}/widget/{}.js\" async></script>",
                Config::from_env()?.api_base_url,
                store_id
            );
        }
        Commands::RevokeKey { store_id, name } => {
            let verifier = credential_verifier()?;
            if verifier.deactivate(store_id, &name).await? {
                println!("Deactivated key '{}' of store {}", name, store_id);
            } else {
                anyhow::bail!("Store {} has no key named '{}'", store_id, name);
            }
        }
        Commands::Chat {
            api_url,
            api_key,
            page,
            timeout_secs,
            messages,
        } => {
            let page = match page {
                Some(path) => load_page(&path).await?,
                None => PageSnapshot::default(),
            };
            chat(&api_url, &api_key, page, timeout_secs, messages).await?;
        }
    }

    Ok(())
}

fn credential_verifier() -> Result<ApiKeyVerifier> {
    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database_url)?;
    Ok(ApiKeyVerifier::new(Arc::new(PgCredentialRepository::new(pool))))
}

async fn load_page(path: &PathBuf) -> Result<PageSnapshot> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid page snapshot {}", path.display()))
}

async fn chat(
    api_url: &str,
    api_key: &str,
    page: PageSnapshot,
    timeout_secs: u64,
    messages: Vec<String>,
) -> Result<()> {
    let transport = HttpTransport::new(api_url, api_key, Duration::from_secs(timeout_secs))?;
    let identity = IdentityStore::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryStorage::new()),
    );
    let mut widget = WidgetClient::new(Arc::new(transport), identity);

    let placement = plan_placement(&page);
    if let Some(anchor) = placement.inline_anchor {
        println!("(inline widget would follow page element #{})", anchor);
    }

    match widget.open(&page).await {
        Some(config) if !config.enabled => anyhow::bail!("The widget is disabled for this store"),
        Some(config) => println!("{}: {}\n", config.widget_name, config.greeting_message),
        None => println!("(widget config unavailable)\n"),
    }

    if messages.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            exchange(&mut widget, &line, &page).await;
        }
    } else {
        for message in &messages {
            exchange(&mut widget, message, &page).await;
        }
    }

    if let Some(remaining) = widget.messages_remaining() {
        println!("({} messages left this period)", remaining);
    }
    Ok(())
}

async fn exchange(widget: &mut WidgetClient, input: &str, page: &PageSnapshot) {
    if let Some(bubble) = widget.send(input, page).await {
        let prefix = match bubble {
            Bubble::Apology => "!",
            _ => ">",
        };
        println!("{} {}\n", prefix, bubble.to_plain_text().replace('\n', "\n  "));
    }
}
