use cardlink_core::{
    BrokerClient, BrokerError, BrokerMessage, BusBroker, ButtonOptions, CacheInfo,
    CardDescriptor, CardLinks, ClickGesture, Config, CrossOriginBroker, DocumentSource,
    HttpSource, LinkCommand, OpenStrategy, TabOpener, TabRegistry, WindowPort, dispatch,
    spawn_bus_broker, spawn_cross_origin_broker,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardlink")]
#[command(about = "Marketplace search queries and links for trading cards")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for the persisted lookup tables
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Keep lookup tables in memory only
    #[arg(long, global = true)]
    no_persist: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CardArgs {
    /// Card name as shown, may end in a collector number
    name: String,
    /// Full set name
    #[arg(long, default_value = "")]
    set: String,
    /// Collector number, e.g. 14/102 or TG10
    #[arg(long)]
    number: Option<String>,
    /// Internal catalog id
    #[arg(long)]
    id: Option<String>,
}

impl CardArgs {
    fn descriptor(&self) -> CardDescriptor {
        let mut card = CardDescriptor::new(&self.name, &self.set);
        if let Some(number) = &self.number {
            card = card.with_number(number);
        }
        if let Some(id) = &self.id {
            card = card.with_catalog_id(id);
        }
        card
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Cardmarket and TCGplayer search queries for a card
    Query {
        #[command(flatten)]
        card: CardArgs,
    },
    /// Resolve the links a card's buttons would open
    Links {
        #[command(flatten)]
        card: CardArgs,
        /// Use the modifier-click target (Cardmarket backup search)
        #[arg(long)]
        alt: bool,
        /// Dispatch the links into a named-tab session and show the tabs
        #[arg(long)]
        open: bool,
        /// How `--open` reaches the tabs
        #[arg(long, value_enum, default_value_t = Via::Tabs, requires = "open")]
        via: Via,
    },
    /// Translate between catalog and marketplace product ids
    Resolve {
        /// Which kind of id is given
        #[arg(value_enum)]
        from: IdKind,
        id: String,
    },
    /// Look up the Cardmarket set code for a set name
    Abbr { set: String },
    /// Fetch both lookup tables if they are stale
    Preload,
    /// Inspect or clear the persisted lookup tables
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Replace the set abbreviation table with a local JSON file
    OverrideAbbr { file: PathBuf },
    /// Replace the product id table with a local JSON file
    OverrideIds { file: PathBuf },
    /// Check whether an origin may drive the tab broker
    Origin { origin: String },
}

#[derive(Subcommand)]
enum CacheAction {
    Info,
    Clear,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Via {
    /// Open the tabs directly
    Tabs,
    /// Through a cross-origin broker window
    Broker,
    /// Through the same-origin broadcast bus
    Bus,
}

/// Where the cross-origin broker page is served from.
const BROKER_ORIGIN: &str = "https://raw.githubusercontent.com";

#[derive(Clone, Copy, ValueEnum)]
enum IdKind {
    Catalog,
    Cardmarket,
    Tcgplayer,
}

fn format_cache_info(label: &str, info: Option<CacheInfo>) -> String {
    match info {
        Some(info) => {
            let nanos = info.fetched_at_ms as i128 * 1_000_000;
            let fetched = OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .ok()
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_else(|| info.fetched_at_ms.to_string());
            format!(
                "{}: {} entries, fetched {}{}",
                label,
                info.entries,
                fetched,
                if info.fresh { "" } else { " (stale)" }
            )
        }
        None => format!("{}: not cached", label),
    }
}

fn print_command(command: &LinkCommand, gesture: ClickGesture) {
    println!("[{}] {} -> {}", command.label, command.title, command.window_name);
    println!("    opens:  {}", command.target(gesture));
    if let Some(direct) = &command.direct_url {
        println!("    direct: {}", direct);
    }
    println!("    search: {}", command.search_url);
    if let Some(backup) = &command.backup_url {
        println!("    backup: {}", backup);
    }
}

async fn open_via_broker<S: DocumentSource>(
    links: &CardLinks<S>,
    registry: &TabRegistry,
    commands: &[LinkCommand],
    gesture: ClickGesture,
) -> Result<(), BrokerError> {
    let policy = links.origin_policy();
    let page_origin = format!("https://{}", policy.trusted_host());
    let (broker_port, broker_inbox) = WindowPort::channel(BROKER_ORIGIN);
    let (page, page_inbox) = WindowPort::channel(&page_origin);

    let broker = CrossOriginBroker::new(policy, registry.clone(), broker_port.clone());
    let handle = spawn_cross_origin_broker(broker, broker_inbox, Some(page.clone()));
    let client = BrokerClient::new(page, page_inbox, broker_port)
        .with_request_timeout(links.request_timeout());

    let mut result = if client.ping_until_pong(links.retry_policy()).await {
        Ok(())
    } else {
        Err(BrokerError::Timeout)
    };
    if result.is_ok() {
        for command in commands {
            result = client.open(&command.window_name, command.target(gesture)).await;
            if result.is_err() {
                break;
            }
        }
    }

    handle.cancel();
    handle.wait_for_completion().await;
    result
}

async fn open_via_bus<S: DocumentSource>(
    links: &CardLinks<S>,
    registry: &TabRegistry,
    commands: &[LinkCommand],
    gesture: ClickGesture,
) -> Result<(), BrokerError> {
    let page_origin = format!("https://{}", links.origin_policy().trusted_host());
    let bus = links.broadcast_bus(&page_origin);
    let mut page = bus.endpoint();
    let handle = spawn_bus_broker(BusBroker::new(&bus, registry.clone()));

    let mut result = Ok(());
    for (id, command) in (1..).zip(commands) {
        let open = BrokerMessage::Open {
            name: command.window_name.clone(),
            url: command.target(gesture).to_string(),
            id: Some(id),
        };
        result = page.request(&open, links.request_timeout()).await;
        if result.is_err() {
            break;
        }
    }

    handle.cancel();
    handle.wait_for_completion().await;
    result
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cardlink_core=info,cardlink_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if cli.cache_dir.is_some() {
        config.cache_dir = cli.cache_dir.clone();
    }
    let links: CardLinks<HttpSource> = if cli.no_persist {
        CardLinks::without_persistence(config)?
    } else {
        CardLinks::from_config(config)?
    };

    match cli.command {
        Commands::Query { card } => {
            let card = card.descriptor();
            let cardmarket = links
                .queries()
                .cardmarket_query(links.abbreviations(), &card)
                .await;
            let tcgplayer = links.queries().tcgplayer_query(&card.raw_name, &card.set_full);
            println!("Cardmarket: {}", cardmarket.primary);
            println!("Cardmarket (backup): {}", cardmarket.backup);
            println!("TCGplayer: {}", tcgplayer);
        }
        Commands::Links {
            card,
            alt,
            open,
            via,
        } => {
            let card = card.descriptor();
            let gesture = if alt {
                ClickGesture::Alternate
            } else {
                ClickGesture::Plain
            };
            let buttons = links.buttons();
            let pair = buttons
                .search_buttons(&card, &ButtonOptions::tcgplayer(), &ButtonOptions::cardmarket())
                .await;
            let store_manager =
                buttons.store_manager_button(&card, &ButtonOptions::store_manager());
            let commands = [pair.cardmarket, pair.tcgplayer, store_manager];

            for command in &commands {
                print_command(command, gesture);
            }

            if open {
                let registry = TabRegistry::new();
                match via {
                    Via::Tabs => {
                        let opener =
                            TabOpener::new(registry.clone(), OpenStrategy::LookupThenReplace);
                        for command in &commands {
                            dispatch(&opener, command, gesture);
                        }
                    }
                    Via::Broker => {
                        open_via_broker(&links, &registry, &commands, gesture).await?;
                    }
                    Via::Bus => open_via_bus(&links, &registry, &commands, gesture).await?,
                }
                println!("Tabs:");
                for name in registry.names() {
                    println!(
                        "  {}: {}",
                        name,
                        registry.current_url(&name).unwrap_or_default()
                    );
                }
            }
        }
        Commands::Resolve { from, id } => {
            let crossref = links.crossref();
            let (catalog, cardmarket, tcgplayer) = match from {
                IdKind::Catalog => (
                    Some(id.clone()),
                    crossref.cardmarket_id(&id).await,
                    crossref.tcgplayer_id(&id).await,
                ),
                IdKind::Cardmarket => (
                    crossref
                        .catalog_id_from_cardmarket(&id)
                        .await
                        .map(|c| c.to_string()),
                    Some(id.clone()),
                    crossref.tcgplayer_id_from_cardmarket(&id).await,
                ),
                IdKind::Tcgplayer => (
                    crossref
                        .catalog_id_from_tcgplayer(&id)
                        .await
                        .map(|c| c.to_string()),
                    crossref.cardmarket_id_from_tcgplayer(&id).await,
                    Some(id.clone()),
                ),
            };
            let result = serde_json::json!({
                "catalog": catalog,
                "cardmarket": cardmarket,
                "tcgplayer": tcgplayer,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Abbr { set } => {
            let abbr = links.abbreviations().resolve(&set).await;
            if abbr.is_empty() {
                eprintln!("No abbreviation known for '{}'", set);
                std::process::exit(1);
            }
            println!("{}", abbr);
        }
        Commands::Preload => {
            let (abbreviations, ids) = links.preload().await;
            println!("Set abbreviations: {} entries", abbreviations);
            println!("Product ids: {} entries", ids);
        }
        Commands::Cache { action } => match action {
            CacheAction::Info => {
                println!("Store: {}", links.store().strategy_name());
                println!(
                    "{}",
                    format_cache_info("Set abbreviations", links.abbreviations().cache_info())
                );
                println!(
                    "{}",
                    format_cache_info("Product ids", links.crossref().cache_info())
                );
            }
            CacheAction::Clear => {
                links.abbreviations().invalidate()?;
                links.crossref().invalidate()?;
                println!("Cleared cached lookup tables");
            }
        },
        Commands::OverrideAbbr { file } => {
            let count = links.abbreviations().set_map(read_json(&file)?)?;
            println!("Set abbreviations replaced: {} entries", count);
        }
        Commands::OverrideIds { file } => {
            let count = links.crossref().set_map(read_json(&file)?)?;
            println!("Product ids replaced: {} entries", count);
        }
        Commands::Origin { origin } => {
            let policy = links.origin_policy();
            if policy.allows(&origin) {
                println!("{} is trusted (host {})", origin, policy.trusted_host());
            } else {
                log::warn!("Origin {} rejected by broker policy", origin);
                println!("{} is NOT trusted", origin);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
