use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serial_protocol::{serialize_json, serialize_json_pretty, InternalItem, OrderItemMapping};
use serial_store::{FileStore, OrderStore};
use serial_sync::{ExternalOrderSource, OrderSyncer, SnapshotSource, SyncConfig};
use std::path::PathBuf;
use std::sync::Arc;

mod report;

#[derive(Parser)]
#[command(name = "serial-sync")]
#[command(about = "Keep serialized production items in step with external orders", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every order of a snapshot file into a store
    Sync(SyncArgs),

    /// Print the suffix mapping and production items of one order
    Show(ShowArgs),

    /// Print the production notes of one order
    Notes(NotesArgs),

    /// Print the JSON schema of a report or record type
    Schema(SchemaArgs),
}

#[derive(Args)]
struct SyncArgs {
    /// JSON snapshot exported from the order system
    #[arg(long)]
    snapshot: PathBuf,

    /// Store directory
    #[arg(long)]
    store: PathBuf,

    /// Sync config (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ShowArgs {
    /// Store directory
    #[arg(long)]
    store: PathBuf,

    /// Order id; lists known orders when omitted
    #[arg(long)]
    order: Option<String>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct NotesArgs {
    /// Store directory
    #[arg(long)]
    store: PathBuf,

    #[arg(long)]
    order: String,

    /// One JSON object per line
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SchemaArgs {
    #[arg(value_enum, default_value = "run-report")]
    kind: SchemaKind,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    RunReport,
    OrderReport,
    Snapshot,
    Mapping,
    Item,
}

#[derive(serde::Serialize)]
struct OrderView<'a> {
    order_id: &'a str,
    mapping: Option<&'a OrderItemMapping>,
    items: &'a [InternalItem],
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON consumers.
    let json_output = match &cli.command {
        Commands::Sync(args) => args.json,
        Commands::Show(args) => args.json,
        Commands::Notes(args) => args.json,
        Commands::Schema(_) => true,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Sync(args) => run_sync(args).await?,
        Commands::Show(args) => run_show(args).await?,
        Commands::Notes(args) => run_notes(args).await?,
        Commands::Schema(args) => run_schema(&args)?,
    }

    Ok(())
}

async fn run_sync(args: SyncArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => SyncConfig::load(path).await?,
        None => SyncConfig::from_env()?,
    };
    let source: Arc<dyn ExternalOrderSource> = Arc::new(
        SnapshotSource::load(&args.snapshot)
            .await
            .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?,
    );
    let store = open_store(&args.store).await?;

    let syncer = OrderSyncer::new(store, config);
    let run = syncer.sync_all(source).await?;

    if args.json {
        println!("{}", serialize_json_pretty(&run)?);
    } else {
        print!("{}", report::render_run(&run));
    }
    if !run.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_show(args: ShowArgs) -> Result<()> {
    let store = FileStore::open(&args.store)
        .await
        .with_context(|| format!("Failed to open store {}", args.store.display()))?;

    let Some(order_id) = args.order else {
        let ids = store.order_ids().await?;
        if args.json {
            println!("{}", serialize_json_pretty(&ids)?);
        } else {
            for id in ids {
                println!("{id}");
            }
        }
        return Ok(());
    };

    let mapping = store.load_mapping(&order_id).await?;
    let items = store.list_items(&order_id).await?;
    if mapping.is_none() && items.is_empty() {
        anyhow::bail!("Order {order_id} is not in store {}", args.store.display());
    }

    if args.json {
        let view = OrderView {
            order_id: &order_id,
            mapping: mapping.as_ref(),
            items: &items,
        };
        println!("{}", serialize_json_pretty(&view)?);
    } else {
        print!("{}", report::render_order(&order_id, mapping.as_ref(), &items));
    }
    Ok(())
}

async fn run_notes(args: NotesArgs) -> Result<()> {
    let store = FileStore::open(&args.store)
        .await
        .with_context(|| format!("Failed to open store {}", args.store.display()))?;
    let notes = store.list_notes(&args.order).await?;

    if args.json {
        for note in &notes {
            println!("{}", serialize_json(note)?);
        }
    } else {
        print!("{}", report::render_notes(&notes));
    }
    Ok(())
}

fn run_schema(args: &SchemaArgs) -> Result<()> {
    let schema = match args.kind {
        SchemaKind::RunReport => schemars::schema_for!(serial_protocol::SyncRunReport),
        SchemaKind::OrderReport => schemars::schema_for!(serial_protocol::OrderSyncReport),
        SchemaKind::Snapshot => schemars::schema_for!(serial_protocol::OrderSnapshot),
        SchemaKind::Mapping => schemars::schema_for!(serial_protocol::OrderItemMapping),
        SchemaKind::Item => schemars::schema_for!(serial_protocol::InternalItem),
    };
    println!("{}", serialize_json_pretty(&schema)?);
    Ok(())
}

async fn open_store(root: &std::path::Path) -> Result<Arc<dyn OrderStore>> {
    let store = FileStore::open(root)
        .await
        .with_context(|| format!("Failed to open store {}", root.display()))?;
    Ok(Arc::new(store))
}
