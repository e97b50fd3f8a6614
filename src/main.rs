use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use offsync::cache::CacheSource;
use offsync::config::Config;
use offsync::{Favorites, FavoritesMode, OfflineClient, OperationKind, SyncState};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "Offline operation queue, cache and sync engine")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show connectivity, queue and sync state
  Status,
  /// Queue an operation for the next sync
  Enqueue {
    /// create, update or delete
    kind: OperationKind,
    /// Endpoint path, e.g. /listings/42
    target: String,
    /// JSON payload
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Inspect or edit the pending queue
  #[command(subcommand)]
  Queue(QueueCommand),
  /// Replay the pending queue now
  Sync,
  /// Keep probing the server and syncing until interrupted
  Watch,
  /// Read a target through the cache
  Fetch {
    /// Cache key, e.g. listings:42
    key: String,
    target: String,
  },
  #[command(subcommand)]
  Cache(CacheCommand),
  #[command(subcommand)]
  Favorites(FavoritesCommand),
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  List,
  Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  Get { key: String },
  Put { key: String, value: String },
  Invalidate { key: String },
}

#[derive(Subcommand, Debug)]
enum FavoritesCommand {
  Add {
    id: String,
    /// Mirror the change to this server collection
    #[arg(long)]
    mirror: Option<String>,
  },
  Remove {
    id: String,
    #[arg(long)]
    mirror: Option<String>,
  },
  List,
  Check { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.verbose);

  let config = Config::load(args.config.as_deref())?;
  let client = Arc::new(OfflineClient::open(&config).await?);

  match args.command {
    Command::Status => status(&client)?,
    Command::Enqueue { kind, target, data } => {
      let payload = data.as_deref().map(parse_json).transpose()?;
      let id = client.queue().enqueue(kind, &target, payload)?;
      println!("{}", id);
    }
    Command::Queue(QueueCommand::List) => {
      for op in client.queue().list()? {
        let payload = op.payload().map(Value::to_string).unwrap_or_default();
        println!(
          "{}  {}  {:<6}  {}  {}",
          op.id,
          op.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          op.kind(),
          op.target,
          payload
        );
      }
    }
    Command::Queue(QueueCommand::Remove { id }) => {
      if !client.queue().remove(&id)? {
        return Err(eyre!("No pending operation with id {}", id));
      }
    }
    Command::Sync => {
      let result = client.engine().run_sync().await;
      println!("{}", result);
      for message in &result.messages {
        println!("  {}", message);
      }
      if !result.success {
        return Err(eyre!("Sync did not complete"));
      }
    }
    Command::Watch => {
      let background = client.spawn_background();
      background.scheduler().trigger();
      info!("Watching; press Ctrl-C to stop");
      tokio::signal::ctrl_c().await?;
      background.shutdown();
    }
    Command::Fetch { key, target } => {
      let result = client.fetch(&key, &target).await?;
      let source = match result.source {
        CacheSource::Network => "network".to_string(),
        CacheSource::Fallback | CacheSource::Offline => match result.cached_at {
          Some(at) => format!("cache, stored {}", at.format("%Y-%m-%d %H:%M:%S")),
          None => "cache".to_string(),
        },
      };
      eprintln!("({})", source);
      println!("{}", serde_json::to_string_pretty(&result.data)?);
    }
    Command::Cache(CacheCommand::Get { key }) => match client.cache().get(&key)? {
      Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
      None => return Err(eyre!("No cached value for {}", key)),
    },
    Command::Cache(CacheCommand::Put { key, value }) => {
      client.cache().put(&key, parse_json(&value)?)?;
    }
    Command::Cache(CacheCommand::Invalidate { key }) => client.cache().invalidate(&key)?,
    Command::Favorites(command) => favorites(client, command).await?,
  }

  Ok(())
}

fn status(client: &OfflineClient) -> Result<()> {
  let connectivity = client.monitor().state();
  println!(
    "network:  {}",
    if connectivity.is_online { "online" } else { "offline" }
  );
  if let Some(at) = connectivity.last_online_at {
    println!("last online: {}", at.format("%Y-%m-%d %H:%M:%S"));
  }
  println!("pending:  {}", client.queue().len()?);
  let sync = match client.engine().state() {
    SyncState::Idle => "idle".to_string(),
    SyncState::Syncing => "syncing".to_string(),
    SyncState::Done(result) => result.to_string(),
  };
  println!("sync:     {}", sync);
  Ok(())
}

async fn favorites(client: Arc<OfflineClient>, command: FavoritesCommand) -> Result<()> {
  let mode = match &command {
    FavoritesCommand::Add {
      mirror: Some(collection),
      ..
    }
    | FavoritesCommand::Remove {
      mirror: Some(collection),
      ..
    } => FavoritesMode::Mirrored {
      collection: collection.clone(),
    },
    _ => FavoritesMode::LocalOnly,
  };
  let favorites = Favorites::open(client, mode)?;

  match command {
    FavoritesCommand::Add { id, .. } => {
      if !favorites.add(&id).await? {
        println!("{} is already a favorite", id);
      }
    }
    FavoritesCommand::Remove { id, .. } => {
      if !favorites.remove(&id).await? {
        println!("{} is not a favorite", id);
      }
    }
    FavoritesCommand::List => {
      for id in favorites.list_ids() {
        println!("{}", id);
      }
    }
    FavoritesCommand::Check { id } => {
      println!("{}", favorites.is_favorite(&id));
    }
  }
  Ok(())
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON '{}': {}", raw, e))
}

/// Log to a daily file in the data directory, and to stderr with `--verbose`.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(verbose: bool) -> Option<WorkerGuard> {
  use tracing_subscriber::prelude::*;
  use tracing_subscriber::EnvFilter;

  let filter = EnvFilter::try_from_env("OFFSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  let (file_layer, guard) = match dirs::data_dir() {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir.join("offsync").join("logs"), "offsync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  let stderr_layer = verbose.then(|| {
    tracing_subscriber::fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter)
    .with(file_layer)
    .with(stderr_layer)
    .init();

  guard
}
