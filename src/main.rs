mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lotcache::backend::{LeadsQuery, ReadOptions};
use lotcache::cache::YearMonth;
use lotcache::commands;
use lotcache::config::Config;

#[derive(Parser, Debug)]
#[command(name = "lotcache")]
#[command(about = "Version-gated local cache for a dealership backend")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lotcache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Dealership slug to act for
  #[arg(short, long, global = true)]
  dealership: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a resource, from the cache when it is current
  Show {
    /// Resource name or alias, e.g. vehicles, dash:2026-03, vehicle:42
    resource: String,
    /// Month for dashboards (YYYY-MM, defaults to the current month)
    #[arg(long)]
    month: Option<YearMonth>,
    /// Refetch even if the snapshot is current
    #[arg(long)]
    refresh: bool,
    /// Serve the snapshot if the backend is unreachable
    #[arg(long)]
    offline_ok: bool,
  },
  /// Print a page of a seller's leads
  Leads {
    #[arg(long)]
    seller: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value = "")]
    search: String,
  },
  /// Drop cached resources so the next read refetches them
  Invalidate {
    #[arg(required = true)]
    resources: Vec<String>,
  },
  /// Drop every cached resource of the dealership
  Purge,
  /// Invalidate on change events read as JSON lines from stdin
  Watch,
  /// List known resources
  Resources,
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  // RUST_LOG controls the level, e.g. RUST_LOG=lotcache=debug
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let Some(path) = log_file else {
    tracing_subscriber::registry()
      .with(fmt::layer().with_writer(std::io::stderr))
      .with(filter)
      .init();
    return Ok(None);
  };

  let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
  let dir = dir.unwrap_or_else(|| Path::new("."));
  let name = path
    .file_name()
    .ok_or_else(|| color_eyre::eyre::eyre!("Invalid log file: {}", path.display()))?;
  std::fs::create_dir_all(dir)?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();
  Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  if let Command::Resources = args.command {
    for res in commands::RESOURCES {
      println!("{:<12} {:<18} {}", res.name, res.aliases.join(","), res.description);
    }
    return Ok(());
  }

  let config = Config::load(args.config.as_deref())?;

  let log_file = args.log_file.as_deref().or(config.log.file.as_deref());
  let _guard = init_tracing(log_file)?;

  let app = app::App::new(&config, args.dealership.as_deref()).await?;

  match args.command {
    Command::Show {
      resource,
      month,
      refresh,
      offline_ok,
    } => {
      let month = month.unwrap_or_else(YearMonth::current);
      let resource = commands::resolve(&resource, month)?;
      let options = ReadOptions {
        force_refresh: refresh,
        allow_stale: offline_ok,
      };
      app.show(&resource, options).await?;
    }
    Command::Leads {
      seller,
      page,
      search,
    } => {
      app.leads(&LeadsQuery::new(seller, page, search)).await?;
    }
    Command::Invalidate { resources } => {
      let month = YearMonth::current();
      let keys = resources
        .iter()
        .map(|input| commands::resolve(input, month))
        .collect::<Result<Vec<_>, _>>()?;
      let removed = app.invalidate(&keys);
      eprintln!("invalidated {} of {} resources", removed, keys.len());
    }
    Command::Purge => {
      let removed = app.purge();
      eprintln!("removed {} cached resources", removed);
    }
    Command::Watch => {
      let seen = app.watch().await;
      eprintln!("processed {} change events", seen);
    }
    Command::Resources => {}
  }

  app.close();
  Ok(())
}
