use clap::{Parser, Subcommand};
use color_eyre::Result;
use pubfetch::collection::{fetch_all_with, CollectionView, FetchAllOptions, Item};
use pubfetch::http::{Clients, Payload};
use pubfetch::Config;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pubfetch")]
#[command(about = "Fetch, cache and page through federated social-graph resources")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pubfetch/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch one resource and print it
  Get {
    iri: String,
    /// Fetch as a binary payload instead of a document
    #[arg(long)]
    blob: bool,
  },
  /// Fetch every item of a collection
  Items {
    iri: String,
    /// Stop after this many pages (overrides eager.max_pages)
    #[arg(long)]
    max_pages: Option<usize>,
  },
  /// Page through a collection the way an infinite-scroll view would
  Browse {
    iri: String,
    /// Pages to load after the first
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Drop every cached entry
  Flush,
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pubfetch=info"));

  match log_file {
    Some(path) => {
      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| color_eyre::eyre::eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
      Ok(None)
    }
  }
}

fn print_items(items: &[Item]) -> Result<()> {
  for item in items {
    match item {
      Item::Reference(iri) => println!("{}", iri),
      Item::Inline(value) => println!("{}", serde_json::to_string(value)?),
    }
  }
  Ok(())
}

async fn run(command: Command, config: Config, clients: &Clients, cancel: CancellationToken) -> Result<()> {
  match command {
    Command::Get { iri, blob } => {
      let client = if blob { &clients.blobs } else { &clients.documents };
      let fetched = client.get_with(&iri, &cancel).await?;
      info!(iri = %fetched.iri, cached = fetched.is_cached(), "fetched");
      match fetched.payload {
        Payload::Document(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
        Payload::Blob(handle) => println!(
          "{} {} ({} bytes)",
          handle.url(),
          handle.content_type().unwrap_or("application/octet-stream"),
          handle.len()
        ),
      }
    }
    Command::Items { iri, max_pages } => {
      let options = FetchAllOptions {
        max_pages: max_pages.or(config.eager.max_pages),
      };
      let collection = fetch_all_with(&clients.plain, &iri, &options, &cancel).await?;
      print_items(&collection.ordered_items)?;
    }
    Command::Browse { iri, pages } => {
      let mut view = CollectionView::new(clients.plain.clone()).with_cancellation(cancel);
      view.resolve(&iri).await?;
      for _ in 0..pages {
        if !view.consume_next().await? {
          break;
        }
      }
      print_items(view.items())?;
      let controls = view.controls();
      eprintln!(
        "first: {} prev: {} next: {} last: {}",
        controls.first, controls.prev, controls.next, controls.last
      );
    }
    Command::Flush => {
      clients.cache.flush()?;
      info!("cache flushed");
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  let config = Config::load(args.config.as_deref())?;
  let clients = Clients::from_config(&config)?;
  let cancel = CancellationToken::new();

  tokio::select! {
    outcome = run(args.command, config, &clients, cancel.child_token()) => outcome,
    _ = tokio::signal::ctrl_c() => {
      info!("interrupted, cancelling in-flight requests");
      cancel.cancel();
      clients.shutdown();
      Ok(())
    }
  }
}
