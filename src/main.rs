mod config;
mod constants;
mod feed;
mod gallery;
mod logging;
mod paging;
mod query;
mod serp;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use config::{Config, PrefsStore};
use constants::constants;
use feed::GalleryStatus;
use gallery::GalleryItem;
use query::QueryState;
use serp::SearchClient;
use session::{LoadOutcome, SearchSession};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Page through image search results", long_about = None)]
struct Cli {
  /// Raise log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search for images. Without a query, repeats the last one.
  Search {
    /// Search text; saved as the current query
    query: Option<String>,
    /// Number of pages to load
    #[arg(short, long)]
    pages: Option<u32>,
    /// Times to retry a failed page before giving up
    #[arg(short, long, default_value_t = 0)]
    retries: u32,
    /// Print one JSON object per result
    #[arg(long)]
    json: bool,
  },
  /// Print the saved query
  Query,
  /// Forget the saved query
  Clear,
  /// Generate shell completions
  Completions { shell: Shell },
}

// --- Output ---

fn print_items<'a>(out: &mut impl Write, items: impl Iterator<Item = &'a GalleryItem>, json: bool) -> Result<()> {
  for item in items {
    if json {
      writeln!(out, "{}", serde_json::to_string(item).context("Failed to encode result")?)?;
    } else {
      let title = if item.title.is_empty() { "(untitled)" } else { item.title.as_str() };
      writeln!(out, "{:>4}  {}x{}  {}", item.position, item.original_width, item.original_height, title)?;
      writeln!(out, "      {}", item.original)?;
      if !item.link.is_empty() {
        writeln!(out, "      {} ({})", item.link, item.source)?;
      }
    }
  }
  Ok(())
}

fn describe(status: &GalleryStatus, query: &str) -> Option<String> {
  match status {
    GalleryStatus::Start => Some("No active search. Run `imgsearch search <QUERY>`.".to_string()),
    GalleryStatus::NoImages => Some(format!("No images found for '{}'.", query)),
    GalleryStatus::Failed(msg) => Some(format!("Search failed: {}", msg)),
    GalleryStatus::Loading | GalleryStatus::Showing(_) => None,
  }
}

// --- Commands ---

async fn run_search(state: &QueryState, config: &Config, pages: u32, retries: u32, json: bool) -> Result<()> {
  let search = Arc::new(SearchClient::from_config(config)?);
  let mut session = SearchSession::new(search, state.subscribe());
  let stdout = std::io::stdout();

  let mut loaded = 0;
  let mut attempts = 0;
  while loaded < pages {
    let before = session.feed().len();
    match session.load_more().await {
      LoadOutcome::Idle | LoadOutcome::Exhausted | LoadOutcome::Superseded => break,
      LoadOutcome::Loaded { next_key, .. } => {
        print_items(&mut stdout.lock(), session.items().skip(before), json)?;
        loaded += 1;
        attempts = 0;
        if next_key.is_none() {
          break;
        }
      }
      LoadOutcome::Failed(e) if attempts < retries => {
        attempts += 1;
        warn!(err = %e, attempt = attempts, "search: page load failed, retrying");
      }
      LoadOutcome::Failed(e) => {
        if session.feed().len() == 0 {
          bail!("Search for '{}' failed: {}", session.query(), e);
        }
        eprintln!("Stopped after {} results: {}", session.feed().len(), e);
        break;
      }
    }
  }

  if let Some(message) = describe(session.status(), session.query()) {
    eprintln!("{}", message);
  }
  info!(query = %session.query(), results = session.feed().len(), pages = loaded, "search: finished");
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load();
  let _log_guard = logging::init(cli.verbose, &config);

  let state = QueryState::open(PrefsStore::default_location());
  match cli.command {
    Command::Search { query, pages, retries, json } => {
      if let Some(q) = query {
        state.set_query(q.trim());
      }
      let pages = pages.unwrap_or(constants().default_pages);
      run_search(&state, &config, pages, retries, json).await
    }
    Command::Query => {
      println!("{}", state.current());
      Ok(())
    }
    Command::Clear => {
      state.set_query("");
      Ok(())
    }
    Command::Completions { shell } => {
      clap_complete::generate(shell, &mut Cli::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
      Ok(())
    }
  }
}
