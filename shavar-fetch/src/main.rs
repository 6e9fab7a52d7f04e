use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use compact_str::CompactString;
use indicatif::{ProgressBar, ProgressStyle};
use shavar_fetch::{
    ApiClient, Config, Error, HttpTransport, SyncEngine, SyncOutcome, SyncReport, request_line,
};
use shavar_store::{ChunkKind, ListStore, MemoryStore};
use shavar_verifier::{LookupEngine, canonicalize};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shavar", version)]
#[command(about = "Keep a local Safe Browsing shavar replica in sync and check URLs against it")]
struct Args {
    /// JSON config file; command-line flags override its values
    #[arg(short, long, env = "SHAVAR_CONFIG")]
    config: Option<PathBuf>,

    /// Replica snapshot file
    #[arg(short, long, env = "SHAVAR_STATE", default_value = "shavar-state.json")]
    state: PathBuf,

    /// Safe Browsing API key
    #[arg(long, env = "SHAVAR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Service base URL
    #[arg(long, env = "SHAVAR_BASE_URL")]
    base_url: Option<String>,

    /// Lists to replicate, in lookup priority order
    #[arg(short, long = "list", env = "SHAVAR_LISTS", value_delimiter = ',')]
    lists: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of redirect bodies fetched concurrently
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Disable progress spinner
    #[arg(long)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the replica with the service
    Update,
    /// Report which list, if any, each URL is on
    Lookup {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the canonical form of each URL
    Canonicalize {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the chunk ranges held for each list, as sent in a downloads request
    Ranges {
        /// Lists to show (default: all configured)
        lists: Vec<String>,
    },
    /// Drop everything held for the configured lists
    Reset,
}

impl Args {
    fn config(&self) -> Result<Config, Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(key) = &self.api_key {
            config.api_key = key.clone();
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if !self.lists.is_empty() {
            config.lists = self.lists.iter().map(|l| CompactString::from(l.as_str())).collect();
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if let Some(n) = self.concurrency {
            config.redirect_concurrency = n;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Command::Canonicalize { urls } = &args.command {
        for url in urls {
            println!("{}", canonicalize(url).url);
        }
        return Ok(());
    }

    let config = args.config()?;
    let store = ListStore::new(MemoryStore::load(&args.state)?, config.lists.iter().cloned());

    match &args.command {
        Command::Update => {
            let api = ApiClient::new(HttpTransport::new(config.timeout(), config.max_retries)?, &config);
            let engine = SyncEngine::new(&api, &store, &config);

            let spinner = if !args.no_progress {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {msg}")
                        .expect("Invalid progress bar template"),
                );
                pb.set_message(format!("syncing {} lists", config.lists.len()));
                pb.enable_steady_tick(Duration::from_millis(100));
                Some(pb)
            } else {
                None
            };

            let outcome = engine.update_and_save(&args.state).await;
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }

            match outcome? {
                SyncOutcome::Delayed { until } => {
                    println!("Server asked us to wait; next sync allowed at {until}");
                }
                SyncOutcome::Completed(report) => print_report(&report),
            }
        }
        Command::Lookup { urls } => {
            let api = ApiClient::new(HttpTransport::new(config.timeout(), config.max_retries)?, &config);
            let engine = LookupEngine::new(&store, &api, &config.lists);
            for url in urls {
                match engine.lookup(url).await? {
                    Some(list) => println!("{url}\t{list}"),
                    None => println!("{url}\tclean"),
                }
            }
        }
        Command::Ranges { lists } => {
            let selected: Vec<&str> = if lists.is_empty() {
                config.lists.iter().map(CompactString::as_str).collect()
            } else {
                lists.iter().map(String::as_str).collect()
            };
            for list in selected {
                let line = request_line(
                    list,
                    &store.chunk_ranges(list, ChunkKind::Add)?,
                    &store.chunk_ranges(list, ChunkKind::Sub)?,
                );
                print!("{line}");
            }
        }
        Command::Reset => {
            for list in &config.lists {
                store.reset(list)?;
            }
            store.backend().save(&args.state)?;
            println!("Reset {} lists", config.lists.len());
        }
        Command::Canonicalize { .. } => {}
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "Synced {} lists: {} add / {} sub chunks applied, {} add / {} sub chunks deleted",
        report.lists.len(),
        report.add_chunks,
        report.sub_chunks,
        report.deleted_add_chunks,
        report.deleted_sub_chunks,
    );
    if let Some(secs) = report.next_sync_secs {
        println!("Next sync in {secs}s");
    }
    if report.skipped_records > 0 {
        println!("Skipped {} unrecognized records", report.skipped_records);
    }
    for failure in &report.redirect_failures {
        println!("Redirect failed for {}: {} ({})", failure.list, failure.url, failure.error);
    }
}
