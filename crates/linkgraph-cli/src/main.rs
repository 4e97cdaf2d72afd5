//! Operator CLI for the link graph.
//!
//! Provides the `linkgraph` binary with subcommands that work directly on a
//! SQLite database: expand a node, list its dependees, inspect a materialized
//! record, and propagate a change through the same dispatcher and worker pool
//! the `linkgraph-worker` binary runs.
//!
//! Results are printed as JSON on stdout. Exit codes: 0 = success,
//! 1 = invalid input or rules, 2 = not found, 3 = storage or I/O error,
//! 4 = propagation error.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use linkgraph_core::{ContentId, ExpandedLinksKey, LinkTypeRules, Locale, TargetStore};
use linkgraph_expansion::{DependencyResolver, LinkExpander};
use linkgraph_storage::{ExpandedLinksStore, SqliteStore};
use linkgraph_worker::{ChangeNotification, Config, Engine, WorkerError};

/// Link graph expansion and propagation tools.
#[derive(Parser)]
#[command(name = "linkgraph", about = "Link graph expansion and propagation tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args)]
struct Common {
    /// Path to the database file.
    #[arg(short, long, default_value = "linkgraph.db")]
    db: PathBuf,

    /// JSON file replacing the built-in rule tables.
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Use the draft view instead of the live one.
    #[arg(long)]
    draft: bool,
}

impl Common {
    fn target(&self) -> TargetStore {
        TargetStore::from_with_drafts(self.draft)
    }

    fn config(&self) -> Config {
        Config {
            db_path: self.db.clone(),
            rules_path: self.rules.clone(),
            ..Config::default()
        }
    }
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the expanded links of a node.
    Expand {
        #[command(flatten)]
        common: Common,

        /// Content id of the node.
        content_id: ContentId,

        #[arg(short, long, default_value = "en")]
        locale: String,
    },

    /// List the nodes whose expanded links embed a node.
    Dependees {
        #[command(flatten)]
        common: Common,

        content_id: ContentId,

        /// Only dependees with an edition in this locale.
        #[arg(short, long)]
        locale: Option<String>,

        /// Nodes that just stopped being linked; included regardless of paths.
        #[arg(long = "orphan")]
        orphans: Vec<ContentId>,
    },

    /// Print the materialized expanded-links record of a node.
    ShowRecord {
        #[command(flatten)]
        common: Common,

        content_id: ContentId,

        #[arg(short, long, default_value = "en")]
        locale: String,
    },

    /// Propagate a change to the node and every dependee.
    Propagate {
        #[command(flatten)]
        common: Common,

        content_id: ContentId,

        /// Version stamped on every record the change produces.
        #[arg(long)]
        version: u64,

        #[arg(short, long)]
        locale: Option<String>,

        #[arg(long = "orphan")]
        orphans: Vec<ContentId>,

        /// Content store receiving payloads (default: log them).
        #[arg(long)]
        content_store_url: Option<String>,

        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Expand {
            common,
            content_id,
            locale,
        } => run_expand(&common, content_id, &Locale::new(locale)),
        Commands::Dependees {
            common,
            content_id,
            locale,
            orphans,
        } => run_dependees(&common, content_id, locale.map(Locale::new), &orphans),
        Commands::ShowRecord {
            common,
            content_id,
            locale,
        } => run_show_record(&common, content_id, Locale::new(locale)),
        Commands::Propagate {
            common,
            content_id,
            version,
            locale,
            orphans,
            content_store_url,
            workers,
        } => {
            let mut change = ChangeNotification::new(content_id, common.target(), version)
                .with_orphans(orphans);
            change.locale = locale.map(Locale::new);
            change.source_metadata.command = Some("cli".to_string());
            run_propagate(&common, change, content_store_url, workers)
        }
    };
    process::exit(exit_code);
}

/// Opens the database and loads the rule tables, reporting failures.
fn open(common: &Common) -> Result<(Arc<SqliteStore>, Arc<LinkTypeRules>), i32> {
    let rules = common.config().load_rules().map_err(|e| {
        eprintln!("Error: failed to load rules: {}", e);
        1
    })?;
    let store = SqliteStore::new(&common.db).map_err(|e| {
        eprintln!(
            "Error: failed to open database '{}': {}",
            common.db.display(),
            e
        );
        3
    })?;
    Ok((Arc::new(store), Arc::new(rules)))
}

fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize result: {}", e);
            3
        }
    }
}

/// Execute the expand subcommand.
fn run_expand(common: &Common, content_id: ContentId, locale: &Locale) -> i32 {
    let (store, rules) = match open(common) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let expander = LinkExpander::new(store, rules);
    match expander.expand(content_id, locale, common.draft) {
        Ok(expanded) => print_json(&expanded),
        Err(e) => {
            eprintln!("Error: expansion of {} failed: {}", content_id, e);
            3
        }
    }
}

/// Execute the dependees subcommand.
fn run_dependees(
    common: &Common,
    content_id: ContentId,
    locale: Option<Locale>,
    orphans: &[ContentId],
) -> i32 {
    let (store, rules) = match open(common) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let resolver = DependencyResolver::new(store, rules);
    match resolver.resolve(content_id, locale.as_ref(), common.target(), orphans) {
        Ok(dependees) => print_json(&dependees),
        Err(e) => {
            eprintln!("Error: resolving dependees of {} failed: {}", content_id, e);
            3
        }
    }
}

/// Execute the show-record subcommand.
fn run_show_record(common: &Common, content_id: ContentId, locale: Locale) -> i32 {
    let (store, _) = match open(common) {
        Ok(opened) => opened,
        Err(code) => return code,
    };
    let key = ExpandedLinksKey::new(content_id, locale, common.target());
    match store.find_expanded_links(&key) {
        Ok(Some(record)) => print_json(&record),
        Ok(None) => {
            eprintln!(
                "No {} record for {} ({})",
                common.target().as_str(),
                key.content_id,
                key.locale
            );
            2
        }
        Err(e) => {
            eprintln!("Error: failed to read record: {}", e);
            3
        }
    }
}

/// Execute the propagate subcommand.
///
/// Runs the dispatcher and a worker pool on a fresh runtime and returns once
/// every job the change produced has settled.
fn run_propagate(
    common: &Common,
    change: ChangeNotification,
    content_store_url: Option<String>,
    workers: usize,
) -> i32 {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = common.config();
    config.workers = workers.max(1);
    match change.target_store {
        TargetStore::Live => config.live_content_store_url = content_store_url,
        TargetStore::Draft => config.draft_content_store_url = content_store_url,
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 3;
        }
    };

    runtime.block_on(async {
        let engine = match Engine::from_config(&config) {
            Ok(engine) => engine,
            Err(e) => return exit_code_for(&e),
        };
        let pool = engine.start(config.workers, config.retry_policy());
        let result = engine.submit(&change).await;
        engine.wait_idle().await;
        pool.shutdown();

        match result {
            Ok(summary) => print_json(&json!({
                "content_id": change.content_id,
                "target_store": change.target_store,
                "intended_version": change.intended_version,
                "scheduled": summary,
            })),
            Err(e) => exit_code_for(&e),
        }
    })
}

fn exit_code_for(err: &WorkerError) -> i32 {
    eprintln!("Error: {}", err);
    match err {
        WorkerError::Rules(_) | WorkerError::Config { .. } | WorkerError::Malformed(_) => 1,
        WorkerError::MissingTarget { .. } => 2,
        WorkerError::Storage(_) | WorkerError::Io(_) => 3,
        _ => 4,
    }
}
