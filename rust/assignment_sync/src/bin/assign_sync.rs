//! assign-sync - inspect and edit role permissions or user roles from the
//! command line through the assignment engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use assignment_sync::{
    AssignableItem, AssignmentEngine, AssignmentKind, AssignmentListener, ClientConfig,
    EngineConfig, Notification, OperationOutcome, RestTransport,
};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};

/// Pause before the single retry of a transient load failure.
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "assign-sync")]
#[command(about = "Edit permission-on-role and role-on-user assignments")]
#[command(version)]
struct Cli {
    /// Console API base URL
    #[arg(long, env = "ASSIGN_SYNC_URL")]
    url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "ASSIGN_SYNC_API_KEY")]
    api_key: Option<String>,

    /// What is being assigned to what
    #[arg(long, value_enum, default_value_t = AssignmentKind::PermissionsOnRole)]
    kind: AssignmentKind,

    /// Parent entity id (role id or user id)
    #[arg(long)]
    parent: String,

    /// Engine config file (JSON)
    #[arg(long, env = "ASSIGN_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Never send mutating requests
    #[arg(long, default_value = "false")]
    readonly: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the catalog grouped by category with assignment marks
    List {
        /// Search text (at least 3 characters to take effect)
        #[arg(long)]
        search: Option<String>,

        /// Only show this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Assign one item
    Assign {
        #[arg(value_name = "ITEM_ID")]
        item: String,
    },
    /// Unassign one item
    Unassign {
        #[arg(value_name = "ITEM_ID")]
        item: String,
    },
    /// Assign every item in a category
    SelectAll {
        #[arg(value_name = "CATEGORY")]
        category: String,
    },
    /// Unassign every item in a category
    DeselectAll {
        #[arg(value_name = "CATEGORY")]
        category: String,
    },
}

/// Prints notifications to stderr.
struct ConsoleListener;

impl AssignmentListener for ConsoleListener {
    fn on_assigned_change(&self, items: &[AssignableItem]) {
        debug!("assigned set changed: {} items", items.len());
    }

    fn on_notification(&self, notification: &Notification) {
        if notification.is_error() {
            eprintln!("error: {}", notification.message);
        } else {
            eprintln!("{}", notification.message);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.readonly |= cli.readonly;

    info!("Server URL: {}", cli.url);
    let transport = RestTransport::new(
        &cli.url,
        cli.api_key.as_deref(),
        cli.kind,
        ClientConfig::default(),
    )?;
    let engine = AssignmentEngine::new(cli.kind, transport, config, Arc::new(ConsoleListener));

    if let Err(e) = engine.initialize_from_remote(&cli.parent).await {
        if !e.is_transient() {
            return Err(e)
                .with_context(|| format!("failed to load {} {}", cli.kind.parent_noun(), cli.parent));
        }
        warn!("{}; retrying in {:?}", e, RETRY_DELAY);
        tokio::time::sleep(RETRY_DELAY).await;
        engine
            .initialize_from_remote(&cli.parent)
            .await
            .with_context(|| format!("failed to load {} {}", cli.kind.parent_noun(), cli.parent))?;
    }
    if let Some(message) = engine.catalog_error() {
        bail!("catalog unavailable: {}", message);
    }

    let outcome = match cli.command {
        Commands::List { search, category } => {
            engine.set_category(category.as_deref());
            engine.set_search(search.as_deref().unwrap_or(""));
            print_groups(&engine);
            return Ok(());
        }
        Commands::Assign { item } => {
            let item = lookup(&engine, &item)?;
            if engine.is_assigned(&item.id) {
                eprintln!("{} is already assigned", item.label());
                OperationOutcome::NothingToDo
            } else {
                engine.assign(&item).await
            }
        }
        Commands::Unassign { item } => {
            let item = lookup(&engine, &item)?;
            if !engine.is_assigned(&item.id) {
                eprintln!("{} is not assigned", item.label());
                OperationOutcome::NothingToDo
            } else {
                engine.unassign(&item).await
            }
        }
        Commands::SelectAll { category } => engine.select_all_in_category(&category).await,
        Commands::DeselectAll { category } => engine.deselect_all_in_category(&category).await,
    };

    for id in engine.sorted_assigned_ids() {
        println!("{}", id);
    }

    match outcome {
        OperationOutcome::Failed => Err(anyhow!("operation failed")),
        OperationOutcome::Skipped(reason) => Err(anyhow!("operation skipped: {:?}", reason)),
        _ => Ok(()),
    }
}

fn lookup<T: assignment_sync::AssignmentTransport>(
    engine: &AssignmentEngine<T>,
    id: &str,
) -> anyhow::Result<AssignableItem> {
    engine
        .find_item(id)
        .ok_or_else(|| anyhow!("unknown {} {}", engine.kind().item_noun(), id))
}

fn print_groups<T: assignment_sync::AssignmentTransport>(engine: &AssignmentEngine<T>) {
    for group in engine.grouped_items().iter() {
        match &group.category {
            Some(category) => {
                let summary = engine.category_summary(category);
                let mark = if summary.is_fully_assigned() {
                    "x"
                } else if summary.is_partially_assigned() {
                    "-"
                } else {
                    " "
                };
                println!(
                    "[{}] {} ({}/{})",
                    mark, category, summary.assigned, summary.total
                );
            }
            None => println!("(uncategorized)"),
        }
        for item in &group.items {
            let mark = if engine.is_assigned(&item.id) { "x" } else { " " };
            match &item.description {
                Some(description) => {
                    println!("  [{}] {} {} - {}", mark, item.id, item.name, description)
                }
                None => println!("  [{}] {} {}", mark, item.id, item.name),
            }
        }
    }
    println!(
        "{} of {} assigned",
        engine.assigned_count(),
        engine.total_count()
    );
}
