use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use forum_access::config::ForumConfig;
use forum_access::db::{self, SqliteForumStore};
use forum_access::errors::{AppResult, ErrorResponse};
use forum_access::models::{CategoryId, User, UserId};
use forum_access::store::Snapshot;
use forum_access::utils::format_large_number;
use forum_access::ForumServices;

#[derive(Parser, Debug)]
#[command(author, version, about = "forum category access checks", long_about = None)]
struct Cli {
    /// Read forum state from a JSON snapshot instead of DATABASE_URL
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decide whether a user may perform an action on a category
    Check {
        /// 0 is the anonymous visitor
        #[arg(long, default_value_t = 0)]
        user: UserId,
        #[arg(long)]
        category: CategoryId,
        #[arg(long, default_value = "read")]
        action: String,
    },
    /// List the categories a category presents
    Channels {
        #[arg(long)]
        category: CategoryId,
        #[arg(long, default_value_t = 0)]
        user: UserId,
        #[arg(long, default_value = "none")]
        action: String,
    },
    /// Aggregated counters of a category
    Stats {
        #[arg(long)]
        category: CategoryId,
        #[arg(long, default_value_t = 0)]
        user: UserId,
    },
    /// Apply pending migrations to DATABASE_URL
    Migrate,
}

impl Commands {
    fn user(&self) -> UserId {
        match self {
            Commands::Check { user, .. } | Commands::Channels { user, .. } | Commands::Stats { user, .. } => *user,
            Commands::Migrate => 0,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    if let Commands::Migrate = cli.command {
        db::init().await?;
        println!("Migrations applied");
        return Ok(());
    }

    let config = ForumConfig::from_env()?;
    let snapshot = load_snapshot(cli.fixture.as_deref(), config).await?;
    let myself = resolve_user(&snapshot, cli.command.user());
    let services = snapshot.into_services()?;

    match run(&services, myself, &cli.command) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            if err.is_internal() {
                tracing::error!(error = %err, "command failed");
            }
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
            std::process::exit(1);
        }
    }
}

async fn load_snapshot(fixture: Option<&Path>, config: ForumConfig) -> anyhow::Result<Snapshot> {
    if let Some(path) = fixture {
        return Snapshot::from_json_file(path).with_context(|| format!("failed to load {}", path.display()));
    }

    let pool = db::init().await?;
    let snapshot = SqliteForumStore::new(pool)
        .load_snapshot(config)
        .await
        .context("failed to load forum state")?;
    Ok(snapshot)
}

fn resolve_user(snapshot: &Snapshot, id: UserId) -> User {
    snapshot
        .users
        .iter()
        .find(|user| user.id == id)
        .cloned()
        .unwrap_or_else(|| if id == 0 { User::guest() } else { User::new(id, "") })
}

fn run(services: &ForumServices, myself: User, command: &Commands) -> AppResult<Value> {
    let forum = services.session(myself.clone());

    match command {
        Commands::Check { category, action, .. } => {
            let category = forum.category(*category)?;
            let outcome = forum.try_authorise(&category, action, &myself)?;
            let allowed = forum.is_authorised(&category, action, &myself)?;
            Ok(json!({
                "category": category.id,
                "user": myself.id,
                "action": action,
                "allowed": allowed,
                "result": outcome,
            }))
        }
        Commands::Channels { category, action, .. } => {
            let category = forum.category(*category)?;
            let channels: Vec<Value> = forum
                .channels(&category, action)?
                .iter()
                .map(|channel| json!({ "id": channel.id, "name": channel.name }))
                .collect();
            Ok(json!({
                "category": category.id,
                "action": action,
                "channels": channels,
            }))
        }
        Commands::Stats { category, .. } => {
            let category = forum.category(*category)?;
            let aggregate = forum.build_info(&category)?;
            let new_topic = forum.new_topic_category(&category)?;
            Ok(json!({
                "category": category.id,
                "name": category.name,
                "state": category.state(),
                "section": forum.is_section(&category)?,
                "topics": aggregate.topics,
                "posts": aggregate.posts,
                "replies": aggregate.replies(),
                "topics_display": format_large_number(aggregate.topics, 3),
                "posts_display": format_large_number(aggregate.posts, 3),
                "last_category": aggregate.last_category.id,
                "new_topic_category": new_topic.and_then(|c| c.id),
            }))
        }
        Commands::Migrate => Ok(Value::Null),
    }
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    // stdout carries the JSON report
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
