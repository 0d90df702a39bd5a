//! CLI binary for rankwatch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rankwatch::{RankStore, RunOrchestrator, RunReport, RunScope, TaskRunner, TrackerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Track search-engine ranks for SEO keywords and collect affiliate links.
#[derive(Parser)]
#[command(name = "rankwatch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "RANKWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path from the configuration.
    #[arg(long, env = "RANKWATCH_DB")]
    db: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Write a default config file (if missing) and create the database.
    Init,

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage keywords.
    #[command(subcommand)]
    Keyword(KeywordCommand),

    /// List the keywords of a project.
    Keywords {
        /// Project id.
        project: i64,
    },

    /// Run rank tracking for every keyword of a project.
    Track {
        /// Project id.
        project: i64,
        /// Ranks to keep and scan for links. Defaults to `default_max_rank`.
        #[arg(long)]
        max_rank: Option<u32>,
    },

    /// Run rank tracking for one keyword.
    TrackKeyword {
        /// Keyword id.
        keyword: i64,
        /// Ranks to keep and scan for links. Defaults to the keyword's own.
        #[arg(long)]
        max_rank: Option<u32>,
    },

    /// List runs, newest first.
    Runs {
        /// Only runs of this project.
        #[arg(long)]
        project: Option<i64>,
    },

    /// Show the results of a run.
    Results {
        /// Run id.
        run: i64,
        /// Include affiliate links under each row.
        #[arg(long)]
        links: bool,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project.
    Add {
        /// Project name.
        name: String,
    },
    /// List projects.
    List,
}

#[derive(Subcommand)]
enum KeywordCommand {
    /// Add a keyword to a project.
    Add {
        /// Project id.
        project: i64,
        /// Keyword text.
        text: String,
        /// How deep this keyword is searched.
        #[arg(long)]
        max_rank: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Users can override with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rankwatch=info,rank_search=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(TrackerConfig::default_config_path);
    let mut config = TrackerConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    config.validate()?;

    match cli.command {
        Command::Init => init(&config, &config_path),
        Command::Project(cmd) => project(&config, cmd),
        Command::Keyword(cmd) => keyword(&config, cmd),
        Command::Keywords { project } => list_keywords(&config, project),
        Command::Track { project, max_rank } => {
            let max_rank = max_rank.unwrap_or(config.default_max_rank);
            track(&config, RunScope::Project(project), max_rank).await
        }
        Command::TrackKeyword { keyword, max_rank } => {
            let store = open_store(&config)?;
            let max_rank = match max_rank {
                Some(m) => m,
                None => store.get_keyword(keyword)?.max_rank,
            };
            drop(store);
            track(&config, RunScope::Keyword(keyword), max_rank).await
        }
        Command::Runs { project } => list_runs(&config, project),
        Command::Results { run, links, json } => show_results(&config, run, links, json),
        Command::Config => show_config(&config),
    }
}

fn open_store(config: &TrackerConfig) -> anyhow::Result<RankStore> {
    let path = &config.database.path;
    RankStore::open(path).with_context(|| format!("opening database {}", path.display()))
}

fn init(config: &TrackerConfig, config_path: &std::path::Path) -> anyhow::Result<()> {
    if config_path.exists() {
        println!("config: {} (exists)", config_path.display());
    } else {
        config.save_to_file(config_path)?;
        println!("config: {} (written)", config_path.display());
    }
    let store = open_store(config)?;
    println!(
        "database: {} (schema v{})",
        config.database.path.display(),
        store.schema_version()?.unwrap_or(0)
    );
    Ok(())
}

fn project(config: &TrackerConfig, cmd: ProjectCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match cmd {
        ProjectCommand::Add { name } => {
            let project = store.create_project(&name)?;
            println!("project {} created: {}", project.id, project.name);
        }
        ProjectCommand::List => {
            for p in store.list_projects()? {
                println!("{:>5}  {}", p.id, p.name);
            }
        }
    }
    Ok(())
}

fn keyword(config: &TrackerConfig, cmd: KeywordCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match cmd {
        KeywordCommand::Add {
            project,
            text,
            max_rank,
        } => {
            let kw = store.add_keyword(
                project,
                &text,
                max_rank.unwrap_or(config.default_max_rank),
            )?;
            println!("keyword {} added: {} (max rank {})", kw.id, kw.text, kw.max_rank);
        }
    }
    Ok(())
}

fn list_keywords(config: &TrackerConfig, project: i64) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.get_project(project)?;
    for kw in store.list_keywords(project)? {
        let volume = kw
            .search_volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:>5}  {:<40} max {:>3}  volume {}", kw.id, kw.text, kw.max_rank, volume);
    }
    Ok(())
}

async fn track(config: &TrackerConfig, scope: RunScope, max_rank: u32) -> anyhow::Result<()> {
    let store = Arc::new(open_store(config)?);
    let orchestrator = Arc::new(RunOrchestrator::from_config(Arc::clone(&store), config)?);
    let runner = TaskRunner::from_config(Arc::clone(&orchestrator), &config.tasks);

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, finishing in-flight keywords...");
            cancel.cancel();
        }
    });

    let run = orchestrator.create_run(scope, max_rank)?;
    println!("run {} started ({} ranks)", run.id, max_rank);
    let report = runner.execute(run.id).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "run {}: {} (recorded {}, degraded {}, failed {}, skipped {})",
        report.run_id,
        report.status,
        report.recorded(),
        report.degraded(),
        report.failed(),
        report.skipped()
    );
}

fn list_runs(config: &TrackerConfig, project: Option<i64>) -> anyhow::Result<()> {
    let store = open_store(config)?;
    for run in store.list_runs(project)? {
        let executed = chrono::DateTime::from_timestamp(run.executed_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:>5}  project {:>4}  {:<8} {:<9} max {:>3}  {}{}",
            run.id,
            run.project_id,
            run.scope.kind_str(),
            run.status,
            run.max_rank,
            executed,
            run.error.map(|e| format!("  ({e})")).unwrap_or_default()
        );
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ResultView {
    keyword_id: i64,
    rank: u32,
    site: String,
    url: String,
    title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<rankwatch::store::AffiliateLink>,
}

fn show_results(config: &TrackerConfig, run_id: i64, links: bool, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let run = store.get_run(run_id)?;

    let mut views = Vec::new();
    for row in store.results_for_run(run_id)? {
        let site = store.media_site(row.media_site_id)?;
        let row_links = if links {
            store.links_for_result(row.id)?
        } else {
            Vec::new()
        };
        views.push(ResultView {
            keyword_id: row.keyword_id,
            rank: row.rank,
            site: site.name,
            url: row.page_url,
            title: row.title,
            links: row_links,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("run {} ({})", run.id, run.status);
    for v in &views {
        println!("{:>5} {:>4}  {:<30} {}", v.keyword_id, v.rank, v.site, v.url);
        for link in &v.links {
            println!("            {} -> {} [{}]", link.asp_name, link.link_url, link.product_name);
        }
    }
    Ok(())
}

fn show_config(config: &TrackerConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.search.google_api_key.is_some() {
        shown.search.google_api_key = Some("********".into());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
