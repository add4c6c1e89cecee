//! bits-cli: browse and record moments on the Bits timeline
//!
//! # Subcommands
//! - `timeline [filters] [--pages N] [--json]`: month-grouped, newest first
//! - `add <text>` / `edit <id>` / `delete <id> --yes`: bit writes
//! - `children list|add|edit|remove`: child profiles
//! - `milestones list|add`: named milestones
//! - `transcribe <file>`: speech-to-text for a voice note
//! - `whoami`: signed-in user
//!
//! Talks to the hosted backend by default, or straight to Postgres with
//! `--backend postgres`.

mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use bits_core::config::BitsConfig;
use bits_core::feed::PAGE_SIZE;
use bits_core::filter::BitFilter;
use bits_core::models::{BitPatch, ChildPatch, NewBit, NewChild, PhotoUpload};
use bits_core::store::{BitStore, ChildStore, Identity, MilestoneStore, PhotoStore, Transcriber};
use bits_core::{
    BitMutations, CacheVersion, ChildService, FsPhotoStore, MilestoneService, PgStore,
    RestBackend, RestConfig, Timeline,
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "bits-cli", version, about = "Bits memory timeline")]
struct Cli {
    #[arg(short, long, env = "BITS_CONFIG", default_value = "bits.toml")]
    config: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Hosted)]
    backend: BackendKind,

    /// Access token of the signed-in user (hosted backend)
    #[arg(long, env = "BITS_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Owner of the rows (postgres backend, overrides `database.owner_id`)
    #[arg(long, env = "BITS_OWNER_ID")]
    owner: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Hosted,
    Postgres,
}

#[derive(Debug, clap::Args)]
struct FilterArgs {
    /// Case-insensitive text search
    #[arg(short, long)]
    search: Option<String>,

    #[arg(long)]
    child: Option<Uuid>,

    /// Earliest recording day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest recording day (YYYY-MM-DD, inclusive)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Only bits with a photo
    #[arg(long, conflicts_with = "no_photos")]
    photos: bool,

    /// Only bits without a photo
    #[arg(long)]
    no_photos: bool,
}

impl FilterArgs {
    fn into_filter(self) -> BitFilter {
        let has_photo = match (self.photos, self.no_photos) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        BitFilter {
            search_text: self.search,
            child_id: self.child,
            date_from: self.from,
            date_to: self.to,
            has_photo,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the timeline grouped by month
    Timeline {
        #[command(flatten)]
        filter: FilterArgs,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// Load every page
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Record a new bit
    Add {
        text: String,

        #[arg(long)]
        child: Option<Uuid>,

        #[arg(long)]
        context: Option<String>,

        /// Day the moment happened (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// JPEG or PNG file to attach
        #[arg(long)]
        photo: Option<PathBuf>,
    },

    /// Edit an existing bit
    Edit {
        id: Uuid,

        #[arg(long)]
        text: Option<String>,

        #[arg(long, conflicts_with = "clear_child")]
        child: Option<Uuid>,

        #[arg(long)]
        clear_child: bool,

        #[arg(long, conflicts_with = "clear_context")]
        context: Option<String>,

        #[arg(long)]
        clear_context: bool,

        #[arg(long)]
        date: Option<NaiveDate>,

        /// Replace the photo
        #[arg(long)]
        photo: Option<PathBuf>,
    },

    /// Delete a bit
    Delete {
        id: Uuid,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Manage child profiles
    Children {
        #[command(subcommand)]
        command: ChildCommands,
    },

    /// Manage milestones
    Milestones {
        #[command(subcommand)]
        command: MilestoneCommands,
    },

    /// Transcribe a recorded voice note
    Transcribe { file: PathBuf },

    /// Show the signed-in user
    Whoami,
}

#[derive(Debug, Subcommand)]
enum ChildCommands {
    List,
    Add {
        name: String,

        /// YYYY-MM-DD
        #[arg(long)]
        birthdate: NaiveDate,

        /// Palette name (e.g. "Teal") or a raw color value
        #[arg(long)]
        color: Option<String>,
    },
    Edit {
        id: Uuid,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        birthdate: Option<NaiveDate>,

        #[arg(long)]
        color: Option<String>,
    },
    Remove {
        id: Uuid,

        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum MilestoneCommands {
    List,
    Add { name: String },
}

// ============================================================================
// Wiring
// ============================================================================

struct App {
    bits: Arc<dyn BitStore>,
    children: Arc<dyn ChildStore>,
    milestones: Arc<dyn MilestoneStore>,
    photos: Arc<dyn PhotoStore>,
    identity: Arc<dyn Identity>,
    version: CacheVersion,
    config: BitsConfig,
    token: Option<String>,
}

impl App {
    async fn connect(cli: &Cli, config: BitsConfig) -> anyhow::Result<Self> {
        let version = CacheVersion::new();
        match cli.backend {
            BackendKind::Hosted => {
                let rest = Arc::new(RestBackend::new(RestConfig::from_backend(
                    &config.backend,
                    cli.token.clone(),
                ))?);
                Ok(Self {
                    bits: rest.clone(),
                    children: rest.clone(),
                    milestones: rest.clone(),
                    photos: rest.clone(),
                    identity: rest,
                    version,
                    config,
                    token: cli.token.clone(),
                })
            }
            BackendKind::Postgres => {
                let db = config
                    .database
                    .clone()
                    .context("--backend postgres needs a [database] section")?;
                let owner = cli
                    .owner
                    .or(db.owner_id)
                    .context("--backend postgres needs --owner or database.owner_id")?;

                let pool = bits_core::db::create_pool(&db).await?;
                let server_version = bits_core::db::health_check(&pool).await?;
                tracing::debug!(version = %server_version, "PostgreSQL connected");

                let store = Arc::new(PgStore::new(pool, owner));
                store.ensure_schema().await?;
                let photos = Arc::new(FsPhotoStore::new(&db.photo_dir));
                tracing::debug!(
                    owner = %store.owner(),
                    photo_dir = %photos.root().display(),
                    "Using direct database store"
                );
                Ok(Self {
                    bits: store.clone(),
                    children: store.clone(),
                    milestones: store.clone(),
                    photos,
                    identity: store,
                    version,
                    config,
                    token: cli.token.clone(),
                })
            }
        }
    }

    fn mutations(&self) -> BitMutations {
        BitMutations::new(
            self.bits.clone(),
            self.photos.clone(),
            self.identity.clone(),
            self.version.clone(),
        )
    }

    fn child_service(&self) -> ChildService {
        ChildService::new(
            self.children.clone(),
            self.identity.clone(),
            self.version.clone(),
        )
    }

    fn milestone_service(&self) -> MilestoneService {
        MilestoneService::new(self.milestones.clone(), self.identity.clone())
    }

    /// Transcription always goes through the hosted functions endpoint.
    fn transcriber(&self) -> anyhow::Result<Arc<dyn Transcriber>> {
        let rest = RestBackend::new(RestConfig::from_backend(
            &self.config.backend,
            self.token.clone(),
        ))?;
        Ok(Arc::new(rest))
    }
}

async fn read_photo(path: &Path) -> anyhow::Result<PhotoUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    Ok(PhotoUpload::from_file_name(name, bytes)?)
}

// ============================================================================
// Commands
// ============================================================================

async fn do_timeline(
    app: &App,
    filter: BitFilter,
    pages: usize,
    all: bool,
    json: bool,
) -> anyhow::Result<()> {
    let timeline = Timeline::new(app.bits.clone(), app.version.clone(), PAGE_SIZE);
    timeline.set_filter(filter).await?;

    let mut loaded = 1;
    while (all || loaded < pages) && timeline.has_more().await {
        timeline.load_more().await?;
        loaded += 1;
    }

    let groups = timeline.groups().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    let bits = timeline.bits().await;
    if bits.is_empty() {
        eprintln!("No bits found");
        return Ok(());
    }
    print!("{}", render::render_groups(&groups));
    println!(
        "{}",
        render::footer(bits.len(), timeline.total_count().await, timeline.has_more().await)
    );
    Ok(())
}

async fn do_children(app: &App, command: ChildCommands) -> anyhow::Result<()> {
    let service = app.child_service();
    let today = Utc::now().date_naive();
    match command {
        ChildCommands::List => {
            let children = service.list().await?;
            if children.is_empty() {
                eprintln!("No children yet");
            }
            for child in &children {
                println!("{}", render::render_child(child, today));
            }
        }
        ChildCommands::Add {
            name,
            birthdate,
            color,
        } => {
            let child = service
                .create(NewChild {
                    name,
                    birthdate: Some(birthdate),
                    color: color.as_deref().map(render::resolve_color),
                })
                .await?;
            println!("{}", render::render_child(&child, today));
        }
        ChildCommands::Edit {
            id,
            name,
            birthdate,
            color,
        } => {
            service
                .update(
                    id,
                    ChildPatch {
                        name,
                        birthdate,
                        color: color.as_deref().map(render::resolve_color),
                    },
                )
                .await?;
            println!("Updated {}", id);
        }
        ChildCommands::Remove { id, yes } => {
            if !yes {
                bail!("refusing to remove {} without --yes (their bits are kept)", id);
            }
            service.delete(id).await?;
            println!("Removed {}", id);
        }
    }
    Ok(())
}

async fn do_milestones(app: &App, command: MilestoneCommands) -> anyhow::Result<()> {
    let service = app.milestone_service();
    match command {
        MilestoneCommands::List => {
            for milestone in service.list().await? {
                println!("{}", milestone.name);
            }
        }
        MilestoneCommands::Add { name } => {
            let milestone = service.create(&name).await?;
            println!("Added milestone '{}'", milestone.name);
        }
    }
    Ok(())
}

async fn run(cli: Cli, config: BitsConfig) -> anyhow::Result<()> {
    let app = App::connect(&cli, config).await?;

    match cli.command {
        Commands::Timeline {
            filter,
            pages,
            all,
            json,
        } => do_timeline(&app, filter.into_filter(), pages.max(1), all, json).await,

        Commands::Add {
            text,
            child,
            context,
            date,
            photo,
        } => {
            let photo = match photo {
                Some(path) => Some(read_photo(&path).await?),
                None => None,
            };
            let bit = app
                .mutations()
                .create(NewBit {
                    text,
                    child_id: child,
                    context,
                    bit_date: date,
                    photo,
                })
                .await?;
            println!("{}", render::render_bit(&bit));
            Ok(())
        }

        Commands::Edit {
            id,
            text,
            child,
            clear_child,
            context,
            clear_context,
            date,
            photo,
        } => {
            let photo = match photo {
                Some(path) => Some(read_photo(&path).await?),
                None => None,
            };
            let patch = BitPatch {
                text,
                child_id: if clear_child { Some(None) } else { child.map(Some) },
                context: if clear_context {
                    Some(None)
                } else {
                    context.map(Some)
                },
                bit_date: date,
                photo,
            };
            app.mutations().update(id, patch).await?;
            println!("Updated {}", id);
            Ok(())
        }

        Commands::Delete { id, yes } => {
            if !yes {
                bail!("refusing to delete {} without --yes", id);
            }
            app.mutations().delete(id).await?;
            println!("Deleted {}", id);
            Ok(())
        }

        Commands::Children { command } => do_children(&app, command).await,

        Commands::Milestones { command } => do_milestones(&app, command).await,

        Commands::Transcribe { file } => {
            let audio = tokio::fs::read(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let text = app.transcriber()?.transcribe(&audio).await?;
            println!("{}", text);
            Ok(())
        }

        Commands::Whoami => {
            match app.identity.current_user_id().await? {
                Some(id) => println!("{}", id),
                None => println!("Not signed in"),
            }
            Ok(())
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Load .env file if present (dev convenience)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match BitsConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("bits-cli: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), &config.service.log_level))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config).await {
        eprintln!("bits-cli: {:#}", e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` when set, otherwise the configured level (INFO if unparseable).
fn log_filter(rust_log: Option<&str>, configured: &str) -> EnvFilter {
    match rust_log.filter(|s| !s.trim().is_empty()) {
        Some(directives) => EnvFilter::new(directives),
        None => {
            let level = configured
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::INFO);
            EnvFilter::new(level.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: photo flags map onto the tri-state filter
    // ========================================================================
    #[test]
    fn test_photo_flags_map_to_filter() {
        let cli = Cli::parse_from(["bits-cli", "timeline", "--no-photos", "-s", "park"]);
        let Commands::Timeline { filter, .. } = cli.command else {
            panic!("expected timeline command");
        };
        let filter = filter.into_filter();
        assert_eq!(filter.has_photo, Some(false));
        assert_eq!(filter.search_text.as_deref(), Some("park"));

        let cli = Cli::parse_from(["bits-cli", "timeline"]);
        let Commands::Timeline { filter, pages, .. } = cli.command else {
            panic!("expected timeline command");
        };
        assert!(filter.into_filter().is_empty());
        assert_eq!(pages, 1);
    }

    // ========================================================================
    // TEST 2: conflicting photo flags are rejected
    // ========================================================================
    #[test]
    fn test_conflicting_photo_flags_rejected() {
        let result = Cli::try_parse_from(["bits-cli", "timeline", "--photos", "--no-photos"]);
        assert!(result.is_err());
    }

    // ========================================================================
    // TEST 3: dates parse as calendar days
    // ========================================================================
    #[test]
    fn test_date_range_args() {
        let cli = Cli::parse_from([
            "bits-cli", "timeline", "--from", "2024-03-01", "--to", "2024-03-31",
        ]);
        let Commands::Timeline { filter, .. } = cli.command else {
            panic!("expected timeline command");
        };
        let filter = filter.into_filter();
        assert_eq!(filter.date_from, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(filter.date_to, NaiveDate::from_ymd_opt(2024, 3, 31));
    }

    // ========================================================================
    // TEST 4: backend selection defaults to hosted
    // ========================================================================
    #[test]
    fn test_backend_selection() {
        let cli = Cli::parse_from(["bits-cli", "whoami"]);
        assert_eq!(cli.backend, BackendKind::Hosted);
        let cli = Cli::parse_from(["bits-cli", "--backend", "postgres", "whoami"]);
        assert_eq!(cli.backend, BackendKind::Postgres);
    }

    // ========================================================================
    // TEST 5: edit can clear the child association
    // ========================================================================
    #[test]
    fn test_edit_clear_child_conflicts_with_child() {
        let id = Uuid::nil().to_string();
        let child = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from([
            "bits-cli", "edit", id.as_str(), "--child", child.as_str(), "--clear-child",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["bits-cli", "edit", id.as_str(), "--clear-child"]).is_ok());
    }

    // ========================================================================
    // TEST 6: RUST_LOG overrides the configured level
    // ========================================================================
    #[test]
    fn test_log_filter_prefers_rust_log() {
        use tracing::level_filters::LevelFilter;

        let hint = |rust_log, configured| log_filter(rust_log, configured).max_level_hint();
        assert_eq!(hint(Some("warn"), "debug"), Some(LevelFilter::WARN));
        assert_eq!(hint(None, "debug"), Some(LevelFilter::DEBUG));
        assert_eq!(hint(Some(" "), "trace"), Some(LevelFilter::TRACE));
        assert_eq!(hint(None, "loud"), Some(LevelFilter::INFO));
    }
}
