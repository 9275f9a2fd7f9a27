//! Command-line front end for the snippet catalog.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use codeshelf::views::{render_detail, snippet_table};
use codeshelf::{
    AdminError, App, AppConfig, Category, CollectionKind, ConfigError, DocumentId, Notification,
    NotificationLevel, PluginType, SnippetFilter, StoreError, SyncState, ValidationError,
};
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "codeshelf", about = "Browse and manage code snippets", version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "codeshelf.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List snippets, newest first
    List {
        /// List scraping snippets
        #[arg(long)]
        scraping: bool,
        /// Case-insensitive title search
        #[arg(long)]
        search: Option<String>,
        /// Category, or "All"
        #[arg(long)]
        category: Option<String>,
        /// Plugin subtype (ESM, CJS), or "All"
        #[arg(long)]
        plugin_type: Option<String>,
    },

    /// Show one snippet with its code
    Show {
        id: String,
        /// "scraping" to look in the scraping collection
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// Upload a snippet
    Upload {
        /// Admin email
        #[arg(long = "as")]
        author: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Code text
        #[arg(long, conflicts_with = "code_file", required_unless_present = "code_file")]
        code: Option<String>,
        /// Read the code from a .js file
        #[arg(long)]
        code_file: Option<PathBuf>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        plugin_type: Option<String>,
        #[arg(long)]
        watermark: Option<String>,
        /// Upload to the scraping collection
        #[arg(long)]
        scraping: bool,
    },

    /// Delete a snippet
    Delete {
        /// Admin email
        #[arg(long = "as")]
        author: String,
        id: String,
        #[arg(long)]
        scraping: bool,
    },

    /// Record a page view and print the total
    Visit,

    /// Print dashboard counts
    Stats,

    /// Compact the store journal
    Compact,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("Catalog unavailable: {0}")]
    Catalog(String),
}

impl From<ValidationError> for CliError {
    fn from(e: ValidationError) -> Self {
        CliError::Admin(AdminError::Validation(e))
    }
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Admin(AdminError::Unauthenticated) => 3,
            CliError::Admin(AdminError::Validation(_)) => 4,
            CliError::Store(e) | CliError::Admin(AdminError::Store(e)) if e.is_not_found() => 5,
            _ => 1,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = AppConfig::load_or_default(&cli.config)
        .map_err(CliError::from)
        .and_then(|config| {
            init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));
            run(&cli, config)
        });

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn kind_for(scraping: bool) -> CollectionKind {
    if scraping {
        CollectionKind::Scraping
    } else {
        CollectionKind::Snippets
    }
}

fn run(cli: &Cli, config: AppConfig) -> Result<(), CliError> {
    let app = App::start(config)?;
    debug!(config = %cli.config.display(), "store opened");

    let result = execute(&app, &cli.command);
    app.stop();
    result
}

fn execute(app: &App, command: &Command) -> Result<(), CliError> {
    match command {
        Command::List {
            scraping,
            search,
            category,
            plugin_type,
        } => {
            let consumer = app.open_catalog(kind_for(*scraping));
            if consumer.state() == SyncState::Error {
                let reason = consumer.error().map(|e| e.to_string()).unwrap_or_default();
                return Err(CliError::Catalog(reason));
            }

            let mut filter = SnippetFilter::new();
            if let Some(search) = search {
                filter = filter.with_search(search.as_str());
            }
            if let Some(category) = category {
                filter = filter.with_category(category.as_str());
            }
            if let Some(plugin_type) = plugin_type {
                filter = filter.with_plugin_type(plugin_type.as_str());
            }

            let results = filter.apply(consumer.snapshot().entries());
            println!("{}", snippet_table(&results));
            Ok(())
        }

        Command::Show { id, kind } => {
            let kind = CollectionKind::from_type_param(kind.as_deref());
            let snippet = app.snippet(kind, &DocumentId::new(id.as_str()))?;
            print!("{}", render_detail(&snippet));
            Ok(())
        }

        Command::Upload {
            author,
            title,
            description,
            code,
            code_file,
            language,
            category,
            plugin_type,
            watermark,
            scraping,
        } => {
            let kind = kind_for(*scraping);
            let session = app.sign_in(author)?;

            let mut form = codeshelf::SnippetForm {
                title: title.clone(),
                description: description.clone(),
                code: code.clone().unwrap_or_default(),
                watermark: watermark.clone().unwrap_or_default(),
                ..Default::default()
            };
            if let Some(language) = language {
                form.language = language.clone();
            }
            match category {
                Some(category) => form.set_category(Category::from(category.as_str())),
                None => {
                    if let Some(first) = kind.categories().into_iter().next() {
                        form.set_category(first);
                    }
                }
            }
            if let Some(plugin_type) = plugin_type {
                form.plugin_type = Some(PluginType::from(plugin_type.as_str()));
            }
            if let Some(path) = code_file {
                form.load_code_file(path)?;
            }

            let result = app.admin().submit_create(Some(&session), kind, &form);
            let notice = Notification::from_create(&result);
            let id = result?;
            println!("{} ({id})", notice.message);
            Ok(())
        }

        Command::Delete {
            author,
            id,
            scraping,
        } => {
            let session = app.sign_in(author)?;
            let result =
                app.admin()
                    .submit_delete(Some(&session), kind_for(*scraping), &DocumentId::new(id.as_str()));
            let notice = Notification::from_delete(&result);
            if notice.level == NotificationLevel::Error {
                eprintln!("{}", notice.message);
            }
            result?;
            println!("{}", notice.message);
            Ok(())
        }

        Command::Visit => {
            app.visitors().record_visit()?;
            let count = app.visitors().count()?;
            println!("{} visitors", codeshelf::format_compact(count));
            Ok(())
        }

        Command::Stats => {
            println!("{}", app.dashboard_stats()?.table());
            Ok(())
        }

        Command::Compact => {
            app.compact()?;
            println!("Journal compacted");
            Ok(())
        }
    }
}
