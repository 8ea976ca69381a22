//! shelfscout CLI: find a book and the nearest shelf it sits on.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use shelfscout::cache::ResultCache;
use shelfscout::config::ScoutConfig;
use shelfscout::model::{CoverSize, LocationHint};
use shelfscout::paths::ScoutPaths;
use shelfscout::pipeline::{DetailState, PipelineController};
use shelfscout::shelf::ShelfOutcome;

#[derive(Parser)]
#[command(name = "shelfscout", version, about = "Find a book, then the shelf it sits on")]
struct Cli {
    /// Config file (defaults to the XDG config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the search result cache.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Do not read or write the search result cache.
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to look for holdings.
#[derive(clap::Args)]
struct LocationArgs {
    /// Coordinates as "LAT,LON".
    #[arg(long, value_parser = parse_near, conflicts_with = "place")]
    near: Option<LocationHint>,

    /// A place name, e.g. "Portland, OR".
    #[arg(long)]
    place: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the catalog by title or author.
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Search, pick a result, and list libraries holding it.
    Locate {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Which search result to use (1-based).
        #[arg(long, default_value = "1")]
        pick: usize,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// As `locate`, then render the shelf for one holding to an image file.
    Shelf {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Which search result to use (1-based).
        #[arg(long, default_value = "1")]
        pick: usize,

        /// Which holding to render (1-based).
        #[arg(long, default_value = "1")]
        holding: usize,

        /// Output file (defaults to `shelf-<holding>.<ext>`).
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Inspect the search result cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or initialize the configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached queries.
    List,
    /// Remove every cached query.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn parse_near(s: &str) -> std::result::Result<LocationHint, String> {
    LocationHint::parse_coordinates(s)
        .ok_or_else(|| format!("expected \"LAT,LON\" in degrees, got \"{s}\""))
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut paths = ScoutPaths::resolve()?;
    if let Some(dir) = cli.cache_dir.clone() {
        paths = paths.with_cache_dir(dir);
    }
    if !cli.no_cache {
        paths.ensure_dirs()?;
    }
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = ScoutConfig::load_or_default(&config_path)?;

    let open_cache = || {
        if cli.no_cache {
            ResultCache::in_memory()
        } else {
            ResultCache::open(&paths.cache_file())
        }
    };

    match cli.command {
        Commands::Search { query } => {
            let mut pipeline = PipelineController::from_config(&config, open_cache());
            let query = query.join(" ");
            let books = pipeline.search(&query)?;
            if books.is_empty() {
                println!("{}", shelfscout::error::ErrorKind::NoMatches.user_message());
            } else {
                print_books(&pipeline);
            }
        }

        Commands::Locate {
            query,
            pick,
            location,
        } => {
            let mut pipeline = PipelineController::from_config(&config, open_cache());
            apply_location(&mut pipeline, location);
            locate(&mut pipeline, &query.join(" "), pick)?;
        }

        Commands::Shelf {
            query,
            pick,
            holding,
            out,
            location,
        } => {
            let mut pipeline = PipelineController::from_config(&config, open_cache());
            apply_location(&mut pipeline, location);
            if locate(&mut pipeline, &query.join(" "), pick)? != DetailState::HoldingsReady {
                return Ok(());
            }

            let index = holding.saturating_sub(1);
            match pipeline.request_shelf_view(index)? {
                ShelfOutcome::Generated(image) | ShelfOutcome::Memoized(image) => {
                    let out = out.unwrap_or_else(|| {
                        PathBuf::from(format!("shelf-{holding}.{}", image.file_extension()))
                    });
                    std::fs::write(&out, &image.bytes).into_diagnostic()?;
                    println!("\nShelf view written to {}", out.display());
                }
                ShelfOutcome::Busy | ShelfOutcome::Stale => {
                    println!("\nShelf view not generated; try again.");
                }
            }
        }

        Commands::Cache { action } => {
            let cache = ResultCache::open(&paths.cache_file());
            match action {
                CacheAction::List => {
                    if cache.is_empty() {
                        println!("No cached queries.");
                    } else {
                        println!("Cached queries ({}):", cache.len());
                        for key in cache.keys() {
                            let count = cache.lookup(&key).map(|b| b.len()).unwrap_or(0);
                            println!("  \"{key}\" ({count} results)");
                        }
                    }
                }
                CacheAction::Clear => {
                    let count = cache.len();
                    cache.clear()?;
                    println!("Cleared {count} cached queries.");
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    miette::bail!(
                        "config file already exists: {} (pass --force to overwrite it)",
                        config_path.display()
                    );
                }
                ScoutConfig::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
        },
    }

    Ok(())
}

fn apply_location(pipeline: &mut PipelineController, args: LocationArgs) {
    if let Some(hint) = args.near {
        pipeline.set_location(hint);
    } else if let Some(place) = args.place {
        pipeline.set_location(LocationHint::Named(place));
    }
}

/// Search, select the `pick`th result, and print its holdings.
fn locate(pipeline: &mut PipelineController, query: &str, pick: usize) -> Result<DetailState> {
    let books = pipeline.search(query)?;
    if books.is_empty() {
        println!("{}", shelfscout::error::ErrorKind::NoMatches.user_message());
        return Ok(DetailState::HoldingsEmpty);
    }

    let detail = pipeline.open_book(pick.saturating_sub(1))?;
    let session = pipeline.session();
    if let Some(book) = &session.selection {
        println!("{book}");
        if let Some(url) = book.cover_url(CoverSize::Large) {
            println!("  cover: {url}");
        }
        println!("  near:  {}", pipeline.location());
    }

    match detail {
        DetailState::HoldingsReady => {
            println!("\nHoldings ({}):", session.holdings.len());
            for (i, h) in session.holdings.iter().enumerate() {
                println!("  {}. {} [{}]", i + 1, h.library, h.availability);
                println!("     address:     {}", h.address);
                println!("     call number: {}", h.call_number);
                println!("     directions:  {}", h.directions);
                if let Some(site) = &h.website {
                    println!("     website:     {site}");
                }
            }
        }
        _ => println!("\nNo nearby library holdings found."),
    }

    if !session.citations.is_empty() {
        println!("\nSources:");
        for c in &session.citations {
            println!("  - {} <{}>", c.title, c.uri);
        }
    }
    Ok(detail)
}

fn print_books(pipeline: &PipelineController) {
    let books = &pipeline.session().books;
    println!("Results ({}):", books.len());
    for (i, book) in books.iter().enumerate() {
        println!("  {}. {book}", i + 1);
        if let Some(url) = book.cover_url(CoverSize::Medium) {
            println!("     cover: {url}");
        }
    }
}
