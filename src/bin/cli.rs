use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use lib::api::spotify::SpotifyProvider;
use lib::api::Catalog;
use lib::config::Config;
use lib::jobs::JobRegistry;
use lib::models::{MatchOutcome, SyncOutcome};
use lib::server::AppState;
use lib::setlist::SetlistFmClient;
use lib::worker::{PlaylistTarget, SyncRequest};
use setlist_playlist_sync as lib;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "setlist-sync", version, about = "Add setlist.fm songs to a Spotify playlist.")]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add the songs of one setlist (or a file of setlists) to a playlist
    Sync {
        /// Single setlist.fm URL or setlist id
        #[arg(long, conflicts_with = "file")]
        setlist: Option<String>,

        /// Text file with one setlist.fm URL per line
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Existing Spotify playlist URL, URI or id
        #[arg(long, conflicts_with = "new_playlist")]
        playlist: Option<String>,

        /// Create a new playlist (named "<artist> Setlist" when NAME is omitted)
        #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "")]
        new_playlist: Option<String>,

        /// Description for a newly created playlist
        #[arg(long)]
        description: Option<String>,
    },
    /// Search setlist.fm by artist and city
    SearchSetlists {
        #[arg(long)]
        artist: String,
        #[arg(long)]
        city: String,
    },
    /// Serve the HTTP front end with background sync jobs
    Serve {
        /// Listen address, overrides listen_addr from the config
        #[arg(long)]
        addr: Option<String>,
    },
    /// Auth helpers
    Auth {
        #[command(subcommand)]
        sub: AuthCommands,
    },
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Authorize Spotify and store tokens in DB (interactive)
    Spotify,
}

fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    // explicit --config overrides; otherwise the per-user config file if it
    // exists, otherwise built-in defaults
    match explicit {
        Some(p) => Config::from_path(p).with_context(|| format!("loading config from {}", p.display())),
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(p) => Config::from_path(&p).with_context(|| format!("loading config from {}", p.display())),
            None => Ok(Config::default()),
        },
    }
}

fn init_logging(cfg: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let _ = std::fs::create_dir_all(&cfg.log_dir);
    let file_appender: RollingFileAppender = tracing_appender::rolling::daily(&cfg.log_dir, "setlist-sync.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stdout));

    if let Err(e) = tracing_subscriber_global::set_global_default(subscriber) {
        eprintln!("failed to set global tracing subscriber: {}", e);
    }
    guard
}

fn spotify_catalog(cfg: &Config) -> Result<Arc<SpotifyProvider>> {
    let provider = SpotifyProvider::new(
        cfg.spotify_client_id.clone().unwrap_or_default(),
        cfg.spotify_client_secret.clone().unwrap_or_default(),
        cfg.db_path.clone(),
    )
    .with_max_batch(cfg.max_batch_size_spotify);
    if !provider.is_authenticated() {
        return Err(anyhow!(
            "Spotify is not authenticated. Run `setlist-sync auth spotify` first."
        ));
    }
    Ok(Arc::new(provider))
}

fn setlist_client(cfg: &Config) -> Result<Arc<SetlistFmClient>> {
    let key = cfg
        .setlistfm_api_key()
        .ok_or_else(|| anyhow!("setlist.fm API key missing: set setlistfm_api_key or SETLIST_FM_API_KEY"))?;
    Ok(Arc::new(SetlistFmClient::new(key)))
}

fn prompt(question: &str) -> Result<String> {
    print!("{} ", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn choose_target(
    playlist: Option<String>,
    new_playlist: Option<String>,
    description: Option<String>,
) -> Result<PlaylistTarget> {
    if let Some(reference) = playlist {
        return Ok(PlaylistTarget::Existing { reference });
    }
    if let Some(name) = new_playlist {
        return Ok(PlaylistTarget::New {
            name: Some(name).filter(|n| !n.is_empty()),
            description,
        });
    }
    let create = prompt("Do you want to create a new Spotify playlist? [y/N]")?;
    if create.eq_ignore_ascii_case("y") || create.eq_ignore_ascii_case("yes") {
        let name = prompt("Enter new playlist name (blank for \"<artist> Setlist\"):")?;
        let description = prompt("Playlist description:")?;
        Ok(PlaylistTarget::New {
            name: Some(name).filter(|n| !n.is_empty()),
            description: Some(description).filter(|d| !d.is_empty()),
        })
    } else {
        let reference = prompt("Enter existing Spotify playlist URL or ID:")?;
        Ok(PlaylistTarget::Existing { reference })
    }
}

/// 1-based menu choice -> index into the listed setlists.
fn pick_setlist(answer: &str, count: usize) -> Option<usize> {
    match answer.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn print_outcome(artist: &str, outcome: &SyncOutcome) {
    println!(
        "Added {} songs from {}'s setlist ({} already in playlist).",
        outcome.added_count,
        artist,
        outcome.duplicate_count()
    );
    let missing = outcome.not_found_titles();
    if !missing.is_empty() {
        println!("Not found on Spotify:");
        for title in missing {
            println!("  - {}", title);
        }
    }
}

async fn run_sync_command(
    cfg: &Config,
    setlist: Option<String>,
    file: Option<PathBuf>,
    target: PlaylistTarget,
) -> Result<()> {
    let match_cfg = cfg.match_config()?;
    let catalog = spotify_catalog(cfg)?;
    let source = setlist_client(cfg)?;
    let progress = |current: usize, total: usize, message: &str| {
        println!("[{}/{}] {}", current, total, message);
    };

    if let Some(path) = file {
        let references = lib::worker::read_setlist_refs(&path)?;
        if references.is_empty() {
            println!("No setlist URLs in {}", path.display());
            return Ok(());
        }
        let playlist_id = lib::worker::resolve_target(catalog.as_ref(), &target, "Setlist Sync").await?;
        let summary = lib::worker::run_batch(
            catalog.as_ref(),
            source.as_ref(),
            &match_cfg,
            &references,
            &playlist_id,
            &progress,
        )
        .await;
        for report in &summary.reports {
            print_outcome(&report.artist, &report.outcome);
        }
        for (reference, err) in &summary.skipped {
            println!("Skipped {}: {}", reference, err);
        }
        println!("Finished. Added {} songs in total.", summary.total_added);
        return Ok(());
    }

    let setlist = match setlist {
        Some(s) => s,
        None => prompt("Enter setlist.fm setlist URL:")?,
    };
    let request = SyncRequest { setlist, target };
    let report = lib::worker::run_sync(catalog.as_ref(), source.as_ref(), &match_cfg, &request, &progress).await?;
    print_outcome(&report.artist, &report.outcome);
    if report
        .outcome
        .results
        .iter()
        .all(|r| r.outcome == MatchOutcome::NotFound)
    {
        println!("Nothing from this setlist could be matched.");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;
    let _guard = init_logging(&cfg);

    match cli.command {
        Commands::Sync {
            setlist,
            file,
            playlist,
            new_playlist,
            description,
        } => {
            let target = choose_target(playlist, new_playlist, description)?;
            if let Err(e) = run_sync_command(&cfg, setlist, file, target).await {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::SearchSetlists { artist, city } => {
            let client = setlist_client(&cfg)?;
            let found = client.search_setlists(&artist, &city).await?;
            if found.is_empty() {
                println!("No setlists found.");
                return Ok(());
            }
            println!("{:>3}  {:<10}  {:<32}  {:<28}  {}", "#", "Date", "Venue", "City", "Id");
            for (i, s) in found.iter().enumerate() {
                println!(
                    "{:>3}  {:<10}  {:<32}  {:<28}  {}",
                    i + 1,
                    s.event_date,
                    s.venue,
                    format!("{}, {}", s.city, s.country),
                    s.id
                );
            }
            let answer = prompt("Enter the number of the setlist to add (blank to quit):")?;
            if answer.is_empty() {
                return Ok(());
            }
            let Some(picked) = pick_setlist(&answer, found.len()).map(|i| &found[i]) else {
                println!("No setlist numbered '{}'.", answer);
                return Ok(());
            };
            println!("Selected setlist {} at {} on {}", picked.id, picked.venue, picked.event_date);
            let target = choose_target(None, None, None)?;
            if let Err(e) = run_sync_command(&cfg, Some(picked.id.clone()), None, target).await {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Serve { addr } => {
            let match_config = cfg.match_config()?;
            let catalog: Arc<dyn Catalog> = spotify_catalog(&cfg)?;
            let state = AppState {
                registry: JobRegistry::new(),
                catalog,
                source: setlist_client(&cfg)?,
                match_config,
            };
            let addr = addr.unwrap_or_else(|| cfg.listen_addr.clone());
            lib::server::serve(&addr, state).await?;
        }
        Commands::Auth { sub } => match sub {
            AuthCommands::Spotify => {
                lib::api::spotify_auth::run_spotify_auth(&cfg).await?;
            }
        },
        Commands::ConfigValidate => match cfg.validate() {
            Ok(()) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::pick_setlist;

    #[test]
    fn menu_choice_is_one_based_and_bounded() {
        assert_eq!(pick_setlist("1", 3), Some(0));
        assert_eq!(pick_setlist(" 3 ", 3), Some(2));
        assert_eq!(pick_setlist("0", 3), None);
        assert_eq!(pick_setlist("4", 3), None);
        assert_eq!(pick_setlist("abc", 3), None);
    }
}
