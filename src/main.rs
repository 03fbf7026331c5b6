mod config;
mod error;
mod lyrics;
mod retry;
mod server;
mod spotify;
mod storage;
mod tracker;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use lyrics::{LrclibClient, Resolver, TrackIdentity};
use spotify::{SessionStore, SpotifyApi, SpotifyAuth};
use storage::CacheStore;
use tracker::Tracker;

#[derive(Debug, Parser)]
#[command(name = "lyricwatch", version, about = "Synced lyrics for whatever Spotify is playing")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow playback and print the current lyric line (default).
    Run {
        /// Print every status change as a JSON line.
        #[arg(long)]
        json: bool,
    },
    /// Resolve lyrics for a track once and print them (headless).
    Lookup {
        artist: String,
        title: String,
        #[arg(long, default_value = "")]
        album: String,
    },
    /// Print the cached line for a position in a track.
    Line {
        artist: String,
        title: String,
        seconds: f64,
    },
    /// Store the Spotify application client id in the config file.
    ClientId { client_id: String },
    /// Forget the saved Spotify session.
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    match cli.command.unwrap_or(Command::Run { json: false }) {
        Command::Run { json } => run(cfg, json).await?,
        Command::Lookup {
            artist,
            title,
            album,
        } => {
            let cache = CacheStore::open(&cfg.paths.lyrics_dir(), cfg.resolver.memo_capacity)?;
            let resolver = make_resolver(&cfg, cache)?;
            let identity = TrackIdentity::new(title, artist, album);
            match resolver.resolve(&identity).await {
                Some(doc) => print_document(&doc),
                None => println!("No synced lyrics found for {}.", identity.label()),
            }
        }
        Command::Line {
            artist,
            title,
            seconds,
        } => {
            let cache = CacheStore::open(&cfg.paths.lyrics_dir(), cfg.resolver.memo_capacity)?;
            let identity = TrackIdentity::new(title, artist, "");
            match cache.read(&identity) {
                Some(doc) => println!("{}", doc.current_line(seconds)),
                None => anyhow::bail!("no cached lyrics at {}", cache.path_for(&identity).display()),
            }
        }
        Command::ClientId { client_id } => {
            let mut cfg = cfg;
            cfg.spotify.client_id = client_id;
            config::save(&cfg, cli.config.as_deref()).context("save config")?;
            println!("Updated Spotify client id.");
        }
        Command::Logout => {
            let sessions = SessionStore::new(cfg.paths.session_file());
            if sessions.clear()? {
                println!("Removed {}.", sessions.path().display());
            } else {
                println!("No saved session.");
            }
        }
    }

    Ok(())
}

async fn run(cfg: config::Config, json: bool) -> anyhow::Result<()> {
    if cfg.spotify.client_id.is_empty() {
        anyhow::bail!("no Spotify client id configured; run `lyricwatch client-id <id>` first");
    }

    let retry = cfg.retry.policy();
    let cache = CacheStore::open(&cfg.paths.lyrics_dir(), cfg.resolver.memo_capacity)?;
    let resolver = make_resolver(&cfg, cache.clone())?;
    let tracker = Tracker::new(
        Arc::new(SpotifyApi::new(&cfg.spotify, retry)?),
        Arc::new(SpotifyAuth::new(&cfg.spotify, retry)?),
        Arc::new(resolver),
        cache,
        SessionStore::new(cfg.paths.session_file()),
        cfg.tracker.clone(),
    );

    let (tx, rx) = mpsc::channel::<String>(4);
    match server::listen_addr(&cfg.spotify.redirect_uri) {
        Some(addr) => {
            let app = server::router(tracker.status_handle(), tx.clone());
            if let Err(e) = server::spawn(addr, app).await {
                tracing::warn!("status server unavailable on {addr}: {e:#}; paste the redirect URL instead");
            }
        }
        None => tracing::warn!(
            "redirect URI {} is not a loopback address; paste the redirect URL instead",
            cfg.spotify.redirect_uri
        ),
    }
    tokio::spawn(forward_codes(tx));

    let mut status = tracker.status_handle();
    let printer = async move {
        let mut last_line = String::new();
        while let Some(snapshot) = status.changed().await {
            if json {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("serialize status: {e}"),
                }
            } else if snapshot.current_lyric != last_line {
                println!("{}", snapshot.current_lyric);
                last_line = snapshot.current_lyric;
            }
        }
    };

    tokio::select! {
        _ = tracker.run(rx) => {}
        _ = printer => {}
        res = tokio::signal::ctrl_c() => res.context("listen for ctrl-c")?,
    }
    Ok(())
}

/// Read pasted authorization codes (or redirect URLs) from stdin.
async fn forward_codes(tx: mpsc::Sender<String>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(code) = spotify::auth::extract_code(&line) {
                    if tx.send(code).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin: {e}");
                break;
            }
        }
    }
}

fn make_resolver(cfg: &config::Config, cache: CacheStore) -> anyhow::Result<Resolver> {
    let lrclib = LrclibClient::new(&cfg.lrclib, cfg.retry.policy())?;
    Ok(Resolver::new(Arc::new(lrclib), cache).with_cutoff(cfg.resolver.fuzzy_cutoff))
}

fn print_document(doc: &lyrics::LyricDocument) {
    for line in &doc.lines {
        println!("[{}] {}", lyrics::parser::format_offset(line.offset_seconds), line.text);
    }
}
