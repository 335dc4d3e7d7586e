use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use playlistty as lib;
use lib::api::client_for;
use lib::auth::{Authorizer, OAuthAuthorizer};
use lib::config::{Config, DEFAULT_CONFIG_PATH};
use lib::migrator::{MigrationReport, Migrator};
use lib::models::{MigrationJob, Service};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "playlistty", version, about = "Move a playlist between Spotify and YouTube")]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["service", "oauth"])
))]
struct Cli {
    /// Migrate a playlist from this platform (spotify or yt)
    #[arg(long, value_name = "SERVICE")]
    service: Option<Service>,

    /// Generate an access token for this platform (spotify or yt)
    #[arg(long, value_name = "SERVICE")]
    oauth: Option<Service>,

    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load_or_create(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let _guard = init_logging(&cfg)?;

    if let Some(service) = cli.oauth {
        OAuthAuthorizer::new(cli.config.clone(), cfg.clone())
            .generate_token(service)
            .await
            .with_context(|| format!("generating {} token", service))?;
        // pick up the token just written
        cfg = Config::from_path(&cli.config)
            .with_context(|| format!("reloading config from {}", cli.config.display()))?;
    }

    if let Some(source) = cli.service {
        run_migration(&cfg, &cli.config, source).await?;
    }

    Ok(())
}

/// stdout plus an optional daily-rotated file; `RUST_LOG` overrides the
/// default `info` filter.
fn init_logging(cfg: &Config) -> Result<Option<WorkerGuard>> {
    let _ = LogTracer::init();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_writer(io::stdout);

    let (file_layer, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "playlistty.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(non_blocking)), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);
    tracing_subscriber_global::set_global_default(subscriber)
        .context("installing global tracing subscriber")?;
    Ok(guard)
}

async fn run_migration(cfg: &Config, config_path: &Path, source: Service) -> Result<()> {
    let target = prompt_target_service()?;
    let authorizer: Arc<dyn Authorizer> =
        Arc::new(OAuthAuthorizer::new(config_path.to_path_buf(), cfg.clone()));
    let mut migrator = Migrator::new(
        client_for(source, cfg),
        client_for(target, cfg),
        &cfg.storage_dir,
    )
    .with_authorizer(authorizer);
    migrator.authenticate().await;

    match migrator.source().list_playlists().await {
        Ok(playlists) => {
            println!("Your {} playlists:", source);
            for p in playlists {
                println!("  {}  {}", p.id, p.title);
            }
        }
        Err(e) => warn!("could not list {} playlists: {}", source, e),
    }
    let source_playlist_id = prompt(&format!("{} playlist id to migrate: ", source))?;
    if source_playlist_id.is_empty() {
        bail!("no source playlist id given");
    }

    let create_new = prompt_yes_no(&format!("Create a new {} playlist? [y/n]: ", target))?;
    let mut job = MigrationJob {
        source_service: source,
        source_playlist_id,
        target_service: target,
        target_playlist_id: String::new(),
        create_new,
        target_name: String::new(),
        target_description: String::new(),
    };
    if create_new {
        job.target_name = prompt("Name for the new playlist: ")?;
        job.target_description = prompt("Description (leave empty for default): ")?;
    } else {
        match migrator.destination().list_playlists().await {
            Ok(playlists) => {
                println!("Your {} playlists:", target);
                for p in playlists {
                    println!("  {}  {}", p.id, p.title);
                }
            }
            Err(e) => warn!("could not list {} playlists: {}", target, e),
        }
        job.target_playlist_id = prompt(&format!("{} playlist id to overwrite: ", target))?;
    }

    let confirm = |service: Service, playlist_id: &str| {
        let question = format!(
            "Every track in {} playlist {} will be removed first. Type 'yes' to continue: ",
            service, playlist_id
        );
        matches!(prompt(&question), Ok(answer) if answer.eq_ignore_ascii_case("yes"))
    };

    let report = migrator.run(&job, &confirm).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &MigrationReport) {
    println!(
        "Migrated {} of {} track(s) to playlist {}",
        report.resolved, report.total, report.target_playlist_id
    );
    println!("Catalog saved to {}", report.catalog_path.display());
    if !report.unresolved.is_empty() {
        println!("{} track(s) could not be found:", report.unresolved.len());
        for t in &report.unresolved {
            println!("  - {} by {}", t.name, t.joined_artists());
        }
    }
}

fn prompt_target_service() -> Result<Service> {
    println!("Migrate to:");
    for (i, s) in Service::ALL.iter().enumerate() {
        println!("  {}) {}", i + 1, s);
    }
    let answer = prompt("Choose a platform number: ")?;
    answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| Service::ALL.get(i).copied())
        .with_context(|| format!("'{}' is not one of the listed platforms", answer))
}

fn prompt_yes_no(question: &str) -> Result<bool> {
    let answer = prompt(question)?.to_ascii_lowercase();
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("reading from stdin")?;
    Ok(line.trim().to_string())
}
