//! themesync CLI tool
//!
//! Command-line interface for keeping a local theme directory in sync with a store.
//!
//! ## Commands
//!
//! - `push <path>`: Upload every changed theme file once, deleting remote leftovers
//! - `serve <path>`: Upload, then serve a live-reloading preview while watching for changes
//! - `check-ignore <path> <files...>`: Show which files the ignore rules would skip
//!
//! Settings come from `themesync.toml` at the theme root, overridden by `THEMESYNC_SHOP`,
//! `THEMESYNC_THEME_ID` and `THEMESYNC_ACCESS_TOKEN`.

use clap::{Parser, Subcommand};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use themesync::{
    api::HttpAdminApi,
    config::{ConfigProvider, SyncConfig, TomlConfigProvider, ENV_ACCESS_TOKEN},
    dev_server::DevServer,
    theme::Theme,
    throttler::ThemeAdminApiThrottler,
    upload::{failure_summary, UploadOptions, UploadQueue},
    ThemeSyncError,
};

#[derive(Parser)]
#[command(name = "themesync")]
#[command(author, version, about = "Sync a local theme with a store and preview it live", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the theme once
    Push {
        /// Theme root directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Keep remote files that no longer exist locally
        #[arg(long)]
        no_delete: bool,

        /// Number of upload worker threads (default: from config)
        #[arg(long)]
        workers: Option<usize>,

        /// Batch writes into bulk requests
        #[arg(long)]
        bulk: bool,
    },

    /// Upload the theme, then serve a hot reloading preview until interrupted
    Serve {
        /// Theme root directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Port for the dev server (default: from config, 9292)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: from config, 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },

    /// Print which of the given paths are ignored
    CheckIgnore {
        /// Theme root directory
        path: PathBuf,

        /// Paths relative to the theme root
        files: Vec<PathBuf>,
    },
}

fn load_config(path: &PathBuf) -> Result<SyncConfig, ThemeSyncError> {
    let mut config = TomlConfigProvider::for_root(path).load()?;
    config.apply_env();
    Ok(config)
}

fn admin_api(config: &SyncConfig) -> Result<HttpAdminApi, ThemeSyncError> {
    let token = config.access_token.clone().ok_or_else(|| {
        ThemeSyncError::Config(format!("no access token configured (set {ENV_ACCESS_TOKEN})"))
    })?;
    HttpAdminApi::new(token)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Push {
            path,
            no_delete,
            workers,
            bulk,
        } => {
            let mut config = load_config(&path)?;
            if let Some(workers) = workers {
                config.upload.workers = workers;
            }
            config.throttler.enabled |= bulk;

            let api = Arc::new(admin_api(&config)?);
            let mut theme = Theme::new(&config)?;
            if let Err(e) = theme.load_info(api.as_ref()) {
                tracing::warn!("Could not load theme info: {}", e);
            }
            let theme = Arc::new(theme);
            let throttler = Arc::new(ThemeAdminApiThrottler::from_config(api, &config.throttler));
            println!(
                "Pushing {} to theme {} ({})",
                theme.root().display(),
                theme.id()?,
                theme.name().unwrap_or("unnamed")
            );

            let uploader = UploadQueue::new(theme.clone(), throttler.clone(), &config);
            uploader.start()?;
            let result = uploader.upload_theme_with_progress_bar(UploadOptions {
                delay_low_priority_files: false,
                delete: !no_delete,
            });
            uploader.shutdown();
            throttler.shutdown();
            result?;

            let failures = uploader.failures();
            if !failures.is_empty() {
                eprintln!("{}", failure_summary(&failures));
                std::process::exit(1);
            }
            println!("Done. Preview: {}", theme.preview_url()?);
        }

        Commands::Serve { path, port, host } => {
            let mut config = load_config(&path)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }

            // The blocking client must be built before any runtime starts.
            let api = Arc::new(admin_api(&config)?);
            let server = DevServer::new(config, api)?;
            println!("Serving http://{}", server.address()?);

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                let shutdown = async move {
                    while running.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                };
                server.serve(shutdown).await
            })?;
        }

        Commands::CheckIgnore { path, files } => {
            let config = load_config(&path)?;
            let theme = Theme::new(&config)?;
            for file in files {
                if theme.is_ignored(&file) {
                    println!("{}", file.display());
                }
            }
        }
    }

    Ok(())
}
