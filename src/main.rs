use std::{path::PathBuf, process::exit, sync::Arc, time::Duration};

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use postfolder::{
    events::{self, Event},
    storage::Store,
    telegram::{TelegramClient, Timeouts},
    worker::{self, CycleOutcome, Poster, PosterHandle},
};

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    /// Directory for user settings, phrases and the last post time.
    #[clap(short, long, value_parser)]
    data_dir: Option<PathBuf>,

    /// Directory with bundled default settings and phrases.
    #[clap(short, long, value_parser)]
    bundled_dir: Option<PathBuf>,

    /// Seconds between schedule checks.
    #[clap(long, value_parser, default_value_t = 60)]
    check_interval: u64,

    /// Send one post right away and exit.
    #[clap(long, value_parser, default_value_t = false)]
    once: bool,

    /// Reset settings to defaults and exit.
    #[clap(long, value_parser, default_value_t = false)]
    reset: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let platform = Store::platform_default();
    let store = Store::new(
        args.data_dir.unwrap_or_else(|| platform.user_dir().to_path_buf()),
        args.bundled_dir.unwrap_or_else(|| platform.bundled_dir().to_path_buf()),
    );

    if args.reset {
        if let Err(e) = store.reset_settings() {
            eprintln!("Failed to reset settings: {}", e);
            exit(1);
        }
        println!("Settings reset. Set token and channel_id in {}", store.user_dir().display());
        return;
    }

    println!("Try reading settings from {}...", store.user_dir().display());

    let settings = match store.load_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            eprintln!("Please set token and channel_id.");
            exit(1);
        }
    };

    let tg = match TelegramClient::new(settings.token.clone(), Timeouts::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create telegram client: {}", e);
            exit(1);
        }
    };

    let (observer, mut events) = events::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::Progress(_) => {}
                Event::SettingsRequired(reason) => {
                    eprintln!("Settings required: {}", reason);
                }
                other => println!("{}", other),
            }
        }
    });

    let poster = Arc::new(Poster::new(Arc::new(tg), store, settings, Arc::new(observer)));

    if args.once {
        // A rejected token is a settings problem, a failed post is not.
        let code = match poster.start().await {
            Ok(_) => match poster.send_now().await {
                CycleOutcome::Posted(_) => 0,
                _ => 2,
            },
            Err(_) => 1,
        };
        drop(poster);
        let _ = printer.await;

        if code != 0 {
            exit(code);
        }
        return;
    }

    let (tx, rx) = mpsc::channel(16);
    let handle = PosterHandle::new(tx);
    let worker = tokio::spawn(worker::run(poster, rx, Duration::from_secs(args.check_interval.max(1))));

    match handle.start().await {
        Ok(Ok(_)) => {}
        _ => {
            let _ = handle.shutdown().await;
            let _ = worker.await;
            exit(1);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for ctrl-c: {}", e);
    }

    let _ = handle.shutdown().await;
    let _ = worker.await;
}
