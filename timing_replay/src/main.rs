use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use timing_replay_common::{
    channel::UnknownChannel,
    config,
    events::{EngineEvent, Message},
    Channel,
};
use timing_replay_engine::{BroadcastPublisher, Engine, Scheduler};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: timing_replay <recording> [delay-seconds] [channel,...]
       timing_replay --save-config";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("RUST_LOG")
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = config::engine_config()
        .map_err(|e| anyhow::anyhow!("Failed to load engine config: {}", e))?;

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("No recording provided. {}", USAGE))?;
    if path == "--save-config" {
        let saved = config::engine_config_save(&config)
            .map_err(|e| anyhow::anyhow!("Failed to save engine config: {}", e))?;
        tracing::info!("Wrote engine config to {}", saved.display());
        return Ok(());
    }
    let delay = match args.next() {
        Some(d) => d
            .parse::<u32>()
            .with_context(|| format!("Invalid delay {:?}. {}", d, USAGE))?,
        None => 0,
    };
    if let Some(list) = args.next() {
        config.channels = parse_channels(&list).with_context(|| USAGE)?;
        let names: Vec<String> = config.channels.iter().map(ToString::to_string).collect();
        tracing::info!("Buffering channels: {}", names.join(", "));
    }

    let cancel_token = CancellationToken::new();
    tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            cancel_token.cancel();
        }
    });

    let publisher = BroadcastPublisher::new(64);
    let engine = Engine::new(&config, Arc::new(publisher.clone()));

    let (delay_sender, delay_receiver) = watch::channel(delay);
    let (scheduler, max_delay) = Scheduler::new(engine.clone(), &config, delay_receiver);
    let scheduler = scheduler.start();

    let log_task = tokio::spawn(log_events(
        publisher.subscribe(),
        max_delay.clone(),
        cancel_token.clone(),
    ));
    // a pending tokio stdin read would block runtime shutdown
    std::thread::spawn(move || read_delay_requests(delay_sender, max_delay));

    let result = feed_recording(
        &engine,
        Path::new(&path),
        Duration::from_millis(config.replay_pace_ms),
        &cancel_token,
    )
    .await;

    if result.is_ok() && delay > 0 {
        tracing::info!("Recording finished, playing out the last {}s", delay);
        tokio::select! {
            _ = cancel_token.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs(delay.into())) => {}
        }
    }

    scheduler.stop().await;
    cancel_token.cancel();
    if let Err(e) = log_task.await {
        tracing::error!("Event logger failed: {}", e);
    }

    result
}

fn parse_channels(list: &str) -> Result<Vec<Channel>, UnknownChannel> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::parse)
        .collect()
}

/// Feeds a newline-delimited JSON recording into the engine. The first line
/// is the initial snapshot, every later line an update.
async fn feed_recording(
    engine: &Engine,
    path: &Path,
    pace: Duration,
    cancel_token: &CancellationToken,
) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open recording at {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut initial_seen = false;
    let mut count: u64 = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let value = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Skipping invalid line: {}", e);
                continue;
            }
        };

        if initial_seen {
            engine.handle_update(Message::from(value));
        } else {
            engine.handle_initial(Message::from(value));
            initial_seen = true;
        }

        count += 1;
        if count % 100 == 0 {
            tracing::debug!(count, "Fed messages");
        }

        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!(count, "Replay cancelled");
                return Ok(());
            }
            _ = tokio::time::sleep(pace) => {}
        }
    }

    tracing::info!(count, "Finished feeding recording");
    Ok(())
}

async fn log_events(
    mut events: broadcast::Receiver<EngineEvent>,
    mut max_delay: watch::Receiver<u64>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = events.recv() => match event {
                Ok(EngineEvent::State(state)) => {
                    tracing::debug!(channels = state.len(), "State changed");
                    if let Some(laps) = state.get("LapCount") {
                        tracing::trace!("LapCount: {}", laps);
                    }
                }
                Ok(EngineEvent::Telemetry(cars)) => {
                    tracing::trace!(cars = cars.len(), "Telemetry changed");
                }
                Ok(EngineEvent::Position(cars)) => {
                    tracing::trace!(cars = cars.len(), "Positions changed");
                }
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    tracing::warn!("Dropping {dropped} events because the logger is too slow");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = max_delay.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::info!("Maximum available delay: {}s", *max_delay.borrow_and_update());
            }
        }
    }
}

/// Reads requested delays (seconds) from stdin, bounded by what the buffers
/// can currently serve.
fn read_delay_requests(delay: watch::Sender<u32>, max_delay: watch::Receiver<u64>) {
    for line in std::io::stdin().lines() {
        let Ok(line) = line else {
            break;
        };
        match line.trim().parse::<u32>() {
            Ok(requested) => {
                let max = u32::try_from(*max_delay.borrow()).unwrap_or(u32::MAX);
                let applied = requested.min(max);
                if applied != requested {
                    tracing::warn!("Only {}s of history available", max);
                }
                tracing::info!("Playback delay set to {}s", applied);
                delay.send_replace(applied);
            }
            Err(_) => tracing::warn!("Expected a delay in seconds, got {:?}", line),
        }
    }
}
