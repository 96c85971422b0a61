//! Fixed-period playback of buffered state, live or delayed.

use std::time::Duration;

use timing_replay_common::{config::EngineConfig, events::StateFrame};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::router::Engine;

/// Trim work queued during a tick and run once everything is published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cleanup {
    Channel { index: usize, before: i64 },
    CarData { before: i64 },
    Positions { before: i64 },
}

pub struct Scheduler {
    engine: Engine,
    delay: watch::Receiver<u32>,
    max_delay: watch::Sender<u64>,
    period: Duration,
    include_frames_in_max_delay: bool,
    cleanups: Vec<Cleanup>,
}

impl Scheduler {
    /// `delay` is the requested playback delay in seconds, 0 meaning live.
    /// The returned receiver carries the maximum delay (whole seconds) that
    /// every active channel can currently serve.
    pub fn new(
        engine: Engine,
        config: &EngineConfig,
        delay: watch::Receiver<u32>,
    ) -> (Self, watch::Receiver<u64>) {
        let (max_delay, max_delay_rx) = watch::channel(0);
        let scheduler = Self {
            engine,
            delay,
            max_delay,
            period: Duration::from_millis(config.update_interval_ms.max(1)),
            include_frames_in_max_delay: config.include_frames_in_max_delay,
            cleanups: Vec::new(),
        };
        (scheduler, max_delay_rx)
    }

    pub fn tick(&mut self) {
        let delay = *self.delay.borrow();
        let now = self.engine.clock.now_ms();

        let (state, car_data, positions, max_delay_ms) = {
            let buffers = self.engine.buffers.lock();
            let mut state = StateFrame::default();

            let (car_data, positions) = if delay == 0 {
                for entry in &buffers.channels {
                    if let Some(value) = entry.buffer.latest() {
                        state.insert(entry.channel.as_str(), value);
                    }
                }
                (buffers.car_data.latest(), buffers.positions.latest())
            } else {
                let target = now - i64::from(delay) * 1000;
                for (index, entry) in buffers.channels.iter().enumerate() {
                    if let Some(value) = entry.buffer.delayed(target) {
                        state.insert(entry.channel.as_str(), value);
                    }
                    self.cleanups.push(Cleanup::Channel {
                        index,
                        before: target,
                    });
                }
                self.cleanups.push(Cleanup::CarData { before: target });
                self.cleanups.push(Cleanup::Positions { before: target });
                (buffers.car_data.delayed(target), buffers.positions.delayed(target))
            };

            let max_delay_ms = buffers.max_delay_ms(self.include_frames_in_max_delay);
            (state, car_data, positions, max_delay_ms)
        };

        tracing::debug!(
            delay,
            channels = state.len(),
            max_delay_ms,
            "Playback tick"
        );

        self.engine.publisher.state_changed(state);
        if let Some(frame) = car_data {
            self.engine.publisher.telemetry_changed(frame);
        }
        if let Some(frame) = positions {
            self.engine.publisher.position_changed(frame);
        }

        let max_delay_secs = (max_delay_ms / 1000) as u64;
        self.max_delay.send_if_modified(|current| {
            let changed = *current != max_delay_secs;
            *current = max_delay_secs;
            changed
        });

        self.run_cleanups();
    }

    fn run_cleanups(&mut self) {
        if self.cleanups.is_empty() {
            return;
        }

        let mut buffers = self.engine.buffers.lock();
        for cleanup in self.cleanups.drain(..) {
            match cleanup {
                Cleanup::Channel { index, before } => {
                    if let Some(entry) = buffers.channels.get_mut(index) {
                        entry.buffer.cleanup(before);
                    }
                }
                Cleanup::CarData { before } => buffers.car_data.cleanup(before),
                Cleanup::Positions { before } => buffers.positions.cleanup(before),
            }
        }
    }

    /// Spawns the periodic tick on the current tokio runtime. Ticks never
    /// overlap; a late tick pushes the following ones back.
    pub fn start(mut self) -> SchedulerHandle {
        let token = CancellationToken::new();
        let cancel = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Playback scheduler started ({:?} period)", self.period);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }

            tracing::info!("Playback scheduler stopped");
        });

        SchedulerHandle {
            token,
            task: Some(task),
        }
    }
}

/// Running scheduler. Dropping it cancels the task without waiting.
pub struct SchedulerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancels the task and waits for it; no tick runs after this returns.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Playback scheduler task failed: {}", e);
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
