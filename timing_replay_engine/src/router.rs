//! Ingestion of initial and update messages into the per-channel buffers.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use timing_replay_common::{
    config::EngineConfig,
    events::{utc_to_ms, CarsData, Message, Positions, StateFrame},
    Channel,
};

use crate::{
    clock::{Clock, SystemClock},
    inflate::{Base64Deflate, DecodeError, Inflate},
    publish::Publisher,
    stateful_buffer::StatefulBuffer,
    timed_buffer::TimedBuffer,
};

pub(crate) struct ChannelBuffer {
    pub channel: Channel,
    pub buffer: StatefulBuffer,
}

fn timed_buffer<T: Clone>(clock: &Arc<dyn Clock>, retention: Option<Duration>) -> TimedBuffer<T> {
    match retention {
        Some(retention) => TimedBuffer::with_retention(clock.clone(), retention),
        None => TimedBuffer::new(clock.clone()),
    }
}

/// Every buffer owned by one engine session.
pub(crate) struct Buffers {
    pub channels: Vec<ChannelBuffer>,
    pub car_data: TimedBuffer<Arc<CarsData>>,
    pub positions: TimedBuffer<Arc<Positions>>,
}

impl Buffers {
    fn new(config: &EngineConfig, clock: &Arc<dyn Clock>) -> Self {
        // 0 disables the retention window
        let retention =
            (config.max_history_secs > 0).then(|| Duration::from_secs(config.max_history_secs));

        let mut channels: Vec<ChannelBuffer> = Vec::with_capacity(config.channels.len());
        for &channel in &config.channels {
            if channels.iter().any(|c| c.channel == channel) {
                continue;
            }
            channels.push(ChannelBuffer {
                channel,
                buffer: StatefulBuffer::new(timed_buffer(clock, retention)),
            });
        }

        Self {
            channels,
            car_data: timed_buffer(clock, retention),
            positions: timed_buffer(clock, retention),
        }
    }

    fn push_channels(&mut self, state: &Map<String, Value>) {
        for entry in &mut self.channels {
            if let Some(value) = state.get(entry.channel.as_str()) {
                entry.buffer.push(value.clone());
            }
        }
    }

    /// Smallest history any non-empty buffer can serve, 0 when all are empty.
    pub fn max_delay_ms(&self, include_frames: bool) -> i64 {
        let frames = include_frames
            .then(|| [self.car_data.max_delay(), self.positions.max_delay()])
            .into_iter()
            .flatten();

        self.channels
            .iter()
            .map(|c| c.buffer.max_delay())
            .chain(frames)
            .filter(|delay| *delay > 0)
            .min()
            .unwrap_or(0)
    }
}

type Frames<T> = Vec<(i64, Arc<T>)>;

/// One replay session: owns the buffers, receives messages and hands the
/// scheduler what it needs to publish.
#[derive(Clone)]
pub struct Engine {
    pub(crate) buffers: Arc<Mutex<Buffers>>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) clock: Arc<dyn Clock>,
    decoder: Arc<dyn Inflate>,
}

impl Engine {
    pub fn new(config: &EngineConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self::with_parts(
            config,
            publisher,
            Arc::new(Base64Deflate),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: &EngineConfig,
        publisher: Arc<dyn Publisher>,
        decoder: Arc<dyn Inflate>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Buffers::new(config, &clock))),
            publisher,
            clock,
            decoder,
        }
    }

    /// Seeds every channel from a full snapshot and publishes it right away.
    pub fn handle_initial(&self, message: Message) {
        tracing::trace!("Handling initial message with {} keys", message.state.len());

        let car_frames = message.car_data_z.as_deref().and_then(|b| self.car_frames(b));
        let position_frames = message
            .position_z
            .as_deref()
            .and_then(|b| self.position_frames(b));

        self.buffers.lock().push_channels(&message.state);

        self.publisher.state_changed(StateFrame::from(message.state));

        if let Some(frames) = car_frames {
            if let Some((_, first)) = frames.first() {
                self.publisher.telemetry_changed(first.clone());
            }
            let mut buffers = self.buffers.lock();
            for (timestamp, frame) in frames {
                buffers.car_data.push_timed(frame, timestamp);
            }
        }

        if let Some(frames) = position_frames {
            if let Some((_, first)) = frames.first() {
                self.publisher.position_changed(first.clone());
            }
            let mut buffers = self.buffers.lock();
            for (timestamp, frame) in frames {
                buffers.positions.push_timed(frame, timestamp);
            }
        }
    }

    /// Merges a partial update into the channels it names. Nothing is
    /// published; the scheduler picks it up on its next tick.
    pub fn handle_update(&self, message: Message) {
        tracing::trace!("Handling update with {} keys", message.state.len());

        let car_frames = message.car_data_z.as_deref().and_then(|b| self.car_frames(b));
        let position_frames = message
            .position_z
            .as_deref()
            .and_then(|b| self.position_frames(b));

        let mut buffers = self.buffers.lock();
        buffers.push_channels(&message.state);

        for (timestamp, frame) in car_frames.into_iter().flatten() {
            buffers.car_data.push_timed(frame, timestamp);
        }
        for (timestamp, frame) in position_frames.into_iter().flatten() {
            buffers.positions.push_timed(frame, timestamp);
        }
    }

    fn car_frames(&self, blob: &str) -> Option<Frames<CarsData>> {
        let frames = self.decoder.car_data(blob).and_then(|feed| {
            feed.entries
                .into_iter()
                .map(|entry| -> Result<_, DecodeError> {
                    Ok((parse_utc(&entry.utc)?, Arc::new(entry.cars)))
                })
                .collect::<Result<Vec<_>, _>>()
        });

        match frames {
            Ok(frames) => Some(frames),
            Err(e) => {
                tracing::warn!("Skipping car data blob: {}", e);
                None
            }
        }
    }

    fn position_frames(&self, blob: &str) -> Option<Frames<Positions>> {
        let frames = self.decoder.position(blob).and_then(|feed| {
            feed.position
                .into_iter()
                .map(|item| -> Result<_, DecodeError> {
                    Ok((parse_utc(&item.timestamp)?, Arc::new(item.entries)))
                })
                .collect::<Result<Vec<_>, _>>()
        });

        match frames {
            Ok(frames) => Some(frames),
            Err(e) => {
                tracing::warn!("Skipping position blob: {}", e);
                None
            }
        }
    }
}

fn parse_utc(utc: &str) -> Result<i64, DecodeError> {
    utc_to_ms(utc).map_err(|source| DecodeError::Timestamp {
        utc: utc.to_string(),
        source,
    })
}
