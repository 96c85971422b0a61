use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys that carry compressed sub-streams rather than channel state. The feed
/// topic spelling is accepted as well.
pub const CAR_DATA_KEYS: [&str; 2] = ["CarDataZ", "CarData.z"];
pub const POSITION_KEYS: [&str; 2] = ["PositionZ", "Position.z"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CarDataChannels {
    #[serde(rename = "0", default)]
    pub rpm: u32,
    #[serde(rename = "2", default)]
    pub speed: u32,
    #[serde(rename = "3", default)]
    pub gear: u32,
    #[serde(rename = "4", default)]
    pub throttle: u32,
    #[serde(rename = "5", default)]
    pub brake: u32,
    #[serde(rename = "45", default)]
    pub drs: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CarData {
    #[serde(rename = "Channels")]
    pub channels: CarDataChannels,
}

/// Telemetry for every car at one instant, keyed by racing number.
pub type CarsData = HashMap<String, CarData>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionCar {
    #[serde(default)]
    pub status: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Track position of every car at one instant, keyed by racing number.
pub type Positions = HashMap<String, PositionCar>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CarDataEntry {
    pub utc: String,
    pub cars: CarsData,
}

/// Decoded `CarDataZ` blob.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CarDataFeed {
    pub entries: Vec<CarDataEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionEntry {
    pub timestamp: String,
    pub entries: Positions,
}

/// Decoded `PositionZ` blob.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionFeed {
    pub position: Vec<PositionEntry>,
}

/// Message handed over by the transport, either the initial snapshot or a
/// later partial update. The shape is the same for both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Every non-blob key, known channel or not.
    pub state: Map<String, Value>,
    pub car_data_z: Option<String>,
    pub position_z: Option<String>,
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        let Value::Object(mut state) = value else {
            tracing::warn!("Ignoring message that is not a JSON object");
            return Message::default();
        };

        let car_data_z = take_blob(&mut state, &CAR_DATA_KEYS);
        let position_z = take_blob(&mut state, &POSITION_KEYS);

        Message {
            state,
            car_data_z,
            position_z,
        }
    }
}

fn take_blob(state: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut blob = None;
    for key in keys {
        match state.remove(*key) {
            Some(Value::String(s)) => blob = Some(s),
            Some(Value::Null) | None => {}
            Some(other) => {
                tracing::warn!("Ignoring non-string {} blob: {}", key, other);
            }
        }
    }
    blob
}

/// Combined partial state published on every tick. Only channels that had a
/// value for the requested instant are present.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateFrame(pub BTreeMap<String, Arc<Value>>);

impl StateFrame {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).map(|v| v.as_ref())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Arc<Value>) {
        self.0.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().clone()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for StateFrame {
    fn from(map: Map<String, Value>) -> Self {
        StateFrame(map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect())
    }
}

#[derive(Clone, Debug)]
pub enum EngineEvent {
    State(StateFrame),
    Telemetry(Arc<CarsData>),
    Position(Arc<Positions>),
}

/// Parses a feed timestamp (RFC 3339, usually with 7 fractional digits) into
/// epoch milliseconds.
pub fn utc_to_ms(utc: &str) -> Result<i64, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(utc)?.timestamp_millis())
}
