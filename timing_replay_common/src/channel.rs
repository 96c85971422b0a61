use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A named slice of session state that is merge-updated independently of the
/// others. Variants serialize to their feed topic names.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    ExtrapolatedClock,
    TopThree,
    TimingStats,
    TimingAppData,
    WeatherData,
    TrackStatus,
    SessionStatus,
    DriverList,
    RaceControlMessages,
    SessionInfo,
    SessionData,
    LapCount,
    TimingData,
    TeamRadio,
    ChampionshipPrediction,
}

impl Channel {
    pub const ALL: [Channel; 15] = [
        Channel::ExtrapolatedClock,
        Channel::TopThree,
        Channel::TimingStats,
        Channel::TimingAppData,
        Channel::WeatherData,
        Channel::TrackStatus,
        Channel::SessionStatus,
        Channel::DriverList,
        Channel::RaceControlMessages,
        Channel::SessionInfo,
        Channel::SessionData,
        Channel::LapCount,
        Channel::TimingData,
        Channel::TeamRadio,
        Channel::ChampionshipPrediction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::ExtrapolatedClock => "ExtrapolatedClock",
            Channel::TopThree => "TopThree",
            Channel::TimingStats => "TimingStats",
            Channel::TimingAppData => "TimingAppData",
            Channel::WeatherData => "WeatherData",
            Channel::TrackStatus => "TrackStatus",
            Channel::SessionStatus => "SessionStatus",
            Channel::DriverList => "DriverList",
            Channel::RaceControlMessages => "RaceControlMessages",
            Channel::SessionInfo => "SessionInfo",
            Channel::SessionData => "SessionData",
            Channel::LapCount => "LapCount",
            Channel::TimingData => "TimingData",
            Channel::TeamRadio => "TeamRadio",
            Channel::ChampionshipPrediction => "ChampionshipPrediction",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}
