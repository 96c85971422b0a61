use std::path::{Path, PathBuf};

use app_dirs2::{get_app_root, AppDataType, AppInfo};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;

pub const APP_INFO: AppInfo = AppInfo {
    name: "timing_replay",
    author: "timing_replay",
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler period.
    pub update_interval_ms: u64,
    /// History older than this is dropped on push, even while playing live.
    /// 0 keeps everything.
    pub max_history_secs: u64,
    /// Channels the engine keeps buffers for. Other keys are ignored.
    pub channels: Vec<Channel>,
    /// Let the telemetry and position buffers bound the maximum delay too.
    pub include_frames_in_max_delay: bool,
    /// Pause between recorded lines when replaying a file.
    pub replay_pace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 200,
            max_history_secs: 3600,
            channels: Channel::ALL.to_vec(),
            include_frames_in_max_delay: false,
            replay_pace_ms: 100,
        }
    }
}

fn engine_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let dir = get_app_root(AppDataType::UserConfig, &APP_INFO)?;
    Ok(dir.join("engine.json"))
}

pub fn engine_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    engine_config_load(&engine_config_path()?)
}

pub fn engine_config_load(path: &Path) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        tracing::info!("Loading engine config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Ok(engine_config_from_str(&contents)?)
    } else {
        tracing::warn!("Engine config file not found, using default values");
        Ok(Default::default())
    }
}

pub fn engine_config_from_str(contents: &str) -> Result<EngineConfig, json5::Error> {
    json5::from_str(contents)
}

pub fn engine_config_save(config: &EngineConfig) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = engine_config_path()?;
    engine_config_write(&path, config)?;
    Ok(path)
}

pub fn engine_config_write(
    path: &Path,
    config: &EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, json5::to_string(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = engine_config_from_str(
            r#"{
                // faster ticks for a local replay
                update_interval_ms: 50,
                channels: ["LapCount", "TrackStatus"],
            }"#,
        )
        .unwrap();
        assert_eq!(config.update_interval_ms, 50);
        assert_eq!(config.channels, vec![Channel::LapCount, Channel::TrackStatus]);
        assert_eq!(config.max_history_secs, 3600);
        assert!(!config.include_frames_in_max_delay);
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        assert!(engine_config_from_str(r#"{ channels: ["Nope"] }"#).is_err());
    }

    #[test]
    fn test_saved_config_reads_back() {
        let path = std::env::temp_dir()
            .join(format!("timing_replay_config_{}", std::process::id()))
            .join("engine.json");
        let config = EngineConfig {
            update_interval_ms: 100,
            max_history_secs: 0,
            channels: vec![Channel::TimingData, Channel::RaceControlMessages],
            include_frames_in_max_delay: true,
            replay_pace_ms: 20,
        };

        engine_config_write(&path, &config).unwrap();
        let loaded = engine_config_load(&path).unwrap();
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).unwrap();
        }
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_config_serializes_as_json5() {
        let text = json5::to_string(&EngineConfig::default()).unwrap();
        assert_eq!(engine_config_from_str(&text).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("timing_replay_missing").join("engine.json");
        assert_eq!(engine_config_load(&path).unwrap(), EngineConfig::default());
    }
}
