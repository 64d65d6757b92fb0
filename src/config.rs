use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    media::Options,
};

/// Main configuration for first-frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transcoding engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Frame-replacement pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Container conversion settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Options used when the command line does not override them
    #[serde(default)]
    pub defaults: Options,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.pipeline.validate()?;
        self.defaults
            .validate(self.pipeline.lead_in_seconds)
            .map_err(|e| ConfigError::InvalidValue {
                key: "defaults".to_string(),
                value: e.to_string(),
            })?;
        Ok(())
    }
}

/// External FFmpeg engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,

    /// Parent directory for the engine's private workspace (system temp dir if unset)
    pub workdir: Option<PathBuf>,

    /// Value passed to ffmpeg's -loglevel
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            workdir: None,
            log_level: "error".to_string(),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "engine.ffmpeg_path".to_string(),
                value: String::new(),
            }.into());
        }

        if self.ffprobe_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "engine.ffprobe_path".to_string(),
                value: String::new(),
            }.into());
        }

        const LEVELS: [&str; 9] = [
            "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
        ];
        if !LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "engine.log_level".to_string(),
                value: self.log_level.clone(),
            }.into());
        }

        Ok(())
    }
}

/// Frame-replacement pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Length of the replaced opening interval (seconds)
    pub lead_in_seconds: f64,

    /// Encoder used wherever video is re-encoded
    pub video_codec: String,

    /// Pixel format shared by both spliced segments
    pub pixel_format: String,

    /// How far a requested duration may exceed the source before trimming fails
    pub duration_tolerance_seconds: f64,

    /// Leave probe/segment/manifest artifacts in the workspace after a run
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lead_in_seconds: 0.04,
            video_codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            duration_tolerance_seconds: 0.05,
            keep_intermediates: false,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if !(self.lead_in_seconds > 0.0 && self.lead_in_seconds <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.lead_in_seconds".to_string(),
                value: self.lead_in_seconds.to_string()
            }.into());
        }

        if !(self.duration_tolerance_seconds >= 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.duration_tolerance_seconds".to_string(),
                value: self.duration_tolerance_seconds.to_string()
            }.into());
        }

        if self.video_codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.video_codec".to_string(),
                value: self.video_codec.clone()
            }.into());
        }

        if self.pixel_format.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.pixel_format".to_string(),
                value: self.pixel_format.clone()
            }.into());
        }

        Ok(())
    }
}

/// How finished artifacts are moved into other containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Stream copy into the new container
    #[default]
    Remux,
    /// Let the engine pick the container's default codecs
    Transcode,
}

/// Container conversion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub mode: ConversionMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ScaleTarget;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("first_frame.toml");

        let mut original_config = Config::default();
        original_config.defaults.scale_target = ScaleTarget::Image;
        original_config.defaults.framerate = Some(30);
        original_config.conversion.mode = ConversionMode::Transcode;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.defaults, original_config.defaults);
        assert_eq!(loaded_config.conversion.mode, ConversionMode::Transcode);
        assert_eq!(loaded_config.pipeline.pixel_format, "yuv420p");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[pipeline]\nkeep_intermediates = true\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert!(config.pipeline.keep_intermediates);
        assert_eq!(config.pipeline.lead_in_seconds, 0.04);
        assert_eq!(config.engine.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_lead_in() {
        let mut config = Config::default();
        config.pipeline.lead_in_seconds = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.engine.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.user_message().contains("not found"));
    }
}
