//! Service configuration from a TOML file plus `ROLLCALL_*` environment overrides.

use rollcall_core::detect::DetectorConfig;
use rollcall_core::features::DEFAULT_FACE_SIZE;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Minimum cosine confidence for a positive identification (inclusive).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.40;

const DEFAULT_STORE_RETRIES: u32 = 3;
const DEFAULT_STORE_BACKOFF_MS: u64 = 250;

/// Service configuration.
///
/// Precedence, lowest to highest: built-in defaults, the TOML file named
/// by `ROLLCALL_CONFIG` (or `<data_dir>/rollcall.toml` if present), then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path to the SeetaFace frontal detection model.
    pub detector_model_path: PathBuf,
    /// Where the filesystem model store keeps the published artifact.
    pub model_path: PathBuf,
    /// Root of labeled training photos, one subdirectory per student id.
    pub training_dir: PathBuf,
    /// Canonical face edge in pixels; features are face_size^2 floats.
    pub face_size: u32,
    /// Confidence threshold for reporting a match (inclusive).
    pub match_threshold: f32,
    /// Score only the first detected region instead of all of them.
    pub first_face_only: bool,
    /// Attempts per model-store / training-source call.
    pub store_retries: u32,
    /// Initial retry backoff in milliseconds, doubled per attempt.
    pub store_backoff_ms: u64,
    /// Detection sensitivity knobs.
    pub detector: DetectorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            detector_model_path: data_dir.join("models/seeta_fd_frontal_v1.0.bin"),
            model_path: data_dir.join("model.bin"),
            training_dir: data_dir.join("students"),
            face_size: DEFAULT_FACE_SIZE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            first_face_only: false,
            store_retries: DEFAULT_STORE_RETRIES,
            store_backoff_ms: DEFAULT_STORE_BACKOFF_MS,
            detector: DetectorConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration: defaults, then the TOML file if one exists,
    /// then environment variables on top.
    pub fn load() -> Result<Self, ConfigError> {
        let file_path = std::env::var("ROLLCALL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir().join("rollcall.toml"));
        Self::load_from(&file_path)
    }

    /// Like [`load`](Self::load), but with an explicit config file path.
    pub fn load_from(file_path: &Path) -> Result<Self, ConfigError> {
        let mut config = if file_path.exists() {
            let text = std::fs::read_to_string(file_path).map_err(|e| ConfigError::Read {
                path: file_path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: file_path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `ROLLCALL_*` environment variables.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_DETECTOR_MODEL") {
            self.detector_model_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_TRAINING_DIR") {
            self.training_dir = PathBuf::from(v);
        }
        self.face_size = env_u32("ROLLCALL_FACE_SIZE", self.face_size);
        self.match_threshold = env_f32("ROLLCALL_MATCH_THRESHOLD", self.match_threshold);
        self.first_face_only = env_bool("ROLLCALL_FIRST_FACE_ONLY", self.first_face_only);
        self.store_retries = env_u32("ROLLCALL_STORE_RETRIES", self.store_retries);
        self.store_backoff_ms = env_u64("ROLLCALL_STORE_BACKOFF_MS", self.store_backoff_ms);
        self.detector.min_face_size = env_u32("ROLLCALL_MIN_FACE_SIZE", self.detector.min_face_size);
        self.detector.score_thresh = env_f64("ROLLCALL_SCORE_THRESH", self.detector.score_thresh);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.face_size, 100);
        assert!((config.match_threshold - 0.40).abs() < f32::EPSILON);
        assert!(!config.first_face_only);
        assert_eq!(config.store_retries, 3);
        assert_eq!(config.store_backoff_ms, 250);
        assert_eq!(config.detector.min_face_size, 20);
        assert!(config.model_path.ends_with("rollcall/model.bin"));
        assert!(config.training_dir.ends_with("rollcall/students"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults_elsewhere() {
        let config: ServiceConfig = toml::from_str(
            r#"
            face_size = 64
            match_threshold = 0.55

            [detector]
            min_face_size = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.face_size, 64);
        assert!((config.match_threshold - 0.55).abs() < f32::EPSILON);
        assert_eq!(config.detector.min_face_size, 40);
        // Untouched fields keep their defaults.
        assert_eq!(config.store_retries, 3);
        assert_eq!(config.detector.slide_window_step, 4);
    }

    #[test]
    fn test_env_helpers_parse_and_fall_back() {
        std::env::set_var("ROLLCALL_TEST_F32_OK", "0.75");
        assert!((env_f32("ROLLCALL_TEST_F32_OK", 0.1) - 0.75).abs() < f32::EPSILON);
        std::env::remove_var("ROLLCALL_TEST_F32_OK");

        std::env::set_var("ROLLCALL_TEST_F32_BAD", "not-a-number");
        assert!((env_f32("ROLLCALL_TEST_F32_BAD", 0.1) - 0.1).abs() < f32::EPSILON);
        std::env::remove_var("ROLLCALL_TEST_F32_BAD");

        assert_eq!(env_u32("ROLLCALL_TEST_U32_UNSET", 7), 7);

        std::env::set_var("ROLLCALL_TEST_BOOL_ZERO", "0");
        assert!(!env_bool("ROLLCALL_TEST_BOOL_ZERO", true));
        std::env::remove_var("ROLLCALL_TEST_BOOL_ZERO");

        std::env::set_var("ROLLCALL_TEST_BOOL_ONE", "1");
        assert!(env_bool("ROLLCALL_TEST_BOOL_ONE", false));
        std::env::remove_var("ROLLCALL_TEST_BOOL_ONE");
    }
}
