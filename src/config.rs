use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TarjimError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transcoder: TranscoderConfig,
    pub transcriber: TranscriberConfig,
    pub translate: TranslateConfig,
    pub gpu: GpuConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Path to the ffmpeg binary
    pub binary_path: String,
    /// Wall-clock limit for one audio extraction, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Path to the whisper binary
    pub binary_path: String,
    /// Model identifier passed to the transcriber
    pub model: String,
    /// Source language hint
    pub language_hint: String,
    /// Wall-clock limit for one transcription, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    /// Target language code (also the output subtitle suffix)
    pub target_language: String,
    /// Maximum serialized chunk size sent per translation request, in characters
    pub max_chunk_size: usize,
    /// Sampling temperature for translation requests
    pub temperature: f32,
    /// Nucleus sampling parameter
    pub top_p: f32,
    /// Token cap per translation response
    pub max_tokens: u32,
    /// Wall-clock limit for one translation request, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Path to the vendor diagnostic binary
    pub query_binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Directory holding the library database, status file, lease and logs
    pub work_dir: PathBuf,
    /// Subtitle suffixes left behind by earlier tooling. During a scan,
    /// `<stem>.<suffix>.srt` is renamed to the target-language suffix when
    /// no target subtitle exists yet.
    pub legacy_suffixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transcoder: TranscoderConfig {
                binary_path: "ffmpeg".to_string(),
                timeout_secs: 3600,
            },
            transcriber: TranscriberConfig {
                binary_path: "whisper".to_string(),
                model: "medium".to_string(),
                language_hint: "en".to_string(),
                timeout_secs: 7200,
            },
            translate: TranslateConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
                target_language: "ar".to_string(),
                max_chunk_size: 2000,
                temperature: 0.3,
                top_p: 0.9,
                max_tokens: 4000,
                timeout_secs: 300,
            },
            gpu: GpuConfig {
                query_binary: "nvidia-smi".to_string(),
            },
            job: JobConfig {
                work_dir: PathBuf::from(".tarjim"),
                legacy_suffixes: vec!["hi".to_string()],
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TarjimError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| TarjimError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TarjimError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TarjimError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn status_path(&self) -> PathBuf {
        self.job.work_dir.join("status.json")
    }

    pub fn lease_path(&self) -> PathBuf {
        self.job.work_dir.join("job.lease")
    }

    pub fn library_path(&self) -> PathBuf {
        self.job.work_dir.join("library.db")
    }

    pub fn blacklist_path(&self) -> PathBuf {
        self.job.work_dir.join("blacklist.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.translate.max_chunk_size, 2000);
        assert_eq!(parsed.transcriber.timeout_secs, 7200);
        assert_eq!(parsed.translate.target_language, "ar");
    }

    #[test]
    fn saved_config_file_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.translate.target_language = "ja".to_string();
        config.transcriber.model = "large".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.translate.target_language, "ja");
        assert_eq!(loaded.transcriber.model, "large");
        assert_eq!(loaded.translate.max_chunk_size, 2000);
    }
}
