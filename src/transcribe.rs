use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::TranscriberConfig;
use crate::error::{Result, TarjimError};
use crate::gpu::DeviceAssignment;
use crate::media::ToolCommand;
use crate::stop::StopToken;
use crate::subtitle::{SubtitleDocument, read_with_encoding_fallback};

/// Speech-to-text seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file into a timed-text document on the given
    /// device. Blocks for the duration of the external process, bounded by
    /// the configured timeout.
    async fn transcribe(
        &self,
        audio_path: &Path,
        device: DeviceAssignment,
        stop: &StopToken,
    ) -> Result<SubtitleDocument>;

    /// Verify the transcriber binary responds at all.
    async fn check_availability(&self) -> Result<()>;
}

/// Whisper CLI implementation. The tool writes `<audio stem>.srt` next to
/// the requested output directory; that artifact is the success criterion,
/// not the exit code alone.
pub struct WhisperTranscriber {
    config: TranscriberConfig,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    fn transcribe_command(&self, audio_path: &Path, device: DeviceAssignment) -> ToolCommand {
        ToolCommand::new(
            &self.config.binary_path,
            "Transcription",
            Duration::from_secs(self.config.timeout_secs),
        )
        .arg(audio_path.to_string_lossy().to_string())
        .arg("--model")
        .arg(&self.config.model)
        .arg("--language")
        .arg(&self.config.language_hint)
        .arg("--output_format")
        .arg("srt")
        .arg("--output_dir")
        .arg(output_dir(audio_path).to_string_lossy().to_string())
        .arg("--device")
        .arg(device.device_arg())
        .arg("--verbose")
        .arg("False")
        .env("CUDA_VISIBLE_DEVICES", device.cuda_visible_devices())
    }

    fn expected_artifact(&self, audio_path: &Path) -> PathBuf {
        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        output_dir(audio_path).join(format!("{}.srt", stem))
    }
}

fn output_dir(audio_path: &Path) -> PathBuf {
    audio_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        device: DeviceAssignment,
        stop: &StopToken,
    ) -> Result<SubtitleDocument> {
        info!(
            "Transcribing {} with model {} on {}",
            audio_path.display(),
            self.config.model,
            device
        );

        let command = self.transcribe_command(audio_path, device);
        command
            .execute(stop)
            .await
            .map_err(|e| TarjimError::Transcribe(format!("{}: {}", command.description, e)))?;

        let artifact = self.expected_artifact(audio_path);
        if !artifact.exists() {
            return Err(TarjimError::Transcribe(format!(
                "Transcriber exited cleanly but produced no output at {}",
                artifact.display()
            )));
        }

        let content = read_with_encoding_fallback(&artifact).await?;
        let document = SubtitleDocument::from_srt(&content)
            .map_err(|e| TarjimError::Transcribe(format!("Unreadable transcript: {}", e)))?;

        info!("Transcription produced {} segments", document.segments.len());
        Ok(document)
    }

    async fn check_availability(&self) -> Result<()> {
        let command = ToolCommand::new(
            &self.config.binary_path,
            "Transcriber version check",
            Duration::from_secs(30),
        )
        .arg("--help");

        command
            .execute(&StopToken::new())
            .await
            .map_err(|e| TarjimError::Transcribe(format!("Transcriber unavailable: {}", e)))?;
        Ok(())
    }
}
