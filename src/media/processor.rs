use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::TranscoderConfig;
use crate::error::{Result, TarjimError};
use crate::stop::StopToken;
use super::{ToolCommand, Transcoder};

/// FFmpeg-based transcoder implementation.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    fn extract_command(&self, video_path: &Path, audio_path: &Path) -> ToolCommand {
        ToolCommand::new(
            &self.config.binary_path,
            "Audio extraction",
            Duration::from_secs(self.config.timeout_secs),
        )
        .input(video_path)
        .no_video()
        .audio_codec("pcm_s16le")
        .audio_sample_rate(16000)
        .audio_channels(1)
        .overwrite()
        .output(audio_path)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn extract_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        stop: &StopToken,
    ) -> Result<()> {
        info!(
            "Extracting audio from {} to {}",
            video_path.display(),
            audio_path.display()
        );

        let command = self.extract_command(video_path, audio_path);
        command
            .execute(stop)
            .await
            .map_err(|e| TarjimError::Transcode(format!("{}: {}", command.description, e)))?;

        // Exit 0 alone is not proof the track was produced
        if !audio_path.exists() {
            return Err(TarjimError::Transcode(
                "Transcoder exited cleanly but produced no audio file".to_string(),
            ));
        }

        info!("Audio extraction completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        let command = ToolCommand::new(
            &self.config.binary_path,
            "Transcoder version check",
            Duration::from_secs(10),
        )
        .arg("-version");

        command
            .execute(&StopToken::new())
            .await
            .map_err(|e| TarjimError::Transcode(format!("Transcoder unavailable: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_command_matches_expected_invocation() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            binary_path: "ffmpeg".to_string(),
            timeout_secs: 3600,
        });

        let command = transcoder.extract_command(Path::new("/m/v.mkv"), Path::new("/t/a.wav"));
        assert_eq!(command.binary_path, "ffmpeg");
        assert_eq!(command.timeout, Duration::from_secs(3600));
        assert_eq!(
            command.args,
            vec![
                "-i", "/m/v.mkv", "-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y",
                "/t/a.wav"
            ]
        );
    }

    #[tokio::test]
    async fn extract_audio_fails_when_binary_is_missing() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            binary_path: "tarjim-no-such-ffmpeg".to_string(),
            timeout_secs: 5,
        });

        let dir = tempfile::tempdir().unwrap();
        let result = transcoder
            .extract_audio(
                Path::new("/m/v.mkv"),
                &dir.path().join("a.wav"),
                &StopToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TarjimError::Transcode(_))));
    }
}
