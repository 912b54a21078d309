use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::TranslateConfig;
use crate::error::{Result, TarjimError};
use crate::gpu::Allocation;
use crate::media::Transcoder;
use crate::stop::StopToken;
use crate::subtitle::write_srt;
use crate::transcribe::Transcriber;
use crate::translate::{ChunkedTranslator, TranslationReport, Translator};
use crate::worklist::translated_subtitle_path;

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Output written. Carries the chunk degradation summary.
    Completed(TranslationReport),
    /// Output already existed; no adapter was invoked.
    Skipped,
}

/// Seam between the orchestrator and the per-file work.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FilePipeline: Send + Sync {
    async fn process_file(&self, video_path: &Path, stop: &StopToken) -> Result<PipelineOutcome>;
}

/// Composes extraction, transcription and chunked translation for one video
/// file. Each step is a hard sequence point; any failure short-circuits the
/// rest and the output file is only written after full success.
///
/// Of the allocation, only the transcription assignment is applied per
/// invocation (`--device` plus CUDA_VISIBLE_DEVICES on the transcriber).
/// The translation assignment is advisory: the translator sits behind an
/// HTTP endpoint whose server owns its own device placement.
pub struct TranslationPipeline {
    transcoder: Arc<dyn Transcoder>,
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
    engine: ChunkedTranslator,
    translate_config: TranslateConfig,
    allocation: Allocation,
}

impl TranslationPipeline {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        transcriber: Arc<dyn Transcriber>,
        translator: Arc<dyn Translator>,
        translate_config: TranslateConfig,
        allocation: Allocation,
    ) -> Self {
        let engine = ChunkedTranslator::new(Arc::clone(&translator));
        Self {
            transcoder,
            transcriber,
            translator,
            engine,
            translate_config,
            allocation,
        }
    }

    /// Verify every external capability before a batch starts, so a missing
    /// binary or endpoint fails the batch up front instead of the first file.
    pub async fn check_capabilities(&self) -> Result<()> {
        self.transcoder.check_availability().await?;
        self.transcriber.check_availability().await?;
        self.translator.check_health().await?;
        info!(
            "All adapters ready; transcription on {}, translation endpoint advised to use {}",
            self.allocation.transcription, self.allocation.translation
        );
        Ok(())
    }
}

#[async_trait]
impl FilePipeline for TranslationPipeline {
    async fn process_file(&self, video_path: &Path, stop: &StopToken) -> Result<PipelineOutcome> {
        if !video_path.exists() {
            return Err(TarjimError::FileNotFound(video_path.display().to_string()));
        }

        let output_path =
            translated_subtitle_path(video_path, &self.translate_config.target_language);
        if output_path.exists() {
            info!(
                "Subtitle already exists, skipping: {}",
                output_path.display()
            );
            return Ok(PipelineOutcome::Skipped);
        }

        info!("Processing {}", video_path.display());

        // Scoped working area, removed on every exit path including panics
        let temp_dir = tempfile::tempdir()?;
        let audio_path = temp_dir.path().join("audio.wav");

        self.transcoder
            .extract_audio(video_path, &audio_path, stop)
            .await?;

        let transcription = self
            .transcriber
            .transcribe(&audio_path, self.allocation.transcription, stop)
            .await?;

        let (translated, report) = self
            .engine
            .translate(
                &transcription,
                self.translate_config.max_chunk_size,
                &self.translate_config.target_language,
                stop,
            )
            .await?;

        write_srt(&translated, &output_path).await?;
        info!(
            "Created subtitle: {} ({} chunks, {} degraded)",
            output_path.display(),
            report.chunks_total,
            report.chunks_degraded
        );

        Ok(PipelineOutcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::media::MockTranscoder;
    use crate::subtitle::{Segment, SubtitleDocument};
    use crate::transcribe::MockTranscriber;
    use crate::translate::MockTranslator;

    fn transcript() -> SubtitleDocument {
        SubtitleDocument::new(vec![
            Segment {
                start: 0.0,
                end: 1.0,
                text: "hello".to_string(),
            },
            Segment {
                start: 1.5,
                end: 2.5,
                text: "world".to_string(),
            },
        ])
    }

    fn pipeline_with(
        transcoder: MockTranscoder,
        transcriber: MockTranscriber,
        translator: MockTranslator,
    ) -> TranslationPipeline {
        TranslationPipeline::new(
            Arc::new(transcoder),
            Arc::new(transcriber),
            Arc::new(translator),
            Config::default().translate,
            Allocation::all_cpu(),
        )
    }

    fn echo_translator() -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_chunk()
            .returning(|text, _, _| Ok(text.to_string()));
        translator
    }

    #[tokio::test]
    async fn check_capabilities_probes_every_adapter() {
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_check_availability()
            .times(1)
            .returning(|| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_check_availability()
            .times(1)
            .returning(|| Ok(()));
        let mut translator = MockTranslator::new();
        translator.expect_check_health().times(1).returning(|| Ok(()));

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        pipeline.check_capabilities().await.unwrap();
    }

    #[tokio::test]
    async fn unhealthy_translator_fails_the_capability_check() {
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_check_availability().returning(|| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_check_availability().returning(|| Ok(()));
        let mut translator = MockTranslator::new();
        translator
            .expect_check_health()
            .returning(|| Err(TarjimError::Translate("model missing".to_string())));

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let result = pipeline.check_capabilities().await;
        assert!(matches!(result, Err(TarjimError::Translate(_))));
    }

    #[tokio::test]
    async fn process_file_writes_translated_subtitle() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        std::fs::write(&video, b"").unwrap();

        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_extract_audio()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_, _, _| Ok(transcript()));

        let pipeline = pipeline_with(transcoder, transcriber, echo_translator());
        let outcome = pipeline
            .process_file(&video, &StopToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Completed(_)));
        let output = dir.path().join("movie.ar.srt");
        assert!(output.exists());
        let written = std::fs::read_to_string(output).unwrap();
        assert!(written.contains("hello"));
        assert!(written.contains("00:00:01,500 --> 00:00:02,500"));
    }

    #[tokio::test]
    async fn existing_output_skips_every_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        std::fs::write(&video, b"").unwrap();
        std::fs::write(dir.path().join("movie.ar.srt"), b"1\n").unwrap();

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_extract_audio().times(0);
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut translator = MockTranslator::new();
        translator.expect_translate_chunk().times(0);

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let outcome = pipeline
            .process_file(&video, &StopToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::Skipped);
    }

    #[tokio::test]
    async fn extraction_failure_short_circuits_later_steps() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        std::fs::write(&video, b"").unwrap();

        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_extract_audio()
            .times(1)
            .returning(|_, _, _| Err(TarjimError::Transcode("boom".to_string())));
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let mut translator = MockTranslator::new();
        translator.expect_translate_chunk().times(0);

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let result = pipeline.process_file(&video, &StopToken::new()).await;

        assert!(matches!(result, Err(TarjimError::Transcode(_))));
        assert!(!dir.path().join("movie.ar.srt").exists());
    }

    #[tokio::test]
    async fn transcription_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        std::fs::write(&video, b"").unwrap();

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_extract_audio().returning(|_, _, _| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _, _| Err(TarjimError::Transcribe("no output".to_string())));
        let mut translator = MockTranslator::new();
        translator.expect_translate_chunk().times(0);

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let result = pipeline.process_file(&video, &StopToken::new()).await;

        assert!(matches!(result, Err(TarjimError::Transcribe(_))));
        assert!(!dir.path().join("movie.ar.srt").exists());
    }

    #[tokio::test]
    async fn missing_video_is_reported_without_invoking_adapters() {
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_extract_audio().times(0);
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let translator = MockTranslator::new();

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let result = pipeline
            .process_file(Path::new("/nonexistent/movie.mkv"), &StopToken::new())
            .await;
        assert!(matches!(result, Err(TarjimError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn translator_failure_degrades_instead_of_failing_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        std::fs::write(&video, b"").unwrap();

        let mut transcoder = MockTranscoder::new();
        transcoder.expect_extract_audio().returning(|_, _, _| Ok(()));
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_, _, _| Ok(transcript()));
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_chunk()
            .returning(|_, _, _| Err(TarjimError::Translate("endpoint down".to_string())));

        let pipeline = pipeline_with(transcoder, transcriber, translator);
        let outcome = pipeline
            .process_file(&video, &StopToken::new())
            .await
            .unwrap();

        match outcome {
            PipelineOutcome::Completed(report) => {
                assert!(report.is_degraded());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // The untranslated fallback is still a complete subtitle file
        let written = std::fs::read_to_string(dir.path().join("movie.ar.srt")).unwrap();
        assert!(written.contains("hello"));
    }
}
