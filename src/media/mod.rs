// Audio extraction over an external transcoder binary.
//
// - Commands: bounded command builder shared with the transcriber adapter
// - Processor: ffmpeg-based implementation

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::{ToolCommand, ToolFailure};
pub use processor::FfmpegTranscoder;

use crate::error::Result;
use crate::stop::StopToken;

/// Media-to-audio extraction seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Extract a mono 16 kHz PCM track from a video file. Blocks for the
    /// duration of the external process, bounded by the configured timeout.
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path, stop: &StopToken)
    -> Result<()>;

    /// Verify the transcoder binary responds at all.
    async fn check_availability(&self) -> Result<()>;
}
