//! Tarjim - Batch Subtitle Translation
//!
//! Turns a library of video files into translated subtitle files using
//! ffmpeg for audio extraction, whisper for transcription and ollama for
//! translation, placing each workload on the best available GPU.

pub mod cli;
pub mod config;
pub mod error;
pub mod gpu;
pub mod media;
pub mod orchestrator;
pub mod pipeline;
pub mod status;
pub mod stop;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod worklist;
