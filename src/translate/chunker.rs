use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::stop::StopToken;
use crate::subtitle::{SubtitleDocument, parse_srt_time};
use super::Translator;

/// Separator between serialized subtitle blocks.
const BLOCK_SEPARATOR: &str = "\n\n";

/// A contiguous, size-bounded slice of the serialized document, aligned to
/// block boundaries. Created and discarded within one translation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Index of the first block covered by this chunk
    pub first_block: usize,
    /// Number of blocks covered
    pub block_count: usize,
    /// Serialized text, blocks joined by the block separator
    pub text: String,
}

/// Outcome summary of one document translation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationReport {
    pub chunks_total: usize,
    /// Chunks whose translation failed or came back structurally unusable,
    /// substituted with the source text. A degradation, not a failure.
    pub chunks_degraded: usize,
}

impl TranslationReport {
    pub fn is_degraded(&self) -> bool {
        self.chunks_degraded > 0
    }
}

/// Split serialized blocks into chunks no longer than `max_chunk_size`.
/// A single block that alone exceeds the limit becomes its own oversized
/// chunk; splitting it mid-block would desynchronize a timestamp line from
/// its text.
pub fn split_into_chunks(blocks: &[String], max_chunk_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut first_block = 0;
    let mut block_count = 0;

    for (index, block) in blocks.iter().enumerate() {
        let candidate_len = if buffer.is_empty() {
            block.len()
        } else {
            buffer.len() + BLOCK_SEPARATOR.len() + block.len()
        };

        if candidate_len > max_chunk_size && !buffer.is_empty() {
            chunks.push(Chunk {
                first_block,
                block_count,
                text: std::mem::take(&mut buffer),
            });
            first_block = index;
            block_count = 0;
        }

        if !buffer.is_empty() {
            buffer.push_str(BLOCK_SEPARATOR);
        }
        buffer.push_str(block);
        block_count += 1;
    }

    if !buffer.is_empty() {
        chunks.push(Chunk {
            first_block,
            block_count,
            text: buffer,
        });
    }

    chunks
}

/// Extract the text payload of every block in a translated chunk. Returns
/// `None` when any block does not follow the index/time-range/text shape,
/// in which case the caller falls back to the source chunk.
fn extract_block_texts(chunk_text: &str) -> Option<Vec<String>> {
    let mut texts = Vec::new();

    for block in chunk_text.split(BLOCK_SEPARATOR) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let mut lines = block.lines();
        lines.next()?.trim().parse::<u64>().ok()?;

        let time_line = lines.next()?;
        let (start, end) = time_line.split_once("-->")?;
        parse_srt_time(start.trim()).ok()?;
        parse_srt_time(end.trim()).ok()?;

        let text = lines.collect::<Vec<_>>().join("\n");
        if text.trim().is_empty() {
            return None;
        }
        texts.push(text.trim().to_string());
    }

    Some(texts)
}

/// Feeds size-bounded chunks of a subtitle document through a translator
/// and reassembles the result block-for-block.
pub struct ChunkedTranslator {
    translator: Arc<dyn Translator>,
}

impl ChunkedTranslator {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }

    /// Translate a document. The output always contains exactly the input's
    /// blocks, in order, with the original timestamps; only text payloads
    /// change. Blocks belonging to a failed chunk keep their source text.
    pub async fn translate(
        &self,
        document: &SubtitleDocument,
        max_chunk_size: usize,
        target_language: &str,
        stop: &StopToken,
    ) -> Result<(SubtitleDocument, TranslationReport)> {
        let blocks: Vec<String> = document
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| SubtitleDocument::serialize_block(index, segment))
            .collect();

        let chunks = split_into_chunks(&blocks, max_chunk_size);
        info!(
            "Translating {} blocks in {} chunk(s) to {}",
            blocks.len(),
            chunks.len(),
            target_language
        );

        let mut translated = document.clone();
        let mut report = TranslationReport {
            chunks_total: chunks.len(),
            chunks_degraded: 0,
        };

        for (number, chunk) in chunks.iter().enumerate() {
            info!("Translating chunk {}/{}", number + 1, chunks.len());

            let replacement = match self
                .translator
                .translate_chunk(&chunk.text, target_language, stop)
                .await
            {
                Ok(response) => match extract_block_texts(&response) {
                    Some(texts) if texts.len() == chunk.block_count => Some(texts),
                    _ => {
                        warn!(
                            "Chunk {} came back with mismatched structure, keeping source text",
                            number + 1
                        );
                        None
                    }
                },
                Err(e) => {
                    warn!(
                        "Chunk {} failed to translate, keeping source text: {}",
                        number + 1,
                        e
                    );
                    None
                }
            };

            match replacement {
                Some(texts) => {
                    for (offset, text) in texts.into_iter().enumerate() {
                        translated.segments[chunk.first_block + offset].text = text;
                    }
                }
                None => report.chunks_degraded += 1,
            }
        }

        if report.is_degraded() {
            warn!(
                "Translation degraded: {}/{} chunks kept source text",
                report.chunks_degraded, report.chunks_total
            );
        }

        Ok((translated, report))
    }
}
