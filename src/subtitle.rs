use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Result, TarjimError};

/// One timestamped unit of transcribed text.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

/// An ordered sequence of segments, as produced by the transcriber.
/// Owned exclusively by the pipeline invocation that created it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDocument {
    pub segments: Vec<Segment>,
}

impl SubtitleDocument {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Serialize one segment into its SRT block form (index, time range, text).
    pub fn serialize_block(index: usize, segment: &Segment) -> String {
        format!(
            "{}\n{} --> {}\n{}",
            index + 1,
            format_srt_time(segment.start),
            format_srt_time(segment.end),
            segment.text.trim()
        )
    }

    /// Serialize the whole document, blocks separated by a blank line.
    pub fn to_srt(&self) -> String {
        self.segments
            .iter()
            .enumerate()
            .map(|(index, segment)| Self::serialize_block(index, segment))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Parse an SRT document. Block indices are re-derived from position,
    /// not trusted from the input.
    pub fn from_srt(content: &str) -> Result<Self> {
        let mut segments = Vec::new();

        for block in content.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            segments.push(parse_block(block)?);
        }

        if segments.is_empty() {
            return Err(TarjimError::Subtitle(
                "Subtitle content contains no blocks".to_string(),
            ));
        }

        Ok(Self { segments })
    }
}

/// Parse a single SRT block: index line, time range line, then text lines.
fn parse_block(block: &str) -> Result<Segment> {
    let mut lines = block.lines();

    let index_line = lines
        .next()
        .ok_or_else(|| TarjimError::Subtitle("Empty subtitle block".to_string()))?;
    index_line.trim().parse::<u64>().map_err(|_| {
        TarjimError::Subtitle(format!("Invalid block index line: {:?}", index_line))
    })?;

    let time_line = lines
        .next()
        .ok_or_else(|| TarjimError::Subtitle("Subtitle block missing time range".to_string()))?;
    let (start, end) = parse_time_range(time_line)?;

    let text = lines.collect::<Vec<_>>().join("\n");
    if text.trim().is_empty() {
        return Err(TarjimError::Subtitle(
            "Subtitle block has no text payload".to_string(),
        ));
    }

    Ok(Segment {
        start,
        end,
        text: text.trim().to_string(),
    })
}

fn parse_time_range(line: &str) -> Result<(f64, f64)> {
    let mut parts = line.splitn(2, "-->");
    let start = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| TarjimError::Subtitle(format!("Invalid time range: {:?}", line)))?;
    let end = parts
        .next()
        .map(str::trim)
        .ok_or_else(|| TarjimError::Subtitle(format!("Invalid time range: {:?}", line)))?;

    Ok((parse_srt_time(start)?, parse_srt_time(end)?))
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
pub fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp. Accepts ',' or '.' as the millisecond separator
/// since transcriber output is not consistent across versions.
pub fn parse_srt_time(value: &str) -> Result<f64> {
    let normalized = value.replace('.', ",");
    let (clock, millis) = normalized
        .split_once(',')
        .ok_or_else(|| TarjimError::Subtitle(format!("Invalid timestamp: {:?}", value)))?;

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() != 3 {
        return Err(TarjimError::Subtitle(format!(
            "Invalid timestamp: {:?}",
            value
        )));
    }

    let hours: u64 = fields[0]
        .parse()
        .map_err(|_| TarjimError::Subtitle(format!("Invalid timestamp: {:?}", value)))?;
    let minutes: u64 = fields[1]
        .parse()
        .map_err(|_| TarjimError::Subtitle(format!("Invalid timestamp: {:?}", value)))?;
    let secs: u64 = fields[2]
        .parse()
        .map_err(|_| TarjimError::Subtitle(format!("Invalid timestamp: {:?}", value)))?;
    let millis: u64 = millis
        .parse()
        .map_err(|_| TarjimError::Subtitle(format!("Invalid timestamp: {:?}", value)))?;

    Ok((hours * 3600 + minutes * 60 + secs) as f64 + millis as f64 / 1000.0)
}

/// Read a subtitle file trying UTF-8 first, then the legacy single-byte
/// encodings the transcriber has been observed to emit.
pub async fn read_with_encoding_fallback(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await?;

    match String::from_utf8(bytes) {
        Ok(content) => Ok(content),
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(&bytes);
            if !had_errors {
                debug!(
                    "Decoded {} as windows-1252 after UTF-8 failure",
                    path.display()
                );
                return Ok(decoded.into_owned());
            }

            // ISO-8859-1 maps every byte, so this final fallback cannot fail.
            debug!(
                "Decoded {} as iso-8859-1 after UTF-8 and windows-1252 failures",
                path.display()
            );
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// Write the document to disk as UTF-8, via a sibling temp file and rename
/// so a crash mid-write never leaves a partial subtitle file behind.
pub async fn write_srt(document: &SubtitleDocument, output_path: &Path) -> Result<()> {
    info!("Writing subtitle file: {}", output_path.display());

    let mut content = document.to_srt();
    content.push('\n');

    let parent = output_path
        .parent()
        .ok_or_else(|| TarjimError::Subtitle("Output path has no parent".to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| TarjimError::Subtitle(format!("Failed to create temp file: {}", e)))?;

    fs::write(temp.path(), content).await?;
    temp.persist(output_path)
        .map_err(|e| TarjimError::Subtitle(format!("Failed to persist subtitle file: {}", e)))?;

    Ok(())
}
