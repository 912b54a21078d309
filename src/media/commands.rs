use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::stop::StopToken;

/// Normalized failure of an external tool invocation.
#[derive(Debug, Clone)]
pub enum ToolFailure {
    /// The binary could not be launched at all
    Launch(String),
    /// The process outlived its wall-clock budget and was killed
    Timeout(Duration),
    /// The batch was stopped and the process was killed
    Interrupted,
    /// Non-zero exit
    Failed { code: Option<i32>, stderr: String },
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launch(e) => write!(f, "failed to launch: {}", e),
            Self::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            Self::Interrupted => write!(f, "interrupted by stop request"),
            Self::Failed { code, stderr } => match code {
                Some(code) => write!(f, "exited with code {}: {}", code, stderr.trim()),
                None => write!(f, "killed by signal: {}", stderr.trim()),
            },
        }
    }
}

/// Abstract external tool command with a bounded wall-clock budget.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub description: String,
    pub timeout: Duration,
}

impl ToolCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        binary_path: S1,
        description: S2,
        timeout: Duration,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            envs: Vec::new(),
            description: description.into(),
            timeout,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-acodec").arg(codec)
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Run the command to completion, killing the process on timeout or
    /// stop request. No retries at this layer.
    pub async fn execute(&self, stop: &StopToken) -> Result<std::process::Output, ToolFailure> {
        debug!(
            "Executing {}: {} {:?}",
            self.description, self.binary_path, self.args
        );

        let mut command = Command::new(&self.binary_path);
        command
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let child = command
            .spawn()
            .map_err(|e| ToolFailure::Launch(e.to_string()))?;

        // Dropping the un-awaited branch kills the child via kill_on_drop
        tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) if output.status.success() => Ok(output),
                    Ok(Ok(output)) => Err(ToolFailure::Failed {
                        code: output.status.code(),
                        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    }),
                    Ok(Err(e)) => Err(ToolFailure::Launch(e.to_string())),
                    Err(_) => Err(ToolFailure::Timeout(self.timeout)),
                }
            }
            _ = stop.cancelled() => Err(ToolFailure::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick<S: Into<String>>(binary: S) -> ToolCommand {
        ToolCommand::new(binary, "test command", Duration::from_secs(5))
    }

    #[test]
    fn builder_accumulates_ffmpeg_style_args() {
        let cmd = quick("ffmpeg")
            .input("/media/in.mkv")
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000)
            .audio_channels(1)
            .overwrite()
            .output("/tmp/audio.wav");

        assert_eq!(
            cmd.args,
            vec![
                "-i", "/media/in.mkv", "-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1",
                "-y", "/tmp/audio.wav"
            ]
        );
    }

    #[tokio::test]
    async fn execute_reports_missing_binary_as_launch_failure() {
        let result = quick("tarjim-no-such-binary").execute(&StopToken::new()).await;
        assert!(matches!(result, Err(ToolFailure::Launch(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_reports_nonzero_exit() {
        let result = quick("false").execute(&StopToken::new()).await;
        assert!(matches!(result, Err(ToolFailure::Failed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_kills_on_timeout() {
        let cmd = ToolCommand::new("sleep", "sleep", Duration::from_millis(50)).arg("30");
        let result = cmd.execute(&StopToken::new()).await;
        assert!(matches!(result, Err(ToolFailure::Timeout(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_honors_stop_token() {
        let stop = StopToken::new();
        let cmd = ToolCommand::new("sleep", "sleep", Duration::from_secs(30)).arg("30");

        let handle = {
            let stop = stop.clone();
            tokio::spawn(async move { cmd.execute(&stop).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ToolFailure::Interrupted)));
    }
}
