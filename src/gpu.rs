use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GpuConfig;

/// Read-only snapshot of one GPU, superseded on each probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDevice {
    pub index: u32,
    pub name: String,
    /// MiB
    pub memory_total: u64,
    /// MiB
    pub memory_used: u64,
    /// MiB
    pub memory_free: u64,
    /// Percent
    pub utilization: u32,
    /// Celsius
    pub temperature: u32,
    /// Derived 0-100 score
    pub score: u32,
}

/// Where one workload runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAssignment {
    Gpu(u32),
    Cpu,
}

impl DeviceAssignment {
    /// Device selector in the form the transcriber expects.
    pub fn device_arg(&self) -> String {
        match self {
            Self::Gpu(index) => format!("cuda:{}", index),
            Self::Cpu => "cpu".to_string(),
        }
    }

    /// Value for CUDA_VISIBLE_DEVICES: the device index, or empty to hide
    /// every GPU from a CPU-pinned workload.
    pub fn cuda_visible_devices(&self) -> String {
        match self {
            Self::Gpu(index) => index.to_string(),
            Self::Cpu => String::new(),
        }
    }
}

impl std::fmt::Display for DeviceAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.device_arg())
    }
}

/// Device assignment for both workloads, computed fresh on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub transcription: DeviceAssignment,
    pub translation: DeviceAssignment,
}

impl Allocation {
    pub fn all_cpu() -> Self {
        Self {
            transcription: DeviceAssignment::Cpu,
            translation: DeviceAssignment::Cpu,
        }
    }
}

/// Queries the vendor diagnostic tool for device snapshots.
pub struct GpuProbe {
    config: GpuConfig,
}

impl GpuProbe {
    pub fn new(config: GpuConfig) -> Self {
        Self { config }
    }

    /// List available devices. Hardware-query failures (missing driver,
    /// missing tool, permission denied) are treated as "no devices", never
    /// as an error.
    pub async fn list_devices(&self) -> Vec<GpuDevice> {
        let command = Command::new(&self.config.query_binary)
            .arg("--query-gpu=index,name,memory.total,memory.used,memory.free,utilization.gpu,temperature.gpu")
            .arg("--format=csv,noheader,nounits")
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(10), command).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("GPU query tool unavailable: {}", e);
                return Vec::new();
            }
            Err(_) => {
                warn!("GPU query timed out");
                return Vec::new();
            }
        };

        if !output.status.success() {
            debug!(
                "GPU query exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Vec::new();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices = parse_query_output(&stdout);
        info!("Detected {} GPU device(s)", devices.len());
        devices
    }
}

/// Parse the comma-separated query output. Malformed lines are skipped.
pub fn parse_query_output(stdout: &str) -> Vec<GpuDevice> {
    let mut devices = Vec::new();

    for line in stdout.lines() {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 7 {
            continue;
        }

        let parsed = (
            fields[0].parse::<u32>(),
            fields[2].parse::<u64>(),
            fields[3].parse::<u64>(),
            fields[4].parse::<u64>(),
        );
        let (Ok(index), Ok(memory_total), Ok(memory_used), Ok(memory_free)) = parsed else {
            debug!("Skipping unparseable GPU query line: {:?}", line);
            continue;
        };

        // Some boards report "[Not Supported]" for sensors
        let utilization = fields[5].parse::<u32>().unwrap_or(0);
        let temperature = fields[6].parse::<u32>().unwrap_or(0);
        let name = fields[1].to_string();
        let score = score_device(&name, memory_total, utilization, temperature);

        devices.push(GpuDevice {
            index,
            name,
            memory_total,
            memory_used,
            memory_free,
            utilization,
            temperature,
            score,
        });
    }

    devices
}

/// Score a device 0-100 from its snapshot. Pure function.
pub fn score_device(name: &str, memory_total_mb: u64, utilization: u32, temperature: u32) -> u32 {
    let mut score: i64 = 50;

    score += match memory_total_mb {
        m if m >= 24_000 => 25,
        m if m >= 16_000 => 20,
        m if m >= 12_000 => 15,
        m if m >= 8_000 => 10,
        m if m >= 6_000 => 5,
        _ => 0,
    };

    let name_lower = name.to_lowercase();
    let flagship = ["rtx 4090", "rtx 4080", "a100", "h100"];
    let high_end = ["rtx 4070", "rtx 3090", "rtx 3080", "a40"];
    let upper_mid = ["rtx 4060", "rtx 3070", "rtx 2080"];
    if flagship.iter().any(|m| name_lower.contains(m)) {
        score += 15;
    } else if high_end.iter().any(|m| name_lower.contains(m)) {
        score += 10;
    } else if upper_mid.iter().any(|m| name_lower.contains(m)) {
        score += 5;
    }

    if utilization > 80 {
        score -= 15;
    } else if utilization > 60 {
        score -= 5;
    }

    if temperature > 85 {
        score -= 15;
    } else if temperature > 75 {
        score -= 10;
    } else if temperature > 65 {
        score -= 5;
    }

    score.clamp(0, 100) as u32
}

/// Recommend a device assignment for both workloads. Pure function over the
/// snapshot: same input always yields the same allocation.
///
/// Translation is the heavier workload and benefits most from acceleration;
/// transcription is lighter but still gains from mid-range memory. A single
/// mid-size card therefore goes to transcription, a single small card to
/// translation, and a single large card is shared.
pub fn recommend(devices: &[GpuDevice]) -> Allocation {
    match devices.len() {
        0 => Allocation::all_cpu(),
        1 => {
            let device = &devices[0];
            let assignment = DeviceAssignment::Gpu(device.index);
            if device.memory_total >= 12_000 {
                Allocation {
                    transcription: assignment,
                    translation: assignment,
                }
            } else if device.memory_total >= 6_000 {
                Allocation {
                    transcription: assignment,
                    translation: DeviceAssignment::Cpu,
                }
            } else {
                Allocation {
                    transcription: DeviceAssignment::Cpu,
                    translation: assignment,
                }
            }
        }
        _ => {
            let mut ranked: Vec<&GpuDevice> = devices.iter().collect();
            // Ties broken by device index ascending
            ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
            Allocation {
                translation: DeviceAssignment::Gpu(ranked[0].index),
                transcription: DeviceAssignment::Gpu(ranked[1].index),
            }
        }
    }
}
