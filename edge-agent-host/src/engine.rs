//! Host-side container engine client
//!
//! Node facts come from sysinfo; container facts from the docker CLI when it
//! is installed. Without docker, `container_stats` reports the engine as
//! unavailable and the node info carries no engine version.
//!
//! Every docker call is bounded by a timeout, a hung daemon reads as unavailable.

use edge_telemetry::{ContainerStats, EngineClient, EngineError, NodeInfo};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::System;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Longest a single docker CLI call may take
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// One line of `docker stats --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct DockerStatsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    #[serde(rename = "MemUsage")]
    mem_usage: String,
    #[serde(rename = "NetIO")]
    net_io: String,
}

pub struct HostEngine {
    binary: String,
    timeout: Duration,
}

impl Default for HostEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEngine {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the docker CLI on a private runtime so callers stay synchronous.
    /// The child is killed when the timeout expires.
    fn docker(&self, args: &[&str]) -> Result<String, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Unavailable(format!("cannot start command runtime: {}", e)))?;

        let output = runtime
            .block_on(async {
                tokio::time::timeout(
                    self.timeout,
                    AsyncCommand::new(&self.binary)
                        .args(args)
                        .stdout(Stdio::piped())
                        .stderr(Stdio::piped())
                        .kill_on_drop(true)
                        .output(),
                )
                .await
            })
            .map_err(|_| {
                warn!("{} {} timed out after {:?}", self.binary, args.join(" "), self.timeout);
                EngineError::Unavailable(format!("{} timed out after {:?}", self.binary, self.timeout))
            })?
            .map_err(|e| EngineError::Unavailable(format!("{}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Command(stderr.trim().to_string()));
        }

        String::from_utf8(output.stdout).map_err(|e| EngineError::Parse(e.to_string()))
    }

    fn engine_version(&self) -> Option<String> {
        match self.docker(&["version", "--format", "{{.Server.Version}}"]) {
            Ok(version) if !version.trim().is_empty() => Some(version.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!("No engine version: {}", e);
                None
            }
        }
    }
}

impl EngineClient for HostEngine {
    fn orchestrator(&self) -> &str {
        "docker"
    }

    fn node_info(&self) -> Result<NodeInfo, EngineError> {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let operating_system = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());

        Ok(NodeInfo {
            hostname,
            operating_system,
            architecture: std::env::consts::ARCH.to_string(),
            engine_version: self.engine_version(),
            ..NodeInfo::default()
        })
    }

    fn container_stats(&self) -> Result<Vec<ContainerStats>, EngineError> {
        let output = self.docker(&["stats", "--no-stream", "--format", "{{json .}}"])?;
        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_stats_line)
            .collect()
    }
}

fn parse_stats_line(line: &str) -> Result<ContainerStats, EngineError> {
    let raw: DockerStatsLine = serde_json::from_str(line).map_err(|e| EngineError::Parse(e.to_string()))?;

    let (mem_usage, mem_limit) = split_pair(&raw.mem_usage);
    let (net_in, net_out) = split_pair(&raw.net_io);

    Ok(ContainerStats {
        id: raw.id,
        name: raw.name,
        cpu_percent: parse_percent(&raw.cpu_perc),
        mem_usage_mb: parse_size_mb(mem_usage),
        mem_limit_mb: parse_size_mb(mem_limit),
        net_in_mb: parse_size_mb(net_in),
        net_out_mb: parse_size_mb(net_out),
        // `docker stats` only lists running containers
        status: "running".to_string(),
    })
}

/// `"10MiB / 1.9GiB"` -> `("10MiB", "1.9GiB")`
fn split_pair(raw: &str) -> (&str, &str) {
    match raw.split_once('/') {
        Some((left, right)) => (left.trim(), right.trim()),
        None => (raw.trim(), ""),
    }
}

fn parse_percent(raw: &str) -> f64 {
    raw.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// Docker human size (`1.2kB`, `10MiB`, `3GB`, ...) in megabytes
fn parse_size_mb(raw: &str) -> f64 {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let Ok(value) = number.parse::<f64>() else {
        return 0.0;
    };

    let bytes = match unit.trim() {
        "B" | "" => value,
        "kB" | "KB" => value * 1e3,
        "KiB" => value * 1024.0,
        "MB" => value * 1e6,
        "MiB" => value * 1024.0 * 1024.0,
        "GB" => value * 1e9,
        "GiB" => value * 1024.0 * 1024.0 * 1024.0,
        "TB" => value * 1e12,
        "TiB" => value * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return 0.0,
    };
    bytes / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size_mb("10MiB"), 10.0);
        assert_eq!(parse_size_mb("1GiB"), 1024.0);
        assert_eq!(parse_size_mb("0B"), 0.0);
        assert_eq!(parse_size_mb("garbage"), 0.0);
        assert!((parse_size_mb("1.5kB") - 1500.0 / 1048576.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_stats_line() {
        let line = r#"{"BlockIO":"0B / 0B","CPUPerc":"1.25%","Container":"abc","ID":"abc123","MemPerc":"0.5%","MemUsage":"20MiB / 1GiB","Name":"web","NetIO":"2MiB / 1MiB","PIDs":"4"}"#;
        let stats = parse_stats_line(line).unwrap();
        assert_eq!(stats.id, "abc123");
        assert_eq!(stats.name, "web");
        assert_eq!(stats.cpu_percent, 1.25);
        assert_eq!(stats.mem_usage_mb, 20.0);
        assert_eq!(stats.mem_limit_mb, 1024.0);
        assert_eq!(stats.net_in_mb, 2.0);
        assert_eq!(stats.net_out_mb, 1.0);
    }

    #[test]
    fn test_bad_line_is_parse_error() {
        assert!(matches!(parse_stats_line("not json"), Err(EngineError::Parse(_))));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let engine = HostEngine::with_binary("definitely-not-a-container-engine");
        assert!(matches!(engine.container_stats(), Err(EngineError::Unavailable(_))));

        let info = engine.node_info().unwrap();
        assert!(!info.hostname.is_empty());
        assert_eq!(info.engine_version, None);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_engine_times_out() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("docker");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = HostEngine::with_binary(&script.to_string_lossy()).with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let result = engine.container_stats();
        assert!(started.elapsed() < Duration::from_secs(3));
        match result {
            Err(EngineError::Unavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected a timeout, got {:?}", other),
        }

        // node info degrades to no engine version instead of hanging
        let started = Instant::now();
        assert_eq!(engine.node_info().unwrap().engine_version, None);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
