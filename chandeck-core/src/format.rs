//! Display text for channel fields.
//!
//! Everything the board shows is a plain string produced here, so the
//! reconciliation logic can compare and patch values without knowing how
//! they are drawn.

use crate::board::LayoutMode;
use crate::model::OutputConfig;

/// Shown for unknown values while a channel is running.
pub const UNKNOWN: &str = "N/A";
/// Bitrate placeholder for stopped channels.
pub const STOPPED_BITRATE: &str = "0 Mbps";
/// Output slot text before the first telemetry poll lands.
pub const SLOT_PENDING: &str = "...";
pub const NO_SIGNAL: &str = "No Signal";

pub fn bitrate(mbps: Option<f64>) -> String {
    match mbps {
        Some(v) if v != 0.0 => format!("{:.2} Mbps", v),
        _ => STOPPED_BITRATE.to_string(),
    }
}

/// `1d 2h 3m 4s`, leaving out zero leading units. Seconds are always shown.
pub fn uptime(seconds: Option<u64>) -> String {
    let Some(total) = seconds.filter(|s| *s > 0) else {
        return UNKNOWN.to_string();
    };
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    parts.push(format!("{}s", secs));
    parts.join(" ")
}

/// Process line. Table rows are narrow and drop the CPU figure.
pub fn pid_cpu(pid: Option<u32>, cpu: Option<f64>, layout: LayoutMode) -> String {
    let pid_part = pid.map(|p| format!("PID: {}", p));
    let cpu_part = match layout {
        LayoutMode::Compact => cpu.map(|c| format!("CPU: {}%", c)),
        LayoutMode::Table => None,
    };
    match (pid_part, cpu_part) {
        (Some(p), Some(c)) => format!("{} {}", p, c),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (None, None) => UNKNOWN.to_string(),
    }
}

pub fn uri(uri: Option<&str>) -> String {
    uri.filter(|u| !u.is_empty()).unwrap_or(UNKNOWN).to_string()
}

pub fn output_label(output: &OutputConfig) -> String {
    let host = output.host.as_deref().unwrap_or_default();
    let port = output
        .port
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_default();
    match output.kind.as_str() {
        "udpsink" => format!("UDP: {}:{}", host, port),
        "tcpserversink" => format!("TCP: {}:{}", host, port),
        "rtmpsink" => format!("RTMP: {}", output.location.as_deref().unwrap_or_default()),
        "srtsink" => format!("SRT: {}", output.uri.as_deref().unwrap_or_default()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortValue;

    #[test]
    fn test_bitrate() {
        assert_eq!(bitrate(Some(4.5)), "4.50 Mbps");
        assert_eq!(bitrate(Some(0.0)), "0 Mbps");
        assert_eq!(bitrate(None), "0 Mbps");
    }

    #[test]
    fn test_uptime() {
        assert_eq!(uptime(None), "N/A");
        assert_eq!(uptime(Some(0)), "N/A");
        assert_eq!(uptime(Some(59)), "59s");
        assert_eq!(uptime(Some(3_600)), "1h 0s");
        assert_eq!(uptime(Some(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn test_pid_cpu_by_layout() {
        assert_eq!(
            pid_cpu(Some(7), Some(12.5), LayoutMode::Compact),
            "PID: 7 CPU: 12.5%"
        );
        assert_eq!(pid_cpu(Some(7), Some(12.5), LayoutMode::Table), "PID: 7");
        assert_eq!(pid_cpu(None, None, LayoutMode::Compact), "N/A");
    }

    #[test]
    fn test_output_labels() {
        let udp = OutputConfig {
            kind: "udpsink".into(),
            host: Some("239.1.1.1".into()),
            port: Some(PortValue::Number(1234)),
            ..Default::default()
        };
        assert_eq!(output_label(&udp), "UDP: 239.1.1.1:1234");

        let rtmp = OutputConfig {
            kind: "rtmpsink".into(),
            location: Some("rtmp://live/key".into()),
            ..Default::default()
        };
        assert_eq!(output_label(&rtmp), "RTMP: rtmp://live/key");

        let other = OutputConfig {
            kind: "filesink".into(),
            ..Default::default()
        };
        assert_eq!(output_label(&other), "filesink");
    }
}
