use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context as _;

use chandeck_core::board::{Board, LayoutMode, StatusIndicator};
use chandeck_core::clock::SystemClock;
use chandeck_core::engine::render_once;

use crate::context::AppContext;

pub async fn run_list(ctx: &AppContext) -> anyhow::Result<()> {
    let server = super::target_server(ctx)?;
    let backend = ctx.factory().connect(&server);
    let board = render_once(backend, Arc::new(SystemClock), LayoutMode::Table)
        .await
        .with_context(|| format!("loading channels from {}", server))?;
    print!("{}", format_board(&board));
    Ok(())
}

fn format_board(board: &Board) -> String {
    let mut out = String::new();
    if board.is_empty() {
        out.push_str("No channels configured.\n");
        return out;
    }

    let width = board
        .visible()
        .map(|v| v.channel.len())
        .max()
        .unwrap_or(0)
        .max("CHANNEL".len());
    let _ = writeln!(
        out,
        "{:<8} {:<width$} {:<28} {:<12} {:<12} {:<10}",
        "STATUS", "CHANNEL", "INPUT", "PID", "BITRATE", "UPTIME"
    );
    for v in board.visible() {
        let status = match v.status {
            StatusIndicator::Running => "running",
            StatusIndicator::Stopped => "stopped",
        };
        let _ = writeln!(
            out,
            "{:<8} {:<width$} {:<28} {:<12} {:<12} {:<10}",
            status, v.channel, v.uri, v.pid_cpu, v.bitrate, v.uptime
        );
        if v.outputs.is_empty() {
            let _ = writeln!(out, "    No outputs");
        }
        for o in &v.outputs {
            let _ = writeln!(out, "    -> {}  {}", o.label, o.bitrate);
        }
    }
    let running = board
        .visible()
        .filter(|v| v.status == StatusIndicator::Running)
        .count();
    let _ = writeln!(out, "\n{} channels, {} running", board.len(), running);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chandeck_core::clock::ManualClock;
    use chandeck_core::fake::FakeControlPlane;
    use chandeck_core::model::ChannelConfig;

    #[tokio::test]
    async fn test_list_output() {
        let fake = FakeControlPlane::new();
        fake.add_channel(ChannelConfig::new("news"), true);
        fake.add_channel(ChannelConfig::new("backup"), false);
        let board = render_once(
            Arc::new(fake),
            Arc::new(ManualClock::new(0)),
            LayoutMode::Table,
        )
        .await
        .unwrap();

        let text = format_board(&board);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("STATUS"));
        assert!(text.contains("running  news"));
        assert!(text.contains("stopped  backup"));
        assert!(text.contains("No outputs"));
        assert!(text.trim_end().ends_with("2 channels, 1 running"));
    }

    #[test]
    fn test_empty_board() {
        assert_eq!(format_board(&Board::new(LayoutMode::Table)), "No channels configured.\n");
    }
}
