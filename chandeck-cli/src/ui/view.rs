//! Draws a `Board` snapshot. Nothing here mutates dashboard state.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap},
};

use chandeck_core::board::{Board, LayoutMode, StatusIndicator, UnitView};

use super::styles;

/// Cursor over the visible channel list.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    index: usize,
}

impl Selection {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn up(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub fn down(&mut self, len: usize) {
        if len > 0 && self.index + 1 < len {
            self.index += 1;
        }
    }

    /// Keep the cursor inside a list that may have shrunk.
    pub fn clamp(&mut self, len: usize) {
        if len == 0 {
            self.index = 0;
        } else if self.index >= len {
            self.index = len - 1;
        }
    }

    /// The selected channel's name.
    pub fn channel(&self, board: &Board) -> Option<String> {
        board.visible().nth(self.index).map(|v| v.channel.clone())
    }
}

pub fn draw(frame: &mut Frame, board: &Board, selection: &Selection, demo: bool) {
    let notice_height = if board.notice.is_some() { 1 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(notice_height),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(Paragraph::new(header_line(board, demo)), chunks[0]);
    draw_body(frame, board, selection, chunks[1]);
    if let Some(notice) = &board.notice {
        let line = Line::from(vec![
            Span::styled(notice.text.clone(), styles::notice(notice.level)),
            Span::styled("  (esc to dismiss)", styles::text_muted()),
        ]);
        frame.render_widget(Paragraph::new(line), chunks[2]);
    }
    frame.render_widget(Paragraph::new(footer_line()), chunks[3]);
}

fn header_line(board: &Board, demo: bool) -> Line<'static> {
    let server = board.server.clone().unwrap_or_else(|| "none".to_string());
    let running = board
        .visible()
        .filter(|v| v.status == StatusIndicator::Running)
        .count();
    let mut spans = vec![
        Span::styled(" chandeck ", styles::accent_bold()),
        Span::styled("server: ", styles::text_muted()),
        Span::styled(server, styles::text()),
        Span::styled("  layout: ", styles::text_muted()),
        Span::styled(board.layout.label(), styles::text()),
        Span::styled(
            format!("  {}/{} running", running, board.len()),
            styles::text_dim(),
        ),
    ];
    if demo {
        spans.push(Span::styled("  [demo]", styles::text_muted()));
    }
    Line::from(spans)
}

fn footer_line() -> Line<'static> {
    let hints = [
        ("↑↓/jk", "select"),
        ("space", "toggle"),
        ("v", "layout"),
        ("s", "server"),
        ("r", "refresh"),
        ("esc", "dismiss"),
        ("q", "quit"),
    ];
    let mut spans = vec![Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(key, styles::key_hint()));
        spans.push(Span::styled(format!(" {}  ", label), styles::text_muted()));
    }
    Line::from(spans)
}

fn draw_body(frame: &mut Frame, board: &Board, selection: &Selection, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border())
        .title(Span::styled(" Channels ", styles::title()));

    if let Some(banner) = &board.error_banner {
        let body = Paragraph::new(Span::styled(banner.clone(), styles::error()))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(body, area);
        return;
    }
    if board.server.is_none() {
        let body = Paragraph::new(Span::styled(
            "No server selected. Press s to pick one, or pass --server.",
            styles::text_muted(),
        ))
        .block(block);
        frame.render_widget(body, area);
        return;
    }
    if board.is_empty() {
        let body = Paragraph::new(Span::styled("Loading channels...", styles::text_muted()))
            .block(block);
        frame.render_widget(body, area);
        return;
    }

    match board.layout {
        LayoutMode::Compact => draw_compact(frame, board, selection, block, area),
        LayoutMode::Table => draw_table(frame, board, selection, block, area),
    }
}

fn draw_compact(frame: &mut Frame, board: &Board, selection: &Selection, block: Block, area: Rect) {
    let items: Vec<ListItem> = board
        .visible()
        .map(|v| ListItem::new(compact_lines(v)))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(styles::selection());
    let mut state = ListState::default().with_selected(Some(selection.index()));
    frame.render_stateful_widget(list, area, &mut state);
}

/// One channel as a multi-line card.
fn compact_lines(v: &UnitView) -> Vec<Line<'static>> {
    let (toggle, toggle_style) = styles::toggle(v.toggle);
    let mut lines = vec![
        Line::from(vec![
            Span::styled(format!(" {} ", styles::status_icon(v.status)), styles::status(v.status)),
            Span::styled(format!("{:<20}", v.channel), styles::title()),
            Span::styled(toggle, toggle_style),
            Span::raw("  "),
            Span::styled(v.pid_cpu.clone(), styles::text_dim()),
            Span::styled(format!("  up {}", v.uptime), styles::text_dim()),
        ]),
        Line::from(vec![
            Span::styled("   in  ", styles::text_muted()),
            Span::styled(v.uri.clone(), styles::text()),
            Span::raw("  "),
            Span::styled(v.bitrate.clone(), styles::bitrate(&v.bitrate)),
            Span::styled(
                format!("  video {}  audio {}", v.video_codecs.join(", "), v.audio_codec),
                styles::text_dim(),
            ),
        ]),
    ];
    if v.outputs.is_empty() {
        lines.push(Line::from(Span::styled("   No outputs", styles::text_muted())));
    }
    for out in &v.outputs {
        lines.push(Line::from(vec![
            Span::styled("   out ", styles::text_muted()),
            Span::styled(format!("{:<28}", out.label), styles::text()),
            Span::styled(out.bitrate.clone(), styles::bitrate(&out.bitrate)),
        ]));
    }
    lines
}

const TABLE_HEADER: [&str; 9] = [
    "", "Channel", "On", "Input", "PID/CPU", "Bitrate", "Uptime", "Codecs", "Outputs",
];

fn draw_table(frame: &mut Frame, board: &Board, selection: &Selection, block: Block, area: Rect) {
    let header = Row::new(TABLE_HEADER).style(styles::accent_bold());
    let rows: Vec<Row> = board
        .visible()
        .map(|v| {
            let cells = table_cells(v);
            let height = cells.iter().map(|c| c.lines().count()).max().unwrap_or(1) as u16;
            Row::new(cells).height(height.max(1))
        })
        .collect();
    let widths = [
        Constraint::Length(2),
        Constraint::Length(18),
        Constraint::Length(4),
        Constraint::Min(20),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(16),
        Constraint::Min(28),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(styles::selection());
    let mut state = TableState::default().with_selected(Some(selection.index()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn table_cells(v: &UnitView) -> Vec<String> {
    let outputs = if v.outputs.is_empty() {
        "No outputs".to_string()
    } else {
        v.outputs
            .iter()
            .map(|o| format!("{} {}", o.label, o.bitrate))
            .collect::<Vec<_>>()
            .join("\n")
    };
    vec![
        styles::status_icon(v.status).to_string(),
        v.channel.clone(),
        if v.toggle { "on" } else { "off" }.to_string(),
        v.uri.clone(),
        v.pid_cpu.clone(),
        v.bitrate.clone(),
        v.uptime.clone(),
        format!("{} / {}", v.video_codecs.join(","), v.audio_codec),
        outputs,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chandeck_core::board::{Notice, NoticeLevel, OutputLine};
    use ratatui::{Terminal, backend::TestBackend};

    fn view(name: &str, outputs: Vec<OutputLine>) -> UnitView {
        UnitView {
            channel: name.into(),
            layout: LayoutMode::Compact,
            status: StatusIndicator::Running,
            uri: "udp://239.0.0.1:5000".into(),
            pid_cpu: "PID: 42 CPU: 3.5%".into(),
            bitrate: "4.20 Mbps".into(),
            uptime: "1h 2m".into(),
            video_codecs: vec!["h264".into()],
            audio_codec: "aac".into(),
            outputs,
            toggle: true,
        }
    }

    fn board_with(layout: LayoutMode, views: Vec<UnitView>) -> Board {
        let mut board = Board::new(layout);
        board.server = Some("10.0.0.1".into());
        for v in views {
            let h = board.create(v);
            board.attach(h.container);
        }
        board
    }

    fn render(board: &Board) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal
            .draw(|f| draw(f, board, &Selection::default(), false))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_selection_stays_in_bounds() {
        let mut sel = Selection::default();
        sel.up();
        assert_eq!(sel.index(), 0);
        sel.down(2);
        sel.down(2);
        assert_eq!(sel.index(), 1);
        sel.clamp(1);
        assert_eq!(sel.index(), 0);
        sel.down(0);
        assert_eq!(sel.index(), 0);
    }

    #[test]
    fn test_compact_card_lists_outputs() {
        let out = OutputLine {
            label: "UDP: 239.0.0.2:6000".into(),
            bitrate: "No Signal".into(),
        };
        let screen = render(&board_with(LayoutMode::Compact, vec![view("news", vec![out])]));
        assert!(screen.contains("news"));
        assert!(screen.contains("UDP: 239.0.0.2:6000"));
        assert!(screen.contains("No Signal"));
        assert!(screen.contains("10.0.0.1"));
    }

    #[test]
    fn test_empty_output_list_says_so() {
        let lines = compact_lines(&view("news", vec![]));
        let text: String = lines
            .iter()
            .flat_map(|l| l.spans.iter().map(|s| s.content.to_string()))
            .collect();
        assert!(text.contains("No outputs"));
        assert_eq!(table_cells(&view("news", vec![]))[8], "No outputs");
    }

    #[test]
    fn test_table_has_header_row() {
        let screen = render(&board_with(LayoutMode::Table, vec![view("news", vec![])]));
        assert!(screen.contains("Channel"));
        assert!(screen.contains("Outputs"));
        assert!(screen.contains("news"));
    }

    #[test]
    fn test_banner_replaces_channel_list() {
        let mut board = board_with(LayoutMode::Compact, vec![view("news", vec![])]);
        board.clear();
        board.set_banner(Some("Error loading channels: HTTP 502".into()));
        board.set_notice(Some(Notice {
            level: NoticeLevel::Error,
            text: "start news rejected: busy".into(),
        }));
        let screen = render(&board);
        assert!(screen.contains("Error loading channels: HTTP 502"));
        assert!(screen.contains("rejected: busy"));
        assert!(!screen.contains("udp://239.0.0.1"));
    }
}
