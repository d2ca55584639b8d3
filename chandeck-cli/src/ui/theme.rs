//! Color palette and style helpers for the dashboard.

use ratatui::style::{Color, Modifier, Style};

use chandeck_core::board::{NoticeLevel, StatusIndicator};

/// Color palette tokens
#[derive(Clone, Debug)]
pub struct Palette {
    pub panel_border: Color,
    pub text: Color,
    /// Secondary info (uptime, codecs)
    pub text_dim: Color,
    /// Placeholders and disabled rows
    pub text_muted: Color,
    pub accent: Color,
    /// Running channel
    pub success: Color,
    pub warn: Color,
    pub error: Color,
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            info: Color::Rgb(156, 220, 254),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn status_style(&self, status: StatusIndicator) -> Style {
        let color = match status {
            StatusIndicator::Running => self.palette.success,
            StatusIndicator::Stopped => self.palette.error,
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn status_icon(&self, status: StatusIndicator) -> &'static str {
        match status {
            StatusIndicator::Running => "●",
            StatusIndicator::Stopped => "○",
        }
    }

    pub fn toggle_label(&self, checked: bool) -> (&'static str, Style) {
        if checked {
            ("[ON ]", Style::default().fg(self.palette.success))
        } else {
            ("[OFF]", Style::default().fg(self.palette.text_muted))
        }
    }

    pub fn notice_style(&self, level: NoticeLevel) -> Style {
        let color = match level {
            NoticeLevel::Info => self.palette.info,
            NoticeLevel::Error => self.palette.error,
        };
        Style::default().fg(color)
    }

    /// Output bitrate: placeholders are dimmed, "No Signal" is a warning.
    pub fn bitrate_style(&self, text: &str) -> Style {
        match text {
            "No Signal" => Style::default().fg(self.palette.warn),
            "..." => Style::default().fg(self.palette.text_muted),
            _ => Style::default().fg(self.palette.text),
        }
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.palette.panel_border)
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn accent_bold_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Shorthands over the default theme
pub mod styles {
    use super::*;

    pub fn status(status: StatusIndicator) -> Style {
        theme().status_style(status)
    }

    pub fn status_icon(status: StatusIndicator) -> &'static str {
        theme().status_icon(status)
    }

    pub fn toggle(checked: bool) -> (&'static str, Style) {
        theme().toggle_label(checked)
    }

    pub fn notice(level: NoticeLevel) -> Style {
        theme().notice_style(level)
    }

    pub fn bitrate(text: &str) -> Style {
        theme().bitrate_style(text)
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn border() -> Style {
        theme().border_style()
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn accent_bold() -> Style {
        theme().accent_bold_style()
    }

    pub fn error() -> Style {
        theme().error_style()
    }

    pub fn title() -> Style {
        theme().title_style()
    }
}
