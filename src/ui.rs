use alloy_primitives::U256;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph},
};
use std::str::FromStr;
use std::time::Duration;

use crate::chart::{self, ChartBoard, ChartKind, ChartSeries};
use crate::config::STALE_AFTER;
use crate::data::{ConnectionStatus, FeedStatus};

const CHART_COLORS: [Color; 4] = [Color::Cyan, Color::Magenta, Color::Green, Color::Yellow];

pub struct Dashboard {
    pub should_quit: bool,
    poll_interval: Duration,
}

impl Dashboard {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            should_quit: false,
            poll_interval,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn render(&self, frame: &mut Frame, board: &ChartBoard, status: &FeedStatus) {
        let mut constraints = vec![Constraint::Length(3)]; // connection
        constraints.extend(board.iter().map(|_| Constraint::Min(8)));
        constraints.push(Constraint::Length(3)); // help

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(frame.area());

        self.render_connection_status(frame, chunks[0], status);
        for (idx, series) in board.iter().enumerate() {
            let series = chart::read(series);
            self.render_chart(frame, chunks[idx + 1], &series, CHART_COLORS[idx % CHART_COLORS.len()]);
        }
        self.render_help(frame, chunks[board.len() + 1]);
    }

    fn render_connection_status(&self, frame: &mut Frame, area: Rect, status: &FeedStatus) {
        let status_text = match &status.connection_status {
            ConnectionStatus::Connected => "Connected".to_string(),
            ConnectionStatus::Stale => "Stale".to_string(),
            ConnectionStatus::Disconnected => "Disconnected".to_string(),
            ConnectionStatus::Error(err) => format!("Error: {}", err),
        };

        let status_style = match &status.connection_status {
            ConnectionStatus::Connected => Style::default().fg(Color::Green),
            ConnectionStatus::Stale => Style::default().fg(Color::Yellow),
            ConnectionStatus::Disconnected | ConnectionStatus::Error(_) => {
                Style::default().fg(Color::Red)
            }
        };

        let head = status
            .head
            .map(|h| format!("#{}", h))
            .unwrap_or_else(|| "N/A".to_string());
        let last_update = match status.last_successful.map(|t| t.elapsed()) {
            Some(elapsed) if elapsed < Duration::from_secs(1) => "< 1s ago".to_string(),
            Some(elapsed) => format!("{}s ago", elapsed.as_secs()),
            None => "--".to_string(),
        };

        let mut line_parts = vec![
            Span::styled("Status: ", Style::default()),
            Span::styled(status_text, status_style),
            Span::raw(" | RPC: "),
            Span::styled(status.rpc_url.as_str(), Style::default().fg(Color::Cyan)),
            Span::raw(" | Head: "),
            Span::styled(head, Style::default().fg(Color::Green)),
            Span::raw(" | Updated: "),
            Span::styled(last_update, Style::default().fg(Color::Yellow)),
        ];

        if matches!(status.connection_status, ConnectionStatus::Stale) {
            line_parts.push(Span::raw(" | Stale > "));
            line_parts.push(Span::styled(
                format!("{}s", STALE_AFTER.as_secs()),
                Style::default().fg(Color::Yellow),
            ));
        }
        if status.failed_updates > 0 {
            line_parts.push(Span::raw(" | Failed: "));
            line_parts.push(Span::styled(
                status.failed_updates.to_string(),
                Style::default().fg(Color::Red),
            ));
        }

        let paragraph = Paragraph::new(Line::from(line_parts))
            .block(Block::default().title("Connection").borders(Borders::ALL));

        frame.render_widget(paragraph, area);
    }

    fn render_chart(&self, frame: &mut Frame, area: Rect, series: &ChartSeries, color: Color) {
        let title = chart_title(series);

        if series.is_empty() {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "(waiting for blocks)",
                Style::default().fg(Color::DarkGray),
            )))
            .block(Block::default().title(title).borders(Borders::ALL));
            frame.render_widget(paragraph, area);
            return;
        }

        let bars: Vec<Bar> = series
            .points()
            .map(|(label, value)| {
                Bar::default()
                    .value(bar_height(value))
                    .label(Line::from(label.to_string()))
                    .text_value(series.kind.display_value(value))
            })
            .collect();

        let slots = u16::try_from(series.max_window).unwrap_or(u16::MAX).max(1);
        let bar_width = (area.width.saturating_sub(2) / slots).saturating_sub(1).max(1);

        let mut barchart = BarChart::default()
            .block(Block::default().title(title).borders(Borders::ALL))
            .data(BarGroup::default().bars(&bars))
            .bar_width(bar_width)
            .bar_gap(1)
            .bar_style(Style::default().fg(color))
            .value_style(Style::default().fg(Color::Black).bg(color))
            .label_style(Style::default().fg(Color::Gray));
        if matches!(series.kind, ChartKind::GasRatio) {
            barchart = barchart.max(100);
        }

        frame.render_widget(barchart, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect) {
        let help_text = vec![Line::from(vec![
            Span::styled("Press ", Style::default()),
            Span::styled("'q'", Style::default().fg(Color::Yellow)),
            Span::styled(" to quit | Polling every ", Style::default()),
            Span::styled(
                format!("{}ms", self.poll_interval.as_millis()),
                Style::default().fg(Color::Cyan),
            ),
        ])];

        let paragraph =
            Paragraph::new(help_text).block(Block::default().title("Help").borders(Borders::ALL));

        frame.render_widget(paragraph, area);
    }
}

fn chart_title(series: &ChartSeries) -> String {
    match series.latest() {
        Some((block, value)) => format!(
            "{} | #{}: {}",
            series.kind.title(),
            block,
            series.kind.display_value(value)
        ),
        None => series.kind.title().to_string(),
    }
}

/// Bar height for a decimal metric string, clamped into u64.
fn bar_height(value: &str) -> u64 {
    U256::from_str(value)
        .map(|v| v.saturating_to::<u64>())
        .unwrap_or(0)
}
