use crate::model::{NoticeLevel, PlayerState, Snapshot};
use crate::session::Session;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::time::Duration;

const APP_TITLE: &str = "RhythmSlicer  ";
const KEY_HINT: &str =
    "space play/pause  s stop  n/p next/prev  ←/→ seek  +/- vol  [/] speed  r repeat  h shuffle  d remove  q quit";

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    selected_bg: Color,
}

const PALETTE: Palette = Palette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    selected_bg: Color::Rgb(34, 55, 82),
};

pub fn draw(frame: &mut Frame, session: &Session, selected: usize) {
    let colors = PALETTE;
    let snapshot = session.snapshot();
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_line(snapshot, session.transport().backend_name(), &colors))
        .block(panel_block("Status", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(header, vertical[0]);

    let tracks = session.transport().playlist().tracks();
    let items: Vec<ListItem> = tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let playing = snapshot.current_index == Some(index);
            let marker = if playing { "  > " } else { "    " };
            let style = if playing {
                Style::default().fg(colors.accent).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(colors.text)
            };
            let mut spans = vec![
                Span::styled(marker, Style::default().fg(colors.muted)),
                Span::styled(track.display_title(), style),
            ];
            if let Some(artist) = track.artist() {
                spans.push(Span::styled(
                    format!("  {artist}"),
                    Style::default().fg(colors.muted),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut state = ListState::default();
    state.select((!tracks.is_empty()).then_some(selected.min(tracks.len().saturating_sub(1))));
    let playlist_title = format!("Playlist ({})", tracks.len());
    let list = List::new(items)
        .block(panel_block(
            &playlist_title,
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .highlight_style(Style::default().bg(colors.selected_bg));
    frame.render_stateful_widget(list, vertical[1], &mut state);

    let bar_width = usize::from(vertical[2].width.saturating_sub(40)).max(10);
    let timeline = Paragraph::new(timeline_line(snapshot, bar_width))
        .style(Style::default().fg(colors.text))
        .block(panel_block("Now", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(timeline, vertical[2]);

    let footer = match session.notices().last() {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => colors.text,
                NoticeLevel::Warning | NoticeLevel::Error => colors.alert,
            };
            Span::styled(notice.text.as_str(), Style::default().fg(color))
        }
        None => Span::styled(KEY_HINT, Style::default().fg(colors.muted)),
    };
    frame.render_widget(
        Paragraph::new(footer).block(panel_block(
            "Keys",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        vertical[3],
    );
}

fn header_line(snapshot: &Snapshot, backend: &str, colors: &Palette) -> Line<'static> {
    let state_color = match snapshot.state {
        PlayerState::Playing => colors.accent,
        PlayerState::Paused => colors.alert,
        PlayerState::Stopped => colors.muted,
    };
    let title = snapshot
        .current_track
        .as_ref()
        .map(|track| track.display_title())
        .unwrap_or_else(|| String::from("-"));
    let position = snapshot
        .order_position
        .map(|position| format!("{position}/{}", snapshot.playlist_len))
        .unwrap_or_default();

    Line::from(vec![
        Span::styled(
            APP_TITLE,
            Style::default().fg(colors.accent).add_modifier(Modifier::BOLD),
        ),
        Span::styled(snapshot.state.label(), Style::default().fg(state_color)),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(title, Style::default().fg(colors.text)),
        Span::styled(format!(" {position}"), Style::default().fg(colors.muted)),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(
            format!(
                "repeat {}  shuffle {}  speed {:.2}x  [{backend}]",
                snapshot.repeat.label(),
                if snapshot.shuffle { "on" } else { "off" },
                snapshot.speed
            ),
            Style::default().fg(colors.muted),
        ),
    ])
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(snapshot: &Snapshot, bar_width: usize) -> String {
    let ratio = snapshot.duration.and_then(|duration| {
        let total = duration.as_secs_f64();
        (total > 0.0).then_some(snapshot.position.as_secs_f64() / total)
    });
    format!(
        "{} / {} {}  |  Vol {:>3}%",
        format_duration(snapshot.position),
        snapshot
            .duration
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, bar_width),
        snapshot.volume
    )
}
