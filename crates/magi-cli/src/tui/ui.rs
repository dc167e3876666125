//! TUI rendering — command-console layout.
//!
//! ┌──────────────────────────────────────────────┐
//! │  MAGI   SYNC 87.4%   tick #42   00:01:12     │
//! ├──────────────────────┬───────────────────────┤
//! │  CPU    ████░░  41%  │  Network  1.2 MB/s    │
//! │  MEM    ██████  63%  │  wifi / 4g  40 ms     │
//! │  SYNC   ▁▂▃▅▇▇▆▅▄▃   │  Battery  82% ⚡      │
//! ├──────────────────────┴───────────────────────┤
//! │  [12:00:01] SYS MAGI system monitor init...  │
//! │  [12:00:04] WRN CPU usage elevated: 61.2%    │
//! ├──────────────────────────────────────────────┤
//! │  ♪ 同期率は八十七パーセント...                 │
//! ├──────────────────────────────────────────────┤
//! │  v: voice   b: bgm   r: report   q: quit     │
//! └──────────────────────────────────────────────┘

use super::app::App;
use magi_core::{Severity, format_bytes, format_speed, format_uptime};
use ratatui::{prelude::*, widgets::*};

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(9), // gauges + status
            Constraint::Min(6),    // log feed
            Constraint::Length(3), // report / caption
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    draw_main(f, rows[1], app);
    draw_logs(f, rows[2], app);
    draw_report(f, rows[3], app);
    draw_keys(f, rows[4], app);
}

fn accent(app: &App) -> Color {
    if app.snapshot().is_emergency() {
        Color::Red
    } else {
        Color::Cyan
    }
}

fn level_color(value: f64, warn: f64, critical: f64) -> Color {
    if value > critical {
        Color::Red
    } else if value > warn {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let snap = app.snapshot();
    let accent = accent(app);
    let id = app.monitor_id();
    let short_id = id.get(..8).unwrap_or(id.as_str());
    let paused = if app.is_paused() { "  PAUSED" } else { "" };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent))
        .title(Line::from(vec![
            Span::styled(" MAGI ", Style::default().bold().fg(accent)),
            Span::raw(" SYNC "),
            Span::styled(
                format!("{:.1}%", snap.sync_rate),
                Style::default()
                    .bold()
                    .fg(level_color(100.0 - snap.sync_rate, 30.0, 50.0)),
            ),
            Span::styled(
                format!("  tick #{}  {}{paused} ", snap.tick, format_uptime(snap.uptime_seconds)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));

    let line = if snap.is_emergency() {
        Line::from(Span::styled(
            " EMERGENCY: resource usage critical ",
            Style::default().bold().fg(Color::White).bg(Color::Red),
        ))
    } else {
        Line::from(vec![
            Span::styled(" monitor ", Style::default().fg(Color::DarkGray)),
            Span::raw(short_id.to_string()),
            Span::styled(
                format!("  refresh {}ms", app.refresh_rate().as_millis()),
                Style::default().fg(Color::DarkGray),
            ),
        ])
    };
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    draw_gauges(f, cols[0], app);
    draw_status(f, cols[1], app);
}

fn draw_gauges(f: &mut Frame, area: Rect, app: &App) {
    let snap = app.snapshot();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent(app)))
        .title(" Resources ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Min(1),
        ])
        .split(inner);

    let cpu = Gauge::default()
        .label(format!("CPU {:.1}%  ({} cores)", snap.cpu_usage, snap.cpu_cores))
        .gauge_style(Style::default().fg(level_color(snap.cpu_usage, 60.0, 80.0)))
        .ratio((snap.cpu_usage / 100.0).clamp(0.0, 1.0));
    f.render_widget(cpu, rows[0]);

    let mem_label = if snap.memory_total_bytes > 0 {
        format!(
            "MEM {:.1}%  ({} / {})",
            snap.memory_usage,
            format_bytes(snap.memory_used_bytes as f64),
            format_bytes(snap.memory_total_bytes as f64)
        )
    } else {
        format!("MEM {:.1}%", snap.memory_usage)
    };
    let mem = Gauge::default()
        .label(mem_label)
        .gauge_style(Style::default().fg(level_color(snap.memory_usage, 70.0, 85.0)))
        .ratio((snap.memory_usage / 100.0).clamp(0.0, 1.0));
    f.render_widget(mem, rows[1]);

    let history = app.sync_history();
    let spark = Sparkline::default()
        .block(Block::default().title(Span::styled(
            "sync history",
            Style::default().fg(Color::DarkGray),
        )))
        .data(&history)
        .max(100)
        .style(Style::default().fg(Color::Magenta));
    f.render_widget(spark, rows[2]);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let snap = app.snapshot();
    let label = Style::default().fg(Color::DarkGray);

    let battery = match snap.battery_level {
        Some(level) => {
            let mut spans = vec![
                Span::styled("Battery   ", label),
                Span::styled(
                    format!("{level:.0}%"),
                    Style::default().fg(level_color(100.0 - level, 50.0, 80.0)),
                ),
            ];
            if snap.is_charging == Some(true) {
                spans.push(Span::styled("  charging", Style::default().fg(Color::Green)));
            }
            if let Some(secs) = snap.battery_time_remaining_s {
                spans.push(Span::styled(
                    format!("  {}", format_uptime(secs as u64)),
                    label,
                ));
            }
            Line::from(spans)
        }
        None => Line::from(vec![Span::styled("Battery   ", label), Span::raw("n/a")]),
    };

    let on_off = |on: bool| {
        if on {
            Span::styled("on ", Style::default().fg(Color::Green))
        } else {
            Span::styled("off", Style::default().fg(Color::DarkGray))
        }
    };

    let text = vec![
        Line::from(vec![
            Span::styled("Down      ", label),
            Span::raw(format_speed(snap.network_down_bps)),
        ]),
        Line::from(vec![
            Span::styled("Up        ", label),
            Span::raw(format_speed(snap.network_up_bps)),
        ]),
        Line::from(vec![
            Span::styled("Link      ", label),
            Span::raw(format!(
                "{} / {}  {:.0} ms",
                snap.network_type, snap.network_effective_type, snap.network_rtt_ms
            )),
        ]),
        battery,
        Line::from(vec![
            Span::styled("Uptime    ", label),
            Span::raw(format_uptime(snap.uptime_seconds)),
        ]),
        Line::from(vec![
            Span::styled("Voice ", label),
            on_off(app.voice_on()),
            Span::styled("  BGM ", label),
            on_off(app.bgm_on()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent(app)))
        .title(" System ");
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Warn => Color::Yellow,
        Severity::Error => Color::Red,
        Severity::Success => Color::Green,
        Severity::System => Color::Magenta,
    }
}

fn draw_logs(f: &mut Frame, area: Rect, app: &App) {
    // Newest entries at the bottom; show only what fits.
    let visible = area.height.saturating_sub(2) as usize;
    let total = app.logs().len();
    let lines: Vec<Line> = app
        .logs()
        .skip(total.saturating_sub(visible))
        .map(|e| {
            let color = severity_color(e.severity);
            let message = if app.is_localized() {
                &e.localized_message
            } else {
                &e.message
            };
            Line::from(vec![
                Span::styled(format!("[{}] ", e.timestamp), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<4}", e.severity.prefix()), Style::default().bold().fg(color)),
                Span::styled(message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    let title = if app.is_localized() {
        format!(" ログ ({total}) ")
    } else {
        format!(" Log ({total}) ")
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_report(f: &mut Frame, area: Rect, app: &App) {
    let (text, style) = match (app.caption(), app.last_report_text()) {
        (Some(caption), _) => (
            format!("♪ {}", caption.text),
            Style::default().fg(Color::Magenta),
        ),
        (None, Some(report)) => (report, Style::default().fg(Color::Yellow)),
        (None, None) => (
            "press r for a status report".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    };

    let block = Block::default().borders(Borders::ALL).title(" Report ");
    let p = Paragraph::new(text)
        .style(style)
        .wrap(Wrap { trim: true })
        .block(block);
    f.render_widget(p, area);
}

fn draw_keys(f: &mut Frame, area: Rect, app: &App) {
    let mut text =
        " v: voice   b: bgm   r: report   l: language   p: pause   s: save   +/-: refresh   q: quit"
            .to_string();
    if let Some(status) = app.status() {
        text.push_str("   | ");
        text.push_str(status);
    }
    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
