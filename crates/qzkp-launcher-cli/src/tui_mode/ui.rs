//! Rendering for the interactive front-end.

use super::app::{App, Field, SaveTarget};
use qzkp_launcher::results::{ResultPlot, SeriesKind};
use qzkp_launcher::NoiseInput;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, Gauge, GraphType, Paragraph},
    Frame,
};

const SLIDER_WIDTH: u32 = 10;

pub fn draw(f: &mut Frame, app: &App) {
    let [left, right] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(46), Constraint::Min(30)])
        .areas(f.area());
    let [params, help] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(5)])
        .areas(left);
    let [console, gauge, chart, status] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(1),
        ])
        .areas(right);

    render_parameters(f, params, app);
    render_help(f, help, app);
    render_console(f, console, app);
    render_gauge(f, gauge, app);
    render_chart(f, chart, app.ui.plot.as_ref());
    render_status(f, status, app);
    if app.prompt.is_some() {
        render_prompt(f, app);
    }
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
}

fn render_parameters(f: &mut Frame, area: Rect, app: &App) {
    let running = app.is_running();
    let lines: Vec<Line> = Field::visible(app.form.variant)
        .iter()
        .flat_map(|field| {
            let (label, value) = field_text(app, *field);
            let value_style = if running {
                Style::default().fg(Color::DarkGray)
            } else if *field == app.focus {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            [
                Line::from(Span::styled(label, Style::default().fg(Color::Gray))),
                Line::from(vec![Span::raw("  "), Span::styled(value, value_style)]),
            ]
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(panel(" Parameters ")), area);
}

fn field_text(app: &App, field: Field) -> (String, String) {
    let form = &app.form;
    let noise = form.variant.noise();
    match field {
        Field::Variant => ("Simulation".into(), format!("< {} >", form.variant.label())),
        Field::KeyLength => ("Key length".into(), form.key_length.clone()),
        Field::Iterations => ("No. of iterations".into(), form.iterations.clone()),
        Field::NoiseA | Field::NoiseB => {
            let (label, input) = match (field, noise) {
                (Field::NoiseA, Some(spec)) => (spec.first_label, &form.noise_a),
                (_, Some(spec)) => (spec.second_label, &form.noise_b),
                (_, None) => ("Noise", &form.noise_a),
            };
            let max_ticks = noise.map_or(0, |spec| spec.max_ticks);
            (label.into(), slider_text(input, max_ticks))
        }
        Field::Attacker => {
            let mark = if form.attacker { "[x]" } else { "[ ]" };
            ("Attacker".into(), format!("{mark} simulate attacker"))
        }
        Field::Format => ("Save format".into(), format!("< {} >", app.format.label())),
    }
}

/// `[###-------] 0.03` for slider positions, the raw text for typed values.
fn slider_text(input: &NoiseInput, max_ticks: u32) -> String {
    match input {
        NoiseInput::Slider(ticks) if max_ticks > 0 => {
            let filled = (*ticks).min(max_ticks) * SLIDER_WIDTH / max_ticks;
            let bar: String = (0..SLIDER_WIDTH)
                .map(|i| if i < filled { '#' } else { '-' })
                .collect();
            format!("[{bar}] {}", input.display())
        }
        _ => input.display(),
    }
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let dim = Style::default().fg(Color::DarkGray);
    let run_style = if app.is_running() {
        dim
    } else {
        Style::default().fg(Color::Green)
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("[Enter] run", run_style),
            Span::styled("  [Tab/↑↓] field  [←→] change", dim),
        ]),
        Line::from(Span::styled(
            "[s] save data  [l] save log  [PgUp/PgDn] scroll  [q] quit",
            dim,
        )),
    ];
    f.render_widget(Paragraph::new(lines).block(panel(" Controls ")), area);
}

fn render_console(f: &mut Frame, area: Rect, app: &App) {
    let block = panel(" Output ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let console = &app.ui.console;
    let end = console.len().saturating_sub(app.ui.scroll);
    let start = end.saturating_sub(usize::from(inner.height));
    let lines: Vec<Line> = console
        .get(start..end)
        .unwrap_or_default()
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_gauge(f: &mut Frame, area: Rect, app: &App) {
    let progress = &app.ui.progress;
    let label = match app.time_label() {
        Some(time) => format!("{}  {time}", progress.label()),
        None => progress.label().to_string(),
    };
    let gauge = Gauge::default()
        .block(panel(" Progress "))
        .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
        .percent(progress.whole_percent())
        .label(label);
    f.render_widget(gauge, area);
}

fn series_style(kind: SeriesKind) -> Style {
    match kind {
        SeriesKind::Honest => Style::default().fg(Color::Green),
        SeriesKind::Dishonest => Style::default().fg(Color::Red),
        SeriesKind::All => Style::default().fg(Color::Cyan),
    }
}

fn axis_labels(bounds: [f64; 2]) -> Vec<String> {
    let [low, high] = bounds;
    vec![
        format!("{low:.0}"),
        format!("{:.0}", (low + high) / 2.0),
        format!("{high:.0}"),
    ]
}

fn render_chart(f: &mut Frame, area: Rect, plot: Option<&ResultPlot>) {
    let Some(plot) = plot else {
        let placeholder = Paragraph::new("Iterative runs plot their results here.")
            .style(Style::default().fg(Color::DarkGray))
            .block(panel(" Results "));
        f.render_widget(placeholder, area);
        return;
    };
    let datasets = plot
        .series
        .iter()
        .map(|series| {
            Dataset::default()
                .name(series.kind.label())
                .marker(Marker::Dot)
                .graph_type(GraphType::Scatter)
                .style(series_style(series.kind))
                .data(&series.points)
        })
        .collect();
    let chart = Chart::new(datasets)
        .block(panel(plot.title))
        .x_axis(
            Axis::default()
                .title("Iteration")
                .bounds(plot.x_bounds)
                .labels(axis_labels(plot.x_bounds)),
        )
        .y_axis(
            Axis::default()
                .title("Success Rate (%)")
                .bounds(plot.y_bounds)
                .labels(axis_labels(plot.y_bounds)),
        );
    f.render_widget(chart, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let style = if app.is_running() {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Gray)
    };
    let line = Line::from(vec![Span::raw(" "), Span::styled(&app.ui.status, style)]);
    f.render_widget(Paragraph::new(line), area);
}

fn render_prompt(f: &mut Frame, app: &App) {
    let Some(prompt) = &app.prompt else {
        return;
    };
    let title = match prompt.target {
        SaveTarget::Data => format!(" Save data as ({}) ", app.format.label()),
        SaveTarget::Log => " Save console log as ".to_string(),
    };
    let area = centered(f.area(), 60, 3);
    f.render_widget(Clear, area);
    let input = Paragraph::new(format!("{}_", prompt.input)).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(input, area);
}

fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let [_, row, _] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .areas(area);
    let [_, cell, _] = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .areas(row);
    cell
}
