use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};

use crate::config::ViewConfig;
use crate::message::ViewId;
use crate::views::{Body, FieldLine, Screen};

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const SELECTED_BG: Color = Color::Rgb(24, 36, 58);

pub fn render(frame: &mut Frame, screen: &Screen, config: &ViewConfig, view: ViewId) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], screen, config, view);
    render_body(frame, root[1], screen);
    render_footer(frame, root[2], screen);
}

fn render_header(frame: &mut Frame, area: Rect, screen: &Screen, config: &ViewConfig, view: ViewId) {
    let mut left = Vec::new();
    push_powerline_segment(&mut left, " 󱃾 kubenav ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut left,
        format!(" {} ", view_icon(view)),
        Color::White,
        PL_B,
        BG,
    );
    left.push(Span::styled(
        format!(
            " {}",
            compact_text(&screen.title, area.width.saturating_sub(24) as usize)
        ),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    ));
    let left_line = Line::from(left);

    let identity = &config.identity;
    let mut right = Vec::new();
    if !identity.context.is_empty() {
        push_powerline_segment_rtl(
            &mut right,
            format!(" 󰠳 {} ", identity.context),
            Color::White,
            PL_C,
            BG,
        );
    }
    if !identity.cluster.is_empty() {
        push_powerline_segment_rtl(
            &mut right,
            format!(" {} ", display_cluster_endpoint(&identity.cluster)),
            Color::White,
            PL_B,
            PL_C,
        );
    }

    let right_width = spans_width(&right) as u16;
    let left_width = spans_width(&left_line.spans) as u16;
    if right_width == 0 || right_width.saturating_add(left_width) > area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(right))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn panel(title: String, error: Option<&str>) -> Block<'static> {
    let mut block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if error.is_some() { ERROR } else { ACCENT }))
        .style(Style::default().bg(PANEL));
    // The last good body stays visible; the failure is annotated on the border.
    if let Some(error) = error {
        block = block.title_bottom(Line::from(Span::styled(
            format!(" 󰅚 {} ", error.lines().next().unwrap_or_default()),
            Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        )));
    }
    block
}

fn render_body(frame: &mut Frame, area: Rect, screen: &Screen) {
    let error = screen.error.as_deref();
    match &screen.body {
        Body::Menu { items, selected } => {
            let list = List::new(
                items
                    .iter()
                    .map(|item| ListItem::new(item.clone()).style(Style::default().fg(Color::White))),
            )
            .block(panel(screen.title.clone(), error))
            .highlight_style(Style::default().bg(SELECTED_BG).add_modifier(Modifier::BOLD))
            .highlight_symbol("󰜴 ");
            let mut state = ListState::default();
            state.select(*selected);
            frame.render_stateful_widget(list, area, &mut state);
        }
        Body::Table {
            headers,
            rows,
            selected,
        } => render_table(frame, area, screen, headers, rows, *selected),
        Body::Text {
            lines,
            offset,
            total,
            structured,
        } => {
            let end = (*offset + lines.len()).min(*total);
            let title = if *total == 0 {
                screen.title.clone()
            } else {
                format!("{} [{}-{end}/{total}]", screen.title, offset + 1)
            };
            let text = if *structured {
                Text::from(lines.iter().map(|line| highlight_yaml_line(line)).collect::<Vec<_>>())
            } else {
                Text::from(lines.iter().map(|line| Line::raw(line.clone())).collect::<Vec<_>>())
            };
            let paragraph = Paragraph::new(text)
                .block(panel(title, error))
                .style(Style::default().fg(Color::White));
            frame.render_widget(paragraph, area);
        }
        Body::Form { fields, focused } => render_form(frame, area, screen, fields, *focused),
        Body::Dialog {
            prompt,
            options,
            highlighted,
        } => {
            frame.render_widget(panel(String::new(), None), area);
            render_dialog(frame, area, prompt, options, *highlighted, error);
        }
        Body::Loading(message) => {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                format!("󰔟 {message}"),
                Style::default().fg(MUTED),
            )))
            .alignment(Alignment::Center)
            .block(panel(screen.title.clone(), error));
            frame.render_widget(paragraph, area);
        }
        Body::Notice(message) => {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                message.clone(),
                Style::default().fg(WARN),
            )))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false })
            .block(panel(screen.title.clone(), error));
            frame.render_widget(paragraph, area);
        }
    }
}

fn render_table(
    frame: &mut Frame,
    area: Rect,
    screen: &Screen,
    headers: &[String],
    rows: &[Vec<String>],
    selected: Option<usize>,
) {
    let header_row = Row::new(headers.iter().map(|header| {
        Cell::from(header.clone()).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let body_rows = rows.iter().map(|row| {
        Row::new(
            row.iter()
                .map(|column| Cell::from(column.clone()).style(Style::default().fg(Color::White))),
        )
    });

    let table = Table::new(body_rows, column_constraints(headers.len()))
        .header(header_row)
        .block(panel(screen.title.clone(), screen.error.as_deref()))
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(SELECTED_BG).add_modifier(Modifier::BOLD))
        .highlight_symbol("󰜴 ");

    let mut state = TableState::default();
    state.select(selected);
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_form(frame: &mut Frame, area: Rect, screen: &Screen, fields: &[FieldLine], focused: usize) {
    let label_width = fields
        .iter()
        .map(|field| field.label.chars().count())
        .max()
        .unwrap_or_default();

    let mut lines = Vec::new();
    let mut cursor_row = None;
    for (index, field) in fields.iter().enumerate() {
        let active = index == focused;
        if active {
            cursor_row = Some(lines.len());
        }
        let marker = if active { "󰜴 " } else { "  " };
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(ACCENT)),
            Span::styled(
                format!("{:<label_width$}  ", field.label),
                Style::default().fg(if active { ACCENT } else { MUTED }),
            ),
            Span::styled(
                field.value.clone(),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(if active { Modifier::BOLD } else { Modifier::empty() }),
            ),
        ]));
        if let Some(error) = &field.error {
            lines.push(Line::from(Span::styled(
                format!("  {:<label_width$}  {error}", ""),
                Style::default().fg(ERROR),
            )));
        }
    }

    let block = panel(screen.title.clone(), screen.error.as_deref());
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);

    if let (Some(row), Some(field)) = (cursor_row, fields.get(focused)) {
        let column = 2 + label_width + 2 + field.cursor;
        let x = inner.x.saturating_add(column as u16);
        let y = inner.y.saturating_add(row as u16);
        if x < inner.right() && y < inner.bottom() {
            frame.set_cursor_position((x, y));
        }
    }
}

fn render_dialog(
    frame: &mut Frame,
    area: Rect,
    prompt: &str,
    options: &[String],
    highlighted: usize,
    error: Option<&str>,
) {
    let mut buttons = Vec::new();
    for (index, option) in options.iter().enumerate() {
        let style = if index == highlighted {
            Style::default()
                .fg(Color::Black)
                .bg(if index == 0 { ACCENT } else { WARN })
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(MUTED)
        };
        buttons.push(Span::styled(format!(" {option} "), style));
        buttons.push(Span::raw("  "));
    }

    let mut lines = vec![
        Line::from(Span::styled(
            prompt.to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::from(buttons),
    ];
    if let Some(error) = error {
        lines.push(Line::raw(""));
        lines.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(ERROR),
        )));
    }

    let popup = centered_rect(60, lines.len() as u16 + 2, area);
    let paragraph = Paragraph::new(Text::from(lines))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(" Confirm ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(WARN))
                .style(Style::default().bg(PANEL)),
        );
    frame.render_widget(Clear, popup);
    frame.render_widget(paragraph, popup);
}

fn render_footer(frame: &mut Frame, area: Rect, screen: &Screen) {
    let mut spans = Vec::new();
    let (status, status_bg, status_fg) = match (&screen.error, &screen.status) {
        (Some(_), Some(status)) | (None, Some(status)) => (status.clone(), PL_B, Color::White),
        (Some(error), None) => (error.clone(), ERROR, Color::Black),
        (None, None) => ("ready".to_string(), PL_B, Color::White),
    };
    push_powerline_segment(
        &mut spans,
        format!(
            " {} ",
            compact_text(&status, area.width.saturating_sub(8).max(16) as usize)
        ),
        status_fg,
        status_bg,
        BG,
    );

    let hints = hint_spans(&screen.hints);
    let min_left = 24u16;
    let max_right = area.width.saturating_sub(min_left);
    let right_width = (spans_width(&hints) as u16).min(max_right);
    if right_width == 0 {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(Line::from(hints))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn hint_spans(hints: &[(&'static str, &'static str)]) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (key, action) in hints {
        spans.push(Span::styled(
            format!(" {key}"),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(format!(" {action} "), Style::default().fg(MUTED)));
    }
    spans
}

fn view_icon(view: ViewId) -> String {
    let icon = match view {
        ViewId::MainMenu => "󰍜",
        ViewId::NamespacePicker => "󰅩",
        ViewId::ResourceList => "󰓫",
        ViewId::ResourceDetail => "󰈙",
        ViewId::ContainerPicker => "󰡨",
        ViewId::LogViewer => "󰦪",
        ViewId::ConfirmDialog => "󰀦",
        ViewId::Form => "󰏫",
    };
    format!("{icon} {}", view.title())
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if trimmed.starts_with('#') {
        spans.push(Span::styled(trimmed.to_string(), Style::default().fg(MUTED)));
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    let Some((key, value)) = split_yaml_key_value(content) else {
        return vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )];
    };

    let mut spans = vec![
        Span::styled(key.to_string(), Style::default().fg(Color::Rgb(103, 232, 249))),
        Span::styled(":", Style::default().fg(MUTED)),
    ];
    if value.trim().is_empty() {
        return spans;
    }
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        value.trim_start().to_string(),
        Style::default().fg(yaml_value_color(value.trim())),
    ));
    spans
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else if value.starts_with('{') || value.starts_with('[') {
        MUTED
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn push_powerline_segment_rtl(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }

    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn display_cluster_endpoint(cluster: &str) -> String {
    let trimmed = cluster.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
        .to_string()
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height);
    let popup_row = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_row[1])[1]
}

fn column_constraints(columns: usize) -> Vec<Constraint> {
    if columns == 0 {
        return vec![Constraint::Percentage(100)];
    }

    let width = (100 / columns as u16).max(1);
    (0..columns)
        .map(|_| Constraint::Percentage(width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        centered_rect, column_constraints, compact_text, display_cluster_endpoint, render,
        split_yaml_key_value,
    };
    use crate::config::ViewConfig;
    use crate::message::ViewId;
    use crate::views::{Body, Screen};
    use ratatui::layout::{Constraint, Rect};
    use ratatui::{Terminal, backend::TestBackend};

    fn draw(screen: &Screen, view: ViewId) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).expect("test terminal");
        let config = ViewConfig::default();
        terminal
            .draw(|frame| render(frame, screen, &config, view))
            .expect("draw");
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn compact_text_truncates_with_ellipsis() {
        assert_eq!(compact_text("kubernetes", 20), "kubernetes");
        assert_eq!(compact_text("kubernetes", 5), "kube…");
        assert_eq!(compact_text("kubernetes", 1), "…");
    }

    #[test]
    fn cluster_endpoint_drops_scheme() {
        assert_eq!(
            display_cluster_endpoint("https://10.0.0.1:6443/"),
            "10.0.0.1:6443"
        );
        assert_eq!(display_cluster_endpoint("kind"), "kind");
    }

    #[test]
    fn yaml_keys_must_not_contain_spaces() {
        assert_eq!(
            split_yaml_key_value("replicas: 3"),
            Some(("replicas", " 3"))
        );
        assert_eq!(split_yaml_key_value("Events: none at all"), Some(("Events", " none at all")));
        assert_eq!(split_yaml_key_value("Last State: x"), None);
    }

    #[test]
    fn popup_is_centered_and_clamped_to_area() {
        let area = Rect::new(0, 1, 80, 10);
        let popup = centered_rect(50, 4, area);
        assert_eq!((popup.x, popup.y, popup.width, popup.height), (20, 4, 40, 4));
        assert_eq!(centered_rect(50, 40, area).height, 10);
    }

    #[test]
    fn column_constraints_split_evenly() {
        assert_eq!(
            column_constraints(4),
            vec![Constraint::Percentage(25); 4]
        );
        assert_eq!(column_constraints(0), vec![Constraint::Percentage(100)]);
    }

    #[test]
    fn table_screen_renders_headers_rows_and_hints() {
        let screen = Screen::new(
            "Pods default",
            Body::Table {
                headers: vec!["Name".to_string(), "Status".to_string()],
                rows: vec![vec!["api-0".to_string(), "Running".to_string()]],
                selected: Some(0),
            },
        )
        .with_hints(&[("enter", "open")]);

        let out = draw(&screen, ViewId::ResourceList);
        assert!(out.contains("Name"));
        assert!(out.contains("api-0"));
        assert!(out.contains("Running"));
        assert!(out.contains("open"));
    }

    #[test]
    fn error_keeps_last_body_visible() {
        let screen = Screen::new(
            "Deployments",
            Body::Table {
                headers: vec!["Name".to_string()],
                rows: vec![vec!["web".to_string()]],
                selected: None,
            },
        )
        .with_error(Some("connection refused"));

        let out = draw(&screen, ViewId::ResourceList);
        assert!(out.contains("web"));
        assert!(out.contains("connection refused"));
    }

    #[test]
    fn dialog_renders_prompt_and_options() {
        let screen = Screen::new(
            "Confirm",
            Body::Dialog {
                prompt: "Delete pod api?".to_string(),
                options: vec!["Cancel".to_string(), "Confirm".to_string()],
                highlighted: 0,
            },
        );
        let out = draw(&screen, ViewId::ConfirmDialog);
        assert!(out.contains("Delete pod api?"));
        assert!(out.contains("Cancel"));
    }
}
