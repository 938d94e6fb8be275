use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use image::imageops::FilterType;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Padding, Paragraph, Widget};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};

use crate::config::ThemeMode;
use crate::controller::{Completion, Controller};
use crate::media::{self, Preview};

const APP_TITLE: &str = "Lifestyle Prompt Generator";
const CARD_MAX_WIDTH: u16 = 72;
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Colours for one theme. The model's current palette is the visual root:
/// every frame is painted from it and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub mode: ThemeMode,
    pub bg: Color,
    pub panel_bg: Color,
    pub caption_bg: Color,
    pub border: Color,
    pub border_focused: Color,
    pub accent: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub error: Color,
}

const LIGHT: Palette = Palette {
    mode: ThemeMode::Light,
    bg: Color::Rgb(243, 232, 255),
    panel_bg: Color::Rgb(255, 255, 255),
    caption_bg: Color::Rgb(241, 245, 249),
    border: Color::Rgb(209, 213, 219),
    border_focused: Color::Rgb(99, 102, 241),
    accent: Color::Rgb(79, 70, 229),
    text_primary: Color::Rgb(24, 24, 27),
    text_secondary: Color::Rgb(107, 114, 128),
    error: Color::Rgb(220, 38, 38),
};

const DARK: Palette = Palette {
    mode: ThemeMode::Dark,
    bg: Color::Rgb(30, 27, 75),
    panel_bg: Color::Rgb(39, 39, 42),
    caption_bg: Color::Rgb(63, 63, 70),
    border: Color::Rgb(161, 161, 170),
    border_focused: Color::Rgb(244, 114, 182),
    accent: Color::Rgb(192, 132, 252),
    text_primary: Color::Rgb(250, 250, 250),
    text_secondary: Color::Rgb(212, 212, 216),
    error: Color::Rgb(248, 113, 113),
};

impl Palette {
    pub fn for_mode(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => LIGHT,
            ThemeMode::Dark => DARK,
        }
    }

    fn toggle_label(&self) -> &'static str {
        match self.mode {
            ThemeMode::Light => "☾ Switch to Dark Mode",
            ThemeMode::Dark => "☀ Switch to Light Mode",
        }
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Controls,
    Picker,
}

pub struct Options {
    pub controller: Controller,
    pub status_message: String,
    pub endpoint: String,
}

pub struct Model {
    controller: Controller,
    palette: Palette,
    status_message: String,
    endpoint: String,
    focus: Focus,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        Self {
            palette: Palette::for_mode(opts.controller.theme()),
            controller: opts.controller,
            status_message: opts.status_message,
            endpoint: opts.endpoint,
            focus: Focus::Controls,
            spinner: Spinner::new(),
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        if key.modifiers.contains(KeyModifiers::CONTROL)
                            && key.code == KeyCode::Char('c')
                        {
                            break;
                        }
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                tracing::warn!("key handler failed: {err:#}");
                                self.status_message = format!("Error: {}", err);
                            }
                        }
                        self.mark_dirty();
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.controller.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    /// Re-derive the visual root from the controller's theme.
    fn apply_theme(&mut self) {
        self.palette = Palette::for_mode(self.controller.theme());
    }

    fn poll_async(&mut self) -> bool {
        let Some(done) = self.controller.poll() else {
            return false;
        };
        self.status_message = match done {
            Completion::Succeeded { elapsed } => format!(
                "Caption ready in {}.",
                humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
            ),
            Completion::Failed { .. } => {
                "Caption request failed. Press g to try again.".to_string()
            }
            Completion::Discarded => {
                "Selection changed while captioning; late result ignored.".to_string()
            }
        };
        true
    }

    /// Returns `Ok(true)` when the app should quit.
    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.focus == Focus::Picker {
            self.handle_picker_key(code);
            return Ok(false);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Char('o') | KeyCode::Char('i') => {
                self.focus = Focus::Picker;
                self.status_message =
                    "Type the path of a PNG or JPEG image, then press Enter.".to_string();
            }
            KeyCode::Char('g') | KeyCode::Enter => self.generate(),
            KeyCode::Char('x') => {
                self.controller.clear_all();
                self.status_message = "Cleared.".to_string();
            }
            KeyCode::Char('t') => {
                let mode = self.controller.toggle_theme();
                self.apply_theme();
                self.status_message = format!("Switched to {mode} mode.");
            }
            KeyCode::Char('y') => self.copy_caption()?,
            _ => {}
        }
        Ok(false)
    }

    fn handle_picker_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.focus = Focus::Controls;
                self.status_message = "Picker closed.".to_string();
            }
            KeyCode::Enter => self.submit_picker(),
            KeyCode::Backspace => self.controller.picker_mut().backspace(),
            KeyCode::Char(ch) => self.controller.picker_mut().push(ch),
            _ => {}
        }
    }

    fn submit_picker(&mut self) {
        self.focus = Focus::Controls;
        let Some(path) = media::resolve_picker_path(self.controller.picker().input()) else {
            self.controller.select_image(None);
            self.status_message = "No file chosen.".to_string();
            return;
        };

        match media::load_selection(&path) {
            Ok(image) => {
                self.status_message = format!(
                    "Selected {} ({}, {}). Press g to generate.",
                    image.file_name,
                    image.mime_type,
                    format_bytes(image.len())
                );
                self.controller.select_image(Some(image));
            }
            Err(err) => {
                tracing::warn!("picker refused {}: {err}", path.display());
                self.status_message = err.to_string();
            }
        }
    }

    fn generate(&mut self) {
        if self.controller.is_loading() {
            self.status_message = "Already generating a caption…".to_string();
            return;
        }
        let Some(name) = self.controller.selected().map(|image| image.file_name.clone()) else {
            self.status_message = "Choose an image first (press o).".to_string();
            return;
        };
        if self.controller.generate_caption() {
            self.spinner.reset();
            self.status_message = format!("Generating caption for {name}…");
        }
    }

    fn copy_caption(&mut self) -> Result<()> {
        let caption = self.controller.caption().to_string();
        if caption.is_empty() {
            self.status_message = "Nothing to copy yet.".to_string();
            return Ok(());
        }
        let mut clipboard = arboard::Clipboard::new().context("open clipboard")?;
        clipboard
            .set_text(caption)
            .context("copy caption to clipboard")?;
        self.status_message = "Caption copied to clipboard.".to_string();
        Ok(())
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let palette = self.palette;
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(palette.bg)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.controller.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(palette.text_primary)
                .bg(palette.panel_bg)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let card = centered_column(layout[1], CARD_MAX_WIDTH);
        self.draw_card(frame, card);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(palette.text_secondary)
                    .bg(palette.panel_bg)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);
    }

    fn draw_card(&self, frame: &mut Frame<'_>, area: Rect) {
        let palette = self.palette;
        let block = Block::default()
            .title(Span::styled(
                format!(" {APP_TITLE} "),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ))
            .title(
                ratatui::widgets::block::Title::from(Span::styled(
                    format!(" [t] {} ", palette.toggle_label()),
                    Style::default().fg(palette.text_secondary),
                ))
                .alignment(Alignment::Right),
            )
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border))
            .style(Style::default().bg(palette.panel_bg).fg(palette.text_primary))
            .padding(Padding::horizontal(1));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let text_width = inner.width.saturating_sub(2).max(1) as usize;
        let caption_lines = self.caption_lines(text_width);
        let history_lines = self.history_lines(text_width);
        let caption_height = (caption_lines.len() as u16).saturating_add(2);
        let history_height = if history_lines.is_empty() {
            0
        } else {
            (history_lines.len() as u16).saturating_add(2)
        };

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(4),
                Constraint::Length(1),
                Constraint::Length(caption_height),
                Constraint::Length(history_height),
            ])
            .split(inner);

        self.draw_picker(frame, rows[0]);
        self.draw_preview(frame, rows[1]);
        frame.render_widget(Paragraph::new(self.buttons_line()), rows[2]);

        let caption_block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border))
            .style(Style::default().bg(palette.caption_bg));
        frame.render_widget(
            Paragraph::new(Text::from(caption_lines)).block(caption_block),
            rows[3],
        );

        if !history_lines.is_empty() {
            let history_block = Block::default()
                .title(Span::styled(
                    "Previous Captions:",
                    Style::default()
                        .fg(palette.text_secondary)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::TOP)
                .border_style(Style::default().fg(palette.border));
            frame.render_widget(
                Paragraph::new(Text::from(history_lines)).block(history_block),
                rows[4],
            );
        }
    }

    fn draw_picker(&self, frame: &mut Frame<'_>, area: Rect) {
        let palette = self.palette;
        let focused = self.focus == Focus::Picker;
        let border = if focused {
            palette.border_focused
        } else {
            palette.border
        };
        let block = Block::default()
            .title(Span::styled(
                " Image (PNG / JPEG) [o] ",
                Style::default().fg(palette.text_secondary),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border));

        let input = self.controller.picker().input();
        let line = if focused {
            Line::from(vec![
                Span::styled(input.to_string(), Style::default().fg(palette.text_primary)),
                Span::styled("▏", Style::default().fg(palette.border_focused)),
            ])
        } else if input.is_empty() {
            Line::from(Span::styled(
                "No file chosen",
                Style::default().fg(palette.text_secondary),
            ))
        } else {
            Line::from(Span::styled(
                input.to_string(),
                Style::default().fg(palette.text_primary),
            ))
        };
        frame.render_widget(Paragraph::new(line).block(block), area);
    }

    fn draw_preview(&self, frame: &mut Frame<'_>, area: Rect) {
        let palette = self.palette;
        let title = match self.controller.selected() {
            Some(image) => {
                let dims = self
                    .controller
                    .preview()
                    .and_then(|preview| preview.dimensions)
                    .map(|(w, h)| format!(" · {w}×{h}"))
                    .unwrap_or_default();
                format!(" Preview · {} · {}{dims} ", image.file_name, image.mime_type)
            }
            None => " Preview ".to_string(),
        };
        let block = Block::default()
            .title(Span::styled(title, Style::default().fg(palette.text_secondary)))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.border));
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(
            PreviewImage {
                preview: self.controller.preview(),
                selected: self.controller.selected().is_some(),
                palette,
            },
            inner,
        );
    }

    fn buttons_line(&self) -> Line<'static> {
        let palette = self.palette;
        let generate = if self.controller.is_loading() {
            Span::styled(
                " Generating... ",
                Style::default()
                    .fg(palette.text_secondary)
                    .add_modifier(Modifier::DIM),
            )
        } else {
            Span::styled(
                " [g] Generate ",
                Style::default()
                    .fg(palette.panel_bg)
                    .bg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            )
        };
        Line::from(vec![
            generate,
            Span::raw("  "),
            Span::styled(
                " [x] Clear ",
                Style::default().fg(palette.error).add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(" [y] Copy ", Style::default().fg(palette.text_secondary)),
        ])
    }

    fn caption_lines(&self, width: usize) -> Vec<Line<'static>> {
        let palette = self.palette;
        if self.controller.is_loading() {
            return vec![Line::from(Span::styled(
                format!("{} Generating...", self.spinner.frame()),
                Style::default().fg(palette.accent),
            ))];
        }
        let caption = self.controller.caption();
        if caption.is_empty() {
            return vec![Line::from(Span::styled(
                "No caption yet.",
                Style::default().fg(palette.text_secondary),
            ))];
        }
        let style = Style::default()
            .fg(palette.text_primary)
            .add_modifier(Modifier::ITALIC);
        wrap_plain(caption, width, style)
    }

    /// Older captions only, and only once there is more than one.
    fn history_lines(&self, width: usize) -> Vec<Line<'static>> {
        let style = Style::default().fg(self.palette.text_secondary);
        self.controller
            .history()
            .previous()
            .flat_map(|caption| wrap_with_prefix(caption, width, "• ", style))
            .collect()
    }

    fn footer_text(&self) -> String {
        match self.focus {
            Focus::Picker => {
                "Enter: choose file | empty Enter: no file | Esc: close picker".to_string()
            }
            Focus::Controls => format!(
                "o: choose image | g: generate | x: clear | t: theme | y: copy | q: quit  ·  {}",
                self.endpoint
            ),
        }
    }
}

/// Half-block rendering of the decoded thumbnail, or a placeholder.
struct PreviewImage<'a> {
    preview: Option<&'a Preview>,
    selected: bool,
    palette: Palette,
}

impl Widget for PreviewImage<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        match self.preview.and_then(|preview| preview.thumbnail.as_ref()) {
            Some(thumb) => render_image_halfblocks(thumb, area, buf),
            None => {
                let message = if self.selected {
                    "[preview unavailable]"
                } else {
                    "No image selected"
                };
                let y = area.y + area.height / 2;
                Paragraph::new(Span::styled(
                    message,
                    Style::default().fg(self.palette.text_secondary),
                ))
                .alignment(Alignment::Center)
                .render(Rect::new(area.x, y, area.width, 1), buf);
            }
        }
    }
}

/// Each cell shows two vertically stacked pixels via `▀` (fg = top, bg = bottom).
fn render_image_halfblocks(thumb: &image::RgbaImage, area: Rect, buf: &mut Buffer) {
    if thumb.width() == 0 || thumb.height() == 0 {
        return;
    }

    let max_px_w = area.width as f64;
    let max_px_h = (area.height as f64) * 2.0;
    let src_w = thumb.width() as f64;
    let src_h = thumb.height() as f64;

    let scale = (max_px_w / src_w).min(max_px_h / src_h).min(1.0);
    let fit_w = (src_w * scale).round().max(1.0) as u32;
    let fit_h = (src_h * scale).round().max(1.0) as u32;

    let rgba = image::imageops::resize(thumb, fit_w, fit_h, FilterType::Triangle);
    let (iw, ih) = (rgba.width(), rgba.height());

    let col_offset = area.width.saturating_sub(iw as u16) / 2;
    let row_offset = area.height.saturating_sub(ih.div_ceil(2) as u16) / 2;

    for row in 0..area.height.saturating_sub(row_offset) {
        let yt = (row as u32) * 2;
        let yb = yt + 1;
        if yt >= ih {
            break;
        }
        for col in 0..iw.min(area.width as u32) {
            let t = rgba.get_pixel(col, yt);
            let fg = Color::Rgb(t[0], t[1], t[2]);
            let bg = if yb < ih {
                let b = rgba.get_pixel(col, yb);
                Color::Rgb(b[0], b[1], b[2])
            } else {
                Color::Reset
            };
            let x = area.x + col_offset + col as u16;
            let y = area.y + row_offset + row;
            if x < area.right() && y < area.bottom() {
                buf.get_mut(x, y).set_char('▀').set_fg(fg).set_bg(bg);
            }
        }
    }
}

fn centered_column(area: Rect, max_width: u16) -> Rect {
    let width = area.width.min(max_width);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y,
        width,
        area.height,
    )
}

fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_with_prefix(text, width, "", style)
}

fn wrap_with_prefix(text: &str, width: usize, prefix: &str, style: Style) -> Vec<Line<'static>> {
    let indent = " ".repeat(prefix.chars().count());
    let options = WrapOptions::new(width.max(1))
        .initial_indent(prefix)
        .subsequent_indent(&indent);
    wrap(text, options)
        .into_iter()
        .map(|line| Line::from(Span::styled(line.into_owned(), style)))
        .collect()
}

fn format_bytes(len: usize) -> String {
    const UNITS: [&str; 3] = ["B", "KiB", "MiB"];
    let mut size = len as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{len} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests::{photo, scripted, settle, Script};
    use image::{Rgba, RgbaImage};
    use ratatui::backend::TestBackend;
    use std::path::Path;
    use tempfile::tempdir;

    fn model() -> (Model, crossbeam_channel::Sender<Script>) {
        let (controller, replies, _) = scripted(None);
        let model = Model::new(Options {
            controller,
            status_message: "Ready.".into(),
            endpoint: "http://localhost:5000/caption".into(),
        });
        (model, replies)
    }

    fn render(model: &Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(90, 40)).unwrap();
        terminal.draw(|frame| model.draw(frame)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    fn type_path(model: &mut Model, path: &Path) {
        model.handle_key(KeyCode::Char('o')).unwrap();
        for ch in path.display().to_string().chars() {
            model.handle_key(KeyCode::Char(ch)).unwrap();
        }
        model.handle_key(KeyCode::Enter).unwrap();
    }

    #[test]
    fn empty_session_renders_placeholders() {
        let (model, _) = model();
        let screen = render(&model);
        assert!(screen.contains(APP_TITLE));
        assert!(screen.contains("No file chosen"));
        assert!(screen.contains("No image selected"));
        assert!(screen.contains("No caption yet."));
        assert!(!screen.contains("Previous Captions"));
    }

    #[test]
    fn double_toggle_restores_visual_root() {
        let (mut model, _) = model();
        let original = model.palette;
        assert_eq!(original, Palette::for_mode(ThemeMode::Light));

        model.handle_key(KeyCode::Char('t')).unwrap();
        assert_eq!(model.palette, Palette::for_mode(ThemeMode::Dark));
        assert_eq!(model.palette.mode, model.controller.theme());

        model.handle_key(KeyCode::Char('t')).unwrap();
        assert_eq!(model.palette, original);
        assert_eq!(model.controller.theme(), ThemeMode::Light);
    }

    #[test]
    fn initial_theme_is_applied_before_first_frame() {
        let (mut controller, _replies, _) = scripted(None);
        controller.toggle_theme();
        let model = Model::new(Options {
            controller,
            status_message: String::new(),
            endpoint: String::new(),
        });
        assert_eq!(model.palette.mode, ThemeMode::Dark);
        assert!(render(&model).contains("Switch to Light Mode"));
    }

    #[test]
    fn picking_a_png_shows_preview() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beach.png");
        RgbaImage::from_pixel(30, 20, Rgba([20, 140, 220, 255]))
            .save(&path)
            .unwrap();

        let (mut model, _) = model();
        type_path(&mut model, &path);
        assert_eq!(model.focus, Focus::Controls);
        assert_eq!(
            model.controller.selected().map(|image| image.file_name.as_str()),
            Some("beach.png")
        );
        let screen = render(&model);
        assert!(screen.contains('▀'));
        assert!(screen.contains("30×20"));
    }

    #[test]
    fn picker_refuses_other_types_and_keeps_selection() {
        let dir = tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello there").unwrap();

        let (mut model, _) = model();
        model.controller.select_image(Some(photo("kept.jpg")));
        model.controller.picker_mut().reset();
        type_path(&mut model, &text);
        assert!(model.status_message.contains("only PNG and JPEG"));
        assert_eq!(
            model.controller.selected().map(|image| image.file_name.as_str()),
            Some("kept.jpg")
        );
    }

    #[test]
    fn empty_pick_means_no_file() {
        let (mut model, _) = model();
        model.controller.select_image(Some(photo("photo.jpg")));
        model.handle_key(KeyCode::Char('o')).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        assert!(model.controller.selected().is_none());
        assert_eq!(model.status_message, "No file chosen.");
    }

    #[test]
    fn escape_closes_picker_without_quitting() {
        let (mut model, _) = model();
        model.handle_key(KeyCode::Char('o')).unwrap();
        assert!(!model.handle_key(KeyCode::Char('q')).unwrap());
        assert_eq!(model.controller.picker().input(), "q");
        assert!(!model.handle_key(KeyCode::Esc).unwrap());
        assert_eq!(model.focus, Focus::Controls);
        assert!(model.handle_key(KeyCode::Char('q')).unwrap());
    }

    #[test]
    fn clear_resets_picker_field() {
        let (mut model, _) = model();
        model.handle_key(KeyCode::Char('o')).unwrap();
        model.handle_key(KeyCode::Char('a')).unwrap();
        model.handle_key(KeyCode::Esc).unwrap();
        model.handle_key(KeyCode::Char('x')).unwrap();
        assert_eq!(model.controller.picker().input(), "");
        assert!(render(&model).contains("No file chosen"));
    }

    #[test]
    fn generate_without_image_prompts() {
        let (mut model, _) = model();
        model.handle_key(KeyCode::Char('g')).unwrap();
        assert!(!model.controller.is_loading());
        assert_eq!(model.status_message, "Choose an image first (press o).");
    }

    #[test]
    fn copy_without_caption_is_a_noop() {
        let (mut model, _) = model();
        model.handle_key(KeyCode::Char('y')).unwrap();
        assert_eq!(model.status_message, "Nothing to copy yet.");
    }

    #[test]
    fn shows_previous_captions_after_second_result() {
        let (mut model, replies) = model();
        model.controller.select_image(Some(photo("photo.jpg")));

        replies.send(Script::Caption("a dog on a beach")).unwrap();
        model.handle_key(KeyCode::Char('g')).unwrap();
        assert!(render(&model).contains("Generating..."));
        settle(&mut model.controller);
        let screen = render(&model);
        assert!(screen.contains("a dog on a beach"));
        assert!(!screen.contains("Previous Captions"));

        replies.send(Script::Caption("sunset")).unwrap();
        model.handle_key(KeyCode::Enter).unwrap();
        settle(&mut model.controller);
        let screen = render(&model);
        assert!(screen.contains("Previous Captions"));
        assert!(screen.contains("• a dog on a beach"));
    }

    #[test]
    fn wraps_with_hanging_indent() {
        let lines = wrap_with_prefix("one two three four", 9, "• ", Style::default());
        let texts: Vec<String> = lines
            .iter()
            .map(|line| line.spans[0].content.to_string())
            .collect();
        assert_eq!(texts, ["• one two", "  three", "  four"]);
    }

    #[test]
    fn byte_sizes_are_human() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
