use std::io::{self, Stdout};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Widget, Wrap,
};

use crate::config::ClientConfig;
use crate::controller::{Command, Controller};
use crate::error::Result;
use crate::executor::Executor;
use crate::gateway::{Api, HttpApi};
use crate::render::{
    DetailView, FormView, GoalListView, ModalView, PlanView, ToastView, render,
};
use crate::state::{GoalForm, SessionState, ToastKind};
use crate::storage::FileStore;

const BAR_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Title,
    StartDate,
    Goals,
    Tasks,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Title => Focus::StartDate,
            Focus::StartDate => Focus::Goals,
            Focus::Goals => Focus::Tasks,
            Focus::Tasks => Focus::Title,
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Title => Focus::Tasks,
            Focus::StartDate => Focus::Title,
            Focus::Goals => Focus::StartDate,
            Focus::Tasks => Focus::Goals,
        }
    }
}

struct App {
    controller: Controller,
    api_base: String,
    focus: Focus,
    goal_list: ListState,
    task_cursor: usize,
}

impl App {
    fn new(controller: Controller, api_base: String) -> Self {
        Self {
            controller,
            api_base,
            focus: Focus::Goals,
            goal_list: ListState::default(),
            task_cursor: 0,
        }
    }

    fn goal_count(&self) -> usize {
        self.controller.state().goals.len()
    }

    fn task_count(&self) -> usize {
        self.controller
            .state()
            .active_goal_detail()
            .map(|g| g.phases.tasks().count())
            .unwrap_or(0)
    }

    fn select_next_goal(&mut self) {
        let n = self.goal_count();
        if n == 0 {
            return;
        }
        let i = self.goal_list.selected().map(|i| i + 1).unwrap_or(0);
        self.goal_list.select(Some(i.min(n - 1)));
    }

    fn select_prev_goal(&mut self) {
        if self.goal_count() == 0 {
            return;
        }
        let i = self.goal_list.selected().unwrap_or(0);
        self.goal_list.select(Some(i.saturating_sub(1)));
    }

    fn open_goal_under_cursor(&mut self) {
        let Some(idx) = self.goal_list.selected() else {
            return;
        };
        let Some(id) = self.controller.state().goals.get(idx).map(|g| g.id) else {
            return;
        };
        self.task_cursor = 0;
        self.controller.dispatch(Command::SelectGoal(id));
    }

    fn toggle_task_under_cursor(&mut self) {
        let Some(goal) = self.controller.state().active_goal_detail() else {
            return;
        };
        let goal_id = goal.id;
        let Some(task_id) = goal.phases.tasks().nth(self.task_cursor).map(|t| t.id) else {
            return;
        };
        self.controller
            .dispatch(Command::ToggleTask { task_id, goal_id });
    }

    fn delete_open_goal(&mut self) {
        let Some(goal_id) = self.controller.state().active_goal_detail().map(|g| g.id) else {
            return;
        };
        self.controller.dispatch(Command::DeleteGoal(goal_id));
    }

    fn submit_form(&mut self) {
        let state = self.controller.state();
        if state.loading {
            return;
        }
        let cmd = Command::CreateGoal {
            title: state.form.title.clone(),
            start_date: state.form.start_date.clone(),
        };
        self.controller.dispatch(cmd);
    }

    fn edit_buffer(&mut self) -> Option<&mut String> {
        let form = self.controller.form_mut();
        match self.focus {
            Focus::Title => Some(&mut form.title),
            Focus::StartDate => Some(&mut form.start_date),
            _ => None,
        }
    }

    /// Returns `true` when the app should exit.
    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) -> bool {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            return true;
        }

        // Modals own the keyboard until answered.
        let state = self.controller.state();
        let alert_up = !state.alerts.is_empty();
        let confirm_up = state.confirm_delete.is_some();
        if alert_up {
            if matches!(code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.controller.dispatch(Command::DismissAlert);
            }
            return false;
        }
        if confirm_up {
            match code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.controller.dispatch(Command::ConfirmDelete(true));
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.controller.dispatch(Command::ConfirmDelete(false));
                }
                _ => {}
            }
            return false;
        }

        match code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return false;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                return false;
            }
            _ => {}
        }

        match self.focus {
            Focus::Title | Focus::StartDate => match code {
                KeyCode::Esc => self.focus = Focus::Goals,
                KeyCode::Enter => self.submit_form(),
                KeyCode::Backspace => {
                    if let Some(buf) = self.edit_buffer() {
                        buf.pop();
                    }
                }
                KeyCode::Char(c) => {
                    if let Some(buf) = self.edit_buffer() {
                        buf.push(c);
                    }
                }
                _ => {}
            },
            Focus::Goals => match code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Down | KeyCode::Char('j') => self.select_next_goal(),
                KeyCode::Up | KeyCode::Char('k') => self.select_prev_goal(),
                KeyCode::Enter => self.open_goal_under_cursor(),
                KeyCode::Right | KeyCode::Char('l') => self.focus = Focus::Tasks,
                KeyCode::Char('r') => self.controller.dispatch(Command::RefreshGoals),
                KeyCode::Char('n') => self.focus = Focus::Title,
                _ => {}
            },
            Focus::Tasks => match code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') => self.focus = Focus::Goals,
                KeyCode::Down | KeyCode::Char('j') => {
                    let n = self.task_count();
                    if n > 0 {
                        self.task_cursor = (self.task_cursor + 1).min(n - 1);
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.task_cursor = self.task_cursor.saturating_sub(1);
                }
                KeyCode::Char(' ') | KeyCode::Enter => self.toggle_task_under_cursor(),
                KeyCode::Char('d') => self.delete_open_goal(),
                KeyCode::Char('r') => self.controller.dispatch(Command::RefreshGoals),
                _ => {}
            },
        }
        false
    }

    fn clamp_cursors(&mut self) {
        let n = self.goal_count();
        match self.goal_list.selected() {
            _ if n == 0 => self.goal_list.select(None),
            None => self.goal_list.select(Some(0)),
            Some(i) if i >= n => self.goal_list.select(Some(n - 1)),
            Some(_) => {}
        }
        let t = self.task_count();
        if self.task_cursor >= t {
            self.task_cursor = t.saturating_sub(1);
        }
    }

    fn draw(&mut self, f: &mut ratatui::Frame) {
        self.clamp_cursors();
        let view = render(self.controller.state());

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(f.area());
        self.draw_header(f, rows[0]);

        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(rows[1]);
        let left = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0)])
            .split(cols[0]);

        self.draw_form(f, left[0], &view.form);
        self.draw_goals(f, left[1], &view.goals);
        self.draw_detail(f, cols[1], &view.detail);
        self.draw_footer(f, rows[2]);

        draw_toasts(f, &view.toasts);
        if let Some(modal) = &view.modal {
            draw_modal(f, modal);
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame, area: Rect) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let line = Line::from(vec![
            Span::styled("AI Todo Helper", Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(self.api_base.clone(), Style::default().fg(Color::Gray)),
            Span::raw("  "),
            Span::styled(now, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(Text::from(line)).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_type(BorderType::Plain),
        );
        f.render_widget(p, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame, area: Rect) {
        let hint = match self.focus {
            Focus::Title | Focus::StartDate => {
                "[Enter] Create Plan  [Tab] Next Field  [Esc] Goals  [Ctrl+C] Quit"
            }
            Focus::Goals => {
                "[j/k] Move  [Enter] Open  [l] Tasks  [n] New Goal  [r] Refresh  [Tab] Focus  [q] Quit"
            }
            Focus::Tasks => {
                "[j/k] Move  [Space] Toggle  [d] Delete Goal  [h/Esc] Goals  [Tab] Focus  [q] Quit"
            }
        };
        let p = Paragraph::new(hint)
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::TOP));
        f.render_widget(p, area);
    }

    fn draw_form(&self, f: &mut ratatui::Frame, area: Rect, form: &FormView) {
        let field = |label: &'static str, value: &str, focused: bool| {
            let style = if focused {
                Style::default().fg(Color::Black).bg(Color::LightYellow)
            } else {
                Style::default()
            };
            let cursor = if focused { "_" } else { "" };
            Line::from(vec![
                Span::styled(label, Style::default().fg(Color::Yellow)),
                Span::styled(format!("{value}{cursor}"), style),
            ])
        };
        let title = if form.submitting {
            "New Goal (generating plan...)"
        } else {
            "New Goal [Enter] Create Plan"
        };
        let lines = vec![
            field("Goal:  ", &form.title, self.focus == Focus::Title),
            field("Start: ", &form.start_date, self.focus == Focus::StartDate),
        ];
        let border = if form.submitting {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        let p = Paragraph::new(Text::from(lines)).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border),
        );
        f.render_widget(p, area);
    }

    fn draw_goals(&self, f: &mut ratatui::Frame, area: Rect, goals: &GoalListView) {
        let block = Block::default()
            .title("Goals")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(focus_border(self.focus == Focus::Goals));
        match goals {
            GoalListView::Skeleton(rows) => {
                let items = (0..*rows)
                    .map(|_| {
                        ListItem::new(Span::styled(
                            "░".repeat(24),
                            Style::default().fg(Color::DarkGray),
                        ))
                    })
                    .collect::<Vec<_>>();
                f.render_widget(List::new(items).block(block), area);
            }
            GoalListView::Placeholder(text) => {
                let p = Paragraph::new(text.as_str())
                    .style(Style::default().fg(Color::Gray))
                    .wrap(Wrap { trim: false })
                    .block(block);
                f.render_widget(p, area);
            }
            GoalListView::Items(items) => {
                let items = items
                    .iter()
                    .map(|item| {
                        let (mark, style) = if item.active {
                            (
                                "● ",
                                Style::default()
                                    .fg(Color::Green)
                                    .add_modifier(Modifier::BOLD),
                            )
                        } else {
                            ("  ", Style::default())
                        };
                        ListItem::new(Text::from(vec![
                            Line::from(vec![
                                Span::styled(mark, style),
                                Span::styled(item.title.clone(), style),
                            ]),
                            Line::from(Span::styled(
                                format!("  {}", progress_bar(item.percent)),
                                Style::default().fg(Color::Cyan),
                            )),
                        ]))
                    })
                    .collect::<Vec<_>>();
                let list = List::new(items)
                    .block(block)
                    .highlight_style(Style::default().fg(Color::Black).bg(Color::LightYellow))
                    .highlight_symbol("> ");
                let mut state = self.goal_list.clone();
                f.render_stateful_widget(list, area, &mut state);
            }
        }
    }

    fn draw_detail(&self, f: &mut ratatui::Frame, area: Rect, detail: &DetailView) {
        let block = Block::default()
            .title("Action Plan")
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(focus_border(self.focus == Focus::Tasks));
        match detail {
            DetailView::Placeholder(text) => {
                let p = Paragraph::new(text.as_str())
                    .style(Style::default().fg(Color::Gray))
                    .wrap(Wrap { trim: false })
                    .block(block);
                f.render_widget(p, area);
            }
            DetailView::Plan(plan) => {
                let cursor = (self.focus == Focus::Tasks).then_some(self.task_cursor);
                let (lines, cursor_line) = plan_lines(plan, cursor);
                let visible = area.height.saturating_sub(2) as usize;
                let scroll = cursor_line
                    .map(|l| l.saturating_sub(visible.saturating_sub(3)))
                    .unwrap_or(0);
                let p = Paragraph::new(Text::from(lines))
                    .wrap(Wrap { trim: false })
                    .scroll((scroll.min(u16::MAX as usize) as u16, 0))
                    .block(block);
                f.render_widget(p, area);
            }
        }
    }
}

fn focus_border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::LightBlue)
    } else {
        Style::default()
    }
}

fn progress_bar(percent: u16) -> String {
    let filled = (percent as usize * BAR_WIDTH) / 100;
    format!(
        "[{}{}] {percent:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

fn plan_lines(plan: &PlanView, cursor: Option<usize>) -> (Vec<Line<'static>>, Option<usize>) {
    let mut lines = vec![
        Line::from(Span::styled(
            plan.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            progress_bar(plan.percent),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(""),
    ];
    let mut cursor_line = None;

    if let Some(empty) = &plan.empty {
        lines.push(Line::from(Span::styled(
            empty.clone(),
            Style::default().fg(Color::Gray),
        )));
    }

    let mut task_idx = 0usize;
    for phase in &plan.phases {
        lines.push(Line::from(Span::styled(
            phase.title.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        for task in &phase.tasks {
            let under_cursor = cursor == Some(task_idx);
            if under_cursor {
                cursor_line = Some(lines.len());
            }
            let base = if under_cursor {
                Style::default().fg(Color::Black).bg(Color::LightYellow)
            } else if task.checked {
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::CROSSED_OUT)
            } else {
                Style::default()
            };
            let check = if task.checked { "[x] " } else { "[ ] " };
            lines.push(Line::from(vec![
                Span::styled(check, base),
                Span::styled(task.title.clone(), base),
                Span::raw("  "),
                Span::styled(task.due.clone(), Style::default().fg(Color::Yellow)),
            ]));
            if !task.description.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("      {}", task.description),
                    Style::default().fg(Color::Gray),
                )));
            }
            task_idx += 1;
        }
        lines.push(Line::from(""));
    }

    lines.push(Line::from(Span::styled(
        "[d] Delete Goal",
        Style::default().fg(Color::Red),
    )));
    (lines, cursor_line)
}

fn draw_toasts(f: &mut ratatui::Frame, toasts: &[ToastView]) {
    let area = f.area();
    let width = area.width.min(60);
    let mut y = area.y.saturating_add(2);
    for toast in toasts {
        if y.saturating_add(3) > area.y.saturating_add(area.height) {
            break;
        }
        let rect = Rect {
            x: area.x + area.width - width,
            y,
            width,
            height: 3,
        };
        let color = match toast.kind {
            ToastKind::Success => Color::Green,
            ToastKind::Error => Color::Red,
        };
        f.render_widget(Clear, rect);
        let p = Paragraph::new(toast.text.as_str())
            .style(Style::default().fg(color))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(color)),
            );
        f.render_widget(p, rect);
        y = y.saturating_add(3);
    }
}

fn draw_modal(f: &mut ratatui::Frame, modal: &ModalView) {
    let area = centered_rect(60, 30, f.area());
    let shadow = shadow_rect(area, f.area());
    f.render_widget(
        Fill {
            style: Style::default()
                .bg(Color::Black)
                .add_modifier(Modifier::DIM),
        },
        shadow,
    );
    f.render_widget(Clear, area);

    let (title, mut text) = match modal {
        ModalView::Alert(body) => (
            "Alert",
            body.lines().map(|l| Line::from(l.to_string())).collect::<Vec<_>>(),
        ),
        ModalView::ConfirmDelete { question, .. } => (
            "Confirm",
            vec![Line::from(Span::styled(
                question.clone(),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ))],
        ),
    };
    text.push(Line::from(""));
    text.push(Line::from(match modal {
        ModalView::Alert(_) => "Enter/Esc: OK",
        ModalView::ConfirmDelete { .. } => "Enter/y: delete  Esc/n: keep",
    }));

    let p = Paragraph::new(Text::from(text))
        .style(Style::default().fg(Color::White).bg(Color::DarkGray))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Double),
        );
    f.render_widget(p, area);
}

pub fn run_tui(cfg: &ClientConfig) -> Result<()> {
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&cfg.api)?);
    let store = FileStore::open(&cfg.storage.path);
    let state = SessionState::new(
        GoalForm::starting_today(),
        Duration::from_millis(cfg.ui.message_ttl_ms),
    );
    let mut controller = Controller::new(state, Box::new(store), cfg.storage.restore_last_goal);
    controller.start();
    let app = App::new(controller, cfg.api.base_url.clone());
    let executor = Executor::new(api);

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = terminal
        .clear()
        .map_err(Into::into)
        .and_then(|_| run_loop(&mut terminal, app, executor, Duration::from_millis(cfg.ui.tick_ms)));

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: App,
    mut executor: Executor,
    tick: Duration,
) -> Result<()> {
    loop {
        executor.pump(&mut app.controller);
        app.controller.tick(Instant::now());
        let mut draw_panicked = false;
        terminal.draw(|f| draw_panicked = draw_guarded(f, |f| app.draw(f)))?;
        if draw_panicked {
            // Keep the loop alive so keys (and quitting) still work.
            tracing::error!("draw panicked; clearing screen");
            terminal.clear().ok();
        }

        if event::poll(tick)? {
            if let Event::Key(k) = event::read()? {
                if k.kind == KeyEventKind::Press && app.handle_key(k.code, k.modifiers) {
                    break;
                }
            }
        }
    }
    tracing::info!(in_flight = executor.in_flight(), "leaving terminal ui");
    Ok(())
}

// A panicking frame must not unwind past the terminal restore in run_tui.
fn draw_guarded(f: &mut ratatui::Frame, draw: impl FnOnce(&mut ratatui::Frame)) -> bool {
    catch_unwind(AssertUnwindSafe(|| draw(f))).is_err()
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let vertical = popup_layout[1];
    let popup_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical);
    popup_layout[1]
}

fn shadow_rect(inner: Rect, bounds: Rect) -> Rect {
    let max_x = bounds.x.saturating_add(bounds.width);
    let max_y = bounds.y.saturating_add(bounds.height);
    let x = inner.x.saturating_add(1).min(max_x.saturating_sub(1));
    let y = inner.y.saturating_add(1).min(max_y.saturating_sub(1));
    Rect {
        x,
        y,
        width: inner.width.min(max_x.saturating_sub(x)),
        height: inner.height.min(max_y.saturating_sub(y)),
    }
}

struct Fill {
    style: Style,
}

impl Widget for Fill {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for y in area.y..area.y.saturating_add(area.height) {
            for x in area.x..area.x.saturating_add(area.width) {
                buf[(x, y)].set_char(' ').set_style(self.style);
            }
        }
    }
}
