use chrono::NaiveDate;

use crate::model::{GoalDetail, GoalId, TaskId};
use crate::sanitize::{sanitize_block, sanitize_line};
use crate::state::{DetailPane, ListStatus, SessionState, ToastKind};

pub const NO_GOALS: &str = "No goals yet. Create one above!";
pub const GOALS_UNAVAILABLE: &str = "Goals are unavailable right now.";
pub const SELECT_PROMPT: &str = "Select a goal to see its action plan.";
pub const LOADING_TASKS: &str = "Loading tasks...";
pub const NO_TASKS: &str = "No tasks for this goal. Looks like you're all done!";
pub const SKELETON_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub form: FormView,
    pub goals: GoalListView,
    pub detail: DetailView,
    pub toasts: Vec<ToastView>,
    pub modal: Option<ModalView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormView {
    pub title: String,
    pub start_date: String,
    pub submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalListView {
    Skeleton(usize),
    Placeholder(String),
    Items(Vec<GoalItemView>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalItemView {
    pub id: GoalId,
    pub title: String,
    pub percent: u16,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailView {
    Placeholder(String),
    Plan(PlanView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanView {
    pub goal_id: GoalId,
    pub title: String,
    pub percent: u16,
    pub phases: Vec<PhaseView>,
    pub empty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseView {
    pub title: String,
    pub tasks: Vec<TaskLineView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLineView {
    pub task_id: TaskId,
    pub checked: bool,
    pub title: String,
    pub due: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastView {
    pub text: String,
    pub kind: ToastKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalView {
    Alert(String),
    ConfirmDelete { goal_id: GoalId, question: String },
}

pub fn render(state: &SessionState) -> View {
    View {
        form: FormView {
            title: state.form.title.clone(),
            start_date: state.form.start_date.clone(),
            submitting: state.loading,
        },
        goals: render_goal_list(state),
        detail: render_detail(&state.detail),
        toasts: state
            .toasts
            .iter()
            .map(|t| ToastView {
                text: t.text.clone(),
                kind: t.kind,
            })
            .collect(),
        modal: render_modal(state),
    }
}

pub fn render_goal_list(state: &SessionState) -> GoalListView {
    match state.list_status {
        ListStatus::Loading => GoalListView::Skeleton(SKELETON_ROWS),
        ListStatus::Unavailable => GoalListView::Placeholder(GOALS_UNAVAILABLE.into()),
        ListStatus::Ready if state.goals.is_empty() => GoalListView::Placeholder(NO_GOALS.into()),
        ListStatus::Ready => GoalListView::Items(
            state
                .goals
                .iter()
                .map(|g| GoalItemView {
                    id: g.id,
                    title: sanitize_line(&g.title),
                    percent: progress_percent(g.completion),
                    active: state.active_goal_id == Some(g.id),
                })
                .collect(),
        ),
    }
}

pub fn render_detail(pane: &DetailPane) -> DetailView {
    match pane {
        DetailPane::Idle => DetailView::Placeholder(SELECT_PROMPT.into()),
        DetailPane::Loading { .. } => DetailView::Placeholder(LOADING_TASKS.into()),
        DetailPane::Generating { title } => DetailView::Placeholder(generating_message(title)),
        DetailPane::Ready(goal) => DetailView::Plan(render_plan(goal)),
    }
}

pub fn render_plan(goal: &GoalDetail) -> PlanView {
    let phases = goal
        .phases
        .iter()
        .map(|phase| PhaseView {
            title: sanitize_line(&phase.title),
            tasks: phase
                .tasks
                .iter()
                .map(|task| TaskLineView {
                    task_id: task.id,
                    checked: task.completed,
                    title: sanitize_line(&task.title),
                    due: format_due(task.due_date),
                    description: sanitize_line(&task.description),
                })
                .collect(),
        })
        .collect::<Vec<_>>();
    let empty = phases.is_empty().then(|| NO_TASKS.to_string());
    PlanView {
        goal_id: goal.id,
        title: sanitize_line(&goal.title),
        percent: progress_percent(goal.completion),
        phases,
        empty,
    }
}

fn render_modal(state: &SessionState) -> Option<ModalView> {
    if let Some(text) = state.alerts.front() {
        return Some(ModalView::Alert(sanitize_block(text)));
    }
    state.confirm_delete.map(|goal_id| ModalView::ConfirmDelete {
        goal_id,
        question: "Are you sure you want to delete this goal?".into(),
    })
}

pub fn generating_message(title: &str) -> String {
    format!(
        "🤖 Generating an intelligent plan for \"{}\"...",
        sanitize_line(title)
    )
}

pub fn progress_percent(completion: f64) -> u16 {
    if !completion.is_finite() {
        return 0;
    }
    (completion * 100.0).round().clamp(0.0, 100.0) as u16
}

pub fn format_due(date: NaiveDate) -> String {
    format!("Due: {}", date.format("%b %-d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GoalSummary, Phase, Phases, Task};
    use crate::state::GoalForm;
    use std::time::Duration;

    fn state() -> SessionState {
        SessionState::new(GoalForm::starting_today(), Duration::from_secs(3))
    }

    fn task(id: i64, title: &str, completed: bool) -> Task {
        Task {
            id: TaskId(id),
            title: title.into(),
            description: format!("why {title}"),
            due_date: NaiveDate::from_ymd_opt(2026, 10, 8).expect("date"),
            completed,
        }
    }

    #[test]
    fn progress_rounds_and_clamps() {
        assert_eq!(progress_percent(0.5), 50);
        assert_eq!(progress_percent(0.333), 33);
        assert_eq!(progress_percent(0.666), 67);
        assert_eq!(progress_percent(1.0), 100);
        assert_eq!(progress_percent(0.0), 0);
        assert_eq!(progress_percent(f64::NAN), 0);
    }

    #[test]
    fn single_goal_renders_title_and_half_bar() {
        let mut s = state();
        s.goals = vec![GoalSummary {
            id: GoalId(1),
            title: "Learn Go".into(),
            completion: 0.5,
        }];
        s.list_status = ListStatus::Ready;
        assert_eq!(
            render_goal_list(&s),
            GoalListView::Items(vec![GoalItemView {
                id: GoalId(1),
                title: "Learn Go".into(),
                percent: 50,
                active: false,
            }])
        );
    }

    #[test]
    fn highlight_follows_active_id_only() {
        let mut s = state();
        s.goals = (1..=3)
            .map(|i| GoalSummary {
                id: GoalId(i),
                title: format!("g{i}"),
                completion: 0.0,
            })
            .collect();
        s.list_status = ListStatus::Ready;

        s.active_goal_id = Some(GoalId(2));
        let GoalListView::Items(items) = render_goal_list(&s) else {
            panic!("expected items");
        };
        let active = items.iter().filter(|i| i.active).map(|i| i.id).collect::<Vec<_>>();
        assert_eq!(active, vec![GoalId(2)]);

        s.active_goal_id = Some(GoalId(99));
        let GoalListView::Items(items) = render_goal_list(&s) else {
            panic!("expected items");
        };
        assert!(items.iter().all(|i| !i.active));
    }

    #[test]
    fn list_placeholders() {
        let mut s = state();
        assert_eq!(render_goal_list(&s), GoalListView::Skeleton(3));
        s.list_status = ListStatus::Ready;
        assert_eq!(render_goal_list(&s), GoalListView::Placeholder(NO_GOALS.into()));
        s.list_status = ListStatus::Unavailable;
        assert_eq!(
            render_goal_list(&s),
            GoalListView::Placeholder(GOALS_UNAVAILABLE.into())
        );
    }

    #[test]
    fn goal_without_phases_shows_no_tasks_placeholder() {
        let goal = GoalDetail {
            id: GoalId(1),
            title: "Learn Go".into(),
            completion: 0.0,
            phases: Phases::default(),
        };
        let plan = render_plan(&goal);
        assert!(plan.phases.is_empty());
        assert_eq!(plan.empty.as_deref(), Some(NO_TASKS));
    }

    #[test]
    fn plan_keeps_server_order_and_formats_due_dates() {
        let goal = GoalDetail {
            id: GoalId(4),
            title: "Run a 10k".into(),
            completion: 0.5,
            phases: Phases(vec![
                Phase {
                    title: "Week 2".into(),
                    tasks: vec![task(3, "Tempo run", false)],
                },
                Phase {
                    title: "Week 1".into(),
                    tasks: vec![task(1, "Buy shoes", true), task(2, "Easy jog", false)],
                },
            ]),
        };
        let plan = render_plan(&goal);
        assert_eq!(plan.empty, None);
        assert_eq!(plan.percent, 50);
        let order = plan
            .phases
            .iter()
            .map(|p| {
                (
                    p.title.as_str(),
                    p.tasks.iter().map(|t| t.task_id.0).collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(order, vec![("Week 2", vec![3]), ("Week 1", vec![1, 2])]);
        let first = &plan.phases[1].tasks[0];
        assert!(first.checked);
        assert_eq!(first.due, "Due: Oct 8");
        assert_eq!(first.description, "why Buy shoes");
    }

    #[test]
    fn multi_line_description_keeps_word_boundaries() {
        let mut t = task(1, "Study", false);
        t.description = "Read the docs.\nWrite code".into();
        let goal = GoalDetail {
            id: GoalId(1),
            title: "Learn Go".into(),
            completion: 0.0,
            phases: Phases(vec![Phase {
                title: "Week 1".into(),
                tasks: vec![t],
            }]),
        };
        let plan = render_plan(&goal);
        assert_eq!(plan.phases[0].tasks[0].description, "Read the docs. Write code");
    }

    #[test]
    fn detail_placeholders() {
        assert_eq!(
            render_detail(&DetailPane::Idle),
            DetailView::Placeholder(SELECT_PROMPT.into())
        );
        assert_eq!(
            render_detail(&DetailPane::Loading { goal_id: GoalId(1) }),
            DetailView::Placeholder(LOADING_TASKS.into())
        );
        assert_eq!(
            render_detail(&DetailPane::Generating {
                title: "Learn Go".into()
            }),
            DetailView::Placeholder("🤖 Generating an intelligent plan for \"Learn Go\"...".into())
        );
    }

    #[test]
    fn alert_wins_over_confirm_and_keeps_lines() {
        let mut s = state();
        s.confirm_delete = Some(GoalId(5));
        assert!(matches!(
            render(&s).modal,
            Some(ModalView::ConfirmDelete { goal_id: GoalId(5), .. })
        ));
        s.alerts.push_back("Error:\ntitle too long".into());
        assert_eq!(
            render(&s).modal,
            Some(ModalView::Alert("Error:\ntitle too long".into()))
        );
    }

    #[test]
    fn server_text_is_sanitized() {
        let mut s = state();
        s.goals = vec![GoalSummary {
            id: GoalId(1),
            title: "evil\u{1b}]0;title\u{7} goal".into(),
            completion: 0.1,
        }];
        s.list_status = ListStatus::Ready;
        let GoalListView::Items(items) = render_goal_list(&s) else {
            panic!("expected items");
        };
        assert_eq!(items[0].title, "evil goal");
    }
}
