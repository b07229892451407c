use std::time::Instant;

use crate::gateway::{self, ApiError, ApiResult};
use crate::model::{GoalDetail, GoalId, GoalSummary, NewGoal, TaskId};
use crate::state::{DetailPane, ListStatus, SessionState, ToastKind};
use crate::storage::{ACTIVE_GOAL_KEY, KeyValueStore};

pub const MSG_MISSING_FIELDS: &str = "Please provide both a goal title and a start date.";
pub const MSG_CREATED: &str = "Plan created successfully!";
pub const MSG_PLAN_REJECTED: &str = "The AI could not create a meaningful plan for this goal. Please try a more specific or different goal.";
pub const MSG_PLANNER_UNREACHABLE: &str =
    "Could not reach the planner. Check the connection and try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectGoal(GoalId),
    ToggleTask { task_id: TaskId, goal_id: GoalId },
    DeleteGoal(GoalId),
    ConfirmDelete(bool),
    CreateGoal { title: String, start_date: String },
    RefreshGoals,
    DismissAlert,
}

// Follow-up run once a list refresh settles, whether or not it succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterList {
    FinishCreate(GoalId),
    RestoreSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListGoals { epoch: u64, after: Option<AfterList> },
    GoalDetail { id: GoalId, epoch: u64 },
    CreateGoal { goal: NewGoal },
    ToggleTask { task_id: TaskId, goal_id: GoalId },
    DeleteGoal { id: GoalId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Goals {
        epoch: u64,
        after: Option<AfterList>,
        result: ApiResult<Vec<GoalSummary>>,
    },
    Detail {
        id: GoalId,
        epoch: u64,
        result: ApiResult<GoalDetail>,
    },
    Created {
        result: ApiResult<GoalSummary>,
    },
    Toggled {
        task_id: TaskId,
        goal_id: GoalId,
        result: ApiResult<()>,
    },
    Deleted {
        id: GoalId,
        result: ApiResult<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    Rejected,
    Unreachable,
}

impl CreateFailure {
    pub fn classify(err: &ApiError) -> Self {
        match err {
            ApiError::Status { .. } => CreateFailure::Rejected,
            ApiError::Transport(_) | ApiError::Decode(_) => CreateFailure::Unreachable,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CreateFailure::Rejected => MSG_PLAN_REJECTED,
            CreateFailure::Unreachable => MSG_PLANNER_UNREACHABLE,
        }
    }
}

pub struct Controller {
    state: SessionState,
    store: Box<dyn KeyValueStore>,
    outbox: Vec<Request>,
    list_epoch: u64,
    selection_epoch: u64,
    restore_last_goal: bool,
    restore_pending: bool,
}

impl Controller {
    pub fn new(state: SessionState, store: Box<dyn KeyValueStore>, restore_last_goal: bool) -> Self {
        Self {
            state,
            store,
            outbox: Vec::new(),
            list_epoch: 0,
            selection_epoch: 0,
            restore_last_goal,
            restore_pending: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn form_mut(&mut self) -> &mut crate::state::GoalForm {
        &mut self.state.form
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending_requests(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn start(&mut self) {
        self.state.detail = DetailPane::Idle;
        let after = self.restore_last_goal.then_some(AfterList::RestoreSelection);
        self.load_goals(after);
    }

    pub fn tick(&mut self, now: Instant) {
        self.state.prune_toasts(now);
    }

    pub fn dispatch(&mut self, cmd: Command) {
        tracing::debug!(?cmd, "dispatch");
        match cmd {
            Command::SelectGoal(id) => self.select_goal(id),
            Command::ToggleTask { task_id, goal_id } => {
                self.outbox.push(Request::ToggleTask { task_id, goal_id });
            }
            Command::DeleteGoal(id) => self.state.confirm_delete = Some(id),
            Command::ConfirmDelete(yes) => {
                let Some(id) = self.state.confirm_delete.take() else {
                    return;
                };
                if yes {
                    self.outbox.push(Request::DeleteGoal { id });
                }
            }
            Command::CreateGoal { title, start_date } => self.create_goal(title, start_date),
            Command::RefreshGoals => self.load_goals(None),
            Command::DismissAlert => self.state.dismiss_alert(),
        }
    }

    pub fn apply(&mut self, response: Response) {
        match response {
            Response::Goals {
                epoch,
                after,
                result,
            } => {
                let goals = gateway::absorb("list_goals", result, &mut self.state);
                let current = epoch == self.list_epoch;
                if current {
                    match goals {
                        Some(goals) => {
                            self.state.goals = goals;
                            self.state.list_status = ListStatus::Ready;
                        }
                        None => self.state.list_status = ListStatus::Unavailable,
                    }
                } else {
                    tracing::debug!(epoch, current = self.list_epoch, "discarding stale goal list");
                }
                match after {
                    Some(AfterList::FinishCreate(id)) => self.finish_create(id),
                    Some(AfterList::RestoreSelection) => self.restore_pending = true,
                    None => {}
                }
                // Restore is checked against the newest list only; a stale
                // response defers it until that list has landed.
                let newest_settled = self.state.list_status != ListStatus::Loading;
                if self.restore_pending && (current || newest_settled) {
                    self.restore_pending = false;
                    self.restore_selection();
                }
            }
            Response::Detail { id, epoch, result } => {
                let detail = gateway::absorb("goal", result, &mut self.state);
                if epoch != self.selection_epoch {
                    tracing::debug!(%id, epoch, current = self.selection_epoch, "discarding stale goal detail");
                    return;
                }
                // No value leaves the loading placeholder up.
                if let Some(detail) = detail {
                    self.state.detail = DetailPane::Ready(detail);
                }
            }
            Response::Created { result } => match result {
                Ok(goal) => {
                    tracing::info!(id = %goal.id, title = %goal.title, "goal created");
                    self.state.form.title.clear();
                    self.load_goals(Some(AfterList::FinishCreate(goal.id)));
                }
                Err(err) => {
                    let failure = CreateFailure::classify(&err);
                    let _: Option<GoalSummary> =
                        gateway::absorb("create_goal", Err(err), &mut self.state);
                    self.state.show_toast(ToastKind::Error, failure.message());
                    if matches!(self.state.detail, DetailPane::Generating { .. }) {
                        match self.state.active_goal_id {
                            Some(id) => self.select_goal(id),
                            None => self.state.detail = DetailPane::Idle,
                        }
                    }
                    self.state.loading = false;
                }
            },
            Response::Toggled {
                task_id,
                goal_id,
                result,
            } => {
                if gateway::absorb("toggle_task", result, &mut self.state).is_some() {
                    tracing::debug!(%task_id, %goal_id, "task toggled");
                }
                // Completion is computed server-side: refetch both views either way.
                self.select_goal(goal_id);
                self.load_goals(None);
            }
            Response::Deleted { id, result } => {
                if gateway::absorb("delete_goal", result, &mut self.state).is_some() {
                    tracing::info!(%id, "goal deleted");
                }
                self.state.active_goal_id = None;
                self.selection_epoch += 1;
                self.state.detail = DetailPane::Idle;
                self.load_goals(None);
            }
        }
    }

    fn load_goals(&mut self, after: Option<AfterList>) {
        self.list_epoch += 1;
        self.state.list_status = ListStatus::Loading;
        self.outbox.push(Request::ListGoals {
            epoch: self.list_epoch,
            after,
        });
    }

    fn select_goal(&mut self, id: GoalId) {
        self.state.active_goal_id = Some(id);
        self.selection_epoch += 1;
        self.state.detail = DetailPane::Loading { goal_id: id };
        self.outbox.push(Request::GoalDetail {
            id,
            epoch: self.selection_epoch,
        });
    }

    fn create_goal(&mut self, title: String, start_date: String) {
        if self.state.loading {
            tracing::debug!("create ignored while another is in flight");
            return;
        }
        let title = title.trim().to_string();
        let start_date = start_date.trim().to_string();
        if title.is_empty() || start_date.is_empty() {
            self.state.show_toast(ToastKind::Error, MSG_MISSING_FIELDS);
            return;
        }

        self.state.loading = true;
        // Nothing that was in flight for the old pane may land on top of this one.
        self.selection_epoch += 1;
        self.state.detail = DetailPane::Generating {
            title: title.clone(),
        };
        self.outbox.push(Request::CreateGoal {
            goal: NewGoal { title, start_date },
        });
    }

    fn finish_create(&mut self, id: GoalId) {
        self.state.active_goal_id = Some(id);
        if let Err(e) = self.store.set(ACTIVE_GOAL_KEY, &id.to_string()) {
            tracing::warn!(error = %e, "could not persist active goal");
        }
        self.select_goal(id);
        self.state.show_toast(ToastKind::Success, MSG_CREATED);
        self.state.loading = false;
    }

    fn restore_selection(&mut self) {
        let Some(raw) = self.store.get(ACTIVE_GOAL_KEY) else {
            return;
        };
        let Ok(id) = raw.parse::<GoalId>() else {
            tracing::warn!(value = %raw, "ignoring malformed stored goal id");
            return;
        };
        if self.state.active_goal_id.is_some() {
            return;
        }
        if self.state.goals.iter().any(|g| g.id == id) {
            tracing::info!(%id, "restoring last active goal");
            self.select_goal(id);
        } else {
            tracing::debug!(%id, "stored goal no longer listed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GoalForm;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn controller() -> Controller {
        let state = SessionState::new(GoalForm::starting_today(), Duration::from_secs(3));
        Controller::new(state, Box::new(MemoryStore::default()), false)
    }

    #[test]
    fn select_issues_detail_request_with_fresh_epoch() {
        let mut c = controller();
        c.dispatch(Command::SelectGoal(GoalId(1)));
        c.dispatch(Command::SelectGoal(GoalId(2)));
        let reqs = c.take_requests();
        assert_eq!(
            reqs,
            vec![
                Request::GoalDetail { id: GoalId(1), epoch: 1 },
                Request::GoalDetail { id: GoalId(2), epoch: 2 },
            ]
        );
        assert_eq!(c.state().active_goal_id, Some(GoalId(2)));
        assert_eq!(c.state().detail, DetailPane::Loading { goal_id: GoalId(2) });
    }

    #[test]
    fn confirm_without_pending_delete_is_ignored() {
        let mut c = controller();
        c.dispatch(Command::ConfirmDelete(true));
        assert!(c.take_requests().is_empty());
    }

    #[test]
    fn second_create_while_loading_is_ignored() {
        let mut c = controller();
        c.dispatch(Command::CreateGoal {
            title: "Learn Go".into(),
            start_date: "2026-10-18".into(),
        });
        c.dispatch(Command::CreateGoal {
            title: "Learn Rust".into(),
            start_date: "2026-10-18".into(),
        });
        assert_eq!(c.take_requests().len(), 1);
        assert!(c.state().loading);
    }

    #[test]
    fn create_failure_kinds_pick_their_message() {
        assert_eq!(
            CreateFailure::classify(&ApiError::Status {
                code: 400,
                message: "nope".into()
            })
            .message(),
            MSG_PLAN_REJECTED
        );
        assert_eq!(
            CreateFailure::classify(&ApiError::Transport("refused".into())).message(),
            MSG_PLANNER_UNREACHABLE
        );
    }
}
