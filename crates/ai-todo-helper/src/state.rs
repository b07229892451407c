use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::gateway::AlertSink;
use crate::model::{GoalDetail, GoalId, GoalSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    Loading,
    Ready,
    /// The last refresh yielded no value; `goals` still holds the previous list.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailPane {
    Idle,
    Loading { goal_id: GoalId },
    Generating { title: String },
    Ready(GoalDetail),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalForm {
    pub title: String,
    pub start_date: String,
}

impl GoalForm {
    pub fn starting_today() -> Self {
        Self {
            title: String::new(),
            start_date: chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub goals: Vec<GoalSummary>,
    pub list_status: ListStatus,
    pub active_goal_id: Option<GoalId>,
    pub detail: DetailPane,
    pub loading: bool,
    pub form: GoalForm,
    pub toasts: Vec<Toast>,
    /// Blocking alerts, oldest first. Only the front one is on screen.
    pub alerts: VecDeque<String>,
    pub confirm_delete: Option<GoalId>,
    toast_ttl: Duration,
}

impl SessionState {
    pub fn new(form: GoalForm, toast_ttl: Duration) -> Self {
        Self {
            goals: Vec::new(),
            list_status: ListStatus::Loading,
            active_goal_id: None,
            detail: DetailPane::Idle,
            loading: false,
            form,
            toasts: Vec::new(),
            alerts: VecDeque::new(),
            confirm_delete: None,
            toast_ttl,
        }
    }

    pub fn active_goal_detail(&self) -> Option<&GoalDetail> {
        match &self.detail {
            DetailPane::Ready(goal) => Some(goal),
            _ => None,
        }
    }

    pub fn show_toast(&mut self, kind: ToastKind, text: impl Into<String>) {
        self.toasts.push(Toast {
            text: text.into(),
            kind,
            expires_at: Instant::now() + self.toast_ttl,
        });
    }

    pub fn prune_toasts(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires_at > now);
    }

    pub fn dismiss_alert(&mut self) {
        self.alerts.pop_front();
    }
}

impl AlertSink for SessionState {
    fn alert(&mut self, text: String) {
        self.alerts.push_back(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_ttl() {
        let mut state = SessionState::new(GoalForm::starting_today(), Duration::from_millis(3000));
        state.show_toast(ToastKind::Success, "Plan created successfully!");
        let now = Instant::now();
        state.prune_toasts(now);
        assert_eq!(state.toasts.len(), 1);
        state.prune_toasts(now + Duration::from_millis(3001));
        assert!(state.toasts.is_empty());
    }

    #[test]
    fn alerts_queue_until_dismissed() {
        let mut state = SessionState::new(GoalForm::starting_today(), Duration::from_secs(3));
        state.alert("Error:\nfirst".into());
        state.alert("Error:\nsecond".into());
        assert_eq!(state.alerts.len(), 2);
        state.dismiss_alert();
        assert_eq!(state.alerts.front().map(String::as_str), Some("Error:\nsecond"));
        state.dismiss_alert();
        assert!(state.alerts.is_empty());
    }

    #[test]
    fn form_defaults_to_today() {
        let form = GoalForm::starting_today();
        assert!(form.title.is_empty());
        assert!(chrono::NaiveDate::parse_from_str(&form.start_date, "%Y-%m-%d").is_ok());
    }
}
