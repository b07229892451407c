use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::controller::{Controller, Request, Response};
use crate::gateway::Api;

pub fn execute(request: Request, api: &dyn Api) -> Response {
    match request {
        Request::ListGoals { epoch, after } => Response::Goals {
            epoch,
            after,
            result: api.list_goals(),
        },
        Request::GoalDetail { id, epoch } => Response::Detail {
            id,
            epoch,
            result: api.goal(id),
        },
        Request::CreateGoal { goal } => Response::Created {
            result: api.create_goal(&goal),
        },
        Request::ToggleTask { task_id, goal_id } => Response::Toggled {
            task_id,
            goal_id,
            result: api.toggle_task(task_id),
        },
        Request::DeleteGoal { id } => Response::Deleted {
            id,
            result: api.delete_goal(id),
        },
    }
}

pub struct Executor {
    api: Arc<dyn Api>,
    tx: Sender<Response>,
    rx: Receiver<Response>,
    in_flight: usize,
}

impl Executor {
    pub fn new(api: Arc<dyn Api>) -> Self {
        let (tx, rx) = mpsc::channel::<Response>();
        Self {
            api,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn submit(&mut self, request: Request) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        self.in_flight += 1;
        thread::spawn(move || {
            let response = execute(request, api.as_ref());
            if tx.send(response).is_err() {
                tracing::debug!("response dropped; receiver gone");
            }
        });
    }

    pub fn drain(&mut self) -> Vec<Response> {
        let mut out = Vec::new();
        while let Ok(resp) = self.rx.try_recv() {
            out.push(resp);
        }
        self.in_flight = self.in_flight.saturating_sub(out.len());
        out
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn pump(&mut self, controller: &mut Controller) {
        for request in controller.take_requests() {
            self.submit(request);
        }
        for response in self.drain() {
            controller.apply(response);
        }
    }
}

/// Drive the controller until its outbox stays empty, serving requests in
/// queue order on the calling thread.
pub fn run_inline(controller: &mut Controller, api: &dyn Api) {
    while controller.has_pending_requests() {
        for request in controller.take_requests() {
            let response = execute(request, api);
            controller.apply(response);
        }
    }
}
