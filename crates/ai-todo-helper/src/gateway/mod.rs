use std::fmt;
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::model::{GoalDetail, GoalId, GoalSummary, NewGoal, TaskId};

pub const GENERIC_API_ERROR: &str = "An API error occurred.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Transport(String),
    Status { code: u16, message: String },
    Decode(String),
}

impl ApiError {
    pub fn message(&self) -> &str {
        match self {
            ApiError::Transport(m) | ApiError::Decode(m) => m,
            ApiError::Status { message, .. } => message,
        }
    }

    pub fn alert_text(&self) -> String {
        format!("Error:\n{}", self.message())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(m) => write!(f, "transport error: {m}"),
            ApiError::Status { code, message } => write!(f, "HTTP {code}: {message}"),
            ApiError::Decode(m) => write!(f, "undecodable response: {m}"),
        }
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub trait Api: Send + Sync {
    fn list_goals(&self) -> ApiResult<Vec<GoalSummary>>;
    fn goal(&self, id: GoalId) -> ApiResult<GoalDetail>;
    fn create_goal(&self, goal: &NewGoal) -> ApiResult<GoalSummary>;
    fn toggle_task(&self, id: TaskId) -> ApiResult<()>;
    fn delete_goal(&self, id: GoalId) -> ApiResult<()>;
}

pub trait AlertSink {
    fn alert(&mut self, text: String);
}

/// Collapse a gateway result into "value or nothing".
///
/// Failures end here: they are logged, surfaced as a blocking alert and
/// reported to the caller as `None`, which means "unavailable", never "empty".
pub fn absorb<T>(op: &str, result: ApiResult<T>, sink: &mut dyn AlertSink) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(err) => {
            tracing::error!(op, error = %err, "api request failed");
            sink.alert(err.alert_text());
            None
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct FieldError {
    msg: String,
    #[serde(default)]
    loc: Vec<serde_json::Value>,
}

pub fn error_message_from_body(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return GENERIC_API_ERROR.into();
    };
    match parsed.detail {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Array(items)) if !items.is_empty() => {
            let Ok(fields) = serde_json::from_value::<Vec<FieldError>>(
                serde_json::Value::Array(items),
            ) else {
                return GENERIC_API_ERROR.into();
            };
            fields
                .iter()
                .map(|f| match f.loc.get(1).and_then(loc_segment) {
                    Some(field) => format!("{} (in {field})", f.msg),
                    None => f.msg.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => GENERIC_API_ERROR.into(),
    }
}

fn loc_segment(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct HttpApi {
    client: Client,
    base: String,
}

impl HttpApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `Ok(None)` is the explicit "no content" result.
    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<String>,
    ) -> ApiResult<Option<T>> {
        let url = format!("{}{}", self.base, endpoint);
        tracing::debug!(%method, %url, "api request");

        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }
        let res = req
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = res.status();
        tracing::debug!(%url, status = status.as_u16(), "api response");
        if !status.is_success() {
            let text = res.text().unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: error_message_from_body(&text),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = res
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        // Decode from text, not serde_json::Value, so phase order survives.
        serde_json::from_str::<T>(&text)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<String>,
    ) -> ApiResult<T> {
        self.request(method, endpoint, body)?
            .ok_or_else(|| ApiError::Decode(format!("empty response from {endpoint}")))
    }

    fn send_no_content(&self, method: Method, endpoint: &str) -> ApiResult<()> {
        self.request::<serde_json::Value>(method, endpoint, None)
            .map(|_| ())
    }
}

impl Api for HttpApi {
    fn list_goals(&self) -> ApiResult<Vec<GoalSummary>> {
        self.fetch(Method::GET, "/goals", None)
    }

    fn goal(&self, id: GoalId) -> ApiResult<GoalDetail> {
        self.fetch(Method::GET, &format!("/goals/{id}"), None)
    }

    fn create_goal(&self, goal: &NewGoal) -> ApiResult<GoalSummary> {
        let body = serde_json::to_string(goal).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.fetch(Method::POST, "/goals", Some(body))
    }

    fn toggle_task(&self, id: TaskId) -> ApiResult<()> {
        self.send_no_content(Method::PATCH, &format!("/tasks/{id}/toggle"))
    }

    fn delete_goal(&self, id: GoalId) -> ApiResult<()> {
        self.send_no_content(Method::DELETE, &format!("/goals/{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    #[derive(Default)]
    struct Alerts(Vec<String>);

    impl AlertSink for Alerts {
        fn alert(&mut self, text: String) {
            self.0.push(text);
        }
    }

    struct Seen {
        method: String,
        path: String,
        body: String,
    }

    fn read_request(stream: &mut std::net::TcpStream) -> Seen {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut buf).expect("read request");
            if n == 0 {
                break data.len();
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while data.len() < header_end + content_length {
            let n = stream.read(&mut buf).expect("read body");
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }
        let mut first = head.lines().next().unwrap_or_default().split_whitespace();
        Seen {
            method: first.next().unwrap_or_default().to_string(),
            path: first.next().unwrap_or_default().to_string(),
            body: String::from_utf8_lossy(&data[header_end..]).to_string(),
        }
    }

    fn spawn_server(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, mpsc::Receiver<Seen>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                let seen = read_request(&mut stream);
                let _ = tx.send(seen);
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(resp.as_bytes()).expect("write response");
            }
        });
        (format!("http://{addr}/api"), rx, handle)
    }

    fn api_for(base_url: String) -> HttpApi {
        HttpApi::new(&ApiConfig {
            base_url,
            timeout_secs: 5,
        })
        .expect("client")
    }

    #[test]
    fn field_errors_join_one_per_line() {
        let body = r#"{"detail": [
            {"msg": "field required", "loc": ["body", "title"], "type": "missing"},
            {"msg": "invalid date", "loc": ["body", "start_date"]}
        ]}"#;
        assert_eq!(
            error_message_from_body(body),
            "field required (in title)\ninvalid date (in start_date)"
        );
    }

    #[test]
    fn single_detail_is_the_message() {
        assert_eq!(
            error_message_from_body(r#"{"detail": "title too long"}"#),
            "title too long"
        );
    }

    #[test]
    fn unusable_bodies_fall_back_to_generic() {
        for body in [
            "<html>502</html>",
            "",
            r#"{"detail": ""}"#,
            r#"{"detail": []}"#,
            r#"{"detail": 42}"#,
            r#"{"message": "nope"}"#,
        ] {
            assert_eq!(error_message_from_body(body), GENERIC_API_ERROR, "body: {body}");
        }
    }

    #[test]
    fn field_error_without_location_keeps_message() {
        let body = r#"{"detail": [{"msg": "bad", "loc": ["body"]}, {"msg": "worse", "loc": ["query", 3]}]}"#;
        assert_eq!(error_message_from_body(body), "bad\nworse (in 3)");
    }

    #[test]
    fn absorb_alerts_and_yields_nothing() {
        let mut alerts = Alerts::default();
        let err = ApiError::Status {
            code: 400,
            message: "title too long".into(),
        };
        let got: Option<()> = absorb("create_goal", Err(err), &mut alerts);
        assert!(got.is_none());
        assert_eq!(alerts.0, vec!["Error:\ntitle too long".to_string()]);

        let got = absorb("list_goals", Ok(3), &mut alerts);
        assert_eq!(got, Some(3));
        assert_eq!(alerts.0.len(), 1);
    }

    #[test]
    fn http_list_and_detail_decode() {
        let (base, seen, handle) = spawn_server(vec![
            ("200 OK", r#"[{"id": 1, "title": "Learn Go", "completion": 0.5}]"#),
            (
                "200 OK",
                r#"{"id": 1, "title": "Learn Go", "phases": {"B": [], "A": []}}"#,
            ),
        ]);
        let api = api_for(base);

        let goals = api.list_goals().expect("list");
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].title, "Learn Go");
        let req = seen.recv().expect("seen");
        assert_eq!((req.method.as_str(), req.path.as_str()), ("GET", "/api/goals"));

        let detail = api.goal(GoalId(1)).expect("detail");
        let names = detail.phases.iter().map(|p| p.title.clone()).collect::<Vec<_>>();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(seen.recv().expect("seen").path, "/api/goals/1");
        handle.join().expect("join");
    }

    #[test]
    fn http_create_posts_json_and_maps_status_errors() {
        let (base, seen, handle) = spawn_server(vec![(
            "400 Bad Request",
            r#"{"detail": "title too long"}"#,
        )]);
        let api = api_for(base);
        let err = api
            .create_goal(&NewGoal {
                title: "Learn Go".into(),
                start_date: "2026-10-18".into(),
            })
            .expect_err("rejected");
        assert_eq!(
            err,
            ApiError::Status {
                code: 400,
                message: "title too long".into()
            }
        );
        assert_eq!(err.alert_text(), "Error:\ntitle too long");

        let req = seen.recv().expect("seen");
        assert_eq!(req.method, "POST");
        let body: serde_json::Value = serde_json::from_str(&req.body).expect("json body");
        assert_eq!(body["title"], "Learn Go");
        assert_eq!(body["start_date"], "2026-10-18");
        handle.join().expect("join");
    }

    #[test]
    fn http_no_content_is_success() {
        let (base, seen, handle) = spawn_server(vec![("204 No Content", ""), ("204 No Content", "")]);
        let api = api_for(base);
        api.toggle_task(TaskId(9)).expect("toggle");
        api.delete_goal(GoalId(4)).expect("delete");
        let toggle = seen.recv().expect("seen");
        assert_eq!((toggle.method.as_str(), toggle.path.as_str()), ("PATCH", "/api/tasks/9/toggle"));
        let delete = seen.recv().expect("seen");
        assert_eq!((delete.method.as_str(), delete.path.as_str()), ("DELETE", "/api/goals/4"));
        handle.join().expect("join");
    }

    #[test]
    fn http_validation_errors_surface_field_names() {
        let (base, _seen, handle) = spawn_server(vec![(
            "422 Unprocessable Entity",
            r#"{"detail": [{"msg": "Input should be a valid date", "loc": ["body", "start_date"]}]}"#,
        )]);
        let api = api_for(base);
        let err = api
            .create_goal(&NewGoal {
                title: "x".into(),
                start_date: "tomorrow".into(),
            })
            .expect_err("invalid");
        assert_eq!(err.message(), "Input should be a valid date (in start_date)");
        handle.join().expect("join");
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let api = api_for(format!("http://{addr}/api"));
        let err = api.list_goals().expect_err("no server");
        assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
    }

    #[test]
    fn empty_success_body_for_a_value_is_a_decode_error() {
        let (base, _seen, handle) = spawn_server(vec![("204 No Content", "")]);
        let api = api_for(base);
        let err = api.list_goals().expect_err("needs a body");
        assert!(matches!(err, ApiError::Decode(_)), "got {err:?}");
        handle.join().expect("join");
    }
}
