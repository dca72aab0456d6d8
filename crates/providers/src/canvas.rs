//! Canvas LMS client.
//!
//! Lists the student's active courses and each course's upcoming
//! assignments. Canvas paginates with RFC 5988 `Link` headers; both
//! listings follow `rel="next"` links until none remain.

use serde::Deserialize;

use crate::{Provider, ProviderError, RemoteContainer, RemoteEvent, normalize_timestamp};

/// Production Canvas instance.
pub const CANVAS_BASE_URL: &str = "https://canvas.vt.edu";

pub struct CanvasClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CanvasCourse {
    id: i64,
    name: Option<String>,
    course_code: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasAssignment {
    name: Option<String>,
    description: Option<String>,
    due_at: Option<String>,
}

impl CanvasClient {
    /// `base_url` is overridable so tests can point at a local server.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Fetch every page of a Canvas collection, starting from the given
    /// request and following `Link: <...>; rel="next"` headers.
    async fn fetch_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        first: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, ProviderError> {
        let mut out = Vec::new();
        let mut next_url: Option<String> = None;

        loop {
            let req = match &next_url {
                Some(url) => self.http.get(url),
                None => first.try_clone().expect("canvas requests have no body"),
            };
            let resp = req
                .bearer_auth(&self.token)
                .send()
                .await?
                .error_for_status()?;

            let next = resp
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);

            let page: Vec<T> = resp.json().await?;
            out.extend(page);

            match next {
                Some(url) => next_url = Some(url),
                None => break,
            }
        }

        Ok(out)
    }
}

impl Provider for CanvasClient {
    fn account_type(&self) -> &'static str {
        "Canvas"
    }

    async fn list_containers(&self) -> Result<Vec<RemoteContainer>, ProviderError> {
        let first = self
            .http
            .get(format!("{}/api/v1/courses", self.base_url))
            .query(&[
                ("enrollment_type", "student"),
                ("enrollment_role", "StudentEnrollment"),
            ]);

        let courses: Vec<CanvasCourse> = self.fetch_all_pages(first).await?;

        Ok(courses
            .into_iter()
            .map(|c| RemoteContainer {
                remote_id: c.id.to_string(),
                name: c.name.unwrap_or_else(|| "Unnamed Course".into()),
                code: c.course_code,
                enrolled_at: c.created_at,
            })
            .collect())
    }

    async fn list_events(
        &self,
        container: &RemoteContainer,
    ) -> Result<Vec<RemoteEvent>, ProviderError> {
        let first = self
            .http
            .get(format!(
                "{}/api/v1/courses/{}/assignments",
                self.base_url, container.remote_id
            ))
            .query(&[("bucket", "upcoming"), ("order_by", "due_at")]);

        let assignments: Vec<CanvasAssignment> = self.fetch_all_pages(first).await?;

        // Assignments without a due date never reach the calendar.
        Ok(assignments
            .into_iter()
            .filter_map(|a| {
                let due_at = normalize_timestamp(a.due_at.as_deref()?)?;
                Some(RemoteEvent {
                    title: a.name.unwrap_or_default(),
                    description: a.description.unwrap_or_default(),
                    due_at,
                })
            })
            .collect())
    }
}

/// Extract the `rel="next"` target from a `Link` header value.
fn next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut pieces = part.split(';');
        let url = pieces.next().map(str::trim)?;
        if pieces.any(|p| p.trim() == "rel=\"next\"")
            && url.starts_with('<')
            && url.ends_with('>')
        {
            return Some(url[1..url.len() - 1].to_string());
        }
    }
    None
}
