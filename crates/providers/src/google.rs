//! Google Calendar client.
//!
//! Lists the user's calendars and each calendar's upcoming events. Google
//! paginates with a `nextPageToken` in the response body; both listings
//! follow the token until none remains. Timed and all-day events are both
//! accepted; all-day starts normalize to midnight UTC.

use serde::Deserialize;

use crate::{Provider, ProviderError, RemoteContainer, RemoteEvent, normalize_timestamp};

/// Production Google Calendar API.
pub const GOOGLE_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

const CALENDARS_PAGE_SIZE: &str = "250";
const EVENTS_PAGE_SIZE: &str = "2500";

pub struct GoogleClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    time_min: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarEvent {
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl GoogleClient {
    /// `base_url` is overridable so tests can point at a local server.
    /// Events starting before "now" are not fetched.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            time_min: chrono::Utc::now(),
        }
    }

    async fn fetch_all_pages<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        base_params: &[(&str, String)],
    ) -> Result<Vec<T>, ProviderError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self.http.get(url).query(base_params);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let page: Page<T> = req
                .bearer_auth(&self.token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            out.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(out)
    }
}

impl Provider for GoogleClient {
    fn account_type(&self) -> &'static str {
        "Google"
    }

    async fn list_containers(&self) -> Result<Vec<RemoteContainer>, ProviderError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let params = [("maxResults", CALENDARS_PAGE_SIZE.to_string())];

        let calendars: Vec<CalendarListEntry> = self.fetch_all_pages(&url, &params).await?;

        Ok(calendars
            .into_iter()
            .map(|c| RemoteContainer {
                remote_id: c.id,
                name: c.summary.unwrap_or_else(|| "Unnamed Calendar".into()),
                code: None,
                enrolled_at: None,
            })
            .collect())
    }

    async fn list_events(
        &self,
        container: &RemoteContainer,
    ) -> Result<Vec<RemoteEvent>, ProviderError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&container.remote_id)
        );
        let params = [
            (
                "timeMin",
                self.time_min
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", EVENTS_PAGE_SIZE.to_string()),
        ];

        let events: Vec<CalendarEvent> = self.fetch_all_pages(&url, &params).await?;

        // Events without a start never reach the calendar.
        Ok(events
            .into_iter()
            .filter_map(|e| {
                let start = e.start?;
                let raw = start.date_time.or(start.date)?;
                let due_at = normalize_timestamp(&raw)?;
                Some(RemoteEvent {
                    title: e.summary.unwrap_or_else(|| "(No title)".into()),
                    description: e.description.unwrap_or_default(),
                    due_at,
                })
            })
            .collect())
    }
}
