//! External calendar providers.
//!
//! The two remote services (Canvas and Google Calendar) share one sync
//! contract: page through a container listing (courses / calendars), page
//! through each container's items (assignments / events), normalize the
//! items, and tolerate a single container failing without aborting the rest.
//! [`pull`] is that contract; the provider clients only supply the paging
//! and payload shapes that differ between the two services.

pub mod canvas;
pub mod google;

pub use canvas::CanvasClient;
pub use google::GoogleClient;

/// Remote fetch failure. Covers transport errors, non-2xx statuses, and
/// undecodable payloads — all of which surface from reqwest.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A remote course or calendar.
#[derive(Debug, Clone)]
pub struct RemoteContainer {
    /// Identifier in the remote service (course id / calendar id).
    pub remote_id: String,
    pub name: String,
    pub code: Option<String>,
    pub enrolled_at: Option<String>,
}

/// A remote assignment or calendar event, normalized: `due_at` is always an
/// RFC 3339 UTC timestamp, so ascending string order is chronological order.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    pub title: String,
    pub description: String,
    pub due_at: String,
}

/// One container and the items that survived normalization. A container
/// whose item fetch failed is kept with an empty item list.
#[derive(Debug)]
pub struct ContainerSync {
    pub container: RemoteContainer,
    pub events: Vec<RemoteEvent>,
}

/// Result of a full provider pull.
#[derive(Debug)]
pub struct SyncBatch {
    pub containers: Vec<ContainerSync>,
}

impl SyncBatch {
    pub fn event_count(&self) -> usize {
        self.containers.iter().map(|c| c.events.len()).sum()
    }
}

/// One remote service, reduced to the two listing calls the sync contract
/// needs.
#[allow(async_fn_in_trait)]
pub trait Provider {
    /// Tag recorded on synced events and the connected-account row.
    fn account_type(&self) -> &'static str;

    /// Fetch every container, following pagination to exhaustion.
    async fn list_containers(&self) -> Result<Vec<RemoteContainer>, ProviderError>;

    /// Fetch and normalize every item of one container.
    async fn list_events(&self, container: &RemoteContainer)
    -> Result<Vec<RemoteEvent>, ProviderError>;
}

/// Pull everything a provider has for the authenticated user.
///
/// A failure listing containers aborts the pull; a failure listing one
/// container's items is logged and that container syncs empty.
pub async fn pull<P: Provider>(provider: &P) -> Result<SyncBatch, ProviderError> {
    let containers = provider.list_containers().await?;
    tracing::info!(
        provider = provider.account_type(),
        containers = containers.len(),
        "fetched remote containers"
    );

    let mut out = Vec::with_capacity(containers.len());
    for container in containers {
        let events = match provider.list_events(&container).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    provider = provider.account_type(),
                    container = %container.remote_id,
                    "skipping items for container: {e}"
                );
                Vec::new()
            }
        };
        out.push(ContainerSync { container, events });
    }

    Ok(SyncBatch { containers: out })
}

/// Normalize a remote timestamp to RFC 3339 UTC with second precision.
/// Accepts timed (`2024-01-15T10:00:00-05:00`, trailing `Z`) and all-day
/// (`2024-01-15`) representations; all-day maps to midnight UTC. Returns
/// `None` for anything unparseable.
pub(crate) fn normalize_timestamp(raw: &str) -> Option<String> {
    let utc = if raw.contains('T') {
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()?
            .with_timezone(&chrono::Utc)
    } else {
        let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        chrono::DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, chrono::Utc)
    };
    Some(utc.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}
