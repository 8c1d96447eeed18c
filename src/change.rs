use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::source::ObservationSource;

/// Checks the store's latest response timestamp. Never fetches the dataset itself.
pub struct ChangeDetector<'a> {
    source: &'a dyn ObservationSource,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(source: &'a dyn ObservationSource) -> Self {
        Self { source }
    }

    /// `true` only when the check returns a timestamp strictly after `last_sync`.
    /// Check failures are logged and read as "no new data".
    pub async fn has_new_data(&self, last_sync: DateTime<Utc>) -> bool {
        match self.source.latest_response_at().await {
            Ok(latest) => {
                let changed = is_newer(latest, last_sync);
                debug!(?latest, %last_sync, changed, "freshness check");
                changed
            }
            Err(err) => {
                warn!(error = %err, "freshness check failed, retrying on next tick");
                false
            }
        }
    }
}

pub fn is_newer(latest: Option<DateTime<Utc>>, last_sync: DateTime<Utc>) -> bool {
    latest.is_some_and(|latest| latest > last_sync)
}
