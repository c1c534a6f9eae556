use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, warn};

use crate::executor::AvailabilityProvider;
use crate::planning_parser::parse_planning;
use crate::scan_types::{AvailabilitySnapshot, ProviderError};
use crate::session_manager::SessionManager;

/// Placeholder replaced by the requested date in the planning URL
pub const DATE_PLACEHOLDER: &str = "{date}";

/// Client for the club's booking site
pub struct PadelClient {
    session_manager: SessionManager,
    planning_url: String,
}

impl PadelClient {
    /// Create a client reading plannings from `planning_url`.
    ///
    /// The URL may contain a `{date}` placeholder; otherwise the date is sent
    /// as a `date` query parameter.
    pub fn new(session_manager: SessionManager, planning_url: impl Into<String>) -> Self {
        Self {
            session_manager,
            planning_url: planning_url.into(),
        }
    }

    /// Planning URL and query parameters for `date`
    fn planning_request(&self, date: NaiveDate) -> (String, Vec<(&'static str, String)>) {
        let formatted = date.format("%Y-%m-%d").to_string();

        if self.planning_url.contains(DATE_PLACEHOLDER) {
            (self.planning_url.replace(DATE_PLACEHOLDER, &formatted), Vec::new())
        } else {
            (self.planning_url.clone(), vec![("date", formatted)])
        }
    }

    /// Download the planning page of `date`
    async fn fetch_planning_page(&self, date: NaiveDate) -> Result<String, ProviderError> {
        let (url, params) = self.planning_request(date);
        debug!("Fetching planning for {} from {}", date, url);

        let response = self
            .session_manager
            .get_client()
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            warn!("Planning request failed with status {}: {}", status, body);

            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited,
                401 | 403 => ProviderError::AuthenticationFailed,
                code => ProviderError::Http {
                    status: code,
                    message: body,
                },
            });
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read planning: {}", e)))
    }
}

#[async_trait]
impl AvailabilityProvider for PadelClient {
    async fn fetch_availability(&self, date: NaiveDate) -> Result<AvailabilitySnapshot, ProviderError> {
        self.session_manager.ensure_valid_session().await?;

        let html = match self.fetch_planning_page(date).await {
            Ok(html) => html,
            Err(ProviderError::AuthenticationFailed) => {
                self.session_manager.invalidate().await;
                return Err(ProviderError::AuthenticationFailed);
            }
            Err(e) => return Err(e),
        };

        let page = match parse_planning(&html) {
            Ok(page) => page,
            Err(e) => {
                // A logged-out page carries no planning table
                self.session_manager.invalidate().await;
                return Err(e);
            }
        };

        if let Some(page_date) = page.date {
            if page_date != date {
                return Err(ProviderError::DataFormat(format!(
                    "requested planning for {} but received {}",
                    date, page_date
                )));
            }
        }

        debug!("Planning for {} has {} slots", date, page.slots.len());

        Ok(AvailabilitySnapshot {
            date,
            slots: page.slots,
            fetched_at: Utc::now(),
        })
    }
}
