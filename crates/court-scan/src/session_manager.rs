use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, cookie::Jar};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::scan_types::ProviderError;

/// Manages the logged-in session on the booking site.
/// The cookie jar of the shared client carries the session between requests.
pub struct SessionManager {
    client: Client,
    session_state: RwLock<SessionState>,
    config: SessionConfig,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    /// When the login last succeeded
    last_validated: Option<DateTime<Utc>>,

    /// Whether the current session is valid
    is_valid: bool,

    /// Number of consecutive failures
    failure_count: u32,
}

/// Configuration for the booking site session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Login form endpoint
    pub login_url: String,

    /// Account username
    pub username: String,

    /// Account password
    pub password: String,

    /// Text only present on pages served to a logged-in user
    pub logged_in_marker: String,

    /// How long a login is trusted before logging in again (default: 30 minutes)
    pub validation_interval: Duration,

    /// Timeout applied to every request (default: 30 seconds)
    pub request_timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            username: String::new(),
            password: String::new(),
            logged_in_marker: "Déconnexion".to_string(),
            validation_interval: Duration::from_secs(30 * 60), // 30 minutes
            request_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: SessionConfig) -> Result<Self, ProviderError> {
        if config.login_url.is_empty() {
            return Err(ProviderError::ConfigError("login URL is empty".to_string()));
        }

        // Create a cookie jar for session management
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .cookie_provider(jar)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            session_state: RwLock::new(SessionState::default()),
            config,
        })
    }

    /// Ensure we have a valid session, logging in if needed
    pub async fn ensure_valid_session(&self) -> Result<(), ProviderError> {
        let needs_login = {
            let state = self.session_state.read().await;
            self.needs_login(&state, Utc::now())
        };

        if needs_login {
            self.login().await?;
        }

        Ok(())
    }

    fn needs_login(&self, state: &SessionState, now: DateTime<Utc>) -> bool {
        match state.last_validated {
            None => true,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or_default();
                !state.is_valid || elapsed > self.config.validation_interval
            }
        }
    }

    /// Post the credentials to the login form
    async fn login(&self) -> Result<(), ProviderError> {
        info!("Logging in to the booking site");

        let form = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            self.record_failure().await;
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::AuthenticationFailed,
                429 => ProviderError::RateLimited,
                code => ProviderError::Http {
                    status: code,
                    message: "login rejected".to_string(),
                },
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read login response: {}", e)))?;

        if !body.contains(&self.config.logged_in_marker) {
            self.record_failure().await;
            return Err(ProviderError::AuthenticationFailed);
        }

        {
            let mut state = self.session_state.write().await;
            state.last_validated = Some(Utc::now());
            state.is_valid = true;
            state.failure_count = 0;
        }

        info!("Logged in to the booking site");
        Ok(())
    }

    async fn record_failure(&self) {
        let mut state = self.session_state.write().await;
        state.is_valid = false;
        state.failure_count += 1;
        warn!("Login failed, failure count: {}", state.failure_count);
    }

    /// Drop the current session so the next request logs in again
    pub async fn invalidate(&self) {
        debug!("Invalidating booking site session");
        self.session_state.write().await.is_valid = false;
    }

    /// Get the HTTP client carrying the session cookies
    pub fn get_client(&self) -> &Client {
        &self.client
    }

    /// Get current session statistics
    pub async fn get_session_stats(&self) -> SessionStats {
        let state = self.session_state.read().await;

        SessionStats {
            is_valid: state.is_valid,
            last_validated: state.last_validated,
            failure_count: state.failure_count,
        }
    }
}

/// Statistics about the current session
#[derive(Debug, Serialize)]
pub struct SessionStats {
    /// Whether the last login is still trusted
    pub is_valid: bool,
    /// When the login last succeeded
    pub last_validated: Option<DateTime<Utc>>,
    /// Consecutive failed logins
    pub failure_count: u32,
}
