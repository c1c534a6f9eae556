use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use court_scan::{
    CourtScope, DATE_PLACEHOLDER, NotificationPolicy, ScanExecutorConfig, SessionConfig,
    TargetTimes, TimeWindow, WatchPlan, WatchScope,
};
use notification_services::SmtpSettings;
use validator::{Validate, ValidateEmail, ValidateUrl, ValidationError};

/// Longest rolling horizon, in days
pub const MAX_LOOKAHEAD_DAYS: u32 = 60;

/// Errors raised while reading the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable could not be parsed
    #[error("Invalid value for {var}: {message}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// What went wrong
        message: String,
    },

    /// Parsed values failed validation
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Where notifications go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    /// Real emails through AWS SES
    Ses,
    /// Real emails through an SMTP relay
    Smtp,
    /// Log the messages only
    Log,
}

/// Runtime configuration, read once at startup
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_notifier"))]
pub struct Config {
    /// Booking site username
    #[validate(length(min = 1, message = "PADEL_USERNAME is required"))]
    pub username: String,

    /// Booking site password
    #[validate(length(min = 1, message = "PADEL_PASSWORD is required"))]
    pub password: String,

    /// Login form endpoint
    #[validate(custom(function = "validate_http_url"))]
    pub login_url: String,

    /// Planning page, optionally with a `{date}` placeholder
    #[validate(custom(function = "validate_http_url"))]
    pub planning_url: String,

    /// Link put in the notifications
    #[validate(custom(function = "validate_http_url"))]
    pub booking_url: String,

    /// Text proving the login succeeded
    #[validate(length(min = 1, message = "LOGGED_IN_MARKER must not be empty"))]
    pub logged_in_marker: String,

    /// Notification recipients
    #[validate(custom(function = "validate_recipients"))]
    pub recipients: Vec<String>,

    /// Sender address; defaults to the SMTP login with `NOTIFIER=smtp`
    pub from_email: Option<String>,

    /// Notification channel
    pub notifier: NotifierKind,

    /// SMTP relay host
    pub smtp_server: String,

    /// SMTP relay port
    pub smtp_port: u16,

    /// SMTP login
    pub smtp_username: Option<String>,

    /// SMTP password
    pub smtp_password: Option<String>,

    /// Slot start times worth a notification
    pub target_times: TargetTimes,

    /// Watched courts
    pub courts: CourtScope,

    /// Watched dates
    #[validate(custom(function = "validate_watch_scope"))]
    pub watch: WatchScope,

    /// Minutes between two cycles
    #[validate(range(min = 1, max = 1440, message = "CHECK_INTERVAL must be between 1 and 1440 minutes"))]
    pub check_interval_minutes: u64,

    /// Seconds between two provider calls
    #[validate(range(max = 3600, message = "MIN_FETCH_INTERVAL_SECS must be at most 3600"))]
    pub min_fetch_interval_secs: u64,

    /// HTTP request timeout in seconds
    #[validate(range(min = 1, max = 600, message = "PROVIDER_TIMEOUT_SECS must be between 1 and 600"))]
    pub provider_timeout_secs: u64,

    /// Minutes a login is trusted
    #[validate(range(min = 1, max = 1440, message = "SESSION_REVALIDATE_MINUTES must be between 1 and 1440"))]
    pub session_revalidate_minutes: u64,

    /// Directory of the state documents
    pub state_dir: PathBuf,

    /// Renotification policy
    pub policy: NotificationPolicy,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let planning_url = required("PLANNING_URL")?;

        let target_times = parse_target_times(
            get("TARGET_TIME").as_deref(),
            get("TARGET_TIME_START").as_deref(),
            get("TARGET_TIME_END").as_deref(),
        )?;

        let watch = match get("WATCH_DATES") {
            Some(dates) => WatchScope::Dates(parse_dates(&dates)?),
            None => WatchScope::Horizon {
                days: parse_number("LOOKAHEAD_DAYS", get("LOOKAHEAD_DAYS"), 7)?,
            },
        };

        let notifier = match get("NOTIFIER").map(|kind| kind.to_ascii_lowercase()).as_deref() {
            None | Some("ses") => NotifierKind::Ses,
            Some("smtp") => NotifierKind::Smtp,
            Some("log") => NotifierKind::Log,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "NOTIFIER",
                    message: format!("expected ses, smtp or log, got '{}'", other),
                });
            }
        };

        let policy = match get("NOTIFY_POLICY") {
            Some(policy) => NotificationPolicy::from_str(&policy).map_err(|message| {
                ConfigError::Invalid {
                    var: "NOTIFY_POLICY",
                    message,
                }
            })?,
            None => NotificationPolicy::default(),
        };

        let smtp_username = get("SMTP_USERNAME");
        let from_email = match notifier {
            NotifierKind::Smtp => get("FROM_EMAIL").or_else(|| smtp_username.clone()),
            _ => get("FROM_EMAIL"),
        };

        let config = Self {
            username: required("PADEL_USERNAME")?,
            password: required("PADEL_PASSWORD")?,
            login_url: required("LOGIN_URL")?,
            booking_url: get("BOOKING_URL").unwrap_or_else(|| planning_url.clone()),
            planning_url,
            logged_in_marker: get("LOGGED_IN_MARKER").unwrap_or_else(|| "Déconnexion".to_string()),
            recipients: required("NOTIFICATION_EMAIL")?
                .split(',')
                .map(|email| email.trim().to_string())
                .filter(|email| !email.is_empty())
                .collect(),
            from_email,
            notifier,
            smtp_server: get("SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: parse_number("SMTP_PORT", get("SMTP_PORT"), 587)?,
            smtp_username,
            smtp_password: get("SMTP_PASSWORD"),
            target_times,
            courts: parse_courts(get("COURTS").as_deref()),
            watch,
            check_interval_minutes: parse_number("CHECK_INTERVAL", get("CHECK_INTERVAL"), 5)?,
            min_fetch_interval_secs: parse_number(
                "MIN_FETCH_INTERVAL_SECS",
                get("MIN_FETCH_INTERVAL_SECS"),
                2,
            )?,
            provider_timeout_secs: parse_number(
                "PROVIDER_TIMEOUT_SECS",
                get("PROVIDER_TIMEOUT_SECS"),
                30,
            )?,
            session_revalidate_minutes: parse_number(
                "SESSION_REVALIDATE_MINUTES",
                get("SESSION_REVALIDATE_MINUTES"),
                30,
            )?,
            state_dir: get("STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./state")),
            policy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Pause between two cycles
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes.saturating_mul(60))
    }

    /// Settings of the booking site session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            login_url: self.login_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            logged_in_marker: self.logged_in_marker.clone(),
            validation_interval: Duration::from_secs(self.session_revalidate_minutes.saturating_mul(60)),
            request_timeout: Duration::from_secs(self.provider_timeout_secs),
            ..SessionConfig::default()
        }
    }

    /// Settings of the scan loop
    pub fn executor_config(&self) -> ScanExecutorConfig {
        ScanExecutorConfig {
            plan: WatchPlan {
                scope: self.watch.clone(),
                window: self.target_times.clone(),
                courts: self.courts.clone(),
            },
            recipients: self.recipients.clone(),
            booking_url: Some(self.booking_url.clone()),
            policy: self.policy,
            min_fetch_interval: Duration::from_secs(self.min_fetch_interval_secs),
        }
    }

    /// Settings of the SMTP relay, when its credentials are set
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        Some(SmtpSettings {
            server: self.smtp_server.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone()?,
            password: self.smtp_password.clone()?,
            from_email: self.from_email.clone()?,
        })
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            var,
            message: format!("'{}' is not a valid number", value),
        }),
        None => Ok(default),
    }
}

fn parse_time(var: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        var,
        message: format!("'{}' is not a HH:MM time", value.trim()),
    })
}

/// `TARGET_TIME_START`/`TARGET_TIME_END` give a window (a missing bound
/// defaults to the other one). Otherwise `TARGET_TIME` lists exact times.
fn parse_target_times(
    target_time: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<TargetTimes, ConfigError> {
    let bounds = match (start, end) {
        (Some(start), Some(end)) => Some((
            parse_time("TARGET_TIME_START", start)?,
            parse_time("TARGET_TIME_END", end)?,
        )),
        (Some(start), None) => {
            let start = parse_time("TARGET_TIME_START", start)?;
            Some((start, start))
        }
        (None, Some(end)) => {
            let end = parse_time("TARGET_TIME_END", end)?;
            Some((end, end))
        }
        (None, None) => None,
    };

    if let Some((start, end)) = bounds {
        let window = TimeWindow::new(start, end).ok_or(ConfigError::Invalid {
            var: "TARGET_TIME_END",
            message: "window ends before it starts".to_string(),
        })?;
        return Ok(window.into());
    }

    let times = target_time
        .unwrap_or("11:00")
        .split(',')
        .filter(|time| !time.trim().is_empty())
        .map(|time| parse_time("TARGET_TIME", time))
        .collect::<Result<BTreeSet<NaiveTime>, ConfigError>>()?;

    let first = times.first().copied();
    match (first, times.len()) {
        (None, _) => Err(ConfigError::Invalid {
            var: "TARGET_TIME",
            message: "no time given".to_string(),
        }),
        (Some(time), 1) => Ok(TimeWindow::single(time).into()),
        _ => Ok(TargetTimes::Exact(times)),
    }
}

fn parse_dates(value: &str) -> Result<Vec<NaiveDate>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|date| !date.is_empty())
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| ConfigError::Invalid {
                var: "WATCH_DATES",
                message: format!("'{}' is not a YYYY-MM-DD date", date),
            })
        })
        .collect()
}

fn parse_courts(value: Option<&str>) -> CourtScope {
    match value {
        None => CourtScope::Any,
        Some(value) if value.eq_ignore_ascii_case("any") => CourtScope::Any,
        Some(value) => {
            let courts: BTreeSet<String> = value
                .split(',')
                .map(|court| court.trim().to_string())
                .filter(|court| !court.is_empty())
                .collect();
            if courts.is_empty() {
                CourtScope::Any
            } else {
                CourtScope::Only(courts)
            }
        }
    }
}

/// Custom validation function for endpoint URLs; a `{date}` placeholder is allowed
fn validate_http_url(url: &str) -> Result<(), ValidationError> {
    let concrete = url.replace(DATE_PLACEHOLDER, "2026-01-01");
    let is_http = concrete.starts_with("http://") || concrete.starts_with("https://");

    if is_http && concrete.validate_url() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_url").with_message("URL must be a valid http:// or https:// address".into()))
    }
}

/// Custom validation function for the recipient list
fn validate_recipients(recipients: &[String]) -> Result<(), ValidationError> {
    if recipients.is_empty() {
        return Err(ValidationError::new("no_recipient")
            .with_message("NOTIFICATION_EMAIL needs at least one address".into()));
    }
    if recipients.iter().any(|recipient| !recipient.validate_email()) {
        return Err(ValidationError::new("invalid_recipient")
            .with_message("NOTIFICATION_EMAIL contains an invalid address".into()));
    }
    Ok(())
}

/// Custom validation function for the watched dates
fn validate_watch_scope(watch: &WatchScope) -> Result<(), ValidationError> {
    match watch {
        WatchScope::Horizon { days } if !(1..=MAX_LOOKAHEAD_DAYS).contains(days) => {
            Err(ValidationError::new("invalid_lookahead")
                .with_message(format!("LOOKAHEAD_DAYS must be between 1 and {}", MAX_LOOKAHEAD_DAYS).into()))
        }
        WatchScope::Dates(dates) if dates.is_empty() => Err(ValidationError::new("no_date")
            .with_message("WATCH_DATES needs at least one date".into())),
        _ => Ok(()),
    }
}

/// Email channels need a valid sender, SMTP also its credentials; dry runs need nothing
fn validate_notifier(config: &Config) -> Result<(), ValidationError> {
    if config.notifier == NotifierKind::Log {
        return Ok(());
    }

    if config.notifier == NotifierKind::Smtp
        && (config.smtp_username.is_none() || config.smtp_password.is_none())
    {
        return Err(ValidationError::new("missing_smtp_credentials")
            .with_message("SMTP_USERNAME and SMTP_PASSWORD are required when NOTIFIER=smtp".into()));
    }

    match &config.from_email {
        Some(from_email) if from_email.validate_email() => Ok(()),
        _ => Err(ValidationError::new("invalid_sender")
            .with_message("FROM_EMAIL must be a valid address for email notifiers".into())),
    }
}
