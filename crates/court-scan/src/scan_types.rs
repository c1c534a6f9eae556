use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive range of slot start times the user wants to play at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest acceptable slot start
    pub start: NaiveTime,
    /// Latest acceptable slot start
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Create a window, or `None` when `start` comes after `end`
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Window matching exactly one slot start time
    pub fn single(time: NaiveTime) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    /// Whether a slot starting at `time` falls inside the window
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Slot start times worth a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetTimes {
    /// Every start inside an inclusive window
    Window(TimeWindow),
    /// Only the listed start times
    Exact(BTreeSet<NaiveTime>),
}

impl TargetTimes {
    /// Whether a slot starting at `time` is wanted
    pub fn contains(&self, time: NaiveTime) -> bool {
        match self {
            TargetTimes::Window(window) => window.contains(time),
            TargetTimes::Exact(times) => times.contains(&time),
        }
    }
}

impl From<TimeWindow> for TargetTimes {
    fn from(window: TimeWindow) -> Self {
        TargetTimes::Window(window)
    }
}

impl fmt::Display for TargetTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetTimes::Window(window) if window.start == window.end => {
                write!(f, "{}", window.start.format("%H:%M"))
            }
            TargetTimes::Window(window) => write!(
                f,
                "{} to {}",
                window.start.format("%H:%M"),
                window.end.format("%H:%M")
            ),
            TargetTimes::Exact(times) => {
                let times: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                write!(f, "{}", times.join(", "))
            }
        }
    }
}

/// Courts the user is interested in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CourtScope {
    /// Every court of the club
    #[default]
    Any,
    /// Only the listed court identifiers
    Only(BTreeSet<String>),
}

impl CourtScope {
    /// Whether `court` is watched
    pub fn includes(&self, court: &str) -> bool {
        match self {
            CourtScope::Any => true,
            CourtScope::Only(courts) => courts.contains(court),
        }
    }
}

/// A calendar date being watched, with its time window and court scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDate {
    /// The watched date
    pub date: NaiveDate,
    /// Slot start times worth a notification
    pub window: TargetTimes,
    /// Courts worth a notification
    pub courts: CourtScope,
}

/// Which dates are watched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WatchScope {
    /// A fixed list of dates
    Dates(Vec<NaiveDate>),
    /// A rolling horizon starting today
    Horizon {
        /// Number of days watched, today included
        days: u32,
    },
}

/// Everything needed to derive the tracked dates of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPlan {
    /// Dates to watch
    pub scope: WatchScope,
    /// Target times applied to every date
    pub window: TargetTimes,
    /// Court scope applied to every date
    pub courts: CourtScope,
}

impl Default for WatchPlan {
    fn default() -> Self {
        Self {
            scope: WatchScope::Horizon { days: 7 },
            window: TimeWindow::single(NaiveTime::from_hms_opt(11, 0, 0).unwrap_or_default()).into(),
            courts: CourtScope::Any,
        }
    }
}

impl WatchPlan {
    /// Tracked dates for a cycle running on `today`, in ascending order.
    /// Dates already in the past are left out.
    pub fn tracked_dates(&self, today: NaiveDate) -> Vec<TrackedDate> {
        let dates: BTreeSet<NaiveDate> = match &self.scope {
            WatchScope::Dates(dates) => dates.iter().copied().filter(|d| *d >= today).collect(),
            WatchScope::Horizon { days } => (0..u64::from(*days))
                .filter_map(|offset| today.checked_add_days(Days::new(offset)))
                .collect(),
        };

        dates
            .into_iter()
            .map(|date| TrackedDate {
                date,
                window: self.window.clone(),
                courts: self.courts.clone(),
            })
            .collect()
    }
}

/// One (court, time) entry of a fetched planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotObservation {
    /// Court identifier, e.g. "Padel 2"
    pub court: String,
    /// Slot start time
    pub time: NaiveTime,
    /// Whether the slot can be booked right now
    pub available: bool,
}

/// Every slot status returned by one fetch for one date
#[derive(Debug, Clone)]
pub struct AvailabilitySnapshot {
    /// Date the planning describes
    pub date: NaiveDate,
    /// Observed slots
    pub slots: Vec<SlotObservation>,
    /// When the planning was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Last-known availability of one (court, date, time) slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtSlotStatus {
    /// Court identifier
    pub court: String,
    /// Slot date
    pub date: NaiveDate,
    /// Slot start time
    pub time: NaiveTime,
    /// Whether the slot was bookable when observed
    pub available: bool,
    /// When the status was observed
    pub observed_at: DateTime<Utc>,
}

/// A slot that just opened and matches the user's criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingSlot {
    /// Court identifier
    pub court: String,
    /// Slot start time
    pub time: NaiveTime,
    /// Stored status before this observation, if any
    pub previous: Option<CourtSlotStatus>,
}

/// Slots of one date that warrant an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// Date of every slot in the event
    pub date: NaiveDate,
    /// Qualifying slots, in snapshot order
    pub slots: Vec<QualifyingSlot>,
    /// When the openings were observed
    pub detected_at: DateTime<Utc>,
}

/// How often a date may be announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationPolicy {
    /// One email per date; later openings on a notified date stay silent
    #[default]
    OncePerDate,
    /// One email per opening, even on a date already notified
    EverySlot,
}

impl FromStr for NotificationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once_per_date" => Ok(NotificationPolicy::OncePerDate),
            "every_slot" => Ok(NotificationPolicy::EverySlot),
            other => Err(format!(
                "unknown notification policy '{}', expected once_per_date or every_slot",
                other
            )),
        }
    }
}

/// Failure to obtain a planning from the booking provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Request could not be sent or the response could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Login rejected or session expired
    #[error("Authentication failed with booking provider")]
    AuthenticationFailed,

    /// Rate limited by the booking provider
    #[error("Rate limited by booking provider")]
    RateLimited,

    /// Unexpected HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Planning markup could not be understood
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Client misconfiguration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failure to deliver a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Email transport error
    #[error("Email error: {0}")]
    Email(String),

    /// Recipient rejected before sending
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Failure to write the state documents
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Encoding error
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
