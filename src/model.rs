use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_API_BASE, DEFAULT_LOCATION, GRID_MAX, GRID_MIN};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RideId(String);

impl RideId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integer position on the dispatch grid, always within bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPos {
    pub x: u8,
    pub y: u8,
}

/// Coerces free-text axis input to an in-bounds value.
///
/// Takes the longest leading integer (optional sign, decimal digits);
/// anything unparseable becomes 0, and the result is clamped to the
/// grid. Total: every input maps to a valid axis value.
#[must_use]
pub fn normalize_axis(raw: &str) -> u8 {
    let s = raw.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let prefix = digits
        .find(|c: char| !c.is_ascii_digit())
        .map_or(digits, |end| &digits[..end]);
    if prefix.is_empty() {
        return GRID_MIN;
    }
    // A pure digit string only fails to parse on overflow, which
    // clamps to the top of the grid anyway.
    let magnitude = prefix.parse::<i64>().unwrap_or(i64::MAX);
    clamp_axis(if negative { -magnitude } else { magnitude })
}

#[must_use]
pub fn clamp_axis(value: i64) -> u8 {
    value.clamp(i64::from(GRID_MIN), i64::from(GRID_MAX)) as u8
}

/// Display-only distance estimate between two grid positions.
#[must_use]
pub fn manhattan(a: GridPos, b: GridPos) -> u32 {
    let dx = i32::from(a.x) - i32::from(b.x);
    let dy = i32::from(a.y) - i32::from(b.y);
    dx.unsigned_abs() + dy.unsigned_abs()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Offline,
    Online,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverPresence {
    pub status: PresenceStatus,
    pub location: GridPos,
    /// Wall-clock ms of the last acknowledged report.
    pub last_reported_at: Option<u64>,
}

impl Default for DriverPresence {
    fn default() -> Self {
        Self {
            status: PresenceStatus::Offline,
            location: GridPos {
                x: DEFAULT_LOCATION.0,
                y: DEFAULT_LOCATION.1,
            },
            last_reported_at: None,
        }
    }
}

/// Wire body of a presence report.
#[derive(Serialize)]
pub(crate) struct PresenceReport {
    pub status: PresenceStatus,
    pub location: GridPos,
}

/// Wire body of a status transition request.
#[derive(Serialize)]
pub(crate) struct TransitionRequest {
    pub status: RideStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    DriverAssigned,
    DriverArrived,
    PassengerOnboard,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Transition table: current status to the single legal next step
    /// and the action label offered for it. Statuses outside the
    /// driver-side sequence have no legal transition.
    #[must_use]
    pub fn next_action(self) -> Option<(Self, &'static str)> {
        match self {
            Self::DriverAssigned => Some((Self::DriverArrived, "Arrived at pickup")),
            Self::DriverArrived => Some((Self::PassengerOnboard, "Passenger on board")),
            Self::PassengerOnboard => Some((Self::InProgress, "Start ride")),
            Self::InProgress => Some((Self::Completed, "Complete ride")),
            Self::Pending | Self::Completed | Self::Cancelled => None,
        }
    }

    #[must_use]
    pub fn successor(self) -> Option<Self> {
        self.next_action().map(|(next, _)| next)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::DriverAssigned => "Driver assigned",
            Self::DriverArrived => "Driver arrived",
            Self::PassengerOnboard => "Passenger on board",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Driver-local projection of the dispatch service's ride record.
/// Replaced wholesale from each authoritative response, never
/// advanced locally.
#[derive(Clone, Debug, PartialEq)]
pub struct Ride {
    pub ride_id: RideId,
    pub status: RideStatus,
    pub pickup: GridPos,
    pub destination: GridPos,
    pub price: Option<f64>,
    pub estimated_price: Option<f64>,
}

#[derive(Deserialize)]
struct RideWire {
    ride_id: String,
    status: RideStatus,
    start_x: i64,
    start_y: i64,
    end_x: i64,
    end_y: i64,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    estimated_price: Option<f64>,
}

impl Ride {
    /// Decodes a ride record from a response body. Coordinates are
    /// clamped into the grid; unknown fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let wire: RideWire = serde_json::from_slice(bytes)?;
        Ok(Self {
            ride_id: RideId::new(wire.ride_id),
            status: wire.status,
            pickup: GridPos {
                x: clamp_axis(wire.start_x),
                y: clamp_axis(wire.start_y),
            },
            destination: GridPos {
                x: clamp_axis(wire.end_x),
                y: clamp_axis(wire.end_y),
            },
            price: wire.price,
            estimated_price: wire.estimated_price,
        })
    }

    /// Final price when settled, otherwise the provisional estimate.
    #[must_use]
    pub fn display_price(&self) -> Option<f64> {
        self.price.or(self.estimated_price)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// One-shot operator notification, replaced by each new outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

impl Notice {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Info,
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Success,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Error,
        }
    }
}

pub struct Model {
    pub api_base: String,

    // Presence record: written only by heartbeat handling.
    pub presence: DriverPresence,
    pub heartbeat_running: bool,
    /// Bumped on every online/offline toggle; timer ticks and report
    /// completions stamped with an older value are discarded.
    pub presence_epoch: u64,

    // Ride record: written only by claim/transition handling.
    pub claim_input: String,
    pub claim_in_flight: bool,
    pub active_ride: Option<Ride>,
    pub transition_in_flight: bool,

    pub active_notice: Option<Notice>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            presence: DriverPresence::default(),
            heartbeat_running: false,
            presence_epoch: 0,
            claim_input: String::new(),
            claim_in_flight: false,
            active_ride: None,
            transition_in_flight: false,
            active_notice: None,
        }
    }
}

impl Model {
    pub fn show_notice(&mut self, notice: Notice) {
        self.active_notice = Some(notice);
    }
}
