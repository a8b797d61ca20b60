use serde::{Deserialize, Serialize};

use crate::capabilities::TimerOutput;
use crate::model::{RideId, RideStatus};

/// Axis selector for coordinate edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// Raw completion of an HTTP request, as delivered by the shell.
pub type TransportResult = crux_http::Result<crux_http::Response<Vec<u8>>>;

// Response-carrying variants are runtime-only and boxed to keep the
// enum small; serde skips them since the shell never sends them
// across the boundary.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Session
    SessionStarted {
        api_base: String,
    },
    NoticeDismissed,

    // Presence
    WentOnline,
    WentOffline,
    LocationEdited {
        axis: Axis,
        raw: String,
    },
    Timer(TimerOutput),
    #[serde(skip)]
    PresenceReported {
        epoch: u64,
        result: Box<TransportResult>,
    },

    // Ride claim
    ClaimInputChanged {
        raw: String,
    },
    ClaimRequested,
    #[serde(skip)]
    ClaimCompleted {
        ride_id: RideId,
        result: Box<TransportResult>,
    },

    // Ride lifecycle
    AdvanceRequested,
    #[serde(skip)]
    TransitionCompleted {
        ride_id: RideId,
        requested: RideStatus,
        result: Box<TransportResult>,
    },
}
