//! Headless driver-side core for a dispatch platform.
//!
//! All state lives in [`model::Model`] and is written only by
//! [`DriverApp::update`]; side effects (HTTP, timers, render signals)
//! are capability requests resolved by the embedding shell, whose
//! completions re-enter `update` as events.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod capabilities;
pub mod event;
pub mod model;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::DriverApp;
pub use capabilities::{Capabilities, Effect, Timer, TimerOperation, TimerOutput};
pub use event::{Axis, Event, TransportResult};
pub use model::{
    clamp_axis, manhattan, normalize_axis, DriverPresence, GridPos, Model, Notice, NoticeKind,
    PresenceStatus, Ride, RideId, RideStatus,
};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/";
pub const HEARTBEAT_INTERVAL_MS: u64 = 3_000;
pub const GRID_MIN: u8 = 0;
pub const GRID_MAX: u8 = 99;
pub const DEFAULT_LOCATION: (u8, u8) = (50, 50);

const PRESENCE_PATH: &str = "drivers/me/presence";

/// Wall-clock milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyTerminal,
    Conflict,
    Transport,
}

impl ErrorKind {
    /// Maps a non-success HTTP status onto the error taxonomy.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            _ => Self::Conflict,
        }
    }

    /// How a failure of this kind is presented to the operator.
    /// `AlreadyTerminal` is a business outcome, not a fault.
    #[must_use]
    pub const fn notice_kind(self) -> NoticeKind {
        match self {
            Self::AlreadyTerminal => NoticeKind::Info,
            Self::Validation | Self::NotFound | Self::Conflict | Self::Transport => {
                NoticeKind::Error
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    /// Diagnostic detail, logged but never shown to the operator.
    pub context: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn to_notice(&self) -> Notice {
        Notice {
            message: self.message.clone(),
            kind: self.kind.notice_kind(),
        }
    }
}

/// Joins the configured API base with an endpoint path. The transport
/// only accepts absolute URLs.
pub(crate) fn join_api(base: &str, path: &str) -> Result<url::Url, AppError> {
    let root = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let parsed = url::Url::parse(&root).map_err(|err| {
        AppError::new(ErrorKind::Validation, "Invalid dispatch address")
            .with_context(err.to_string())
    })?;
    parsed.join(path.trim_start_matches('/')).map_err(|err| {
        AppError::new(ErrorKind::Validation, "Invalid request path").with_context(err.to_string())
    })
}

// ---------------------------------------------------------------------------
// View model

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub presence_status: PresenceStatus,
    pub location: GridPos,
    pub last_reported_at: Option<u64>,
    pub heartbeat_running: bool,

    pub claim_input: String,
    pub claim_in_flight: bool,
    pub can_claim: bool,

    pub ride: Option<RideView>,
    pub transition_in_flight: bool,

    pub notice: Option<NoticeView>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RideView {
    pub ride_id: String,
    pub status: String,
    pub pickup: GridPos,
    pub destination: GridPos,
    pub price: Option<f64>,
    pub distance: u32,
    /// Label for the single legal next step, `None` once terminal.
    pub next_action: Option<String>,
}

impl From<&Ride> for RideView {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.ride_id.to_string(),
            status: ride.status.label().to_string(),
            pickup: ride.pickup,
            destination: ride.destination,
            price: ride.display_price(),
            distance: manhattan(ride.pickup, ride.destination),
            next_action: ride
                .status
                .next_action()
                .map(|(_, label)| label.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeView {
    pub message: String,
    pub kind: NoticeKind,
}

impl From<&Notice> for NoticeView {
    fn from(notice: &Notice) -> Self {
        Self {
            message: notice.message.clone(),
            kind: notice.kind,
        }
    }
}

// ---------------------------------------------------------------------------
// App

pub mod app {
    use tracing::{info, warn};
    use uuid::Uuid;

    use crate::capabilities::{Capabilities, TimerOutput};
    use crate::event::{Axis, Event, TransportResult};
    use crate::model::{
        DriverPresence, Model, Notice, PresenceReport, PresenceStatus, Ride, RideId, RideStatus,
        TransitionRequest,
    };
    use crate::{
        current_time_ms, join_api, normalize_axis, AppError, ErrorKind, ViewModel,
        HEARTBEAT_INTERVAL_MS,
    };

    #[derive(Default)]
    pub struct DriverApp;

    impl crux_core::App for DriverApp {
        type Event = Event;
        type Model = Model;
        type ViewModel = ViewModel;
        type Capabilities = Capabilities;

        fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
            match event {
                Event::SessionStarted { api_base } => {
                    match url::Url::parse(&api_base) {
                        Ok(parsed) if !parsed.cannot_be_a_base() => {
                            info!(api_base = %api_base, "session configured");
                            model.api_base = api_base;
                        }
                        _ => {
                            warn!(api_base = %api_base, "rejected API base override");
                            model.show_notice(Notice::error(
                                "Invalid dispatch address, keeping the previous one",
                            ));
                        }
                    }
                    caps.render.render();
                }

                Event::NoticeDismissed => {
                    model.active_notice = None;
                    caps.render.render();
                }

                Event::WentOnline => {
                    if model.heartbeat_running {
                        return;
                    }
                    model.presence_epoch += 1;
                    model.heartbeat_running = true;
                    let epoch = model.presence_epoch;
                    info!(epoch, "going online");
                    Self::send_presence_report(model, caps, epoch);
                    caps.timer.notify_after(epoch, HEARTBEAT_INTERVAL_MS, Event::Timer);
                    caps.render.render();
                }

                Event::WentOffline => {
                    if !model.heartbeat_running {
                        return;
                    }
                    let armed = model.presence_epoch;
                    model.presence_epoch += 1;
                    model.heartbeat_running = false;
                    let location = model.presence.location;
                    model.presence = DriverPresence {
                        location,
                        ..DriverPresence::default()
                    };
                    // Logout also drops the ride; a completion still in
                    // flight will no longer find it and is discarded.
                    model.active_ride = None;
                    model.claim_input.clear();
                    info!(epoch = armed, "going offline");
                    caps.timer.clear(armed);
                    caps.render.render();
                }

                Event::LocationEdited { axis, raw } => {
                    // Only the payload source changes; the running
                    // heartbeat picks the new value up on its next tick.
                    let value = normalize_axis(&raw);
                    match axis {
                        Axis::X => model.presence.location.x = value,
                        Axis::Y => model.presence.location.y = value,
                    }
                    caps.render.render();
                }

                Event::Timer(TimerOutput::Elapsed { id }) => {
                    if !model.heartbeat_running || id != model.presence_epoch {
                        return;
                    }
                    Self::send_presence_report(model, caps, id);
                    caps.timer.notify_after(id, HEARTBEAT_INTERVAL_MS, Event::Timer);
                }

                Event::Timer(TimerOutput::Cleared { .. }) => {}

                Event::PresenceReported { epoch, result } => {
                    // A stale epoch means the driver toggled presence
                    // while this report was in flight.
                    if !model.heartbeat_running || epoch != model.presence_epoch {
                        return;
                    }
                    let acked =
                        matches!(&*result, Ok(response) if response.status().is_success());
                    if acked {
                        model.presence.status = PresenceStatus::Online;
                        model.presence.last_reported_at = Some(current_time_ms());
                    } else {
                        warn!(epoch, "presence report failed");
                        model.presence.status = PresenceStatus::Error;
                    }
                    caps.render.render();
                }

                Event::ClaimInputChanged { raw } => {
                    model.claim_input = raw;
                    caps.render.render();
                }

                Event::ClaimRequested => {
                    let trimmed = model.claim_input.trim();
                    if trimmed.is_empty() || model.claim_in_flight || model.active_ride.is_some()
                    {
                        return;
                    }
                    let ride_id = RideId::new(trimmed);
                    match join_api(
                        &model.api_base,
                        &format!("rides/{}/accept", ride_id.as_str()),
                    ) {
                        Ok(url) => {
                            model.claim_in_flight = true;
                            info!(ride_id = %ride_id, "requesting ride claim");
                            let key = Uuid::new_v4().to_string();
                            caps.http
                                .post(url.as_str())
                                .header("Idempotency-Key", key.as_str())
                                .send(move |result| Event::ClaimCompleted {
                                    ride_id: ride_id.clone(),
                                    result: Box::new(result),
                                });
                        }
                        Err(err) => {
                            warn!(error = %err, "claim request not sent");
                            model.show_notice(err.to_notice());
                        }
                    }
                    caps.render.render();
                }

                Event::ClaimCompleted { ride_id, result } => {
                    if !model.claim_in_flight {
                        return;
                    }
                    model.claim_in_flight = false;
                    match Self::classify_claim(*result) {
                        Ok(ride) => {
                            info!(ride_id = %ride.ride_id, status = ?ride.status, "ride claimed");
                            model.claim_input.clear();
                            model.show_notice(Notice::success(format!(
                                "Ride {} accepted",
                                ride.ride_id
                            )));
                            model.active_ride = Some(ride);
                        }
                        Err(err) => {
                            warn!(
                                ride_id = %ride_id,
                                kind = ?err.kind,
                                context = ?err.context,
                                "claim failed"
                            );
                            if err.kind == ErrorKind::AlreadyTerminal {
                                model.claim_input.clear();
                            }
                            model.show_notice(err.to_notice());
                        }
                    }
                    caps.render.render();
                }

                Event::AdvanceRequested => {
                    if model.transition_in_flight {
                        return;
                    }
                    let Some((ride_id, next)) = model.active_ride.as_ref().and_then(|ride| {
                        ride.status
                            .successor()
                            .map(|next| (ride.ride_id.clone(), next))
                    }) else {
                        return;
                    };
                    match join_api(
                        &model.api_base,
                        &format!("rides/{}/status", ride_id.as_str()),
                    ) {
                        Ok(url) => {
                            model.transition_in_flight = true;
                            info!(ride_id = %ride_id, requested = ?next, "requesting transition");
                            let key = Uuid::new_v4().to_string();
                            let request = caps
                                .http
                                .put(url.as_str())
                                .header("Idempotency-Key", key.as_str())
                                .body_json(&TransitionRequest { status: next });
                            match request {
                                Ok(request) => {
                                    request.send(move |result| Event::TransitionCompleted {
                                        ride_id: ride_id.clone(),
                                        requested: next,
                                        result: Box::new(result),
                                    });
                                }
                                Err(err) => {
                                    warn!(error = %err, "could not encode transition request");
                                    model.transition_in_flight = false;
                                    model.show_notice(Notice::error(
                                        "Could not reach dispatch, try again",
                                    ));
                                }
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "transition request not sent");
                            model.show_notice(err.to_notice());
                        }
                    }
                    caps.render.render();
                }

                Event::TransitionCompleted {
                    ride_id,
                    requested,
                    result,
                } => {
                    if !model.transition_in_flight {
                        return;
                    }
                    model.transition_in_flight = false;
                    let held = model
                        .active_ride
                        .as_ref()
                        .is_some_and(|ride| ride.ride_id == ride_id);
                    if !held {
                        warn!(ride_id = %ride_id, "discarding result for a ride no longer held");
                        caps.render.render();
                        return;
                    }
                    match Self::classify_transition(*result) {
                        Ok(ride) => {
                            if ride.status != requested {
                                warn!(
                                    requested = ?requested,
                                    returned = ?ride.status,
                                    "dispatch returned a different status than requested"
                                );
                            }
                            if ride.status.is_terminal() {
                                info!(
                                    ride_id = %ride.ride_id,
                                    status = ?ride.status,
                                    "ride reached a terminal status"
                                );
                                let notice = Self::terminal_notice(&ride);
                                model.active_ride = None;
                                model.claim_input.clear();
                                model.show_notice(notice);
                            } else {
                                info!(ride_id = %ride.ride_id, status = ?ride.status, "ride advanced");
                                model.active_ride = Some(ride);
                            }
                        }
                        Err(err) => {
                            warn!(
                                ride_id = %ride_id,
                                kind = ?err.kind,
                                context = ?err.context,
                                "transition failed"
                            );
                            model.show_notice(err.to_notice());
                        }
                    }
                    caps.render.render();
                }
            }
        }

        fn view(&self, model: &Model) -> ViewModel {
            ViewModel {
                presence_status: model.presence.status,
                location: model.presence.location,
                last_reported_at: model.presence.last_reported_at,
                heartbeat_running: model.heartbeat_running,
                claim_input: model.claim_input.clone(),
                claim_in_flight: model.claim_in_flight,
                can_claim: !model.claim_in_flight
                    && model.active_ride.is_none()
                    && !model.claim_input.trim().is_empty(),
                ride: model.active_ride.as_ref().map(crate::RideView::from),
                transition_in_flight: model.transition_in_flight,
                notice: model.active_notice.as_ref().map(crate::NoticeView::from),
            }
        }
    }

    impl DriverApp {
        /// Issues one presence report stamped with `epoch` so the
        /// completion can be recognized as current or stale.
        fn send_presence_report(model: &Model, caps: &Capabilities, epoch: u64) {
            let report = PresenceReport {
                status: PresenceStatus::Online,
                location: model.presence.location,
            };
            let url = match join_api(&model.api_base, crate::PRESENCE_PATH) {
                Ok(url) => url,
                Err(err) => {
                    warn!(error = %err, "presence report not sent");
                    return;
                }
            };
            match caps.http.put(url.as_str()).body_json(&report) {
                Ok(request) => {
                    request.send(move |result| Event::PresenceReported {
                        epoch,
                        result: Box::new(result),
                    });
                }
                Err(err) => warn!(error = %err, "could not encode presence report"),
            }
        }

        fn classify_claim(result: TransportResult) -> Result<Ride, AppError> {
            let mut response = result.map_err(|err| {
                AppError::new(ErrorKind::Conflict, "Could not reach dispatch, try again")
                    .with_context(err.to_string())
            })?;
            let status = u16::from(response.status());
            if !response.status().is_success() {
                let kind = ErrorKind::from_status(status);
                let message = match kind {
                    ErrorKind::NotFound => "Ride was not found",
                    _ => "Ride was already taken",
                };
                return Err(AppError::new(kind, message).with_context(format!("status {status}")));
            }
            let body = response.take_body().unwrap_or_default();
            let ride = Ride::decode(&body).map_err(|err| {
                AppError::new(ErrorKind::Transport, "Could not read the dispatch response")
                    .with_context(err.to_string())
            })?;
            if ride.status.is_terminal() {
                return Err(AppError::new(
                    ErrorKind::AlreadyTerminal,
                    "Ride has already finished",
                ));
            }
            Ok(ride)
        }

        fn classify_transition(result: TransportResult) -> Result<Ride, AppError> {
            let mut response = result.map_err(|err| {
                AppError::new(ErrorKind::Transport, "Could not reach dispatch, try again")
                    .with_context(err.to_string())
            })?;
            let status = u16::from(response.status());
            if !response.status().is_success() {
                return Err(AppError::new(
                    ErrorKind::from_status(status),
                    "Status change was rejected by dispatch",
                )
                .with_context(format!("status {status}")));
            }
            let body = response.take_body().unwrap_or_default();
            Ride::decode(&body).map_err(|err| {
                AppError::new(ErrorKind::Transport, "Could not read the dispatch response")
                    .with_context(err.to_string())
            })
        }

        fn terminal_notice(ride: &Ride) -> Notice {
            match ride.status {
                RideStatus::Cancelled => Notice::info("Ride was cancelled by dispatch"),
                _ => match ride.display_price() {
                    Some(price) => Notice::success(format!("Ride completed. Price: {price:.2}")),
                    None => Notice::success("Ride completed"),
                },
            }
        }
    }
}
