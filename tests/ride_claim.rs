use crux_core::testing::AppTester;
use crux_http::testing::ResponseBuilder;
use crux_http::Error as HttpError;
use driver_core::{
    DriverApp, Effect, Event, Model, NoticeKind, RideId, RideStatus, TransportResult,
};

fn http_operations(effects: &[Effect]) -> Vec<&crux_http::protocol::HttpRequest> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Http(request) => Some(&request.operation),
            _ => None,
        })
        .collect()
}

fn ride_body(id: &str, status: &str) -> Vec<u8> {
    serde_json::json!({
        "ride_id": id,
        "status": status,
        "start_x": 10, "start_y": 20,
        "end_x": 30, "end_y": 40,
        "estimated_price": 12.5
    })
    .to_string()
    .into_bytes()
}

fn ok_ride(id: &str, status: &str) -> Box<TransportResult> {
    Box::new(Ok(ResponseBuilder::ok().body(ride_body(id, status)).build()))
}

fn error_status(status: u16) -> Box<TransportResult> {
    Box::new(Ok(
        ResponseBuilder::<Vec<u8>>::with_status(status.try_into().unwrap()).build(),
    ))
}

/// Drives the app to the point where a claim for "R1" is in flight.
fn pending_claim(app: &AppTester<DriverApp, Effect>) -> Model {
    let mut model = Model::default();
    app.update(
        Event::ClaimInputChanged {
            raw: "R1".to_string(),
        },
        &mut model,
    );
    app.update(Event::ClaimRequested, &mut model);
    assert!(model.claim_in_flight);
    model
}

#[test]
fn blank_input_is_a_noop() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = Model::default();

    let update = app.update(Event::ClaimRequested, &mut model);
    assert!(update.effects.is_empty());

    app.update(
        Event::ClaimInputChanged {
            raw: "   ".to_string(),
        },
        &mut model,
    );
    let update = app.update(Event::ClaimRequested, &mut model);
    assert!(update.effects.is_empty());
    assert!(!model.claim_in_flight);
}

#[test]
fn claim_posts_to_the_accept_endpoint_with_an_idempotency_key() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = Model::default();
    app.update(
        Event::ClaimInputChanged {
            raw: "  R1  ".to_string(),
        },
        &mut model,
    );

    let update = app.update(Event::ClaimRequested, &mut model);

    let requests = http_operations(&update.effects);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url, "http://localhost:8000/rides/R1/accept");
    let key = requests[0]
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("idempotency-key"))
        .expect("claim must carry an idempotency key");
    assert!(!key.value.is_empty());
    assert!(model.claim_in_flight);
}

#[test]
fn a_second_claim_while_one_is_pending_is_ignored() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    let update = app.update(Event::ClaimRequested, &mut model);
    assert!(update.effects.is_empty());
}

#[test]
fn successful_claim_takes_ownership_and_clears_the_input() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: ok_ride("R1", "driver_assigned"),
        },
        &mut model,
    );

    let ride = model.active_ride.as_ref().expect("ride should be owned");
    assert_eq!(ride.ride_id, RideId::new("R1"));
    assert_eq!(ride.status, RideStatus::DriverAssigned);
    assert!(model.claim_input.is_empty());
    assert!(!model.claim_in_flight);
    let notice = model.active_notice.as_ref().expect("outcome notice");
    assert_eq!(notice.kind, NoticeKind::Success);
}

#[test]
fn claiming_a_finished_ride_is_an_info_outcome_without_ownership() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: ok_ride("R1", "completed"),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    assert!(model.claim_input.is_empty(), "terminal outcome clears input");
    let notice = model.active_notice.as_ref().expect("outcome notice");
    assert_eq!(notice.kind, NoticeKind::Info);
    assert_eq!(notice.message, "Ride has already finished");
}

#[test]
fn cancelled_counts_as_finished_too() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: ok_ride("R1", "cancelled"),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    assert_eq!(
        model.active_notice.as_ref().map(|n| n.kind),
        Some(NoticeKind::Info)
    );
}

#[test]
fn unknown_ride_keeps_the_input_for_correction() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: error_status(404),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    assert_eq!(model.claim_input, "R1", "input is kept for correction");
    let notice = model.active_notice.as_ref().expect("outcome notice");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.message, "Ride was not found");
}

#[test]
fn contested_ride_keeps_the_input() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: error_status(409),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    assert_eq!(model.claim_input, "R1");
    let notice = model.active_notice.as_ref().expect("outcome notice");
    assert_eq!(notice.message, "Ride was already taken");
}

#[test]
fn transport_failure_surfaces_as_an_error_notice() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: Box::new(Err(HttpError::Io("connection refused".to_string()))),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    assert_eq!(model.claim_input, "R1");
    assert_eq!(
        model.active_notice.as_ref().map(|n| n.kind),
        Some(NoticeKind::Error)
    );
}

#[test]
fn unreadable_success_body_surfaces_as_an_error_notice() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);

    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: Box::new(Ok(ResponseBuilder::ok().body(b"not json".to_vec()).build())),
        },
        &mut model,
    );

    assert!(model.active_ride.is_none());
    let notice = model.active_notice.as_ref().expect("outcome notice");
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.message, "Could not read the dispatch response");
}

#[test]
fn claiming_while_a_ride_is_held_is_ignored() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);
    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: ok_ride("R1", "driver_assigned"),
        },
        &mut model,
    );

    app.update(
        Event::ClaimInputChanged {
            raw: "R2".to_string(),
        },
        &mut model,
    );
    let update = app.update(Event::ClaimRequested, &mut model);
    assert!(http_operations(&update.effects).is_empty());
    assert!(!model.claim_in_flight);
}

#[test]
fn dismissing_a_notice_removes_it() {
    let app = AppTester::<DriverApp, Effect>::default();
    let mut model = pending_claim(&app);
    app.update(
        Event::ClaimCompleted {
            ride_id: RideId::new("R1"),
            result: error_status(404),
        },
        &mut model,
    );
    assert!(model.active_notice.is_some());

    let update = app.update(Event::NoticeDismissed, &mut model);
    assert!(model.active_notice.is_none());
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));
}
