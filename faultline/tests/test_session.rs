use faultline_core::test::with_captured_envelopes_options;
use faultline::protocol::{
    EnvelopeItemType, Level, SessionStatus, SessionUpdate,
};
use faultline::ClientOptions;

fn session_items(envelopes: &[faultline::Envelope]) -> Vec<SessionUpdate<'static>> {
    envelopes
        .iter()
        .flat_map(|envelope| envelope.items())
        .filter(|item| *item.ty() == EnvelopeItemType::Session)
        .map(|item| serde_json::from_slice(item.payload()).unwrap())
        .collect()
}

fn options() -> ClientOptions {
    ClientOptions {
        release: Some("some-release@1.0.0".into()),
        ..Default::default()
    }
}

#[test]
fn test_session_rides_along_with_error_events() {
    let envelopes = with_captured_envelopes_options(
        || {
            faultline::start_session();
            faultline::capture_message("some error", Level::Error);
            faultline::end_session();
        },
        options(),
    );
    assert_eq!(envelopes.len(), 2);

    let items = session_items(&envelopes);
    assert_eq!(items.len(), 2);

    // the update travelling with the event is the initial transmission and
    // already counts the error
    assert!(items[0].init);
    assert_eq!(items[0].status, SessionStatus::Ok);
    assert_eq!(items[0].errors, 1);

    // ending the session flushes the terminal update
    assert!(!items[1].init);
    assert_eq!(items[1].status, SessionStatus::Exited);
    assert_eq!(items[1].errors, 1);
    assert!(items[1].duration.unwrap() >= 0.0);
}

#[test]
fn test_quiet_session_sends_single_exited_update() {
    let envelopes = with_captured_envelopes_options(
        || {
            faultline::start_session();
            faultline::end_session();
        },
        options(),
    );
    assert_eq!(envelopes.len(), 1);

    let items = session_items(&envelopes);
    assert_eq!(items.len(), 1);
    assert!(items[0].init);
    assert_eq!(items[0].status, SessionStatus::Exited);
    assert_eq!(items[0].errors, 0);
}

#[test]
fn test_session_without_release_is_not_started() {
    let envelopes = with_captured_envelopes_options(
        || {
            faultline::start_session();
            faultline::end_session();
        },
        ClientOptions::default(),
    );
    assert!(session_items(&envelopes).is_empty());
}

#[test]
fn test_session_crashes_on_unhandled_exception_event() {
    use faultline::protocol::{Event, Exception, Mechanism};

    let envelopes = with_captured_envelopes_options(
        || {
            faultline::start_session();
            faultline::capture_event(Event {
                exception: vec![Exception {
                    ty: "panic".into(),
                    mechanism: Some(Mechanism {
                        ty: "panic".into(),
                        handled: Some(false),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]
                .into(),
                level: Level::Fatal,
                ..Default::default()
            });
            faultline::end_session();
        },
        options(),
    );

    let items = session_items(&envelopes);
    assert_eq!(items[0].status, SessionStatus::Crashed);
    assert_eq!(items[0].errors, 1);
}
