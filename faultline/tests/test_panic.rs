#![cfg(feature = "panic")]

use faultline_core::test::with_captured_events_options;
use faultline::integrations::panic::PanicIntegration;
use faultline::protocol::Level;
use faultline::ClientOptions;

#[test]
fn test_panic_is_captured_as_unhandled_fatal_event() {
    let options = ClientOptions {
        default_integrations: false,
        ..Default::default()
    }
    .add_integration(PanicIntegration::new());

    let events = with_captured_events_options(
        || {
            let result = std::panic::catch_unwind(|| {
                panic!("everything is on fire");
            });
            assert!(result.is_err());
        },
        options,
    );

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, Level::Fatal);

    let exception = &event.exception[0];
    assert_eq!(exception.ty, "panic");
    assert_eq!(exception.value.as_deref(), Some("everything is on fire"));

    let mechanism = exception.mechanism.as_ref().unwrap();
    assert_eq!(mechanism.handled, Some(false));

    // a second client setup must not install the hook again
    let _ = with_captured_events_options(|| {}, {
        ClientOptions {
            default_integrations: false,
            ..Default::default()
        }
        .add_integration(PanicIntegration::new())
    });
}
