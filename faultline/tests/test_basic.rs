use faultline_core::test::{with_captured_events, with_captured_events_options};
use faultline::protocol::{Breadcrumb, Level};
use faultline::{ClientOptions, Hub};

#[test]
fn test_capture_message_with_scope_data() {
    let events = with_captured_events(|| {
        faultline::configure_scope(|scope| {
            scope.set_tag("worker", "worker1");
            scope.set_extra("extra", "extra".into());
        });
        faultline::capture_message("Hello World!", Level::Warning);
    });

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.message.as_deref(), Some("Hello World!"));
    assert_eq!(event.level, Level::Warning);
    assert_eq!(event.tags.get("worker").unwrap(), "worker1");
    assert_eq!(event.extra.get("extra").unwrap(), "extra");
}

#[test]
fn test_with_scope_restores_previous_tags() {
    let events = with_captured_events(|| {
        faultline::configure_scope(|scope| {
            scope.set_tag("region", "eu");
        });

        faultline::with_scope(
            |scope| scope.set_tag("region", "us"),
            || faultline::capture_message("inside", Level::Info),
        );

        faultline::capture_message("outside", Level::Info);
    });

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].tags.get("region").unwrap(), "us");
    assert_eq!(events[1].tags.get("region").unwrap(), "eu");
}

#[test]
fn test_pop_scope_on_root_is_refused() {
    let events = with_captured_events(|| {
        let hub = Hub::current();
        // popping without a matching push must not remove the root layer
        hub.pop_scope();
        hub.pop_scope();

        faultline::configure_scope(|scope| scope.set_tag("still", "here"));
        faultline::capture_message("after pops", Level::Info);
    });

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags.get("still").unwrap(), "here");
}

#[test]
fn test_explicit_push_and_pop() {
    let events = with_captured_events(|| {
        let hub = Hub::current();
        faultline::configure_scope(|scope| scope.set_tag("depth", "root"));

        let guard = hub.push_scope();
        faultline::configure_scope(|scope| scope.set_tag("depth", "nested"));
        faultline::capture_message("nested", Level::Info);
        drop(guard);

        faultline::capture_message("root", Level::Info);
    });

    assert_eq!(events[0].tags.get("depth").unwrap(), "nested");
    assert_eq!(events[1].tags.get("depth").unwrap(), "root");
}

#[test]
fn test_breadcrumb_ring_buffer_evicts_oldest() {
    let options = ClientOptions {
        max_breadcrumbs: 3,
        ..Default::default()
    };
    let events = with_captured_events_options(
        || {
            for i in 0..5 {
                faultline::add_breadcrumb(Breadcrumb {
                    message: Some(format!("crumb {i}")),
                    ..Default::default()
                });
            }
            faultline::capture_message("done", Level::Info);
        },
        options,
    );

    assert_eq!(events.len(), 1);
    let messages: Vec<_> = events[0]
        .breadcrumbs
        .iter()
        .map(|crumb| crumb.message.as_deref().unwrap().to_owned())
        .collect();
    assert_eq!(messages, vec!["crumb 2", "crumb 3", "crumb 4"]);
}

#[test]
fn test_before_breadcrumb_can_drop() {
    let options = ClientOptions {
        before_breadcrumb: Some(std::sync::Arc::new(|crumb: Breadcrumb| {
            if crumb.message.as_deref() == Some("noisy") {
                None
            } else {
                Some(crumb)
            }
        })),
        ..Default::default()
    };
    let events = with_captured_events_options(
        || {
            faultline::add_breadcrumb(Breadcrumb {
                message: Some("noisy".into()),
                ..Default::default()
            });
            faultline::add_breadcrumb(Breadcrumb {
                message: Some("useful".into()),
                ..Default::default()
            });
            faultline::capture_message("done", Level::Info);
        },
        options,
    );

    assert_eq!(events[0].breadcrumbs.len(), 1);
    assert_eq!(events[0].breadcrumbs[0].message.as_deref(), Some("useful"));
}

#[test]
fn test_before_send_drops_event_and_returns_nil_id() {
    let options = ClientOptions {
        before_send: Some(std::sync::Arc::new(|_| None)),
        ..Default::default()
    };
    let events = with_captured_events_options(
        || {
            let id = faultline::capture_message("will vanish", Level::Error);
            assert!(id.is_nil());
        },
        options,
    );
    assert!(events.is_empty());
}

#[test]
fn test_sample_rate_zero_drops_everything() {
    let options = ClientOptions {
        sample_rate: 0.0,
        ..Default::default()
    };
    let events = with_captured_events_options(
        || {
            let id = faultline::capture_message("sampled out", Level::Error);
            assert!(id.is_nil());
        },
        options,
    );
    assert!(events.is_empty());
}

#[test]
fn test_last_event_id_follows_captures() {
    with_captured_events(|| {
        assert!(faultline::last_event_id().is_none());
        let id = faultline::capture_message("hello", Level::Info);
        assert_eq!(faultline::last_event_id(), Some(id));
    });
}

#[test]
fn test_capture_error_builds_exception_chain() {
    use std::fmt;

    #[derive(Debug)]
    struct OuterError(InnerError);

    #[derive(Debug)]
    struct InnerError;

    impl fmt::Display for OuterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer")
        }
    }

    impl fmt::Display for InnerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "inner")
        }
    }

    impl std::error::Error for OuterError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl std::error::Error for InnerError {}

    let events = with_captured_events(|| {
        faultline::capture_error(&OuterError(InnerError));
    });

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, Level::Error);
    // oldest (root cause) first
    assert_eq!(event.exception[0].ty, "InnerError");
    assert_eq!(event.exception[1].ty, "OuterError");
}

#[test]
fn test_derived_hub_shares_top_layer() {
    use std::sync::Arc;

    let events = with_captured_events(|| {
        faultline::configure_scope(|scope| scope.set_tag("origin", "parent"));

        let hub = Arc::new(Hub::new_from_top(Hub::current()));
        std::thread::spawn(move || {
            Hub::run(hub, || {
                faultline::capture_message("from thread", Level::Info);
            })
        })
        .join()
        .unwrap();
    });

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags.get("origin").unwrap(), "parent");
}
