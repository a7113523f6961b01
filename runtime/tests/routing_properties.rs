//! Property tests for topic routing and failure containment.

#![allow(clippy::unwrap_used, clippy::panic)]

use notification_worker_core::{DateTime, EventEnvelope, Payload, Utc};
use notification_worker_runtime::{
    Dispatcher, ErrorKind, HandlerError, HandlerRegistry, Outcome, Registration,
};
use notification_worker_testing::RecordingMetricsSink;
use notification_worker_testing::properties::{distinct_topics, topic_name};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

type Calls = Arc<Mutex<Vec<String>>>;

/// One handler per topic, each recording the topic it was registered for.
fn recording_dispatcher(topics: &[String], calls: &Calls) -> Dispatcher {
    let registrations = topics.iter().map(|topic| {
        let calls = Arc::clone(calls);
        let owner = topic.clone();
        Registration::new(
            topic.clone(),
            move |_: &EventEnvelope| -> Result<(), HandlerError> {
                calls.lock().unwrap().push(owner.clone());
                Ok(())
            },
        )
    });
    let registry = HandlerRegistry::new(registrations).unwrap();
    Dispatcher::new(Arc::new(registry), Arc::new(RecordingMetricsSink::new()))
}

fn envelope(topic: &str) -> EventEnvelope {
    EventEnvelope::new(topic, Payload::new(), DateTime::<Utc>::UNIX_EPOCH).unwrap()
}

proptest! {
    #[test]
    fn dispatch_invokes_exactly_the_registered_handler(
        topics in distinct_topics(8),
        pick in any::<prop::sample::Index>(),
    ) {
        let calls: Calls = Arc::default();
        let dispatcher = recording_dispatcher(&topics, &calls);
        let target = pick.get(&topics);

        let outcome = dispatcher.dispatch(&envelope(target));

        prop_assert!(outcome.is_processed());
        prop_assert_eq!(calls.lock().unwrap().clone(), vec![target.clone()]);
    }

    #[test]
    fn unregistered_topics_yield_no_handler(
        topics in distinct_topics(8),
        stray in topic_name(),
    ) {
        prop_assume!(!topics.contains(&stray));
        let calls: Calls = Arc::default();
        let dispatcher = recording_dispatcher(&topics, &calls);

        prop_assert_eq!(dispatcher.dispatch(&envelope(&stray)), Outcome::NoHandler);
        prop_assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failures_never_affect_the_next_dispatch(fail_first in any::<bool>(), panic_first in any::<bool>()) {
        let registry = HandlerRegistry::new([Registration::new(
            "order.created",
            |env: &EventEnvelope| -> Result<(), HandlerError> {
                match env.optional_str("mode") {
                    Some("panic") => panic!("handler bug"),
                    Some("fail") => Err(HandlerError::processing("downstream unavailable")),
                    _ => Ok(()),
                }
            },
        )])
        .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(RecordingMetricsSink::new()));

        let mode = match (fail_first, panic_first) {
            (_, true) => "panic",
            (true, false) => "fail",
            (false, false) => "ok",
        };
        let mut payload = Payload::new();
        payload.insert("mode".to_string(), mode.into());
        let first = EventEnvelope::new("order.created", payload, DateTime::<Utc>::UNIX_EPOCH).unwrap();

        let outcome = dispatcher.dispatch(&first);
        match mode {
            "panic" => prop_assert_eq!(outcome, Outcome::HandlerFailed(ErrorKind::Panic)),
            "fail" => prop_assert_eq!(outcome, Outcome::HandlerFailed(ErrorKind::Processing)),
            _ => prop_assert!(outcome.is_processed()),
        }

        prop_assert!(dispatcher.dispatch(&envelope("order.created")).is_processed());
    }
}
