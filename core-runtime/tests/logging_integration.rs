//! Integration tests for the logging system and the event bus together

use bridge_traits::time::LogLevel;
use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream, LeaseEvent};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_signed_url, LogFormat, LoggingConfig,
};

#[test]
fn test_global_init_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).expect("first init succeeds");
    tracing::info!(video_id = "vid-1", "logging initialised");

    let second = init_logging(config);
    assert!(second.is_err());
}

#[test]
fn test_signed_url_never_leaks_query() {
    let url = "https://cdn.example.com/lessons/intro.m3u8?Expires=1767225600&Signature=abc&Key-Pair-Id=K1";
    let redacted = redact_signed_url(url);

    assert!(!redacted.contains("Signature"));
    assert!(!redacted.contains("Key-Pair-Id"));
    assert!(redacted.starts_with("https://cdn.example.com/lessons/intro.m3u8"));
}

#[test]
fn test_credential_fields_are_redacted() {
    for field in ["apikey", "api_key", "access_token", "Authorization", "url_signature"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{}", field);
    }
    assert_eq!(redact_if_sensitive("user_id", "user_123"), "user_123");
}

#[tokio::test]
async fn test_lease_failures_surface_as_warnings() {
    let bus = EventBus::default();
    let mut warnings = EventStream::new(bus.subscribe()).min_severity(EventSeverity::Warning);

    bus.emit(CoreEvent::Lease(LeaseEvent::Refreshing {
        video_id: "vid-1".to_string(),
    }))
    .ok();
    bus.emit(CoreEvent::Lease(LeaseEvent::RefreshFailed {
        video_id: "vid-1".to_string(),
        message: "HTTP 502".to_string(),
        attempt: 1,
        will_retry: true,
    }))
    .ok();

    let event = warnings.recv().await.unwrap();
    assert!(matches!(
        event,
        CoreEvent::Lease(LeaseEvent::RefreshFailed { attempt: 1, .. })
    ));
}
