//! Span helpers for request routing.

/// Create a span for one routed request
#[macro_export]
macro_rules! route_span {
    ($path:expr) => {
        $crate::tracing::info_span!("route", route = %$path)
    };
}

/// Create a span for one provider attempt
#[macro_export]
macro_rules! provider_span {
    ($config:expr, $attempt:expr) => {
        $crate::tracing::info_span!(
            "provider_call",
            provider = %$config.family,
            model = %$config.model,
            attempt = $attempt,
            otel.kind = "client"
        )
    };
}
