//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Create a span covering a session's operations.
///
/// # Example
///
/// ```rust,ignore
/// use tiledma::observability::span_session;
///
/// let span = span_session(1);
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_session(id: u64) -> Span {
    span!(Level::DEBUG, "dma_session", id = id)
}

/// Log a session lifecycle transition.
#[inline]
pub fn trace_state_change(session: u64, from: &str, to: &str) {
    tracing::debug!(
        session = session,
        from = %from,
        to = %to,
        "session state changed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_session() {
        let span = span_session(3);
        let _guard = span.enter();
        trace_state_change(3, "created", "active");
    }
}
