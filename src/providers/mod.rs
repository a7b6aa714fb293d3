//! Concrete provider adapters.

pub mod google;
pub mod ollama;
pub mod openai;
pub mod responses;

pub use google::GoogleAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use responses::ResponsesAdapter;

/// Pop one complete SSE event off the front of the buffer.
///
/// Returns the event's `data:` payload (if any) and the remaining buffer
/// content, or `None` when no complete event is buffered yet.
pub(crate) fn next_sse_event(buffer: &str) -> Option<(Option<String>, String)> {
    let end = buffer.find("\n\n")?;
    let event = &buffer[..end];
    let remainder = buffer[end + 2..].to_string();

    let mut data = None;
    for line in event.lines() {
        if let Some(rest) = line.strip_prefix("data: ") {
            data = Some(rest.to_string());
        }
    }

    Some((data, remainder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_event_is_not_consumed() {
        assert!(next_sse_event("data: {\"a\":1}").is_none());
    }

    #[test]
    fn complete_event_yields_data_and_remainder() {
        let (data, remainder) = next_sse_event("data: {\"a\":1}\n\ndata: tail").unwrap();
        assert_eq!(data.as_deref(), Some("{\"a\":1}"));
        assert_eq!(remainder, "data: tail");
    }

    #[test]
    fn non_data_event_yields_no_payload() {
        let (data, remainder) = next_sse_event(": keepalive\n\nrest").unwrap();
        assert!(data.is_none());
        assert_eq!(remainder, "rest");
    }
}
