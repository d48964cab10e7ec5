use crate::{Error, read_line_limited};

/// Extracts the POST endpoint from a buffered SSE body.
///
/// MCP SSE servers announce the message endpoint as the first event:
///
/// ```text
/// event: endpoint
/// data: /messages/?session_id=...
/// ```
///
/// The parser tracks whether the most recent `event:` value is `endpoint` and
/// accepts the next `data:` payload once it is. Trailing `\r` is stripped.
pub fn parse_sse_endpoint(body: &str) -> Option<String> {
    let mut endpoint_event = false;
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            endpoint_event = value.trim() == "endpoint";
            continue;
        }
        if endpoint_event {
            if let Some(value) = line.strip_prefix("data:") {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Streaming variant of [`parse_sse_endpoint`] for live SSE connections,
/// which never reach EOF on their own. Returns `Ok(None)` if the stream ends
/// without announcing an endpoint; callers bound the read with a timeout.
pub async fn read_sse_endpoint<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    max_message_bytes: usize,
) -> Result<Option<String>, Error> {
    let mut endpoint_event = false;
    loop {
        let Some(line) = read_line_limited(reader, max_message_bytes).await? else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            endpoint_event = value.trim() == "endpoint";
            continue;
        }
        if endpoint_event {
            if let Some(value) = line.strip_prefix("data:") {
                return Ok(Some(value.trim().to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_endpoint_path() {
        let body = "event: endpoint\ndata: /messages/?session_id=abc123\n\n";
        assert_eq!(
            parse_sse_endpoint(body).as_deref(),
            Some("/messages/?session_id=abc123")
        );
    }

    #[test]
    fn tolerates_other_events_and_crlf() {
        let body = concat!(
            "event: ping\r\n",
            "data: {}\r\n",
            "\r\n",
            "event: endpoint\r\n",
            "data: /rpc\r\n",
            "\r\n",
            "event: message\r\n",
            "data: ignored\r\n",
        );
        assert_eq!(parse_sse_endpoint(body).as_deref(), Some("/rpc"));
    }

    #[test]
    fn data_before_endpoint_event_is_ignored() {
        let body = "data: /early\nevent: endpoint\ndata: /late\n";
        assert_eq!(parse_sse_endpoint(body).as_deref(), Some("/late"));
    }

    #[test]
    fn a_later_event_supersedes_endpoint() {
        let body = "event: endpoint\nevent: message\ndata: /nope\n";
        assert_eq!(parse_sse_endpoint(body), None);
    }

    #[test]
    fn empty_body_yields_none() {
        assert_eq!(parse_sse_endpoint(""), None);
        assert_eq!(parse_sse_endpoint("event: message\ndata: x\n"), None);
    }

    #[tokio::test]
    async fn streaming_reader_stops_at_endpoint() {
        let body = b"event: ping\n\nevent: endpoint\ndata: /messages\n\nevent: never-read\n";
        let mut reader = tokio::io::BufReader::new(&body[..]);
        let endpoint = read_sse_endpoint(&mut reader, 1024).await.unwrap();
        assert_eq!(endpoint.as_deref(), Some("/messages"));
    }

    #[tokio::test]
    async fn streaming_reader_returns_none_on_eof() {
        let body = b"event: message\ndata: {}\n\n";
        let mut reader = tokio::io::BufReader::new(&body[..]);
        assert!(
            read_sse_endpoint(&mut reader, 1024)
                .await
                .unwrap()
                .is_none()
        );
    }
}
