//! Line-buffered server-sent-event decoding for streaming providers.

use bytes::Bytes;
use courier_common::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};

use crate::backend::FragmentStream;

/// Turn a streaming HTTP response body into a fragment stream, applying
/// `extract` to the JSON payload of each `data:` line. Lines whose payload
/// yields `None` (pings, role deltas, usage frames) are skipped; `[DONE]`
/// markers are ignored and the stream ends when the body does.
pub(crate) fn fragments_from_sse<F>(response: reqwest::Response, extract: F) -> FragmentStream
where
    F: Fn(&serde_json::Value) -> Option<String> + Send + 'static,
{
    let body = response.bytes_stream().boxed();
    let buffer: Vec<u8> = Vec::new();

    let fragments = stream::try_unfold(
        (body, buffer, extract),
        |(mut body, mut buffer, extract): (
            BoxStream<'static, reqwest::Result<Bytes>>,
            Vec<u8>,
            F,
        )| async move {
            loop {
                if let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(0..=i).collect();
                    let line = String::from_utf8_lossy(&line_bytes).trim().to_string();

                    // SSE allows both "data: x" and "data:x".
                    if let Some(payload) = line.strip_prefix("data:") {
                        let data = payload.trim_start();
                        if data == "[DONE]" {
                            continue;
                        }
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                            if let Some(text) = extract(&json) {
                                return Ok(Some((text, (body, buffer, extract))));
                            }
                        }
                        // Malformed or uninteresting payload: skip the line.
                    }
                    continue;
                }

                match body.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        return Err(Error::Provider(format!("stream error: {e}")));
                    }
                    None => return Ok(None),
                }
            }
        },
    );

    Box::pin(fragments)
}
