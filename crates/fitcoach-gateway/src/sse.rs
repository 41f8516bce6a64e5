//! Server-sent event framing for the streaming chat endpoint.
//!
//! Each frame is `event: <name>\ndata: <payload>\n\n`. A payload always fits
//! on one `data:` line: backslash is written as `\\`, carriage return as `\r`
//! and line feed as `\n`. Clients reverse this with [`unescape_newlines`].

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use fitcoach_agents::AgentEvent;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};

pub const EVENT_PREAMBLE: &str = "preamble";
pub const EVENT_MESSAGE: &str = "response.message";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

pub fn escape_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_newlines`]. An unknown escape is kept as written.
pub fn unescape_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

pub fn frame(name: &str, payload: &str) -> String {
    format!("event: {name}\ndata: {payload}\n\n")
}

/// Wire frame for one loop event.
pub fn encode_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Preamble(text) => frame(EVENT_PREAMBLE, &escape_newlines(text)),
        AgentEvent::Message(text) => frame(EVENT_MESSAGE, &escape_newlines(text)),
        AgentEvent::Done => frame(EVENT_DONE, ""),
        AgentEvent::Error(message) => frame(EVENT_ERROR, &escape_newlines(message)),
    }
}

/// A `text/event-stream` body fed by a stream of loop events.
pub struct SseResponse {
    frames: BoxStream<'static, String>,
}

impl SseResponse {
    pub fn new<S>(events: S) -> Self
    where
        S: Stream<Item = AgentEvent> + Send + 'static,
    {
        Self {
            frames: events.map(|event| encode_event(&event)).boxed(),
        }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames
            .poll_next_unpin(cx)
            .map(|frame| frame.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}
