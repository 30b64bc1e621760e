//! Detection of socket-level failures buried in error chains.
//!
//! HTTP stacks wrap the interesting io error several layers deep, so the
//! whole `source()` chain is walked. Typed checks run first; the message
//! scan is a fallback for errors that only carry text.

use std::error::Error as StdError;
use std::io;

/// Lowercase substrings that indicate a dropped or truncated connection.
const TRANSPORT_MESSAGE_MARKERS: &[&str] = &[
    "connection reset",
    "broken pipe",
    "connection abort",
    "premature close",
    "prematurely closed",
    "stream closed",
    "unexpected eof",
];

/// True when `error` or anything in its source chain is a socket-level
/// failure: connection reset, broken pipe, aborted connection, or a
/// response body cut off mid-stream.
pub fn is_transport_error(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(req) = err.downcast_ref::<reqwest::Error>() {
            if req.is_connect() || req.is_body() {
                return true;
            }
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if message_indicates_transport(&err.to_string()) {
            return true;
        }
        current = err.source();
    }
    false
}

fn message_indicates_transport(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSPORT_MESSAGE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
