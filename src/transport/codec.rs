//! Newline-delimited framing for the stdio transport.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length to prevent memory exhaustion caused by unterminated or maliciously
//! large messages from a misbehaving peer.
//!
//! Use [`FrameCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`]. Each newline-terminated (`\n`) UTF-8
//! string is one complete JSON-RPC message.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{ConduitError, Result};

/// Default maximum line length accepted on inbound streams: 1 MiB.
///
/// Lines exceeding the limit cause [`FrameCodec::decode`] to return
/// [`ConduitError::Frame`] with `"line too long"` instead of allocating
/// unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line-delimited codec for bidirectional JSON-RPC streams.
///
/// Delegates framing to [`LinesCodec`] with a fixed per-instance byte limit.
/// The limit is a decoder-side concern and is not enforced during encoding.
#[derive(Debug)]
pub struct FrameCodec(LinesCodec);

impl FrameCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with an explicit maximum line length.
    #[must_use]
    pub fn with_max_length(max_bytes: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_bytes))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = ConduitError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = ConduitError;

    /// Encode `item` as a `\n`-terminated line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Transport`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

/// Escape embedded line breaks so the `\n` delimiter stays unambiguous.
///
/// A compact JSON serialization never contains raw line breaks, so this is a
/// guard for pre-serialized payloads handed to the writer: `\r\n`, `\n`, and
/// `\r` become their two-character escape sequences before the delimiter is
/// appended.
#[must_use]
pub fn escape_line_breaks(serialized: String) -> String {
    if !serialized.contains('\n') && !serialized.contains('\r') {
        return serialized;
    }
    serialized
        .replace("\r\n", "\\r\\n")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to a [`ConduitError`].
fn map_codec_error(e: LinesCodecError) -> ConduitError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            ConduitError::Frame("line too long: exceeded maximum line length".into())
        }
        LinesCodecError::Io(io_err) => ConduitError::Transport(io_err.to_string()),
    }
}
