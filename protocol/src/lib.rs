//! Wire types shared by the replay server and its observers.
//!
//! Everything that crosses the per-connection channel lives here: the
//! streamed [`OutputEvent`]s, the inbound [`ReplayRequest`], the aggregated
//! [`ReplayResult`] and the marker framing used to smuggle that result
//! through the plain-text stdout stream. The receiving half of the framing
//! is [`ResultStreamParser`].

mod envelope;
mod events;
mod framing;
mod result;
mod stream_parser;

pub use envelope::ClientMessage;
pub use envelope::ProtocolError;
pub use envelope::ServerMessage;
pub use events::OutputEvent;
pub use events::OutputKind;
pub use events::ReplayRequest;
pub use framing::END_MARKER;
pub use framing::START_MARKER;
pub use framing::frame_result;
pub use result::Alert;
pub use result::MAX_EXPLAIN_LINES;
pub use result::ReplayResult;
pub use stream_parser::ParserState;
pub use stream_parser::ReplayCompletion;
pub use stream_parser::ResultStreamParser;
