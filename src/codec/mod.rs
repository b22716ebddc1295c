//! Text codecs for the round trip: subject paragraph, body region markers,
//! body merge, and charset handling.

pub mod body;
pub mod charset;
pub mod merge;
pub mod subject;
