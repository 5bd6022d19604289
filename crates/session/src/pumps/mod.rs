//! Socket pumps run by the WebSocket transport for each live connection.

pub(crate) mod read;
pub(crate) mod write;
