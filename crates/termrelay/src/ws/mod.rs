//! WebSocket transport for interactive terminal sessions.

mod handler;

pub use handler::terminal_ws;
