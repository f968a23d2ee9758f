//! termrelay: run submitted programs and bridge their standard streams to a
//! client in real time.
//!
//! A client opens a WebSocket, sends program source as its first frame and
//! then types into the running program's stdin while stdout and stderr stream
//! back as tagged JSON messages. A one-shot HTTP endpoint runs a program to
//! completion with a fixed stdin instead.
//!
//! Submitted code is executed unsandboxed with the server's privileges; see
//! [`session`] for the security boundary.

pub mod api;
pub mod config;
pub mod eval;
pub mod logging;
pub mod session;
pub mod ws;
