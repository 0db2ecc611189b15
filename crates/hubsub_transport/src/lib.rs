//! hubsub_transport
//!
//! The WebSocket transport: accepts connections, frames JSON on and off
//! the wire, and translates client frames into broker operations. Each
//! connection gets a writer task fed by an unbounded channel; the broker
//! side (fan-out, pumps, lifecycle notifications) only ever talks to that
//! channel and never to the socket directly.

pub mod websocket;
