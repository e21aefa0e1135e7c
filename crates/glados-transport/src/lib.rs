//! # GLaDOS Transport
//!
//! Network plumbing between the gateway and the messaging service.
//!
//! ```text
//! ┌──────────────────────┐
//! │  glados-runtime      │  (router, drivers, lifecycle)
//! ├──────────────────────┤
//! │  glados-transport    │  <- This crate
//! │   ├─ api             │  Web API: bootstrap handshake, post, react
//! │   ├─ websocket       │  Connection Driver (inbound frames)
//! │   └─ control         │  Local control socket (injections)
//! ├──────────────────────┤
//! │  Network (HTTP/WS)   │
//! └──────────────────────┘
//! ```
//!
//! The Web API client implements [`glados_core::Messenger`], so it can be
//! handed straight to an [`Outbox`](glados_core::Outbox).

pub mod api;
#[cfg(unix)]
pub mod control;
pub mod websocket;

pub use api::{Bootstrap, SelfInfo, SlackApi};
#[cfg(unix)]
pub use control::{ControlError, ControlSocket, encode_request, parse_request, send_request};
pub use websocket::ConnectionDriver;
