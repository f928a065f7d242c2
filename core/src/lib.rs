//! Driver for the ESP-01 Wi-Fi module over a serial AT-command link.
//!
//! # Overview
//! The module is a station-mode Wi-Fi bridge. This crate issues AT commands,
//! matches the module's text replies, joins networks, runs one TCP exchange at
//! a time and layers HTTP/1.1 requests on top of it.
//!
//! # Design
//! - The platform supplies a [`Serial`] line and a [`Clock`]. Its interrupt
//!   side feeds the shared [`FrameReceiver`]; the driver never touches
//!   hardware directly.
//! - [`Esp01`] is the single context object. Connection, socket and HTTP
//!   operations are `impl` blocks on it in [`wifi`], [`socket`] and [`http`].
//! - Every wait has a timeout taken from [`DriverConfig`]; every outcome
//!   collapses to a [`Status`] through [`WifiError::status`].
//! - The core does no heap-unbounded buffering: commands and requests are
//!   built in fixed-capacity [`BoundedBuf`]s and rejected when they overflow.

pub mod at;
pub mod buffer;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod http;
pub mod platform;
pub mod response;
pub mod socket;
pub mod wifi;

#[cfg(test)]
mod testing;

pub use buffer::BoundedBuf;
pub use client::Esp01;
pub use command::CommandEngine;
pub use config::DriverConfig;
pub use error::{ConfigError, SerialError, Status, WifiError};
pub use frame::FrameReceiver;
pub use http::{HttpMethod, HttpReply, HttpRequest};
pub use platform::{Clock, Serial, StdClock};
pub use response::Marker;
