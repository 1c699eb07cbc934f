//! Firmware core of a store-and-forward parcel sensor node.
//!
//! The node sleeps until motion wakes it, scans for a barcode, classifies the
//! parcel and ships the compressed image over MQTT through an AT command
//! driven cellular modem. Camera and inference are supplied by the firmware
//! through the [`pipeline::Camera`] and [`pipeline::Detector`] traits.
//!
//! ```ignore
//! let board = Board::init()?;
//! let node = Node::new(
//!     &CONFIG,
//!     board.modem,
//!     EmbassyClock,
//!     camera,
//!     detector,
//!     board.motion,
//!     board.leds,
//! )?;
//! node.run().await
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "esp32")]
pub mod board;
pub mod channel;
pub mod clock;
pub mod command;
pub mod config;
pub mod constants;
pub mod indicator;
pub mod node;
pub mod pipeline;
pub mod power;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod mock;

pub use clock::{Clock, EmbassyClock};
pub use config::{Config, FailurePolicy, CONFIG};
pub use node::Node;
pub use power::DeviceState;
