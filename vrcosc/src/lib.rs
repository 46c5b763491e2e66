//! vrcosc/src/lib.rs
//!
//! The main library file for the `vrcosc` crate: a bidirectional OSC engine for
//! exchanging avatar parameters, inputs and chatbox text with VRChat over UDP.
//! Re-exports the major submodules.

pub mod chatbox;
pub mod codec;
pub mod config;
pub mod input;
pub mod message;
pub mod router;
pub mod senders;
pub mod transport;
pub mod value;

use thiserror::Error;

pub use chatbox::ChatboxMessage;
pub use codec::{FormatError, OscPacket};
pub use config::OscConfig;
pub use input::{InputAxis, InputButton, InputControl};
pub use message::{MessageKind, OscMessage};
pub use router::{OscRouter, SubscriptionId};
pub use transport::{ListenOptions, OscTransport};
pub use value::{FromOscValue, OscValue, OscValueType};

/// Port VRChat listens on for incoming OSC.
pub const DEFAULT_SEND_PORT: u16 = 9000;

/// Port VRChat sends its outgoing OSC to.
pub const DEFAULT_LISTEN_PORT: u16 = 9001;

#[derive(Error, Debug)]
pub enum OscError {
    #[error("OSC configuration error: {0}")]
    Configuration(String),

    #[error("OSC format error: {0}")]
    Format(#[from] FormatError),

    #[error("OSC type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: OscValueType,
        found: OscValueType,
    },

    #[error("OSC argument index {index} out of range (message has {len} arguments)")]
    Index { index: usize, len: usize },

    #[error("OSC handler registration rejected: {0}")]
    Registration(String),

    #[error("OSC transport is not connected; call connect() first")]
    NotConnected,

    #[error("OSC I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OscError>;
