//! vrcosc/src/message.rs
//!
//! The decoded form of one OSC message plus VRChat-specific classification
//! (avatar parameter, built-in parameter, avatar change).

use std::fmt;

use crate::codec;
use crate::value::{FromOscValue, OscValue};
use crate::{OscError, Result};

pub const AVATAR_CHANGE_ADDRESS: &str = "/avatar/change";
pub const AVATAR_PARAMETERS_PREFIX: &str = "/avatar/parameters/";

/// Parameters every VRChat avatar exposes, regardless of its own parameter list.
pub const BUILTIN_PARAMETERS: &[&str] = &[
    "IsLocal",
    "PreviewMode",
    "Viseme",
    "Voice",
    "GestureLeft",
    "GestureRight",
    "GestureLeftWeight",
    "GestureRightWeight",
    "AngularY",
    "VelocityX",
    "VelocityY",
    "VelocityZ",
    "VelocityMagnitude",
    "Upright",
    "Grounded",
    "Seated",
    "AFK",
    "TrackingType",
    "VRMode",
    "MuteSelf",
    "InStation",
    "Earmuffs",
    "IsOnFriendsList",
    "AvatarVersion",
    "IsAnimatorEnabled",
    "ScaleModified",
    "ScaleFactor",
    "ScaleFactorInverse",
    "EyeHeightAsMeters",
    "EyeHeightAsPercent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Unknown,
    /// One of [`BUILTIN_PARAMETERS`] under `/avatar/parameters/`.
    DefaultParameter,
    /// Any other parameter under `/avatar/parameters/`.
    AvatarParameter,
    /// `/avatar/change`, carrying the new avatar id.
    AvatarChange,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Unknown => "Unknown",
            MessageKind::DefaultParameter => "DefaultParameter",
            MessageKind::AvatarParameter => "AvatarParameter",
            MessageKind::AvatarChange => "AvatarChange",
        };
        f.write_str(name)
    }
}

/// Classifies an address. First match wins:
/// 1. exactly `/avatar/change`
/// 2. `/avatar/parameters/<name>` (built-in names are `DefaultParameter`)
/// 3. anything else, including a bare `/avatar/parameters/`, is `Unknown`
pub fn classify(address: &str) -> MessageKind {
    if address == AVATAR_CHANGE_ADDRESS {
        return MessageKind::AvatarChange;
    }
    match address.strip_prefix(AVATAR_PARAMETERS_PREFIX) {
        Some("") | None => MessageKind::Unknown,
        Some(name) if BUILTIN_PARAMETERS.contains(&name) => MessageKind::DefaultParameter,
        Some(_) => MessageKind::AvatarParameter,
    }
}

/// An immutable OSC message: address, ordered arguments and derived kind.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    address: String,
    arguments: Vec<OscValue>,
    kind: MessageKind,
}

impl OscMessage {
    /// Builds an outgoing message, validating the address.
    pub fn new(address: impl Into<String>, arguments: Vec<OscValue>) -> Result<Self> {
        let address = address.into();
        codec::validate_address(&address)?;
        Ok(Self::from_wire(address, arguments))
    }

    /// Builds a message whose address the decoder already checked.
    pub(crate) fn from_wire(address: String, arguments: Vec<OscValue>) -> Self {
        let kind = classify(&address);
        Self {
            address,
            arguments,
            kind,
        }
    }

    /// Full address, e.g. `/avatar/parameters/CatToggle`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The address without its final segment, e.g. `/avatar/parameters/`.
    pub fn path(&self) -> &str {
        match self.address.rfind('/') {
            Some(idx) => &self.address[..=idx],
            None => &self.address,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// True for both user-defined and built-in avatar parameters.
    pub fn is_parameter(&self) -> bool {
        matches!(
            self.kind,
            MessageKind::AvatarParameter | MessageKind::DefaultParameter
        )
    }

    /// The parameter name after `/avatar/parameters/`, for both `AvatarParameter`
    /// and `DefaultParameter` messages. `None` for every other kind.
    pub fn parameter_name(&self) -> Option<&str> {
        if self.is_parameter() {
            self.address.strip_prefix(AVATAR_PARAMETERS_PREFIX)
        } else {
            None
        }
    }

    /// The new avatar id carried by an `/avatar/change` message.
    pub fn avatar_id(&self) -> Option<&str> {
        match (self.kind, self.arguments.first()) {
            (MessageKind::AvatarChange, Some(OscValue::String(id))) => Some(id),
            _ => None,
        }
    }

    pub fn arguments(&self) -> &[OscValue] {
        &self.arguments
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// The first argument, or `None` for an argument-less message.
    pub fn value(&self) -> Option<&OscValue> {
        self.arguments.first()
    }

    pub fn value_at(&self, index: usize) -> Result<&OscValue> {
        self.arguments.get(index).ok_or(OscError::Index {
            index,
            len: self.arguments.len(),
        })
    }

    /// The first argument converted to `T` (see [`FromOscValue`]).
    pub fn get<T: FromOscValue>(&self) -> Result<T> {
        self.get_at(0)
    }

    pub fn get_at<T: FromOscValue>(&self, index: usize) -> Result<T> {
        self.value_at(index)?.convert()
    }

    pub fn into_arguments(self) -> Vec<OscValue> {
        self.arguments
    }

    /// Writes the [`Display`](fmt::Display) form to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.address)?;
        if self.arguments.is_empty() {
            return f.write_str(" (no arguments)");
        }
        f.write_str(" ->")?;
        for (i, arg) in self.arguments.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match arg {
                OscValue::String(s) => write!(f, "{sep}{}:{s:?}", arg.value_type())?,
                other => write!(f, "{sep}{}:{other}", other.value_type())?,
            }
        }
        Ok(())
    }
}
