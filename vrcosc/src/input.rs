//! vrcosc/src/input.rs
//!
//! VRChat's `/input/*` controls. Buttons take an int (1 pressed, 0 released),
//! axes take a float in -1..1.

use std::fmt;
use std::str::FromStr;

use crate::OscError;
use crate::value::OscValue;

pub const INPUT_PREFIX: &str = "/input/";

/// Something addressable under `/input/` with a fixed argument encoding.
pub trait InputControl: Copy + fmt::Debug {
    type Value;

    /// The wire name, e.g. `Jump` or `Vertical`.
    fn name(&self) -> &'static str;

    fn encode(value: Self::Value) -> OscValue;

    fn address(&self) -> String {
        format!("{INPUT_PREFIX}{}", self.name())
    }
}

macro_rules! input_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = OscError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| OscError::Configuration(format!(
                        "unknown {} '{}'", stringify!($name), s
                    )))
            }
        }
    };
}

input_enum! {
    /// Digital inputs. Send `true` to press and `false` to release; a button
    /// left pressed stays pressed.
    InputButton {
        MoveForward,
        MoveBackward,
        MoveLeft,
        MoveRight,
        LookLeft,
        LookRight,
        Jump,
        Run,
        ComfortLeft,
        ComfortRight,
        DropRight,
        UseRight,
        GrabRight,
        DropLeft,
        UseLeft,
        GrabLeft,
        PanicButton,
        QuickMenuToggleLeft,
        QuickMenuToggleRight,
        Voice,
    }
}

input_enum! {
    /// Analog inputs, each expecting a float from -1 to 1.
    InputAxis {
        Vertical,
        Horizontal,
        LookHorizontal,
        UseAxisRight,
        GrabAxisRight,
        MoveHoldFB,
        SpinHoldCwCcw,
        SpinHoldUD,
        SpinHoldLR,
    }
}

impl InputControl for InputButton {
    type Value = bool;

    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn encode(pressed: bool) -> OscValue {
        OscValue::Int(i32::from(pressed))
    }
}

impl InputControl for InputAxis {
    type Value = f32;

    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn encode(value: f32) -> OscValue {
        OscValue::Float(value)
    }
}
