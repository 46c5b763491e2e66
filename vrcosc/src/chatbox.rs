//! vrcosc/src/chatbox.rs
//!
//! VRChat's chatbox over OSC:
//!   /chatbox/input <text> <bool> <bool>
//!   /chatbox/typing <bool>
//!
//! The first input bool: true => bypass the keyboard and post immediately,
//! false => open the keyboard pre-filled with the text.
//! The second input bool: play the notification sound.

use crate::Result;
use crate::message::OscMessage;
use crate::value::OscValue;

pub const CHATBOX_INPUT_ADDRESS: &str = "/chatbox/input";
pub const CHATBOX_TYPING_ADDRESS: &str = "/chatbox/typing";

/// Holds data for chatbox input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatboxMessage {
    pub text: String,
    pub bypass_keyboard: bool,
    pub play_sfx: bool,
}

impl ChatboxMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bypass_keyboard: false,
            play_sfx: false,
        }
    }

    pub fn bypass_keyboard(mut self, bypass: bool) -> Self {
        self.bypass_keyboard = bypass;
        self
    }

    pub fn play_sfx(mut self, play: bool) -> Self {
        self.play_sfx = play;
        self
    }

    pub fn to_message(&self) -> Result<OscMessage> {
        OscMessage::new(
            CHATBOX_INPUT_ADDRESS,
            vec![
                OscValue::String(self.text.clone()),
                OscValue::Bool(self.bypass_keyboard),
                OscValue::Bool(self.play_sfx),
            ],
        )
    }
}

/// The `/chatbox/typing` indicator message.
pub fn typing_message(typing: bool) -> Result<OscMessage> {
    OscMessage::new(CHATBOX_TYPING_ADDRESS, vec![OscValue::Bool(typing)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_open_keyboard_silently() {
        let msg = ChatboxMessage::new("Hello World 1").to_message().unwrap();
        assert_eq!(msg.address(), "/chatbox/input");
        assert_eq!(
            msg.arguments(),
            &[
                OscValue::from("Hello World 1"),
                OscValue::Bool(false),
                OscValue::Bool(false),
            ]
        );
    }

    #[test]
    fn test_builder_flags() {
        let msg = ChatboxMessage::new("Hello World 3")
            .bypass_keyboard(true)
            .play_sfx(true)
            .to_message()
            .unwrap();
        assert_eq!(msg.value_at(1).unwrap(), &OscValue::Bool(true));
        assert_eq!(msg.value_at(2).unwrap(), &OscValue::Bool(true));
    }

    #[test]
    fn test_typing_indicator() {
        let msg = typing_message(true).unwrap();
        assert_eq!(msg.address(), "/chatbox/typing");
        assert_eq!(msg.arguments(), &[OscValue::Bool(true)]);
    }
}
