//! vrcosc/src/senders.rs
//!
//! VRChat-specific sends layered on [`OscTransport`]. Each one builds an
//! [`OscMessage`] and hands it to the transport's generic send, in a blocking
//! and an async flavour.

use crate::chatbox::{self, ChatboxMessage};
use crate::input::InputControl;
use crate::message::{AVATAR_PARAMETERS_PREFIX, OscMessage};
use crate::transport::OscTransport;
use crate::value::OscValue;
use crate::{OscError, Result};

/// `/avatar/parameters/<name>` carrying `value`.
pub fn parameter_message(name: &str, value: impl Into<OscValue>) -> Result<OscMessage> {
    if name.trim().is_empty() {
        return Err(OscError::Configuration("parameter name is empty".into()));
    }
    OscMessage::new(format!("{AVATAR_PARAMETERS_PREFIX}{name}"), vec![value.into()])
}

/// `/input/<control>` carrying the control's encoding of `value`.
pub fn input_message<C: InputControl>(control: C, value: C::Value) -> Result<OscMessage> {
    OscMessage::new(control.address(), vec![C::encode(value)])
}

impl OscTransport {
    /// Sets an avatar parameter. The value's OSC type follows the Rust type:
    /// `bool` => T/F, integers => `i`, floats => `f`.
    pub fn send_parameter(&self, name: &str, value: impl Into<OscValue>) -> Result<()> {
        self.send_message(&parameter_message(name, value)?)
    }

    pub async fn send_parameter_async(&self, name: &str, value: impl Into<OscValue>) -> Result<()> {
        let msg = parameter_message(name, value)?;
        self.send_message_async(&msg).await
    }

    /// Drives an `/input/*` control, e.g. `send_input(InputButton::Jump, true)`.
    pub fn send_input<C: InputControl>(&self, control: C, value: C::Value) -> Result<()> {
        self.send_message(&input_message(control, value)?)
    }

    pub async fn send_input_async<C: InputControl>(&self, control: C, value: C::Value) -> Result<()> {
        let msg = input_message(control, value)?;
        self.send_message_async(&msg).await
    }

    /// Posts `text` to the chatbox.
    pub fn send_chatbox(&self, text: &str, bypass_keyboard: bool, play_sfx: bool) -> Result<()> {
        self.send_chatbox_message(
            &ChatboxMessage::new(text)
                .bypass_keyboard(bypass_keyboard)
                .play_sfx(play_sfx),
        )
    }

    pub async fn send_chatbox_async(
        &self,
        text: &str,
        bypass_keyboard: bool,
        play_sfx: bool,
    ) -> Result<()> {
        let msg = ChatboxMessage::new(text)
            .bypass_keyboard(bypass_keyboard)
            .play_sfx(play_sfx)
            .to_message()?;
        self.send_message_async(&msg).await
    }

    pub fn send_chatbox_message(&self, chat: &ChatboxMessage) -> Result<()> {
        self.send_message(&chat.to_message()?)
    }

    pub async fn send_chatbox_message_async(&self, chat: &ChatboxMessage) -> Result<()> {
        let msg = chat.to_message()?;
        self.send_message_async(&msg).await
    }

    /// Toggles the typing indicator above the avatar.
    pub fn send_chatbox_typing(&self, typing: bool) -> Result<()> {
        self.send_message(&chatbox::typing_message(typing)?)
    }

    pub async fn send_chatbox_typing_async(&self, typing: bool) -> Result<()> {
        let msg = chatbox::typing_message(typing)?;
        self.send_message_async(&msg).await
    }
}
