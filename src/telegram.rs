use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{ChatId, InputFile},
};
use thiserror::Error;
use tracing::debug;

use crate::traits::ConfigDelivery;

const CAPTION: &str = "WireGuard Configuration";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("telegram bot token is missing")]
    MissingToken,
    #[error("telegram bot token is malformed")]
    InvalidToken,
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
}

/// Bot tokens look like `<bot id>:<secret>`.
pub fn validate_token(token: &str) -> Result<(), DeliveryError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DeliveryError::MissingToken);
    }
    match token.split_once(':') {
        Some((id, secret))
            if !id.is_empty()
                && id.bytes().all(|b| b.is_ascii_digit())
                && !secret.is_empty()
                && !secret.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(DeliveryError::InvalidToken),
    }
}

pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(token: &str) -> Result<Self, DeliveryError> {
        validate_token(token)?;
        Ok(Self {
            bot: Bot::new(token.trim()),
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }
}

#[async_trait]
impl ConfigDelivery for TelegramDelivery {
    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: String,
    ) -> Result<(), DeliveryError> {
        let file = InputFile::memory(contents.into_bytes()).file_name(file_name.to_owned());
        self.bot
            .send_document(ChatId(chat_id), file)
            .caption(CAPTION)
            .await?;
        debug!(chat_id, file_name, "document sent");
        Ok(())
    }
}
