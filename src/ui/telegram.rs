use clap::Parser;
use teloxide::prelude::*;

use std::{error::Error, sync::Arc};

#[derive(Debug, Parser)]
pub struct Config {
    /// Overrides the token stored in the state file
    #[clap(long = "telegram-token", env = "TELEGRAM_TOKEN", value_parser)]
    pub token: Option<String>,
    /// Answer `/start` with the chat id, so users can tell it to the admin
    #[clap(long = "telegram-poll", env = "TELEGRAM_POLL")]
    pub poll: bool,
}

fn chat_id_reply(text: Option<&str>, chat: ChatId) -> Option<String> {
    match text.map(str::trim) {
        Some("/start") | Some("/id") => Some(chat.0.to_string()),
        _ => None,
    }
}

async fn answer(bot: Bot, msg: Message) -> ResponseResult<()> {
    if let Some(reply) = chat_id_reply(msg.text(), msg.chat.id) {
        bot.send_message(msg.chat.id, reply).await?;
    }
    Ok(())
}

pub async fn start(bot: Bot) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing::info!("Starting command bot...");

    let ignore_update = |upd: Arc<Update>| {
        Box::pin(async move {
            tracing::trace!(id = upd.id, "ignored update");
        })
    };

    Dispatcher::builder(bot, Update::filter_message().endpoint(answer))
        .default_handler(ignore_update)
        .build()
        .dispatch()
        .await;
    Ok(())
}
