use std::sync::Arc;

use courier_common::UserId;
use courier_engine::{ChatEngine, TurnError};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

use crate::fmt::to_telegram_markdown;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
enum Command {
    #[command(description = "show the welcome message.")]
    Start,
    #[command(description = "start a new conversation.")]
    New,
    #[command(description = "list commands and available models.")]
    Help,
    #[command(description = "switch the generation model.")]
    SwitchModel(String),
}

struct BotContext {
    engine: Arc<ChatEngine>,
    /// Empty means the bot is open to everyone.
    whitelist: Vec<UserId>,
}

impl BotContext {
    fn authorized(&self, user: UserId) -> bool {
        allowed(&self.whitelist, user)
    }
}

fn allowed(whitelist: &[UserId], user: UserId) -> bool {
    whitelist.is_empty() || whitelist.contains(&user)
}

/// Telegram front door: command routing plus free-text relay into the
/// engine.
pub struct CourierBot {
    bot: Bot,
    ctx: Arc<BotContext>,
}

impl CourierBot {
    pub fn new(bot: Bot, engine: Arc<ChatEngine>, whitelist: Vec<UserId>) -> Self {
        Self {
            bot,
            ctx: Arc::new(BotContext { engine, whitelist }),
        }
    }

    /// Long-poll for updates until interrupted.
    pub async fn dispatch(self) {
        let handler = Update::filter_message()
            .branch(teloxide::filter_command::<Command, _>().endpoint(handle_command))
            .branch(
                dptree::filter_map(|msg: Message| msg.text().map(str::to_owned))
                    .endpoint(handle_text),
            );

        let mut dispatcher = Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.ctx])
            .default_handler(|upd| async move {
                tracing::trace!("unhandled update: {:?}", upd.kind);
            })
            .build();

        let token = dispatcher.shutdown_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                if let Err(e) = token.shutdown() {
                    warn!("shutdown token error: {e:?}");
                }
            }
        });

        info!("telegram bot polling started");
        dispatcher.dispatch().await;
        info!("telegram bot polling stopped");
    }
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let Some((_, user, name)) = sender(&msg) else {
        return Ok(());
    };
    if !ctx.authorized(user) {
        warn!(user = user.0, "command from unauthorized user");
        reply(&bot, &msg, "Sorry, you are not allowed to use this bot.").await;
        return Ok(());
    }

    match cmd {
        Command::Start => {
            let model = ctx
                .engine
                .active_model()
                .await
                .unwrap_or_else(|| "none".into());
            reply(
                &bot,
                &msg,
                &format!(
                    "Hi {name}! Send me a message and **{model}** will answer. \
                     Use /help to see what else I can do."
                ),
            )
            .await;
        }
        Command::New => match ctx.engine.clear_history(user) {
            Ok(_) => reply(&bot, &msg, "Started a new conversation.").await,
            Err(e) => {
                warn!(user = user.0, "failed to clear history: {e}");
                reply(&bot, &msg, "Sorry, I could not clear the conversation.").await;
            }
        },
        Command::Help => {
            let models = ctx.engine.available_models();
            let current = ctx
                .engine
                .active_model()
                .await
                .unwrap_or_else(|| "none".into());
            let listing = if models.is_empty() {
                "(none configured)".to_string()
            } else {
                models
                    .iter()
                    .map(|m| format!("- {m}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            reply(
                &bot,
                &msg,
                &format!(
                    "{}\n\nAvailable models:\n{listing}\n\nCurrent model: {current}",
                    Command::descriptions()
                ),
            )
            .await;
        }
        Command::SwitchModel(name) => {
            let name = name.trim();
            if name.is_empty() {
                reply(
                    &bot,
                    &msg,
                    "Usage: /switchmodel <model name>. See /help for the list.",
                )
                .await;
                return Ok(());
            }
            match ctx.engine.switch_active_model(user, name).await {
                Ok(()) => {
                    reply(
                        &bot,
                        &msg,
                        &format!("Switched to **{name}**. The conversation starts fresh."),
                    )
                    .await;
                }
                Err(TurnError::UnknownModel(_)) => {
                    reply(
                        &bot,
                        &msg,
                        &format!("I don't know the model '{name}'. See /help for the list."),
                    )
                    .await;
                }
                Err(e) => {
                    warn!(user = user.0, "model switch failed: {e}");
                    reply(&bot, &msg, "Sorry, something went wrong switching models.").await;
                }
            }
        }
    }
    Ok(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    text: String,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let Some((chat, user, name)) = sender(&msg) else {
        return Ok(());
    };
    if !ctx.authorized(user) {
        info!(user = user.0, "message from unauthorized user");
        reply(&bot, &msg, "Sorry, you are not allowed to use this bot.").await;
        return Ok(());
    }

    info!(
        user = user.0,
        chars = text.chars().count(),
        "message from {name}"
    );

    if let Err(err) = ctx.engine.run_turn(user, chat, &text).await {
        warn!(user = user.0, "turn failed: {err}");
        reply(&bot, &msg, user_notice(&err)).await;
    }
    Ok(())
}

/// Chat, sender id, and display name for a message worth answering.
/// Senderless updates (channel posts) and other bots are ignored.
fn sender(msg: &Message) -> Option<(courier_common::ChatId, UserId, String)> {
    let from = msg.from.as_ref()?;
    if from.is_bot {
        return None;
    }
    Some((
        courier_common::ChatId(msg.chat.id.0),
        UserId(from.id.0 as i64),
        from.first_name.clone(),
    ))
}

fn user_notice(err: &TurnError) -> &'static str {
    match err {
        TurnError::NoBackendConfigured => {
            "No model is available right now. Ask the operator to configure a backend."
        }
        TurnError::UnknownModel(_) => "I don't know that model. See /help for the list.",
        TurnError::EmptyResponse => "The model returned nothing. Please try again.",
        TurnError::Stream(_) | TurnError::Delivery(_) | TurnError::History(_) => {
            "Sorry, something went wrong. Please try again."
        }
    }
}

/// Command responses go out formatted, with a plain-text second attempt
/// when Telegram rejects the markup.
async fn reply(bot: &Bot, msg: &Message, text: &str) {
    let formatted = to_telegram_markdown(text);
    let sent = bot
        .send_message(msg.chat.id, formatted)
        .parse_mode(ParseMode::MarkdownV2)
        .await;
    if let Err(e) = sent {
        tracing::debug!("formatted reply rejected ({e}), sending plain");
        if let Err(e) = bot.send_message(msg.chat.id, text).await {
            warn!("failed to send reply: {e}");
        }
    }
}
