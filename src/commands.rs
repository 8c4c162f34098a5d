//! Chat command handling.
//!
//! Maps inbound chat messages to subscription operations and produces the
//! reply text.  Adding a command is a [`Command`] variant, a match arm in
//! [`Command::parse`] and one in [`CommandHandler::handle`].
//!
//! | Command                         | Operation                          |
//! |---------------------------------|------------------------------------|
//! | `/monitor <path>`               | [`PollEngine::subscribe`]          |
//! | `/monitors`                     | [`SubscriptionStore::list_categories`] |
//! | `/stop <path>`                  | [`SubscriptionStore::unsubscribe`] |
//! | `/price <path> <min> [max]`     | [`SubscriptionStore::set_filter`]  |

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{SubscribeError, SubscriptionError};
use crate::notify::escape_html;
use crate::poll::PollEngine;
use crate::source::resolve_category_path;
use crate::subscriptions::SubscriptionStore;
use crate::transport::{TelegramClient, Transport};

const LONG_POLL: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_secs(5);

const START_TEXT: &str = "Welcome! This bot announces new ss.lv listings.\n\
To begin, use /monitor &lt;category&gt;, for example \
<code>/monitor https://www.ss.lv/msg/ru/transport/cars/honda</code> or \
<code>/monitor transport/cars/honda</code>.";

const HELP_TEXT: &str = "/start - start the bot\n\
/help - this help\n\
/monitor &lt;category&gt; - start monitoring a category (e.g. transport/cars/honda)\n\
/monitors - list monitored categories\n\
/stop &lt;category&gt; - stop monitoring a category\n\
/price &lt;category&gt; &lt;min&gt; [max] - set a price filter for a category \
(e.g. /price transport/cars/honda 5000 15000). Use 0 for no limit.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Monitor(String),
    Monitors,
    Stop(String),
    Price { path: String, min: f64, max: f64 },
}

/// Why a recognised command could not be parsed; carries the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage(pub &'static str);

impl Command {
    /// Parse a chat message.  `None` for plain text and unknown commands.
    pub fn parse(text: &str) -> Option<Result<Command, Usage>> {
        let mut words = text.split_whitespace();
        let head = words.next()?.strip_prefix('/')?;
        // Group chats address commands as `/monitor@SomeBot`.
        let name = head.split('@').next().unwrap_or(head);
        let args: Vec<&str> = words.collect();

        let command = match name {
            "start" => Ok(Command::Start),
            "help" => Ok(Command::Help),
            "monitors" => Ok(Command::Monitors),
            "monitor" => args
                .first()
                .map(|path| Command::Monitor(path.to_string()))
                .ok_or(Usage("Usage: /monitor &lt;category&gt;")),
            "stop" => args
                .first()
                .map(|path| Command::Stop(path.to_string()))
                .ok_or(Usage("Usage: /stop &lt;category&gt;")),
            "price" => Self::parse_price(&args),
            _ => return None,
        };
        Some(command)
    }

    fn parse_price(args: &[&str]) -> Result<Command, Usage> {
        const USAGE: Usage = Usage("Usage: /price &lt;category&gt; &lt;min&gt; [max]");
        let (path, min) = match args {
            [path, min, ..] => (path, min),
            _ => return Err(USAGE),
        };
        let number = |s: &str| s.parse::<f64>().map_err(|_| Usage("Invalid parameters."));
        let min = number(*min)?;
        let max = args.get(2).map(|s| number(*s)).transpose()?.unwrap_or(0.0);
        Ok(Command::Price {
            path: path.to_string(),
            min,
            max,
        })
    }
}

pub struct CommandHandler {
    engine: Arc<PollEngine>,
    subscriptions: Arc<SubscriptionStore>,
}

impl CommandHandler {
    pub fn new(engine: Arc<PollEngine>, subscriptions: Arc<SubscriptionStore>) -> Self {
        Self {
            engine,
            subscriptions,
        }
    }

    /// Handle one message; returns the reply, if any.
    pub async fn handle(&self, recipient: &str, text: &str) -> Option<String> {
        let command = match Command::parse(text)? {
            Ok(command) => command,
            Err(Usage(reply)) => return Some(reply.to_string()),
        };
        tracing::debug!(recipient, ?command, "handling command");

        let reply = match command {
            Command::Start => START_TEXT.to_string(),
            Command::Help => HELP_TEXT.to_string(),
            Command::Monitor(input) => self.monitor(recipient, &input).await,
            Command::Monitors => self.monitors(recipient).await,
            Command::Stop(input) => self.stop(recipient, &input).await,
            Command::Price { path, min, max } => self.price(recipient, &path, min, max).await,
        };
        Some(reply)
    }

    async fn monitor(&self, recipient: &str, input: &str) -> String {
        let path = match resolve_category_path(input) {
            Ok(path) => path,
            Err(e) => return format!("Invalid category path: {}", escape_html(&e.to_string())),
        };
        if self.subscriptions.is_subscribed(recipient, &path).await {
            return "You are already subscribed to this category.".to_string();
        }
        if !self.engine.feeds().validate_category(&path).await {
            return "Invalid category path (could not load its RSS feed from ss.lv). \
                Examples: <code>https://www.ss.lv/msg/ru/transport/cars/honda</code> or \
                <code>transport/cars/honda</code>."
                .to_string();
        }

        match self.engine.subscribe(recipient, &path).await {
            Ok(()) => format!("Monitoring started: <code>{}</code>", escape_html(&path)),
            Err(SubscribeError::Subscription(SubscriptionError::AlreadySubscribed(_))) => {
                "You are already subscribed to this category.".to_string()
            }
            Err(e) => {
                tracing::error!(recipient, category = %path, "subscribe failed: {e}");
                "Could not start monitoring, please try again later.".to_string()
            }
        }
    }

    async fn monitors(&self, recipient: &str) -> String {
        let categories = self.subscriptions.list_categories(recipient).await;
        if categories.is_empty() {
            return "You are not monitoring any categories. Use /monitor &lt;category&gt; to add one."
                .to_string();
        }
        let lines: Vec<String> = categories
            .iter()
            .map(|c| format!("- {}", escape_html(c)))
            .collect();
        format!("Monitored categories:\n{}", lines.join("\n"))
    }

    async fn stop(&self, recipient: &str, input: &str) -> String {
        let path = match resolve_category_path(input) {
            Ok(path) => path,
            Err(e) => return format!("Invalid category path: {}", escape_html(&e.to_string())),
        };
        match self.subscriptions.unsubscribe(recipient, &path).await {
            Ok(()) => format!("Monitoring stopped: <code>{}</code>", escape_html(&path)),
            Err(e) => self.rejection(recipient, &path, e),
        }
    }

    async fn price(&self, recipient: &str, input: &str, min: f64, max: f64) -> String {
        let path = match resolve_category_path(input) {
            Ok(path) => path,
            Err(e) => return format!("Invalid category path: {}", escape_html(&e.to_string())),
        };
        match self.subscriptions.set_filter(recipient, &path, min, max).await {
            Ok(()) => format!(
                "Price filter for <code>{}</code> set: {min} - {max}",
                escape_html(&path)
            ),
            Err(e) => self.rejection(recipient, &path, e),
        }
    }

    fn rejection(&self, recipient: &str, path: &str, error: SubscriptionError) -> String {
        match error {
            SubscriptionError::NotSubscribed(_) => {
                "You are not subscribed to this category.".to_string()
            }
            SubscriptionError::InvalidFilter { .. } => "Invalid price values: both must be \
                non-negative, and max must be at least min, or 0 for no limit."
                .to_string(),
            SubscriptionError::AlreadySubscribed(_) => {
                "You are already subscribed to this category.".to_string()
            }
            SubscriptionError::Persist(e) => {
                tracing::error!(recipient, category = %path, "failed to save subscriptions: {e:#}");
                "Could not save your settings, please try again later.".to_string()
            }
        }
    }
}

/// Long-poll Telegram for messages and answer commands until `shutdown`.
///
/// Each message is answered on its own task, so a slow `/monitor` (feed
/// validation plus bootstrap) never holds up other chats.  Answers still in
/// flight at shutdown are awaited.
pub async fn run(
    telegram: Arc<TelegramClient>,
    handler: Arc<CommandHandler>,
    shutdown: CancellationToken,
) {
    tracing::info!("command loop started");
    let transport: Arc<dyn Transport> = telegram.clone();
    let mut answers = JoinSet::new();
    let mut offset = 0;

    loop {
        while answers.try_join_next().is_some() {}

        let updates = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = telegram.get_updates(offset, LONG_POLL) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("getUpdates failed: {e}");
                let cancelled = tokio::select! {
                    _ = shutdown.cancelled() => true,
                    _ = tokio::time::sleep(RETRY_DELAY) => false,
                };
                if cancelled {
                    break;
                }
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let recipient = message.chat.id.to_string();
            answer(&mut answers, &handler, &transport, recipient, text);
        }
    }

    while answers.join_next().await.is_some() {}
    tracing::info!("command loop stopped");
}

/// Handle one message and send the reply on a task of `answers`.
fn answer(
    answers: &mut JoinSet<()>,
    handler: &Arc<CommandHandler>,
    transport: &Arc<dyn Transport>,
    recipient: String,
    text: String,
) {
    let handler = Arc::clone(handler);
    let transport = Arc::clone(transport);
    answers.spawn(async move {
        let Some(reply) = handler.handle(&recipient, &text).await else {
            return;
        };
        if let Err(e) = transport.send_text(&recipient, &reply).await {
            tracing::error!(recipient = %recipient, "failed to send reply: {e}");
        }
    });
}
