//! services/app/src/screens/chat.rs
//!
//! The chat panel. Messages are polled every two seconds, in the background
//! too, and only for a logged-in user. Sending a message is a mutation that
//! invalidates the message list so the exchange shows up without waiting for
//! the next tick.

use saarthi_core::domain::{ChatExchange, ChatMessage};
use saarthi_core::{keys, PortResult, QueryOptions, QueryState, Subscription};
use std::collections::HashSet;
use std::io::Write;
use tokio::io::AsyncBufRead;
use tracing::info;
use uuid::Uuid;

use super::{is_quit, AppState, Console};
use crate::error::AppError;

/// Trims a chat message, rejecting one that is empty.
pub fn validate_message(content: &str) -> Result<&str, AppError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }
    Ok(content)
}

pub fn render_message(message: &ChatMessage) -> String {
    let speaker = if message.is_ai_response {
        "Saarthi"
    } else {
        "You"
    };
    format!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        speaker,
        message.content
    )
}

pub fn subscribe(state: &AppState, logged_in: bool) -> Subscription<Vec<ChatMessage>> {
    let chat = state.chat.clone();
    state.cache.subscribe(
        keys::chat_messages(),
        move || {
            let chat = chat.clone();
            async move { chat.list_messages().await }
        },
        QueryOptions::default()
            .enabled(logged_in)
            .refetch_every(state.config.chat_poll_interval)
            .in_background(true),
    )
}

/// Sends `content` and invalidates the message list on success.
pub async fn send(state: &AppState, content: &str) -> Result<ChatExchange, AppError> {
    let content = validate_message(content)?.to_string();
    let chat = state.chat.clone();
    let exchange: PortResult<ChatExchange> = state
        .cache
        .mutate(
            async move { chat.send_message(&content).await },
            &[keys::chat_messages()],
        )
        .await;
    Ok(exchange?)
}

/// Remembers which messages were printed; new ones print oldest first.
struct Transcript {
    seen: HashSet<Uuid>,
}

impl Transcript {
    fn print_new<R, W>(
        &mut self,
        console: &mut Console<R, W>,
        state: &QueryState<Vec<ChatMessage>>,
    ) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let Some(messages) = &state.data else {
            return Ok(());
        };
        let mut fresh: Vec<&ChatMessage> = messages
            .iter()
            .filter(|m| !self.seen.contains(&m.id))
            .collect();
        fresh.sort_by_key(|m| m.created_at);
        for message in fresh {
            self.seen.insert(message.id);
            console.say(render_message(message))?;
        }
        Ok(())
    }
}

pub async fn run<R, W>(state: &AppState, console: &mut Console<R, W>) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let logged_in = state.is_logged_in().await?;
    if !logged_in {
        console.say("Please sign in to start your journey with our AI spiritual guide.")?;
        console.say("Run `saarthi login <username>` first.")?;
        return Ok(());
    }

    let mut subscription = subscribe(state, logged_in);
    let mut transcript = Transcript {
        seen: HashSet::new(),
    };

    console.say("Chat with Saarthi. Type a message and press Enter, or /quit to leave.")?;
    let initial = subscription.settled().await;
    if let Some(e) = &initial.error {
        console.say(format!("Could not load messages: {}", e))?;
    }
    transcript.print_new(console, &initial)?;

    loop {
        tokio::select! {
            update = subscription.changed() => match update {
                Some(current) => transcript.print_new(console, &current)?,
                None => break,
            },
            line = console.read_line() => {
                let Some(line) = line? else { break };
                if is_quit(&line) {
                    break;
                }
                match send(state, &line).await {
                    Ok(exchange) => {
                        info!(message = %exchange.user_message.id, "chat message sent");
                        transcript.seen.insert(exchange.user_message.id);
                        if transcript.seen.insert(exchange.ai_message.id) {
                            console.say(render_message(&exchange.ai_message))?;
                        }
                    }
                    Err(AppError::Validation(_)) => {}
                    Err(e) => console.say(format!("Failed to send message: {}", e))?,
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screens::testing::{console, harness, message, output, FakeBackend};
    use saarthi_core::domain::AuthToken;
    use saarthi_core::TokenStore;

    async fn log_in(tokens: &dyn TokenStore) {
        tokens
            .save(&AuthToken {
                access_token: "token".to_string(),
                token_type: "bearer".to_string(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn blank_messages_are_rejected() {
        assert!(matches!(validate_message("   \n"), Err(AppError::Validation(_))));
        assert_eq!(validate_message("  peace  ").unwrap(), "peace");
    }

    #[test]
    fn renders_the_speaker() {
        assert!(render_message(&message("How do I find calm?", false)).contains("You: How do I find calm?"));
        assert!(render_message(&message("Breathe.", true)).contains("Saarthi: Breathe."));
    }

    #[tokio::test]
    async fn logged_out_user_is_asked_to_sign_in() {
        let h = harness(FakeBackend::default());
        let mut io = console("hello\n");

        run(&h.state, &mut io).await.unwrap();

        assert!(output(io).contains("Please sign in"));
        assert!(h.backend.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_subscription_does_not_poll() {
        let h = harness(FakeBackend::default());
        let subscription = subscribe(&h.state, false);

        assert!(!subscription.is_enabled());
        assert_eq!(subscription.state().status, saarthi_core::QueryStatus::Idle);
    }

    #[tokio::test]
    async fn history_and_replies_are_printed_once() {
        let backend = FakeBackend::default();
        backend
            .messages
            .lock()
            .unwrap()
            .push(message("Earlier question", false));
        let h = harness(backend);
        log_in(h.tokens.as_ref()).await;
        let mut io = console("What is dharma?\n   \n/quit\n");

        run(&h.state, &mut io).await.unwrap();

        let printed = output(io);
        assert_eq!(printed.matches("Earlier question").count(), 1);
        assert_eq!(printed.matches("Saarthi: Reflect on: What is dharma?").count(), 1);
        assert_eq!(h.backend.messages.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sending_invalidates_the_message_list() {
        let h = harness(FakeBackend::default());
        let mut subscription = subscribe(&h.state, true);
        assert_eq!(subscription.settled().await.data.map(|m| m.len()), Some(0));

        send(&h.state, "Guide me").await.unwrap();

        let refreshed = subscription.settled().await;
        assert_eq!(refreshed.data.map(|m| m.len()), Some(2));
    }

    #[tokio::test]
    async fn empty_message_is_not_sent() {
        let h = harness(FakeBackend::default());
        let err = send(&h.state, "  ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.backend.messages.lock().unwrap().is_empty());
    }
}
