//! services/app/src/screens/thought.rs
//!
//! Thought of the day: polled every minute, even while unfocused, and considered
//! fresh for thirty seconds. When nothing can be loaded a fixed quote is shown.

use saarthi_core::domain::Thought;
use saarthi_core::{keys, QueryOptions, QueryState, Subscription};
use std::io::Write;
use tokio::io::AsyncBufRead;

use super::{is_quit, AppState, Console};
use crate::config::Config;
use crate::error::AppError;

pub const FALLBACK_QUOTE: &str = "The mind is everything. What you think you become.";
pub const FALLBACK_AUTHOR: &str = "Buddha";

pub fn options(config: &Config) -> QueryOptions {
    QueryOptions::default()
        .refetch_every(config.thought_poll_interval)
        .in_background(true)
        .stale_time(config.thought_stale_time)
}

pub fn subscribe(state: &AppState) -> Subscription<Thought> {
    let thoughts = state.thoughts.clone();
    state.cache.subscribe(
        keys::current_thought(),
        move || {
            let thoughts = thoughts.clone();
            async move { thoughts.current_thought().await }
        },
        options(&state.config),
    )
}

pub fn render(state: &QueryState<Thought>) -> String {
    let mut out = String::from("~ Thought of the Day ~\n");
    match &state.data {
        Some(thought) => {
            out.push_str(&format!("\"{}\"", thought.content));
            if let Some(author) = &thought.author {
                out.push_str(&format!("\n    - {}", author));
            }
            if let Some(category) = &thought.category {
                out.push_str(&format!("\n    [{}]", category));
            }
        }
        None if state.is_loading() => out.push_str("Loading..."),
        None => out.push_str(&format!("\"{}\"\n    - {}", FALLBACK_QUOTE, FALLBACK_AUTHOR)),
    }
    out
}

/// Prints the current thought. With `watch`, keeps printing each new one until
/// the user quits or input ends.
pub async fn run<R, W>(
    state: &AppState,
    console: &mut Console<R, W>,
    watch: bool,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut subscription = subscribe(state);
    let mut shown = render(&subscription.settled().await);
    console.say(&shown)?;
    if !watch {
        return Ok(());
    }

    console.say("Watching for a new thought. Enter q to stop.")?;
    loop {
        tokio::select! {
            update = subscription.changed() => match update {
                Some(current) if !current.is_fetching => {
                    let rendered = render(&current);
                    if rendered != shown {
                        console.say(&rendered)?;
                        shown = rendered;
                    }
                }
                Some(_) => {}
                None => break,
            },
            line = console.read_line() => match line? {
                Some(line) if !is_quit(&line) => {}
                _ => break,
            },
        }
    }
    Ok(())
}
