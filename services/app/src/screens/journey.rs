//! services/app/src/screens/journey.rs
//!
//! The Krishna Path screen. Drives a `Journey` from the terminal; the emotion
//! list and the slip count are cached queries gated on the journey's step.

use saarthi_core::domain::{Emotion, Verse};
use saarthi_core::{
    keys, DrawError, Journey, JourneyStep, PortError, QueryOptions, Subscription,
};
use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use uuid::Uuid;

use super::{is_quit, AppState, Console};
use crate::error::AppError;

const WELCOME: &str = "\
~ Krishna's Path ~
Choose your current emotion, draw a sacred slip, and receive personalized
guidance from the Bhagavad Gita.";

const NO_VERSES: &str = "\
No verses available for this emotion yet.
Please try another emotion or contact the administrator.";

/// Emotions do not change during a session.
const EMOTIONS_STALE_TIME: Duration = Duration::from_secs(300);

/// The count comes from the server; the row of slips is capped.
const MAX_SLIPS_SHOWN: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

//=========================================================================================
// Queries
//=========================================================================================

pub fn emotions(state: &AppState, enabled: bool) -> Subscription<Vec<Emotion>> {
    let service = state.krishna_path.clone();
    state.cache.subscribe(
        keys::emotions(),
        move || {
            let service = service.clone();
            async move { service.list_emotions().await }
        },
        QueryOptions::default()
            .enabled(enabled)
            .stale_time(EMOTIONS_STALE_TIME),
    )
}

pub fn verse_count(state: &AppState, emotion_id: Uuid, enabled: bool) -> Subscription<u64> {
    let service = state.krishna_path.clone();
    state.cache.subscribe(
        keys::verse_count(Some(emotion_id)),
        move || {
            let service = service.clone();
            async move { service.verse_count(emotion_id).await }
        },
        QueryOptions::default().enabled(enabled),
    )
}

//=========================================================================================
// Rendering
//=========================================================================================

pub fn render_emotions(emotions: &[Emotion]) -> String {
    let mut out = String::from("How are you feeling right now?\n");
    for (index, emotion) in emotions.iter().enumerate() {
        out.push_str(&format!("  {}. {}", index + 1, emotion.display_name));
        if let Some(description) = &emotion.description {
            out.push_str(&format!(" - {}", description));
        }
        out.push('\n');
    }
    out
}

pub fn render_slips(emotion: &Emotion, count: Option<u64>) -> String {
    let mut out = format!(
        "Draw Your Sacred Slip\nYou have chosen: {}\n",
        emotion.display_name
    );
    match count {
        Some(0) => out.push_str(NO_VERSES),
        Some(n) => {
            out.push_str(&format!(
                "Take a moment to center yourself. {} sacred slips await; choose one to receive Krishna's guidance.\n",
                n
            ));
            let shown = n.min(MAX_SLIPS_SHOWN) as usize;
            out.push_str("[*] ".repeat(shown).trim_end());
            if n > MAX_SLIPS_SHOWN {
                out.push_str(" ...");
            }
        }
        None => out.push_str("Take a moment to center yourself."),
    }
    out
}

pub fn render_verse(verse: &Verse, emotion: Option<&Emotion>) -> String {
    let mut out = String::from("Krishna's Wisdom");
    if let Some(reference) = verse.reference() {
        out.push_str(&format!(" ({})", reference));
    }
    if let Some(emotion) = emotion {
        out.push_str(&format!(" for {}", emotion.display_name));
    }
    out.push_str(&format!(
        "\n\nSanskrit (Original)\n  {}\n\nHindi\n  {}\n\nEnglish Translation\n  {}\n\nWisdom for Your Journey\n  {}",
        verse.sanskrit, verse.hindi, verse.english, verse.explanation
    ));
    out
}

/// A 1-based menu choice.
pub fn parse_choice(line: &str, len: usize) -> Option<usize> {
    match line.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

//=========================================================================================
// Driver
//=========================================================================================

pub async fn run<R, W>(state: &AppState, console: &mut Console<R, W>) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let journey = Journey::new(state.krishna_path.clone());
    loop {
        let flow = match journey.step() {
            JourneyStep::Welcome => welcome(&journey, console).await?,
            JourneyStep::EmotionSelection => choose_emotion(state, &journey, console).await?,
            JourneyStep::SlipDrawing => draw_slip(state, &journey, console).await?,
            JourneyStep::VerseDisplay => reflect(&journey, console).await?,
        };
        if flow == Flow::Quit {
            return Ok(());
        }
    }
}

async fn welcome<R, W>(journey: &Journey, console: &mut Console<R, W>) -> Result<Flow, AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    console.say(WELCOME)?;
    match console.prompt("Press Enter to begin your journey (q to quit):").await? {
        Some(line) if !is_quit(&line) => {
            journey.begin();
            Ok(Flow::Continue)
        }
        _ => Ok(Flow::Quit),
    }
}

async fn choose_emotion<R, W>(
    state: &AppState,
    journey: &Journey,
    console: &mut Console<R, W>,
) -> Result<Flow, AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut subscription = emotions(state, journey.emotions_enabled());
    let mut current = subscription.settled().await;
    let list = loop {
        if let Some(list) = current.data.clone().filter(|list| !list.is_empty()) {
            break list;
        }
        match &current.error {
            Some(e) => console.say(format!("Could not load emotions: {}", e))?,
            None => console.say("No emotions are available yet.")?,
        }
        // Retry on the same subscription: one request per retry.
        match console.prompt("Press Enter to retry (q to quit):").await? {
            Some(line) if !is_quit(&line) => current = subscription.refetch().await,
            _ => return Ok(Flow::Quit),
        }
    };

    console.say(render_emotions(&list))?;
    let label = format!("Choose an emotion (1-{}, q to quit):", list.len());
    loop {
        let Some(line) = console.prompt(&label).await? else {
            return Ok(Flow::Quit);
        };
        if is_quit(&line) {
            return Ok(Flow::Quit);
        }
        match parse_choice(&line, list.len()) {
            Some(index) => {
                journey.select_emotion(list[index].clone());
                return Ok(Flow::Continue);
            }
            None => console.say(format!("Please enter a number between 1 and {}.", list.len()))?,
        }
    }
}

async fn draw_slip<R, W>(
    state: &AppState,
    journey: &Journey,
    console: &mut Console<R, W>,
) -> Result<Flow, AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let Some(emotion) = journey.state().selected_emotion else {
        return Err(AppError::Internal("slip drawing without an emotion".to_string()));
    };
    let mut count = verse_count(state, emotion.id, journey.verse_count_enabled());
    let available = count.settled().await.data.map(|n| *n);
    console.say(render_slips(&emotion, available))?;

    match console.prompt("Press Enter to draw a slip (q to quit):").await? {
        Some(line) if !is_quit(&line) => {}
        _ => return Ok(Flow::Quit),
    }
    match journey.draw().await {
        Ok(_) => {}
        Err(DrawError::Fetch(PortError::NotFound(_))) => console.say(NO_VERSES)?,
        Err(e) => console.say(e)?,
    }
    Ok(Flow::Continue)
}

async fn reflect<R, W>(journey: &Journey, console: &mut Console<R, W>) -> Result<Flow, AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let current = journey.state();
    if let Some(verse) = &current.selected_verse {
        console.say(render_verse(verse, current.selected_emotion.as_ref()))?;
    }
    loop {
        let Some(line) = console
            .prompt("[d] choose a different emotion, [s] start over, [q] quit:")
            .await?
        else {
            return Ok(Flow::Quit);
        };
        match line.trim() {
            "d" => {
                journey.choose_different_emotion();
                return Ok(Flow::Continue);
            }
            "s" => {
                journey.start_over();
                return Ok(Flow::Continue);
            }
            other if is_quit(other) => return Ok(Flow::Quit),
            _ => console.say("Please enter d, s or q.")?,
        }
    }
}
