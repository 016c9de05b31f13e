//! services/app/src/screens/daily.rs

use chrono::{Local, NaiveDate};
use saarthi_core::domain::WisdomCard;
use saarthi_core::DailyCards;
use std::io::Write;
use tokio::io::AsyncBufRead;

use super::{AppState, Console};
use crate::error::AppError;

pub fn render_card(card: &WisdomCard) -> String {
    format!(
        "~ Today's Wisdom Card ~\n{} [{:?}]\n\n\"{}\"\n    - {}\n\nWisdom\n  {}\n\nGuidance for today\n  {}",
        card.title, card.theme, card.verse, card.chapter, card.wisdom, card.guidance
    )
}

/// Shows the card of `date`, drawing one when none is stored for it yet.
/// `draw_new` replaces today's card.
pub async fn run_on<R, W>(
    state: &AppState,
    console: &mut Console<R, W>,
    date: NaiveDate,
    draw_new: bool,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let cards = DailyCards::new(state.cards.clone());
    let card = if draw_new {
        cards.draw_new(date).await?
    } else {
        cards.draw(date).await?
    };
    console.say(render_card(&card))?;
    Ok(())
}

pub async fn run<R, W>(
    state: &AppState,
    console: &mut Console<R, W>,
    draw_new: bool,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    run_on(state, console, Local::now().date_naive(), draw_new).await
}
