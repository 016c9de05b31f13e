//! crates/saarthi_core/src/daily_card.rs
//!
//! The once-per-day wisdom card: a random card from a fixed deck, remembered
//! for the rest of the calendar day. No server round-trip is involved.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{CardTheme, DailyDraw, WisdomCard};
use crate::ports::{CardStore, PortError, PortResult};

struct CardText {
    title: &'static str,
    verse: &'static str,
    wisdom: &'static str,
    guidance: &'static str,
    theme: CardTheme,
    chapter: &'static str,
}

const DECK: [CardText; 8] = [
    CardText {
        title: "Transform Anger into Understanding",
        verse: "Anger leads to delusion, delusion to loss of memory, loss of memory to destruction of intelligence, and destruction of intelligence leads to ruin.",
        wisdom: "When you feel anger rising, pause and breathe. See it as energy that can be redirected toward understanding and compassion.",
        guidance: "Today, when faced with frustration, ask yourself: 'What is this emotion teaching me?' Channel that energy into wisdom rather than reaction.",
        theme: CardTheme::Strength,
        chapter: "Bhagavad Gita 2.63",
    },
    CardText {
        title: "Embrace Your Dharma",
        verse: "Better is one's own dharma, though imperfectly performed, than the dharma of another well performed.",
        wisdom: "Your authentic path, however challenging, leads to greater fulfillment than copying another's journey.",
        guidance: "Reflect on what feels most authentic to you today. Honor your unique gifts and responsibilities, even if they seem difficult.",
        theme: CardTheme::Clarity,
        chapter: "Bhagavad Gita 3.35",
    },
    CardText {
        title: "Find Peace in Detachment",
        verse: "You have the right to perform your actions, but you are not entitled to the fruits of action.",
        wisdom: "Peace comes from doing your best while releasing attachment to specific outcomes.",
        guidance: "Focus on the quality of your effort today, not the results. Give your best and trust the process.",
        theme: CardTheme::Peace,
        chapter: "Bhagavad Gita 2.47",
    },
    CardText {
        title: "Courage in Uncertainty",
        verse: "Now I am become Death, the destroyer of worlds. Yet action must be taken in the face of duty.",
        wisdom: "Even in the face of great uncertainty, we must act with courage when duty calls.",
        guidance: "What important action have you been avoiding? Today, take one small step forward despite your fears.",
        theme: CardTheme::Courage,
        chapter: "Bhagavad Gita 11.32",
    },
    CardText {
        title: "The Power of Equanimity",
        verse: "One who is not disturbed by happiness and distress and is steady in both is certainly eligible for liberation.",
        wisdom: "True strength lies in maintaining inner balance regardless of external circumstances.",
        guidance: "Notice your reactions to today's ups and downs. Practice maintaining your center through both pleasant and challenging moments.",
        theme: CardTheme::Wisdom,
        chapter: "Bhagavad Gita 2.15",
    },
    CardText {
        title: "Universal Love",
        verse: "I am the same to all beings; none is hateful or dear to me. But those who worship me with devotion are in me, and I am in them.",
        wisdom: "Divine love flows equally to all. When we open our hearts, we become vessels for this universal compassion.",
        guidance: "Practice seeing the divine spark in everyone you meet today. Send love even to those who challenge you.",
        theme: CardTheme::Love,
        chapter: "Bhagavad Gita 9.29",
    },
    CardText {
        title: "Mindful Action",
        verse: "Whatever you do, whatever you eat, whatever you offer in sacrifice, whatever you give away, whatever austerities you practice, do that as an offering.",
        wisdom: "Every action becomes sacred when performed with awareness and dedication to something greater than yourself.",
        guidance: "Transform routine tasks today into mindful offerings. Approach each activity with presence and intention.",
        theme: CardTheme::Wisdom,
        chapter: "Bhagavad Gita 9.27",
    },
    CardText {
        title: "Inner Strength",
        verse: "The mind is restless, turbulent, obstinate and very strong. To subdue it is more difficult than controlling the wind.",
        wisdom: "Acknowledge the challenge of mental discipline while persistently training your mind with patience and practice.",
        guidance: "When your mind feels scattered today, return to your breath. Each moment of awareness strengthens your inner discipline.",
        theme: CardTheme::Strength,
        chapter: "Bhagavad Gita 6.34",
    },
];

/// The full deck, ids starting at 1.
pub fn deck() -> Vec<WisdomCard> {
    DECK.iter()
        .zip(1..)
        .map(|(text, id)| WisdomCard {
            id,
            title: text.title.to_string(),
            verse: text.verse.to_string(),
            wisdom: text.wisdom.to_string(),
            guidance: text.guidance.to_string(),
            theme: text.theme,
            chapter: text.chapter.to_string(),
        })
        .collect()
}

/// Date-keyed memo over a `CardStore`.
pub struct DailyCards {
    store: Arc<dyn CardStore>,
}

impl DailyCards {
    pub fn new(store: Arc<dyn CardStore>) -> Self {
        Self { store }
    }

    /// The card already drawn on `date`, if any.
    pub async fn today(&self, date: NaiveDate) -> PortResult<Option<WisdomCard>> {
        Ok(self
            .store
            .load()
            .await?
            .filter(|draw| draw.date == date)
            .map(|draw| draw.card))
    }

    /// Returns the card of `date`, drawing and saving one if none exists yet.
    pub async fn draw(&self, date: NaiveDate) -> PortResult<WisdomCard> {
        if let Some(card) = self.today(date).await? {
            debug!(%date, card = card.id, "card already drawn today");
            return Ok(card);
        }

        let card = deck()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| PortError::Unexpected("the deck is empty".to_string()))?;
        self.store
            .save(&DailyDraw {
                date,
                card: card.clone(),
            })
            .await?;
        info!(%date, card = card.id, title = %card.title, "drew today's card");
        Ok(card)
    }

    /// Forgets today's card and draws another.
    pub async fn draw_new(&self, date: NaiveDate) -> PortResult<WisdomCard> {
        self.store.clear().await?;
        self.draw(date).await
    }
}
