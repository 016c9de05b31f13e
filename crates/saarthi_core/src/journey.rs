//! crates/saarthi_core/src/journey.rs
//!
//! The Krishna Path journey: a four-step state machine that takes the user from
//! a welcome screen to an emotion, draws a random verse for it and records the
//! interaction.
//!
//! ```text
//! Welcome --begin--> EmotionSelection --select--> SlipDrawing --draw--> VerseDisplay
//! VerseDisplay --choose different emotion--> EmotionSelection
//! VerseDisplay --start over--> Welcome
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Emotion, NewInteraction, Verse};
use crate::ports::{KrishnaPathService, PortError};

/// The step the user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JourneyStep {
    #[default]
    Welcome,
    EmotionSelection,
    SlipDrawing,
    VerseDisplay,
}

/// Everything a screen needs to render the journey.
#[derive(Debug, Clone, Default)]
pub struct JourneyState {
    pub step: JourneyStep,
    pub selected_emotion: Option<Emotion>,
    pub selected_verse: Option<Verse>,
    pub is_drawing: bool,
    /// The error of the last failed draw, cleared when a new draw starts.
    pub last_error: Option<PortError>,
}

#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    #[error("A verse can only be drawn after choosing an emotion")]
    NotReady,
    #[error("A draw is already in progress")]
    AlreadyDrawing,
    #[error("Could not draw a verse: {0}")]
    Fetch(#[from] PortError),
}

/// One user's journey. Transitions that are not valid from the current step
/// return `false` and leave the state untouched.
pub struct Journey {
    service: Arc<dyn KrishnaPathService>,
    state: Mutex<JourneyState>,
}

impl Journey {
    pub fn new(service: Arc<dyn KrishnaPathService>) -> Self {
        Self {
            service,
            state: Mutex::new(JourneyState::default()),
        }
    }

    pub fn state(&self) -> JourneyState {
        self.lock().clone()
    }

    pub fn step(&self) -> JourneyStep {
        self.lock().step
    }

    /// The emotion list is only needed while the user is choosing.
    pub fn emotions_enabled(&self) -> bool {
        self.lock().step == JourneyStep::EmotionSelection
    }

    /// The slip count is only shown on the drawing step.
    pub fn verse_count_enabled(&self) -> bool {
        let state = self.lock();
        state.step == JourneyStep::SlipDrawing && state.selected_emotion.is_some()
    }

    pub fn begin(&self) -> bool {
        self.transition("begin", |state| {
            if state.step != JourneyStep::Welcome {
                return false;
            }
            state.step = JourneyStep::EmotionSelection;
            true
        })
    }

    pub fn select_emotion(&self, emotion: Emotion) -> bool {
        self.transition("select_emotion", move |state| {
            if state.step != JourneyStep::EmotionSelection {
                return false;
            }
            state.selected_emotion = Some(emotion);
            state.last_error = None;
            state.step = JourneyStep::SlipDrawing;
            true
        })
    }

    /// Back to the emotion list, keeping the emotion but dropping the verse.
    pub fn choose_different_emotion(&self) -> bool {
        self.transition("choose_different_emotion", |state| {
            if state.step != JourneyStep::VerseDisplay {
                return false;
            }
            state.selected_verse = None;
            state.step = JourneyStep::EmotionSelection;
            true
        })
    }

    pub fn start_over(&self) -> bool {
        self.transition("start_over", |state| {
            if state.step != JourneyStep::VerseDisplay {
                return false;
            }
            *state = JourneyState::default();
            true
        })
    }

    /// Draws a random verse for the selected emotion.
    ///
    /// On success the verse is stored, the interaction is recorded in the
    /// background and the journey moves to `VerseDisplay`. The recording is
    /// never awaited; its failure is only logged. On failure the journey stays
    /// on `SlipDrawing` with `last_error` set, and the user may try again.
    pub async fn draw(&self) -> Result<Verse, DrawError> {
        let (emotion, guard) = {
            let mut state = self.lock();
            if state.step != JourneyStep::SlipDrawing {
                return Err(DrawError::NotReady);
            }
            if state.is_drawing {
                return Err(DrawError::AlreadyDrawing);
            }
            let Some(emotion) = state.selected_emotion.clone() else {
                return Err(DrawError::NotReady);
            };
            state.is_drawing = true;
            state.last_error = None;
            (emotion, DrawGuard { journey: self, armed: true })
        };

        debug!(emotion = %emotion.name, "drawing a verse");
        let result = self
            .service
            .random_verse(emotion.id)
            .await
            .and_then(|verse| {
                if verse.emotion_id == emotion.id {
                    Ok(verse)
                } else {
                    Err(PortError::Unexpected(format!(
                        "verse {} belongs to emotion {}, not {}",
                        verse.id, verse.emotion_id, emotion.id
                    )))
                }
            });

        guard.disarm();
        let mut state = self.lock();
        state.is_drawing = false;

        match result {
            Ok(verse) => {
                state.selected_verse = Some(verse.clone());
                self.track(&emotion, &verse);
                state.step = JourneyStep::VerseDisplay;
                info!(emotion = %emotion.name, verse_id = %verse.id, "verse drawn");
                Ok(verse)
            }
            Err(e) => {
                warn!(emotion = %emotion.name, error = %e, "verse draw failed");
                state.last_error = Some(e.clone());
                Err(DrawError::Fetch(e))
            }
        }
    }

    /// Fire-and-forget interaction record with a fresh, time-ordered session id.
    fn track(&self, emotion: &Emotion, verse: &Verse) {
        let service = self.service.clone();
        let interaction = NewInteraction {
            emotion_id: emotion.id,
            verse_id: verse.id,
            session_id: Uuid::now_v7().to_string(),
        };
        tokio::spawn(async move {
            let verse_id = interaction.verse_id;
            match service.track_interaction(interaction).await {
                Ok(()) => debug!(%verse_id, "interaction recorded"),
                Err(e) => warn!(%verse_id, error = %e, "failed to record interaction"),
            }
        });
    }

    fn transition(&self, name: &str, apply: impl FnOnce(&mut JourneyState) -> bool) -> bool {
        let mut state = self.lock();
        let from = state.step;
        let applied = apply(&mut state);
        if applied {
            debug!(action = name, ?from, to = ?state.step, "journey transition");
        } else {
            debug!(action = name, step = ?from, "ignored journey action");
        }
        applied
    }

    fn lock(&self) -> MutexGuard<'_, JourneyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `is_drawing` if a draw is dropped before its request completes.
struct DrawGuard<'a> {
    journey: &'a Journey,
    armed: bool,
}

impl DrawGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DrawGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.journey.lock().is_drawing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    use crate::ports::PortResult;

    #[derive(Clone, Copy, PartialEq)]
    enum Tracking {
        Succeeds,
        Fails,
        Hangs,
    }

    struct FakeKrishnaPath {
        verses: HashMap<Uuid, Vec<Verse>>,
        tracking: Tracking,
        recorded: mpsc::UnboundedSender<NewInteraction>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl KrishnaPathService for FakeKrishnaPath {
        async fn list_emotions(&self) -> PortResult<Vec<Emotion>> {
            Ok(Vec::new())
        }

        async fn random_verse(&self, emotion_id: Uuid) -> PortResult<Verse> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.verses
                .get(&emotion_id)
                .and_then(|verses| verses.first().cloned())
                .ok_or_else(|| PortError::NotFound(format!("no verses for {}", emotion_id)))
        }

        async fn verse_count(&self, emotion_id: Uuid) -> PortResult<u64> {
            Ok(self.verses.get(&emotion_id).map_or(0, |v| v.len() as u64))
        }

        async fn track_interaction(&self, interaction: NewInteraction) -> PortResult<()> {
            match self.tracking {
                Tracking::Succeeds => {
                    let _ = self.recorded.send(interaction);
                    Ok(())
                }
                Tracking::Fails => {
                    let _ = self.recorded.send(interaction);
                    Err(PortError::Http {
                        status: 500,
                        body: "boom".into(),
                    })
                }
                Tracking::Hangs => std::future::pending().await,
            }
        }
    }

    fn emotion(name: &str) -> Emotion {
        Emotion {
            id: Uuid::new_v4(),
            name: name.to_string(),
            display_name: name.to_uppercase(),
            description: None,
            color: "#f97316".to_string(),
            is_active: true,
            created_at: None,
        }
    }

    fn verse_for(emotion: &Emotion) -> Verse {
        Verse {
            id: Uuid::new_v4(),
            emotion_id: emotion.id,
            sanskrit: "योगस्थः कुरु कर्माणि".into(),
            hindi: "योग में स्थित होकर कर्म करो".into(),
            english: "Perform your duty established in yoga".into(),
            explanation: "Steadiness of mind in success and failure.".into(),
            chapter: Some("2".into()),
            verse_number: Some("48".into()),
            is_active: true,
        }
    }

    struct Fixture {
        journey: Arc<Journey>,
        recorded: mpsc::UnboundedReceiver<NewInteraction>,
    }

    fn fixture(verses: Vec<Verse>, tracking: Tracking, gate: Option<Arc<Notify>>) -> Fixture {
        let mut by_emotion: HashMap<Uuid, Vec<Verse>> = HashMap::new();
        for verse in verses {
            by_emotion.entry(verse.emotion_id).or_default().push(verse);
        }
        fixture_from(by_emotion, tracking, gate)
    }

    fn fixture_from(
        verses: HashMap<Uuid, Vec<Verse>>,
        tracking: Tracking,
        gate: Option<Arc<Notify>>,
    ) -> Fixture {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = FakeKrishnaPath {
            verses,
            tracking,
            recorded: tx,
            gate,
        };
        Fixture {
            journey: Arc::new(Journey::new(Arc::new(service))),
            recorded: rx,
        }
    }

    #[tokio::test]
    async fn welcome_only_accepts_begin() {
        let calm = emotion("peace");
        let f = fixture(vec![verse_for(&calm)], Tracking::Succeeds, None);

        assert!(!f.journey.select_emotion(calm.clone()));
        assert!(!f.journey.choose_different_emotion());
        assert!(!f.journey.start_over());
        assert!(matches!(f.journey.draw().await, Err(DrawError::NotReady)));

        let state = f.journey.state();
        assert_eq!(state.step, JourneyStep::Welcome);
        assert!(state.selected_emotion.is_none());

        assert!(f.journey.begin());
        assert_eq!(f.journey.step(), JourneyStep::EmotionSelection);
        assert!(!f.journey.begin());
    }

    #[tokio::test]
    async fn query_gates_follow_the_step() {
        let calm = emotion("peace");
        let f = fixture(vec![], Tracking::Succeeds, None);

        assert!(!f.journey.emotions_enabled());
        f.journey.begin();
        assert!(f.journey.emotions_enabled());
        assert!(!f.journey.verse_count_enabled());
        f.journey.select_emotion(calm);
        assert!(!f.journey.emotions_enabled());
        assert!(f.journey.verse_count_enabled());
    }

    #[tokio::test]
    async fn successful_draw_shows_the_verse_and_tracks_once() {
        let anxious = emotion("anxious");
        let verse = verse_for(&anxious);
        let mut f = fixture(vec![verse.clone()], Tracking::Succeeds, None);

        f.journey.begin();
        f.journey.select_emotion(anxious.clone());
        let drawn = f.journey.draw().await.unwrap();

        assert_eq!(drawn.emotion_id, anxious.id);
        let state = f.journey.state();
        assert_eq!(state.step, JourneyStep::VerseDisplay);
        assert_eq!(state.selected_verse.as_ref(), Some(&verse));
        assert!(!state.is_drawing);

        let record = tokio::time::timeout(Duration::from_secs(1), f.recorded.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.emotion_id, anxious.id);
        assert_eq!(record.verse_id, verse.id);
        assert!(Uuid::parse_str(&record.session_id).is_ok());

        tokio::task::yield_now().await;
        assert!(f.recorded.try_recv().is_err());
    }

    #[tokio::test]
    async fn emotion_without_verses_stays_on_slip_drawing() {
        let lonely = emotion("lonely");
        let mut f = fixture(vec![], Tracking::Succeeds, None);

        f.journey.begin();
        f.journey.select_emotion(lonely.clone());
        let err = f.journey.draw().await.unwrap_err();

        assert!(matches!(err, DrawError::Fetch(PortError::NotFound(_))));
        let state = f.journey.state();
        assert_eq!(state.step, JourneyStep::SlipDrawing);
        assert_eq!(state.selected_emotion.map(|e| e.id), Some(lonely.id));
        assert!(state.selected_verse.is_none());
        assert!(!state.is_drawing);
        assert!(matches!(state.last_error, Some(PortError::NotFound(_))));

        tokio::task::yield_now().await;
        assert!(f.recorded.try_recv().is_err());
    }

    #[tokio::test]
    async fn tracking_failure_does_not_undo_the_draw() {
        let angry = emotion("angry");
        let mut f = fixture(vec![verse_for(&angry)], Tracking::Fails, None);

        f.journey.begin();
        f.journey.select_emotion(angry);
        assert!(f.journey.draw().await.is_ok());

        tokio::time::timeout(Duration::from_secs(1), f.recorded.recv())
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(f.journey.step(), JourneyStep::VerseDisplay);
    }

    #[tokio::test]
    async fn hanging_tracker_does_not_block_the_draw() {
        let sad = emotion("sad");
        let f = fixture(vec![verse_for(&sad)], Tracking::Hangs, None);

        f.journey.begin();
        f.journey.select_emotion(sad);
        let drawn = tokio::time::timeout(Duration::from_secs(1), f.journey.draw()).await;

        assert!(matches!(drawn, Ok(Ok(_))));
        assert_eq!(f.journey.step(), JourneyStep::VerseDisplay);
    }

    #[tokio::test]
    async fn second_draw_while_pending_is_rejected() {
        let happy = emotion("happy");
        let gate = Arc::new(Notify::new());
        let f = fixture(vec![verse_for(&happy)], Tracking::Succeeds, Some(gate.clone()));

        f.journey.begin();
        f.journey.select_emotion(happy);
        let journey = f.journey.clone();
        let first = tokio::spawn(async move { journey.draw().await });
        tokio::task::yield_now().await;

        assert!(f.journey.state().is_drawing);
        assert!(matches!(f.journey.draw().await, Err(DrawError::AlreadyDrawing)));

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(f.journey.step(), JourneyStep::VerseDisplay);
    }

    #[tokio::test]
    async fn abandoned_draw_releases_the_guard() {
        let happy = emotion("happy");
        let gate = Arc::new(Notify::new());
        let f = fixture(vec![verse_for(&happy)], Tracking::Succeeds, Some(gate.clone()));

        f.journey.begin();
        f.journey.select_emotion(happy);
        let abandoned = tokio::time::timeout(Duration::from_millis(20), f.journey.draw()).await;
        assert!(abandoned.is_err());
        assert!(!f.journey.state().is_drawing);

        gate.notify_one();
        assert!(f.journey.draw().await.is_ok());
    }

    #[tokio::test]
    async fn verse_of_another_emotion_is_rejected() {
        let peace = emotion("peace");
        let other = emotion("protection");
        // Served for `peace`, but claims to belong to `protection`.
        let mut verses = HashMap::new();
        verses.insert(peace.id, vec![verse_for(&other)]);
        let f = fixture_from(verses, Tracking::Succeeds, None);

        f.journey.begin();
        f.journey.select_emotion(peace);
        let err = f.journey.draw().await.unwrap_err();
        assert!(matches!(err, DrawError::Fetch(PortError::Unexpected(_))));
        assert_eq!(f.journey.step(), JourneyStep::SlipDrawing);
    }

    #[tokio::test]
    async fn leaving_verse_display() {
        let lazy = emotion("lazy");
        let f = fixture(vec![verse_for(&lazy)], Tracking::Succeeds, None);

        f.journey.begin();
        f.journey.select_emotion(lazy.clone());
        f.journey.draw().await.unwrap();

        assert!(f.journey.choose_different_emotion());
        let state = f.journey.state();
        assert_eq!(state.step, JourneyStep::EmotionSelection);
        assert!(state.selected_verse.is_none());
        assert_eq!(state.selected_emotion.map(|e| e.id), Some(lazy.id));

        f.journey.select_emotion(lazy);
        f.journey.draw().await.unwrap();
        assert!(f.journey.start_over());
        let state = f.journey.state();
        assert_eq!(state.step, JourneyStep::Welcome);
        assert!(state.selected_emotion.is_none());
        assert!(state.selected_verse.is_none());
    }

    #[tokio::test]
    async fn every_draw_gets_its_own_session_id() {
        let peace = emotion("peace");
        let mut f = fixture(vec![verse_for(&peace)], Tracking::Succeeds, None);

        f.journey.begin();
        f.journey.select_emotion(peace.clone());
        f.journey.draw().await.unwrap();
        f.journey.choose_different_emotion();
        f.journey.select_emotion(peace);
        f.journey.draw().await.unwrap();

        let first = f.recorded.recv().await.unwrap();
        let second = f.recorded.recv().await.unwrap();
        assert_ne!(first.session_id, second.session_id);
    }
}
