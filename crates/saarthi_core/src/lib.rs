pub mod daily_card;
pub mod domain;
pub mod journey;
pub mod ports;
pub mod query;

pub use daily_card::DailyCards;
pub use domain::{
    AuthToken, CardTheme, ChatExchange, ChatMessage, Credentials, DailyDraw, Emotion,
    NewInteraction, Registration, Thought, User, Verse, WisdomCard,
};
pub use journey::{DrawError, Journey, JourneyState, JourneyStep};
pub use ports::{
    AuthService, CardStore, ChatService, KrishnaPathService, PortError, PortResult,
    ThoughtService, TokenStore,
};
pub use query::{keys, CacheConfig, QueryCache, QueryKey, QueryOptions, QueryState, QueryStatus, Subscription};
