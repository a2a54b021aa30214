// Suggestion ranking, delivery and the engine that owns them

pub mod actions;
pub mod channel;
pub mod debug;
pub mod engine;
pub mod handle;
pub mod proposal;
pub mod prototype;
pub mod ranked;
pub mod ranking;
pub mod timeline;

pub use actions::{ActionExecutor, FocusProvider, StoryProvider};
pub use channel::{SubscriberId, SuggestionChannel, SuggestionUpdate, WindowedSubscriber};
pub use debug::{DebugEvent, DebugTap, ProposalSummary};
pub use engine::{SuggestionEngine, SuggestionList};
pub use handle::{
    AskController, AskHandler, EngineHandle, InteractionType, NextController, ProposalPublisher,
    UserInput,
};
pub use proposal::{
    Action, AddModuleToStory, AnnoyanceType, CreateStory, CustomAction, CustomActionRef,
    FocusStory, ImageType, Proposal, SuggestionDisplay,
};
pub use prototype::{RankedSuggestion, Suggestion, SuggestionPrototype};
pub use ranked::RankedSuggestions;
pub use ranking::{RankingFunction, RecencyRanker, SubstringRanker};
pub use timeline::{StoryInfo, StoryTimeline};
