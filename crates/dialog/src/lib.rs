//! Dialog orchestration: session and conversation state, response
//! composition, and the per-turn engine that ties the pipeline together.

pub mod compose;
pub mod conversation;
pub mod engine;
pub mod session;

pub use compose::{ComposeInput, ResponseComposer};
pub use conversation::{
    Conversation, ConversationExport, ConversationStats, ConversationStatus, ConversationStore,
    SearchFilter,
};
pub use engine::{DialogEngine, TurnInput, TurnOutcome};
pub use session::{Session, SessionRegistry, SessionSnapshot, SessionStatus};
