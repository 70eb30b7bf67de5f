pub mod attachment;
pub mod backend;
pub mod clipboard;
pub mod config;
pub mod export;
pub mod fragment;
pub mod markdown;
pub mod session;
pub mod speech;
pub mod state;

// Re-export main types for convenience
pub use attachment::{Attachment, AttachmentError};
pub use backend::BackendClient;
pub use clipboard::{ClipboardWriter, SystemClipboard};
pub use config::Config;
pub use export::{DirectorySink, TranscriptSink};
pub use session::{ChatSession, Draft, SendOutcome};
pub use speech::{Narrator, SpeechPlayer, SystemSpeech, VoiceProfile};
pub use state::{ChatMessage, ChatRole, MessageId, Transcript};
