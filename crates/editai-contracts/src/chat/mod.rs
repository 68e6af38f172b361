mod command_registry;
mod intent_parser;
pub mod log;

pub use command_registry::{CHAT_HELP_COMMANDS, SUGGESTED_TOPICS};
pub use intent_parser::{parse_intent, Intent};
pub use log::{ChatEntry, ChatLog, ImageSet, ImageSource, Submission};
