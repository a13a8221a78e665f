pub mod openai;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::message::Message;

pub use openai::{CompletionConfig, OpenAIClient};

/// Number of most recent messages sent along with a prompt.
pub const HISTORY_WINDOW: usize = 10;

/// A remote text completion backend.
///
/// Implementations make a single attempt; callers substitute a fallback
/// instead of retrying.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, history: &[Message]) -> Result<String, RemoteError>;
}
