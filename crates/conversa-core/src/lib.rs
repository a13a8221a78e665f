pub mod ai;
pub mod config;
pub mod error;
pub mod message;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod store;

// Re-export main types for convenience
pub use ai::{Completer, CompletionConfig, OpenAIClient};
pub use config::Config;
pub use error::{PersistenceError, RemoteError};
pub use message::{ChatRole, Message};
pub use resolver::{PatternResolver, Resolver};
pub use session::{Exchange, Reply, ReplySource, Responder, Session};
pub use settings::{clear_all_data, Settings};
pub use store::{FileStore, MemoryStore, Store};
