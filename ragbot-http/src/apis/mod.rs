pub mod chat;
pub mod health;

pub use chat::handle_chat_stream;
pub use health::handle_health;
