mod history;
mod store;

pub use history::{SessionHistory, Turn};
pub use store::SessionStore;
