pub mod api;
pub mod dispatch;
pub mod message;
pub mod protocol;
pub mod state;
pub mod wait;

pub use dispatch::{dispatch_message, DispatchOutcome};
pub use message::ApiMessage;
pub use state::ServerState;
pub use wait::ReplyPendingQueue;
