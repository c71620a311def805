pub mod buffer;
pub mod input;
pub mod output;
pub mod server;

pub use buffer::ScreenBuffer;
pub use server::{dispatch_message, ApiMessage, DispatchOutcome, ReplyPendingQueue, ServerState};
