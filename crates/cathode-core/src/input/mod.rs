pub mod cooked;
pub mod pending;
pub mod read;

pub use cooked::{CookedEvent, CookedLineState, CookedSession};
pub use pending::PendingBytes;
