pub mod grid;
pub mod screen;

pub use grid::CharGrid;
pub use screen::{SavedCursor, ScreenBuffer};
