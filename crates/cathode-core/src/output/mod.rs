pub mod engine;
pub mod sgr;
pub mod vt;

pub use engine::{apply_text, OutputSinks};
