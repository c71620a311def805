pub mod codepage;
mod decode;
pub mod token;

pub use decode::decode_token;
pub use token::{InputToken, KeyEventRecord, TextUnits};
