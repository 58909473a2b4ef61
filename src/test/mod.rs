pub mod utils;

mod push;

pub use utils::*;
