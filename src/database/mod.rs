pub mod bootstrap;
pub mod schema;

pub use bootstrap::*;
pub use schema::*;
