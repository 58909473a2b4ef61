pub mod authentication;
pub mod credentials;
pub mod roles;
pub mod session;
pub mod user;

pub use authentication::*;
pub use credentials::*;
pub use roles::*;
pub use session::*;
pub use user::*;
