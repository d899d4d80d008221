pub mod code_file;
pub mod collaboration;
pub mod health;
pub mod messages;
pub mod user;
pub mod error;

pub use code_file::*;
pub use collaboration::*;
pub use health::*;
pub use messages::*;
pub use user::*;
pub use error::*;
