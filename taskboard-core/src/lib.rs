pub mod errors;
pub mod models;
pub mod protocol;
pub mod tree;

pub use errors::*;
pub use models::*;
pub use protocol::*;
pub use tree::{Completion, ViewFlags, ViewState};

pub type BoardResult<T> = Result<T, BoardError>;
