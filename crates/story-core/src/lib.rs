pub mod error;
pub mod types;
pub mod value;

pub use error::StoryError;
pub use types::*;
pub use value::*;
