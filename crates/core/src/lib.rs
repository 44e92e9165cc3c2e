pub mod dom;
pub mod error;
pub mod source;

pub use dom::{Document, Element, Node, replace_rows};
pub use error::PollError;
pub use source::FragmentSource;
