mod story;
mod xml;

pub use story::{parse_story_document, parse_story_documents};
pub use xml::{parse_root_element, StoryElement};
