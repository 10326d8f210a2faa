use std::collections::BTreeMap;

use roxmltree::{Document, Node, TextPos};
use story_core::{SourceLocation, SourceSpan, StoryError};

/// One element of a story file. Direct text children are joined into
/// `text`; comments and processing instructions are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<StoryElement>,
    pub text: String,
    pub location: SourceSpan,
}

impl StoryElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn elements(&self) -> impl Iterator<Item = &StoryElement> {
        self.children.iter()
    }

    pub fn text(&self) -> String {
        self.text.clone()
    }
}

/// Reads the root element of a story file.
pub fn parse_root_element(source: &str) -> Result<StoryElement, StoryError> {
    let document = Document::parse(source).map_err(|error| {
        let pos = error.pos();
        StoryError::with_span(
            "XML_PARSE_ERROR",
            error.to_string(),
            SourceSpan {
                start: location(pos),
                end: location(pos),
            },
        )
    })?;

    document
        .root()
        .children()
        .find(|node| node.is_element())
        .map(|root| read_element(&document, root))
        .ok_or_else(|| StoryError::new("XML_PARSE_ERROR", "Story file has no root element."))
}

fn read_element(document: &Document<'_>, node: Node<'_, '_>) -> StoryElement {
    let attributes = node
        .attributes()
        .map(|attribute| (attribute.name().to_string(), attribute.value().to_string()))
        .collect();
    let children = node
        .children()
        .filter(|child| child.is_element())
        .map(|child| read_element(document, child))
        .collect();
    let text = node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect::<String>();
    let range = node.range();

    StoryElement {
        name: node.tag_name().name().to_string(),
        attributes,
        children,
        text,
        location: SourceSpan {
            start: location(document.text_pos_at(range.start)),
            end: location(document.text_pos_at(range.end)),
        },
    }
}

fn location(pos: TextPos) -> SourceLocation {
    SourceLocation {
        line: pos.row as usize,
        column: pos.col as usize,
    }
}
