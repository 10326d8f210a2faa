use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use story_core::{
    CallData, FunctionData, HandlerDecl, StatementData, StoryDocument, StoryError, SyntaxNode,
    ValueData, ValueToken,
};

use crate::xml::{parse_root_element, StoryElement};

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(@[A-Za-z_][A-Za-z0-9_]*|\$\$|\$[0-9]+|[A-Za-z_][A-Za-z0-9_.]*)$")
            .expect("identifier regex must compile")
    })
}

fn number_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").expect("number regex must compile")
    })
}

/// Parses a file holding a single `<story>` root.
pub fn parse_story_document(source: &str) -> Result<StoryDocument, StoryError> {
    let mut documents = parse_story_documents(source)?;
    if documents.len() != 1 {
        return Err(StoryError::new(
            "XML_STORY_COUNT",
            format!("Expected exactly one <story>, found {}.", documents.len()),
        ));
    }
    Ok(documents.remove(0))
}

/// Parses either a `<story>` root or a `<stories>` root wrapping several.
pub fn parse_story_documents(source: &str) -> Result<Vec<StoryDocument>, StoryError> {
    let element = parse_root_element(source)?;
    let root = &element;

    let stories = match root.name.as_str() {
        "story" => vec![parse_story(root)?],
        "stories" => root
            .elements()
            .map(|element| {
                if element.name != "story" {
                    return Err(unexpected_element(element, "<stories>"));
                }
                parse_story(element)
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => {
            return Err(StoryError::with_span(
                "XML_ROOT_INVALID",
                format!(
                    "Root element must be <story> or <stories>, found <{}>.",
                    root.name
                ),
                root.location.clone(),
            ))
        }
    };

    let mut seen = BTreeSet::new();
    for story in &stories {
        if !seen.insert(story.story_id.clone()) {
            return Err(StoryError::with_span(
                "XML_STORY_DUPLICATE",
                format!("Story \"{}\" is declared more than once.", story.story_id),
                story.location.clone(),
            ));
        }
    }

    Ok(stories)
}

fn parse_story(element: &StoryElement) -> Result<StoryDocument, StoryError> {
    let story_id = required_attribute(element, "id")?;
    let persistent = match element.attribute("persistent") {
        None => false,
        Some("true") => true,
        Some("false") => false,
        Some(other) => {
            return Err(StoryError::with_span(
                "XML_ATTR_INVALID",
                format!("persistent must be true or false, found \"{}\".", other),
                element.location.clone(),
            ))
        }
    };

    let mut handlers = Vec::new();
    for child in element.elements() {
        if child.name != "onmessage" {
            return Err(unexpected_element(child, "<story>"));
        }
        handlers.push(HandlerDecl {
            message_id: required_attribute(child, "id")?,
            body: parse_block(child)?,
            location: child.location.clone(),
        });
    }

    Ok(StoryDocument {
        story_id,
        persistent,
        handlers,
        location: element.location.clone(),
    })
}

fn parse_block(element: &StoryElement) -> Result<Vec<SyntaxNode>, StoryError> {
    element.elements().map(parse_command_node).collect()
}

fn parse_command_node(element: &StoryElement) -> Result<SyntaxNode, StoryError> {
    match element.name.as_str() {
        "call" => Ok(SyntaxNode::Call(parse_call(element)?)),
        "function" => Ok(SyntaxNode::Function(parse_function(element)?)),
        "statement" => Ok(SyntaxNode::Statement(parse_statement(element)?)),
        _ => Err(unexpected_element(element, "a command block")),
    }
}

fn parse_param_node(element: &StoryElement) -> Result<SyntaxNode, StoryError> {
    match element.name.as_str() {
        "num" => parse_value(element, ValueToken::Number),
        "str" => parse_value(element, ValueToken::String),
        "ident" => parse_value(element, ValueToken::Identifier),
        "call" => Ok(SyntaxNode::Call(parse_call(element)?)),
        _ => Err(unexpected_element(element, "a parameter list")),
    }
}

fn parse_value(element: &StoryElement, token: ValueToken) -> Result<SyntaxNode, StoryError> {
    let raw = element.text();
    let text = match token {
        ValueToken::String => raw,
        ValueToken::Number | ValueToken::Identifier => raw.trim().to_string(),
    };

    let valid = match token {
        ValueToken::Number => number_regex().is_match(&text),
        ValueToken::Identifier => identifier_regex().is_match(&text),
        ValueToken::String => true,
    };
    if !valid {
        return Err(StoryError::with_span(
            "XML_VALUE_INVALID",
            format!("<{}> has invalid content \"{}\".", element.name, text),
            element.location.clone(),
        ));
    }

    Ok(SyntaxNode::Value(ValueData {
        text,
        token,
        location: element.location.clone(),
    }))
}

fn parse_call(element: &StoryElement) -> Result<CallData, StoryError> {
    let id = element.attribute("id").unwrap_or_default().to_string();
    let params = element
        .elements()
        .map(parse_param_node)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CallData {
        id,
        params,
        location: element.location.clone(),
    })
}

fn parse_function(element: &StoryElement) -> Result<FunctionData, StoryError> {
    let mut call = None;
    let mut body = None;
    for child in element.elements() {
        match child.name.as_str() {
            "call" if call.is_none() => call = Some(parse_call(child)?),
            "body" if body.is_none() => body = Some(parse_block(child)?),
            _ => return Err(unexpected_element(child, "<function>")),
        }
    }

    let Some(call) = call else {
        return Err(StoryError::with_span(
            "XML_FUNCTION_CALL_MISSING",
            "<function> requires a <call> header.",
            element.location.clone(),
        ));
    };

    Ok(FunctionData {
        call,
        has_body: body.is_some(),
        body: body.unwrap_or_default(),
    })
}

fn parse_statement(element: &StoryElement) -> Result<StatementData, StoryError> {
    let mut functions = Vec::new();
    for child in element.elements() {
        match child.name.as_str() {
            "call" => functions.push(FunctionData::from_call(parse_call(child)?)),
            "function" => functions.push(parse_function(child)?),
            _ => return Err(unexpected_element(child, "<statement>")),
        }
    }

    if functions.is_empty() {
        return Err(StoryError::with_span(
            "XML_STATEMENT_EMPTY",
            "<statement> requires at least one clause.",
            element.location.clone(),
        ));
    }

    Ok(StatementData {
        functions,
        location: element.location.clone(),
    })
}

fn required_attribute(element: &StoryElement, name: &str) -> Result<String, StoryError> {
    match element.attribute(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(StoryError::with_span(
            "XML_ATTR_MISSING",
            format!("<{}> requires attribute \"{}\".", element.name, name),
            element.location.clone(),
        )),
    }
}

fn unexpected_element(element: &StoryElement, context: &str) -> StoryError {
    StoryError::with_span(
        "XML_ELEMENT_UNEXPECTED",
        format!("<{}> is not allowed in {}.", element.name, context),
        element.location.clone(),
    )
}
