use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self {
            start: SourceLocation { line: 1, column: 1 },
            end: SourceLocation { line: 1, column: 1 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueToken {
    Number,
    String,
    Identifier,
}

/// A leaf token of the call tree: `1.5`, `"text"`, `@var`, `$$`, `$0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueData {
    pub text: String,
    pub token: ValueToken,
    pub location: SourceSpan,
}

/// `name(param, param, ...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallData {
    pub id: String,
    pub params: Vec<SyntaxNode>,
    pub location: SourceSpan,
}

impl CallData {
    pub fn param_num(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, index: usize) -> Option<&SyntaxNode> {
        self.params.get(index)
    }

    /// Identifier text of a parameter, when the parameter is a bare token.
    pub fn param_id(&self, index: usize) -> Option<&str> {
        match self.params.get(index)? {
            SyntaxNode::Value(value) => Some(value.text.as_str()),
            _ => None,
        }
    }
}

/// `name(params) { body }`. A clause without a block has an empty body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub call: CallData,
    pub body: Vec<SyntaxNode>,
    pub has_body: bool,
}

impl FunctionData {
    pub fn from_call(call: CallData) -> Self {
        Self {
            call,
            body: Vec::new(),
            has_body: false,
        }
    }

    pub fn id(&self) -> &str {
        self.call.id.as_str()
    }
}

/// A primary call followed by trailing clauses, e.g.
/// `waitstory(a)set("@r",1)timeoutset(500,"@r",0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementData {
    pub functions: Vec<FunctionData>,
    pub location: SourceSpan,
}

impl StatementData {
    pub fn first(&self) -> Option<&FunctionData> {
        self.functions.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SyntaxNode {
    Value(ValueData),
    Call(CallData),
    Function(FunctionData),
    Statement(StatementData),
}

impl SyntaxNode {
    /// The command or function identifier this node names.
    pub fn id(&self) -> &str {
        match self {
            Self::Value(value) => value.text.as_str(),
            Self::Call(call) => call.id.as_str(),
            Self::Function(function) => function.call.id.as_str(),
            Self::Statement(statement) => statement
                .functions
                .first()
                .map(|function| function.call.id.as_str())
                .unwrap_or(""),
        }
    }

    pub fn location(&self) -> &SourceSpan {
        match self {
            Self::Value(value) => &value.location,
            Self::Call(call) => &call.location,
            Self::Function(function) => &function.call.location,
            Self::Statement(statement) => &statement.location,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Call(_) => "call",
            Self::Function(_) => "function",
            Self::Statement(_) => "statement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerDecl {
    pub message_id: String,
    pub body: Vec<SyntaxNode>,
    pub location: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDocument {
    pub story_id: String,
    pub persistent: bool,
    pub handlers: Vec<HandlerDecl>,
    pub location: SourceSpan,
}

#[cfg(test)]
mod types_tests {
    use super::*;

    fn value(text: &str, token: ValueToken) -> SyntaxNode {
        SyntaxNode::Value(ValueData {
            text: text.to_string(),
            token,
            location: SourceSpan::synthetic(),
        })
    }

    #[test]
    fn call_param_helpers_expose_tokens() {
        let call = CallData {
            id: "assign".to_string(),
            params: vec![
                value("@x", ValueToken::Identifier),
                SyntaxNode::Call(CallData {
                    id: "vector3".to_string(),
                    params: Vec::new(),
                    location: SourceSpan::synthetic(),
                }),
            ],
            location: SourceSpan::synthetic(),
        };
        assert_eq!(call.param_num(), 2);
        assert_eq!(call.param_id(0), Some("@x"));
        assert_eq!(call.param_id(1), None);
        assert!(call.param(2).is_none());
    }

    #[test]
    fn statement_id_is_primary_call_id() {
        let statement = SyntaxNode::Statement(StatementData {
            functions: vec![
                FunctionData::from_call(CallData {
                    id: "waitstory".to_string(),
                    params: Vec::new(),
                    location: SourceSpan::synthetic(),
                }),
                FunctionData::from_call(CallData {
                    id: "set".to_string(),
                    params: Vec::new(),
                    location: SourceSpan::synthetic(),
                }),
            ],
            location: SourceSpan::synthetic(),
        });
        assert_eq!(statement.id(), "waitstory");
        assert_eq!(statement.kind_name(), "statement");
    }

    #[test]
    fn syntax_node_serializes_with_kind_tag() {
        let json = serde_json::to_value(value("1", ValueToken::Number)).expect("serialize");
        assert_eq!(json["kind"], "value");
        assert_eq!(json["token"], "number");
    }
}
