use std::fmt;
use std::rc::Rc;

use story_core::{FromVariant, StoryError, StoryVariant, SyntaxNode, ValueData, ValueToken};
use tracing::debug;

use crate::command::LoadContext;
use crate::expr::ScriptExpression;
use crate::functions::ValueFunction;
use crate::scope::VariableScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Literal,
    VariableReference,
    NestedExpression,
    Collection,
}

/// What a value node reads when it is evaluated.
pub struct EvalContext<'a> {
    pub scope: &'a VariableScope,
    pub iterator: &'a StoryVariant,
    pub args: &'a [StoryVariant],
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("iterator", &self.iterator)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
enum ValueSource {
    Literal(StoryVariant),
    Variable(String),
    Iterator,
    Argument(usize),
    Function {
        function: ValueFunction,
        args: Vec<ValueSource>,
    },
    Expression(Rc<ScriptExpression>),
    Collection(Vec<ValueSource>),
}

impl ValueSource {
    fn compile(node: &SyntaxNode, ctx: &LoadContext<'_>) -> Result<Self, StoryError> {
        match node {
            SyntaxNode::Value(value) => Self::compile_token(value),
            SyntaxNode::Call(call) => {
                let compile_params = || -> Result<Vec<ValueSource>, StoryError> {
                    call.params
                        .iter()
                        .map(|param| Self::compile(param, ctx))
                        .collect()
                };
                match call.id.as_str() {
                    "" | "list" => Ok(Self::Collection(compile_params()?)),
                    "expr" => {
                        let source = match call.params.as_slice() {
                            [SyntaxNode::Value(value)] => value.text.as_str(),
                            _ => {
                                return Err(StoryError::with_span(
                                    "STORY_PARSE_ARITY",
                                    "expr(...) takes exactly one script text.",
                                    call.location.clone(),
                                ))
                            }
                        };
                        let expression = ctx
                            .expressions()
                            .compile(source)
                            .map_err(|error| StoryError {
                                span: Some(call.location.clone()),
                                ..error
                            })?;
                        Ok(Self::Expression(Rc::new(expression)))
                    }
                    name => {
                        let function = ctx.functions().get(name).cloned().ok_or_else(|| {
                            StoryError::with_span(
                                "STORY_VALUE_FUNCTION_UNKNOWN",
                                format!("Unknown value function \"{}\".", name),
                                call.location.clone(),
                            )
                        })?;
                        Ok(Self::Function {
                            function,
                            args: compile_params()?,
                        })
                    }
                }
            }
            other => Err(StoryError::with_span(
                "STORY_PARSE_SHAPE",
                format!("A {} cannot be used as a value.", other.kind_name()),
                other.location().clone(),
            )),
        }
    }

    fn compile_token(value: &ValueData) -> Result<Self, StoryError> {
        let text = value.text.as_str();
        match value.token {
            ValueToken::String => Ok(Self::Literal(StoryVariant::String(text.to_string()))),
            ValueToken::Number => parse_number(text)
                .map(Self::Literal)
                .ok_or_else(|| {
                    StoryError::with_span(
                        "STORY_PARSE_VALUE",
                        format!("Invalid number literal \"{}\".", text),
                        value.location.clone(),
                    )
                }),
            ValueToken::Identifier => {
                if text.starts_with('@') {
                    return Ok(Self::Variable(text.to_string()));
                }
                if text == "$$" {
                    return Ok(Self::Iterator);
                }
                if let Some(index) = text.strip_prefix('$') {
                    return index.parse::<usize>().map(Self::Argument).map_err(|_| {
                        StoryError::with_span(
                            "STORY_PARSE_VALUE",
                            format!("Invalid argument reference \"{}\".", text),
                            value.location.clone(),
                        )
                    });
                }
                Ok(Self::Literal(match text {
                    "true" => StoryVariant::Int(1),
                    "false" => StoryVariant::Int(0),
                    _ => StoryVariant::String(text.to_string()),
                }))
            }
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::Literal(_) => ValueKind::Literal,
            Self::Variable(_) => ValueKind::VariableReference,
            Self::Iterator | Self::Argument(_) | Self::Function { .. } | Self::Expression(_) => {
                ValueKind::NestedExpression
            }
            Self::Collection(_) => ValueKind::Collection,
        }
    }

    fn resolve(&self, ctx: &EvalContext<'_>) -> StoryVariant {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Variable(name) => ctx.scope.variable_or_absent(name),
            Self::Iterator => ctx.iterator.clone(),
            Self::Argument(index) => ctx.args.get(*index).cloned().unwrap_or_default(),
            Self::Function { function, args } => {
                let args = args.iter().map(|arg| arg.resolve(ctx)).collect::<Vec<_>>();
                function.call(&args)
            }
            Self::Expression(expression) => match expression.evaluate(ctx) {
                Ok(value) => value,
                Err(error) => {
                    debug!(code = %error.code, message = %error.message, "expression resolved to absent");
                    StoryVariant::Absent
                }
            },
            Self::Collection(items) => {
                StoryVariant::List(items.iter().map(|item| item.resolve(ctx)).collect())
            }
        }
    }
}

fn parse_number(text: &str) -> Option<StoryVariant> {
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(StoryVariant::Float)
    } else {
        text.parse::<i64>().ok().map(StoryVariant::Int)
    }
}

/// Typed operand of a command. The source descriptor is fixed at load time;
/// `evaluate` refreshes the resolved value from the current scope.
#[derive(Debug)]
pub struct StoryValue<T> {
    source: Option<ValueSource>,
    value: T,
}

impl<T: FromVariant> Default for StoryValue<T> {
    fn default() -> Self {
        Self {
            source: None,
            value: T::default(),
        }
    }
}

/// Copies the descriptor only. The clone starts unresolved.
impl<T: FromVariant> Clone for StoryValue<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            value: T::default(),
        }
    }
}

impl<T: FromVariant> StoryValue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(value: impl Into<StoryVariant>) -> Self {
        Self {
            source: Some(ValueSource::Literal(value.into())),
            value: T::default(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            source: Some(ValueSource::Variable(name.into())),
            value: T::default(),
        }
    }

    /// On failure the node is left without a descriptor and reads as the
    /// type default.
    pub fn init_from_dsl(
        &mut self,
        node: &SyntaxNode,
        ctx: &LoadContext<'_>,
    ) -> Result<(), StoryError> {
        self.value = T::default();
        match ValueSource::compile(node, ctx) {
            Ok(source) => {
                self.source = Some(source);
                Ok(())
            }
            Err(error) => {
                self.source = None;
                Err(error)
            }
        }
    }

    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) {
        self.value = match &self.source {
            Some(source) => T::from_variant(&source.resolve(ctx)),
            None => T::default(),
        };
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn have_value(&self) -> bool {
        self.source.is_some()
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.source.as_ref().map(ValueSource::kind)
    }
}
