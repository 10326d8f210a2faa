use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope, AST, FLOAT, INT};
use story_core::{ObjectHandle, StoryError, StoryVariant, Vector3};

use crate::value::EvalContext;

const MAX_SCRIPT_OPERATIONS: u64 = 100_000;

fn reference_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)|\$\$|\$([0-9]+)")
            .expect("story reference regex should compile")
    })
}

/// Shared rhai engine for `expr(...)` value nodes.
#[derive(Clone)]
pub struct ExpressionEngine {
    engine: Rc<Engine>,
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine").finish_non_exhaustive()
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_SCRIPT_OPERATIONS);
        Self {
            engine: Rc::new(engine),
        }
    }

    pub fn compile(&self, source: &str) -> Result<ScriptExpression, StoryError> {
        let rewritten = rewrite_story_references(source);
        let ast = self
            .engine
            .compile_expression(&rewritten.script)
            .map_err(|error| {
                StoryError::new(
                    "STORY_EXPR_PARSE",
                    format!("Expression \"{}\" failed to parse: {}", source, error),
                )
            })?;
        Ok(ScriptExpression {
            source: source.to_string(),
            engine: Rc::clone(&self.engine),
            ast: Rc::new(ast),
            variables: rewritten.variables,
            uses_iterator: rewritten.uses_iterator,
            arguments: rewritten.arguments,
        })
    }
}

/// A compiled `expr(...)` body. Clones share the AST.
#[derive(Clone)]
pub struct ScriptExpression {
    source: String,
    engine: Rc<Engine>,
    ast: Rc<AST>,
    variables: BTreeSet<String>,
    uses_iterator: bool,
    arguments: BTreeSet<usize>,
}

impl std::fmt::Debug for ScriptExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExpression")
            .field("source", &self.source)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl ScriptExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<StoryVariant, StoryError> {
        let mut scope = Scope::new();
        for name in &self.variables {
            let value = ctx.scope.variable_or_absent(name);
            scope.push_dynamic(script_symbol(name), variant_to_dynamic(&value));
        }
        if self.uses_iterator {
            scope.push_dynamic("it", variant_to_dynamic(ctx.iterator));
        }
        for index in &self.arguments {
            let value = ctx.args.get(*index).cloned().unwrap_or_default();
            scope.push_dynamic(format!("arg{}", index), variant_to_dynamic(&value));
        }

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|error| {
                StoryError::new(
                    "STORY_EXPR_EVAL",
                    format!("Expression \"{}\" failed: {}", self.source, error),
                )
            })?;
        dynamic_to_variant(result)
    }
}

struct RewrittenExpression {
    script: String,
    variables: BTreeSet<String>,
    uses_iterator: bool,
    arguments: BTreeSet<usize>,
}

fn script_symbol(variable: &str) -> String {
    format!("v_{}", variable.trim_start_matches('@'))
}

fn rewrite_story_references(source: &str) -> RewrittenExpression {
    let mut variables = BTreeSet::new();
    let mut uses_iterator = false;
    let mut arguments = BTreeSet::new();

    let script = reference_regex()
        .replace_all(source, |captures: &Captures<'_>| {
            if let Some(name) = captures.get(1) {
                let variable = format!("@{}", name.as_str());
                let symbol = script_symbol(&variable);
                variables.insert(variable);
                return symbol;
            }
            if let Some(index) = captures.get(2) {
                let index = index.as_str().parse::<usize>().unwrap_or(0);
                arguments.insert(index);
                return format!("arg{}", index);
            }
            uses_iterator = true;
            "it".to_string()
        })
        .to_string();

    RewrittenExpression {
        script,
        variables,
        uses_iterator,
        arguments,
    }
}

pub(crate) fn variant_to_dynamic(value: &StoryVariant) -> Dynamic {
    match value {
        StoryVariant::Absent => Dynamic::UNIT,
        StoryVariant::Int(value) => Dynamic::from_int(*value as INT),
        StoryVariant::Float(value) => Dynamic::from_float(*value as FLOAT),
        StoryVariant::String(value) => Dynamic::from(value.clone()),
        StoryVariant::Vector3(value) => {
            let mut map = Map::new();
            map.insert("x".into(), Dynamic::from_float(value.x as FLOAT));
            map.insert("y".into(), Dynamic::from_float(value.y as FLOAT));
            map.insert("z".into(), Dynamic::from_float(value.z as FLOAT));
            Dynamic::from_map(map)
        }
        StoryVariant::Object(handle) => {
            let mut map = Map::new();
            map.insert("handle".into(), Dynamic::from_int(handle.handle as INT));
            Dynamic::from_map(map)
        }
        StoryVariant::List(values) => {
            Dynamic::from_array(values.iter().map(variant_to_dynamic).collect::<Array>())
        }
    }
}

pub(crate) fn dynamic_to_variant(value: Dynamic) -> Result<StoryVariant, StoryError> {
    let type_name = value.type_name();
    if value.is_unit() {
        return Ok(StoryVariant::Absent);
    }
    if value.is::<bool>() {
        return Ok(StoryVariant::Int(i64::from(value.cast::<bool>())));
    }
    if value.is::<INT>() {
        return Ok(StoryVariant::Int(value.cast::<INT>()));
    }
    if value.is::<FLOAT>() {
        return Ok(StoryVariant::Float(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(StoryVariant::String(
            value.cast::<ImmutableString>().to_string(),
        ));
    }
    if value.is::<char>() {
        return Ok(StoryVariant::String(value.cast::<char>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_variant(item)?);
        }
        return Ok(StoryVariant::List(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        if let Some(handle) = map.get("handle") {
            if let Ok(handle) = handle.as_int() {
                return Ok(StoryVariant::Object(ObjectHandle {
                    handle: handle as u64,
                }));
            }
        }
        let component = |key: &str| -> Option<f32> {
            let item = map.get(key)?;
            item.as_float()
                .ok()
                .or_else(|| item.as_int().ok().map(|value| value as FLOAT))
                .map(|value| value as f32)
        };
        if let (Some(x), Some(y), Some(z)) = (component("x"), component("y"), component("z")) {
            return Ok(StoryVariant::Vector3(Vector3::new(x, y, z)));
        }
    }

    Err(StoryError::new(
        "STORY_EXPR_VALUE_UNSUPPORTED",
        format!("Unsupported script value type \"{}\".", type_name),
    ))
}

#[cfg(test)]
mod expr_tests {
    use super::*;
    use crate::scope::VariableScope;

    fn evaluate(source: &str, scope: &VariableScope, args: &[StoryVariant]) -> StoryVariant {
        let engine = ExpressionEngine::new();
        let expression = engine.compile(source).expect("expression should compile");
        let iterator = StoryVariant::Int(4);
        let ctx = EvalContext {
            scope,
            iterator: &iterator,
            args,
        };
        expression.evaluate(&ctx).expect("expression should evaluate")
    }

    #[test]
    fn double_at_references_do_not_compile() {
        let engine = ExpressionEngine::new();
        let error = engine.compile("@@gold + 1").expect_err("@@ should be rejected");
        assert_eq!(error.code, "STORY_EXPR_PARSE");
    }

    #[test]
    fn rewrite_collects_references() {
        let rewritten = rewrite_story_references("@hp + @gold * $$ - $1");
        assert_eq!(rewritten.script, "v_hp + v_gold * it - arg1");
        assert!(rewritten.variables.contains("@hp"));
        assert!(rewritten.variables.contains("@gold"));
        assert!(rewritten.uses_iterator);
        assert!(rewritten.arguments.contains(&1));
    }

    #[test]
    fn expressions_read_scope_iterator_and_args() {
        let mut scope = VariableScope::new();
        scope.set_variable("@hp", StoryVariant::Int(10));
        let args = vec![StoryVariant::Int(1), StoryVariant::Int(3)];
        assert_eq!(
            evaluate("@hp * 2 + $$ + $1", &scope, &args),
            StoryVariant::Int(27)
        );
        assert_eq!(
            evaluate("@hp > 5", &scope, &args),
            StoryVariant::Int(1)
        );
    }

    #[test]
    fn missing_variables_are_unit() {
        let scope = VariableScope::new();
        assert_eq!(evaluate("@nothing", &scope, &[]), StoryVariant::Absent);
        assert_eq!(evaluate("$7", &scope, &[]), StoryVariant::Absent);
    }

    #[test]
    fn vectors_round_trip_through_maps() {
        let mut scope = VariableScope::new();
        scope.set_variable("@pos", StoryVariant::Vector3(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(evaluate("@pos.y", &scope, &[]), StoryVariant::Float(2.0));
        assert_eq!(
            evaluate("#{x: 1, y: 2.5, z: 0}", &scope, &[]),
            StoryVariant::Vector3(Vector3::new(1.0, 2.5, 0.0))
        );
    }

    #[test]
    fn parse_and_eval_failures_are_errors() {
        let engine = ExpressionEngine::new();
        let error = engine.compile("1 +").expect_err("should fail to parse");
        assert_eq!(error.code, "STORY_EXPR_PARSE");

        let expression = engine.compile("@a / 0").expect("compiles");
        let mut scope = VariableScope::new();
        scope.set_variable("@a", StoryVariant::Int(1));
        let iterator = StoryVariant::Absent;
        let error = expression
            .evaluate(&EvalContext {
                scope: &scope,
                iterator: &iterator,
                args: &[],
            })
            .expect_err("division by zero should fail");
        assert_eq!(error.code, "STORY_EXPR_EVAL");
    }
}
