use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use story_core::{split_numbers, StoryVariant, Vector3};

type ValueFn = dyn Fn(&[StoryVariant]) -> StoryVariant;

/// A named pure function usable inside value nodes, e.g. `vector3(1,2,3)`.
#[derive(Clone)]
pub struct ValueFunction {
    name: String,
    call: Rc<ValueFn>,
}

impl ValueFunction {
    pub fn new(
        name: impl Into<String>,
        call: impl Fn(&[StoryVariant]) -> StoryVariant + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[StoryVariant]) -> StoryVariant {
        (self.call)(args)
    }
}

impl fmt::Debug for ValueFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueFunction({})", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ValueFunctionRegistry {
    functions: BTreeMap<String, ValueFunction>,
}

impl Default for ValueFunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ValueFunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("vector3", vector3);
        registry.register("stringlist", |args| {
            StoryVariant::List(
                first_text(args)
                    .split_whitespace()
                    .map(StoryVariant::from)
                    .collect(),
            )
        });
        registry.register("vector3list", |args| {
            let numbers = split_numbers(&first_text(args));
            StoryVariant::List(
                numbers
                    .chunks_exact(3)
                    .map(|chunk| StoryVariant::Vector3(Vector3::new(chunk[0], chunk[1], chunk[2])))
                    .collect(),
            )
        });
        registry.register("int", |args| {
            StoryVariant::Int(args.first().map(StoryVariant::to_int).unwrap_or(0))
        });
        registry.register("float", |args| {
            StoryVariant::Float(args.first().map(StoryVariant::to_float).unwrap_or(0.0))
        });
        registry.register("str", |args| StoryVariant::String(first_text(args)));
        registry.register("concat", |args| {
            StoryVariant::String(args.iter().map(StoryVariant::to_text).collect())
        });
        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        call: impl Fn(&[StoryVariant]) -> StoryVariant + 'static,
    ) {
        let function = ValueFunction::new(name, call);
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get(&self, name: &str) -> Option<&ValueFunction> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

fn first_text(args: &[StoryVariant]) -> String {
    args.first().map(StoryVariant::to_text).unwrap_or_default()
}

fn vector3(args: &[StoryVariant]) -> StoryVariant {
    let vector = match args {
        [single] => single.to_vector3(),
        [x, y, z, ..] => Vector3::new(x.to_float() as f32, y.to_float() as f32, z.to_float() as f32),
        _ => Vector3::ZERO,
    };
    StoryVariant::Vector3(vector)
}
