use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Parses `"x y z"`; commas are accepted as separators too.
    pub fn parse(text: &str) -> Option<Self> {
        let parts = split_numbers(text);
        if parts.len() != 3 {
            return None;
        }
        Some(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// Opaque handle returned by a host collaborator (spawned object, impact seq, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub handle: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoryVariant {
    #[default]
    Absent,
    Int(i64),
    Float(f64),
    String(String),
    Vector3(Vector3),
    Object(ObjectHandle),
    List(Vec<StoryVariant>),
}

impl StoryVariant {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Vector3(_) => "vector3",
            Self::Object(_) => "object",
            Self::List(_) => "list",
        }
    }

    pub fn to_int(&self) -> i64 {
        match self {
            Self::Int(value) => *value,
            Self::Float(value) => *value as i64,
            Self::String(value) => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|value| value as i64))
                    .unwrap_or(0)
            }
            Self::Object(handle) => handle.handle as i64,
            Self::Absent | Self::Vector3(_) | Self::List(_) => 0,
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Self::Int(value) => *value as f64,
            Self::Float(value) => *value,
            Self::String(value) => value.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => {
                let trimmed = value.trim();
                trimmed.eq_ignore_ascii_case("true") || trimmed == "1"
            }
            Self::Object(_) => true,
            Self::List(values) => !values.is_empty(),
            Self::Absent | Self::Vector3(_) => false,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Absent => String::new(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => {
                if value.fract().abs() < f64::EPSILON {
                    (*value as i64).to_string()
                } else {
                    value.to_string()
                }
            }
            Self::String(value) => value.clone(),
            Self::Vector3(value) => value.to_string(),
            Self::Object(handle) => format!("#{}", handle.handle),
            Self::List(values) => values
                .iter()
                .map(StoryVariant::to_text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn to_vector3(&self) -> Vector3 {
        match self {
            Self::Vector3(value) => *value,
            Self::String(value) => Vector3::parse(value).unwrap_or_default(),
            Self::List(values) if values.len() == 3 => Vector3::new(
                values[0].to_float() as f32,
                values[1].to_float() as f32,
                values[2].to_float() as f32,
            ),
            _ => Vector3::ZERO,
        }
    }

    pub fn to_list(&self) -> Vec<StoryVariant> {
        match self {
            Self::Absent => Vec::new(),
            Self::List(values) => values.clone(),
            Self::String(value) => value
                .split_whitespace()
                .map(|part| Self::String(part.to_string()))
                .collect(),
            other => vec![other.clone()],
        }
    }
}

impl From<i64> for StoryVariant {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for StoryVariant {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for StoryVariant {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StoryVariant {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vector3> for StoryVariant {
    fn from(value: Vector3) -> Self {
        Self::Vector3(value)
    }
}

impl From<ObjectHandle> for StoryVariant {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

/// Conversion used by typed value nodes. Every type has a zero value that
/// stands in for absent or unconvertible input.
pub trait FromVariant: Clone + Default + fmt::Debug {
    fn from_variant(value: &StoryVariant) -> Self;
}

impl FromVariant for StoryVariant {
    fn from_variant(value: &StoryVariant) -> Self {
        value.clone()
    }
}

impl FromVariant for i64 {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_int()
    }
}

impl FromVariant for i32 {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_int().clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

impl FromVariant for f64 {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_float()
    }
}

impl FromVariant for f32 {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_float() as f32
    }
}

impl FromVariant for bool {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_bool()
    }
}

impl FromVariant for String {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_text()
    }
}

impl FromVariant for Vector3 {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_vector3()
    }
}

impl FromVariant for Vec<String> {
    fn from_variant(value: &StoryVariant) -> Self {
        value.to_list().iter().map(StoryVariant::to_text).collect()
    }
}

pub fn split_numbers(text: &str) -> Vec<f32> {
    text.split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<f32>().ok())
        .collect()
}
