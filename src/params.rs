//! Typed view over the trainer's text parameters.

use std::fmt;

/// Declared kind of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
    /// Stored as `"0"`/`"1"` text
    Bool,
    Text,
}

/// A parameter value
///
/// Booleans compare equal to the integers `1` and `0`, the form they take in
/// the trainer's text table.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

/// Declared kinds of the parameters known to the client.
///
/// The table is independent of the trainer's own parameter table; names
/// missing here are exchanged as text.
pub static PARAMETER_TYPES: &[(&str, ParamKind)] = &[
    ("feature.minfreq", ParamKind::Float),
    ("feature.possible_states", ParamKind::Bool),
    ("feature.possible_transitions", ParamKind::Bool),
    ("c1", ParamKind::Float),
    ("c2", ParamKind::Float),
    ("max_iterations", ParamKind::Int),
    ("num_memories", ParamKind::Int),
    ("epsilon", ParamKind::Float),
    ("period", ParamKind::Int),
    ("delta", ParamKind::Float),
    ("linesearch", ParamKind::Text),
    ("max_linesearch", ParamKind::Int),
    ("calibration.eta", ParamKind::Float),
    ("calibration.rate", ParamKind::Float),
    ("calibration.samples", ParamKind::Int),
    ("calibration.candidates", ParamKind::Int),
    ("calibration.max_trials", ParamKind::Int),
    ("type", ParamKind::Int),
    ("c", ParamKind::Float),
    ("error_sensitive", ParamKind::Bool),
    ("averaging", ParamKind::Bool),
    ("variance", ParamKind::Float),
    ("gamma", ParamKind::Float),
];

impl ParamKind {
    /// Declared kind of `name`, if the client knows it
    pub fn of(name: &str) -> Option<ParamKind> {
        PARAMETER_TYPES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|&(_, kind)| kind)
    }

    fn decode(self, raw: &str) -> Option<ParamValue> {
        let raw = raw.trim();
        match self {
            ParamKind::Float => raw.parse().ok().map(ParamValue::Float),
            ParamKind::Int => raw.parse().ok().map(ParamValue::Int),
            ParamKind::Bool => match raw {
                "0" | "false" => Some(ParamValue::Bool(false)),
                "1" | "true" => Some(ParamValue::Bool(true)),
                _ => None,
            },
            ParamKind::Text => Some(ParamValue::Text(raw.to_string())),
        }
    }
}

impl ParamValue {
    /// Decode the text of parameter `name` through the declared-kind table.
    ///
    /// Unknown names and text that does not decode are kept as text.
    pub fn decode(name: &str, raw: &str) -> ParamValue {
        ParamKind::of(name)
            .and_then(|kind| kind.decode(raw))
            .unwrap_or_else(|| ParamValue::Text(raw.to_string()))
    }

    /// Text representation exchanged with the trainer
    pub fn to_param_string(&self) -> String {
        match self {
            ParamValue::Float(v) => v.to_string(),
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Bool(v) => String::from(if *v { "1" } else { "0" }),
            ParamValue::Text(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Bool(_) => self.as_i64().map(|v| v as f64),
            ParamValue::Text(v) => v.trim().parse().ok(),
        }
    }

    /// Integer value; booleans read as `1`/`0`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            ParamValue::Float(_) => None,
            ParamValue::Int(v) => Some(*v),
            ParamValue::Bool(v) => Some(i64::from(*v)),
            ParamValue::Text(v) => v.trim().parse().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(0) => Some(false),
            ParamValue::Int(1) => Some(true),
            ParamValue::Text(v) => ParamKind::Bool.decode(v).and_then(|v| v.as_bool()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        use ParamValue::*;
        match (self, other) {
            (Float(a), Float(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Bool(b), Int(i)) | (Int(i), Bool(b)) => i64::from(*b) == *i,
            (Text(a), Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param_string())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}
