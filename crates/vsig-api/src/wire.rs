// ── Wire value model ──
//
// The dynamically-typed value exchanged with the broker. A closed enum:
// every payload variant maps to exactly one `WireType`, and the two
// sentinel states carry no payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

// ── WireType ────────────────────────────────────────────────────────

/// Payload tag of a [`WireValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WireType {
    Bool,
    BoolArray,
    Int32,
    Int32Array,
    Int64,
    Int64Array,
    Uint32,
    Uint32Array,
    Uint64,
    Uint64Array,
    Float,
    FloatArray,
    Double,
    DoubleArray,
    String,
    StringArray,
}

impl WireType {
    pub fn is_array(self) -> bool {
        matches!(
            self,
            Self::BoolArray
                | Self::Int32Array
                | Self::Int64Array
                | Self::Uint32Array
                | Self::Uint64Array
                | Self::FloatArray
                | Self::DoubleArray
                | Self::StringArray
        )
    }
}

// ── EntryType ───────────────────────────────────────────────────────

/// Broker-side classification of a signal. Only actuators accept writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryType {
    Sensor,
    Actuator,
    Attribute,
}

// ── WireValue ───────────────────────────────────────────────────────

/// A value as the broker sees it.
///
/// Exactly one of three things holds: a typed payload, `Unavailable`
/// (the signal is known but has no value yet), or `TypeMismatch`
/// (the broker could not serve the value as the requested type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Bool(bool),
    BoolArray(Vec<bool>),
    Int32(i32),
    Int32Array(Vec<i32>),
    Int64(i64),
    Int64Array(Vec<i64>),
    Uint32(u32),
    Uint32Array(Vec<u32>),
    Uint64(u64),
    Uint64Array(Vec<u64>),
    Float(f32),
    FloatArray(Vec<f32>),
    Double(f64),
    DoubleArray(Vec<f64>),
    String(String),
    StringArray(Vec<String>),
    Unavailable,
    TypeMismatch {
        requested: WireType,
        actual: WireType,
    },
}

impl WireValue {
    /// Payload tag, or `None` for the sentinel states.
    pub fn wire_type(&self) -> Option<WireType> {
        let ty = match self {
            Self::Bool(_) => WireType::Bool,
            Self::BoolArray(_) => WireType::BoolArray,
            Self::Int32(_) => WireType::Int32,
            Self::Int32Array(_) => WireType::Int32Array,
            Self::Int64(_) => WireType::Int64,
            Self::Int64Array(_) => WireType::Int64Array,
            Self::Uint32(_) => WireType::Uint32,
            Self::Uint32Array(_) => WireType::Uint32Array,
            Self::Uint64(_) => WireType::Uint64,
            Self::Uint64Array(_) => WireType::Uint64Array,
            Self::Float(_) => WireType::Float,
            Self::FloatArray(_) => WireType::FloatArray,
            Self::Double(_) => WireType::Double,
            Self::DoubleArray(_) => WireType::DoubleArray,
            Self::String(_) => WireType::String,
            Self::StringArray(_) => WireType::StringArray,
            Self::Unavailable | Self::TypeMismatch { .. } => return None,
        };
        Some(ty)
    }

    pub fn is_payload(&self) -> bool {
        self.wire_type().is_some()
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::BoolArray(v) => write_list(f, v),
            Self::Int32Array(v) => write_list(f, v),
            Self::Int64Array(v) => write_list(f, v),
            Self::Uint32Array(v) => write_list(f, v),
            Self::Uint64Array(v) => write_list(f, v),
            Self::FloatArray(v) => write_list(f, v),
            Self::DoubleArray(v) => write_list(f, v),
            Self::StringArray(v) => {
                let quoted: Vec<String> = v.iter().map(|s| format!("{s:?}")).collect();
                write_list(f, &quoted)
            }
            Self::Unavailable => f.write_str("<unavailable>"),
            Self::TypeMismatch { requested, actual } => {
                write!(f, "<type mismatch: requested {requested}, actual {actual}>")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinels_have_no_wire_type() {
        assert_eq!(WireValue::Unavailable.wire_type(), None);
        let mismatch = WireValue::TypeMismatch {
            requested: WireType::Float,
            actual: WireType::String,
        };
        assert_eq!(mismatch.wire_type(), None);
        assert!(!mismatch.is_payload());
    }

    #[test]
    fn payload_reports_its_tag() {
        assert_eq!(WireValue::Float(1.5).wire_type(), Some(WireType::Float));
        assert_eq!(
            WireValue::StringArray(vec!["a".into()]).wire_type(),
            Some(WireType::StringArray)
        );
        assert!(WireType::Uint64Array.is_array());
        assert!(!WireType::Uint64.is_array());
    }

    #[test]
    fn display_formats_arrays_and_sentinels() {
        assert_eq!(WireValue::Int32Array(vec![1, 2, 3]).to_string(), "[1, 2, 3]");
        assert_eq!(
            WireValue::StringArray(vec!["a".into(), "b".into()]).to_string(),
            r#"["a", "b"]"#
        );
        assert_eq!(WireValue::Unavailable.to_string(), "<unavailable>");
        assert_eq!(WireType::Int32Array.to_string(), "int32_array");
    }

    #[test]
    fn json_uses_adjacent_tagging() {
        let json = serde_json::to_value(WireValue::Uint32(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "uint32", "value": 7 }));

        let back: WireValue =
            serde_json::from_value(serde_json::json!({ "type": "unavailable" })).unwrap();
        assert_eq!(back, WireValue::Unavailable);
    }
}
