// ── Typed signal values ──
//
// `SignalType` ties a Rust type to exactly one `WireType`. Decoding is
// strict: a wire value of any other variant is rejected, never coerced.

use chrono::{DateTime, Utc};
use vsig_api::{WireType, WireValue};

use crate::error::SdkError;

/// A typed value with the broker's timestamp of its last update.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    /// `None` when the transport does not report timestamps.
    pub timestamp: Option<DateTime<Utc>>,
}

/// A Rust type that can be carried by a data point.
pub trait SignalType: Clone + Send + Sync + 'static {
    /// The only wire variant this type accepts.
    const WIRE_TYPE: WireType;

    fn into_wire(self) -> WireValue;

    /// Extract the payload, handing the value back untouched on mismatch.
    fn from_wire(value: WireValue) -> Result<Self, WireValue>;
}

macro_rules! impl_signal_type {
    ($ty:ty => $scalar:ident, $array:ident) => {
        impl SignalType for $ty {
            const WIRE_TYPE: WireType = WireType::$scalar;

            fn into_wire(self) -> WireValue {
                WireValue::$scalar(self)
            }

            fn from_wire(value: WireValue) -> Result<Self, WireValue> {
                match value {
                    WireValue::$scalar(v) => Ok(v),
                    other => Err(other),
                }
            }
        }

        impl SignalType for Vec<$ty> {
            const WIRE_TYPE: WireType = WireType::$array;

            fn into_wire(self) -> WireValue {
                WireValue::$array(self)
            }

            fn from_wire(value: WireValue) -> Result<Self, WireValue> {
                match value {
                    WireValue::$array(v) => Ok(v),
                    other => Err(other),
                }
            }
        }
    };
}

impl_signal_type!(bool => Bool, BoolArray);
impl_signal_type!(i32 => Int32, Int32Array);
impl_signal_type!(i64 => Int64, Int64Array);
impl_signal_type!(u32 => Uint32, Uint32Array);
impl_signal_type!(u64 => Uint64, Uint64Array);
impl_signal_type!(f32 => Float, FloatArray);
impl_signal_type!(f64 => Double, DoubleArray);
impl_signal_type!(String => String, StringArray);

/// Classify a wire value received for `path`.
///
/// Sentinels become `NotAvailable` / `InvalidType`; a payload whose tag
/// differs from `expected` (when given) becomes `InvalidType`.
pub(crate) fn check_wire(
    path: &str,
    expected: Option<WireType>,
    wire: WireValue,
) -> Result<WireValue, SdkError> {
    let actual = wire.wire_type();
    match wire {
        WireValue::Unavailable => Err(SdkError::NotAvailable { path: path.into() }),
        WireValue::TypeMismatch { requested, actual } => Err(SdkError::InvalidType {
            path: path.into(),
            message: format!("broker cannot serve {requested}, signal is {actual}"),
        }),
        payload => match (expected, actual) {
            (Some(expected), Some(actual)) if expected != actual => Err(SdkError::InvalidType {
                path: path.into(),
                message: format!("expected {expected}, got {actual}"),
            }),
            _ => Ok(payload),
        },
    }
}

/// Decode a wire value into `T` for `path`.
pub(crate) fn decode<T: SignalType>(path: &str, wire: WireValue) -> Result<T, SdkError> {
    let wire = check_wire(path, Some(T::WIRE_TYPE), wire)?;
    T::from_wire(wire).map_err(|other| SdkError::InvalidType {
        path: path.into(),
        message: format!("expected {}, got {other}", T::WIRE_TYPE),
    })
}
