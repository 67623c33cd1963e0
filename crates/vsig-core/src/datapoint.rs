// ── Typed data points ──
//
// A `DataPoint<T>` is a leaf node of the signal tree bound to a model
// context. Reads are checked against `T`'s wire type; writes are only
// attempted for actuators.

use std::fmt;
use std::marker::PhantomData;

use vsig_api::WireType;

use tracing::trace;

use crate::async_result::{AsyncResult, AsyncSubscription};
use crate::context::ModelContext;
use crate::error::SdkError;
use crate::node::{Node, Role};
use crate::value::{Sample, SignalType, decode};

pub struct DataPoint<T> {
    node: Node,
    ctx: ModelContext,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for DataPoint<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            ctx: self.ctx.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: SignalType> DataPoint<T> {
    /// Create the data point and register it under `parent`.
    pub fn new(name: impl Into<String>, parent: &Node, role: Role, ctx: &ModelContext) -> Self {
        Self {
            node: Node::new(name, Some(parent), role),
            ctx: ctx.clone(),
            _value: PhantomData,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn path(&self) -> &str {
        self.node.path()
    }

    pub fn role(&self) -> Role {
        self.node.role()
    }

    pub fn wire_type(&self) -> WireType {
        T::WIRE_TYPE
    }

    pub fn context(&self) -> &ModelContext {
        &self.ctx
    }

    /// Read the current value from the broker.
    pub fn get(&self) -> AsyncResult<T> {
        let path = self.path().to_owned();
        self.ctx.dispatch("get", self.path(), move |transport| async move {
            let wire = transport.send_get(&path).await?;
            decode::<T>(&path, wire)
        })
    }

    /// Read the current value along with when the broker last updated it.
    pub fn get_sample(&self) -> AsyncResult<Sample<T>> {
        let path = self.path().to_owned();
        self.ctx.dispatch("get", self.path(), move |transport| async move {
            let reading = transport.send_get_reading(&path).await?;
            Ok(Sample {
                value: decode::<T>(&path, reading.value)?,
                timestamp: reading.timestamp,
            })
        })
    }

    /// Follow changes to this signal.
    ///
    /// The broker first reports the current value, if there is one, then
    /// every later change in order. Updates without a value are skipped;
    /// a value of the wrong type or a transport failure ends the
    /// subscription.
    pub fn subscribe(&self) -> AsyncSubscription<Sample<T>> {
        let path = self.path().to_owned();
        self.ctx
            .subscribe_with(self.path(), vec![path], |update| {
                if update.value.is_unavailable() {
                    trace!(path = %update.path, "skipping update without a value");
                    return Ok(None);
                }
                let value = decode::<T>(&update.path, update.value)?;
                Ok(Some(Sample {
                    value,
                    timestamp: Some(update.timestamp),
                }))
            })
    }

    /// Write a new target value. Only actuators accept writes.
    pub fn set(&self, value: T) -> AsyncResult<()> {
        if self.role() != Role::Actuator {
            return AsyncResult::failed(SdkError::NotActuator {
                path: self.path().to_owned(),
            });
        }

        let path = self.path().to_owned();
        let wire = value.into_wire();
        self.ctx.dispatch("set", self.path(), move |transport| async move {
            transport.send_set(&path, wire).await.map_err(SdkError::from)
        })
    }
}

impl<T> AsRef<Node> for DataPoint<T> {
    fn as_ref(&self) -> &Node {
        &self.node
    }
}

impl<T: SignalType> fmt::Debug for DataPoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPoint")
            .field("path", &self.node.path())
            .field("role", &self.node.role())
            .field("type", &T::WIRE_TYPE)
            .finish_non_exhaustive()
    }
}
