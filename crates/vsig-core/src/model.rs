// ── Model roots ──
//
// `Model` is a branch of the signal tree that carries the context its
// data points talk through. Generated vehicle models are built from
// `Model::root`, `Model::branch` and the leaf factories. A `Service` is
// a branch naming a remote service whose address comes from service
// discovery.

use std::collections::BTreeMap;

use crate::batch::DataPointBatch;
use crate::context::ModelContext;
use crate::datapoint::DataPoint;
use crate::error::SdkError;
use crate::node::{Node, Role};
use crate::value::SignalType;

/// Key/value metadata a service needs to be reached (headers, tokens).
pub type ServiceMetadata = BTreeMap<String, String>;

/// Resolves service names to reachable endpoints.
pub trait ServiceDiscovery: Send + Sync {
    /// Address of `service`, e.g. `localhost:55555`.
    fn location(&self, service: &str) -> Result<String, SdkError>;

    /// Extra metadata to attach to requests sent to `service`.
    fn metadata(&self, service: &str) -> Result<ServiceMetadata, SdkError>;
}

// ── Model ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Model {
    node: Node,
    ctx: ModelContext,
}

impl Model {
    pub fn root(name: impl Into<String>, ctx: &ModelContext) -> Self {
        Self {
            node: Node::root(name),
            ctx: ctx.clone(),
        }
    }

    pub fn branch(parent: &Model, name: impl Into<String>) -> Self {
        Self {
            node: Node::new(name, Some(&parent.node), Role::Branch),
            ctx: parent.ctx.clone(),
        }
    }

    pub fn sensor<T: SignalType>(&self, name: impl Into<String>) -> DataPoint<T> {
        DataPoint::new(name, &self.node, Role::Sensor, &self.ctx)
    }

    pub fn actuator<T: SignalType>(&self, name: impl Into<String>) -> DataPoint<T> {
        DataPoint::new(name, &self.node, Role::Actuator, &self.ctx)
    }

    pub fn attribute<T: SignalType>(&self, name: impl Into<String>) -> DataPoint<T> {
        DataPoint::new(name, &self.node, Role::Attribute, &self.ctx)
    }

    /// Start a batch of writes (or reads) against this model's broker.
    pub fn set_many(&self) -> DataPointBatch {
        self.ctx.batch()
    }

    pub fn batch(&self) -> DataPointBatch {
        self.ctx.batch()
    }

    /// Look up a node by full path, starting with this model's name.
    pub fn find(&self, path: &str) -> Option<Node> {
        self.node.find(path)
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

    pub fn context(&self) -> &ModelContext {
        &self.ctx
    }
}

impl AsRef<Node> for Model {
    fn as_ref(&self) -> &Node {
        &self.node
    }
}

// ── Service ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Service {
    model: Model,
}

impl Service {
    pub fn new(name: impl Into<String>, parent: &Model) -> Self {
        Self {
            model: Model::branch(parent, name),
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn location(&self, discovery: &dyn ServiceDiscovery) -> Result<String, SdkError> {
        discovery.location(self.name())
    }

    pub fn metadata(&self, discovery: &dyn ServiceDiscovery) -> Result<ServiceMetadata, SdkError> {
        discovery.metadata(self.name())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }
}
