//! Declarative subtree definitions
//!
//! A [`SceneDefinition`] lists nodes in pre-order, each with its type, an
//! optional behavior name and initial property values. Instantiation builds
//! the whole subtree detached, so initial values are applied before any
//! `ENTER_TREE`/`READY` can fire; attaching the returned root is up to the
//! caller.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::SceneError;
use super::notification::DispatchReport;
use super::tree::SceneTree;
use crate::assets::{Asset, AssetError};
use crate::foundation::collections::NodeId;
use crate::meta::{Value, ValueKind};
use crate::object::Behavior;

/// Errors in a scene definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    /// Definition contains no node
    #[error("scene definition contains no nodes")]
    Empty,

    /// Parent index is missing, self-referential or not earlier than the node
    #[error("node {index} has invalid parent {parent:?}")]
    InvalidParent {
        /// Offending node index
        index: usize,
        /// Declared parent index
        parent: Option<usize>,
    },

    /// Behavior name not known to the factory
    #[error("no behavior registered as '{0}'")]
    UnknownBehavior(String),

    /// Text could not be parsed or written
    #[error("definition format error: {0}")]
    Parse(String),
}

/// One node of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Node name
    pub name: String,
    /// Registered type name
    pub type_name: String,
    /// Index of the parent in the definition; `None` only for the first node
    #[serde(default)]
    pub parent: Option<usize>,
    /// Behavior name resolved through a [`BehaviorFactory`]
    #[serde(default)]
    pub behavior: Option<String>,
    /// Initial property values, applied through the resolution chain
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl NodeDefinition {
    /// Node without behavior or initial values
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            parent: None,
            behavior: None,
            properties: BTreeMap::new(),
        }
    }

    /// Set the parent index
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the behavior name
    pub fn with_behavior(mut self, behavior: impl Into<String>) -> Self {
        self.behavior = Some(behavior.into());
        self
    }

    /// Add an initial property value
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Declarative description of a subtree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneDefinition {
    /// Nodes in pre-order; the first is the subtree root
    pub nodes: Vec<NodeDefinition>,
}

/// Result of instantiating a definition
#[derive(Debug)]
pub struct Instantiated {
    /// Detached root of the new subtree
    pub root: NodeId,
    /// Created nodes, in definition order
    pub nodes: Vec<NodeId>,
    /// Handler failures during construction and linking
    pub report: DispatchReport,
}

impl SceneDefinition {
    /// Empty definition
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, builder style
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Parse from RON text
    pub fn from_ron_str(text: &str) -> Result<Self, DefinitionError> {
        let definition: Self = ron::from_str(text).map_err(|e| DefinitionError::Parse(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Write as pretty RON text
    pub fn to_ron(&self) -> Result<String, DefinitionError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| DefinitionError::Parse(e.to_string()))
    }

    /// Check structure: non-empty, single root first, parents precede children
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let first = self.nodes.first().ok_or(DefinitionError::Empty)?;
        if first.parent.is_some() {
            return Err(DefinitionError::InvalidParent {
                index: 0,
                parent: first.parent,
            });
        }
        for (index, node) in self.nodes.iter().enumerate().skip(1) {
            match node.parent {
                Some(parent) if parent < index => {}
                parent => return Err(DefinitionError::InvalidParent { index, parent }),
            }
        }
        Ok(())
    }

    /// Build the subtree, detached from the tree
    ///
    /// Every node is constructed and gets its behavior (with code defaults)
    /// first, then definition values are written through the full
    /// resolution chain, overriding those defaults; only then are the nodes
    /// linked, which delivers `PARENTED` and nothing else. On failure every
    /// node created so far is freed.
    pub fn instantiate(&self, tree: &mut SceneTree, behaviors: &BehaviorFactory) -> Result<Instantiated, SceneError> {
        self.validate()?;
        let mut created = Vec::with_capacity(self.nodes.len());
        let mut report = DispatchReport::new();

        match self.build(tree, behaviors, &mut created, &mut report) {
            Ok(()) => {
                log::debug!("Instantiated {} node(s) from definition", created.len());
                Ok(Instantiated {
                    root: created[0],
                    nodes: created,
                    report,
                })
            }
            Err(error) => {
                log::warn!("Instantiation failed, freeing {} node(s): {error}", created.len());
                for &id in created.iter().rev() {
                    if tree.is_instance_valid(id) && matches!(tree.parent(id), Ok(None)) {
                        if let Err(cleanup) = tree.free(id) {
                            log::warn!("Could not free {id:?} after failed instantiation: {cleanup}");
                        }
                    }
                }
                Err(error)
            }
        }
    }

    fn build(
        &self,
        tree: &mut SceneTree,
        behaviors: &BehaviorFactory,
        created: &mut Vec<NodeId>,
        report: &mut DispatchReport,
    ) -> Result<(), SceneError> {
        for node in &self.nodes {
            let id = tree.create(&node.type_name, &node.name)?;
            created.push(id);
            if let Some(name) = &node.behavior {
                tree.set_behavior(id, Some(behaviors.create(name)?))?;
            }
        }

        for (node, &id) in self.nodes.iter().zip(created.iter()) {
            for (property, value) in &node.properties {
                tree.set(id, property, value.clone())?;
            }
        }
        report.merge(tree.take_report());

        for (node, &id) in self.nodes.iter().zip(created.iter()) {
            if let Some(parent) = node.parent {
                report.merge(tree.attach(created[parent], id)?);
            }
        }
        Ok(())
    }

    /// Record a live subtree: types, behavior names and exported values
    ///
    /// Node references are runtime handles and are not recorded.
    pub fn pack(tree: &SceneTree, root: NodeId) -> Result<Self, SceneError> {
        tree.ensure_alive(root)?;
        let order = tree.pre_order(root);
        let index_of: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        let mut nodes = Vec::with_capacity(order.len());
        for (i, &id) in order.iter().enumerate() {
            let object = tree.object(id)?;
            let mut properties = BTreeMap::new();
            for info in object.exported_properties() {
                let value = object.get(&info.name)?;
                if value.kind() != ValueKind::Node {
                    properties.insert(info.name, value);
                }
            }
            let parent = if i == 0 {
                None
            } else {
                tree.parent(id)?.and_then(|p| index_of.get(&p).copied())
            };
            nodes.push(NodeDefinition {
                name: object.base().name().to_string(),
                type_name: object.base().type_name().to_string(),
                parent,
                behavior: object.behavior().map(|b| b.behavior_name().to_string()),
                properties,
            });
        }
        Ok(Self { nodes })
    }
}

impl Asset for SceneDefinition {
    fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let text = std::str::from_utf8(bytes).map_err(|e| AssetError::InvalidData(e.to_string()))?;
        Self::from_ron_str(text).map_err(|e| AssetError::InvalidData(e.to_string()))
    }
}

type BehaviorCtor = Arc<dyn Fn() -> Box<dyn Behavior> + Send + Sync>;

/// Named behavior constructors used by definitions
#[derive(Default, Clone)]
pub struct BehaviorFactory {
    constructors: HashMap<String, BehaviorCtor>,
}

impl BehaviorFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a name, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Behavior> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Register a cloneable prototype under its own behavior name
    pub fn register_prototype<B>(&mut self, prototype: B) -> &mut Self
    where
        B: Behavior + Clone + Sync + 'static,
    {
        let name = prototype.behavior_name().to_string();
        self.register(name, move || -> Box<dyn Behavior> { Box::new(prototype.clone()) })
    }

    /// Construct a behavior by name
    pub fn create(&self, name: &str) -> Result<Box<dyn Behavior>, DefinitionError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| DefinitionError::UnknownBehavior(name.to_string()))
    }

    /// Whether a constructor is registered
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

impl fmt::Debug for BehaviorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("BehaviorFactory").field("behaviors", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_structure() {
        assert_eq!(SceneDefinition::new().validate(), Err(DefinitionError::Empty));

        let rooted_twice = SceneDefinition::new()
            .with_node(NodeDefinition::new("a", "Node"))
            .with_node(NodeDefinition::new("b", "Node"));
        assert!(matches!(
            rooted_twice.validate(),
            Err(DefinitionError::InvalidParent { index: 1, parent: None })
        ));

        let forward = SceneDefinition::new()
            .with_node(NodeDefinition::new("a", "Node"))
            .with_node(NodeDefinition::new("b", "Node").with_parent(1));
        assert!(forward.validate().is_err());
    }

    #[test]
    fn test_parse_ron() {
        let text = r#"(
            nodes: [
                (name: "Level", type_name: "Node"),
                (name: "Player", type_name: "Node", parent: Some(0), behavior: Some("player"),
                 properties: { "hp": Int(5) }),
            ],
        )"#;
        let definition = SceneDefinition::from_ron_str(text).unwrap();
        assert_eq!(definition.nodes.len(), 2);
        assert_eq!(definition.nodes[1].behavior.as_deref(), Some("player"));
        assert_eq!(definition.nodes[1].properties["hp"], Value::Int(5));

        let again = SceneDefinition::from_ron_str(&definition.to_ron().unwrap()).unwrap();
        assert_eq!(again, definition);
    }

    #[test]
    fn test_asset_rejects_bad_bytes() {
        assert!(matches!(
            SceneDefinition::from_bytes(b"(nodes: [])"),
            Err(AssetError::InvalidData(_))
        ));
        assert!(SceneDefinition::from_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_factory_unknown_behavior() {
        let factory = BehaviorFactory::new();
        assert!(matches!(factory.create("ghost"), Err(DefinitionError::UnknownBehavior(_))));
    }
}
