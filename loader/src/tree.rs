// tree.rs — Resource tree builder
//
// Owns every decoded resource of one mod. Node 0 is the mod itself; every
// other node is attached exactly once under a container, and parent links
// live here rather than in the resources.
//
// Preconditions: the root resource is a `Mod`.
// Postconditions: (kind, short name) pairs are unique across the tree;
//   parent links are set at attachment and never reassigned.
// Failure modes: `AttachError` on collision or non-container parent.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use thiserror::Error;

use crate::id::ResourceId;
use crate::resource::{Resource, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("a {kind} named \"{name}\" is already defined")]
    NameCollision { kind: ResourceKind, name: String },
    #[error("a {parent} cannot contain a {child}")]
    NotAContainer {
        parent: ResourceKind,
        child: ResourceKind,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub resource: Resource,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
}

/// A decoded resource plus nested children decoded in the same attempt.
#[derive(Debug, Clone)]
pub struct DecodedNode {
    pub resource: Resource,
    pub children: Vec<DecodedNode>,
}

impl DecodedNode {
    pub fn leaf(resource: Resource) -> Self {
        DecodedNode {
            resource,
            children: Vec::new(),
        }
    }

    /// Apply `f` to this resource and every nested one.
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut Resource)) {
        f(&mut self.resource);
        for child in &mut self.children {
            child.for_each_mut(f);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModTree {
    nodes: Vec<Node>,
    index: HashMap<(ResourceKind, String), ResourceId>,
}

impl ModTree {
    pub fn new(root: Resource) -> Self {
        ModTree {
            nodes: vec![Node {
                resource: root,
                parent: None,
                children: Vec::new(),
            }],
            index: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Resource {
        &self.nodes[0].resource
    }

    /// The mod resource. Its properties may be filled in at any point, for
    /// instance when the `mod` block decodes after other resources are
    /// attached. Child links and the name index are not affected.
    pub fn root_mut(&mut self) -> &mut Resource {
        &mut self.nodes[0].resource
    }

    pub fn mod_name(&self) -> &str {
        &self.root().short_name
    }

    pub fn node(&self, id: ResourceId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.node(id).map(|n| &n.resource)
    }

    pub fn parent_of(&self, id: ResourceId) -> Option<ResourceId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children_of(&self, id: ResourceId) -> &[ResourceId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn lookup(&self, kind: ResourceKind, short_name: &str) -> Option<&Resource> {
        let id = self.lookup_id(kind, short_name)?;
        self.get(id)
    }

    pub fn lookup_id(&self, kind: ResourceKind, short_name: &str) -> Option<ResourceId> {
        self.index.get(&(kind, short_name.to_string())).copied()
    }

    /// Number of attached resources (the mod excluded).
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attached resources in attachment order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.nodes.iter().skip(1).map(|n| &n.resource)
    }

    /// Attach `resource` under `parent`.
    pub fn attach(&mut self, resource: Resource, parent: ResourceId) -> Result<ResourceId, AttachError> {
        self.check(&resource, parent)?;
        Ok(self.insert(resource, parent))
    }

    /// Attach a resource and its nested children as one unit: either the
    /// whole subtree is attached or nothing is.
    pub fn attach_subtree(
        &mut self,
        node: DecodedNode,
        parent: ResourceId,
    ) -> Result<ResourceId, AttachError> {
        let mut seen = Vec::new();
        self.check_subtree(&node, parent_kind(self, parent), &mut seen)?;
        Ok(self.insert_subtree(node, parent))
    }

    fn check(&self, resource: &Resource, parent: ResourceId) -> Result<(), AttachError> {
        let parent_kind = parent_kind(self, parent);
        if !parent_kind.can_contain(resource.kind) {
            return Err(AttachError::NotAContainer {
                parent: parent_kind,
                child: resource.kind,
            });
        }
        if self.lookup_id(resource.kind, &resource.short_name).is_some() {
            return Err(AttachError::NameCollision {
                kind: resource.kind,
                name: resource.short_name.clone(),
            });
        }
        Ok(())
    }

    fn check_subtree(
        &self,
        node: &DecodedNode,
        parent_kind: ResourceKind,
        seen: &mut Vec<(ResourceKind, String)>,
    ) -> Result<(), AttachError> {
        let r = &node.resource;
        if !parent_kind.can_contain(r.kind) {
            return Err(AttachError::NotAContainer {
                parent: parent_kind,
                child: r.kind,
            });
        }
        let key = (r.kind, r.short_name.clone());
        if self.index.contains_key(&key) || seen.contains(&key) {
            return Err(AttachError::NameCollision {
                kind: r.kind,
                name: r.short_name.clone(),
            });
        }
        seen.push(key);
        for child in &node.children {
            self.check_subtree(child, r.kind, seen)?;
        }
        Ok(())
    }

    fn insert(&mut self, resource: Resource, parent: ResourceId) -> ResourceId {
        let id = ResourceId(self.nodes.len() as u32);
        self.index
            .insert((resource.kind, resource.short_name.clone()), id);
        self.nodes.push(Node {
            resource,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    fn insert_subtree(&mut self, node: DecodedNode, parent: ResourceId) -> ResourceId {
        let id = self.insert(node.resource, parent);
        for child in node.children {
            self.insert_subtree(child, id);
        }
        id
    }

    /// Node ids in depth-first order, paired with their depth.
    pub fn walk(&self) -> Vec<(usize, ResourceId)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0usize, ResourceId::ROOT)];
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            for &child in self.children_of(id).iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

fn parent_kind(tree: &ModTree, parent: ResourceId) -> ResourceKind {
    tree.get(parent).map(|r| r.kind).unwrap_or(ResourceKind::Mod)
}

impl fmt::Display for ModTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, id) in self.walk() {
            if let Some(r) = self.get(id) {
                writeln!(f, "{:indent$}{}", "", r.full_name, indent = depth * 2)?;
            }
        }
        Ok(())
    }
}

struct NodeView<'a> {
    tree: &'a ModTree,
    id: ResourceId,
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let children: Vec<NodeView<'_>> = self
            .tree
            .children_of(self.id)
            .iter()
            .map(|&id| NodeView {
                tree: self.tree,
                id,
            })
            .collect();
        let mut s = serializer.serialize_struct("Node", 2)?;
        s.serialize_field("resource", &self.tree.get(self.id))?;
        s.serialize_field("children", &children)?;
        s.end()
    }
}

impl Serialize for ModTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeView {
            tree: self,
            id: ResourceId::ROOT,
        }
        .serialize(serializer)
    }
}
