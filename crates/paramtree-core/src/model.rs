//! Tree state model: nodes, leaf payloads and structural operations.

use std::collections::HashMap;
use std::fmt;

use generational_arena::{Arena, Index};
use paramtree_xml::{DeclKind, InputDecl, LeafDecl, NodeDecl, Occurs, TemplateModel};
use tracing::{debug, warn};

use crate::validate::{validate_leaf, RestrictionSet, Validity, ValueType};
use crate::TreeError;

/// Stable handle to a node of a [`ParameterTree`].
///
/// Handles of removed nodes are never reused for other nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) Index);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.0.into_raw_parts();
        write!(f, "#{index}.{generation}")
    }
}

/// How a leaf value is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafInput {
    /// Display-only leaf; always valid once enabled.
    None,
    Text,
    Select(Vec<String>),
    File,
}

impl From<&InputDecl> for LeafInput {
    fn from(decl: &InputDecl) -> Self {
        match decl {
            InputDecl::None => LeafInput::None,
            InputDecl::Text => LeafInput::Text,
            InputDecl::Select(options) => LeafInput::Select(options.clone()),
            InputDecl::File => LeafInput::File,
        }
    }
}

/// File attached to a file leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileValue {
    /// File name as entered, possibly including a client-side path.
    pub name: String,
    /// Text contents when they were read.
    pub contents: Option<String>,
}

impl FileValue {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            contents: None,
        }
    }

    pub fn with_contents<S: Into<String>>(mut self, contents: S) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// File name with any directory prefix removed.
    pub fn base_name(&self) -> &str {
        self.name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.name.as_str())
    }
}

/// Payload of a leaf node.
#[derive(Debug, Clone)]
pub struct LeafData {
    pub value_type: ValueType,
    pub input: LeafInput,
    pub restrictions: Option<RestrictionSet>,
    has_unit: bool,
    value: String,
    unit: String,
    file: Option<FileValue>,
    verdict: Validity,
}

impl LeafData {
    fn from_decl(name: &str, decl: &LeafDecl) -> Self {
        let value_type = ValueType::from_decl(&decl.value_type).unwrap_or_else(|| {
            warn!(node = %name, value_type = %decl.value_type, "unknown value type, treating as string");
            ValueType::String
        });
        let mut leaf = LeafData {
            value_type,
            input: LeafInput::from(&decl.input),
            restrictions: decl.restrictions.as_deref().map(RestrictionSet::from_json),
            has_unit: decl.unit,
            value: String::new(),
            unit: String::new(),
            file: None,
            verdict: Validity::Unset,
        };
        if let Some(default) = &decl.default {
            if leaf.input == LeafInput::File {
                leaf.file = Some(FileValue::new(default.clone()));
            }
            leaf.value = default.clone();
            leaf.revalidate();
        }
        leaf
    }

    /// Leaves without an input are markers, not questions.
    pub fn has_input(&self) -> bool {
        !matches!(self.input, LeafInput::None)
    }

    pub fn has_unit(&self) -> bool {
        self.has_unit
    }

    /// Current raw value: typed text, selected option, or file name.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn unit(&self) -> Option<&str> {
        self.has_unit.then_some(self.unit.as_str())
    }

    pub fn file(&self) -> Option<&FileValue> {
        self.file.as_ref()
    }

    /// Verdict of the last validation of the current value.
    pub fn verdict(&self) -> &Validity {
        &self.verdict
    }

    fn revalidate(&mut self) {
        self.verdict = validate_leaf(&self.value, self.value_type, self.restrictions.as_ref());
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Leaf(LeafData),
    Branch {
        /// Children are mutually exclusive alternatives.
        choice: bool,
        /// Selected alternative of a choice group.
        chosen: Option<NodeId>,
    },
}

/// A node of the parameter tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub(crate) name: String,
    pub(crate) optional: bool,
    pub(crate) min_occurs: u32,
    pub(crate) max_occurs: Occurs,
    pub(crate) kind: NodeKind,
    pub(crate) enabled: bool,
    pub(crate) validity: Validity,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) repeated: bool,
    pub(crate) loaded: bool,
}

impl TreeNode {
    /// Fully-qualified element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn min_occurs(&self) -> u32 {
        self.min_occurs
    }

    pub fn max_occurs(&self) -> Occurs {
        self.max_occurs
    }

    pub fn is_repeatable(&self) -> bool {
        self.max_occurs.is_repeatable()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn leaf(&self) -> Option<&LeafData> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Branch { .. } => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, NodeKind::Branch { choice: true, .. })
    }

    pub fn chosen(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Branch { chosen, .. } => chosen,
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node was created at runtime by repeating a branch.
    pub fn is_repeated_copy(&self) -> bool {
        self.repeated
    }
}

/// Tree construction options.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// Start optional branches disabled.
    pub disable_optional_branches: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            disable_optional_branches: true,
        }
    }
}

/// Notification delivered to the observers of exactly one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityEvent {
    pub node: NodeId,
    pub validity: Validity,
}

/// Callback invoked each time the validity of its node is recomputed.
pub type ValidityObserver = Box<dyn FnMut(&ValidityEvent) + Send>;

/// In-memory parameter tree built from a template description.
pub struct ParameterTree {
    pub(crate) nodes: Arena<TreeNode>,
    pub(crate) root: NodeId,
    pub(crate) observers: HashMap<NodeId, Vec<ValidityObserver>>,
}

impl fmt::Debug for ParameterTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterTree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("observed", &self.observers.len())
            .finish()
    }
}

impl ParameterTree {
    /// Build a tree from a parsed template and compute initial validity.
    pub fn from_template(model: &TemplateModel, options: &TreeOptions) -> Self {
        Self::from_decl(&model.root, options)
    }

    /// Build a tree rooted at `decl`.
    pub fn from_decl(decl: &NodeDecl, options: &TreeOptions) -> Self {
        let mut nodes = Arena::new();
        let root = insert_decl(&mut nodes, decl, None, options);
        let mut tree = ParameterTree {
            nodes,
            root,
            observers: HashMap::new(),
        };
        tree.revalidate_all();
        debug!(root = %decl.name, nodes = tree.nodes.len(), "built parameter tree");
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(TreeNode::parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(TreeNode::children).unwrap_or(&[])
    }

    pub fn validity(&self, id: NodeId) -> Option<&Validity> {
        self.node(id).map(TreeNode::validity)
    }

    /// The whole tree is ready for submission.
    pub fn is_complete(&self) -> bool {
        self.nodes[self.root.0].validity.is_valid()
    }

    /// Children of `parent` carrying the given element name, in order.
    pub fn children_named<'a>(
        &'a self,
        parent: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(parent)
            .iter()
            .copied()
            .filter(move |child| self.nodes[child.0].name == name)
    }

    /// Last child of `parent` with the given name; repeated copies sort last.
    pub fn last_child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(parent, name).last()
    }

    /// Resolve a path such as `Output[1]/Path`, relative to the root.
    ///
    /// `[i]` selects the i-th sibling of that name, counting from zero.
    pub fn find(&self, path: &str) -> Result<NodeId, TreeError> {
        let mut current = self.root;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let (name, index) = parse_segment(segment)?;
            current = self
                .children_named(current, name)
                .nth(index)
                .ok_or_else(|| TreeError::NodeNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Inverse of [`ParameterTree::find`].
    pub fn path_of(&self, id: NodeId) -> Result<String, TreeError> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        let mut current_id = id;
        while let Some(parent) = current.parent {
            let index = self
                .children_named(parent, &current.name)
                .position(|sibling| sibling == current_id)
                .unwrap_or(0);
            if index == 0 {
                segments.push(current.name.clone());
            } else {
                segments.push(format!("{}[{index}]", current.name));
            }
            current_id = parent;
            current = &self.nodes[parent.0];
        }
        segments.reverse();
        Ok(segments.join("/"))
    }

    /// `id` and everything below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// All leaves in document order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.nodes[id.0].is_leaf())
            .collect()
    }

    /// The node and all its ancestors are enabled and chosen where a choice applies.
    pub fn is_active(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            let Some(node) = self.node(current) else {
                return false;
            };
            if !node.enabled {
                return false;
            }
            let Some(parent) = node.parent else {
                return true;
            };
            let parent_node = &self.nodes[parent.0];
            if parent_node.is_choice() && parent_node.chosen() != Some(current) {
                return false;
            }
            current = parent;
        }
    }

    /// Type a value into a leaf, validate it and propagate the result.
    pub fn set_value(&mut self, id: NodeId, raw: &str) -> Result<Validity, TreeError> {
        let name = self.get(id)?.name.clone();
        let leaf = self.leaf_mut(id)?;
        match &leaf.input {
            LeafInput::None => return Err(TreeError::InputKind(name)),
            LeafInput::Select(options) => {
                if !raw.is_empty() && !options.iter().any(|option| option == raw) {
                    return Err(TreeError::UnknownOption {
                        node: name,
                        option: raw.to_string(),
                    });
                }
            }
            LeafInput::File => {
                leaf.file = (!raw.is_empty()).then(|| FileValue::new(raw));
            }
            LeafInput::Text => {}
        }
        leaf.value = raw.to_string();
        leaf.revalidate();
        let verdict = leaf.verdict.clone();
        debug!(node = %name, value = raw, verdict = %verdict, "leaf value changed");
        self.recompute_validity(id)?;
        Ok(verdict)
    }

    /// Pick one of the options of a drop-down leaf.
    pub fn select_option(&mut self, id: NodeId, option: &str) -> Result<Validity, TreeError> {
        let node = self.get(id)?;
        match node.leaf() {
            Some(LeafData {
                input: LeafInput::Select(_),
                ..
            }) => self.set_value(id, option),
            Some(_) => Err(TreeError::InputKind(node.name.clone())),
            None => Err(TreeError::NotALeaf(node.name.clone())),
        }
    }

    /// Attach a file to a file leaf; the file name is what gets validated.
    pub fn set_file(&mut self, id: NodeId, file: FileValue) -> Result<Validity, TreeError> {
        let name = self.get(id)?.name.clone();
        let leaf = self.leaf_mut(id)?;
        if leaf.input != LeafInput::File {
            return Err(TreeError::InputKind(name));
        }
        leaf.value = file.name.clone();
        leaf.file = Some(file);
        leaf.revalidate();
        let verdict = leaf.verdict.clone();
        self.recompute_validity(id)?;
        Ok(verdict)
    }

    pub fn set_unit(&mut self, id: NodeId, unit: &str) -> Result<(), TreeError> {
        let name = self.get(id)?.name.clone();
        let leaf = self.leaf_mut(id)?;
        if !leaf.has_unit {
            return Err(TreeError::NoUnit(name));
        }
        leaf.unit = unit.trim().to_string();
        Ok(())
    }

    /// Enable or disable an optional branch.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), TreeError> {
        let node = self.get(id)?;
        if !node.optional {
            return Err(TreeError::NotOptional(node.name.clone()));
        }
        self.apply_enabled(id, enabled)
    }

    /// Flip an optional branch and return its new state.
    pub fn toggle(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let enabled = !self.get(id)?.enabled;
        self.set_enabled(id, enabled)?;
        Ok(enabled)
    }

    pub(crate) fn apply_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), TreeError> {
        let node = self.get_mut(id)?;
        node.enabled = enabled;
        debug!(node = %node.name, enabled, "branch toggled");
        self.recompute_validity(id)
    }

    /// Make `child` the selected alternative of the choice group `group`.
    pub fn select_choice(&mut self, group: NodeId, child: NodeId) -> Result<(), TreeError> {
        let node = self.get(group)?;
        if !node.is_choice() {
            return Err(TreeError::NotAChoice(node.name.clone()));
        }
        if !node.children.contains(&child) {
            let child_name = self
                .node(child)
                .map(|child| child.name.clone())
                .unwrap_or_else(|| child.to_string());
            return Err(TreeError::NotAChoiceMember {
                group: node.name.clone(),
                child: child_name,
            });
        }
        if let NodeKind::Branch { chosen, .. } = &mut self.nodes[group.0].kind {
            *chosen = Some(child);
        }
        debug!(group = %self.nodes[group.0].name, chosen = %self.nodes[child.0].name, "choice selected");
        self.recompute_validity(child)
    }

    /// Insert a copy of a repeatable branch directly after it.
    pub fn repeat(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let node = self.get(id)?;
        let name = node.name.clone();
        let max_occurs = node.max_occurs;
        let parent = match node.parent {
            Some(parent) if max_occurs.is_repeatable() => parent,
            _ => return Err(TreeError::NotRepeatable(name)),
        };
        let count = self.children_named(parent, &name).count();
        if !max_occurs.allows(count + 1) {
            return Err(TreeError::MaxOccurs(name));
        }

        let copy = self.copy_subtree(id, parent);
        self.nodes[copy.0].repeated = true;
        let siblings = &mut self.nodes[parent.0].children;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .map_or(siblings.len(), |position| position + 1);
        siblings.insert(position, copy);
        debug!(node = %name, occurrences = count + 1, "branch repeated");
        self.recompute_validity(copy)?;
        Ok(copy)
    }

    /// Remove a repeated copy together with its subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.get(id)?;
        let parent = match node.parent {
            Some(parent) if node.repeated => parent,
            _ => return Err(TreeError::NotRemovable(node.name.clone())),
        };
        let name = node.name.clone();
        for removed in self.descendants(id) {
            self.nodes.remove(removed.0);
            self.observers.remove(&removed);
        }
        let parent_node = &mut self.nodes[parent.0];
        parent_node.children.retain(|child| *child != id);
        if let NodeKind::Branch { chosen, .. } = &mut parent_node.kind {
            if *chosen == Some(id) {
                *chosen = None;
            }
        }
        debug!(node = %name, "repeated branch removed");
        self.recompute_validity(parent)
    }

    /// Register a callback for validity recomputations of `id` only.
    pub fn observe<F>(&mut self, id: NodeId, observer: F) -> Result<(), TreeError>
    where
        F: FnMut(&ValidityEvent) + Send + 'static,
    {
        self.get(id)?;
        self.observers.entry(id).or_default().push(Box::new(observer));
        Ok(())
    }

    /// Detach and return the observers of `id`, e.g. to move them to another tree.
    pub fn take_observers(&mut self, id: NodeId) -> Vec<ValidityObserver> {
        self.observers.remove(&id).unwrap_or_default()
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&TreeNode, TreeError> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, TreeError> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
    }

    fn leaf_mut(&mut self, id: NodeId) -> Result<&mut LeafData, TreeError> {
        let node = self.get_mut(id)?;
        match &mut node.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Branch { .. } => Err(TreeError::NotALeaf(node.name.clone())),
        }
    }

    pub(crate) fn reset_loaded(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.loaded = false;
        }
    }

    pub(crate) fn mark_loaded(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.loaded = true;
        }
    }

    /// Deep copy with independent state; the copy is attached to `parent`
    /// but not yet listed among its children.
    fn copy_subtree(&mut self, source: NodeId, parent: NodeId) -> NodeId {
        let mut node = self.nodes[source.0].clone();
        let originals = std::mem::take(&mut node.children);
        node.parent = Some(parent);
        node.loaded = false;
        let id = NodeId(self.nodes.insert(node));

        let copies: Vec<NodeId> = originals
            .iter()
            .map(|child| self.copy_subtree(*child, id))
            .collect();
        let chosen = match &self.nodes[id.0].kind {
            NodeKind::Branch {
                chosen: Some(old), ..
            } => originals
                .iter()
                .position(|child| child == old)
                .map(|position| copies[position]),
            _ => None,
        };
        let node = &mut self.nodes[id.0];
        if let NodeKind::Branch {
            chosen: selected, ..
        } = &mut node.kind
        {
            *selected = chosen;
        }
        node.children = copies;
        id
    }
}

fn insert_decl(
    nodes: &mut Arena<TreeNode>,
    decl: &NodeDecl,
    parent: Option<NodeId>,
    options: &TreeOptions,
) -> NodeId {
    let kind = match &decl.kind {
        DeclKind::Leaf(leaf) => NodeKind::Leaf(LeafData::from_decl(&decl.name, leaf)),
        DeclKind::Branch { choice, .. } => NodeKind::Branch {
            choice: *choice,
            chosen: None,
        },
    };
    let enabled = parent.is_none() || !(decl.optional && options.disable_optional_branches);
    let id = NodeId(nodes.insert(TreeNode {
        name: decl.name.clone(),
        optional: decl.optional,
        min_occurs: decl.min_occurs,
        max_occurs: decl.max_occurs,
        kind,
        enabled,
        validity: Validity::Unset,
        parent,
        children: Vec::new(),
        repeated: false,
        loaded: false,
    }));
    let children = decl
        .children()
        .iter()
        .map(|child| insert_decl(nodes, child, Some(id), options))
        .collect();
    nodes[id.0].children = children;
    id
}

fn parse_segment(segment: &str) -> Result<(&str, usize), TreeError> {
    match segment.strip_suffix(']').and_then(|rest| rest.split_once('[')) {
        Some((name, index)) => {
            let index = index
                .parse()
                .map_err(|_| TreeError::Path(format!("bad index in segment '{segment}'")))?;
            Ok((name, index))
        }
        None if segment.contains(['[', ']']) => {
            Err(TreeError::Path(format!("malformed segment '{segment}'")))
        }
        None => Ok((segment, 0)),
    }
}
