// ast.rs - Arena-backed Oniguruma AST.
//
// Nodes live in a flat Vec; ids are indices and parents are non-owning
// indices, so subtree cloning and in-place rewriting never touch pointers.
// Ownership flows through the child vectors (`alternatives`, `elements`,
// `classes`); `parent` exists for navigation only. Detached nodes stay in
// the arena and are simply never reached again.

use crate::options::OnigFlags;

pub type NodeId = u32;

/// Upper bound of a quantifier with no maximum.
pub const UNBOUNDED: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    NonCapturing,
    /// `(?>…)` - backtracking into the group is cut once it matches.
    Atomic,
    /// `(?~…)` - matches the longest run not containing the body.
    Absent,
    /// `(?imx-imx:…)` - flag-scoped group.
    Flags { on: OnigFlags, off: OnigFlags },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    /// `^` - start of line.
    LineStart,
    /// `$` - end of line.
    LineEnd,
    /// `\A` - start of string.
    StringStart,
    /// `\z` - end of string.
    StringEnd,
    /// `\Z` - end of string, before a final newline.
    StringEndNewline,
    /// `\b` / `\B`.
    WordBoundary { negate: bool },
    /// `\G` - where the current match attempt began.
    SearchStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `(?imx-imx)` - flags for the rest of the current alternative.
    Flags { on: OnigFlags, off: OnigFlags },
    /// `\K` - keep: drop everything matched so far from the result.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacterSetKind {
    /// `.`
    Dot,
    /// `\O` - any character including newline.
    Any,
    /// `\N` - any character except newline.
    NonNewline,
    /// `\d` (kept only when ASCII digits are in effect).
    Digit,
    /// `\h` - hex digit.
    Hex,
    /// `\s`.
    Space,
    /// `\w`.
    Word,
    /// `[:name:]`.
    Posix(String),
    /// `\p{Name}`, canonicalized to the target spelling by the transformer.
    Property(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierKind {
    Greedy,
    Lazy,
    Possessive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarLenKind {
    /// `\X` - extended grapheme cluster.
    Grapheme,
    /// `\R` - general newline.
    Newline,
}

/// What a backreference or subroutine points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Number(u32),
    Name(String),
    /// Direct node reference, used by transformer-created backreferences.
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionTarget {
    /// `\g<0>` - the whole pattern.
    Pattern,
    /// A call to an enclosing capturing group.
    Group(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Regex { pattern: NodeId, flags: OnigFlags },
    Pattern { alternatives: Vec<NodeId> },
    Alternative { elements: Vec<NodeId> },
    Group { kind: GroupKind, alternatives: Vec<NodeId> },
    CapturingGroup {
        number: u32,
        name: Option<String>,
        hidden: bool,
        alternatives: Vec<NodeId>,
    },
    Lookaround { behind: bool, negate: bool, alternatives: Vec<NodeId> },
    Assertion(AssertionKind),
    Backreference { to: RefTarget, orphan: bool },
    Subroutine { to: RefTarget },
    Character { value: u32 },
    CharacterClass { negate: bool, elements: Vec<NodeId> },
    CharacterClassRange { min: u32, max: u32 },
    CharacterClassIntersection { classes: Vec<NodeId> },
    CharacterSet { kind: CharacterSetKind, negate: bool },
    Directive(DirectiveKind),
    Quantifier { min: u32, max: u32, kind: QuantifierKind, element: NodeId },
    VariableLengthCharacterSet(VarLenKind),
    /// Bounded self-recursion; produced by the transformer, expanded by the
    /// generator. Never built by the parser.
    Recursion { target: RecursionTarget },
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// The AST arena. `root` is always a `Regex` node once parsing finishes.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    pub root: NodeId,
}

impl Tree {
    pub fn new() -> Tree {
        Tree { nodes: Vec::new(), root: 0 }
    }

    pub fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node { parent, kind });
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id as usize].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id as usize].kind
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id as usize].kind = kind;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id as usize].parent
    }

    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.nodes[id as usize].parent = parent;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The Oniguruma flags stored on the root `Regex` node.
    pub fn flags(&self) -> OnigFlags {
        match self.kind(self.root) {
            NodeKind::Regex { flags, .. } => *flags,
            _ => OnigFlags::empty(),
        }
    }

    /// Child ids of a node, in source order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Regex { pattern, .. } => vec![*pattern],
            NodeKind::Pattern { alternatives }
            | NodeKind::Group { alternatives, .. }
            | NodeKind::CapturingGroup { alternatives, .. }
            | NodeKind::Lookaround { alternatives, .. } => alternatives.clone(),
            NodeKind::Alternative { elements } => elements.clone(),
            NodeKind::CharacterClass { elements, .. } => elements.clone(),
            NodeKind::CharacterClassIntersection { classes } => classes.clone(),
            NodeKind::Quantifier { element, .. } => vec![*element],
            _ => Vec::new(),
        }
    }

    /// The alternative list of a group-like node, if it has one.
    pub fn alternatives_mut(&mut self, id: NodeId) -> Option<&mut Vec<NodeId>> {
        match self.kind_mut(id) {
            NodeKind::Pattern { alternatives }
            | NodeKind::Group { alternatives, .. }
            | NodeKind::CapturingGroup { alternatives, .. }
            | NodeKind::Lookaround { alternatives, .. } => Some(alternatives),
            _ => None,
        }
    }

    /// Pre-order node ids below (and including) `from`, snapshotted so the
    /// caller may mutate while iterating the result.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.children(id);
            for &c in children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Whether `anc` is `node` or an ancestor of `node`.
    pub fn is_ancestor(&self, anc: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == anc {
                return true;
            }
            cur = self.parent(id);
        }
        false
    }

    /// Swap `old` for `new` in `parent`'s child slot and fix `new`'s parent
    /// link. `old` stays in the arena, detached.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        match self.kind_mut(parent) {
            NodeKind::Regex { pattern, .. } => {
                if *pattern == old {
                    *pattern = new;
                }
            }
            NodeKind::Pattern { alternatives }
            | NodeKind::Group { alternatives, .. }
            | NodeKind::CapturingGroup { alternatives, .. }
            | NodeKind::Lookaround { alternatives, .. } => {
                for slot in alternatives.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            NodeKind::Alternative { elements } => {
                for slot in elements.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            NodeKind::CharacterClass { elements, .. } => {
                for slot in elements.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            NodeKind::CharacterClassIntersection { classes } => {
                for slot in classes.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
            }
            NodeKind::Quantifier { element, .. } => {
                if *element == old {
                    *element = new;
                }
            }
            _ => {}
        }
        self.set_parent(new, Some(parent));
    }

    /// Deep-copy the subtree at `src` under `parent`, relinking every copied
    /// node's parent to its new container. Every copied capturing group is
    /// recorded in `origins` as `(copy, source)`.
    pub fn clone_subtree(
        &mut self,
        src: NodeId,
        parent: Option<NodeId>,
        origins: &mut Vec<(NodeId, NodeId)>,
    ) -> NodeId {
        let kind = self.kind(src).clone();
        // Reserve the slot first so children can link to it.
        let id = self.push(parent, NodeKind::Character { value: 0 });
        let new_kind = match kind {
            NodeKind::Regex { pattern, flags } => {
                let p = self.clone_subtree(pattern, Some(id), origins);
                NodeKind::Regex { pattern: p, flags }
            }
            NodeKind::Pattern { alternatives } => NodeKind::Pattern {
                alternatives: self.clone_children(&alternatives, id, origins),
            },
            NodeKind::Alternative { elements } => NodeKind::Alternative {
                elements: self.clone_children(&elements, id, origins),
            },
            NodeKind::Group { kind, alternatives } => NodeKind::Group {
                kind,
                alternatives: self.clone_children(&alternatives, id, origins),
            },
            NodeKind::CapturingGroup { number, name, hidden, alternatives } => {
                origins.push((id, src));
                NodeKind::CapturingGroup {
                    number,
                    name,
                    hidden,
                    alternatives: self.clone_children(&alternatives, id, origins),
                }
            }
            NodeKind::Lookaround { behind, negate, alternatives } => NodeKind::Lookaround {
                behind,
                negate,
                alternatives: self.clone_children(&alternatives, id, origins),
            },
            NodeKind::CharacterClass { negate, elements } => NodeKind::CharacterClass {
                negate,
                elements: self.clone_children(&elements, id, origins),
            },
            NodeKind::CharacterClassIntersection { classes } => {
                NodeKind::CharacterClassIntersection {
                    classes: self.clone_children(&classes, id, origins),
                }
            }
            NodeKind::Quantifier { min, max, kind, element } => {
                let e = self.clone_subtree(element, Some(id), origins);
                NodeKind::Quantifier { min, max, kind, element: e }
            }
            leaf => leaf,
        };
        self.set_kind(id, new_kind);
        id
    }

    fn clone_children(
        &mut self,
        children: &[NodeId],
        parent: NodeId,
        origins: &mut Vec<(NodeId, NodeId)>,
    ) -> Vec<NodeId> {
        children
            .iter()
            .map(|&c| self.clone_subtree(c, Some(parent), origins))
            .collect()
    }
}

impl Default for Tree {
    fn default() -> Tree {
        Tree::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_char(t: &mut Tree, parent: NodeId, value: u32) -> NodeId {
        t.push(Some(parent), NodeKind::Character { value })
    }

    fn small_tree() -> (Tree, NodeId, NodeId) {
        // ((?<g>ab))
        let mut t = Tree::new();
        let regex = t.push(None, NodeKind::Character { value: 0 });
        let pattern = t.push(Some(regex), NodeKind::Pattern { alternatives: vec![] });
        t.set_kind(regex, NodeKind::Regex { pattern, flags: OnigFlags::empty() });
        t.root = regex;
        let alt = t.push(Some(pattern), NodeKind::Alternative { elements: vec![] });
        t.set_kind(pattern, NodeKind::Pattern { alternatives: vec![alt] });
        let group = t.push(
            Some(alt),
            NodeKind::CapturingGroup {
                number: 1,
                name: Some("g".to_string()),
                hidden: false,
                alternatives: vec![],
            },
        );
        let inner = t.push(Some(group), NodeKind::Alternative { elements: vec![] });
        let a = leaf_char(&mut t, inner, 'a' as u32);
        let b = leaf_char(&mut t, inner, 'b' as u32);
        t.set_kind(inner, NodeKind::Alternative { elements: vec![a, b] });
        if let NodeKind::CapturingGroup { alternatives, .. } = t.kind_mut(group) {
            alternatives.push(inner);
        }
        if let NodeKind::Alternative { elements } = t.kind_mut(alt) {
            elements.push(group);
        }
        (t, alt, group)
    }

    #[test]
    fn preorder_visits_all() {
        let (t, _, _) = small_tree();
        let order = t.preorder(t.root);
        assert_eq!(order.len(), 7);
        assert_eq!(order[0], t.root);
    }

    #[test]
    fn ancestor_query() {
        let (t, alt, group) = small_tree();
        assert!(t.is_ancestor(t.root, group));
        assert!(t.is_ancestor(alt, group));
        assert!(!t.is_ancestor(group, alt));
    }

    #[test]
    fn clone_records_capture_origins() {
        let (mut t, alt, group) = small_tree();
        let mut origins = Vec::new();
        let copy = t.clone_subtree(group, Some(alt), &mut origins);
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0], (copy, group));
        // The copy owns fresh children with relinked parents.
        let kids = t.children(copy);
        assert_eq!(kids.len(), 1);
        assert_eq!(t.parent(kids[0]), Some(copy));
        assert_ne!(kids[0], t.children(group)[0]);
    }

    #[test]
    fn replace_child_swaps_slot() {
        let (mut t, alt, group) = small_tree();
        let repl = t.push(None, NodeKind::Character { value: 'x' as u32 });
        t.replace_child(alt, group, repl);
        assert_eq!(t.children(alt), vec![repl]);
        assert_eq!(t.parent(repl), Some(alt));
    }
}
