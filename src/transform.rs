// transform.rs - Rewrites the Oniguruma AST into target-expressible form.
//
// Three ordered passes over the arena tree:
//
//   1. Local rewrites: flag directives become flag-scoped groups covering
//      the rest of their alternative, `\K` becomes a lookbehind wrapper,
//      `\G` is resolved to a sticky anchor or deferred to the runtime
//      wrapper, and Oniguruma-only shapes (absent repeaters, atomic
//      groups, possessive quantifiers, POSIX classes, ASCII-flag
//      shorthands, `\X`/`\R`, line anchors, word boundaries) are replaced
//      with equivalents the target can express.
//   2. Subroutine expansion: each call is replaced by a deep,
//      parent-relinked clone of its target (self-calls become bounded
//      `Recursion` nodes), an origin map records every copied capture, and
//      per-name/number candidate lists implement most-recent-wins
//      multiplex bookkeeping.
//   3. Renumbering and backreference resolution over the expanded tree:
//      candidates are filtered to alternation paths that can co-occur with
//      the reference; zero survivors become a never-match, several become
//      a multiplex alternation. Orphans get placeholder captures.
//
// The passes are strictly ordered: pass 1 introduces capturing structure
// the bookkeeping must see, and pass 2's candidate node ids only gain
// their final numbers in pass 3.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;

use crate::ast::{
    AssertionKind, CharacterSetKind, DirectiveKind, GroupKind, NodeId, NodeKind, QuantifierKind,
    RecursionTarget, RefTarget, Tree, VarLenKind, UNBOUNDED,
};
use crate::error::{Error, Result};
use crate::options::{Accuracy, OnigFlags, Options};
use crate::unicode::{canonical_property, PropertyName};

/// How case-insensitive regions are realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePlan {
    /// A single `i` flag (or native modifier groups) covers the pattern.
    Flag,
    /// Mixed sensitivities without modifier support: no `i` flag; literals
    /// in insensitive regions expand to case-variant classes.
    Expand,
}

/// Facts the generator and the runtime wrapper need about the rewrite.
#[derive(Debug)]
pub struct TransformData {
    /// Every top-level alternative led with `\G`: emit a sticky flag.
    pub sticky: bool,
    /// `\G` could not be proven sticky: the wrapper must slice at the
    /// search offset.
    pub search_start: bool,
    pub case_plan: CasePlan,
    /// Final numbers of captures that exist only for emulation mechanics.
    pub hidden: Vec<u32>,
    /// `(origin, copy)` final numbers: a participating copy's value
    /// belongs in the origin group's result slot.
    pub transfers: Vec<(u32, u32)>,
    pub capture_count: u32,
}

pub fn transform(tree: &mut Tree, options: &Options) -> Result<TransformData> {
    let global = tree.flags();
    let pattern = match *tree.kind(tree.root) {
        NodeKind::Regex { pattern, .. } => pattern,
        _ => return Err(Error::semantic("malformed tree root")),
    };

    // Pass 1.
    convert_directives(tree);
    apply_keep(tree, pattern)?;
    let (sticky, search_start) = resolve_search_start(tree, pattern, options)?;

    let mut p1 = Pass1 {
        tree: &mut *tree,
        options,
        global,
        mixed_case: false,
        backref_under_i: false,
    };
    p1.rewrite(pattern, Ctx {
        ignore_case: global.contains(OnigFlags::IGNORE_CASE),
        dot_all: global.contains(OnigFlags::DOT_ALL),
    })?;
    let mixed_case = p1.mixed_case;
    let backref_under_i = p1.backref_under_i;

    let case_plan = if mixed_case && !options.target.supports_modifiers() {
        CasePlan::Expand
    } else {
        CasePlan::Flag
    };
    if case_plan == CasePlan::Expand
        && backref_under_i
        && options.accuracy == Accuracy::Strict
    {
        return Err(Error::policy(
            "case-insensitive backreference requires modifier support in the target",
        ));
    }

    // Pass 2.
    let origin = expand_subroutines(tree)?;
    let reffed = collect_candidates(tree, &origin);
    strip_duplicate_names(tree);

    // Pass 3.
    let mut data = TransformData {
        sticky,
        search_start,
        case_plan,
        hidden: Vec::new(),
        transfers: Vec::new(),
        capture_count: 0,
    };
    renumber_and_resolve(tree, pattern, &origin, &reffed, &mut data)?;

    if data.search_start
        && options.accuracy == Accuracy::Strict
        && has_lookbehind(tree)
    {
        return Err(Error::policy(
            "search-start emulation combined with lookbehind is not exact",
        ));
    }

    Ok(data)
}

// === Pass 1: directives, \K, \G ===

/// Flag directives apply to the rest of their alternative; wrap that rest
/// in a flag group so scope becomes explicit tree structure. The `x` bit
/// was consumed by the tokenizer, so only `i` and `m` survive here.
fn convert_directives(tree: &mut Tree) {
    let mut work: Vec<NodeId> = tree
        .preorder(tree.root)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Alternative { .. }))
        .collect();
    let scoped = OnigFlags::IGNORE_CASE | OnigFlags::DOT_ALL;
    while let Some(alt) = work.pop() {
        let NodeKind::Alternative { elements } = tree.kind(alt).clone() else { continue };
        let Some(pos) = elements.iter().position(|&e| {
            matches!(tree.kind(e), NodeKind::Directive(DirectiveKind::Flags { .. }))
        }) else {
            continue;
        };
        let NodeKind::Directive(DirectiveKind::Flags { on, off }) =
            tree.kind(elements[pos]).clone()
        else {
            continue;
        };
        let (on, off) = (on & scoped, off & scoped);
        let rest: Vec<NodeId> = elements[pos + 1..].to_vec();
        let mut new_elements: Vec<NodeId> = elements[..pos].to_vec();
        if on.is_empty() && off.is_empty() {
            new_elements.extend(rest.iter().copied());
            tree.set_kind(alt, NodeKind::Alternative { elements: new_elements });
            work.push(alt);
            continue;
        }
        let inner_alt = tree.push(None, NodeKind::Alternative { elements: rest.clone() });
        for &e in &rest {
            tree.set_parent(e, Some(inner_alt));
        }
        let group = tree.push(
            Some(alt),
            NodeKind::Group { kind: GroupKind::Flags { on, off }, alternatives: vec![inner_alt] },
        );
        tree.set_parent(inner_alt, Some(group));
        new_elements.push(group);
        tree.set_kind(alt, NodeKind::Alternative { elements: new_elements });
        // The wrapped rest may contain further directives.
        work.push(inner_alt);
    }
}

/// `\K` keeps only what follows it: wrap everything before the last `\K`
/// of its alternative in a lookbehind. Supported at the pattern top level
/// or inside a single group that wraps the whole pattern.
fn apply_keep(tree: &mut Tree, pattern: NodeId) -> Result<()> {
    let keeps: Vec<NodeId> = tree
        .preorder(tree.root)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Directive(DirectiveKind::Keep)))
        .collect();
    if keeps.is_empty() {
        return Ok(());
    }

    let mut alts: Vec<NodeId> = Vec::new();
    for &k in &keeps {
        let alt = tree.parent(k).ok_or_else(|| Error::semantic("detached \\K"))?;
        let container = tree
            .parent(alt)
            .ok_or_else(|| Error::semantic("detached \\K"))?;
        let ok = container == pattern || {
            matches!(
                tree.kind(container),
                NodeKind::Group { .. } | NodeKind::CapturingGroup { .. }
            ) && {
                match tree.parent(container) {
                    Some(galt) => {
                        tree.parent(galt) == Some(pattern)
                            && matches!(
                                tree.kind(galt),
                                NodeKind::Alternative { elements } if elements.len() == 1
                            )
                    }
                    None => false,
                }
            }
        };
        if !ok {
            return Err(Error::unsupported(
                "\\K is supported only at the top level of the pattern",
            ));
        }
        if !alts.contains(&alt) {
            alts.push(alt);
        }
    }

    for alt in alts {
        let NodeKind::Alternative { elements } = tree.kind(alt).clone() else { continue };
        let last_keep = elements
            .iter()
            .rposition(|&e| matches!(tree.kind(e), NodeKind::Directive(DirectiveKind::Keep)))
            .expect("alternative was recorded because it contains \\K");
        let pre: Vec<NodeId> = elements[..last_keep]
            .iter()
            .copied()
            .filter(|&e| !matches!(tree.kind(e), NodeKind::Directive(DirectiveKind::Keep)))
            .collect();
        let rest: Vec<NodeId> = elements[last_keep + 1..].to_vec();
        let mut new_elements = Vec::with_capacity(rest.len() + 1);
        if !pre.is_empty() {
            let la_alt = tree.push(None, NodeKind::Alternative { elements: pre.clone() });
            for &e in &pre {
                tree.set_parent(e, Some(la_alt));
            }
            let look = tree.push(
                Some(alt),
                NodeKind::Lookaround { behind: true, negate: false, alternatives: vec![la_alt] },
            );
            tree.set_parent(la_alt, Some(look));
            new_elements.push(look);
        }
        new_elements.extend(rest.iter().copied());
        tree.set_kind(alt, NodeKind::Alternative { elements: new_elements });
    }
    Ok(())
}

/// `\G` becomes a sticky flag when it provably leads every top-level
/// alternative; otherwise the runtime wrapper slices at the search offset
/// and remaining `\G` nodes render as a start-of-slice assertion.
fn resolve_search_start(
    tree: &mut Tree,
    pattern: NodeId,
    options: &Options,
) -> Result<(bool, bool)> {
    let all: Vec<NodeId> = tree
        .preorder(tree.root)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Assertion(AssertionKind::SearchStart)))
        .collect();
    if all.is_empty() {
        return Ok((false, false));
    }

    let mut leading = Vec::new();
    let NodeKind::Pattern { alternatives } = tree.kind(pattern).clone() else {
        return Ok((false, false));
    };
    let mut all_lead = true;
    for alt in alternatives {
        if !alt_leads_with_g(tree, alt, &mut leading) {
            all_lead = false;
        }
    }

    if all_lead && leading.len() == all.len() {
        for g in leading {
            let Some(alt) = tree.parent(g) else { continue };
            let NodeKind::Alternative { elements } = tree.kind(alt).clone() else { continue };
            let elements: Vec<NodeId> = elements.into_iter().filter(|&e| e != g).collect();
            tree.set_kind(alt, NodeKind::Alternative { elements });
        }
        return Ok((true, false));
    }
    if options.avoid_subclass {
        return Err(Error::policy(
            "pattern uses \\G in a way that requires search-start emulation",
        ));
    }
    Ok((false, true))
}

fn alt_leads_with_g(tree: &Tree, alt: NodeId, leading: &mut Vec<NodeId>) -> bool {
    let NodeKind::Alternative { elements } = tree.kind(alt) else { return false };
    let Some(&first) = elements.first() else { return false };
    match tree.kind(first) {
        NodeKind::Assertion(AssertionKind::SearchStart) => {
            leading.push(first);
            true
        }
        NodeKind::Group { kind, alternatives } => {
            if matches!(kind, GroupKind::Absent) {
                return false;
            }
            let alts = alternatives.clone();
            alts.iter().all(|&a| alt_leads_with_g(tree, a, leading))
        }
        NodeKind::CapturingGroup { alternatives, .. } => {
            let alts = alternatives.clone();
            alts.iter().all(|&a| alt_leads_with_g(tree, a, leading))
        }
        _ => false,
    }
}

// === Pass 1: node rewrites ===

#[derive(Clone, Copy)]
struct Ctx {
    ignore_case: bool,
    dot_all: bool,
}

struct Pass1<'a> {
    tree: &'a mut Tree,
    options: &'a Options,
    global: OnigFlags,
    mixed_case: bool,
    backref_under_i: bool,
}

impl<'a> Pass1<'a> {
    fn rewrite(&mut self, id: NodeId, ctx: Ctx) -> Result<()> {
        match self.tree.kind(id).clone() {
            NodeKind::Pattern { alternatives }
            | NodeKind::Lookaround { alternatives, .. }
            | NodeKind::CapturingGroup { alternatives, .. } => {
                for a in alternatives {
                    self.rewrite(a, ctx)?;
                }
            }
            NodeKind::Alternative { elements } => {
                for e in elements {
                    self.rewrite(e, ctx)?;
                }
            }
            NodeKind::Group { kind: GroupKind::Flags { on, off }, alternatives } => {
                let mut inner = ctx;
                if on.contains(OnigFlags::IGNORE_CASE) {
                    inner.ignore_case = true;
                }
                if off.contains(OnigFlags::IGNORE_CASE) {
                    inner.ignore_case = false;
                }
                if on.contains(OnigFlags::DOT_ALL) {
                    inner.dot_all = true;
                }
                if off.contains(OnigFlags::DOT_ALL) {
                    inner.dot_all = false;
                }
                if (on | off).contains(OnigFlags::IGNORE_CASE) {
                    self.mixed_case = true;
                }
                for a in alternatives {
                    self.rewrite(a, inner)?;
                }
            }
            NodeKind::Group { kind: GroupKind::Atomic, alternatives } => {
                for a in alternatives.iter() {
                    self.rewrite(*a, ctx)?;
                }
                self.wrap_atomic(id, alternatives);
            }
            NodeKind::Group { kind: GroupKind::Absent, alternatives } => {
                for a in alternatives.iter() {
                    self.rewrite(*a, ctx)?;
                }
                self.rewrite_absent(id, alternatives);
            }
            NodeKind::Group { kind: GroupKind::NonCapturing, alternatives } => {
                for a in alternatives {
                    self.rewrite(a, ctx)?;
                }
            }
            NodeKind::Quantifier { min, max, kind, element } => {
                self.rewrite(element, ctx)?;
                if kind == QuantifierKind::Possessive {
                    let t = &mut *self.tree;
                    let q = t.push(None, NodeKind::Quantifier {
                        min,
                        max,
                        kind: QuantifierKind::Greedy,
                        element,
                    });
                    t.set_parent(element, Some(q));
                    let alt = t.push(None, NodeKind::Alternative { elements: vec![q] });
                    t.set_parent(q, Some(alt));
                    self.wrap_atomic(id, vec![alt]);
                }
            }
            NodeKind::Assertion(kind) => self.rewrite_assertion(id, kind)?,
            NodeKind::CharacterSet { kind, negate } => {
                self.rewrite_set(id, kind, negate, ctx)?;
            }
            NodeKind::CharacterClass { elements, .. } => {
                for e in elements {
                    self.rewrite(e, ctx)?;
                }
            }
            NodeKind::CharacterClassIntersection { classes } => {
                if !self.options.target.supports_v_flag() {
                    return Err(Error::policy(
                        "character-class intersection requires min target Es2024",
                    ));
                }
                for c in classes {
                    self.rewrite(c, ctx)?;
                }
            }
            NodeKind::VariableLengthCharacterSet(kind) => {
                self.rewrite_varlen(id, kind)?;
            }
            NodeKind::Backreference { to, .. } => {
                if !matches!(to, RefTarget::Node(_)) && ctx.ignore_case {
                    self.backref_under_i = true;
                }
            }
            NodeKind::Regex { pattern, .. } => self.rewrite(pattern, ctx)?,
            NodeKind::Character { .. }
            | NodeKind::CharacterClassRange { .. }
            | NodeKind::Subroutine { .. }
            | NodeKind::Recursion { .. }
            | NodeKind::Directive(_) => {}
        }
        Ok(())
    }

    /// `(?>X)` has no native form; `(?=(X))\n` matches X once and forbids
    /// backtracking into it. The helper capture is hidden from results.
    fn wrap_atomic(&mut self, id: NodeId, alternatives: Vec<NodeId>) {
        let t = &mut *self.tree;
        let cap = t.push(None, NodeKind::CapturingGroup {
            number: 0,
            name: None,
            hidden: true,
            alternatives: alternatives.clone(),
        });
        for &a in &alternatives {
            t.set_parent(a, Some(cap));
        }
        let la_alt = t.push(None, NodeKind::Alternative { elements: vec![cap] });
        t.set_parent(cap, Some(la_alt));
        let la = t.push(None, NodeKind::Lookaround {
            behind: false,
            negate: false,
            alternatives: vec![la_alt],
        });
        t.set_parent(la_alt, Some(la));
        let br = t.push(None, NodeKind::Backreference {
            to: RefTarget::Node(cap),
            orphan: false,
        });
        let outer = t.push(Some(id), NodeKind::Alternative { elements: vec![la, br] });
        t.set_parent(la, Some(outer));
        t.set_parent(br, Some(outer));
        t.set_kind(id, NodeKind::Group {
            kind: GroupKind::NonCapturing,
            alternatives: vec![outer],
        });
    }

    /// `(?~X)` matches the longest run that does not contain X:
    /// `(?:(?:(?!X)[anychar])*)`.
    fn rewrite_absent(&mut self, id: NodeId, alternatives: Vec<NodeId>) {
        let t = &mut *self.tree;
        let neg = t.push(None, NodeKind::Lookaround {
            behind: false,
            negate: true,
            alternatives: alternatives.clone(),
        });
        for &a in &alternatives {
            t.set_parent(a, Some(neg));
        }
        let any = t.push(None, NodeKind::CharacterSet {
            kind: CharacterSetKind::Any,
            negate: false,
        });
        let step_alt = t.push(None, NodeKind::Alternative { elements: vec![neg, any] });
        t.set_parent(neg, Some(step_alt));
        t.set_parent(any, Some(step_alt));
        let step = t.push(None, NodeKind::Group {
            kind: GroupKind::NonCapturing,
            alternatives: vec![step_alt],
        });
        t.set_parent(step_alt, Some(step));
        let quant = t.push(None, NodeKind::Quantifier {
            min: 0,
            max: UNBOUNDED,
            kind: QuantifierKind::Greedy,
            element: step,
        });
        t.set_parent(step, Some(quant));
        let outer = t.push(Some(id), NodeKind::Alternative { elements: vec![quant] });
        t.set_parent(quant, Some(outer));
        t.set_kind(id, NodeKind::Group {
            kind: GroupKind::NonCapturing,
            alternatives: vec![outer],
        });
    }

    fn rewrite_assertion(&mut self, id: NodeId, kind: AssertionKind) -> Result<()> {
        let singleline = self.options.rules.singleline;
        let effective = match kind {
            AssertionKind::LineStart if singleline => AssertionKind::StringStart,
            AssertionKind::LineEnd if singleline => AssertionKind::StringEndNewline,
            k => k,
        };
        match effective {
            // `^` in Oniguruma is a line anchor; the m flag is never
            // emitted, so spell it out.
            AssertionKind::LineStart => {
                let t = &mut *self.tree;
                let a1 = t.push(None, NodeKind::Assertion(AssertionKind::StringStart));
                let alt1 = t.push(None, NodeKind::Alternative { elements: vec![a1] });
                t.set_parent(a1, Some(alt1));
                let nl = t.push(None, NodeKind::Character { value: '\n' as u32 });
                let alt2 = t.push(None, NodeKind::Alternative { elements: vec![nl] });
                t.set_parent(nl, Some(alt2));
                t.set_kind(id, NodeKind::Lookaround {
                    behind: true,
                    negate: false,
                    alternatives: vec![alt1, alt2],
                });
                t.set_parent(alt1, Some(id));
                t.set_parent(alt2, Some(id));
            }
            AssertionKind::LineEnd => {
                let t = &mut *self.tree;
                let nl = t.push(None, NodeKind::Character { value: '\n' as u32 });
                let alt1 = t.push(None, NodeKind::Alternative { elements: vec![nl] });
                t.set_parent(nl, Some(alt1));
                let a2 = t.push(None, NodeKind::Assertion(AssertionKind::StringEnd));
                let alt2 = t.push(None, NodeKind::Alternative { elements: vec![a2] });
                t.set_parent(a2, Some(alt2));
                t.set_kind(id, NodeKind::Lookaround {
                    behind: false,
                    negate: false,
                    alternatives: vec![alt1, alt2],
                });
                t.set_parent(alt1, Some(id));
                t.set_parent(alt2, Some(id));
            }
            // `\Z`: before an optional final newline.
            AssertionKind::StringEndNewline => {
                let t = &mut *self.tree;
                let nl = t.push(None, NodeKind::Character { value: '\n' as u32 });
                let q = t.push(None, NodeKind::Quantifier {
                    min: 0,
                    max: 1,
                    kind: QuantifierKind::Greedy,
                    element: nl,
                });
                t.set_parent(nl, Some(q));
                let end = t.push(None, NodeKind::Assertion(AssertionKind::StringEnd));
                let alt = t.push(None, NodeKind::Alternative { elements: vec![q, end] });
                t.set_parent(q, Some(alt));
                t.set_parent(end, Some(alt));
                t.set_kind(id, NodeKind::Lookaround {
                    behind: false,
                    negate: false,
                    alternatives: vec![alt],
                });
                t.set_parent(alt, Some(id));
            }
            AssertionKind::WordBoundary { negate } => {
                let ascii = self.options.rules.ascii_word_boundaries
                    || self.global.contains(OnigFlags::WORD_IS_ASCII);
                if !ascii {
                    self.rewrite_word_boundary(id, negate);
                }
            }
            AssertionKind::StringStart
            | AssertionKind::StringEnd
            | AssertionKind::SearchStart => {
                if effective != kind {
                    self.tree.set_kind(id, NodeKind::Assertion(effective));
                }
            }
        }
        Ok(())
    }

    /// Oniguruma word boundaries use the Unicode word definition; native
    /// `\b` is ASCII-only, so build the boundary from lookarounds.
    fn rewrite_word_boundary(&mut self, id: NodeId, negate: bool) {
        // (?:(?<!w)(?=w)|(?<=w)(?!w)) and the inverse pairing for \B.
        let pairs: [(bool, bool); 2] = if negate {
            [(false, false), (true, true)]
        } else {
            [(true, false), (false, true)]
        };
        let mut alts = Vec::with_capacity(2);
        for (behind_negate, ahead_negate) in pairs {
            let behind = self.lookaround_word(true, behind_negate);
            let ahead = self.lookaround_word(false, ahead_negate);
            let t = &mut *self.tree;
            let alt = t.push(None, NodeKind::Alternative { elements: vec![behind, ahead] });
            t.set_parent(behind, Some(alt));
            t.set_parent(ahead, Some(alt));
            alts.push(alt);
        }
        let t = &mut *self.tree;
        t.set_kind(id, NodeKind::Group {
            kind: GroupKind::NonCapturing,
            alternatives: alts.clone(),
        });
        for a in alts {
            t.set_parent(a, Some(id));
        }
    }

    fn lookaround_word(&mut self, behind: bool, negate: bool) -> NodeId {
        let word = self.word_class();
        let t = &mut *self.tree;
        let alt = t.push(None, NodeKind::Alternative { elements: vec![word] });
        t.set_parent(word, Some(alt));
        let look = t.push(None, NodeKind::Lookaround {
            behind,
            negate,
            alternatives: vec![alt],
        });
        t.set_parent(alt, Some(look));
        look
    }

    /// The Oniguruma word class: `[\p{L}\p{M}\p{Nd}\p{Pc}]`.
    fn word_class(&mut self) -> NodeId {
        let t = &mut *self.tree;
        let class = t.push(None, NodeKind::CharacterClass { negate: false, elements: vec![] });
        let mut elements = Vec::with_capacity(4);
        for prop in ["L", "M", "Nd", "Pc"] {
            elements.push(t.push(Some(class), NodeKind::CharacterSet {
                kind: CharacterSetKind::Property(prop.to_string()),
                negate: false,
            }));
        }
        t.set_kind(class, NodeKind::CharacterClass { negate: false, elements });
        class
    }

    fn rewrite_set(
        &mut self,
        id: NodeId,
        kind: CharacterSetKind,
        negate: bool,
        ctx: Ctx,
    ) -> Result<()> {
        match kind {
            CharacterSetKind::Dot => {
                let kind = if ctx.dot_all {
                    CharacterSetKind::Any
                } else {
                    CharacterSetKind::NonNewline
                };
                self.tree.set_kind(id, NodeKind::CharacterSet { kind, negate: false });
            }
            CharacterSetKind::Any | CharacterSetKind::NonNewline => {}
            CharacterSetKind::Digit => {
                if !self.global.contains(OnigFlags::DIGIT_IS_ASCII) {
                    self.set_property(id, "Nd", negate);
                }
            }
            CharacterSetKind::Hex => {
                self.set_class(id, negate, |t, class| {
                    vec![
                        t.push(Some(class), NodeKind::CharacterClassRange {
                            min: '0' as u32,
                            max: '9' as u32,
                        }),
                        t.push(Some(class), NodeKind::CharacterClassRange {
                            min: 'A' as u32,
                            max: 'F' as u32,
                        }),
                        t.push(Some(class), NodeKind::CharacterClassRange {
                            min: 'a' as u32,
                            max: 'f' as u32,
                        }),
                    ]
                });
            }
            CharacterSetKind::Space => {
                if self.global.contains(OnigFlags::SPACE_IS_ASCII) {
                    self.set_class(id, negate, |t, class| {
                        vec![
                            t.push(Some(class), NodeKind::CharacterClassRange {
                                min: '\t' as u32,
                                max: '\r' as u32,
                            }),
                            t.push(Some(class), NodeKind::Character { value: ' ' as u32 }),
                        ]
                    });
                } else {
                    self.set_property(id, "White_Space", negate);
                }
            }
            CharacterSetKind::Word => {
                if !self.global.contains(OnigFlags::WORD_IS_ASCII) {
                    self.set_word_class(id, negate);
                }
            }
            CharacterSetKind::Posix(name) => self.rewrite_posix(id, &name, negate)?,
            CharacterSetKind::Property(name) => match canonical_property(&name) {
                PropertyName::Es(spelling) => self.set_property(id, &spelling, negate),
                PropertyName::Posix(class) => self.rewrite_posix(id, class, negate)?,
                PropertyName::Script(script) => {
                    self.set_property(id, &format!("sc={}", script), negate)
                }
            },
        }
        Ok(())
    }

    fn set_property(&mut self, id: NodeId, name: &str, negate: bool) {
        self.tree.set_kind(id, NodeKind::CharacterSet {
            kind: CharacterSetKind::Property(name.to_string()),
            negate,
        });
    }

    fn set_class(
        &mut self,
        id: NodeId,
        negate: bool,
        build: impl FnOnce(&mut Tree, NodeId) -> Vec<NodeId>,
    ) {
        let elements = build(self.tree, id);
        self.tree.set_kind(id, NodeKind::CharacterClass { negate, elements });
    }

    fn set_word_class(&mut self, id: NodeId, negate: bool) {
        self.set_class(id, negate, |t, class| {
            ["L", "M", "Nd", "Pc"]
                .iter()
                .map(|p| {
                    t.push(Some(class), NodeKind::CharacterSet {
                        kind: CharacterSetKind::Property(p.to_string()),
                        negate: false,
                    })
                })
                .collect()
        });
    }

    fn rewrite_posix(&mut self, id: NodeId, name: &str, negate: bool) -> Result<()> {
        let digit_ascii = self.global.contains(OnigFlags::DIGIT_IS_ASCII);
        let space_ascii = self.global.contains(OnigFlags::SPACE_IS_ASCII);
        let word_ascii = self.global.contains(OnigFlags::WORD_IS_ASCII);
        match name {
            "alpha" => self.set_property(id, "Alpha", negate),
            "ascii" => self.set_property(id, "ASCII", negate),
            "lower" => self.set_property(id, "Lowercase", negate),
            "upper" => self.set_property(id, "Uppercase", negate),
            "cntrl" => self.set_property(id, "Cc", negate),
            "digit" => {
                if digit_ascii {
                    self.tree.set_kind(id, NodeKind::CharacterSet {
                        kind: CharacterSetKind::Digit,
                        negate,
                    });
                } else {
                    self.set_property(id, "Nd", negate);
                }
            }
            "space" => {
                if space_ascii {
                    self.set_class(id, negate, |t, class| {
                        vec![
                            t.push(Some(class), NodeKind::CharacterClassRange {
                                min: '\t' as u32,
                                max: '\r' as u32,
                            }),
                            t.push(Some(class), NodeKind::Character { value: ' ' as u32 }),
                        ]
                    });
                } else {
                    self.set_property(id, "White_Space", negate);
                }
            }
            "word" => {
                if word_ascii {
                    self.tree.set_kind(id, NodeKind::CharacterSet {
                        kind: CharacterSetKind::Word,
                        negate,
                    });
                } else {
                    self.set_word_class(id, negate);
                }
            }
            "alnum" => self.set_class(id, negate, |t, class| {
                ["Alpha", "Nd"]
                    .iter()
                    .map(|p| {
                        t.push(Some(class), NodeKind::CharacterSet {
                            kind: CharacterSetKind::Property(p.to_string()),
                            negate: false,
                        })
                    })
                    .collect()
            }),
            "blank" => self.set_class(id, negate, |t, class| {
                vec![
                    t.push(Some(class), NodeKind::CharacterSet {
                        kind: CharacterSetKind::Property("Zs".to_string()),
                        negate: false,
                    }),
                    t.push(Some(class), NodeKind::Character { value: '\t' as u32 }),
                ]
            }),
            "graph" => self.set_class(id, !negate, |t, class| {
                ["White_Space", "Cc", "Cn", "Cs"]
                    .iter()
                    .map(|p| {
                        t.push(Some(class), NodeKind::CharacterSet {
                            kind: CharacterSetKind::Property(p.to_string()),
                            negate: false,
                        })
                    })
                    .collect()
            }),
            "print" => self.set_class(id, !negate, |t, class| {
                ["Cc", "Cn", "Cs", "Zl", "Zp"]
                    .iter()
                    .map(|p| {
                        t.push(Some(class), NodeKind::CharacterSet {
                            kind: CharacterSetKind::Property(p.to_string()),
                            negate: false,
                        })
                    })
                    .collect()
            }),
            "punct" => self.set_class(id, negate, |t, class| {
                ["P", "S"]
                    .iter()
                    .map(|p| {
                        t.push(Some(class), NodeKind::CharacterSet {
                            kind: CharacterSetKind::Property(p.to_string()),
                            negate: false,
                        })
                    })
                    .collect()
            }),
            "xdigit" => self.set_class(id, negate, |t, class| {
                vec![
                    t.push(Some(class), NodeKind::CharacterClassRange {
                        min: '0' as u32,
                        max: '9' as u32,
                    }),
                    t.push(Some(class), NodeKind::CharacterClassRange {
                        min: 'A' as u32,
                        max: 'F' as u32,
                    }),
                    t.push(Some(class), NodeKind::CharacterClassRange {
                        min: 'a' as u32,
                        max: 'f' as u32,
                    }),
                ]
            }),
            "any" => {
                self.tree.set_kind(id, NodeKind::CharacterSet {
                    kind: CharacterSetKind::Any,
                    negate: false,
                });
            }
            other => {
                return Err(Error::semantic(format!("invalid POSIX class name {}", other)))
            }
        }
        Ok(())
    }

    fn rewrite_varlen(&mut self, id: NodeId, kind: VarLenKind) -> Result<()> {
        match kind {
            // `\R`: atomic so `\r\n` never splits under backtracking.
            VarLenKind::Newline => {
                let t = &mut *self.tree;
                let cr = t.push(None, NodeKind::Character { value: '\r' as u32 });
                let lf = t.push(None, NodeKind::Character { value: '\n' as u32 });
                let alt1 = t.push(None, NodeKind::Alternative { elements: vec![cr, lf] });
                t.set_parent(cr, Some(alt1));
                t.set_parent(lf, Some(alt1));
                let class = t.push(None, NodeKind::CharacterClass {
                    negate: false,
                    elements: vec![],
                });
                let elements: Vec<NodeId> = [0x0A, 0x0B, 0x0C, 0x0D, 0x85, 0x2028, 0x2029]
                    .iter()
                    .map(|&v| t.push(Some(class), NodeKind::Character { value: v }))
                    .collect();
                t.set_kind(class, NodeKind::CharacterClass { negate: false, elements });
                let alt2 = t.push(None, NodeKind::Alternative { elements: vec![class] });
                t.set_parent(class, Some(alt2));
                self.wrap_atomic(id, vec![alt1, alt2]);
            }
            // `\X`: best-effort `(?>\r\n|\P{M}\p{M}*)`; exact grapheme
            // segmentation is out of reach of a static pattern.
            VarLenKind::Grapheme => {
                if self.options.accuracy == Accuracy::Strict {
                    return Err(Error::policy(
                        "grapheme-cluster matching can only be approximated",
                    ));
                }
                let t = &mut *self.tree;
                let cr = t.push(None, NodeKind::Character { value: '\r' as u32 });
                let lf = t.push(None, NodeKind::Character { value: '\n' as u32 });
                let alt1 = t.push(None, NodeKind::Alternative { elements: vec![cr, lf] });
                t.set_parent(cr, Some(alt1));
                t.set_parent(lf, Some(alt1));
                let base = t.push(None, NodeKind::CharacterSet {
                    kind: CharacterSetKind::Property("M".to_string()),
                    negate: true,
                });
                let marks = t.push(None, NodeKind::CharacterSet {
                    kind: CharacterSetKind::Property("M".to_string()),
                    negate: false,
                });
                let q = t.push(None, NodeKind::Quantifier {
                    min: 0,
                    max: UNBOUNDED,
                    kind: QuantifierKind::Greedy,
                    element: marks,
                });
                t.set_parent(marks, Some(q));
                let alt2 = t.push(None, NodeKind::Alternative { elements: vec![base, q] });
                t.set_parent(base, Some(alt2));
                t.set_parent(q, Some(alt2));
                self.wrap_atomic(id, vec![alt1, alt2]);
            }
        }
        Ok(())
    }
}

// === Pass 2: subroutine expansion and multiplex bookkeeping ===

/// Replace every subroutine call with a clone of its target; self-calls
/// become bounded `Recursion` nodes. Returns the clone → ultimate-origin
/// map for every copied capturing group.
fn expand_subroutines(tree: &mut Tree) -> Result<HashMap<NodeId, NodeId>> {
    let mut by_number: HashMap<u32, NodeId> = HashMap::new();
    let mut by_name: HashMap<String, NodeId> = HashMap::new();
    for id in tree.preorder(tree.root) {
        if let NodeKind::CapturingGroup { number, name, hidden: false, .. } = tree.kind(id) {
            if *number > 0 {
                by_number.insert(*number, id);
            }
            if let Some(n) = name {
                by_name.entry(n.clone()).or_insert(id);
            }
        }
    }

    let mut origin: HashMap<NodeId, NodeId> = HashMap::new();
    let subs: Vec<NodeId> = tree
        .preorder(tree.root)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Subroutine { .. }))
        .collect();
    let mut chain: Vec<NodeId> = Vec::new();
    for s in subs {
        expand_one(tree, s, &by_number, &by_name, &mut origin, &mut chain)?;
    }
    Ok(origin)
}

fn expand_one(
    tree: &mut Tree,
    sub: NodeId,
    by_number: &HashMap<u32, NodeId>,
    by_name: &HashMap<String, NodeId>,
    origin: &mut HashMap<NodeId, NodeId>,
    chain: &mut Vec<NodeId>,
) -> Result<()> {
    let NodeKind::Subroutine { to } = tree.kind(sub).clone() else { return Ok(()) };
    let target = match &to {
        RefTarget::Number(0) => {
            tree.set_kind(sub, NodeKind::Recursion { target: RecursionTarget::Pattern });
            return Ok(());
        }
        RefTarget::Number(n) => *by_number
            .get(n)
            .ok_or_else(|| Error::semantic(format!("undefined group <{}> reference", n)))?,
        RefTarget::Name(name) => *by_name
            .get(name)
            .ok_or_else(|| Error::semantic(format!("undefined name <{}> reference", name)))?,
        RefTarget::Node(_) => return Ok(()),
    };

    if tree.is_ancestor(target, sub) {
        tree.set_kind(sub, NodeKind::Recursion { target: RecursionTarget::Group(target) });
        return Ok(());
    }
    if chain.contains(&target) {
        return Err(Error::unsupported("indirect subroutine recursion"));
    }

    let parent = tree
        .parent(sub)
        .ok_or_else(|| Error::semantic("detached subroutine call"))?;
    let mut copies: Vec<(NodeId, NodeId)> = Vec::new();
    chain.push(target);
    let clone = tree.clone_subtree(target, Some(parent), &mut copies);
    tree.replace_child(parent, sub, clone);
    for &(copy, src) in &copies {
        let ultimate = origin.get(&src).copied().unwrap_or(src);
        origin.insert(copy, ultimate);
        // Copies capture for matching but are internal: the wrapper
        // transfers their value to the origin slot.
        if let NodeKind::CapturingGroup { name, hidden, .. } = tree.kind_mut(copy) {
            *name = None;
            *hidden = true;
        }
    }
    let inner: Vec<NodeId> = tree
        .preorder(clone)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Subroutine { .. }))
        .collect();
    for s in inner {
        expand_one(tree, s, by_number, by_name, origin, chain)?;
    }
    chain.pop();
    Ok(())
}

/// Walk the expanded tree in match order, maintaining per-origin candidate
/// lists. A new instance of an origin supersedes every earlier instance of
/// the same origin (only the most recently matched one can satisfy a
/// backreference); distinct groups sharing a duplicate name keep separate
/// lists, which is what produces multiplexing.
fn collect_candidates(
    tree: &Tree,
    origin: &HashMap<NodeId, NodeId>,
) -> HashMap<NodeId, SmallVec<[NodeId; 2]>> {
    let mut number_to_origin: HashMap<u32, NodeId> = HashMap::new();
    let mut name_to_origins: HashMap<String, Vec<NodeId>> = HashMap::new();
    for id in tree.preorder(tree.root) {
        if origin.contains_key(&id) {
            continue;
        }
        if let NodeKind::CapturingGroup { number, name, .. } = tree.kind(id) {
            if *number > 0 {
                number_to_origin.insert(*number, id);
            }
            if let Some(n) = name {
                name_to_origins.entry(n.clone()).or_default().push(id);
            }
        }
    }

    let mut lists: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut reffed: HashMap<NodeId, SmallVec<[NodeId; 2]>> = HashMap::new();
    for id in tree.preorder(tree.root) {
        match tree.kind(id) {
            NodeKind::CapturingGroup { .. } => {
                let o = origin.get(&id).copied().unwrap_or(id);
                // Purely internal captures are never referenced by key.
                let keyed = match tree.kind(o) {
                    NodeKind::CapturingGroup { number: on, name: oname, .. } => {
                        *on > 0 || oname.is_some()
                    }
                    _ => false,
                };
                if keyed {
                    let entry = lists.entry(o).or_default();
                    entry.clear();
                    entry.push(id);
                }
            }
            NodeKind::Backreference { to, orphan: false } => {
                let origins: Vec<NodeId> = match to {
                    RefTarget::Number(n) => {
                        number_to_origin.get(n).copied().into_iter().collect()
                    }
                    RefTarget::Name(name) => {
                        name_to_origins.get(name).cloned().unwrap_or_default()
                    }
                    RefTarget::Node(_) => continue,
                };
                let mut cands: SmallVec<[NodeId; 2]> = SmallVec::new();
                for o in origins {
                    if let Some(list) = lists.get(&o) {
                        cands.extend(list.iter().copied());
                    }
                }
                reffed.insert(id, cands);
            }
            _ => {}
        }
    }
    reffed
}

/// ECMAScript cannot host duplicate group names; keep the first, strip the
/// rest. Their numbered slots stay addressable.
fn strip_duplicate_names(tree: &mut Tree) {
    let mut seen: HashSet<String> = HashSet::new();
    for id in tree.preorder(tree.root) {
        if let NodeKind::CapturingGroup { name: Some(n), hidden: false, .. } = tree.kind(id) {
            let n = n.clone();
            if !seen.insert(n) {
                if let NodeKind::CapturingGroup { name, .. } = tree.kind_mut(id) {
                    *name = None;
                }
            }
        }
    }
}

// === Pass 3: renumbering and backreference resolution ===

fn renumber_and_resolve(
    tree: &mut Tree,
    pattern: NodeId,
    origin: &HashMap<NodeId, NodeId>,
    reffed: &HashMap<NodeId, SmallVec<[NodeId; 2]>>,
    data: &mut TransformData,
) -> Result<()> {
    // Placeholder captures for orphan backreferences, appended at the
    // pattern end so references to them stay syntactically valid.
    let orphans: Vec<NodeId> = tree
        .preorder(tree.root)
        .into_iter()
        .filter(|&id| matches!(tree.kind(id), NodeKind::Backreference { orphan: true, .. }))
        .collect();
    for ob in orphans {
        let NodeKind::Pattern { alternatives } = tree.kind(pattern).clone() else { continue };
        let Some(&last_alt) = alternatives.last() else { continue };
        let inner = tree.push(None, NodeKind::Alternative { elements: vec![] });
        let ph = tree.push(Some(last_alt), NodeKind::CapturingGroup {
            number: 0,
            name: None,
            hidden: true,
            alternatives: vec![inner],
        });
        tree.set_parent(inner, Some(ph));
        if let NodeKind::Alternative { elements } = tree.kind_mut(last_alt) {
            elements.push(ph);
        }
        tree.set_kind(ob, NodeKind::Backreference {
            to: RefTarget::Node(ph),
            orphan: true,
        });
    }

    // Renumber strictly left-to-right over the expanded tree.
    let mut final_num: HashMap<NodeId, u32> = HashMap::new();
    let mut n = 0u32;
    let order = tree.preorder(tree.root);
    for &id in &order {
        if let NodeKind::CapturingGroup { .. } = tree.kind(id) {
            n += 1;
            final_num.insert(id, n);
            if let NodeKind::CapturingGroup { number, .. } = tree.kind_mut(id) {
                *number = n;
            }
        }
    }
    data.capture_count = n;
    for &id in &order {
        if let NodeKind::CapturingGroup { hidden: true, .. } = tree.kind(id) {
            data.hidden.push(final_num[&id]);
        }
    }
    for &id in &order {
        if let Some(&o) = origin.get(&id) {
            if let (Some(&to), Some(&from)) = (final_num.get(&o), final_num.get(&id)) {
                data.transfers.push((to, from));
            }
        }
    }

    // Resolve backreferences.
    for &id in &order {
        let NodeKind::Backreference { to, .. } = tree.kind(id).clone() else { continue };
        if let RefTarget::Node(t) = to {
            let num = *final_num
                .get(&t)
                .ok_or_else(|| Error::semantic("backreference to unnumbered group"))?;
            tree.set_kind(id, NodeKind::Backreference {
                to: RefTarget::Number(num),
                orphan: false,
            });
            continue;
        }
        let cands = reffed.get(&id).cloned().unwrap_or_default();
        let eligible: Vec<u32> = cands
            .into_iter()
            .filter(|&c| !tree.is_ancestor(c, id) && co_occurring(tree, c, id))
            .map(|c| final_num[&c])
            .collect();
        match eligible.len() {
            // Oniguruma: a backreference to a group that cannot have
            // participated fails, unlike native engines.
            0 => {
                let inner = tree.push(Some(id), NodeKind::Alternative { elements: vec![] });
                tree.set_kind(id, NodeKind::Lookaround {
                    behind: false,
                    negate: true,
                    alternatives: vec![inner],
                });
            }
            1 => {
                tree.set_kind(id, NodeKind::Backreference {
                    to: RefTarget::Number(eligible[0]),
                    orphan: false,
                });
            }
            // Multiplex: one alternative per candidate, most recent first.
            _ => {
                let mut alts = Vec::with_capacity(eligible.len());
                for &num in eligible.iter().rev() {
                    let br = tree.push(None, NodeKind::Backreference {
                        to: RefTarget::Number(num),
                        orphan: false,
                    });
                    let alt = tree.push(Some(id), NodeKind::Alternative { elements: vec![br] });
                    tree.set_parent(br, Some(alt));
                    alts.push(alt);
                }
                tree.set_kind(id, NodeKind::Group {
                    kind: GroupKind::NonCapturing,
                    alternatives: alts,
                });
            }
        }
    }
    Ok(())
}

/// Whether `a` can participate on some path that also reaches `b`: they
/// must not sit in different alternatives of any common alternation.
fn co_occurring(tree: &Tree, a: NodeId, b: NodeId) -> bool {
    let pa = alternation_path(tree, a);
    let pb = alternation_path(tree, b);
    for (container, idx) in &pa {
        if let Some(j) = pb.get(container) {
            if j != idx {
                return false;
            }
        }
    }
    true
}

fn alternation_path(tree: &Tree, node: NodeId) -> HashMap<NodeId, usize> {
    let mut out = HashMap::new();
    let mut cur = node;
    while let Some(parent) = tree.parent(cur) {
        if matches!(tree.kind(cur), NodeKind::Alternative { .. }) {
            let slots = match tree.kind(parent) {
                NodeKind::Pattern { alternatives }
                | NodeKind::Group { alternatives, .. }
                | NodeKind::CapturingGroup { alternatives, .. }
                | NodeKind::Lookaround { alternatives, .. } => Some(alternatives),
                _ => None,
            };
            if let Some(slots) = slots {
                if let Some(idx) = slots.iter().position(|&s| s == cur) {
                    out.insert(parent, idx);
                }
            }
        }
        cur = parent;
    }
    out
}

fn has_lookbehind(tree: &Tree) -> bool {
    tree.preorder(tree.root)
        .into_iter()
        .any(|id| matches!(tree.kind(id), NodeKind::Lookaround { behind: true, .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Rules, Target};
    use crate::parser::parse;
    use crate::tokenizer::tokenize;

    fn run(pattern: &str, flags: &str, options: &Options) -> Result<(Tree, TransformData)> {
        let tok = tokenize(pattern, flags)?;
        let mut tree = parse(&tok, &options.rules, !options.verbose)?;
        let data = transform(&mut tree, options)?;
        Ok((tree, data))
    }

    fn run_default(pattern: &str) -> (Tree, TransformData) {
        run(pattern, "", &Options::default()).unwrap()
    }

    fn count(tree: &Tree, f: impl Fn(&NodeKind) -> bool) -> usize {
        tree.preorder(tree.root)
            .into_iter()
            .filter(|&id| f(tree.kind(id)))
            .count()
    }

    #[test]
    fn numbering_is_strictly_increasing() {
        let (tree, data) = run_default("(a)(?>(b))(c)");
        let mut nums = Vec::new();
        for id in tree.preorder(tree.root) {
            if let NodeKind::CapturingGroup { number, .. } = tree.kind(id) {
                nums.push(*number);
            }
        }
        assert_eq!(nums, vec![1, 2, 3, 4]);
        assert_eq!(data.capture_count, 4);
        // The atomic helper capture is hidden.
        assert_eq!(data.hidden, vec![2]);
    }

    #[test]
    fn sibling_alternative_backref_never_matches() {
        let (tree, _) = run_default(r"(a)|\1");
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Backreference { .. })), 0);
        // Replaced by an empty negative lookahead.
        assert!(
            count(&tree, |k| matches!(
                k,
                NodeKind::Lookaround { behind: false, negate: true, .. }
            )) >= 1
        );
    }

    #[test]
    fn duplicate_names_multiplex() {
        let mut options = Options::default();
        options.rules = Rules { capture_group: true, ..Rules::default() };
        let (tree, _) = run(r"(?<n>a)(?<n>b)\k<n>", "", &options).unwrap();
        // The backreference became a two-way alternation.
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Backreference { .. })), 2);
        // Only the first keeps its name.
        let named = count(&tree, |k| {
            matches!(k, NodeKind::CapturingGroup { name: Some(_), .. })
        });
        assert_eq!(named, 1);
    }

    #[test]
    fn subroutine_expansion_transfers_to_origin() {
        let (tree, data) = run_default(r"(?<a>x)\g<a>");
        // Two captures: the original and the hidden copy.
        assert_eq!(data.capture_count, 2);
        assert_eq!(data.hidden, vec![2]);
        assert_eq!(data.transfers, vec![(1, 2)]);
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Subroutine { .. })), 0);
    }

    #[test]
    fn backref_after_subroutine_binds_to_copy() {
        let (tree, _) = run_default(r"(?<a>x)\g<a>\k<a>");
        // Most recent instance wins: the backref resolves to the copy (2).
        let mut nums = Vec::new();
        for id in tree.preorder(tree.root) {
            if let NodeKind::Backreference { to: RefTarget::Number(n), .. } = tree.kind(id) {
                nums.push(*n);
            }
        }
        assert_eq!(nums, vec![2]);
    }

    #[test]
    fn self_call_becomes_recursion() {
        let (tree, _) = run_default(r"a\g<0>?b");
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::Recursion { target: RecursionTarget::Pattern }
            )),
            1
        );
    }

    #[test]
    fn indirect_recursion_is_unsupported() {
        let tok = tokenize(r"\g<a>(?<a>x\g<b>?)(?<b>y\g<a>?)", "").unwrap();
        let mut tree = parse(&tok, &Rules::default(), true).unwrap();
        let err = transform(&mut tree, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn sticky_when_all_alternatives_lead() {
        let (_, data) = run_default(r"\Ga|\Gb");
        assert!(data.sticky);
        assert!(!data.search_start);
    }

    #[test]
    fn sticky_through_leading_group() {
        let (_, data) = run_default(r"(\Ga|\Gb)c");
        assert!(data.sticky);
    }

    #[test]
    fn deferred_search_start() {
        let (_, data) = run_default(r"a\Gb");
        assert!(!data.sticky);
        assert!(data.search_start);
    }

    #[test]
    fn mixed_g_defers() {
        let (_, data) = run_default(r"(^|\G)a");
        assert!(!data.sticky);
        assert!(data.search_start);
    }

    #[test]
    fn avoid_subclass_rejects_deferred_g() {
        let options = Options { avoid_subclass: true, ..Options::default() };
        let err = run(r"a\Gb", "", &options).unwrap_err();
        assert!(matches!(err, Error::Policy { .. }));
    }

    #[test]
    fn strict_rejects_deferred_g_with_lookbehind() {
        let options = Options { accuracy: Accuracy::Strict, ..Options::default() };
        let err = run(r"(?<=x)a\Gb", "", &options).unwrap_err();
        assert!(matches!(err, Error::Policy { .. }));
        // Without lookbehind the fallback is allowed even under strict.
        assert!(run(r"a\Gb", "", &options).is_ok());
    }

    #[test]
    fn strict_rejects_grapheme() {
        let options = Options { accuracy: Accuracy::Strict, ..Options::default() };
        assert!(matches!(run(r"\X", "", &options), Err(Error::Policy { .. })));
        assert!(run(r"\X", "", &Options::default()).is_ok());
    }

    #[test]
    fn case_plan_selection() {
        let (_, data) = run_default(r"(a)(?i)b");
        assert_eq!(data.case_plan, CasePlan::Expand);
        let options = Options { target: Target::Es2025, ..Options::default() };
        let (_, data) = run(r"(a)(?i)b", "", &options).unwrap();
        assert_eq!(data.case_plan, CasePlan::Flag);
        let (_, data) = run_default("ab");
        assert_eq!(data.case_plan, CasePlan::Flag);
    }

    #[test]
    fn strict_rejects_insensitive_backref_without_modifiers() {
        let options = Options { accuracy: Accuracy::Strict, ..Options::default() };
        let err = run(r"(a)(?i)\1", "", &options).unwrap_err();
        assert!(matches!(err, Error::Policy { .. }));
        // Fine when the target supports modifier groups.
        let options = Options {
            accuracy: Accuracy::Strict,
            target: Target::Es2025,
            ..Options::default()
        };
        assert!(run(r"(a)(?i)\1", "", &options).is_ok());
    }

    #[test]
    fn orphan_backrefs_get_placeholders() {
        let mut options = Options::default();
        options.rules = Rules { allow_orphan_backrefs: true, ..Rules::default() };
        let (tree, data) = run(r"a\k<5>", "", &options).unwrap();
        assert_eq!(data.capture_count, 1);
        assert_eq!(data.hidden, vec![1]);
        // The orphan now points at the placeholder.
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::Backreference { to: RefTarget::Number(1), .. }
            )),
            1
        );
    }

    #[test]
    fn backref_inside_own_group_never_matches() {
        let (tree, _) = run_default(r"(a\1)");
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Backreference { .. })), 0);
    }

    #[test]
    fn dot_rewrites_by_dot_all() {
        let (tree, _) = run_default("a.b");
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::CharacterSet { kind: CharacterSetKind::NonNewline, .. }
            )),
            1
        );
        let (tree, _) = run("a.b", "m", &Options::default()).unwrap();
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::CharacterSet { kind: CharacterSetKind::Any, .. }
            )),
            1
        );
    }

    #[test]
    fn ascii_flags_gate_shorthand_rewrites() {
        // Unicode default: \d becomes \p{Nd}.
        let (tree, _) = run(r"\d", "", &Options::default()).unwrap();
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::CharacterSet { kind: CharacterSetKind::Property(p), .. } if p == "Nd"
            )),
            1
        );
        // With D the shorthand stays native.
        let (tree, _) = run(r"\d", "D", &Options::default()).unwrap();
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::CharacterSet { kind: CharacterSetKind::Digit, .. }
            )),
            1
        );
    }

    #[test]
    fn word_boundary_emulation_toggles() {
        let (tree, _) = run(r"\bx", "", &Options::default()).unwrap();
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Assertion(_))), 0);
        let mut options = Options::default();
        options.rules = Rules { ascii_word_boundaries: true, ..Rules::default() };
        let (tree, _) = run(r"\bx", "", &options).unwrap();
        assert_eq!(
            count(&tree, |k| matches!(
                k,
                NodeKind::Assertion(AssertionKind::WordBoundary { .. })
            )),
            1
        );
    }

    #[test]
    fn keep_becomes_lookbehind() {
        let (tree, _) = run_default(r"ab\Kcd");
        assert_eq!(
            count(&tree, |k| matches!(k, NodeKind::Lookaround { behind: true, .. })),
            1
        );
        assert_eq!(count(&tree, |k| matches!(k, NodeKind::Directive(_))), 0);
    }

    #[test]
    fn deep_keep_is_unsupported() {
        let tok = tokenize(r"a(b\Kc)d", "").unwrap();
        let mut tree = parse(&tok, &Rules::default(), true).unwrap();
        let err = transform(&mut tree, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn intersection_needs_v_targets() {
        let options = Options { target: Target::Es2018, ..Options::default() };
        let err = run(r"[a&&b]", "", &options).unwrap_err();
        assert!(matches!(err, Error::Policy { .. }));
        assert!(run(r"[a&&b]", "", &Options::default()).is_ok());
    }
}
