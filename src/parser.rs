// parser.rs - Token stream to Oniguruma AST.
//
// Single left-to-right walk. Escaped-number tokens are resolved first,
// against the total capture count the tokenizer collected; that is the
// point where `\12` becomes a backreference, an octal escape or a literal
// digit run. Backreference targets must already be open to the left;
// subroutine targets may be forward and are validated after the walk.

use std::collections::HashMap;

use crate::ast::{GroupKind, NodeId, NodeKind, QuantifierKind, RefTarget, Tree};
use crate::error::{Error, Result};
use crate::options::Rules;
use crate::tokenizer::{GroupOpenKind, Token, TokenKind, TokenizerResult};

const PARSE_DEPTH_LIMIT: u32 = 500;

/// Build the AST for a token stream.
///
/// `optimize` additionally unwraps needlessly nested character classes and
/// redundant non-capturing groups without changing match semantics.
pub fn parse(tok: &TokenizerResult, rules: &Rules, optimize: bool) -> Result<Tree> {
    // With named groups present, unnamed groups do not capture and numbered
    // references are rejected, unless the compatibility rule is on.
    let named_mode = tok.named_captures > 0 && !rules.capture_group;
    let total_captures = if named_mode {
        tok.named_captures
    } else {
        tok.plain_captures + tok.named_captures
    };

    let tokens = resolve_escaped_numbers(&tok.tokens, total_captures, named_mode)?;

    let mut tree = Tree::new();
    let regex = tree.push(None, NodeKind::Character { value: 0 });
    tree.root = regex;
    let pattern = tree.push(Some(regex), NodeKind::Pattern { alternatives: Vec::new() });
    tree.set_kind(regex, NodeKind::Regex { pattern, flags: tok.flags });

    let mut p = Parser {
        tokens: &tokens,
        i: 0,
        tree,
        rules,
        named_mode,
        total_captures,
        numbers_assigned: 0,
        group_names: HashMap::new(),
        subroutines: Vec::new(),
        depth: 0,
    };

    let alts = p.parse_alternation(pattern)?;
    if p.i < p.tokens.len() {
        // Only an unmatched close could be left over, and the tokenizer
        // already rejects that.
        return Err(Error::semantic("unexpected trailing tokens"));
    }
    if let Some(slots) = p.tree.alternatives_mut(pattern) {
        *slots = alts;
    }
    p.validate_subroutines()?;

    let mut tree = p.tree;
    if optimize {
        optimize_tree(&mut tree);
    }
    Ok(tree)
}

/// Split deferred escaped-number tokens now that the capture count is
/// known: backreference when the value does not exceed the capture count,
/// otherwise an octal character (first digit 0-7, up to three digits) plus
/// trailing literal digits, otherwise plain literal digits.
fn resolve_escaped_numbers(
    tokens: &[Token],
    total_captures: u32,
    named_mode: bool,
) -> Result<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len());
    for t in tokens {
        let TokenKind::EscapedNumber { ref digits, in_class } = t.kind else {
            out.push(t.clone());
            continue;
        };
        let value: u32 = digits.parse().expect("tokenizer caps at three digits");
        if !in_class && value >= 1 && value <= total_captures {
            if named_mode {
                return Err(Error::semantic(
                    "numbered backref/call is not allowed (use name)",
                ));
            }
            out.push(Token {
                kind: TokenKind::Backreference(RefTarget::Number(value)),
                raw: t.raw.clone(),
                pos: t.pos,
            });
            continue;
        }
        let bytes = digits.as_bytes();
        let mut idx = 0;
        if bytes[0] <= b'7' {
            let mut octal = 0u32;
            while idx < bytes.len() && idx < 3 && bytes[idx] <= b'7' {
                octal = octal * 8 + u32::from(bytes[idx] - b'0');
                idx += 1;
            }
            out.push(Token {
                kind: TokenKind::Character { value: octal },
                raw: t.raw.clone(),
                pos: t.pos,
            });
        }
        for &b in &bytes[idx..] {
            out.push(Token {
                kind: TokenKind::Character { value: u32::from(b) },
                raw: (b as char).to_string(),
                pos: t.pos,
            });
        }
    }
    Ok(out)
}

struct Parser<'t> {
    tokens: &'t [Token],
    i: usize,
    tree: Tree,
    rules: &'t Rules,
    named_mode: bool,
    total_captures: u32,
    numbers_assigned: u32,
    /// Name -> occurrences opened so far (left of the cursor).
    group_names: HashMap<String, u32>,
    subroutines: Vec<NodeId>,
    depth: u32,
}

impl<'t> Parser<'t> {
    fn current(&self) -> Option<&'t TokenKind> {
        self.tokens.get(self.i).map(|t| &t.kind)
    }

    fn parse_alternation(&mut self, parent: NodeId) -> Result<Vec<NodeId>> {
        let mut alts = Vec::new();
        loop {
            alts.push(self.parse_alternative(parent)?);
            if matches!(self.current(), Some(TokenKind::Alternator)) {
                self.i += 1;
            } else {
                return Ok(alts);
            }
        }
    }

    fn parse_alternative(&mut self, parent: NodeId) -> Result<NodeId> {
        let alt = self.tree.push(Some(parent), NodeKind::Alternative { elements: Vec::new() });
        let mut elements: Vec<NodeId> = Vec::new();
        loop {
            let Some(kind) = self.current() else { break };
            match kind {
                TokenKind::Alternator | TokenKind::GroupClose => break,
                TokenKind::Quantifier { min, max, kind } => {
                    let (min, max, kind) = (*min, *max, *kind);
                    self.i += 1;
                    self.apply_quantifier(alt, &mut elements, min, max, kind)?;
                }
                TokenKind::GroupOpen(open) => {
                    let open = open.clone();
                    self.i += 1;
                    elements.push(self.parse_group(alt, open)?);
                }
                TokenKind::ClassOpen { negate } => {
                    let negate = *negate;
                    self.i += 1;
                    elements.push(self.parse_class(alt, negate)?);
                }
                TokenKind::Character { value } => {
                    let value = *value;
                    self.i += 1;
                    elements.push(self.tree.push(Some(alt), NodeKind::Character { value }));
                }
                TokenKind::CharacterSet { kind, negate } => {
                    let (kind, negate) = (kind.clone(), *negate);
                    self.i += 1;
                    elements.push(
                        self.tree.push(Some(alt), NodeKind::CharacterSet { kind, negate }),
                    );
                }
                TokenKind::Assertion(k) => {
                    let k = *k;
                    self.i += 1;
                    elements.push(self.tree.push(Some(alt), NodeKind::Assertion(k)));
                }
                TokenKind::Directive(k) => {
                    let k = k.clone();
                    self.i += 1;
                    elements.push(self.tree.push(Some(alt), NodeKind::Directive(k)));
                }
                TokenKind::Backreference(target) => {
                    let target = target.clone();
                    self.i += 1;
                    elements.push(self.backreference(alt, target)?);
                }
                TokenKind::Subroutine(target) => {
                    let target = target.clone();
                    self.i += 1;
                    let node =
                        self.tree.push(Some(alt), NodeKind::Subroutine { to: target });
                    self.subroutines.push(node);
                    elements.push(node);
                }
                TokenKind::VariableLengthCharacterSet(k) => {
                    let k = *k;
                    self.i += 1;
                    elements
                        .push(self.tree.push(Some(alt), NodeKind::VariableLengthCharacterSet(k)));
                }
                TokenKind::Fail => {
                    self.i += 1;
                    elements.push(self.never_match(alt));
                }
                TokenKind::EscapedNumber { .. } => {
                    return Err(Error::semantic("unresolved escaped number"));
                }
                TokenKind::ClassClose
                | TokenKind::ClassHyphen
                | TokenKind::ClassIntersector => {
                    return Err(Error::semantic("character-class token outside class"));
                }
            }
        }
        if let NodeKind::Alternative { elements: slots } = self.tree.kind_mut(alt) {
            *slots = elements;
        }
        Ok(alt)
    }

    fn apply_quantifier(
        &mut self,
        alt: NodeId,
        elements: &mut Vec<NodeId>,
        min: u32,
        max: u32,
        kind: QuantifierKind,
    ) -> Result<()> {
        let Some(&target) = elements.last() else {
            return Err(Error::semantic("target of repeat operator is not specified"));
        };
        if matches!(self.tree.kind(target), NodeKind::Directive(_)) {
            return Err(Error::semantic("target of repeat operator is invalid"));
        }
        let q = self.tree.push(
            Some(alt),
            NodeKind::Quantifier { min, max, kind, element: target },
        );
        self.tree.set_parent(target, Some(q));
        *elements.last_mut().unwrap() = q;
        Ok(())
    }

    fn parse_group(&mut self, parent: NodeId, open: GroupOpenKind) -> Result<NodeId> {
        self.depth += 1;
        if self.depth > PARSE_DEPTH_LIMIT {
            return Err(Error::semantic("parse depth limit exceeded"));
        }
        let node = match open {
            GroupOpenKind::Capturing { name } => {
                if let Some(n) = &name {
                    let count = self.group_names.entry(n.clone()).or_insert(0);
                    if *count >= 1 && !self.rules.capture_group {
                        return Err(Error::semantic(format!(
                            "multiplex defined name <{}>",
                            n
                        )));
                    }
                    *count += 1;
                }
                if name.is_some() || !self.named_mode {
                    self.numbers_assigned += 1;
                    self.tree.push(
                        Some(parent),
                        NodeKind::CapturingGroup {
                            number: self.numbers_assigned,
                            name,
                            hidden: false,
                            alternatives: Vec::new(),
                        },
                    )
                } else {
                    // Unnamed groups do not capture once named groups exist.
                    self.tree.push(
                        Some(parent),
                        NodeKind::Group {
                            kind: GroupKind::NonCapturing,
                            alternatives: Vec::new(),
                        },
                    )
                }
            }
            GroupOpenKind::NonCapturing => self.tree.push(
                Some(parent),
                NodeKind::Group { kind: GroupKind::NonCapturing, alternatives: Vec::new() },
            ),
            GroupOpenKind::Atomic => self.tree.push(
                Some(parent),
                NodeKind::Group { kind: GroupKind::Atomic, alternatives: Vec::new() },
            ),
            GroupOpenKind::Absent => self.tree.push(
                Some(parent),
                NodeKind::Group { kind: GroupKind::Absent, alternatives: Vec::new() },
            ),
            GroupOpenKind::Flags { on, off } => self.tree.push(
                Some(parent),
                NodeKind::Group { kind: GroupKind::Flags { on, off }, alternatives: Vec::new() },
            ),
            GroupOpenKind::Lookahead { negate } => self.tree.push(
                Some(parent),
                NodeKind::Lookaround { behind: false, negate, alternatives: Vec::new() },
            ),
            GroupOpenKind::Lookbehind { negate } => self.tree.push(
                Some(parent),
                NodeKind::Lookaround { behind: true, negate, alternatives: Vec::new() },
            ),
        };
        let alts = self.parse_alternation(node)?;
        if !matches!(self.current(), Some(TokenKind::GroupClose)) {
            return Err(Error::semantic("end pattern with unmatched parenthesis"));
        }
        self.i += 1;
        if let Some(slots) = self.tree.alternatives_mut(node) {
            *slots = alts;
        }
        self.depth -= 1;
        Ok(node)
    }

    fn backreference(&mut self, alt: NodeId, target: RefTarget) -> Result<NodeId> {
        let mut orphan = false;
        match &target {
            RefTarget::Number(n) => {
                if self.named_mode {
                    return Err(Error::semantic(
                        "numbered backref/call is not allowed (use name)",
                    ));
                }
                if *n == 0 {
                    return Err(Error::semantic("invalid backref number 0"));
                }
                if *n > self.total_captures {
                    if self.rules.allow_orphan_backrefs {
                        orphan = true;
                    } else {
                        return Err(Error::semantic(format!(
                            "invalid backref number \\k<{}>",
                            n
                        )));
                    }
                } else if *n > self.numbers_assigned {
                    // Forward reference to a group that only opens later.
                    return Err(Error::semantic(format!(
                        "invalid forward backref number \\{}",
                        n
                    )));
                }
            }
            RefTarget::Name(name) => {
                if !self.group_names.contains_key(name) {
                    if self.rules.allow_orphan_backrefs {
                        orphan = true;
                    } else {
                        return Err(Error::semantic(format!(
                            "undefined name <{}> reference",
                            name
                        )));
                    }
                }
            }
            RefTarget::Node(_) => unreachable!("parser never sees node targets"),
        }
        Ok(self
            .tree
            .push(Some(alt), NodeKind::Backreference { to: target, orphan }))
    }

    fn never_match(&mut self, parent: NodeId) -> NodeId {
        let look = self.tree.push(
            Some(parent),
            NodeKind::Lookaround { behind: false, negate: true, alternatives: Vec::new() },
        );
        let inner = self.tree.push(Some(look), NodeKind::Alternative { elements: Vec::new() });
        if let Some(slots) = self.tree.alternatives_mut(look) {
            slots.push(inner);
        }
        look
    }

    /// Subroutine targets may be forward references; validate after the
    /// whole pattern is known.
    fn validate_subroutines(&self) -> Result<()> {
        for &node in &self.subroutines {
            let NodeKind::Subroutine { to } = self.tree.kind(node) else { continue };
            match to {
                RefTarget::Number(0) => {}
                RefTarget::Number(n) => {
                    if self.named_mode {
                        return Err(Error::semantic(
                            "numbered backref/call is not allowed (use name)",
                        ));
                    }
                    if *n > self.total_captures {
                        return Err(Error::semantic(format!(
                            "undefined group <{}> reference",
                            n
                        )));
                    }
                }
                RefTarget::Name(name) => match self.group_names.get(name) {
                    None => {
                        return Err(Error::semantic(format!(
                            "undefined name <{}> reference",
                            name
                        )))
                    }
                    Some(&count) if count > 1 => {
                        return Err(Error::semantic(format!(
                            "multiplex definition name <{}> call",
                            name
                        )))
                    }
                    _ => {}
                },
                RefTarget::Node(_) => {}
            }
        }
        Ok(())
    }
}

// === Optimization ===

/// Pure syntactic simplification: unwrap nested non-negated classes and
/// inline single-alternative non-capturing groups. Idempotent.
fn optimize_tree(tree: &mut Tree) {
    let order = tree.preorder(tree.root);
    // Children first, so unwrapping cascades outward in one pass.
    for &id in order.iter().rev() {
        match tree.kind(id).clone() {
            NodeKind::CharacterClass { negate, elements } => {
                let mut out = Vec::with_capacity(elements.len());
                let mut changed = false;
                for e in elements {
                    match tree.kind(e) {
                        NodeKind::CharacterClass { negate: false, elements: inner } => {
                            let inner = inner.clone();
                            for &c in &inner {
                                tree.set_parent(c, Some(id));
                            }
                            out.extend(inner);
                            changed = true;
                        }
                        _ => out.push(e),
                    }
                }
                if changed {
                    tree.set_kind(id, NodeKind::CharacterClass { negate, elements: out });
                }
            }
            NodeKind::Group { kind: GroupKind::NonCapturing, alternatives }
                if alternatives.len() == 1 =>
            {
                let Some(parent) = tree.parent(id) else { continue };
                let NodeKind::Alternative { elements: pelems } = tree.kind(parent).clone()
                else {
                    continue;
                };
                let NodeKind::Alternative { elements: inner } =
                    tree.kind(alternatives[0]).clone()
                else {
                    continue;
                };
                let Some(slot) = pelems.iter().position(|&e| e == id) else { continue };
                let mut new_elems = pelems;
                new_elems.splice(slot..=slot, inner.iter().copied());
                for &c in &inner {
                    tree.set_parent(c, Some(parent));
                }
                tree.set_kind(parent, NodeKind::Alternative { elements: new_elems });
            }
            _ => {}
        }
    }
}

// === Character classes ===

impl<'t> Parser<'t> {
    /// Parse tokens after a `ClassOpen` into a class node. Hyphens become
    /// ranges only between two plain characters; `&&` splits the class into
    /// intersection operands.
    fn parse_class(&mut self, parent: NodeId, negate: bool) -> Result<NodeId> {
        self.depth += 1;
        if self.depth > PARSE_DEPTH_LIMIT {
            return Err(Error::semantic("parse depth limit exceeded"));
        }
        let class = self.tree.push(
            Some(parent),
            NodeKind::CharacterClass { negate, elements: Vec::new() },
        );
        // Operands accumulate per `&&`; most classes have exactly one.
        let mut operands: Vec<Vec<NodeId>> = vec![Vec::new()];
        // A pending hyphen that may still become a range.
        let mut pending_hyphen = false;

        loop {
            let Some(kind) = self.current() else {
                return Err(Error::semantic("premature end of char-class"));
            };
            match kind {
                TokenKind::ClassClose => {
                    self.i += 1;
                    break;
                }
                TokenKind::ClassHyphen => {
                    self.i += 1;
                    let last_is_char = operands
                        .last()
                        .unwrap()
                        .last()
                        .map(|&e| matches!(tree_kind(&self.tree, e), NodeKind::Character { .. }))
                        .unwrap_or(false);
                    let next_is_value = matches!(
                        self.current(),
                        Some(TokenKind::Character { .. })
                    );
                    if pending_hyphen {
                        // `a--`: the second hyphen is a literal.
                        self.push_class_char(&mut operands, class, '-' as u32);
                        pending_hyphen = false;
                    } else if last_is_char && next_is_value {
                        pending_hyphen = true;
                    } else {
                        self.push_class_char(&mut operands, class, '-' as u32);
                    }
                }
                TokenKind::ClassIntersector => {
                    self.i += 1;
                    if pending_hyphen {
                        self.push_class_char(&mut operands, class, '-' as u32);
                        pending_hyphen = false;
                    }
                    operands.push(Vec::new());
                }
                TokenKind::Character { value } => {
                    let value = *value;
                    self.i += 1;
                    if pending_hyphen {
                        pending_hyphen = false;
                        let op = operands.last_mut().unwrap();
                        let low = op.pop().unwrap();
                        let &NodeKind::Character { value: min } = self.tree.kind(low) else {
                            unreachable!("range start checked to be a character");
                        };
                        if min > value {
                            return Err(Error::semantic(
                                "char-class value range is not in order",
                            ));
                        }
                        op.push(self.tree.push(
                            Some(class),
                            NodeKind::CharacterClassRange { min, max: value },
                        ));
                    } else {
                        self.push_class_char(&mut operands, class, value);
                    }
                }
                TokenKind::CharacterSet { kind, negate } => {
                    let (kind, negate) = (kind.clone(), *negate);
                    self.i += 1;
                    if pending_hyphen {
                        self.push_class_char(&mut operands, class, '-' as u32);
                        pending_hyphen = false;
                    }
                    operands
                        .last_mut()
                        .unwrap()
                        .push(self.tree.push(Some(class), NodeKind::CharacterSet { kind, negate }));
                }
                TokenKind::ClassOpen { negate } => {
                    let negate = *negate;
                    self.i += 1;
                    if pending_hyphen {
                        self.push_class_char(&mut operands, class, '-' as u32);
                        pending_hyphen = false;
                    }
                    let nested = self.parse_class(class, negate)?;
                    operands.last_mut().unwrap().push(nested);
                }
                _ => {
                    return Err(Error::semantic("invalid token in char-class"));
                }
            }
        }
        if pending_hyphen {
            self.push_class_char(&mut operands, class, '-' as u32);
        }

        if operands.len() == 1 {
            let elements = operands.pop().unwrap();
            if elements.is_empty() {
                return Err(Error::semantic("empty char-class"));
            }
            if let NodeKind::CharacterClass { elements: slots, .. } = self.tree.kind_mut(class) {
                *slots = elements;
            }
        } else {
            // `a&&b` style: wrap each operand in its own class node under an
            // intersection.
            let inter = self.tree.push(
                Some(class),
                NodeKind::CharacterClassIntersection { classes: Vec::new() },
            );
            let mut classes = Vec::with_capacity(operands.len());
            for op in operands {
                let opnode = self.tree.push(
                    Some(inter),
                    NodeKind::CharacterClass { negate: false, elements: op.clone() },
                );
                for &e in &op {
                    self.tree.set_parent(e, Some(opnode));
                }
                classes.push(opnode);
            }
            if let NodeKind::CharacterClassIntersection { classes: slots } =
                self.tree.kind_mut(inter)
            {
                *slots = classes;
            }
            if let NodeKind::CharacterClass { elements: slots, .. } = self.tree.kind_mut(class) {
                *slots = vec![inter];
            }
        }
        self.depth -= 1;
        Ok(class)
    }

    fn push_class_char(&mut self, operands: &mut [Vec<NodeId>], class: NodeId, value: u32) {
        operands
            .last_mut()
            .unwrap()
            .push(self.tree.push(Some(class), NodeKind::Character { value }));
    }
}

fn tree_kind<'a>(tree: &'a Tree, id: NodeId) -> &'a NodeKind {
    tree.kind(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse_ok(pattern: &str) -> Tree {
        let tok = tokenize(pattern, "").unwrap();
        parse(&tok, &Rules::default(), false).unwrap()
    }

    fn parse_err(pattern: &str) -> Error {
        let tok = tokenize(pattern, "").unwrap();
        parse(&tok, &Rules::default(), false).unwrap_err()
    }

    fn count_kind(tree: &Tree, f: impl Fn(&NodeKind) -> bool) -> usize {
        tree.preorder(tree.root)
            .into_iter()
            .filter(|&id| f(tree.kind(id)))
            .count()
    }

    #[test]
    fn captures_are_numbered_in_order() {
        let tree = parse_ok("(a)(b(c))");
        let mut numbers = Vec::new();
        for id in tree.preorder(tree.root) {
            if let NodeKind::CapturingGroup { number, .. } = tree.kind(id) {
                numbers.push(*number);
            }
        }
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn named_mode_disables_plain_captures() {
        let tree = parse_ok("(a)(?<n>b)");
        assert_eq!(
            count_kind(&tree, |k| matches!(k, NodeKind::CapturingGroup { .. })),
            1
        );
        assert_eq!(
            count_kind(&tree, |k| matches!(
                k,
                NodeKind::Group { kind: GroupKind::NonCapturing, .. }
            )),
            1
        );
    }

    #[test]
    fn capture_group_rule_keeps_plain_captures() {
        let tok = tokenize("(a)(?<n>b)", "").unwrap();
        let rules = Rules { capture_group: true, ..Rules::default() };
        let tree = parse(&tok, &rules, false).unwrap();
        assert_eq!(
            count_kind(&tree, |k| matches!(k, NodeKind::CapturingGroup { .. })),
            2
        );
    }

    #[test]
    fn duplicate_names_need_rule() {
        assert!(matches!(parse_err("(?<n>a)(?<n>b)"), Error::Semantic { .. }));
        let tok = tokenize("(?<n>a)(?<n>b)", "").unwrap();
        let rules = Rules { capture_group: true, ..Rules::default() };
        assert!(parse(&tok, &rules, false).is_ok());
    }

    #[test]
    fn numbered_refs_rejected_in_named_mode() {
        assert!(matches!(parse_err(r"(?<n>a)(b)\k<1>"), Error::Semantic { .. }));
    }

    #[test]
    fn forward_and_undefined_backrefs() {
        // `\2(a)(b)`: two groups exist, so `\2` is a backreference, and a
        // forward one, which is an error.
        assert!(matches!(parse_err(r"\2(a)(b)"), Error::Semantic { .. }));
        assert!(matches!(parse_err(r"\k<5>"), Error::Semantic { .. }));
        assert!(matches!(parse_err(r"\k<missing>(?<m>a)"), Error::Semantic { .. }));
    }

    #[test]
    fn backref_inside_own_group_parses() {
        // Unsatisfiable, but not a parse error; the transformer turns it
        // into a never-match.
        let tree = parse_ok(r"(a\1)");
        assert_eq!(
            count_kind(&tree, |k| matches!(k, NodeKind::Backreference { .. })),
            1
        );
    }

    #[test]
    fn escaped_number_fallbacks() {
        // One group only: `\2` resolves as octal \x02.
        let tree = parse_ok(r"(a)\2");
        assert_eq!(count_kind(&tree, |k| *k == NodeKind::Character { value: 2 }), 1);
        // `\8` with no groups: literal '8'.
        let tree = parse_ok(r"\8");
        assert_eq!(
            count_kind(&tree, |k| *k == NodeKind::Character { value: '8' as u32 }),
            1
        );
        // `\12` with one group: octal 0o12 (no trailing digits).
        let tree = parse_ok(r"(a)\12");
        assert_eq!(count_kind(&tree, |k| *k == NodeKind::Character { value: 0o12 }), 1);
        // In-class digits never become backreferences.
        let tree = parse_ok(r"(a)[\1]");
        assert_eq!(count_kind(&tree, |k| matches!(k, NodeKind::Backreference { .. })), 0);
    }

    #[test]
    fn orphan_backrefs_with_rule() {
        let tok = tokenize(r"\k<5>", "").unwrap();
        let rules = Rules { allow_orphan_backrefs: true, ..Rules::default() };
        let tree = parse(&tok, &rules, false).unwrap();
        let orphans = tree
            .preorder(tree.root)
            .into_iter()
            .filter(|&id| matches!(tree.kind(id), NodeKind::Backreference { orphan: true, .. }))
            .count();
        assert_eq!(orphans, 1);
    }

    #[test]
    fn subroutine_targets() {
        let _ = parse_ok(r"(?<a>x)\g<a>");
        // Forward subroutine calls are fine.
        let tree = parse_ok(r"\g<a>(?<a>x)");
        assert_eq!(count_kind(&tree, |k| matches!(k, NodeKind::Subroutine { .. })), 1);
        assert!(matches!(parse_err(r"\g<nope>"), Error::Semantic { .. }));
        // Ambiguous by-name call.
        let tok = tokenize(r"(?<a>x)(?<a>y)\g<a>", "").unwrap();
        let rules = Rules { capture_group: true, ..Rules::default() };
        assert!(parse(&tok, &rules, false).is_err());
    }

    #[test]
    fn quantifier_needs_target() {
        assert!(matches!(parse_err("*a"), Error::Semantic { .. }));
        assert!(matches!(parse_err(r"(?i)*"), Error::Semantic { .. }));
    }

    #[test]
    fn quantifier_chaining() {
        // `a**` quantifies the quantifier.
        let tree = parse_ok("a**");
        assert_eq!(count_kind(&tree, |k| matches!(k, NodeKind::Quantifier { .. })), 2);
    }

    #[test]
    fn class_ranges() {
        let tree = parse_ok("[a-z0]");
        assert_eq!(
            count_kind(&tree, |k| matches!(
                k,
                NodeKind::CharacterClassRange { min, max } if *min == 'a' as u32 && *max == 'z' as u32
            )),
            1
        );
        assert!(matches!(parse_err("[z-a]"), Error::Semantic { .. }));
    }

    #[test]
    fn class_literal_hyphens() {
        // Leading, trailing and doubled hyphens are literals.
        for pat in ["[-a]", "[a-]", "[a--]", r"[\d-a]"] {
            let tree = parse_ok(pat);
            assert_eq!(
                count_kind(&tree, |k| *k == NodeKind::Character { value: '-' as u32 }),
                1,
                "{}",
                pat
            );
        }
    }

    #[test]
    fn class_intersection() {
        let tree = parse_ok(r"[\w&&[^a]]");
        assert_eq!(
            count_kind(&tree, |k| matches!(k, NodeKind::CharacterClassIntersection { .. })),
            1
        );
    }

    #[test]
    fn empty_class_is_error() {
        assert!(matches!(parse_err("[]"), Error::Semantic { .. }));
    }

    #[test]
    fn optimize_unwraps_nested_classes() {
        let tok = tokenize("[[ab]]", "").unwrap();
        let tree = parse(&tok, &Rules::default(), true).unwrap();
        assert_eq!(
            count_kind(&tree, |k| matches!(k, NodeKind::CharacterClass { .. })),
            1
        );
    }

    #[test]
    fn optimize_unwraps_redundant_groups() {
        let tok = tokenize("(?:(?:ab))c", "").unwrap();
        let tree = parse(&tok, &Rules::default(), true).unwrap();
        assert_eq!(count_kind(&tree, |k| matches!(k, NodeKind::Group { .. })), 0);
    }

    #[test]
    fn optimize_keeps_quantified_groups() {
        let tok = tokenize("(?:ab)+", "").unwrap();
        let tree = parse(&tok, &Rules::default(), true).unwrap();
        assert_eq!(count_kind(&tree, |k| matches!(k, NodeKind::Group { .. })), 1);
    }
}
