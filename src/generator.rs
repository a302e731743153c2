// generator.rs - Serializes the transformed AST into target syntax.
//
// Rendering is gated on the configured ECMAScript target: `v`-mode class
// syntax (nesting, intersection) and inline modifier groups are only
// emitted when the target supports them. When modifier groups are
// unavailable and the pattern mixes case sensitivities, the `i` flag is
// dropped and literals in insensitive regions expand to case-variant
// classes. Recursion nodes are expanded to the configured depth, with a
// never-match at the bound.

use crate::ast::{
    AssertionKind, CharacterSetKind, GroupKind, NodeId, NodeKind, QuantifierKind,
    RecursionTarget, RefTarget, Tree, UNBOUNDED,
};
use crate::emulation::{EmulationInfo, Strategy};
use crate::error::{Error, Result};
use crate::options::{OnigFlags, Options};
use crate::transform::{CasePlan, TransformData};
use crate::unicode::{case_variants, has_case_variants};

/// Result of transpilation: a pattern/flag pair, plus emulation data when
/// static syntax alone cannot reproduce the behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct Details {
    pub pattern: String,
    pub flags: String,
    pub emulation: Option<EmulationInfo>,
}

pub fn generate(tree: &Tree, data: &TransformData, options: &Options) -> Result<Details> {
    let global = tree.flags();
    let mut g = Generator {
        tree,
        v_mode: options.target.supports_v_flag(),
        modifiers: options.target.supports_modifiers(),
        expand_case: data.case_plan == CasePlan::Expand,
        recursion_limit: options.rules.recursion_limit,
        out: String::new(),
    };
    let ctx = RenderCtx {
        ignore_case: global.contains(OnigFlags::IGNORE_CASE),
        in_class: false,
        rec_depth: 0,
        suppress_captures: false,
    };
    g.render(tree.root, ctx)?;

    let mut flags = String::new();
    if options.has_indices {
        flags.push('d');
    }
    if options.global {
        flags.push('g');
    }
    if global.contains(OnigFlags::IGNORE_CASE) && data.case_plan == CasePlan::Flag {
        flags.push('i');
    }
    flags.push(if g.v_mode { 'v' } else { 'u' });
    if data.sticky {
        flags.push('y');
    }

    let emulation = EmulationInfo {
        strategy: if data.search_start { Some(Strategy::SearchStart) } else { None },
        hidden_captures: data.hidden.clone(),
        transfers: data.transfers.clone(),
        lazy_compile: false,
    };
    Ok(Details {
        pattern: g.out,
        flags,
        emulation: if emulation.is_noop() { None } else { Some(emulation) },
    })
}

#[derive(Clone, Copy)]
struct RenderCtx {
    ignore_case: bool,
    in_class: bool,
    rec_depth: u32,
    /// Inside a recursion expansion: captures render non-capturing so the
    /// expansion does not disturb group numbering.
    suppress_captures: bool,
}

struct Generator<'a> {
    tree: &'a Tree,
    v_mode: bool,
    modifiers: bool,
    expand_case: bool,
    recursion_limit: u32,
    out: String,
}

impl<'a> Generator<'a> {
    fn render(&mut self, id: NodeId, ctx: RenderCtx) -> Result<()> {
        match self.tree.kind(id) {
            NodeKind::Regex { pattern, .. } => self.render(*pattern, ctx),
            NodeKind::Pattern { alternatives } => self.render_alternation(alternatives, ctx),
            NodeKind::Alternative { elements } => {
                for &e in elements.clone().iter() {
                    self.render(e, ctx)?;
                }
                Ok(())
            }
            NodeKind::Group { kind, alternatives } => {
                let alternatives = alternatives.clone();
                let mut inner = ctx;
                match kind {
                    GroupKind::Flags { on, off } => {
                        let (on, off) = (*on, *off);
                        if on.contains(OnigFlags::IGNORE_CASE) {
                            inner.ignore_case = true;
                        }
                        if off.contains(OnigFlags::IGNORE_CASE) {
                            inner.ignore_case = false;
                        }
                        let i_on = on.contains(OnigFlags::IGNORE_CASE);
                        let i_off = off.contains(OnigFlags::IGNORE_CASE);
                        if self.modifiers && (i_on || i_off) {
                            self.out.push_str("(?");
                            if i_on {
                                self.out.push('i');
                            }
                            if i_off {
                                self.out.push_str("-i");
                            }
                            self.out.push(':');
                        } else {
                            self.out.push_str("(?:");
                        }
                    }
                    _ => self.out.push_str("(?:"),
                }
                self.render_alternation(&alternatives, inner)?;
                self.out.push(')');
                Ok(())
            }
            NodeKind::CapturingGroup { name, hidden, alternatives, .. } => {
                let alternatives = alternatives.clone();
                if ctx.suppress_captures {
                    self.out.push_str("(?:");
                } else {
                    match name {
                        Some(n) if !hidden => {
                            self.out.push_str("(?<");
                            self.out.push_str(n);
                            self.out.push('>');
                        }
                        _ => self.out.push('('),
                    }
                }
                self.render_alternation(&alternatives, ctx)?;
                self.out.push(')');
                Ok(())
            }
            NodeKind::Lookaround { behind, negate, alternatives } => {
                let alternatives = alternatives.clone();
                self.out.push_str(match (*behind, *negate) {
                    (false, false) => "(?=",
                    (false, true) => "(?!",
                    (true, false) => "(?<=",
                    (true, true) => "(?<!",
                });
                self.render_alternation(&alternatives, ctx)?;
                self.out.push(')');
                Ok(())
            }
            NodeKind::Assertion(kind) => {
                self.out.push_str(match kind {
                    AssertionKind::StringStart => "^",
                    AssertionKind::StringEnd => "$",
                    AssertionKind::WordBoundary { negate: false } => "\\b",
                    AssertionKind::WordBoundary { negate: true } => "\\B",
                    // Start of the (sliced) subject; only meaningful with
                    // the search-start wrapper strategy.
                    AssertionKind::SearchStart => "(?<![\\s\\S])",
                    AssertionKind::LineStart => "(?<=^|\\n)",
                    AssertionKind::LineEnd => "(?=\\n|$)",
                    AssertionKind::StringEndNewline => "(?=\\n?$)",
                });
                Ok(())
            }
            NodeKind::Backreference { to, .. } => match to {
                RefTarget::Number(n) => {
                    self.out.push('\\');
                    self.out.push_str(&n.to_string());
                    Ok(())
                }
                _ => Err(Error::semantic("unresolved backreference")),
            },
            NodeKind::Character { value } => {
                self.render_char(*value, ctx);
                Ok(())
            }
            NodeKind::CharacterSet { kind, negate } => {
                let (kind, negate) = (kind.clone(), *negate);
                self.render_set(&kind, negate, ctx)
            }
            NodeKind::CharacterClass { .. } => self.render_class(id, ctx),
            NodeKind::CharacterClassRange { min, max } => {
                let (min, max) = (*min, *max);
                self.render_range(min, max, ctx);
                Ok(())
            }
            NodeKind::CharacterClassIntersection { .. } => {
                Err(Error::semantic("intersection outside a character class"))
            }
            NodeKind::Quantifier { min, max, kind, element } => {
                let (min, max, kind, element) = (*min, *max, *kind, *element);
                self.render_quantified(min, max, kind, element, ctx)
            }
            NodeKind::Recursion { target } => {
                let target = *target;
                self.render_recursion(target, ctx)
            }
            NodeKind::VariableLengthCharacterSet(_)
            | NodeKind::Directive(_)
            | NodeKind::Subroutine { .. } => {
                Err(Error::semantic("untransformed node reached the generator"))
            }
        }
    }

    fn render_alternation(&mut self, alternatives: &[NodeId], ctx: RenderCtx) -> Result<()> {
        for (i, &a) in alternatives.iter().enumerate() {
            if i > 0 {
                self.out.push('|');
            }
            self.render(a, ctx)?;
        }
        Ok(())
    }

    fn render_quantified(
        &mut self,
        min: u32,
        max: u32,
        kind: QuantifierKind,
        element: NodeId,
        ctx: RenderCtx,
    ) -> Result<()> {
        // Quantified assertions and chained quantifiers need an explicit
        // group in u/v mode.
        let needs_group = matches!(
            self.tree.kind(element),
            NodeKind::Quantifier { .. }
                | NodeKind::Lookaround { .. }
                | NodeKind::Assertion(_)
                | NodeKind::Recursion { .. }
        );
        if needs_group {
            self.out.push_str("(?:");
            self.render(element, ctx)?;
            self.out.push(')');
        } else {
            self.render(element, ctx)?;
        }
        match (min, max) {
            (0, 1) => self.out.push('?'),
            (0, UNBOUNDED) => self.out.push('*'),
            (1, UNBOUNDED) => self.out.push('+'),
            (m, UNBOUNDED) => {
                self.out.push_str(&format!("{{{},}}", m));
            }
            (m, x) if m == x => {
                self.out.push_str(&format!("{{{}}}", m));
            }
            (m, x) => {
                self.out.push_str(&format!("{{{},{}}}", m, x));
            }
        }
        match kind {
            QuantifierKind::Greedy => Ok(()),
            QuantifierKind::Lazy => {
                self.out.push('?');
                Ok(())
            }
            QuantifierKind::Possessive => {
                Err(Error::semantic("possessive quantifier reached the generator"))
            }
        }
    }

    /// Depth-bounded inlining of a recursive call. At the depth limit the
    /// recursion point becomes a never-match; capture groups inside the
    /// expansion render non-capturing so numbering stays stable.
    fn render_recursion(&mut self, target: RecursionTarget, ctx: RenderCtx) -> Result<()> {
        if ctx.rec_depth + 2 > self.recursion_limit {
            self.out.push_str("(?!)");
            return Ok(());
        }
        let alternatives = match target {
            RecursionTarget::Pattern => {
                let NodeKind::Regex { pattern, .. } = self.tree.kind(self.tree.root) else {
                    return Err(Error::semantic("malformed tree root"));
                };
                let NodeKind::Pattern { alternatives } = self.tree.kind(*pattern) else {
                    return Err(Error::semantic("malformed pattern node"));
                };
                alternatives.clone()
            }
            RecursionTarget::Group(g) => match self.tree.kind(g) {
                NodeKind::CapturingGroup { alternatives, .. } => alternatives.clone(),
                _ => return Err(Error::semantic("recursion target is not a group")),
            },
        };
        let mut inner = ctx;
        inner.rec_depth += 1;
        inner.suppress_captures = true;
        self.out.push_str("(?:");
        self.render_alternation(&alternatives, inner)?;
        self.out.push(')');
        Ok(())
    }

    fn render_set(&mut self, kind: &CharacterSetKind, negate: bool, ctx: RenderCtx) -> Result<()> {
        match kind {
            CharacterSetKind::Digit => {
                self.out.push_str(if negate { "\\D" } else { "\\d" });
            }
            CharacterSetKind::Word => {
                self.out.push_str(if negate { "\\W" } else { "\\w" });
            }
            CharacterSetKind::Space => {
                self.out.push_str(if negate { "\\S" } else { "\\s" });
            }
            CharacterSetKind::Property(name) => {
                self.out.push_str(if negate { "\\P{" } else { "\\p{" });
                self.out.push_str(name);
                self.out.push('}');
            }
            CharacterSetKind::Any => {
                if ctx.in_class {
                    self.out.push_str("\\s\\S");
                } else {
                    self.out.push_str("[\\s\\S]");
                }
            }
            CharacterSetKind::NonNewline => {
                self.out.push_str("[^\\n]");
            }
            CharacterSetKind::Dot => {
                self.out.push('.');
            }
            CharacterSetKind::Hex | CharacterSetKind::Posix(_) => {
                return Err(Error::semantic("untransformed character set"));
            }
        }
        Ok(())
    }

    fn render_class(&mut self, id: NodeId, ctx: RenderCtx) -> Result<()> {
        let NodeKind::CharacterClass { negate, elements } = self.tree.kind(id).clone() else {
            return Err(Error::semantic("not a character class"));
        };
        // Intersections keep their structure; everything else flattens in
        // u mode where nesting does not exist.
        if elements.len() == 1 {
            if let NodeKind::CharacterClassIntersection { classes } = self.tree.kind(elements[0])
            {
                if !self.v_mode {
                    return Err(Error::policy(
                        "character-class intersection requires min target Es2024",
                    ));
                }
                let classes = classes.clone();
                self.out.push('[');
                if negate {
                    self.out.push('^');
                }
                for (i, &c) in classes.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str("&&");
                    }
                    // A single-class operand does not need its wrapper.
                    let mut op = c;
                    while let NodeKind::CharacterClass { negate: false, elements } =
                        self.tree.kind(op)
                    {
                        match elements.as_slice() {
                            [only]
                                if matches!(
                                    self.tree.kind(*only),
                                    NodeKind::CharacterClass { .. }
                                ) =>
                            {
                                op = *only;
                            }
                            _ => break,
                        }
                    }
                    self.render_class(op, RenderCtx { in_class: true, ..ctx })?;
                }
                self.out.push(']');
                return Ok(());
            }
        }

        let items = if self.v_mode {
            elements
        } else {
            let mut flat = Vec::with_capacity(elements.len());
            self.flatten_class(&elements, &mut flat)?;
            flat
        };

        self.out.push('[');
        if negate {
            self.out.push('^');
        }
        let inner = RenderCtx { in_class: true, ..ctx };
        for &item in &items {
            match self.tree.kind(item) {
                NodeKind::CharacterClass { .. } => self.render_class(item, inner)?,
                _ => self.render(item, inner)?,
            }
        }
        self.out.push(']');
        Ok(())
    }

    fn flatten_class(&self, elements: &[NodeId], out: &mut Vec<NodeId>) -> Result<()> {
        for &e in elements {
            match self.tree.kind(e) {
                NodeKind::CharacterClass { negate: false, elements: inner } => {
                    self.flatten_class(&inner.clone(), out)?;
                }
                NodeKind::CharacterClass { negate: true, .. } => {
                    return Err(Error::policy(
                        "negated nested character class requires min target Es2024",
                    ));
                }
                NodeKind::CharacterClassIntersection { .. } => {
                    return Err(Error::policy(
                        "character-class intersection requires min target Es2024",
                    ));
                }
                _ => out.push(e),
            }
        }
        Ok(())
    }

    fn render_range(&mut self, min: u32, max: u32, ctx: RenderCtx) {
        self.push_escaped(min, true);
        self.out.push('-');
        self.push_escaped(max, true);
        // Under manual case expansion, add the folded counterpart when both
        // endpoints fold 1:1 and stay ordered.
        if self.expand_case && ctx.ignore_case {
            for fold in [fold_range_lower, fold_range_upper] {
                if let Some((lo, hi)) = fold(min, max) {
                    if (lo, hi) != (min, max) {
                        self.push_escaped(lo, true);
                        self.out.push('-');
                        self.push_escaped(hi, true);
                    }
                }
            }
        }
    }

    fn render_char(&mut self, value: u32, ctx: RenderCtx) {
        let ch = char::from_u32(value);
        let expand = self.expand_case
            && ctx.ignore_case
            && ch.map(has_case_variants).unwrap_or(false);
        if !expand {
            self.push_escaped(value, ctx.in_class);
            return;
        }
        let variants = case_variants(ch.expect("checked above"));
        if ctx.in_class {
            for v in variants {
                self.push_escaped(v as u32, true);
            }
        } else {
            self.out.push('[');
            for v in variants {
                self.push_escaped(v as u32, true);
            }
            self.out.push(']');
        }
    }

    fn push_escaped(&mut self, value: u32, in_class: bool) {
        match value {
            0x0A => self.out.push_str("\\n"),
            0x0D => self.out.push_str("\\r"),
            0x09 => self.out.push_str("\\t"),
            0x0B => self.out.push_str("\\v"),
            0x0C => self.out.push_str("\\f"),
            // Controls, DEL, C1 range and the line/paragraph separators
            // stay escaped for readability and safety.
            v if v < 0x20 || (0x7F..=0x9F).contains(&v) || v == 0x2028 || v == 0x2029 => {
                self.out.push_str(&format!("\\u{{{:x}}}", v));
            }
            v => {
                let ch = char::from_u32(v).expect("validated code point");
                if self.needs_escape(ch, in_class) {
                    self.out.push('\\');
                }
                self.out.push(ch);
            }
        }
    }

    fn needs_escape(&self, ch: char, in_class: bool) -> bool {
        if in_class {
            if self.v_mode {
                // v mode reserves doubled punctuators; escaping every
                // occurrence of the reserved set is always legal.
                matches!(
                    ch,
                    '[' | ']'
                        | '\\'
                        | '^'
                        | '-'
                        | '('
                        | ')'
                        | '{'
                        | '}'
                        | '/'
                        | '|'
                        | '&'
                        | '!'
                        | '#'
                        | '%'
                        | ','
                        | ':'
                        | ';'
                        | '<'
                        | '='
                        | '>'
                        | '@'
                        | '`'
                        | '~'
                        | '$'
                        | '.'
                        | '*'
                        | '+'
                        | '?'
                )
            } else {
                // Escape the hyphen unconditionally; some engine parsers
                // misread a trailing literal hyphen.
                matches!(ch, '[' | ']' | '\\' | '^' | '-')
            }
        } else {
            matches!(
                ch,
                '^' | '$' | '\\' | '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}'
                    | '|' | '/'
            )
        }
    }
}

fn fold_range_lower(min: u32, max: u32) -> Option<(u32, u32)> {
    let (a, b) = (char::from_u32(min)?, char::from_u32(max)?);
    let la: Vec<char> = a.to_lowercase().collect();
    let lb: Vec<char> = b.to_lowercase().collect();
    if la.len() == 1 && lb.len() == 1 && (la[0] as u32) <= (lb[0] as u32) {
        Some((la[0] as u32, lb[0] as u32))
    } else {
        None
    }
}

fn fold_range_upper(min: u32, max: u32) -> Option<(u32, u32)> {
    let (a, b) = (char::from_u32(min)?, char::from_u32(max)?);
    let ua: Vec<char> = a.to_uppercase().collect();
    let ub: Vec<char> = b.to_uppercase().collect();
    if ua.len() == 1 && ub.len() == 1 && (ua[0] as u32) <= (ub[0] as u32) {
        Some((ua[0] as u32, ub[0] as u32))
    } else {
        None
    }
}
