// tokenizer.rs - Pattern lexer.
//
// Produces a flat token list from the pattern and the Oniguruma flag
// string. Extended mode (`x`) is handled entirely here, with a context
// stack pushed and popped at group boundaries since free-spacing is scoped
// to the group that declares it. Character classes use a separate sub-lexer
// (hyphens, `&&`, nested openers and POSIX brackets mean different things
// inside a class). Escaped digit sequences are ambiguous until the total
// capture count is known, so they are emitted as `EscapedNumber` and split
// into concrete tokens by the parser.

use memchr::memchr;

use crate::ast::{
    AssertionKind, CharacterSetKind, DirectiveKind, QuantifierKind, RefTarget, VarLenKind,
};
use crate::error::{Error, Result};
use crate::options::OnigFlags;
use crate::unicode::is_posix_class_name;

pub const MAX_CODE_POINT: u32 = 0x0010_FFFF;
const MAX_REPEAT_NUM: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOpenKind {
    Capturing { name: Option<String> },
    NonCapturing,
    Atomic,
    Absent,
    Lookahead { negate: bool },
    Lookbehind { negate: bool },
    Flags { on: OnigFlags, off: OnigFlags },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Alternator,
    Assertion(AssertionKind),
    Backreference(RefTarget),
    Character { value: u32 },
    CharacterSet { kind: CharacterSetKind, negate: bool },
    ClassOpen { negate: bool },
    ClassClose,
    ClassHyphen,
    ClassIntersector,
    Directive(DirectiveKind),
    /// `\1`..`\999`: backreference, octal or identity escape; resolved once
    /// the capture count is known.
    EscapedNumber { digits: String, in_class: bool },
    GroupOpen(GroupOpenKind),
    GroupClose,
    Quantifier { min: u32, max: u32, kind: QuantifierKind },
    Subroutine(RefTarget),
    VariableLengthCharacterSet(VarLenKind),
    /// `(*FAIL)`.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub pos: usize,
}

#[derive(Debug)]
pub struct TokenizerResult {
    pub tokens: Vec<Token>,
    pub flags: OnigFlags,
    /// Unnamed `(…)` groups seen.
    pub plain_captures: u32,
    /// Named groups seen.
    pub named_captures: u32,
}

/// Lex `pattern` under the given Oniguruma flag string.
pub fn tokenize(pattern: &str, flags: &str) -> Result<TokenizerResult> {
    let flags = OnigFlags::parse(flags)?;
    let mut tk = Tokenizer {
        pattern,
        pos: 0,
        tokens: Vec::new(),
        x_stack: vec![flags.contains(OnigFlags::EXTENDED)],
        class_depth: 0,
        plain: 0,
        named: 0,
    };
    while tk.pos < tk.pattern.len() {
        if tk.class_depth > 0 {
            tk.next_in_class()?;
        } else {
            tk.next()?;
        }
    }
    if tk.class_depth > 0 {
        return Err(Error::lexical(pattern.len(), "premature end of char-class"));
    }
    if tk.x_stack.len() > 1 {
        return Err(Error::lexical(pattern.len(), "end pattern with unmatched parenthesis"));
    }
    Ok(TokenizerResult {
        tokens: tk.tokens,
        flags,
        plain_captures: tk.plain,
        named_captures: tk.named,
    })
}

struct Tokenizer<'p> {
    pattern: &'p str,
    pos: usize,
    tokens: Vec<Token>,
    x_stack: Vec<bool>,
    class_depth: usize,
    plain: u32,
    named: u32,
}

impl<'p> Tokenizer<'p> {
    fn rest(&self) -> &'p str {
        &self.pattern[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.pos += want.len_utf8();
            true
        } else {
            false
        }
    }

    fn x_on(&self) -> bool {
        *self.x_stack.last().unwrap_or(&false)
    }

    fn push(&mut self, start: usize, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            raw: self.pattern[start..self.pos].to_string(),
            pos: start,
        });
    }

    fn err(&self, pos: usize, message: impl Into<String>) -> Error {
        Error::lexical(pos, message)
    }

    // === Outside character classes ===

    fn next(&mut self) -> Result<()> {
        let start = self.pos;
        let c = self.bump().expect("caller checked non-empty");

        if self.x_on() {
            if c.is_ascii_whitespace() || c == '\u{0b}' {
                return Ok(());
            }
            if c == '#' {
                // Comment runs to end of line (or pattern).
                match memchr(b'\n', self.rest().as_bytes()) {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.pattern.len(),
                }
                return Ok(());
            }
        }

        match c {
            '\\' => self.escape(start, false),
            '[' => {
                let negate = self.eat('^');
                self.reject_bare_posix(start)?;
                self.class_depth = 1;
                self.push(start, TokenKind::ClassOpen { negate });
                Ok(())
            }
            '(' => self.group_open(start),
            ')' => {
                if self.x_stack.len() == 1 {
                    return Err(self.err(start, "unmatched close parenthesis"));
                }
                self.x_stack.pop();
                self.push(start, TokenKind::GroupClose);
                Ok(())
            }
            '|' => {
                self.push(start, TokenKind::Alternator);
                Ok(())
            }
            '^' => {
                self.push(start, TokenKind::Assertion(AssertionKind::LineStart));
                Ok(())
            }
            '$' => {
                self.push(start, TokenKind::Assertion(AssertionKind::LineEnd));
                Ok(())
            }
            '.' => {
                self.push(
                    start,
                    TokenKind::CharacterSet { kind: CharacterSetKind::Dot, negate: false },
                );
                Ok(())
            }
            '?' => self.simple_quantifier(start, 0, 1),
            '*' => self.simple_quantifier(start, 0, u32::MAX),
            '+' => self.simple_quantifier(start, 1, u32::MAX),
            '{' => self.interval(start),
            _ => {
                self.push(start, TokenKind::Character { value: c as u32 });
                Ok(())
            }
        }
    }

    fn simple_quantifier(&mut self, start: usize, min: u32, max: u32) -> Result<()> {
        let kind = if self.eat('?') {
            QuantifierKind::Lazy
        } else if self.eat('+') {
            QuantifierKind::Possessive
        } else {
            QuantifierKind::Greedy
        };
        self.push(start, TokenKind::Quantifier { min, max, kind });
        Ok(())
    }

    /// `{n}`, `{n,}`, `{,m}`, `{n,m}`. An interval that does not parse is a
    /// literal `{`, matching Oniguruma's lenient treatment. A trailing `?`
    /// makes the interval lazy; a trailing `+` is left alone (in Oniguruma
    /// syntax `a{2}+` chains quantifiers, it is not possessive).
    fn interval(&mut self, start: usize) -> Result<()> {
        let save = self.pos;
        let lower = self.take_digits();
        let parsed = if self.eat(',') {
            let upper = self.take_digits();
            if self.eat('}') && !(lower.is_empty() && upper.is_empty()) {
                Some((lower, upper, true))
            } else {
                None
            }
        } else if self.eat('}') && !lower.is_empty() {
            Some((lower.clone(), lower, false))
        } else {
            None
        };

        let Some((lo, hi, comma)) = parsed else {
            self.pos = save;
            self.push(start, TokenKind::Character { value: '{' as u32 });
            return Ok(());
        };

        let min = self.repeat_value(start, &lo, 0)?;
        let max = if comma && hi.is_empty() {
            u32::MAX
        } else {
            self.repeat_value(start, &hi, u32::MAX)?
        };
        if max != u32::MAX && min > max {
            return Err(self.err(start, "min repeat greater than max repeat"));
        }
        let kind = if self.eat('?') { QuantifierKind::Lazy } else { QuantifierKind::Greedy };
        self.push(start, TokenKind::Quantifier { min, max, kind });
        Ok(())
    }

    fn repeat_value(&self, pos: usize, digits: &str, empty: u32) -> Result<u32> {
        if digits.is_empty() {
            return Ok(empty);
        }
        let v: u32 = digits
            .parse()
            .map_err(|_| self.err(pos, "too big number for repeat range"))?;
        if v > MAX_REPEAT_NUM {
            return Err(self.err(pos, "too big number for repeat range"));
        }
        Ok(v)
    }

    fn take_digits(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    // === Groups ===

    fn group_open(&mut self, start: usize) -> Result<()> {
        if self.eat('?') {
            return self.group_open_qmark(start);
        }
        if self.eat('*') {
            return self.callout(start);
        }
        self.plain += 1;
        self.x_stack.push(self.x_on());
        self.push(start, TokenKind::GroupOpen(GroupOpenKind::Capturing { name: None }));
        Ok(())
    }

    fn group_open_qmark(&mut self, start: usize) -> Result<()> {
        let kind = match self.peek() {
            Some(':') => {
                self.pos += 1;
                GroupOpenKind::NonCapturing
            }
            Some('=') => {
                self.pos += 1;
                GroupOpenKind::Lookahead { negate: false }
            }
            Some('!') => {
                self.pos += 1;
                GroupOpenKind::Lookahead { negate: true }
            }
            Some('>') => {
                self.pos += 1;
                GroupOpenKind::Atomic
            }
            Some('~') => {
                self.pos += 1;
                if self.peek() == Some('|') {
                    return Err(Error::unsupported("absent stopper and range are not supported"));
                }
                GroupOpenKind::Absent
            }
            Some('<') => {
                self.pos += 1;
                match self.peek() {
                    Some('=') => {
                        self.pos += 1;
                        GroupOpenKind::Lookbehind { negate: false }
                    }
                    Some('!') => {
                        self.pos += 1;
                        GroupOpenKind::Lookbehind { negate: true }
                    }
                    _ => {
                        let name = self.group_name(start, '>')?;
                        self.named += 1;
                        GroupOpenKind::Capturing { name: Some(name) }
                    }
                }
            }
            Some('\'') => {
                self.pos += 1;
                let name = self.group_name(start, '\'')?;
                self.named += 1;
                GroupOpenKind::Capturing { name: Some(name) }
            }
            Some('#') => {
                self.pos += 1;
                return self.comment(start);
            }
            Some('(') => {
                return Err(Error::unsupported("conditional group"));
            }
            Some('@') => {
                return Err(Error::unsupported("capture history"));
            }
            Some('{') => {
                return Err(Error::unsupported("callout of contents"));
            }
            Some('i') | Some('m') | Some('x') | Some('-') => {
                return self.flag_modifier(start);
            }
            Some(_) => {
                return Err(self.err(start, "undefined group option"));
            }
            None => {
                return Err(self.err(start, "end pattern with unmatched parenthesis"));
            }
        };
        self.x_stack.push(self.x_on());
        self.push(start, TokenKind::GroupOpen(kind));
        Ok(())
    }

    fn group_name(&mut self, start: usize, close: char) -> Result<String> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == close {
                self.pos += c.len_utf8();
                if name.is_empty() {
                    return Err(self.err(start, "group name is empty"));
                }
                return Ok(name);
            }
            if c == '_' || c.is_ascii_alphabetic() || (!name.is_empty() && c.is_ascii_digit()) {
                name.push(c);
                self.pos += c.len_utf8();
            } else {
                return Err(self.err(start, "invalid char in group name"));
            }
        }
        Err(self.err(start, "invalid group name"))
    }

    /// `(?#…)`; a backslash escapes the closing paren.
    fn comment(&mut self, start: usize) -> Result<()> {
        loop {
            match self.bump() {
                Some(')') => return Ok(()),
                Some('\\') => {
                    self.bump();
                }
                Some(_) => {}
                None => return Err(self.err(start, "end pattern in group")),
            }
        }
    }

    /// `(?imx-imx)` directive or `(?imx-imx:…)` group. The `x` bit takes
    /// effect in the tokenizer itself.
    fn flag_modifier(&mut self, start: usize) -> Result<()> {
        let mut on = OnigFlags::empty();
        let mut off = OnigFlags::empty();
        let mut neg = false;
        loop {
            let Some(c) = self.bump() else {
                return Err(self.err(start, "end pattern in group"));
            };
            let flag = match c {
                'i' => Some(OnigFlags::IGNORE_CASE),
                'm' => Some(OnigFlags::DOT_ALL),
                'x' => Some(OnigFlags::EXTENDED),
                '-' => {
                    if neg {
                        return Err(self.err(start, "undefined group option"));
                    }
                    neg = true;
                    None
                }
                ':' => {
                    let mut x = self.x_on();
                    if on.contains(OnigFlags::EXTENDED) {
                        x = true;
                    }
                    if off.contains(OnigFlags::EXTENDED) {
                        x = false;
                    }
                    self.x_stack.push(x);
                    self.push(start, TokenKind::GroupOpen(GroupOpenKind::Flags { on, off }));
                    return Ok(());
                }
                ')' => {
                    if on.contains(OnigFlags::EXTENDED) {
                        *self.x_stack.last_mut().unwrap() = true;
                    }
                    if off.contains(OnigFlags::EXTENDED) {
                        *self.x_stack.last_mut().unwrap() = false;
                    }
                    self.push(start, TokenKind::Directive(DirectiveKind::Flags { on, off }));
                    return Ok(());
                }
                _ => return Err(self.err(start, "undefined group option")),
            };
            if let Some(flag) = flag {
                if neg {
                    off |= flag;
                } else {
                    on |= flag;
                }
            }
        }
    }

    /// `(*NAME)` callouts. Only `(*FAIL)` is implemented.
    fn callout(&mut self, start: usize) -> Result<()> {
        let mut name = String::new();
        loop {
            match self.bump() {
                Some(')') => break,
                Some(c) if c.is_ascii_uppercase() || c == '_' => name.push(c),
                Some(_) => return Err(self.err(start, "invalid callout name")),
                None => return Err(self.err(start, "end pattern in group")),
            }
        }
        if name == "FAIL" {
            self.push(start, TokenKind::Fail);
            Ok(())
        } else {
            Err(Error::unsupported(format!("callout (*{})", name)))
        }
    }

    // === Inside character classes ===

    fn next_in_class(&mut self) -> Result<()> {
        let start = self.pos;
        let c = self.bump().expect("caller checked non-empty");
        match c {
            ']' => {
                self.class_depth -= 1;
                self.push(start, TokenKind::ClassClose);
                Ok(())
            }
            '[' => {
                if self.peek() == Some(':') {
                    self.posix_bracket(start)
                } else {
                    let negate = self.eat('^');
                    self.class_depth += 1;
                    self.push(start, TokenKind::ClassOpen { negate });
                    Ok(())
                }
            }
            '&' if self.peek() == Some('&') => {
                self.pos += 1;
                self.push(start, TokenKind::ClassIntersector);
                Ok(())
            }
            '-' => {
                self.push(start, TokenKind::ClassHyphen);
                Ok(())
            }
            '\\' => self.escape(start, true),
            _ => {
                self.push(start, TokenKind::Character { value: c as u32 });
                Ok(())
            }
        }
    }

    /// `[:name:]` / `[:^name:]`, the leading `[` already consumed.
    fn posix_bracket(&mut self, start: usize) -> Result<()> {
        self.pos += 1; // ':'
        let negate = self.eat('^');
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase() {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if !(self.eat(':') && self.eat(']')) {
            return Err(self.err(start, "invalid POSIX bracket type"));
        }
        if !is_posix_class_name(&name) {
            return Err(self.err(start, format!("invalid POSIX class name [:{}:]", name)));
        }
        self.push(
            start,
            TokenKind::CharacterSet { kind: CharacterSetKind::Posix(name), negate },
        );
        Ok(())
    }

    /// A POSIX bracket form directly after a class opener (`[:alpha:]`)
    /// is an error in Oniguruma rather than a class of literals.
    fn reject_bare_posix(&self, start: usize) -> Result<()> {
        let rest = self.rest().as_bytes();
        if rest.first() != Some(&b':') {
            return Ok(());
        }
        let mut i = 1;
        if rest.get(i) == Some(&b'^') {
            i += 1;
        }
        let name_start = i;
        while i < rest.len() && rest[i].is_ascii_lowercase() {
            i += 1;
        }
        if i > name_start && rest.get(i) == Some(&b':') && rest.get(i + 1) == Some(&b']') {
            return Err(self.err(start, "POSIX bracket is not allowed outside brackets"));
        }
        Ok(())
    }

    // === Escapes ===

    fn escape(&mut self, start: usize, in_class: bool) -> Result<()> {
        let Some(c) = self.bump() else {
            return Err(self.err(start, "end pattern at escape"));
        };
        match c {
            'n' => self.literal(start, '\n' as u32),
            't' => self.literal(start, '\t' as u32),
            'r' => self.literal(start, '\r' as u32),
            'f' => self.literal(start, 0x0C),
            'v' => self.literal(start, 0x0B),
            'a' => self.literal(start, 0x07),
            'e' => self.literal(start, 0x1B),
            'b' if in_class => self.literal(start, 0x08),
            'b' => {
                self.push(start, TokenKind::Assertion(AssertionKind::WordBoundary { negate: false }));
                Ok(())
            }
            'B' if !in_class => {
                self.push(start, TokenKind::Assertion(AssertionKind::WordBoundary { negate: true }));
                Ok(())
            }
            'A' if !in_class => {
                self.push(start, TokenKind::Assertion(AssertionKind::StringStart));
                Ok(())
            }
            'z' if !in_class => {
                self.push(start, TokenKind::Assertion(AssertionKind::StringEnd));
                Ok(())
            }
            'Z' if !in_class => {
                self.push(start, TokenKind::Assertion(AssertionKind::StringEndNewline));
                Ok(())
            }
            'G' if !in_class => {
                self.push(start, TokenKind::Assertion(AssertionKind::SearchStart));
                Ok(())
            }
            'K' if !in_class => {
                self.push(start, TokenKind::Directive(DirectiveKind::Keep));
                Ok(())
            }
            'd' | 'D' | 'h' | 'H' | 's' | 'S' | 'w' | 'W' => {
                let kind = match c.to_ascii_lowercase() {
                    'd' => CharacterSetKind::Digit,
                    'h' => CharacterSetKind::Hex,
                    's' => CharacterSetKind::Space,
                    _ => CharacterSetKind::Word,
                };
                self.push(
                    start,
                    TokenKind::CharacterSet { kind, negate: c.is_ascii_uppercase() },
                );
                Ok(())
            }
            'p' | 'P' => self.property(start, c == 'P'),
            'N' if !in_class => {
                self.push(
                    start,
                    TokenKind::CharacterSet { kind: CharacterSetKind::NonNewline, negate: false },
                );
                Ok(())
            }
            'O' if !in_class => {
                self.push(
                    start,
                    TokenKind::CharacterSet { kind: CharacterSetKind::Any, negate: false },
                );
                Ok(())
            }
            'R' if !in_class => {
                self.push(start, TokenKind::VariableLengthCharacterSet(VarLenKind::Newline));
                Ok(())
            }
            'X' if !in_class => {
                self.push(start, TokenKind::VariableLengthCharacterSet(VarLenKind::Grapheme));
                Ok(())
            }
            'y' | 'Y' => Err(Error::unsupported("grapheme cluster boundary \\y/\\Y")),
            'M' => Err(Error::unsupported("meta escape \\M-")),
            'c' => self.control(start),
            'C' => {
                if !self.eat('-') {
                    return Err(self.err(start, "invalid control-char syntax"));
                }
                self.control(start)
            }
            'x' => self.hex_escape(start),
            'u' => self.unicode_escape(start),
            'o' => self.octal_brace(start),
            'k' if !in_class => self.name_ref(start, false),
            'g' if !in_class => self.name_ref(start, true),
            'Q' => self.quote(start),
            'E' => Ok(()),
            '0'..='9' => self.escaped_number(start, c, in_class),
            _ if c.is_ascii_alphanumeric() => {
                Err(self.err(start, format!("unsupported escape \\{}", c)))
            }
            _ => self.literal(start, c as u32),
        }
    }

    fn literal(&mut self, start: usize, value: u32) -> Result<()> {
        self.push(start, TokenKind::Character { value });
        Ok(())
    }

    fn code_point(&self, pos: usize, value: u32) -> Result<u32> {
        if value > MAX_CODE_POINT || (0xD800..=0xDFFF).contains(&value) {
            return Err(self.err(pos, "invalid code point value"));
        }
        Ok(value)
    }

    /// `\cX` / `\C-X`: the target must be an ASCII letter.
    fn control(&mut self, start: usize) -> Result<()> {
        match self.bump() {
            Some(c) if c.is_ascii_alphabetic() => self.literal(start, (c as u32) & 0x1F),
            Some(_) => Err(self.err(start, "invalid control-char target")),
            None => Err(self.err(start, "end pattern at control char")),
        }
    }

    /// `\xHH` or `\x{H…}`; the brace form accepts several space-separated
    /// code points, each emitted as its own character.
    fn hex_escape(&mut self, start: usize) -> Result<()> {
        if self.eat('{') {
            let mut any = false;
            loop {
                while self.eat(' ') {}
                if self.eat('}') {
                    if !any {
                        return Err(self.err(start, "invalid hex escape"));
                    }
                    return Ok(());
                }
                let digits = self.take_hex(8);
                if digits.is_empty() {
                    return Err(self.err(start, "invalid hex escape"));
                }
                let value = u32::from_str_radix(&digits, 16)
                    .map_err(|_| self.err(start, "invalid code point value"))?;
                let value = self.code_point(start, value)?;
                self.push(start, TokenKind::Character { value });
                any = true;
            }
        }
        let digits = self.take_hex(2);
        if digits.is_empty() {
            return Err(self.err(start, "invalid hex escape"));
        }
        let value = u32::from_str_radix(&digits, 16).unwrap();
        self.push(start, TokenKind::Character { value });
        Ok(())
    }

    /// `\uHHHH`, exactly four digits.
    fn unicode_escape(&mut self, start: usize) -> Result<()> {
        let digits = self.take_hex(4);
        if digits.len() != 4 {
            return Err(self.err(start, "invalid \\u escape"));
        }
        let value = u32::from_str_radix(&digits, 16).unwrap();
        let value = self.code_point(start, value)?;
        self.push(start, TokenKind::Character { value });
        Ok(())
    }

    /// `\o{777}`.
    fn octal_brace(&mut self, start: usize) -> Result<()> {
        if !self.eat('{') {
            return Err(self.err(start, "invalid octal escape"));
        }
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if ('0'..='7').contains(&c) {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits.is_empty() || !self.eat('}') {
            return Err(self.err(start, "invalid octal escape"));
        }
        let value = u32::from_str_radix(&digits, 8)
            .map_err(|_| self.err(start, "invalid code point value"))?;
        let value = self.code_point(start, value)?;
        self.push(start, TokenKind::Character { value });
        Ok(())
    }

    fn take_hex(&mut self, max: usize) -> String {
        let mut out = String::new();
        while out.len() < max {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    out.push(c);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        out
    }

    /// `\p{Name}` / `\P{Name}` / `\p{^Name}`.
    fn property(&mut self, start: usize, negate_base: bool) -> Result<()> {
        if !self.eat('{') {
            return Err(self.err(start, "invalid character property syntax"));
        }
        let caret = self.eat('^');
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('}') => break,
                Some(c) if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '=') => {
                    name.push(c)
                }
                Some(_) => return Err(self.err(start, "invalid character property name")),
                None => return Err(self.err(start, "end pattern at character property")),
            }
        }
        if name.is_empty() {
            return Err(self.err(start, "invalid character property name"));
        }
        self.push(
            start,
            TokenKind::CharacterSet {
                kind: CharacterSetKind::Property(name),
                negate: negate_base != caret,
            },
        );
        Ok(())
    }

    /// `\k<…>`/`\k'…'` backreferences and `\g<…>`/`\g'…'` subroutine calls.
    fn name_ref(&mut self, start: usize, subroutine: bool) -> Result<()> {
        let close = match self.bump() {
            Some('<') => '>',
            Some('\'') => '\'',
            _ => return Err(self.err(start, "invalid backref number/name")),
        };
        let mut body = String::new();
        loop {
            match self.bump() {
                Some(c) if c == close => break,
                Some(c) => body.push(c),
                None => return Err(self.err(start, "end pattern at backref/subexp call")),
            }
        }
        if body.is_empty() {
            return Err(self.err(start, "invalid backref number/name"));
        }
        if body.starts_with('-') || body.starts_with('+') {
            return Err(Error::unsupported("relative backref/subexp call numbers"));
        }
        let target = if body.chars().all(|c| c.is_ascii_digit()) {
            let num: u32 = body
                .parse()
                .map_err(|_| self.err(start, "invalid backref number"))?;
            RefTarget::Number(num)
        } else if body.contains(['-', '+']) {
            return Err(Error::unsupported("backreference with recursion level"));
        } else {
            if !body.chars().enumerate().all(|(i, c)| {
                c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
            }) {
                return Err(self.err(start, "invalid char in group name"));
            }
            RefTarget::Name(body)
        };
        let kind = if subroutine {
            TokenKind::Subroutine(target)
        } else {
            TokenKind::Backreference(target)
        };
        self.push(start, kind);
        Ok(())
    }

    /// `\Q…\E`: everything in between is literal.
    fn quote(&mut self, _start: usize) -> Result<()> {
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Ok(());
            }
            match memchr(b'\\', rest.as_bytes()) {
                Some(i) if rest[i..].len() >= 2 && rest.as_bytes()[i + 1] == b'E' => {
                    self.emit_literal_run(&rest[..i]);
                    self.pos += i + 2;
                    return Ok(());
                }
                Some(i) => {
                    // Not a terminator; the backslash itself is literal.
                    let upto = i + 1;
                    self.emit_literal_run(&rest[..upto]);
                    self.pos += upto;
                }
                None => {
                    self.emit_literal_run(rest);
                    self.pos = self.pattern.len();
                    return Ok(());
                }
            }
        }
    }

    fn emit_literal_run(&mut self, text: &str) {
        let base = self.pos;
        let mut off = 0;
        for ch in text.chars() {
            self.tokens.push(Token {
                kind: TokenKind::Character { value: ch as u32 },
                raw: ch.to_string(),
                pos: base + off,
            });
            off += ch.len_utf8();
        }
    }

    /// `\0…` is always octal; `\1`..`\9…` stays ambiguous until the total
    /// capture count is known.
    fn escaped_number(&mut self, start: usize, first: char, in_class: bool) -> Result<()> {
        if first == '0' {
            let mut value = 0u32;
            for _ in 0..2 {
                match self.peek() {
                    Some(c) if ('0'..='7').contains(&c) => {
                        value = value * 8 + (c as u32 - '0' as u32);
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            return self.literal(start, value);
        }
        let mut digits = String::new();
        digits.push(first);
        while digits.len() < 3 {
            match self.peek() {
                Some(c) if c.is_ascii_digit() => {
                    digits.push(c);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        self.push(start, TokenKind::EscapedNumber { digits, in_class });
        Ok(())
    }
}
