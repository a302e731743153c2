// emulation.rs - Runtime wrapper over the native engine.
//
// Supplies the behaviors no static pattern string can express: slicing at
// the search offset for deferred `\G`, sticky matching, suppressing
// emulation-only capture slots, and transferring a subroutine copy's value
// into its origin group's slot. Lazy compilation defers the native build
// until first use.

use std::ops::Range;
use std::sync::OnceLock;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::generator::Details;

/// Behavior the wrapper must emulate at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Match against a slice starting at the search offset and rebase
    /// result indices; `\G` rendered as a start-of-slice assertion.
    SearchStart,
}

/// Auxiliary data produced by the generator when static syntax is not
/// sufficient on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmulationInfo {
    pub strategy: Option<Strategy>,
    /// Capture numbers that exist only for emulation mechanics; they are
    /// removed from match results.
    pub hidden_captures: Vec<u32>,
    /// `(origin, copy)`: when the copy participated, its value overwrites
    /// the origin group's slot.
    pub transfers: Vec<(u32, u32)>,
    /// Defer native compilation until first use.
    pub lazy_compile: bool,
}

impl EmulationInfo {
    pub fn is_noop(&self) -> bool {
        self.strategy.is_none()
            && self.hidden_captures.is_empty()
            && self.transfers.is_empty()
            && !self.lazy_compile
    }
}

/// A match with user-visible capture slots only. Index 0 is the full
/// match; positions are absolute byte offsets into the haystack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnigMatch {
    pub range: Range<usize>,
    pub captures: SmallVec<[Option<Range<usize>>; 8]>,
}

impl OnigMatch {
    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn end(&self) -> usize {
        self.range.end
    }

    /// Visible capture group `i` (0 is the whole match).
    pub fn group(&self, i: usize) -> Option<Range<usize>> {
        self.captures.get(i).cloned().flatten()
    }

    /// Number of visible capture slots, including group 0.
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

/// A transpiled pattern bound to the native engine, with emulation layered
/// on top when the generator asked for it.
pub struct EmulatedRegex {
    pattern: String,
    flags: String,
    info: Option<EmulationInfo>,
    compiled: OnceLock<regress::Regex>,
}

impl EmulatedRegex {
    /// Bind generator output to the native engine. Compiles eagerly unless
    /// the details request lazy compilation.
    pub fn new(details: Details) -> Result<EmulatedRegex> {
        let re = EmulatedRegex {
            pattern: details.pattern,
            flags: details.flags,
            info: details.emulation,
            compiled: OnceLock::new(),
        };
        let lazy = re.info.as_ref().is_some_and(|i| i.lazy_compile);
        if !lazy {
            re.force()?;
        }
        Ok(re)
    }

    /// The generated pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The generated flag string.
    pub fn flags(&self) -> &str {
        &self.flags
    }

    pub fn info(&self) -> Option<&EmulationInfo> {
        self.info.as_ref()
    }

    /// Whether the native pattern has been compiled yet.
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    fn force(&self) -> Result<&regress::Regex> {
        if let Some(re) = self.compiled.get() {
            return Ok(re);
        }
        // The engine understands a subset of the flags; `d`, `g` and `y`
        // are semantics of this wrapper or the caller, and the engine
        // already assumes Unicode mode, so `v` is dropped rather than
        // passed through.
        let engine_flags: String =
            self.flags.chars().filter(|c| "imsu".contains(*c)).collect();
        let re = regress::Regex::with_flags(&self.pattern, engine_flags.as_str())
            .map_err(|e| Error::Engine { message: e.to_string() })?;
        let _ = self.compiled.set(re);
        Ok(self.compiled.get().expect("compiled cell was just set"))
    }

    /// First match at or after the start of `haystack`.
    pub fn find(&self, haystack: &str) -> Result<Option<OnigMatch>> {
        self.find_at(haystack, 0)
    }

    /// First match at or after byte offset `start`. The offset must lie on
    /// a character boundary.
    pub fn find_at(&self, haystack: &str, start: usize) -> Result<Option<OnigMatch>> {
        let re = self.force()?;
        if start > haystack.len() || !haystack.is_char_boundary(start) {
            return Ok(None);
        }
        let sticky = self.flags.contains('y');
        let slice_search = sticky
            || self
                .info
                .as_ref()
                .is_some_and(|i| i.strategy == Some(Strategy::SearchStart));
        let (m, offset) = if slice_search {
            // The match attempt begins at `start`: search the slice so the
            // start-of-slice assertion and sticky check line up, then
            // rebase positions to the full haystack.
            let Some(m) = re.find(&haystack[start..]) else { return Ok(None) };
            if sticky && m.range().start != 0 {
                return Ok(None);
            }
            (m, start)
        } else {
            match re.find_from(haystack, start).next() {
                Some(m) => (m, 0),
                None => return Ok(None),
            }
        };
        Ok(Some(self.rebuild(&m, offset)))
    }

    pub fn is_match(&self, haystack: &str) -> Result<bool> {
        Ok(self.find(haystack)?.is_some())
    }

    /// Rebase positions and rebuild the capture list: apply transfers,
    /// then drop hidden slots so visible indices are contiguous.
    fn rebuild(&self, m: &regress::Match, offset: usize) -> OnigMatch {
        let shift = |r: Range<usize>| (r.start + offset)..(r.end + offset);
        let mut raw: Vec<Option<Range<usize>>> = Vec::with_capacity(m.captures.len() + 1);
        raw.push(Some(shift(m.range())));
        for slot in &m.captures {
            raw.push(slot.clone().map(&shift));
        }

        let (hidden, transfers): (&[u32], &[(u32, u32)]) = match &self.info {
            Some(info) => (&info.hidden_captures, &info.transfers),
            None => (&[], &[]),
        };
        for &(to, from) in transfers {
            if let Some(value) = raw.get(from as usize).cloned().flatten() {
                if let Some(slot) = raw.get_mut(to as usize) {
                    // A copy positioned after its origin matched more
                    // recently and wins; a copy positioned before it only
                    // fills a slot the origin left empty.
                    if from > to || slot.is_none() {
                        *slot = Some(value);
                    }
                }
            }
        }

        let mut captures: SmallVec<[Option<Range<usize>>; 8]> = SmallVec::new();
        for (i, slot) in raw.into_iter().enumerate() {
            if i > 0 && hidden.contains(&(i as u32)) {
                continue;
            }
            captures.push(slot);
        }
        OnigMatch {
            range: captures[0].clone().expect("group 0 always participates"),
            captures,
        }
    }
}

impl std::fmt::Debug for EmulatedRegex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulatedRegex")
            .field("pattern", &self.pattern)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
