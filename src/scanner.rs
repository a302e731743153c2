// scanner.rs - Multi-pattern scanner for syntax-highlighting hosts.
//
// TextMate-style grammar engines hold many Oniguruma patterns and
// repeatedly ask "which of these matches next from this position". The
// scanner transpiles every pattern once and answers with the earliest
// match; ties go to the lower pattern index.

use smallvec::SmallVec;

use crate::api::to_regexp;
use crate::emulation::EmulatedRegex;
use crate::error::Result;
use crate::options::Options;

/// Result of a capture group match, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureIndex {
    pub start: usize,
    pub end: usize,
    pub length: usize,
}

/// Result of a scanner match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerMatch {
    /// Index of the pattern that matched (0-based).
    pub index: usize,
    /// Capture group information. Index 0 is the full match.
    pub capture_indices: SmallVec<[CaptureIndex; 8]>,
}

/// A set of transpiled patterns searched together.
///
/// # Example
///
/// ```
/// use onig2es::scanner::Scanner;
///
/// let scanner = Scanner::new(&["[0-9]+", "[a-z]+"]).unwrap();
/// let m = scanner.find_next_match("hello42", 0).unwrap().unwrap();
/// assert_eq!(m.index, 1); // "[a-z]+" matches first
/// assert_eq!(m.capture_indices[0].start, 0);
/// assert_eq!(m.capture_indices[0].end, 5);
/// ```
pub struct Scanner {
    regexes: Vec<EmulatedRegex>,
}

impl Scanner {
    /// Transpile and bind a list of Oniguruma patterns with default
    /// options.
    pub fn new(patterns: &[&str]) -> Result<Scanner> {
        Self::with_options(patterns, &Options::default())
    }

    /// Transpile and bind with explicit options (flags, target, rules).
    pub fn with_options(patterns: &[&str], options: &Options) -> Result<Scanner> {
        let mut regexes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            regexes.push(to_regexp(pattern, options)?);
        }
        Ok(Scanner { regexes })
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    /// Find the next match from `start_position` (byte offset). Returns
    /// the earliest match across all patterns; on a tie the pattern with
    /// the lowest index wins.
    pub fn find_next_match(
        &self,
        text: &str,
        start_position: usize,
    ) -> Result<Option<ScannerMatch>> {
        let mut best: Option<ScannerMatch> = None;
        let mut best_pos = usize::MAX;
        for (index, re) in self.regexes.iter().enumerate() {
            let Some(m) = re.find_at(text, start_position)? else { continue };
            if m.start() < best_pos {
                best_pos = m.start();
                best = Some(build_scanner_match(index, &m));
                if best_pos == start_position {
                    break;
                }
            }
        }
        Ok(best)
    }
}

fn build_scanner_match(index: usize, m: &crate::emulation::OnigMatch) -> ScannerMatch {
    let mut capture_indices = SmallVec::with_capacity(m.len());
    for slot in &m.captures {
        match slot {
            Some(r) => capture_indices.push(CaptureIndex {
                start: r.start,
                end: r.end,
                length: r.end - r.start,
            }),
            // Unmatched optional capture group.
            None => capture_indices.push(CaptureIndex { start: 0, end: 0, length: 0 }),
        }
    }
    ScannerMatch { index, capture_indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Target;

    fn scanner(patterns: &[&str]) -> Scanner {
        // ASCII modes keep the generated syntax within what the bundled
        // engine parses.
        let options = Options {
            flags: "DSW".to_string(),
            target: Target::Es2018,
            ..Options::default()
        };
        Scanner::with_options(patterns, &options).unwrap()
    }

    #[test]
    fn earliest_match_wins() {
        let s = scanner(&["ell", "wo"]);
        let text = "Hello world!";
        let m = s.find_next_match(text, 0).unwrap().unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.capture_indices[0], CaptureIndex { start: 1, end: 4, length: 3 });
        let m = s.find_next_match(text, 2).unwrap().unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.capture_indices[0], CaptureIndex { start: 6, end: 8, length: 2 });
    }

    #[test]
    fn advancing_start_position() {
        let s = scanner(&["a", "b", "c"]);
        assert!(s.find_next_match("x", 0).unwrap().is_none());
        let text = "xxaxxbxxc";
        let m = s.find_next_match(text, 0).unwrap().unwrap();
        assert_eq!((m.index, m.capture_indices[0].start), (0, 2));
        let m = s.find_next_match(text, 4).unwrap().unwrap();
        assert_eq!((m.index, m.capture_indices[0].start), (1, 5));
        let m = s.find_next_match(text, 7).unwrap().unwrap();
        assert_eq!((m.index, m.capture_indices[0].start), (2, 8));
        assert!(s.find_next_match(text, 9).unwrap().is_none());
    }

    #[test]
    fn tie_goes_to_lower_index() {
        let s = scanner(&["world", "hello"]);
        let m = s.find_next_match("hello world", 0).unwrap().unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.capture_indices[0].start, 0);
    }

    #[test]
    fn search_start_anchor() {
        let s = scanner(&[r"\G-and"]);
        let text = "first-and-second";
        assert!(s.find_next_match(text, 0).unwrap().is_none());
        let m = s.find_next_match(text, 5).unwrap().unwrap();
        assert_eq!(m.capture_indices[0], CaptureIndex { start: 5, end: 9, length: 4 });
    }

    #[test]
    fn optional_capture_group_reports_zeroes() {
        let s = scanner(&["(a)(b)?(c)"]);
        let m = s.find_next_match("ac", 0).unwrap().unwrap();
        assert_eq!(m.capture_indices.len(), 4);
        assert_eq!(m.capture_indices[2], CaptureIndex { start: 0, end: 0, length: 0 });
    }

    #[test]
    fn empty_pattern_matches_everywhere() {
        let s = scanner(&["", "x"]);
        let m = s.find_next_match("hello", 0).unwrap().unwrap();
        assert_eq!(m.index, 0);
    }
}
