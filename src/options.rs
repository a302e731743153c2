// options.rs - Oniguruma flags, targets and transpilation options.
//
// The flag set accepted on input is Oniguruma's `i m x D S W`. Note that
// Oniguruma `m` is dot-all, not the ECMAScript multiline flag.

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Oniguruma compile-time flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OnigFlags: u8 {
        /// `i` - case-insensitive matching.
        const IGNORE_CASE = 1 << 0;
        /// `m` - dot matches newline (Oniguruma multiline).
        const DOT_ALL = 1 << 1;
        /// `x` - extended mode: free spacing and `#` comments.
        const EXTENDED = 1 << 2;
        /// `D` - `\d` and `[:digit:]` are ASCII-only.
        const DIGIT_IS_ASCII = 1 << 3;
        /// `S` - `\s` and `[:space:]` are ASCII-only.
        const SPACE_IS_ASCII = 1 << 4;
        /// `W` - `\w`, `[:word:]` and word boundaries are ASCII-only.
        const WORD_IS_ASCII = 1 << 5;
    }
}

impl OnigFlags {
    /// Parse an Oniguruma flag string. Unknown flag characters are fatal.
    pub fn parse(flags: &str) -> Result<OnigFlags> {
        let mut out = OnigFlags::empty();
        for ch in flags.chars() {
            out |= match ch {
                'i' => OnigFlags::IGNORE_CASE,
                'm' => OnigFlags::DOT_ALL,
                'x' => OnigFlags::EXTENDED,
                'D' => OnigFlags::DIGIT_IS_ASCII,
                'S' => OnigFlags::SPACE_IS_ASCII,
                'W' => OnigFlags::WORD_IS_ASCII,
                _ => {
                    return Err(Error::invalid_argument(format!(
                        "unsupported Oniguruma flag '{}'",
                        ch
                    )))
                }
            };
        }
        Ok(out)
    }
}

/// ECMAScript version whose syntax the generator may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Flag `u`, lookbehind, named groups. No `v`-mode class syntax, no
    /// inline modifier groups.
    Es2018,
    /// Adds flag `v`: nested classes and intersections.
    Es2024,
    /// Adds inline modifier groups `(?i:…)`.
    Es2025,
    /// The newest supported target (currently `Es2025`).
    #[default]
    Auto,
}

impl Target {
    /// Resolve `Auto` to a concrete version.
    pub fn resolve(self) -> Target {
        match self {
            Target::Auto => Target::Es2025,
            other => other,
        }
    }

    /// Whether the `v` flag (and its class syntax) may be emitted.
    pub fn supports_v_flag(self) -> bool {
        !matches!(self.resolve(), Target::Es2018)
    }

    /// Whether inline modifier groups like `(?i:…)` may be emitted.
    pub fn supports_modifiers(self) -> bool {
        matches!(self.resolve(), Target::Es2025)
    }
}

/// Tolerance for approximate emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    /// Accept documented best-effort approximations.
    #[default]
    Default,
    /// Reject anything that cannot be emulated exactly.
    Strict,
}

/// Oniguruma-compatibility toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    /// Allow backreferences whose target group does not exist; placeholder
    /// captures are appended so the generated pattern stays valid.
    pub allow_orphan_backrefs: bool,
    /// Keep `\b`/`\B` as native (ASCII) word boundaries instead of the
    /// Unicode-word lookaround emulation.
    pub ascii_word_boundaries: bool,
    /// Permit duplicate group names and mixing numbered backreferences or
    /// subroutine calls with named groups; unnamed groups keep capturing.
    pub capture_group: bool,
    /// Depth limit for subroutine recursion expansion; valid range 2-20.
    pub recursion_limit: u32,
    /// Treat `^` as `\A` and `$` as `\Z` (Oniguruma's SINGLELINE option).
    pub singleline: bool,
}

impl Default for Rules {
    fn default() -> Rules {
        Rules {
            allow_orphan_backrefs: false,
            ascii_word_boundaries: false,
            capture_group: false,
            recursion_limit: 6,
            singleline: false,
        }
    }
}

/// Options for [`crate::to_regexp_details`] and friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Oniguruma flag string (`i m x D S W`).
    pub flags: String,
    /// Tolerance for approximate emulation.
    pub accuracy: Accuracy,
    /// Forbid runtime-wrapper strategies; patterns that need one fail.
    pub avoid_subclass: bool,
    /// Include the ECMAScript `g` flag in the output.
    pub global: bool,
    /// Include the ECMAScript `d` flag in the output.
    pub has_indices: bool,
    /// Defer native compilation for source patterns at least this long.
    pub lazy_compile_min: Option<usize>,
    /// ECMAScript version gate for generated syntax.
    pub target: Target,
    /// Disable pattern-simplifying optimizations.
    pub verbose: bool,
    /// Oniguruma-compatibility toggles.
    pub rules: Rules,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            flags: String::new(),
            accuracy: Accuracy::Default,
            avoid_subclass: false,
            global: false,
            has_indices: false,
            lazy_compile_min: None,
            target: Target::Auto,
            verbose: false,
            rules: Rules::default(),
        }
    }
}

impl Options {
    /// Validate option values that have a restricted domain.
    pub fn validate(&self) -> Result<()> {
        if !(2..=20).contains(&self.rules.recursion_limit) {
            return Err(Error::invalid_argument(format!(
                "recursion limit must be between 2 and 20, got {}",
                self.rules.recursion_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flags() {
        let f = OnigFlags::parse("imx").unwrap();
        assert!(f.contains(OnigFlags::IGNORE_CASE));
        assert!(f.contains(OnigFlags::DOT_ALL));
        assert!(f.contains(OnigFlags::EXTENDED));
        assert!(!f.contains(OnigFlags::DIGIT_IS_ASCII));

        let f = OnigFlags::parse("DSW").unwrap();
        assert!(f.contains(OnigFlags::DIGIT_IS_ASCII));
        assert!(f.contains(OnigFlags::SPACE_IS_ASCII));
        assert!(f.contains(OnigFlags::WORD_IS_ASCII));
    }

    #[test]
    fn parse_flags_rejects_unknown() {
        assert!(OnigFlags::parse("g").is_err());
        assert!(OnigFlags::parse("iq").is_err());
    }

    #[test]
    fn target_gating() {
        assert!(!Target::Es2018.supports_v_flag());
        assert!(Target::Es2024.supports_v_flag());
        assert!(!Target::Es2024.supports_modifiers());
        assert!(Target::Es2025.supports_modifiers());
        assert!(Target::Auto.supports_modifiers());
        assert_eq!(Target::Auto.resolve(), Target::Es2025);
    }

    #[test]
    fn recursion_limit_domain() {
        let mut opts = Options::default();
        assert!(opts.validate().is_ok());
        opts.rules.recursion_limit = 1;
        assert!(opts.validate().is_err());
        opts.rules.recursion_limit = 21;
        assert!(opts.validate().is_err());
        opts.rules.recursion_limit = 20;
        assert!(opts.validate().is_ok());
    }
}
