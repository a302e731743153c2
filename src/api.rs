// api.rs - Public entry points.
//
// `compile` bakes everything into a pattern/flag pair and therefore
// refuses patterns that need runtime emulation; `to_regexp_details`
// additionally returns the emulation data, and `to_regexp` binds the
// details to the native engine in one step.

use crate::emulation::EmulatedRegex;
use crate::error::Result;
use crate::generator::{generate, Details};
use crate::options::Options;
use crate::parser::parse;
use crate::tokenizer::tokenize;
use crate::transform::transform;

/// A transpiled pattern/flag pair with no runtime component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    pub pattern: String,
    pub flags: String,
}

/// Transpile an Oniguruma pattern, returning emulation data when static
/// syntax alone cannot reproduce the behavior.
///
/// # Examples
///
/// ```
/// use onig2es::{to_regexp_details, Options};
///
/// let d = to_regexp_details(r"\h+", &Options::default()).unwrap();
/// assert_eq!(d.pattern, "[0-9A-Fa-f]+");
/// assert_eq!(d.flags, "v");
/// assert!(d.emulation.is_none());
/// ```
pub fn to_regexp_details(pattern: &str, options: &Options) -> Result<Details> {
    options.validate()?;
    let tok = tokenize(pattern, &options.flags)?;
    let mut tree = parse(&tok, &options.rules, !options.verbose)?;
    let data = transform(&mut tree, options)?;
    let mut details = generate(&tree, &data, options)?;
    if let Some(min) = options.lazy_compile_min {
        if pattern.len() >= min {
            details
                .emulation
                .get_or_insert_with(Default::default)
                .lazy_compile = true;
        }
    }
    Ok(details)
}

/// Transpile to a bare pattern/flag pair. The Oniguruma flag string is
/// taken from `flags`; any pattern that would need a runtime-wrapper
/// strategy is an error on this entry point.
///
/// # Examples
///
/// ```
/// use onig2es::{compile, Options};
///
/// let r = compile(r"a\d", "D", &Options::default()).unwrap();
/// assert_eq!(r.pattern, r"a\d");
/// assert_eq!(r.flags, "v");
/// ```
pub fn compile(pattern: &str, flags: &str, options: &Options) -> Result<CompileResult> {
    let options = Options {
        flags: flags.to_string(),
        avoid_subclass: true,
        lazy_compile_min: None,
        ..options.clone()
    };
    let details = to_regexp_details(pattern, &options)?;
    Ok(CompileResult { pattern: details.pattern, flags: details.flags })
}

/// Transpile and bind to the native engine, constructing the emulation
/// wrapper when the details call for one.
///
/// # Examples
///
/// ```
/// use onig2es::{to_regexp, Options, Target};
///
/// let options = Options {
///     flags: "D".to_string(),
///     target: Target::Es2018,
///     ..Options::default()
/// };
/// let re = to_regexp(r"(?<y>\d{4})-(?<m>\d{2})", &options).unwrap();
/// let m = re.find("on 2026-02-14").unwrap().unwrap();
/// assert_eq!(m.range, 3..10);
/// assert_eq!(m.group(1), Some(3..7));
/// ```
pub fn to_regexp(pattern: &str, options: &Options) -> Result<EmulatedRegex> {
    EmulatedRegex::new(to_regexp_details(pattern, options)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::options::Target;

    #[test]
    fn compile_is_static_only() {
        // Deferred \G needs the wrapper, which compile refuses.
        let err = compile(r"a\Gb", "", &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Policy { .. }));
        // Sticky \G is a plain flag and fine.
        let r = compile(r"\Gab", "", &Options::default()).unwrap();
        assert_eq!(r.flags, "vy");
    }

    #[test]
    fn compile_takes_flags_argument() {
        let r = compile("a.b", "m", &Options::default()).unwrap();
        assert_eq!(r.pattern, "a[\\s\\S]b");
    }

    #[test]
    fn details_emulation_only_when_needed() {
        let d = to_regexp_details("abc", &Options::default()).unwrap();
        assert!(d.emulation.is_none());
        let d = to_regexp_details(r"(?<a>x)\g<a>", &Options::default()).unwrap();
        assert!(d.emulation.is_some());
    }

    #[test]
    fn lazy_compile_threshold() {
        let options = Options { lazy_compile_min: Some(4), ..Options::default() };
        let d = to_regexp_details("abc", &options).unwrap();
        assert!(d.emulation.is_none());
        let d = to_regexp_details("abcd", &options).unwrap();
        assert!(d.emulation.unwrap().lazy_compile);
    }

    #[test]
    fn invalid_options_rejected() {
        let mut options = Options::default();
        options.rules.recursion_limit = 1;
        assert!(matches!(
            to_regexp_details("a", &options),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn end_to_end_matching() {
        let options = Options {
            flags: "D".to_string(),
            target: Target::Es2018,
            ..Options::default()
        };
        let re = to_regexp(r"\d{2}:\d{2}", &options).unwrap();
        let m = re.find("at 09:30 sharp").unwrap().unwrap();
        assert_eq!(m.range, 3..8);
    }
}
