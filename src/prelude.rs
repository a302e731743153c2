// prelude.rs - Convenient re-exports.
//
//! # Prelude
//!
//! ```
//! use onig2es::prelude::*;
//!
//! let r = compile("a|b", "", &Options::default()).unwrap();
//! assert_eq!(r.pattern, "a|b");
//! ```

pub use crate::api::{compile, to_regexp, to_regexp_details, CompileResult};
pub use crate::emulation::{EmulatedRegex, EmulationInfo, OnigMatch, Strategy};
pub use crate::error::{Error, Result};
pub use crate::generator::Details;
pub use crate::options::{Accuracy, OnigFlags, Options, Rules, Target};
pub use crate::scanner::{CaptureIndex, Scanner, ScannerMatch};
