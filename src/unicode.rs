// unicode.rs - Property-name canonicalization and POSIX class names.
//
// Oniguruma accepts property names loosely (case, spaces, hyphens and
// underscores are ignored); ECMAScript requires the exact canonical
// spelling. Names are normalized and looked up in a sorted table; names
// that are not recognized are assumed to be script names (best-effort,
// not validated against the script registry).

/// POSIX bracket class names accepted inside character classes.
pub const POSIX_CLASS_NAMES: &[&str] = &[
    "alnum", "alpha", "ascii", "blank", "cntrl", "digit", "graph", "lower",
    "print", "punct", "space", "upper", "word", "xdigit",
];

pub fn is_posix_class_name(name: &str) -> bool {
    POSIX_CLASS_NAMES.contains(&name)
}

/// Resolution of an Oniguruma property name for the target syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyName {
    /// A property ECMAScript spells this way (possibly `gc` value).
    Es(String),
    /// An Oniguruma property that maps onto a POSIX class expansion.
    Posix(&'static str),
    /// Unrecognized: assumed to be a script name.
    Script(String),
}

// Sorted by normalized key; looked up via binary search.
// Values are the exact spellings ECMAScript accepts. Entries mapping to a
// POSIX class name are marked with a leading ':'.
static PROPERTY_TABLE: &[(&str, &str)] = &[
    ("ahex", "AHex"),
    ("alnum", ":alnum"),
    ("alpha", "Alpha"),
    ("alphabetic", "Alphabetic"),
    ("any", ":any"),
    ("ascii", "ASCII"),
    ("asciihexdigit", "ASCII_Hex_Digit"),
    ("assigned", "Assigned"),
    ("bidic", "Bidi_C"),
    ("bidicontrol", "Bidi_Control"),
    ("bidim", "Bidi_M"),
    ("bidimirrored", "Bidi_Mirrored"),
    ("blank", ":blank"),
    ("c", "C"),
    ("cased", "Cased"),
    ("casedletter", "Cased_Letter"),
    ("caseignorable", "Case_Ignorable"),
    ("cc", "Cc"),
    ("cf", "Cf"),
    ("changeswhencasefolded", "Changes_When_Casefolded"),
    ("changeswhencasemapped", "Changes_When_Casemapped"),
    ("changeswhenlowercased", "Changes_When_Lowercased"),
    ("changeswhentitlecased", "Changes_When_Titlecased"),
    ("changeswhenuppercased", "Changes_When_Uppercased"),
    ("closepunctuation", "Pe"),
    ("cn", "Cn"),
    ("cntrl", "Cc"),
    ("co", "Co"),
    ("connectorpunctuation", "Pc"),
    ("control", "Cc"),
    ("cs", "Cs"),
    ("currencysymbol", "Sc"),
    ("cwcf", "CWCF"),
    ("cwcm", "CWCM"),
    ("cwl", "CWL"),
    ("cwt", "CWT"),
    ("cwu", "CWU"),
    ("dash", "Dash"),
    ("dashpunctuation", "Pd"),
    ("decimalnumber", "Nd"),
    ("defaultignorablecodepoint", "Default_Ignorable_Code_Point"),
    ("dep", "Dep"),
    ("deprecated", "Deprecated"),
    ("di", "DI"),
    ("dia", "Dia"),
    ("diacritic", "Diacritic"),
    ("digit", ":digit"),
    ("emoji", "Emoji"),
    ("emojicomponent", "Emoji_Component"),
    ("emojimodifier", "Emoji_Modifier"),
    ("emojimodifierbase", "Emoji_Modifier_Base"),
    ("emojipresentation", "Emoji_Presentation"),
    ("enclosingmark", "Me"),
    ("ext", "Ext"),
    ("extendedpictographic", "Extended_Pictographic"),
    ("extender", "Extender"),
    ("finalpunctuation", "Pf"),
    ("format", "Cf"),
    ("graph", ":graph"),
    ("graphemebase", "Grapheme_Base"),
    ("graphemeextend", "Grapheme_Extend"),
    ("hexdigit", "Hex_Digit"),
    ("idc", "IDC"),
    ("idcontinue", "ID_Continue"),
    ("ideo", "Ideo"),
    ("ideographic", "Ideographic"),
    ("ids", "IDS"),
    ("idstart", "ID_Start"),
    ("initialpunctuation", "Pi"),
    ("joinc", "Join_C"),
    ("joincontrol", "Join_Control"),
    ("l", "L"),
    ("lc", "LC"),
    ("letter", "L"),
    ("letternumber", "Nl"),
    ("lineseparator", "Zl"),
    ("ll", "Ll"),
    ("lm", "Lm"),
    ("lo", "Lo"),
    ("lower", "Lowercase"),
    ("lowercase", "Lowercase"),
    ("lowercaseletter", "Ll"),
    ("lt", "Lt"),
    ("lu", "Lu"),
    ("m", "M"),
    ("mark", "M"),
    ("math", "Math"),
    ("mathsymbol", "Sm"),
    ("mc", "Mc"),
    ("me", "Me"),
    ("mn", "Mn"),
    ("modifierletter", "Lm"),
    ("modifiersymbol", "Sk"),
    ("n", "N"),
    ("nd", "Nd"),
    ("nl", "Nl"),
    ("no", "No"),
    ("noncharactercodepoint", "Noncharacter_Code_Point"),
    ("nonspacingmark", "Mn"),
    ("number", "N"),
    ("openpunctuation", "Ps"),
    ("other", "C"),
    ("otherletter", "Lo"),
    ("othernumber", "No"),
    ("otherpunctuation", "Po"),
    ("othersymbol", "So"),
    ("p", "P"),
    ("paragraphseparator", "Zp"),
    ("patsyn", "Pat_Syn"),
    ("patternsyntax", "Pattern_Syntax"),
    ("patternwhitespace", "Pattern_White_Space"),
    ("patws", "Pat_WS"),
    ("pc", "Pc"),
    ("pd", "Pd"),
    ("pe", "Pe"),
    ("pf", "Pf"),
    ("pi", "Pi"),
    ("po", "Po"),
    ("print", ":print"),
    ("privateuse", "Co"),
    ("ps", "Ps"),
    ("punct", ":punct"),
    ("punctuation", "P"),
    ("qmark", "QMark"),
    ("quotationmark", "Quotation_Mark"),
    ("radical", "Radical"),
    ("regionalindicator", "Regional_Indicator"),
    ("ri", "RI"),
    ("s", "S"),
    ("sc", "Sc"),
    ("sd", "SD"),
    ("sentenceterminal", "Sentence_Terminal"),
    ("separator", "Z"),
    ("sk", "Sk"),
    ("sm", "Sm"),
    ("so", "So"),
    ("softdotted", "Soft_Dotted"),
    ("space", ":space"),
    ("spaceseparator", "Zs"),
    ("spacingmark", "Mc"),
    ("sterm", "STerm"),
    ("surrogate", "Cs"),
    ("symbol", "S"),
    ("term", "Term"),
    ("terminalpunctuation", "Terminal_Punctuation"),
    ("titlecaseletter", "Lt"),
    ("uideo", "UIdeo"),
    ("unassigned", "Cn"),
    ("unifiedideograph", "Unified_Ideograph"),
    ("upper", "Uppercase"),
    ("uppercase", "Uppercase"),
    ("uppercaseletter", "Lu"),
    ("variationselector", "Variation_Selector"),
    ("vs", "VS"),
    ("whitespace", "White_Space"),
    ("word", ":word"),
    ("wspace", "White_Space"),
    ("xdigit", ":xdigit"),
    ("xidc", "XIDC"),
    ("xidcontinue", "XID_Continue"),
    ("xids", "XIDS"),
    ("xidstart", "XID_Start"),
    ("z", "Z"),
    ("zl", "Zl"),
    ("zp", "Zp"),
    ("zs", "Zs"),
];

/// Normalize a property name the way Oniguruma compares them: strip
/// spaces, hyphens and underscores, lowercase.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn lookup(key: &str) -> Option<&'static str> {
    PROPERTY_TABLE
        .binary_search_by_key(&key, |&(k, _)| k)
        .ok()
        .map(|idx| PROPERTY_TABLE[idx].1)
}

/// Resolve an Oniguruma property name to its target-syntax form.
///
/// `Script=Name` / `sc=Name` forms resolve the value as a script;
/// `gc=Value` resolves the value against the category table.
pub fn canonical_property(name: &str) -> PropertyName {
    if let Some(eq) = name.find('=') {
        let (lhs, rhs) = (normalize(&name[..eq]), &name[eq + 1..]);
        return match lhs.as_str() {
            "sc" | "script" => PropertyName::Script(script_spelling(rhs)),
            "scx" | "scriptextensions" => {
                PropertyName::Es(format!("scx={}", script_spelling(rhs)))
            }
            _ => match lookup(&normalize(rhs)) {
                Some(v) if !v.starts_with(':') => PropertyName::Es(v.to_string()),
                _ => PropertyName::Script(script_spelling(rhs)),
            },
        };
    }
    match lookup(&normalize(name)) {
        Some(v) if v.starts_with(':') => PropertyName::Posix(&v[1..]),
        Some(v) => PropertyName::Es(v.to_string()),
        None => PropertyName::Script(script_spelling(name)),
    }
}

/// Best-effort script spelling: underscore-join words, capitalize each.
fn script_spelling(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in name.split(['_', ' ', '-']).filter(|w| !w.is_empty()).enumerate() {
        if i > 0 {
            out.push('_');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Simple (1:1) case variants of a character, including itself.
/// Multi-character case mappings are skipped; those cannot be expressed as
/// class alternatives of single code points.
pub fn case_variants(ch: char) -> Vec<char> {
    let mut out = vec![ch];
    let lower: Vec<char> = ch.to_lowercase().collect();
    if lower.len() == 1 && !out.contains(&lower[0]) {
        out.push(lower[0]);
    }
    let upper: Vec<char> = ch.to_uppercase().collect();
    if upper.len() == 1 && !out.contains(&upper[0]) {
        out.push(upper[0]);
    }
    out
}

/// Whether a character has at least one distinct simple case variant.
pub fn has_case_variants(ch: char) -> bool {
    case_variants(ch).len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted() {
        for pair in PROPERTY_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{} >= {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn loose_matching() {
        assert_eq!(
            canonical_property("alphabetic"),
            PropertyName::Es("Alphabetic".to_string())
        );
        assert_eq!(
            canonical_property("White_Space"),
            PropertyName::Es("White_Space".to_string())
        );
        assert_eq!(
            canonical_property("white space"),
            PropertyName::Es("White_Space".to_string())
        );
        assert_eq!(canonical_property("LOWER"), PropertyName::Es("Lowercase".to_string()));
    }

    #[test]
    fn general_categories() {
        assert_eq!(canonical_property("Lu"), PropertyName::Es("Lu".to_string()));
        assert_eq!(canonical_property("letter"), PropertyName::Es("L".to_string()));
        assert_eq!(
            canonical_property("Decimal_Number"),
            PropertyName::Es("Nd".to_string())
        );
    }

    #[test]
    fn posix_shaped_properties() {
        assert_eq!(canonical_property("Word"), PropertyName::Posix("word"));
        assert_eq!(canonical_property("digit"), PropertyName::Posix("digit"));
        assert_eq!(canonical_property("XDigit"), PropertyName::Posix("xdigit"));
    }

    #[test]
    fn unknown_names_become_scripts() {
        assert_eq!(
            canonical_property("greek"),
            PropertyName::Script("Greek".to_string())
        );
        assert_eq!(
            canonical_property("old_italic"),
            PropertyName::Script("Old_Italic".to_string())
        );
        assert_eq!(
            canonical_property("Script=han"),
            PropertyName::Script("Han".to_string())
        );
    }

    #[test]
    fn case_variant_sets() {
        assert_eq!(case_variants('a'), vec!['a', 'A']);
        assert_eq!(case_variants('A'), vec!['A', 'a']);
        assert_eq!(case_variants('7'), vec!['7']);
        assert!(has_case_variants('k'));
        assert!(!has_case_variants('-'));
    }
}
