use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical matching key for catalog names: BOM and zero-width
/// characters stripped, diacritics folded, whitespace collapsed,
/// lower-cased. Total; never fails.
pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let folded: String = cleaned
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_lowercase()
}
