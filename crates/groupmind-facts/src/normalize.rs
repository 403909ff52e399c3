//! Fact-value normalization: a basic Unicode pipeline shared by every fact
//! type, plus type-aware lexicon lookups for locations, languages, and
//! programming languages.

use unicode_normalization::UnicodeNormalization;

use crate::types::FactType;

/// City names, Cyrillic and transliterated Latin forms mapped to one
/// canonical English spelling. Deliberately small — covers the cities the
/// rule packs' location regexes are expected to match.
const CITY_TABLE: &[(&str, &str)] = &[
    ("києва", "kyiv"),
    ("київ", "kyiv"),
    ("киева", "kyiv"),
    ("киев", "kyiv"),
    ("kyiv", "kyiv"),
    ("kiev", "kyiv"),
    ("львова", "lviv"),
    ("львів", "lviv"),
    ("львова", "lviv"),
    ("lviv", "lviv"),
    ("lvov", "lviv"),
    ("одеси", "odesa"),
    ("одеса", "odesa"),
    ("одессы", "odesa"),
    ("одесса", "odesa"),
    ("odesa", "odesa"),
    ("odessa", "odesa"),
    ("харкова", "kharkiv"),
    ("харків", "kharkiv"),
    ("харькова", "kharkiv"),
    ("харьков", "kharkiv"),
    ("kharkiv", "kharkiv"),
    ("kharkov", "kharkiv"),
    ("дніпра", "dnipro"),
    ("дніпро", "dnipro"),
    ("днепра", "dnipro"),
    ("днепр", "dnipro"),
    ("dnipro", "dnipro"),
];

/// Spoken-language lexicon: Cyrillic/English spellings to a canonical name.
const LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("англійська", "english"),
    ("английский", "english"),
    ("english", "english"),
    ("українська", "ukrainian"),
    ("украинский", "ukrainian"),
    ("ukrainian", "ukrainian"),
    ("російська", "russian"),
    ("русский", "russian"),
    ("russian", "russian"),
    ("польська", "polish"),
    ("польский", "polish"),
    ("polish", "polish"),
    ("німецька", "german"),
    ("немецкий", "german"),
    ("german", "german"),
];

/// Programming-language abbreviation/alias table.
const PROGRAMMING_LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("javascript", "javascript"),
    ("ts", "typescript"),
    ("typescript", "typescript"),
    ("c++", "cpp"),
    ("cpp", "cpp"),
    ("c#", "csharp"),
    ("csharp", "csharp"),
    ("py", "python"),
    ("python", "python"),
    ("rs", "rust"),
    ("rust", "rust"),
    ("golang", "go"),
    ("go", "go"),
];

/// Unicode NFC → lowercase → collapse internal whitespace. Idempotent:
/// `basic_normalize(basic_normalize(x)) == basic_normalize(x)`.
pub fn basic_normalize(input: &str) -> String {
    let nfc: String = input.nfc().collect();
    let lower = nfc.to_lowercase();
    lower.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Full type-aware normalization applied before dedup/storage.
/// Idempotent for every supported fact type.
pub fn normalize_value(fact_type: FactType, value: &str) -> String {
    let base = basic_normalize(value);
    match fact_type {
        FactType::Location => normalize_location(&base),
        FactType::ProgrammingLanguage => normalize_programming_language(&base),
        FactType::Language => normalize_language(&base),
        FactType::Age => base.chars().filter(|c| c.is_ascii_digit()).collect(),
        FactType::Likes | FactType::Dislikes | FactType::Profession => base,
    }
}

fn strip_suffixes<'a>(value: &'a str, suffixes: &[&str]) -> &'a str {
    let mut v = value.trim();
    for suffix in suffixes {
        if let Some(stripped) = v.strip_suffix(suffix) {
            v = stripped.trim();
        }
    }
    v
}

fn normalize_location(value: &str) -> String {
    let stripped = strip_suffixes(
        value,
        &[
            " ukraine",
            ", ukraine",
            " область",
            " обл",
            " obl",
            " oblast",
        ],
    );
    lookup_table(stripped, CITY_TABLE)
}

fn normalize_programming_language(value: &str) -> String {
    let stripped = value
        .strip_suffix(" programming language")
        .unwrap_or(value)
        .trim();
    lookup_table(stripped, PROGRAMMING_LANGUAGE_TABLE)
}

fn normalize_language(value: &str) -> String {
    let stripped = strip_suffixes(value, &[" language", " мова", " язык"]);
    lookup_table(stripped, LANGUAGE_TABLE)
}

fn lookup_table(value: &str, table: &[(&str, &str)]) -> String {
    table
        .iter()
        .find(|(from, _)| *from == value)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Confidence boost applied when a location/language value matches a known
/// lexicon entry (used by the rule extractors — a recognized city name is
/// more trustworthy than an arbitrary free-form token).
pub fn is_known_location(value: &str) -> bool {
    let base = basic_normalize(value);
    CITY_TABLE.iter().any(|(from, _)| *from == base.as_str())
}

pub fn is_known_language(value: &str) -> bool {
    let base = basic_normalize(value);
    LANGUAGE_TABLE.iter().any(|(from, _)| *from == base.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_normalize_is_idempotent() {
        let once = basic_normalize("  Я  З   Києва  ");
        let twice = basic_normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn location_normalizes_cyrillic_to_canonical_latin() {
        assert_eq!(normalize_value(FactType::Location, "Києва"), "kyiv");
        assert_eq!(normalize_value(FactType::Location, "Kyiv oblast"), "kyiv");
    }

    #[test]
    fn programming_language_applies_abbreviations() {
        assert_eq!(
            normalize_value(FactType::ProgrammingLanguage, "JS"),
            "javascript"
        );
        assert_eq!(
            normalize_value(FactType::ProgrammingLanguage, "C++ programming language"),
            "cpp"
        );
    }

    #[test]
    fn age_keeps_digits_only() {
        assert_eq!(normalize_value(FactType::Age, "29 years"), "29");
    }

    #[test]
    fn normalize_value_is_idempotent_for_every_type() {
        for (ft, raw) in [
            (FactType::Location, "Києва"),
            (FactType::ProgrammingLanguage, "JS"),
            (FactType::Language, "англійська мова"),
            (FactType::Age, "29"),
            (FactType::Likes, "coffee"),
        ] {
            let once = normalize_value(ft, raw);
            let twice = normalize_value(ft, &once);
            assert_eq!(once, twice, "not idempotent for {ft:?}");
        }
    }
}
