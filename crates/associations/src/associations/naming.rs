//! Naming conventions - inflection and key-name derivation for associations

use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

/// Words whose plural equals the singular
const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "data",
    "metadata",
];

/// (singular, plural) pairs that do not follow the suffix rules
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("ox", "oxen"),
];

/// Singular and plural form of a model or association name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    pub singular: String,
    pub plural: String,
}

impl Name {
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }

    /// Derive both forms from a word given in either form
    pub fn from_word(word: &str) -> Self {
        Self {
            singular: singularize(word),
            plural: pluralize(word),
        }
    }

    /// Derive both forms from a word known to be plural
    pub fn from_plural(plural: &str) -> Self {
        Self {
            singular: singularize(plural),
            plural: plural.to_string(),
        }
    }

    /// Derive both forms from a word known to be singular
    pub fn from_singular(singular: &str) -> Self {
        Self {
            singular: singular.to_string(),
            plural: pluralize(singular),
        }
    }
}

/// Simple pluralization (English-centric)
pub fn pluralize(word: &str) -> String {
    if word.is_empty() || is_uncountable(word) {
        return word.to_string();
    }
    if let Some(plural) = irregular(word, |(singular, plural)| (singular, plural)) {
        return plural;
    }
    if irregular(word, |(singular, plural)| (plural, singular)).is_some() {
        return word.to_string();
    }

    let lower = word.to_lowercase();
    if lower.ends_with('y') && !ends_with_any(&lower, &["ay", "ey", "iy", "oy", "uy"]) {
        format!("{}ies", &word[..word.len() - 1])
    } else if ends_with_any(&lower, &["s", "sh", "ch", "x", "z"]) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Simple singularization (English-centric)
pub fn singularize(word: &str) -> String {
    if word.is_empty() || is_uncountable(word) {
        return word.to_string();
    }
    if let Some(singular) = irregular(word, |(singular, plural)| (plural, singular)) {
        return singular;
    }
    if irregular(word, |(singular, plural)| (singular, plural)).is_some() {
        return word.to_string();
    }

    let lower = word.to_lowercase();
    if lower.ends_with("ies") && lower.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if ends_with_any(&lower, &["sses", "ches", "shes", "xes", "zzes", "atuses", "iases"]) {
        word[..word.len() - 2].to_string()
    } else if ends_with_any(&lower, &["ss", "us", "is"]) {
        word.to_string()
    } else if lower.ends_with('s') && lower.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Remove separators and upper-case the character that follows each run of
/// them; the first character keeps its case (`User_id` -> `UserId`)
pub fn camelize(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut upper_next = false;
    for c in input.trim().chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// Upper-case the first character
pub fn upper_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// snake_case column name for `underscored` models
pub fn underscore(input: &str) -> String {
    input.to_snake_case()
}

/// Default key name: camelized `<owner singular>_<key attribute>`
pub fn foreign_key_name(owner_singular: &str, key_attribute: &str) -> String {
    camelize(&format!("{}_{}", owner_singular, key_attribute))
}

fn is_uncountable(word: &str) -> bool {
    let lower = word.to_lowercase();
    UNCOUNTABLE.iter().any(|u| lower.ends_with(u))
}

/// Look `word` up in the irregular table using `pick` to choose which column
/// to match (first) and which to return (second), preserving the case of the
/// leading character
fn irregular<F>(word: &str, pick: F) -> Option<String>
where
    F: Fn((&'static str, &'static str)) -> (&'static str, &'static str),
{
    let lower = word.to_lowercase();
    IRREGULAR.iter().find_map(|&pair| {
        let (from, to) = pick(pair);
        if !lower.ends_with(from) {
            return None;
        }
        let cut = match word.len().checked_sub(from.len()) {
            Some(cut) if word.is_char_boundary(cut) => cut,
            _ => return None,
        };
        let stem = &word[..cut];
        let matched_upper = word[stem.len()..].starts_with(|c: char| c.is_uppercase());
        let replacement = if matched_upper {
            upper_first(to)
        } else {
            to.to_string()
        };
        match stem.chars().last() {
            None => Some(replacement),
            Some(last) if !last.is_alphabetic() => Some(format!("{}{}", stem, replacement)),
            // compound words only match on a word boundary (`TeamPerson`)
            Some(_) if matched_upper => Some(format!("{}{}", stem, replacement)),
            Some(_) => None,
        }
    })
}

fn ends_with_any(word: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| word.ends_with(suffix))
}
