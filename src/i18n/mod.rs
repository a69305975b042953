//! Localized reply tables consulted by the dialog handlers.

mod en;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::store::DEFAULT_LANGUAGE;
use crate::template::{Joined, Template};

/// Prompts shown while collecting profile fields.
pub struct Prompts {
    pub name: &'static str,
    /// Positional: user's name.
    pub college: Template,
    pub college_name: &'static str,
    pub error: &'static str,
}

/// Texts for the college selection list.
pub struct CollegeList {
    pub title: &'static str,
    pub description: &'static str,
    pub button_text: &'static str,
    pub section_title: &'static str,
}

/// Language switching replies.
pub struct LanguageReplies {
    /// Positional: requested code, available codes.
    pub no_such_lang: Template,
    /// Positional: new code.
    pub changed: Template,
}

/// Every user-facing string for one language.
pub struct Replies {
    pub greeting: &'static str,
    /// Positional: user's name.
    pub welcome_back: Template,
    pub about: &'static str,
    pub prompt: Prompts,
    pub college: CollegeList,
    /// Named: `name`, `college`, `lang`.
    pub describe_user: Joined,
    pub lang: LanguageReplies,
}

static TABLES: LazyLock<BTreeMap<&'static str, Replies>> =
    LazyLock::new(|| BTreeMap::from([("en", en::replies())]));

/// Replies for `lang`, if a table exists.
pub fn lookup(lang: &str) -> Option<&'static Replies> {
    TABLES.get(lang)
}

/// Replies for `lang`, falling back to the default language.
pub fn replies(lang: &str) -> &'static Replies {
    lookup(lang).unwrap_or_else(|| &TABLES[DEFAULT_LANGUAGE])
}

/// Available language codes, sorted.
pub fn languages() -> Vec<&'static str> {
    TABLES.keys().copied().collect()
}
