//! Runtime string templates with positional and named slots.
//!
//! A [`Template`] is a list of fixed text fragments and slots. Rendering takes
//! positional arguments plus an optional JSON object of named values:
//!
//! ```
//! use panel_bot::template::{Render, Template};
//!
//! let greet = Template::new().text("Hi ").arg(0).text("!");
//! assert_eq!(greet.format(&["Sam"]), "Hi Sam!");
//!
//! let url = Template::parse("https://example.com?q={query}").unwrap();
//! let named = serde_json::json!({ "query": "hello+world" });
//! assert_eq!(url.render(&[], &named), "https://example.com?q=hello+world");
//! ```

use serde_json::Value;

/// A substitution slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Zero-based positional argument.
    Index(usize),
    /// Key into the named-value object.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// Errors from [`Template::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unclosed slot starting at byte {0}")]
    Unclosed(usize),

    #[error("Unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),

    #[error("Empty slot at byte {0}")]
    EmptySlot(usize),
}

/// Anything that renders to a string from positional and named values.
pub trait Render: Send + Sync {
    /// Substitute `positional` and `named` into the template.
    ///
    /// Missing values render as the empty string.
    fn render(&self, positional: &[&str], named: &Value) -> String;

    /// Render with positional arguments only.
    fn format(&self, positional: &[&str]) -> String {
        self.render(positional, &Value::Null)
    }
}

/// A template: fixed text fragments separated by slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed text fragment.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(&text),
            _ => self.segments.push(Segment::Text(text)),
        }
        self
    }

    /// Append a positional slot.
    pub fn arg(mut self, index: usize) -> Self {
        self.segments.push(Segment::Slot(Slot::Index(index)));
        self
    }

    /// Append a named slot.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Slot(Slot::Name(name.into())));
        self
    }

    /// Parse `{0}` / `{name}` slot syntax. `{{` and `}}` escape braces.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut template = Self::new();
        let mut text = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    text.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    text.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(pos)),
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for (_, k) in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(pos));
                    }
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(TemplateError::EmptySlot(pos));
                    }
                    template = template.text(std::mem::take(&mut text));
                    template = match key.parse::<usize>() {
                        Ok(index) => template.arg(index),
                        Err(_) => template.named(key),
                    };
                }
                _ => text.push(c),
            }
        }

        Ok(template.text(text))
    }

    /// Slots in order of appearance.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(slot) => Some(slot),
            Segment::Text(_) => None,
        })
    }
}

impl Render for Template {
    fn render(&self, positional: &[&str], named: &Value) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(Slot::Index(i)) => {
                    if let Some(value) = positional.get(*i) {
                        out.push_str(value);
                    }
                }
                Segment::Slot(Slot::Name(name)) => {
                    push_value(&mut out, named.get(name.as_str()));
                }
            }
        }
        out
    }
}

fn push_value(out: &mut String, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => out.push_str(s),
        Some(other) => out.push_str(&other.to_string()),
    }
}

/// Several templates rendered with the same arguments and concatenated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Joined {
    parts: Vec<Template>,
}

/// Combine templates into one composite.
pub fn join(parts: impl IntoIterator<Item = Template>) -> Joined {
    Joined {
        parts: parts.into_iter().collect(),
    }
}

impl Render for Joined {
    fn render(&self, positional: &[&str], named: &Value) -> String {
        self.parts
            .iter()
            .map(|part| part.render(positional, named))
            .collect()
    }
}
