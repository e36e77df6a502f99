use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Deferred value, evaluated only when a template references it.
pub type Computation = Arc<dyn Fn(&TemplateContext) -> Option<String> + Send + Sync>;

/// A value a placeholder can resolve to.
#[derive(Clone)]
pub enum Value {
    Literal(String),
    /// Structured data navigated with dotted paths, e.g. `{build.number}`
    Record(serde_json::Value),
    Computed(Computation),
}

impl Value {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Captures `record` as structured data. Records that fail to serialize
    /// resolve to nothing.
    pub fn record<T: Serialize>(record: &T) -> Self {
        Self::Record(serde_json::to_value(record).unwrap_or(serde_json::Value::Null))
    }

    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&TemplateContext) -> Option<String> + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(compute))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Named values available to placeholders.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Resolves a dotted path to its rendered text.
    ///
    /// The first segment names a context value; the rest walk into a record.
    /// Literals and computed values have no fields, and only scalars render.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let mut segments = path.split('.');
        let root = self.values.get(segments.next()?)?;
        let rest: Vec<&str> = segments.collect();

        match root {
            Value::Literal(text) if rest.is_empty() => Some(text.clone()),
            Value::Computed(compute) if rest.is_empty() => compute(self),
            Value::Literal(_) | Value::Computed(_) => None,
            Value::Record(record) => {
                let node = rest
                    .iter()
                    .try_fold(record, |node, segment| node.get(*segment))?;
                scalar_text(node)
            }
        }
    }
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        serde_json::Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("token pattern is valid"))
}

/// Paths referenced by `{path}` placeholders, in order of appearance.
pub fn extract_tokens(text: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(text)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Replaces every placeholder that resolves against `context`.
///
/// Placeholders that do not resolve stay in the output unchanged. Each
/// distinct path is resolved once, so computed values run at most once per
/// call and never when unreferenced.
pub fn fill(text: &str, context: &TemplateContext) -> String {
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    token_pattern()
        .replace_all(text, |captures: &Captures| {
            let path = &captures[1];
            resolved
                .entry(path.to_string())
                .or_insert_with(|| context.resolve(path))
                .clone()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}
