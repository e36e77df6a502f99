//! Rule-based response templates.
//!
//! A rule table maps group names to ordered rules. Selection scores each
//! rule against the request's parameters and the chosen text is then filled
//! from a [`TemplateContext`].

mod fill;
mod rules;

pub use fill::{extract_tokens, fill, TemplateContext, Value};
pub use rules::{Parameters, RuleTable, Scalar};

use log::debug;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Unknown template group: {0}")]
    UnknownGroup(String),

    #[error("Template group {0} has no rules")]
    EmptyGroup(String),

    #[error("Malformed rule: {0}")]
    MalformedRule(String),
}

impl RuleTable {
    /// Selects the best rule of `group` for `parameters` and fills it.
    pub fn render(
        &self,
        group: &str,
        parameters: &Parameters,
        context: &TemplateContext,
    ) -> Result<String, TemplateError> {
        let template = self.select(group, parameters)?;
        let filled = fill(template, context);

        let unresolved = extract_tokens(&filled);
        if !unresolved.is_empty() {
            debug!("Unresolved placeholders in {group} reply: {unresolved:?}");
        }
        Ok(filled)
    }
}
