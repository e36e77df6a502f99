use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

use super::TemplateError;

const MATCH_WEIGHT: i64 = 1000;
const MESSAGE_KEY: &str = "msg";
const SUB_TABLE_KEY: &str = "sub";

/// A scalar parameter or condition value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Named parameters a rule table is matched against.
pub type Parameters = BTreeMap<String, Scalar>;

/// Expected value of one condition: a single scalar or a set of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    OneOf(Vec<Scalar>),
    Equals(Scalar),
}

impl Condition {
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Self::OneOf(values) => values.contains(value),
            Self::Equals(expected) => expected == value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleBody {
    Message(String),
    Nested(Vec<Rule>),
}

/// One entry of a rule table: conditions plus a message or a sub-table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "IndexMap<String, serde_yaml::Value>")]
pub struct Rule {
    pub conditions: IndexMap<String, Condition>,
    pub body: RuleBody,
}

impl TryFrom<IndexMap<String, serde_yaml::Value>> for Rule {
    type Error = TemplateError;

    fn try_from(mut entry: IndexMap<String, serde_yaml::Value>) -> std::result::Result<Self, Self::Error> {
        let message = entry.shift_remove(MESSAGE_KEY);
        let sub_table = entry.shift_remove(SUB_TABLE_KEY);

        let body = match (message, sub_table) {
            (Some(serde_yaml::Value::String(message)), None) => RuleBody::Message(message),
            (None, Some(sub_table)) => {
                let rules: Vec<Rule> = serde_yaml::from_value(sub_table)
                    .map_err(|e| TemplateError::MalformedRule(e.to_string()))?;
                RuleBody::Nested(rules)
            }
            (Some(_), Some(_)) => {
                return Err(TemplateError::MalformedRule(
                    "entry has both 'msg' and 'sub'".to_string(),
                ))
            }
            (Some(_), None) => {
                return Err(TemplateError::MalformedRule(
                    "'msg' must be a string".to_string(),
                ))
            }
            (None, None) => {
                return Err(TemplateError::MalformedRule(
                    "entry has neither 'msg' nor 'sub'".to_string(),
                ))
            }
        };

        let conditions = entry
            .into_iter()
            .map(|(name, value)| {
                serde_yaml::from_value::<Condition>(value)
                    .map(|condition| (name.clone(), condition))
                    .map_err(|e| TemplateError::MalformedRule(format!("condition '{name}': {e}")))
            })
            .collect::<std::result::Result<_, _>>()?;

        Ok(Self { conditions, body })
    }
}

impl Rule {
    /// +1000 for every parameter that meets the rule's condition on it,
    /// -1000 for every one that does not. Parameters the rule declares no
    /// condition for do not count.
    pub fn score(&self, parameters: &Parameters) -> i64 {
        parameters
            .iter()
            .filter_map(|(name, value)| self.conditions.get(name).map(|c| c.matches(value)))
            .map(|matched| if matched { MATCH_WEIGHT } else { -MATCH_WEIGHT })
            .sum()
    }
}

/// Named groups of response rules, loaded once and never modified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    groups: IndexMap<String, Vec<Rule>>,
}

impl RuleTable {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let table: Self = serde_yaml::from_str(contents)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// The rule table shipped with the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_yaml(include_str!("../../rules/outputs.yaml"))
    }

    fn validate(&self) -> std::result::Result<(), TemplateError> {
        fn check(group: &str, rules: &[Rule]) -> std::result::Result<(), TemplateError> {
            if rules.is_empty() {
                return Err(TemplateError::EmptyGroup(group.to_string()));
            }
            rules.iter().try_for_each(|rule| match &rule.body {
                RuleBody::Nested(sub) => check(group, sub),
                RuleBody::Message(_) => Ok(()),
            })
        }

        self.groups
            .iter()
            .try_for_each(|(group, rules)| check(group, rules))
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Picks the template text of `group` that best fits `parameters`.
    ///
    /// Rules are ranked by score, highest first, then by declaration order;
    /// the top rule wins even when its score is not positive, so every group
    /// should end with a condition-free catch-all. A winning sub-table is
    /// ranked again with the same parameters.
    pub fn select(&self, group: &str, parameters: &Parameters) -> std::result::Result<&str, TemplateError> {
        let rules = self
            .groups
            .get(group)
            .ok_or_else(|| TemplateError::UnknownGroup(group.to_string()))?;
        select_in(group, rules, parameters)
    }
}

fn select_in<'a>(
    group: &str,
    rules: &'a [Rule],
    parameters: &Parameters,
) -> std::result::Result<&'a str, TemplateError> {
    let mut ranked: Vec<(usize, i64)> = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| (index, rule.score(parameters)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let &(index, score) = ranked
        .first()
        .ok_or_else(|| TemplateError::EmptyGroup(group.to_string()))?;
    if score <= 0 {
        debug!("No rule of {group} matched positively, falling back to rule {index} (score {score})");
    }

    match &rules[index].body {
        RuleBody::Message(message) => Ok(message),
        RuleBody::Nested(sub) => select_in(group, sub, parameters),
    }
}
