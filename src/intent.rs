use serde::Deserialize;
use serde_json::{Map, Value};

/// Context that carries release parameters between conversation turns.
pub const RELEASE_CONTEXT: &str = "release-name-context";

/// Inbound fulfillment request: `{ result: { action, parameters, contexts } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub result: Option<IntentResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentResult {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub contexts: Option<Vec<IntentContext>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentContext {
    pub name: String,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

impl WebhookRequest {
    pub fn action(&self) -> Option<&str> {
        self.result.as_ref()?.action.as_deref()
    }

    /// Whether the request carries a parameter object at all.
    pub fn has_parameters(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|result| result.parameters.is_some())
    }

    /// Looks `name` up in the request's parameters, then in the parameters
    /// of the context called `context`.
    ///
    /// Empty strings count as absent; fulfillment platforms send them for
    /// slots the user has not filled.
    pub fn parameter(&self, context: Option<&str>, name: &str) -> Option<String> {
        let result = self.result.as_ref()?;

        let direct = result
            .parameters
            .as_ref()
            .and_then(|parameters| parameter_text(parameters, name));
        if direct.is_some() {
            return direct;
        }

        let context = context?;
        result
            .contexts
            .iter()
            .flatten()
            .filter(|candidate| candidate.name == context)
            .filter_map(|candidate| candidate.parameters.as_ref())
            .last()
            .and_then(|parameters| parameter_text(parameters, name))
    }
}

fn parameter_text(parameters: &Map<String, Value>, name: &str) -> Option<String> {
    match parameters.get(name)? {
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> WebhookRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn reads_action_and_direct_parameter() {
        let request = request(
            r#"{"result": {"action": "check-release-state",
                           "parameters": {"release-name": "beta", "release-state": "complete"},
                           "contexts": []}}"#,
        );
        assert_eq!(request.action(), Some("check-release-state"));
        assert!(request.has_parameters());
        assert_eq!(
            request.parameter(Some(RELEASE_CONTEXT), "release-name").as_deref(),
            Some("beta")
        );
    }

    #[cfg(test)]
    mod parameter {
        use super::*;

        const CARRIED_OVER: &str = r#"{"result": {
            "action": "check-release-time",
            "parameters": {"tense": "future", "release-name": ""},
            "contexts": [
                {"name": "other-context", "parameters": {"release-name": "dev"}},
                {"name": "release-name-context", "lifespan": 5,
                 "parameters": {"release-name": "prod", "release-state": "complete"}}
            ]}}"#;

        #[test]
        fn falls_back_to_named_context() {
            let request = request(CARRIED_OVER);
            assert_eq!(
                request.parameter(Some(RELEASE_CONTEXT), "release-name").as_deref(),
                Some("prod")
            );
            assert_eq!(
                request.parameter(Some(RELEASE_CONTEXT), "release-state").as_deref(),
                Some("complete")
            );
        }

        #[test]
        fn direct_value_wins_over_context() {
            let request = request(CARRIED_OVER);
            assert_eq!(
                request.parameter(Some(RELEASE_CONTEXT), "tense").as_deref(),
                Some("future")
            );
        }

        #[test]
        fn no_context_means_no_fallback() {
            let request = request(CARRIED_OVER);
            assert_eq!(request.parameter(None, "release-state"), None);
        }

        #[test]
        fn missing_everywhere_is_none() {
            let request = request(CARRIED_OVER);
            assert_eq!(request.parameter(Some(RELEASE_CONTEXT), "issueNo"), None);
        }
    }

    #[test]
    fn tolerates_missing_contexts() {
        let request = request(
            r#"{"result": {"action": "check-issue-state", "parameters": {"issueNo": "CDBT-4289"}}}"#,
        );
        assert_eq!(
            request.parameter(Some(RELEASE_CONTEXT), "issueNo").as_deref(),
            Some("CDBT-4289")
        );
        assert_eq!(request.parameter(Some(RELEASE_CONTEXT), "tense"), None);
    }

    #[test]
    fn missing_parameters_object() {
        let request = request(r#"{"result": {"action": "check-issue-state"}}"#);
        assert!(!request.has_parameters());
        assert_eq!(request.parameter(None, "issueNo"), None);
    }

    #[test]
    fn missing_result() {
        let request = request("{}");
        assert_eq!(request.action(), None);
        assert!(!request.has_parameters());
    }
}
