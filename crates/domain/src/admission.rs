use mesosync_core::{AppError, AppResult};
use regex::Regex;

/// Allow/deny regular expression pair deciding whether a name is registrable.
///
/// An empty allow list admits everything and an empty deny list rejects
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    allow: Option<Regex>,
    deny: Option<Regex>,
}

impl AdmissionPolicy {
    /// Compiles a policy from allow and deny pattern lists.
    ///
    /// Each list is joined into one alternation.
    pub fn new(allow: &[String], deny: &[String]) -> AppResult<Self> {
        Ok(Self {
            allow: compile_alternation("allow", allow)?,
            deny: compile_alternation("deny", deny)?,
        })
    }

    /// Returns a policy admitting every name.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Returns whether the name is admitted.
    #[must_use]
    pub fn allowed(&self, name: &str) -> bool {
        let on_allow_list = self
            .allow
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(name));
        let on_deny_list = self
            .deny
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(name));

        on_allow_list && !on_deny_list
    }
}

fn compile_alternation(kind: &str, patterns: &[String]) -> AppResult<Option<Regex>> {
    let patterns = patterns
        .iter()
        .map(|pattern| pattern.trim())
        .filter(|pattern| !pattern.is_empty())
        .collect::<Vec<_>>();
    if patterns.is_empty() {
        return Ok(None);
    }

    let joined = patterns.join("|");
    Regex::new(joined.as_str()).map(Some).map_err(|error| {
        AppError::Validation(format!("invalid {kind} pattern '{joined}': {error}"))
    })
}

#[cfg(test)]
mod tests {
    use super::AdmissionPolicy;

    fn patterns(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn allow_pattern_admits_matching_name() {
        let policy = AdmissionPolicy::new(&patterns(&["fo.*"]), &[]);
        assert!(policy.is_ok());
        assert!(policy.unwrap_or_default().allowed("foo"));
    }

    #[test]
    fn deny_pattern_overrides_allow_pattern() {
        let policy = AdmissionPolicy::new(&patterns(&["fo.*"]), &patterns(&["fo.*"]));
        assert!(policy.is_ok());
        assert!(!policy.unwrap_or_default().allowed("foo"));
    }

    #[test]
    fn empty_lists_admit_everything() {
        let policy = AdmissionPolicy::new(&[], &[]);
        assert!(policy.is_ok());
        assert!(policy.unwrap_or_default().allowed("foo"));
        assert!(AdmissionPolicy::allow_all().allowed(""));
    }

    #[test]
    fn allow_list_entries_are_alternatives() {
        let policy = AdmissionPolicy::new(&patterns(&["^web$", "^api"]), &patterns(&["canary"]))
            .unwrap_or_default();
        assert!(policy.allowed("web"));
        assert!(policy.allowed("api-v2"));
        assert!(!policy.allowed("api-canary"));
        assert!(!policy.allowed("batch"));
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        assert!(AdmissionPolicy::new(&patterns(&["(unclosed"]), &[]).is_err());
    }
}
