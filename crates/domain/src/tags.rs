use mesosync_core::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagRule {
    pattern: String,
    tags: Vec<String>,
}

/// Ordered rules appending tags to services whose name contains a pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRuleSet {
    rules: Vec<TagRule>,
}

impl TagRuleSet {
    /// Parses `pattern:tag1,tag2` entries.
    ///
    /// Patterns are lower-cased. Repeated patterns extend the existing rule
    /// so insertion order is preserved.
    pub fn parse(entries: &[String]) -> AppResult<Self> {
        let mut rules: Vec<TagRule> = Vec::new();

        for entry in entries {
            let parts = entry.split(':').collect::<Vec<_>>();
            let [pattern, tags] = parts.as_slice() else {
                return Err(AppError::Validation(format!(
                    "task tag rule '{entry}' is invalid, it must include exactly one ':' separator"
                )));
            };

            let pattern = pattern.trim().to_lowercase();
            let tags = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>();

            match rules.iter_mut().find(|rule| rule.pattern == pattern) {
                Some(rule) => rule.tags.extend(tags),
                None => rules.push(TagRule { pattern, tags }),
            }
        }

        Ok(Self { rules })
    }

    /// Returns the tags of the rule for one pattern.
    #[must_use]
    pub fn tags_for(&self, pattern: &str) -> Option<&[String]> {
        self.rules
            .iter()
            .find(|rule| rule.pattern == pattern)
            .map(|rule| rule.tags.as_slice())
    }

    /// Returns the number of distinct patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns whether no rule is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends the tags of every rule whose pattern the name contains.
    ///
    /// Matching is a case-insensitive substring test. Tags already present
    /// are not repeated.
    #[must_use]
    pub fn apply(&self, name: &str, base_tags: Vec<String>) -> Vec<String> {
        let name = name.to_lowercase();
        let mut tags = base_tags;

        for rule in self
            .rules
            .iter()
            .filter(|rule| name.contains(rule.pattern.as_str()))
        {
            for tag in &rule.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }

        tags
    }
}
