use mesosync_core::{AppError, AppResult};
use regex::Regex;

/// Turns raw task names into registry-safe service names.
#[derive(Debug, Clone, Default)]
pub struct NameNormalizer {
    separator: String,
    extraction_patterns: Vec<Regex>,
}

impl NameNormalizer {
    /// Creates a normalizer.
    ///
    /// `separator` replaces every underscore in the cleaned name. Each
    /// extraction pattern must carry a capture group; the first pattern whose
    /// first group matches supplies the short name.
    pub fn new(separator: impl Into<String>, extraction_patterns: &[String]) -> AppResult<Self> {
        let extraction_patterns = extraction_patterns
            .iter()
            .map(|pattern| pattern.trim())
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| {
                let regex = Regex::new(pattern).map_err(|error| {
                    AppError::Validation(format!("invalid name pattern '{pattern}': {error}"))
                })?;
                if regex.captures_len() < 2 {
                    return Err(AppError::Validation(format!(
                        "name pattern '{pattern}' must contain a capture group"
                    )));
                }

                Ok(regex)
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            separator: separator.into(),
            extraction_patterns,
        })
    }

    /// Normalizes one raw name.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> String {
        let extracted = self
            .extraction_patterns
            .iter()
            .find_map(|pattern| {
                pattern
                    .captures(raw)
                    .and_then(|captures| captures.get(1))
                    .map(|capture| capture.as_str())
                    .filter(|capture| !capture.is_empty())
            })
            .unwrap_or(raw);

        let cleaned = extracted
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() || character == '_' || character == '-' {
                    character
                } else {
                    '-'
                }
            })
            .collect::<String>();

        cleaned
            .replace('_', self.separator.as_str())
            .to_lowercase()
    }
}
