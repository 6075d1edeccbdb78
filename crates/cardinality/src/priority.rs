// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Priority Tagger: an ordered list of regex rules that assigns each
//! resource a retention priority, first match wins (spec §4.H).

use regex::Regex;

use crate::error::Error;

/// Retention priority assigned to a resource. Ordering is not ambient; the
/// set of priorities that should be retained is configured explicitly
/// rather than inferred from a threshold (spec §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Never subject to rollup or top-k eviction pressure.
    Critical,
    /// High retention priority.
    High,
    /// Default retention priority for unmatched resources.
    Medium,
    /// Low retention priority; the default rollup target.
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(name)
    }
}

struct Rule {
    pattern: Regex,
    priority: Priority,
}

/// Tags resource identifiers with a [`Priority`] by walking an ordered list
/// of regex rules and taking the first match; unmatched identifiers get
/// [`Priority::Low`].
pub struct PriorityTagger {
    rules: Vec<Rule>,
    attribute_key: String,
}

impl PriorityTagger {
    /// Compile `rules` (pattern, priority) in the given order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if any pattern fails to compile.
    pub fn new(rules: Vec<(String, Priority)>, attribute_key: impl Into<String>) -> Result<Self, Error> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (pattern, priority) in rules {
            let regex = Regex::new(&pattern).map_err(|e| Error::invalid_parameter(format!("invalid priority rule pattern '{pattern}': {e}")))?;
            compiled.push(Rule { pattern: regex, priority });
        }
        Ok(Self { rules: compiled, attribute_key: attribute_key.into() })
    }

    /// Attribute key this tagger writes its decision under.
    #[must_use]
    pub fn attribute_key(&self) -> &str {
        &self.attribute_key
    }

    /// Tag `id` with the priority of the first matching rule, or
    /// [`Priority::Low`] if none match.
    #[must_use]
    pub fn tag(&self, id: &str) -> Priority {
        self.rules.iter().find(|rule| rule.pattern.is_match(id)).map_or(Priority::Low, |rule| rule.priority)
    }

    /// Number of configured rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        let tagger = PriorityTagger::new(
            vec![("^critical-.*".to_string(), Priority::Critical), (".*-db$".to_string(), Priority::High)],
            "phoenix.priority",
        )
        .expect("valid rules");
        assert_eq!(tagger.tag("critical-db"), Priority::Critical);
        assert_eq!(tagger.tag("service-db"), Priority::High);
        assert_eq!(tagger.tag("service-cache"), Priority::Low);
    }

    #[test]
    fn no_rules_yields_low_for_everything() {
        let tagger = PriorityTagger::new(vec![], "phoenix.priority").expect("valid");
        assert_eq!(tagger.tag("anything"), Priority::Low);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let result = PriorityTagger::new(vec![("(unclosed".to_string(), Priority::High)], "phoenix.priority");
        assert!(result.is_err());
    }
}
