//! Risk Classifier
//!
//! Maps the set of paths a proposal touches to a risk level using a
//! configured pattern table. Patterns may be exact paths, `dir/` prefixes,
//! or `*`/`**` globs; the highest severity across all paths wins. An
//! external judgment can raise the mechanical level but never lower it.

use regex::Regex;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::RiskLevel;

/// One compiled pattern and the severity it assigns.
struct RiskRule {
    pattern: String,
    regex: Regex,
    level: RiskLevel,
}

/// Pure classifier over a compiled path-pattern table.
pub struct RiskClassifier {
    rules: Vec<RiskRule>,
}

impl RiskClassifier {
    /// Build a classifier from raw `(pattern, level)` pairs. Patterns that
    /// fail to compile are skipped with a debug log rather than poisoning
    /// the table; the mechanical floor below still applies.
    pub fn new(patterns: &[(String, RiskLevel)]) -> Self {
        let mut rules = Vec::with_capacity(patterns.len());
        for (pattern, level) in patterns {
            match glob_to_regex(pattern) {
                Ok(regex) => rules.push(RiskRule {
                    pattern: pattern.clone(),
                    regex,
                    level: *level,
                }),
                Err(e) => debug!(pattern = %pattern, error = %e, "skipping unparsable risk pattern"),
            }
        }
        RiskClassifier { rules }
    }

    /// Build from the engine config's critical/high tables.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut patterns: Vec<(String, RiskLevel)> = Vec::new();
        for p in &config.critical_paths {
            patterns.push((p.clone(), RiskLevel::Critical));
        }
        for p in &config.high_paths {
            patterns.push((p.clone(), RiskLevel::High));
        }
        Self::new(&patterns)
    }

    /// Classify a set of repository-relative paths. The highest matching
    /// severity wins. Unmatched single-file proposals are `Low`; proposals
    /// touching two or more files floor at `Medium`.
    pub fn classify(&self, paths: &[String]) -> RiskLevel {
        let floor = if paths.len() >= 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let mut level = floor;
        for path in paths {
            for rule in &self.rules {
                if rule.regex.is_match(path) && rule.level > level {
                    debug!(path = %path, pattern = %rule.pattern, level = %rule.level, "risk pattern matched");
                    level = rule.level;
                }
            }
        }
        level
    }

    /// Merge an optional external judgment with the mechanical level.
    /// The judgment can only raise the result; the mechanical floor is the
    /// safety net against a wrong external opinion.
    pub fn classify_with_judgment(
        &self,
        paths: &[String],
        judged: Option<RiskLevel>,
    ) -> RiskLevel {
        let mechanical = self.classify(paths);
        match judged {
            Some(j) => mechanical.max(j),
            None => mechanical,
        }
    }
}

/// Translate a path pattern to an anchored regex.
///
/// `**` matches any span including `/`; `*` matches within one component;
/// a trailing `/` makes the pattern a directory prefix; anything else is an
/// exact path.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following '/' so "src/**" also matches "src".
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        re.push_str("(.*/)?");
                    } else {
                        re.push_str(".*");
                    }
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push_str("[^/]"),
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }

    if pattern.ends_with('/') {
        // Directory prefix: match everything beneath it.
        re.push_str(".*");
    } else if pattern.ends_with("**") {
        // Already open-ended.
    } else {
        re.push('$');
    }

    Regex::new(&re)
}
