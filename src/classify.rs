use std::collections::HashMap;

/// Maps the first two digits of a food code to its IBGE group.
#[derive(Debug, Clone)]
pub struct GroupClassifier {
    prefixes: HashMap<String, String>,
    default: String,
}

impl GroupClassifier {
    pub fn new(prefixes: HashMap<String, String>, default: impl Into<String>) -> Self {
        GroupClassifier {
            prefixes,
            default: default.into(),
        }
    }

    /// `code` is a 7-digit food code; a leading zero still counts as a digit.
    pub fn classify(&self, code: u32) -> &str {
        if code >= 10_000_000 {
            return &self.default;
        }
        let prefix = format!("{:02}", code / 100_000);
        self.prefixes
            .get(&prefix)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_group(&self) -> &str {
        &self.default
    }
}

// ── Tests ──
