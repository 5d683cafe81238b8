use crate::{base::GuardRule, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Hash, Eq)]
pub enum AuthorityStrategy {
    /// only the listed origins pass
    WhiteList,
    /// the listed origins are blocked
    BlackList,
}

impl Default for AuthorityStrategy {
    fn default() -> Self {
        AuthorityStrategy::WhiteList
    }
}

/// `Rule` restricts the calling origins of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    /// `id` represents the unique ID of the rule (optional).
    pub id: String,
    pub resource: String,
    pub strategy: AuthorityStrategy,
    /// origins the strategy applies to
    pub limit_origins: Vec<String>,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            resource: String::default(),
            strategy: AuthorityStrategy::default(),
            limit_origins: Vec::new(),
        }
    }
}

impl Rule {
    /// Whether an invocation from `origin` is admitted by this rule.
    pub fn admits(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return true;
        }
        let listed = self.limit_origins.iter().any(|o| o == origin);
        match self.strategy {
            AuthorityStrategy::WhiteList => listed,
            AuthorityStrategy::BlackList => !listed,
        }
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.strategy == other.strategy
            && self.limit_origins == other.limit_origins
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.strategy.hash(state);
    }
}

impl GuardRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        if self.limit_origins.is_empty() {
            return Err(Error::msg("empty limit origins"));
        }
        if self.limit_origins.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::msg("blank origin in limit origins"));
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}
