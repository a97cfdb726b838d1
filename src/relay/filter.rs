//! Content rules for relayed chat.
//!
//! Each direction carries its own list of regex rules, compiled once at
//! startup. A message matching any rule of its direction is blocked: inbound
//! Discord messages are dropped before buffering, and a game server's `/send`
//! is refused so the caller knows nothing was posted.

use fancy_regex::Regex;
use tracing::warn;

use crate::common::ConfigError;
use crate::config::types::FiltersConfig;

/// Direction of message flow for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDirection {
    /// Game server to Discord.
    ToDiscord,
    /// Discord to game server.
    FromDiscord,
}

impl FilterDirection {
    /// Environment variable holding this direction's rules.
    pub fn env_key(self) -> &'static str {
        match self {
            FilterDirection::ToDiscord => "FILTER_TO_DISCORD",
            FilterDirection::FromDiscord => "FILTER_FROM_DISCORD",
        }
    }
}

/// Ordered rules for one direction.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Regex>,
}

impl RuleSet {
    /// Compile every pattern, reporting each invalid one.
    pub fn compile(direction: FilterDirection, patterns: &[String]) -> Result<Self, Vec<String>> {
        let mut rules = Vec::with_capacity(patterns.len());
        let mut problems = Vec::new();

        for (i, pattern) in patterns.iter().enumerate() {
            match Regex::new(pattern) {
                Ok(regex) => rules.push(regex),
                Err(e) => problems.push(format!(
                    "{}[{}] is not a valid regex: '{}' ({})",
                    direction.env_key(),
                    i,
                    pattern,
                    e
                )),
            }
        }

        if problems.is_empty() {
            Ok(Self { rules })
        } else {
            Err(problems)
        }
    }

    /// Source of the first rule matching `text`.
    ///
    /// A rule that exceeds the backtracking limit counts as not matching.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| {
                rule.is_match(text).unwrap_or_else(|e| {
                    warn!("Filter rule '{}' failed to run: {}", rule.as_str(), e);
                    false
                })
            })
            .map(Regex::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Rules for both relay directions.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    to_discord: RuleSet,
    from_discord: RuleSet,
}

impl MessageFilter {
    pub fn from_config(config: &FiltersConfig) -> Result<Self, ConfigError> {
        let compile = |direction, patterns: &Option<Vec<String>>| {
            RuleSet::compile(direction, patterns.as_deref().unwrap_or_default())
        };

        match (
            compile(FilterDirection::ToDiscord, &config.to_discord),
            compile(FilterDirection::FromDiscord, &config.from_discord),
        ) {
            (Ok(to_discord), Ok(from_discord)) => Ok(Self {
                to_discord,
                from_discord,
            }),
            (to, from) => {
                let problems: Vec<String> = [to.err(), from.err()].into_iter().flatten().flatten().collect();
                Err(ConfigError::ValidationError {
                    message: problems.join("\n"),
                })
            }
        }
    }

    /// A filter that lets everything through.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The rule that blocks `text` in `direction`, if any.
    pub fn blocked_by(&self, direction: FilterDirection, text: &str) -> Option<&str> {
        match direction {
            FilterDirection::ToDiscord => self.to_discord.first_match(text),
            FilterDirection::FromDiscord => self.from_discord.first_match(text),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.to_discord.len() + self.from_discord.len()
    }
}
