//! Content policy classification
//!
//! The inspector is a keyword heuristic, not a real content classifier: any
//! case-insensitive occurrence of a trigger term anywhere in the signal text
//! flips the verdict to Blocked. It exists as a best-effort safety net over
//! the relayed stream and over upstream error bodies. The `Inspect` trait is
//! the seam for substituting a stronger classifier without touching the
//! relay mechanics.

use crate::config::PolicyConfig;

/// Outcome of classifying a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Blocked {
        /// The trigger term that matched
        reason: String,
    },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

/// Classification capability over a text signal.
///
/// Implementations must be monotonic with respect to appends: if a text
/// classifies as Blocked, that text plus any suffix must also classify as
/// Blocked.
pub trait Inspect: Send + Sync {
    fn classify(&self, signal: &str) -> Verdict;
}

/// Substring-matching inspector over a fixed trigger vocabulary
pub struct KeywordInspector {
    /// Trigger terms, pre-lowercased
    triggers: Vec<String>,
}

impl KeywordInspector {
    pub fn new(triggers: impl IntoIterator<Item = String>) -> Self {
        Self {
            triggers: triggers
                .into_iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.triggers.iter().cloned())
    }
}

impl Default for KeywordInspector {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

impl Inspect for KeywordInspector {
    fn classify(&self, signal: &str) -> Verdict {
        let haystack = signal.to_lowercase();
        for trigger in &self.triggers {
            if haystack.contains(trigger.as_str()) {
                tracing::debug!(trigger = %trigger, "Trigger term matched");
                return Verdict::Blocked {
                    reason: format!("trigger term '{trigger}'"),
                };
            }
        }
        Verdict::Allowed
    }
}
