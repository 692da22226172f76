//! Eligibility classifier: should this message get an automated reply?
//!
//! Three independent checks, each a case-insensitive substring match:
//!
//! 1. the sender address contains a blocked sender pattern
//!    (`no-reply`, `mailer-daemon`, `postmaster`, `bounce`, ...);
//! 2. the subject contains a blocked keyword (`newsletter`, `unsubscribe`,
//!    `alert`, ...);
//! 3. the `Auto-Submitted` marker contains a configured value.
//!
//! Any hit rejects the message. The rules lean toward rejecting: a skipped
//! human message waits for a person, a bot answering a bot loops.
//!
//! [`EligibilityRules`] is built once from configuration and shared by every
//! layer that filters mail, so there is a single rule list.

use std::fmt;

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BlockedSender(String),
    BlockedSubject(String),
    AutoSubmitted(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BlockedSender(p) => write!(f, "sender matches blocked pattern '{}'", p),
            Rejection::BlockedSubject(k) => write!(f, "subject matches blocked keyword '{}'", k),
            Rejection::AutoSubmitted(v) => write!(f, "auto-submitted marker '{}'", v),
        }
    }
}

/// Configured rule lists. Patterns are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityRules {
    blocked_senders: Vec<String>,
    blocked_subject_keywords: Vec<String>,
    auto_submitted_values: Vec<String>,
}

impl EligibilityRules {
    /// Build rules from raw pattern lists. Empty patterns are ignored.
    pub fn new(
        blocked_senders: Vec<String>,
        blocked_subject_keywords: Vec<String>,
        auto_submitted_values: Vec<String>,
    ) -> Self {
        Self {
            blocked_senders: lowercase_all(blocked_senders),
            blocked_subject_keywords: lowercase_all(blocked_subject_keywords),
            auto_submitted_values: lowercase_all(auto_submitted_values),
        }
    }

    /// Classify a message, returning the first rule it trips.
    pub fn check(
        &self,
        sender: &str,
        subject: &str,
        auto_submitted: Option<&str>,
    ) -> Result<(), Rejection> {
        let sender = sender.to_lowercase();
        if let Some(pattern) = first_contained(&sender, &self.blocked_senders) {
            return Err(Rejection::BlockedSender(pattern.to_string()));
        }

        let subject = subject.to_lowercase();
        if let Some(keyword) = first_contained(&subject, &self.blocked_subject_keywords) {
            return Err(Rejection::BlockedSubject(keyword.to_string()));
        }

        if let Some(marker) = auto_submitted {
            let marker = marker.trim().to_lowercase();
            if first_contained(&marker, &self.auto_submitted_values).is_some() {
                return Err(Rejection::AutoSubmitted(marker));
            }
        }

        Ok(())
    }

    pub fn is_eligible(&self, sender: &str, subject: &str, auto_submitted: Option<&str>) -> bool {
        self.check(sender, subject, auto_submitted).is_ok()
    }
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self::new(
            default_blocked_senders(),
            default_blocked_subject_keywords(),
            default_auto_submitted_values(),
        )
    }
}

pub fn default_blocked_senders() -> Vec<String> {
    [
        "noreply",
        "no-reply",
        "no_reply",
        "donotreply",
        "do-not-reply",
        "mailer-daemon",
        "postmaster",
        "bounce",
        "notifications@",
        "newsletter",
        "marketing@",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_blocked_subject_keywords() -> Vec<String> {
    [
        "newsletter",
        "unsubscribe",
        "subscription",
        "promotion",
        "promo",
        "marketing",
        "alert",
        "webinar",
        "digest",
        "undeliverable",
        "delivery status notification",
        "auto-reply",
        "automatic reply",
        "out of office",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// `Auto-Submitted` values per RFC 3834 (`no` means a human sent it).
pub fn default_auto_submitted_values() -> Vec<String> {
    ["auto-generated", "auto-replied", "auto-notified"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn lowercase_all(patterns: Vec<String>) -> Vec<String> {
    patterns
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn first_contained<'a>(haystack: &str, patterns: &'a [String]) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| haystack.contains(p.as_str()))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailer_daemon_rejected() {
        let rules = EligibilityRules::default();
        assert!(!rules.is_eligible("mailer-daemon@example.com", "Delivery failed", None));
    }

    #[test]
    fn test_plain_customer_accepted() {
        let rules = EligibilityRules::default();
        assert!(rules.is_eligible("user@example.com", "Payment issue", None));
    }

    #[test]
    fn test_sender_match_is_case_insensitive() {
        let rules = EligibilityRules::default();
        assert_eq!(
            rules.check("No-Reply@Shop.example", "Hello", None),
            Err(Rejection::BlockedSender("no-reply".to_string()))
        );
    }

    #[test]
    fn test_blocked_domain_part() {
        let rules = EligibilityRules::new(vec!["bounce".into()], vec![], vec![]);
        assert!(!rules.is_eligible("ops@bounce.mailer.example", "Hi", None));
    }

    #[test]
    fn test_subject_keyword_rejected() {
        let rules = EligibilityRules::default();
        assert_eq!(
            rules.check("user@example.com", "Your Weekly NEWSLETTER", None),
            Err(Rejection::BlockedSubject("newsletter".to_string()))
        );
    }

    #[test]
    fn test_auto_submitted_marker() {
        let rules = EligibilityRules::default();
        assert!(!rules.is_eligible("user@example.com", "Payment issue", Some("Auto-Replied")));
        assert!(rules.is_eligible("user@example.com", "Payment issue", Some("no")));
    }

    #[test]
    fn test_substring_not_regex() {
        let rules = EligibilityRules::new(vec!["a.b".into()], vec![], vec![]);
        assert!(rules.is_eligible("axb@example.com", "Hi", None));
        assert!(!rules.is_eligible("a.b@example.com", "Hi", None));
    }

    #[test]
    fn test_empty_patterns_ignored() {
        let rules = EligibilityRules::new(vec!["".into(), "  ".into()], vec!["".into()], vec![]);
        assert!(rules.is_eligible("user@example.com", "anything", Some("auto-generated")));
    }

    #[test]
    fn test_pure_and_order_independent() {
        let rules = EligibilityRules::default();
        let cases = [
            ("user@example.com", "Payment issue", None),
            ("postmaster@example.com", "Hi", None),
            ("user@example.com", "Security alert", None),
            ("user@example.com", "Refund", Some("auto-generated")),
        ];
        let first: Vec<bool> = cases
            .iter()
            .map(|(s, sub, m)| rules.is_eligible(s, sub, *m))
            .collect();
        let reversed: Vec<bool> = cases
            .iter()
            .rev()
            .map(|(s, sub, m)| rules.is_eligible(s, sub, *m))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        assert_eq!(first, reversed);
        assert_eq!(first, vec![true, false, false, false]);
    }
}
