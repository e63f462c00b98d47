//! Update checks run by the feed before the bridge sees an update.
//!
//! Order matters: freshness, source chat, block list, allow list. The first
//! rejection wins.

use std::sync::Arc;

use {
    ferry_channels::{Result, Update, UpdateKind, gating},
    ferry_config::BridgeConfig,
    ferry_telegram::UpdateCheck,
    tracing::debug,
};

/// Rejects new messages older than `max_age_secs`. Edits are exempt because
/// their `date` is the original post time.
pub struct FreshnessCheck {
    max_age_secs: i64,
    now: fn() -> i64,
}

impl FreshnessCheck {
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            max_age_secs: i64::try_from(max_age_secs).unwrap_or(i64::MAX),
            now: ferry_common::time::unix_now,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }
}

impl UpdateCheck for FreshnessCheck {
    fn check(&self, update: &Update) -> Result<bool> {
        let UpdateKind::Message(msg) = &update.kind else {
            return Ok(true);
        };
        let age = (self.now)().saturating_sub(msg.date);
        if age > self.max_age_secs {
            debug!(update_id = update.id, source_id = msg.id, age, "stale message");
            return Ok(false);
        }
        Ok(true)
    }
}

/// Admits only messages posted in the configured source chat.
pub struct SourceChatCheck {
    chat_id: i64,
}

impl SourceChatCheck {
    pub fn new(chat_id: i64) -> Self {
        Self { chat_id }
    }
}

impl UpdateCheck for SourceChatCheck {
    fn check(&self, update: &Update) -> Result<bool> {
        Ok(update
            .message()
            .is_some_and(|msg| msg.chat_id == self.chat_id))
    }
}

/// Rejects senders matching the block list.
pub struct BlocklistCheck {
    patterns: Vec<String>,
}

impl BlocklistCheck {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl UpdateCheck for BlocklistCheck {
    fn check(&self, update: &Update) -> Result<bool> {
        let Some(msg) = update.message() else {
            return Ok(true);
        };
        let identities = msg.sender.identities();
        let ids: Vec<&str> = identities.iter().map(String::as_str).collect();
        if gating::is_blocked(&ids, &self.patterns) {
            debug!(update_id = update.id, sender_id = msg.sender.id, "sender blocked");
            return Ok(false);
        }
        Ok(true)
    }
}

/// When non-empty, admits only senders matching the allow list.
pub struct AllowlistCheck {
    patterns: Vec<String>,
}

impl AllowlistCheck {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl UpdateCheck for AllowlistCheck {
    fn check(&self, update: &Update) -> Result<bool> {
        let Some(msg) = update.message() else {
            return Ok(true);
        };
        let identities = msg.sender.identities();
        let ids: Vec<&str> = identities.iter().map(String::as_str).collect();
        if !gating::is_allowed(&ids, &self.patterns) {
            debug!(update_id = update.id, sender_id = msg.sender.id, "sender not allowed");
            return Ok(false);
        }
        Ok(true)
    }
}

/// The bridge's check chain, in evaluation order.
pub fn standard_checks(config: &BridgeConfig, source_chat_id: i64) -> Vec<Arc<dyn UpdateCheck>> {
    vec![
        Arc::new(FreshnessCheck::new(config.freshness_secs)),
        Arc::new(SourceChatCheck::new(source_chat_id)),
        Arc::new(BlocklistCheck::new(config.blocklist.clone())),
        Arc::new(AllowlistCheck::new(config.allowlist.clone())),
    ]
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ferry_channels::{Message, Sender},
        rstest::rstest,
    };

    const NOW: i64 = 1_000_000;

    fn fixed_now() -> i64 {
        NOW
    }

    fn update(kind: fn(Message) -> UpdateKind, date: i64, chat_id: i64, sender: Sender) -> Update {
        Update {
            id: 1,
            kind: kind(Message {
                id: 5,
                chat_id,
                date,
                sender,
                text: "hi".into(),
                ..Default::default()
            }),
        }
    }

    fn alice() -> Sender {
        Sender {
            id: 42,
            username: Some("alice".into()),
            display_name: Some("Alice".into()),
        }
    }

    #[rstest]
    #[case::fresh(NOW - 10, true)]
    #[case::at_limit(NOW - 120, true)]
    #[case::stale(NOW - 121, false)]
    fn freshness_of_new_messages(#[case] date: i64, #[case] expected: bool) {
        let check = FreshnessCheck::new(120).with_clock(fixed_now);
        let u = update(UpdateKind::Message, date, 1, alice());
        assert_eq!(check.check(&u).unwrap(), expected);
    }

    #[test]
    fn edits_are_exempt_from_freshness() {
        let check = FreshnessCheck::new(120).with_clock(fixed_now);
        let u = update(UpdateKind::EditedMessage, NOW - 86_400, 1, alice());
        assert!(check.check(&u).unwrap());
    }

    #[test]
    fn source_chat_must_match() {
        let check = SourceChatCheck::new(-100);
        assert!(check.check(&update(UpdateKind::Message, NOW, -100, alice())).unwrap());
        assert!(!check.check(&update(UpdateKind::Message, NOW, -200, alice())).unwrap());
        let other = Update {
            id: 2,
            kind: UpdateKind::Other {
                tag: "poll".into(),
            },
        };
        assert!(!check.check(&other).unwrap());
    }

    #[rstest]
    #[case::by_username(vec!["@alice"], false)]
    #[case::by_id(vec!["42"], false)]
    #[case::by_glob(vec!["ali*"], false)]
    #[case::unrelated(vec!["bob"], true)]
    #[case::empty(vec![], true)]
    fn blocklist(#[case] patterns: Vec<&str>, #[case] expected: bool) {
        let check = BlocklistCheck::new(patterns.into_iter().map(String::from).collect());
        let u = update(UpdateKind::Message, NOW, 1, alice());
        assert_eq!(check.check(&u).unwrap(), expected);
    }

    #[rstest]
    #[case::empty_admits_all(vec![], true)]
    #[case::listed(vec!["ALICE"], true)]
    #[case::not_listed(vec!["bob", "99"], false)]
    fn allowlist(#[case] patterns: Vec<&str>, #[case] expected: bool) {
        let check = AllowlistCheck::new(patterns.into_iter().map(String::from).collect());
        let u = update(UpdateKind::Message, NOW, 1, alice());
        assert_eq!(check.check(&u).unwrap(), expected);
    }

    #[test]
    fn standard_chain_order() {
        let config = BridgeConfig {
            blocklist: vec!["alice".into()],
            ..BridgeConfig::default()
        };
        let checks = standard_checks(&config, 1);
        assert_eq!(checks.len(), 4);
        let u = update(UpdateKind::Message, ferry_common::time::unix_now(), 1, alice());
        let results: Vec<bool> = checks.iter().map(|c| c.check(&u).unwrap()).collect();
        assert_eq!(results, vec![true, true, false, true]);
    }
}
