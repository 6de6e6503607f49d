//! Feed topic names.
//!
//! Every endpoint of one installation shares a namespace, the account name
//! of the broker, and publishes under `<account>/feeds/<feed>`:
//!
//! ```text
//! <account>/feeds/scanner.checkcard     scanner -> authority   check request
//! <account>/feeds/scanner.action        authority -> scanner   verdict
//! <account>/feeds/scanner.setcardpass   provisioner -> authority
//! <account>/feeds/lock.open             scanner -> door
//! <account>/feeds/lock.status           door -> authority
//! ```

/// Feed carrying check requests.
pub const CHECK_CARD_FEED: &str = "scanner.checkcard";

/// Feed carrying verdicts.
pub const ACTION_FEED: &str = "scanner.action";

/// Feed carrying card registrations from the provisioning station.
pub const SET_CARD_PASS_FEED: &str = "scanner.setcardpass";

/// Feed carrying lock release triggers.
pub const LOCK_OPEN_FEED: &str = "lock.open";

/// Feed carrying door contact changes.
pub const LOCK_STATUS_FEED: &str = "lock.status";

/// Topic names for one account.
///
/// ```
/// use tapgate_protocol::Topics;
///
/// let topics = Topics::new("acme");
/// assert_eq!(topics.check_card(), "acme/feeds/scanner.checkcard");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(account: &str) -> Self {
        Self {
            prefix: format!("{}/feeds", account.trim_end_matches('/')),
        }
    }

    pub fn feed(&self, feed: &str) -> String {
        format!("{}/{feed}", self.prefix)
    }

    pub fn check_card(&self) -> String {
        self.feed(CHECK_CARD_FEED)
    }

    pub fn action(&self) -> String {
        self.feed(ACTION_FEED)
    }

    pub fn set_card_pass(&self) -> String {
        self.feed(SET_CARD_PASS_FEED)
    }

    pub fn lock_open(&self) -> String {
        self.feed(LOCK_OPEN_FEED)
    }

    pub fn lock_status(&self) -> String {
        self.feed(LOCK_STATUS_FEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_topics() {
        let topics = Topics::new("acme/");
        assert_eq!(topics.action(), "acme/feeds/scanner.action");
        assert_eq!(topics.set_card_pass(), "acme/feeds/scanner.setcardpass");
        assert_eq!(topics.lock_open(), "acme/feeds/lock.open");
        assert_eq!(topics.lock_status(), "acme/feeds/lock.status");
    }
}
