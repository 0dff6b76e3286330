//! IMAP session state
//!
//! Tracks where one connection is in the protocol: pre-login, authenticated
//! with a resolved account, or with a mailbox selected.

use postbox_storage::{Account, Mailbox};

/// IMAP session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not authenticated
    NotAuthenticated,
    /// Authenticated but no mailbox selected
    Authenticated,
    /// Mailbox selected
    Selected,
    /// Session is closing
    Logout,
}

/// IMAP session
#[derive(Debug)]
pub struct ImapSession {
    pub state: SessionState,
    /// Account resolved at LOGIN; lives for the session only.
    pub account: Option<Account>,
    /// Currently selected mailbox
    pub selected: Option<Mailbox>,
}

impl ImapSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::NotAuthenticated,
            account: None,
            selected: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Selected
        )
    }

    pub fn is_selected(&self) -> bool {
        matches!(self.state, SessionState::Selected)
    }

    pub fn authenticate(&mut self, account: Account) {
        self.account = Some(account);
        self.state = SessionState::Authenticated;
    }

    pub fn select(&mut self, mailbox: Mailbox) {
        self.selected = Some(mailbox);
        self.state = SessionState::Selected;
    }

    pub fn close_mailbox(&mut self) {
        self.selected = None;
        if self.state == SessionState::Selected {
            self.state = SessionState::Authenticated;
        }
    }

    pub fn logout(&mut self) {
        self.account = None;
        self.selected = None;
        self.state = SessionState::Logout;
    }
}

impl Default for ImapSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_transitions() {
        let root = TempDir::new().unwrap();
        let account = Account::resolve("user@example.com", root.path())
            .await
            .unwrap();

        let mut session = ImapSession::new();
        assert!(!session.is_authenticated());

        session.authenticate(account);
        assert!(session.is_authenticated());
        assert!(!session.is_selected());

        let mailbox = session.account.as_ref().unwrap().select_mailbox("INBOX").unwrap();
        session.select(mailbox);
        assert!(session.is_selected());

        session.close_mailbox();
        assert!(session.is_authenticated());
        assert!(!session.is_selected());

        session.logout();
        assert_eq!(session.state, SessionState::Logout);
        assert!(session.account.is_none());
    }
}
