// ABOUTME: The deny/allow command policy consulted by command-executing tools before dispatch.
// ABOUTME: A non-empty allow list switches to allowlist mode; otherwise only denied names block.

/// Decides whether a command may execute. Returns the decision and a reason
/// suitable for feeding back to the model.
pub trait CommandPolicy: Send + Sync {
    fn is_allowed(&self, command: &str) -> (bool, String);
}

/// List-based policy. The allow list is consulted first; when it is
/// non-empty, anything not on it is denied. The deny list always blocks.
#[derive(Debug, Clone, Default)]
pub struct ListPolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ListPolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }
}

impl CommandPolicy for ListPolicy {
    fn is_allowed(&self, command: &str) -> (bool, String) {
        if self.allow.iter().any(|a| a == command) {
            return (true, String::new());
        }
        if self.deny.iter().any(|d| d == command) {
            return (false, format!("{command} is deny-listed"));
        }
        if !self.allow.is_empty() {
            return (false, format!("{command} is not on the allow list"));
        }
        (true, String::new())
    }
}

/// Permits everything. For tests and unrestricted setups.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CommandPolicy for AllowAll {
    fn is_allowed(&self, _command: &str) -> (bool, String) {
        (true, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_blocks_with_reason() {
        let policy = ListPolicy::new(vec![], vec!["rm".into(), "shutdown".into()]);
        let (ok, reason) = policy.is_allowed("rm");
        assert!(!ok);
        assert!(reason.contains("deny-listed"));

        let (ok, _) = policy.is_allowed("ls");
        assert!(ok, "unlisted commands pass when allow list is empty");
    }

    #[test]
    fn non_empty_allow_list_switches_to_allowlist_mode() {
        let policy = ListPolicy::new(vec!["git".into()], vec![]);
        assert!(policy.is_allowed("git").0);

        let (ok, reason) = policy.is_allowed("curl");
        assert!(!ok);
        assert!(reason.contains("not on the allow list"));
    }

    #[test]
    fn allow_list_wins_over_deny_list() {
        let policy = ListPolicy::new(vec!["git".into()], vec!["git".into()]);
        assert!(policy.is_allowed("git").0);
    }

    #[test]
    fn allow_all_permits_everything() {
        assert!(AllowAll.is_allowed("rm").0);
    }
}
