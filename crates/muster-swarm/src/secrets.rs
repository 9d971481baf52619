// ABOUTME: Opaque secret lookup used to fill credentials the config leaves empty.
// ABOUTME: EnvSecrets reads OWNER_KEY from the process environment, uppercased.

use crate::error::SwarmError;

/// `get(owner, key)` — opaque to the runtime; the store decides where
/// secrets actually live.
pub trait SecretStore: Send + Sync {
    fn get(&self, owner: &str, key: &str) -> Result<String, SwarmError>;
}

/// Environment-backed secrets: `get("openai", "api_key")` reads
/// `OPENAI_API_KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretStore for EnvSecrets {
    fn get(&self, owner: &str, key: &str) -> Result<String, SwarmError> {
        let name = format!("{owner}_{key}").to_uppercase().replace('-', "_");
        std::env::var(&name)
            .map_err(|_| SwarmError::Config(format!("secret not found: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_secrets_read_owner_key_variables() {
        // Safety: test-local variable name, no concurrent reader.
        unsafe { std::env::set_var("MUSTERTEST_API_KEY", "sk-123") };
        let value = EnvSecrets.get("mustertest", "api_key").unwrap();
        unsafe { std::env::remove_var("MUSTERTEST_API_KEY") };
        assert_eq!(value, "sk-123");
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let err = EnvSecrets.get("nosuch", "api_key").unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
        assert!(err.to_string().contains("NOSUCH_API_KEY"));
    }
}
