// ABOUTME: Agent selector parsing: "@coder fix the test" names an agent, the rest is the query.
// ABOUTME: Used by the CLI before handing the request to the swarm.

/// Split an optional leading `@agent` selector off the input.
pub fn parse_selector(input: &str) -> (Option<String>, String) {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix('@') else {
        return (None, trimmed.to_string());
    };

    match rest.split_once(char::is_whitespace) {
        Some((name, query)) if !name.is_empty() => {
            (Some(name.to_string()), query.trim().to_string())
        }
        Some(_) => (None, trimmed.to_string()),
        None if !rest.is_empty() => (Some(rest.to_string()), String::new()),
        None => (None, trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_splits_agent_and_query() {
        assert_eq!(
            parse_selector("@code fix the tests"),
            (Some("code".to_string()), "fix the tests".to_string())
        );
    }

    #[test]
    fn plain_input_has_no_selector() {
        assert_eq!(parse_selector("what is 2+2?"), (None, "what is 2+2?".to_string()));
    }

    #[test]
    fn bare_selector_keeps_empty_query() {
        assert_eq!(parse_selector("@ask"), (Some("ask".to_string()), String::new()));
    }

    #[test]
    fn lone_at_sign_is_not_a_selector() {
        assert_eq!(parse_selector("@ hello"), (None, "@ hello".to_string()));
        assert_eq!(parse_selector("@"), (None, "@".to_string()));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            parse_selector("  @sql   show tables  "),
            (Some("sql".to_string()), "show tables".to_string())
        );
    }
}
