use crate::errors::SandboxError;

pub const MAX_REMOTE_NAME_LEN: usize = 64;

/// Shared remote names double as directory names under the data root.
pub fn validate_remote_name(name: &str) -> Result<(), SandboxError> {
    let reject = |reason: String| {
        Err(SandboxError::InvalidRemoteName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("name must not be empty".to_string());
    }
    if name.len() > MAX_REMOTE_NAME_LEN {
        return reject(format!("name exceeds {MAX_REMOTE_NAME_LEN} characters"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return reject("name must not start with '.' or '-'".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return reject(format!("character '{bad}' is not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["repo-A", "repo-B", "team_1.shared", "x"] {
            assert!(validate_remote_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "bad name!", "../escape", ".hidden", "-flag", "a/b"] {
            let err = validate_remote_name(name).unwrap_err();
            assert!(
                err.to_string().contains("invalid repository name"),
                "unexpected error for {name:?}: {err}"
            );
        }
        assert!(validate_remote_name(&"a".repeat(65)).is_err());
    }
}
