use git2::{Oid, Repository};

use super::repository::advance_head;
use crate::errors::SandboxError;

/// `update-ref` accepts bare branch names as a convenience.
pub fn qualify_ref(name: &str) -> String {
    if name == "HEAD" || name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

fn resolve_value(repo: &Repository, value: &str) -> Result<Oid, SandboxError> {
    repo.revparse_single(value)
        .map(|object| object.id())
        .map_err(|_| SandboxError::invalid_input("", format!("fatal: '{value}': not a valid SHA1")))
}

pub fn update_ref(repo: &Repository, name: &str, value: &str) -> Result<Oid, SandboxError> {
    let name = qualify_ref(name);
    let oid = resolve_value(repo, value)?;
    if name == "HEAD" {
        advance_head(repo, oid, "update-ref")?;
    } else {
        repo.reference(&name, oid, true, "update-ref")
            .map_err(|e| SandboxError::git("update-ref", e))?;
    }
    Ok(oid)
}

pub fn delete_ref(repo: &Repository, name: &str) -> Result<(), SandboxError> {
    let name = qualify_ref(name);
    let mut reference = repo.find_reference(&name).map_err(|_| {
        SandboxError::invalid_input(
            "",
            format!("error: cannot lock ref '{name}': unable to resolve reference '{name}'"),
        )
    })?;
    reference
        .delete()
        .map_err(|e| SandboxError::git("update-ref -d", e))
}

pub fn read_symbolic_ref(repo: &Repository, name: &str, short: bool) -> Result<String, SandboxError> {
    let not_symbolic =
        || SandboxError::invalid_input("", format!("fatal: ref {name} is not a symbolic ref"));
    let reference = repo.find_reference(name).map_err(|_| not_symbolic())?;
    let target = reference.symbolic_target().ok_or_else(not_symbolic)?;
    if short {
        let trimmed = target
            .strip_prefix("refs/heads/")
            .or_else(|| target.strip_prefix("refs/remotes/"))
            .or_else(|| target.strip_prefix("refs/tags/"))
            .unwrap_or(target);
        Ok(trimmed.to_string())
    } else {
        Ok(target.to_string())
    }
}

pub fn write_symbolic_ref(repo: &Repository, name: &str, target: &str) -> Result<(), SandboxError> {
    if !target.starts_with("refs/") {
        return Err(SandboxError::invalid_input(
            "",
            format!("fatal: Refusing to point {name} outside of refs/"),
        ));
    }
    repo.reference_symbolic(name, target, true, "symbolic-ref")
        .map_err(|e| SandboxError::git("symbolic-ref", e))?;
    Ok(())
}
