use serde::Serialize;

use super::entity::SessionState;
use crate::errors::SandboxError;
use crate::shared::vpath;

const MAX_DEPTH: usize = 32;

/// Directory tree of a session filesystem as shown by the workspace view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_repository: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WorkspaceNode>,
}

pub fn workspace_tree(state: &SessionState) -> Result<WorkspaceNode, SandboxError> {
    build_node(state, vpath::ROOT, 0)
}

fn build_node(state: &SessionState, path: &str, depth: usize) -> Result<WorkspaceNode, SandboxError> {
    let mut node = WorkspaceNode {
        name: vpath::file_name(path).unwrap_or(vpath::ROOT).to_string(),
        path: path.to_string(),
        is_dir: true,
        is_repository: state.is_repo_root(path),
        children: Vec::new(),
    };
    if depth >= MAX_DEPTH {
        return Ok(node);
    }

    for entry in state.fs().list(path, true)? {
        if entry.is_dir && entry.name == ".git" {
            continue;
        }
        let child = vpath::join(path, &entry.name);
        if entry.is_dir {
            node.children.push(build_node(state, &child, depth + 1)?);
        } else {
            node.children.push(WorkspaceNode {
                name: entry.name,
                path: child,
                is_dir: false,
                is_repository: false,
                children: Vec::new(),
            });
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sessions::entity::SessionProfile;
    use crate::domains::sessions::filesystem::SessionFs;
    use crate::domains::settings::GitSettings;

    #[test]
    fn tree_hides_git_metadata_and_marks_repositories() {
        let mut state = SessionState::new(
            SessionFs::new(None).unwrap(),
            SessionProfile {
                git: GitSettings::default(),
                reflog_limit: 10,
            },
        );
        state.init_repo("/project").unwrap();
        state.fs().write("/project/readme.md", b"hi").unwrap();
        state.fs().create_dir("/notes", false).unwrap();

        let tree = workspace_tree(&state).unwrap();
        assert_eq!(tree.path, "/");
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["notes", "project"]);

        let project = &tree.children[1];
        assert!(project.is_repository);
        let files: Vec<&str> = project.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(files, vec!["/project/readme.md"]);
    }
}
