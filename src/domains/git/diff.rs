use git2::{Delta, Diff, DiffFormat, Patch};
use serde::Serialize;

use crate::errors::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Typechange,
}

impl FileStatus {
    fn from_delta(delta: Delta) -> Self {
        match delta {
            Delta::Added | Delta::Untracked => FileStatus::Added,
            Delta::Deleted => FileStatus::Deleted,
            Delta::Renamed | Delta::Copied => FileStatus::Renamed,
            Delta::Typechange => FileStatus::Typechange,
            _ => FileStatus::Modified,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffLine {
    /// `+`, `-` or ` `, as in unified diff output.
    pub origin: char,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hunk {
    pub header: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDelta {
    pub path: String,
    pub status: FileStatus,
    pub hunks: Vec<Hunk>,
    pub additions: usize,
    pub deletions: usize,
    pub binary: bool,
}

/// Structured view of a tree-to-tree diff plus its unified patch text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub files: Vec<FileDelta>,
    pub patch: String,
}

impl DiffReport {
    pub fn from_diff(diff: &Diff<'_>) -> Result<Self, SandboxError> {
        let mut files = Vec::with_capacity(diff.deltas().len());

        for (idx, delta) in diff.deltas().enumerate() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();

            let mut file = FileDelta {
                path,
                status: FileStatus::from_delta(delta.status()),
                hunks: Vec::new(),
                additions: 0,
                deletions: 0,
                binary: delta.flags().is_binary(),
            };

            if let Some(patch) =
                Patch::from_diff(diff, idx).map_err(|e| SandboxError::git("diff", e))?
            {
                file.hunks = collect_hunks(&patch)?;
                let (_, additions, deletions) =
                    patch.line_stats().map_err(|e| SandboxError::git("diff", e))?;
                file.additions = additions;
                file.deletions = deletions;
            }
            files.push(file);
        }

        Ok(Self {
            files,
            patch: render_patch(diff)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn totals(&self) -> (usize, usize) {
        self.files.iter().fold((0, 0), |(adds, dels), file| {
            (adds + file.additions, dels + file.deletions)
        })
    }

    pub fn name_only(&self) -> String {
        self.files
            .iter()
            .map(|file| format!("{}\n", file.path))
            .collect()
    }

    pub fn stat(&self) -> String {
        if self.files.is_empty() {
            return String::new();
        }

        let width = self.files.iter().map(|f| f.path.len()).max().unwrap_or(0);
        let mut out = String::new();
        for file in &self.files {
            let changes = file.additions + file.deletions;
            if file.binary {
                out.push_str(&format!(" {:<width$} | Bin\n", file.path));
            } else {
                out.push_str(&format!(
                    " {:<width$} | {changes} {}{}\n",
                    file.path,
                    "+".repeat(file.additions),
                    "-".repeat(file.deletions)
                ));
            }
        }

        let (additions, deletions) = self.totals();
        let count = self.files.len();
        out.push_str(&format!(
            " {count} file{} changed",
            if count == 1 { "" } else { "s" }
        ));
        if additions > 0 {
            out.push_str(&format!(
                ", {additions} insertion{}(+)",
                if additions == 1 { "" } else { "s" }
            ));
        }
        if deletions > 0 {
            out.push_str(&format!(
                ", {deletions} deletion{}(-)",
                if deletions == 1 { "" } else { "s" }
            ));
        }
        out.push('\n');
        out
    }
}

fn collect_hunks(patch: &Patch<'_>) -> Result<Vec<Hunk>, SandboxError> {
    let mut hunks = Vec::with_capacity(patch.num_hunks());
    for hunk_idx in 0..patch.num_hunks() {
        let (hunk, line_count) = patch
            .hunk(hunk_idx)
            .map_err(|e| SandboxError::git("diff hunk", e))?;
        let mut lines = Vec::with_capacity(line_count);
        for line_idx in 0..line_count {
            let line = patch
                .line_in_hunk(hunk_idx, line_idx)
                .map_err(|e| SandboxError::git("diff line", e))?;
            let origin = line.origin();
            if !matches!(origin, '+' | '-' | ' ') {
                continue;
            }
            let content = String::from_utf8_lossy(line.content());
            lines.push(DiffLine {
                origin,
                content: content.trim_end_matches(['\n', '\r']).to_string(),
            });
        }
        hunks.push(Hunk {
            header: String::from_utf8_lossy(hunk.header()).trim_end().to_string(),
            lines,
        });
    }
    Ok(hunks)
}

fn render_patch(diff: &Diff<'_>) -> Result<String, SandboxError> {
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })
    .map_err(|e| SandboxError::git("render diff", e))?;
    Ok(out)
}
