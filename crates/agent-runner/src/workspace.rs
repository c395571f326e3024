//! Per-assignment workspace directories

use std::path::{Path, PathBuf};

use tracing::debug;

use boss_core::work_item::{WorkItem, WorkItemId};

use crate::error::Result;
use crate::pool::AgentId;

/// File the worker reads its task from
pub const INSTRUCTIONS_FILE: &str = "INSTRUCTIONS.md";

/// Lays out and prepares workspace directories under a root
#[derive(Debug, Clone)]
pub struct WorkspaceProvisioner {
    root: PathBuf,
}

impl WorkspaceProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one (agent, work item) assignment
    pub fn workspace_for(&self, agent_id: AgentId, work_item_id: WorkItemId) -> PathBuf {
        self.root
            .join(format!("agent-{}", agent_id))
            .join(format!("work-item-{}", work_item_id))
    }

    /// Create `path` if needed and (over)write the instructions file in it
    pub async fn prepare(&self, path: &Path, instructions: &str) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        tokio::fs::write(path.join(INSTRUCTIONS_FILE), instructions).await?;
        debug!("Prepared workspace {:?}", path);
        Ok(())
    }
}

/// Render the Markdown brief handed to a worker
///
/// `work_item` may be absent when the pool is driven directly by id.
pub fn render_instructions(
    agent_id: AgentId,
    agent_name: &str,
    work_item_id: WorkItemId,
    work_item: Option<&WorkItem>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Work item {}\n\n", work_item_id));
    out.push_str(&format!(
        "You are agent {} (\"{}\").\n\n",
        agent_id, agent_name
    ));

    if let Some(item) = work_item {
        out.push_str(&format!("## {}\n\n", item.title));
        out.push_str(&format!("Priority: {}\n\n", item.priority.as_str()));
        if let Some(description) = item.description.as_deref().filter(|d| !d.trim().is_empty()) {
            out.push_str(description.trim_end());
            out.push_str("\n\n");
        }
    }

    out.push_str("Use the current directory for all file operations.\n");
    out.push_str("Type \"exit\" when the work is done.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use boss_core::work_item::{NewWorkItem, WorkItemPriority};
    use tempfile::TempDir;

    #[test]
    fn test_workspace_layout() {
        let provisioner = WorkspaceProvisioner::new("/srv/workspaces");
        assert_eq!(
            provisioner.workspace_for(3, 12),
            PathBuf::from("/srv/workspaces/agent-3/work-item-12")
        );
    }

    #[tokio::test]
    async fn test_prepare_creates_directory_and_instructions() {
        let temp = TempDir::new().unwrap();
        let provisioner = WorkspaceProvisioner::new(temp.path());
        let path = provisioner.workspace_for(1, 1);

        provisioner.prepare(&path, "do the thing").await.unwrap();

        assert!(path.is_dir());
        let written = std::fs::read_to_string(path.join(INSTRUCTIONS_FILE)).unwrap();
        assert_eq!(written, "do the thing");
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let provisioner = WorkspaceProvisioner::new(temp.path());
        let path = temp.path().join("ws");

        provisioner.prepare(&path, "first").await.unwrap();
        std::fs::write(path.join("artifact.txt"), "kept").unwrap();
        provisioner.prepare(&path, "second").await.unwrap();
        provisioner.prepare(&path, "second").await.unwrap();

        let written = std::fs::read_to_string(path.join(INSTRUCTIONS_FILE)).unwrap();
        assert_eq!(written, "second");
        assert!(path.join("artifact.txt").exists());
    }

    #[tokio::test]
    async fn test_prepare_fails_when_parent_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let provisioner = WorkspaceProvisioner::new(&blocker);

        let result = provisioner.prepare(&blocker.join("ws"), "x").await;
        assert!(matches!(result, Err(crate::OrchestratorError::Io(_))));
    }

    #[test]
    fn test_render_instructions_includes_work_item() {
        let item = NewWorkItem::new("Refactor module")
            .with_description("Split the parser")
            .with_priority(WorkItemPriority::High)
            .into_work_item(1);

        let text = render_instructions(2, "alpha", 1, Some(&item));
        assert!(text.contains("# Work item 1"));
        assert!(text.contains("agent 2 (\"alpha\")"));
        assert!(text.contains("## Refactor module"));
        assert!(text.contains("Priority: high"));
        assert!(text.contains("Split the parser"));
        assert!(text.contains("Type \"exit\""));
    }

    #[test]
    fn test_render_instructions_by_id_only() {
        let text = render_instructions(1, "beta", 8, None);
        assert!(text.starts_with("# Work item 8"));
        assert!(!text.contains("Priority"));
    }
}
