//! Repository discovery
//!
//! `[[groups]]` entries name a GitLab group instead of single repositories.
//! Before any task is built, every group is listed through the GitLab API
//! (subgroups included) and each selected project becomes an ordinary
//! [`RepoConfig`]. Discovery only reads; destination groups and projects
//! must already exist.

use anyhow::Result;
use serde::Deserialize;

use crate::config::{GroupConfig, RepoConfig, read_token};

mod gitlab;

pub use gitlab::GitLabClient;

/// The fields of a GitLab project mirrorsync uses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub path_with_namespace: String,
    pub http_url_to_repo: String,
    #[serde(default)]
    pub archived: bool,
}

/// Expand every group into repository entries, in group order then project path order.
pub async fn expand_groups(groups: &[GroupConfig]) -> Result<Vec<RepoConfig>> {
    let mut repos = Vec::new();
    for group in groups {
        let token = group.token_env.as_deref().map(read_token).transpose()?;
        let client = GitLabClient::new(&group.api_url, token)?;
        let projects = client.group_projects(&group.group).await?;

        let before = repos.len();
        repos.extend(projects.iter().filter(|project| group.selects(project)).map(|project| group.repo_for(project)));
        tracing::info!(
            "Group {} at {}: {} projects, {} selected",
            group.group,
            group.api_url,
            projects.len(),
            repos.len() - before
        );
    }
    Ok(repos)
}
