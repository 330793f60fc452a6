//! GitLab REST client for listing group projects

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use super::Project;
use crate::error::SyncError;

const PER_PAGE: &str = "100";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GitLabClient {
    api_url: Url,
    client: Client,
}

impl GitLabClient {
    /// `api_url` is the instance root, e.g. `https://gitlab.example.com`.
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, SyncError> {
        let api_url = Url::parse(api_url)
            .map_err(|error| SyncError::Configuration(format!("invalid GitLab api_url {api_url}: {error}")))?;
        if api_url.cannot_be_a_base() {
            return Err(SyncError::Configuration(format!("invalid GitLab api_url {api_url}")));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&token)
                .map_err(|_| SyncError::Configuration("GitLab token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert("PRIVATE-TOKEN", value);
        }

        let client = Client::builder()
            .user_agent(format!("mirrorsync/{}", crate::VERSION))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| SyncError::Environment(format!("failed to build HTTP client: {error}")))?;

        Ok(Self { api_url, client })
    }

    /// `<api>/api/v4/groups/<group>/projects`; a group path's slashes are percent-encoded.
    fn projects_url(&self, group: &str) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "v4", "groups", group, "projects"]);
        }
        url
    }

    /// Every project in `group` and its subgroups, sorted by path.
    pub async fn group_projects(&self, group: &str) -> Result<Vec<Project>, SyncError> {
        let url = self.projects_url(group);
        let mut projects = Vec::new();
        let mut page = String::from("1");

        loop {
            tracing::debug!("Listing {} page {}", url, page);
            let response = self
                .client
                .get(url.clone())
                .query(&[("include_subgroups", "true"), ("per_page", PER_PAGE), ("page", page.as_str())])
                .send()
                .await
                .map_err(|error| SyncError::Environment(format!("GitLab request to {} failed: {error}", self.api_url)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status, group));
            }

            let next = response
                .headers()
                .get("x-next-page")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string);

            let batch: Vec<Project> = response
                .json()
                .await
                .map_err(|error| SyncError::Environment(format!("unexpected GitLab response for group {group}: {error}")))?;
            let exhausted = batch.is_empty();
            projects.extend(batch);

            match next {
                Some(next) if !exhausted => page = next,
                _ => break,
            }
        }

        projects.sort_by(|a, b| a.path_with_namespace.cmp(&b.path_with_namespace));
        Ok(projects)
    }
}

/// Access problems are fixed in configuration; anything else is the server's.
fn status_error(status: StatusCode, group: &str) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Configuration(format!("GitLab refused access to group {group} ({status}); check token_env"))
        }
        StatusCode::NOT_FOUND => SyncError::Configuration(format!("GitLab group {group} not found")),
        _ => SyncError::Environment(format!("GitLab answered {status} for group {group}")),
    }
}
