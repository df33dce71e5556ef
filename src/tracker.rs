use crate::models::{GlobalSettings, TrackerConfig, TrackerPlatform};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, header};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

const GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// Issue fields surfaced to the incidents endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetails {
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueComment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct NewIssue<'a> {
    title: &'a str,
    body: &'a str,
    assignees: &'a [String],
}

// GitHub and Gitea speak the same issue shape on the wire.
#[derive(Deserialize)]
struct WireIssue {
    number: u64,
    title: String,
    html_url: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WireComment {
    body: String,
    created_at: DateTime<Utc>,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireUser {
    login: String,
}

/// The configured tracker platform, selected once per configuration load.
/// All incident logic goes through this capability; nothing downstream
/// branches on the platform.
#[derive(Debug, Clone)]
pub enum IssueTracker {
    GitHub(GitHubClient),
    Gitea(GiteaClient),
}

impl IssueTracker {
    /// Builds the configured client, if any. Tokens come from the
    /// environment (`GITHUB_TOKEN` / `GITEA_TOKEN`).
    pub fn from_settings(client: &Client, settings: &GlobalSettings) -> Option<Self> {
        let config = settings.tracker.as_ref()?;
        match config.platform {
            TrackerPlatform::Github => {
                Some(Self::GitHub(GitHubClient::new(client.clone(), config)))
            }
            TrackerPlatform::Gitea => {
                let Some(base_url) = config.base_url.clone() else {
                    warn!("Gitea tracker configured without baseUrl; incidents disabled");
                    return None;
                };
                Some(Self::Gitea(GiteaClient::new(client.clone(), config, base_url)))
            }
        }
    }

    pub async fn create_issue(&self, title: &str, body: &str) -> reqwest::Result<u64> {
        match self {
            Self::GitHub(client) => client.create_issue(title, body).await,
            Self::Gitea(client) => client.create_issue(title, body).await,
        }
    }

    pub async fn get_issue(&self, number: u64) -> reqwest::Result<IssueDetails> {
        match self {
            Self::GitHub(client) => client.get_issue(number).await,
            Self::Gitea(client) => client.get_issue(number).await,
        }
    }

    pub async fn list_comments(&self, number: u64) -> reqwest::Result<Vec<IssueComment>> {
        match self {
            Self::GitHub(client) => client.list_comments(number).await,
            Self::Gitea(client) => client.list_comments(number).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    owner: String,
    repo: String,
    token: Option<String>,
    assignees: Vec<String>,
}

impl GitHubClient {
    fn new(client: Client, config: &TrackerConfig) -> Self {
        Self {
            client,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: env::var("GITHUB_TOKEN").ok(),
            assignees: config.assignees.clone(),
        }
    }

    fn issues_url(&self) -> String {
        format!(
            "{GITHUB_API_BASE_URL}/repos/{}/{}/issues",
            self.owner, self.repo
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn create_issue(&self, title: &str, body: &str) -> reqwest::Result<u64> {
        let issue: WireIssue = self
            .authorize(self.client.post(self.issues_url()))
            .json(&NewIssue {
                title,
                body,
                assignees: &self.assignees,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(issue.number)
    }

    async fn get_issue(&self, number: u64) -> reqwest::Result<IssueDetails> {
        let issue: WireIssue = self
            .authorize(self.client.get(format!("{}/{number}", self.issues_url())))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(IssueDetails {
            title: issue.title,
            url: issue.html_url,
            created_at: issue.created_at,
        })
    }

    async fn list_comments(&self, number: u64) -> reqwest::Result<Vec<IssueComment>> {
        let comments: Vec<WireComment> = self
            .authorize(
                self.client
                    .get(format!("{}/{number}/comments", self.issues_url())),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(comments.into_iter().map(IssueComment::from_wire).collect())
    }
}

#[derive(Debug, Clone)]
pub struct GiteaClient {
    client: Client,
    base_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    assignees: Vec<String>,
}

impl GiteaClient {
    fn new(client: Client, config: &TrackerConfig, base_url: String) -> Self {
        Self {
            client,
            base_url,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: env::var("GITEA_TOKEN").ok(),
            assignees: config.assignees.clone(),
        }
    }

    fn issues_url(&self) -> String {
        format!(
            "{}/api/v1/repos/{}/{}/issues",
            self.base_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn create_issue(&self, title: &str, body: &str) -> reqwest::Result<u64> {
        let issue: WireIssue = self
            .authorize(self.client.post(self.issues_url()))
            .json(&NewIssue {
                title,
                body,
                assignees: &self.assignees,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(issue.number)
    }

    async fn get_issue(&self, number: u64) -> reqwest::Result<IssueDetails> {
        let issue: WireIssue = self
            .authorize(self.client.get(format!("{}/{number}", self.issues_url())))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(IssueDetails {
            title: issue.title,
            url: issue.html_url,
            created_at: issue.created_at,
        })
    }

    async fn list_comments(&self, number: u64) -> reqwest::Result<Vec<IssueComment>> {
        let comments: Vec<WireComment> = self
            .authorize(
                self.client
                    .get(format!("{}/{number}/comments", self.issues_url())),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(comments.into_iter().map(IssueComment::from_wire).collect())
    }
}

impl IssueComment {
    fn from_wire(comment: WireComment) -> Self {
        Self {
            author: comment.user.login,
            body: comment.body,
            created_at: comment.created_at,
        }
    }
}
