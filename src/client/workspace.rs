//! Health, provider, file and project endpoints.

use crate::client::core::OpencodeClient;
use crate::error::require_non_empty;
use crate::types::{FileContent, HealthResponse, Project, ProvidersResponse};
use crate::Result;
use reqwest::Method;

impl OpencodeClient {
    /// `GET /global/health`
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url(&["global", "health"])?;
        self.execute_json("GET /global/health", |t| t.request(Method::GET, url.clone()))
            .await
    }

    /// `GET /config/providers`
    pub async fn providers(&self) -> Result<ProvidersResponse> {
        let url = self.url(&["config", "providers"])?;
        self.execute_json("GET /config/providers", |t| {
            t.request(Method::GET, url.clone())
        })
        .await
    }

    /// `GET /find/file?query=`
    pub async fn find_files(&self, query: &str) -> Result<Vec<String>> {
        require_non_empty(query, "query", "transport_client")?;
        let mut url = self.url(&["find", "file"])?;
        url.query_pairs_mut().append_pair("query", query);
        self.execute_json("GET /find/file", |t| t.request(Method::GET, url.clone()))
            .await
    }

    /// `GET /file/content?path=`
    pub async fn read_file(&self, path: &str) -> Result<FileContent> {
        require_non_empty(path, "path", "transport_client")?;
        let mut url = self.url(&["file", "content"])?;
        url.query_pairs_mut().append_pair("path", path);
        self.execute_json("GET /file/content", |t| t.request(Method::GET, url.clone()))
            .await
    }

    /// `GET /project/current`
    pub async fn current_project(&self) -> Result<Project> {
        let url = self.url(&["project", "current"])?;
        self.execute_json("GET /project/current", |t| {
            t.request(Method::GET, url.clone())
        })
        .await
    }
}
