use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use reqwest::header::{AUTHORIZATION, LOCATION};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{Category, EntityType, Entry, EntryPatch, Notebook, Upload, User};
use crate::{Error, Result};

/// How many entries a listing asks for; the service pages at 15 by default.
const LIST_LIMIT: usize = 9999;

/// Blocking client for the eLabFTW v2 REST API.
#[derive(Debug, Clone)]
pub struct ElabClient {
    http: Client,
    base: String,
    api_key: String,
}

impl ElabClient {
    /// `host` is the API root, e.g. `https://elab.example/api/v2`.
    pub fn new(host: &str, api_key: &str, verify_tls: bool) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("elablog/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(Self {
            http,
            base: host.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Send with credentials and turn non-success statuses into [`Error::Api`].
    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.header(AUTHORIZATION, self.api_key.as_str()).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let resp = self.send(self.http.get(self.url(path)))?;
        let text = resp.text()?;
        Ok(serde_json::from_str(&text)?)
    }

    fn newest_untitled(&self, entity: EntityType) -> Result<i64> {
        self.list_entries(entity)?
            .into_iter()
            .filter(|e| e.title == "Untitled")
            .map(|e| e.id)
            .max()
            .ok_or_else(|| Error::NotFound(format!("newly created {entity}")))
    }
}

/// The id at the end of a `Location` header such as `https://host/api/v2/experiments/42`.
pub(crate) fn id_from_location(location: &str) -> Option<i64> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|id| id.parse().ok())
}

impl Notebook for ElabClient {
    fn list_entries(&self, entity: EntityType) -> Result<Vec<Entry>> {
        self.get_json(&format!("{}?limit={LIST_LIMIT}", entity.path()))
    }

    fn get_entry(&self, entity: EntityType, id: i64) -> Result<Entry> {
        self.get_json(&format!("{}/{id}", entity.path()))
    }

    fn create_entry(&self, entity: EntityType, category: Option<i64>) -> Result<i64> {
        let payload = match category {
            Some(c) => serde_json::json!({ "category": c }),
            None => serde_json::json!({}),
        };
        let resp = self.send(self.http.post(self.url(entity.path())).json(&payload))?;
        let id = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(id_from_location);
        let id = match id {
            Some(id) => id,
            None => self.newest_untitled(entity)?,
        };
        info!(%entity, id, "created entry");
        Ok(id)
    }

    fn patch_entry(&self, entity: EntityType, id: i64, patch: &EntryPatch) -> Result<()> {
        info!(%entity, id, "patching entry");
        self.send(
            self.http
                .patch(self.url(&format!("{}/{id}", entity.path())))
                .json(patch),
        )?;
        Ok(())
    }

    fn me(&self) -> Result<User> {
        self.get_json("users/me")
    }

    fn user(&self, id: i64) -> Result<User> {
        self.get_json(&format!("users/{id}"))
    }

    fn experiment_categories(&self, team: i64) -> Result<Vec<Category>> {
        self.get_json(&format!("teams/{team}/experiments_categories"))
    }

    fn resource_categories(&self) -> Result<Vec<Category>> {
        self.get_json("items_types")
    }

    fn link_item(&self, experiment: i64, item: i64) -> Result<()> {
        info!(experiment, item, "linking item");
        self.send(
            self.http
                .post(self.url(&format!("experiments/{experiment}/items_links/{item}")))
                .json(&serde_json::json!({})),
        )?;
        Ok(())
    }

    fn unlink_item(&self, experiment: i64, item: i64) -> Result<()> {
        info!(experiment, item, "unlinking item");
        self.send(
            self.http
                .delete(self.url(&format!("experiments/{experiment}/items_links/{item}"))),
        )?;
        Ok(())
    }

    fn upload_file(&self, entity: EntityType, id: i64, path: &Path, comment: &str) -> Result<()> {
        info!(%entity, id, path = %path.display(), "uploading file");
        let form = multipart::Form::new()
            .text("comment", comment.to_string())
            .file("file", path)?;
        self.send(
            self.http
                .post(self.url(&format!("{}/{id}/uploads", entity.path())))
                .multipart(form),
        )?;
        Ok(())
    }

    fn uploads(&self, entity: EntityType, id: i64) -> Result<Vec<Upload>> {
        self.get_json(&format!("{}/{id}/uploads", entity.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_header_id() {
        assert_eq!(
            id_from_location("https://elab.example/api/v2/experiments/42"),
            Some(42)
        );
        assert_eq!(id_from_location("/api/v2/items/7/"), Some(7));
        assert_eq!(id_from_location("https://elab.example/api/v2/items"), None);
    }

    #[test]
    fn urls_join_cleanly() -> anyhow::Result<()> {
        let client = ElabClient::new("https://elab.example/api/v2/", " key \n", false)?;
        assert_eq!(client.url("users/me"), "https://elab.example/api/v2/users/me");
        assert_eq!(client.api_key, "key");
        Ok(())
    }
}
