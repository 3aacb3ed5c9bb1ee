//! REST transport for the admin console API.
//!
//! Endpoints (`{parent}` is `roles` or `users`, `{items}` is `permissions`
//! or `roles` depending on the [`AssignmentKind`]):
//!
//! | Operation | Request |
//! |-----------|---------|
//! | catalog | `GET /{items}?page=0&size={page_size}` |
//! | assigned | `GET /{parent}/{id}/{items}` |
//! | add one | `POST /{parent}/{id}/{items}/{item_id}` |
//! | remove one | `DELETE /{parent}/{id}/{items}/{item_id}` |
//! | add many | `POST /{parent}/{id}/{items}` with `{"ids": [...]}` |
//! | remove many | `DELETE /{parent}/{id}/{items}` with `{"ids": [...]}` |

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{AssignmentTransport, Result};
use crate::types::{AssignableItem, AssignmentKind};

/// Catalog responses are either a bare array or a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemList {
    Page {
        content: Vec<AssignableItem>,
        #[serde(default, rename = "totalElements")]
        total_elements: Option<usize>,
    },
    Bare(Vec<AssignableItem>),
}

impl ItemList {
    /// Total reported by a page object, if any.
    fn total(&self) -> Option<usize> {
        match self {
            Self::Page { total_elements, .. } => *total_elements,
            Self::Bare(_) => None,
        }
    }

    fn into_items(self) -> Vec<AssignableItem> {
        match self {
            Self::Page { content, .. } => content,
            Self::Bare(items) => items,
        }
    }
}

#[derive(Debug, Serialize)]
struct BulkRequest<'a> {
    ids: &'a [String],
}

/// HTTP transport against the console REST API.
pub struct RestTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    kind: AssignmentKind,
    config: ClientConfig,
}

impl RestTransport {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        kind: AssignmentKind,
        config: ClientConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            kind,
            config,
        })
    }

    /// Build headers for requests.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            // Non-ASCII keys cannot be sent as a header value; skip auth.
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn catalog_url(&self) -> String {
        format!("{}/{}", self.base_url, self.kind.item_collection())
    }

    fn assignments_url(&self, parent_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.kind.parent_collection(),
            urlencoding::encode(parent_id),
            self.kind.item_collection()
        )
    }

    fn assignment_url(&self, parent_id: &str, item_id: &str) -> String {
        format!(
            "{}/{}",
            self.assignments_url(parent_id),
            urlencoding::encode(item_id)
        )
    }

    /// Send a request, mapping any non-success status to a transport error.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let resp = request.headers(self.headers()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!("HTTP {} {}", status.as_u16(), body);
            return Err(TransportError::from_status(status.as_u16(), body));
        }
        Ok(resp)
    }

    async fn fetch_list(&self, request: RequestBuilder) -> Result<ItemList> {
        let resp = self.send(request).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AssignmentTransport for RestTransport {
    /// Follows further pages while a page object reports more elements than
    /// have been collected. Stops at the first empty page.
    async fn fetch_catalog(&self) -> Result<Vec<AssignableItem>> {
        let url = self.catalog_url();
        let mut items = Vec::new();
        let mut page = 0usize;
        loop {
            debug!("GET {} (page {}, size {})", url, page, self.config.catalog_page_size);
            let request = self.client.get(&url).query(&[
                ("page", page.to_string()),
                ("size", self.config.catalog_page_size.to_string()),
            ]);
            let list = self.fetch_list(request).await?;
            let total = list.total();
            let content = list.into_items();
            let exhausted = content.is_empty();
            items.extend(content);
            match total {
                Some(total) if items.len() < total => {
                    if exhausted {
                        warn!(
                            "Catalog reports {} {}s but only {} were returned",
                            total,
                            self.kind.item_noun(),
                            items.len()
                        );
                        return Ok(items);
                    }
                    page += 1;
                }
                _ => return Ok(items),
            }
        }
    }

    async fn fetch_assigned(&self, parent_id: &str) -> Result<Vec<AssignableItem>> {
        let url = self.assignments_url(parent_id);
        debug!("GET {}", url);
        Ok(self.fetch_list(self.client.get(&url)).await?.into_items())
    }

    async fn add_assignment(&self, parent_id: &str, item_id: &str) -> Result<()> {
        let url = self.assignment_url(parent_id, item_id);
        debug!("POST {}", url);
        self.send(self.client.post(&url)).await?;
        Ok(())
    }

    async fn add_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()> {
        let url = self.assignments_url(parent_id);
        debug!("POST {} ({} ids)", url, item_ids.len());
        self.send(self.client.post(&url).json(&BulkRequest { ids: item_ids }))
            .await?;
        Ok(())
    }

    async fn remove_assignment(&self, parent_id: &str, item_id: &str) -> Result<()> {
        let url = self.assignment_url(parent_id, item_id);
        debug!("DELETE {}", url);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn remove_assignments(&self, parent_id: &str, item_ids: &[String]) -> Result<()> {
        let url = self.assignments_url(parent_id);
        debug!("DELETE {} ({} ids)", url, item_ids.len());
        self.send(self.client.delete(&url).json(&BulkRequest { ids: item_ids }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(kind: AssignmentKind) -> RestTransport {
        RestTransport::new("http://console.local/api/", Some("key"), kind, ClientConfig::default())
            .unwrap()
    }

    #[test]
    fn test_urls_for_permissions_on_role() {
        let t = transport(AssignmentKind::PermissionsOnRole);
        assert_eq!(t.catalog_url(), "http://console.local/api/permissions");
        assert_eq!(
            t.assignment_url("5", "12"),
            "http://console.local/api/roles/5/permissions/12"
        );
    }

    #[test]
    fn test_urls_for_roles_on_user_are_encoded() {
        let t = transport(AssignmentKind::RolesOnUser);
        assert_eq!(t.catalog_url(), "http://console.local/api/roles");
        assert_eq!(
            t.assignment_url("jane doe", "a/b"),
            "http://console.local/api/users/jane%20doe/roles/a%2Fb"
        );
    }

    #[test]
    fn test_item_list_accepts_page_or_array() {
        let page: ItemList = serde_json::from_str(r#"{"content":[{"id":1,"name":"ADMIN"}],"totalElements":3}"#).unwrap();
        assert_eq!(page.total(), Some(3));
        assert_eq!(page.into_items().len(), 1);
        let bare: ItemList = serde_json::from_str(r#"[{"id":"1","name":"ADMIN"},{"id":"2","name":"USER"}]"#).unwrap();
        assert_eq!(bare.total(), None);
        assert_eq!(bare.into_items().len(), 2);
    }
}
