//! Drive REST client over `reqwest`.

use super::api::{DriveApi, DriveObject, MetadataPatch, FOLDER_MIME, NOTE_MIME};
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Drive upload API base URL
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const OBJECT_FIELDS: &str = "id,name,mimeType,parents,modifiedTime";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveObjectList {
    #[serde(default)]
    files: Vec<DriveObject>,
    next_page_token: Option<String>,
}

/// HTTP implementation of [`DriveApi`]
#[derive(Debug, Clone)]
pub struct HttpDriveApi {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl HttpDriveApi {
    pub fn new(api_base: impl Into<String>, upload_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn authorized(&self, builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", token))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, StorageError> {
        let response = builder.send().await?;
        check_status(response, what).await
    }

    async fn list_query(&self, token: &str, query: &str) -> Result<Vec<DriveObject>, StorageError> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;
        let fields = format!("files({}),nextPageToken", OBJECT_FIELDS);

        loop {
            let mut params = vec![
                ("q", query.to_string()),
                ("fields", fields.clone()),
                ("pageSize", "1000".to_string()),
            ];
            if let Some(ref page) = page_token {
                params.push(("pageToken", page.clone()));
            }

            let request = self
                .client
                .get(format!("{}/files", self.api_base))
                .query(&params);
            let response = self.send(self.authorized(request, token), query).await?;
            let list: DriveObjectList = response.json().await?;
            all.extend(list.files);

            match list.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check_status(response: Response, what: &str) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} ({}): {}", what, status, body.trim());
    Err(match status {
        StatusCode::UNAUTHORIZED => StorageError::AuthRequired(message),
        StatusCode::FORBIDDEN => StorageError::PermissionDenied(message),
        StatusCode::NOT_FOUND => StorageError::NotFound(message),
        StatusCode::CONFLICT => StorageError::NameConflict(message),
        _ => StorageError::BackendUnavailable(message),
    })
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn quote_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Body of a `multipart/related` upload: JSON metadata part, then the raw content.
pub fn multipart_related_body(boundary: &str, metadata: &serde_json::Value, content: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}; charset=UTF-8\r\n\r\n", NOTE_MIME).as_bytes());
    body.extend_from_slice(content.as_bytes());
    body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());
    body
}

fn boundary() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    format!("notestore_{:x}", nanos)
}

#[async_trait]
impl DriveApi for HttpDriveApi {
    async fn find_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<Option<DriveObject>, StorageError> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and '{}' in parents and trashed = false",
            quote_query_value(name),
            FOLDER_MIME,
            quote_query_value(parent)
        );
        let wanted = name.to_lowercase();
        Ok(self
            .list_query(token, &query)
            .await?
            .into_iter()
            .find(|o| o.name.to_lowercase() == wanted))
    }

    async fn list_children(
        &self,
        token: &str,
        parent: &str,
    ) -> Result<Vec<DriveObject>, StorageError> {
        let query = format!(
            "'{}' in parents and trashed = false",
            quote_query_value(parent)
        );
        self.list_query(token, &query).await
    }

    async fn download(&self, token: &str, object_id: &str) -> Result<String, StorageError> {
        let request = self
            .client
            .get(format!("{}/files/{}", self.api_base, object_id))
            .query(&[("alt", "media")]);
        let response = self.send(self.authorized(request, token), object_id).await?;
        Ok(response.text().await?)
    }

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: &str,
    ) -> Result<DriveObject, StorageError> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent],
        });
        let request = self
            .client
            .post(format!("{}/files", self.api_base))
            .query(&[("fields", OBJECT_FIELDS)])
            .json(&metadata);
        let response = self.send(self.authorized(request, token), name).await?;
        let object: DriveObject = response.json().await?;
        debug!(name, object_id = %object.id, "Created cloud folder");
        Ok(object)
    }

    async fn create_file(
        &self,
        token: &str,
        name: &str,
        parent: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": NOTE_MIME,
            "parents": [parent],
        });
        let boundary = boundary();
        let body = multipart_related_body(&boundary, &metadata, content);
        let request = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", OBJECT_FIELDS)])
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);
        let response = self.send(self.authorized(request, token), name).await?;
        let object: DriveObject = response.json().await?;
        debug!(name, object_id = %object.id, "Uploaded cloud file");
        Ok(object)
    }

    async fn update_media(
        &self,
        token: &str,
        object_id: &str,
        content: &str,
    ) -> Result<DriveObject, StorageError> {
        let request = self
            .client
            .patch(format!("{}/files/{}", self.upload_base, object_id))
            .query(&[("uploadType", "media"), ("fields", OBJECT_FIELDS)])
            .header(CONTENT_TYPE, NOTE_MIME)
            .body(content.to_string());
        let response = self.send(self.authorized(request, token), object_id).await?;
        Ok(response.json().await?)
    }

    async fn patch_metadata(
        &self,
        token: &str,
        object_id: &str,
        patch: &MetadataPatch,
    ) -> Result<DriveObject, StorageError> {
        let mut params = vec![("fields", OBJECT_FIELDS.to_string())];
        if let Some(ref parent) = patch.add_parent {
            params.push(("addParents", parent.clone()));
        }
        if let Some(ref parent) = patch.remove_parent {
            params.push(("removeParents", parent.clone()));
        }
        let mut body = serde_json::Map::new();
        if let Some(ref name) = patch.name {
            body.insert("name".to_string(), serde_json::Value::String(name.clone()));
        }

        let request = self
            .client
            .patch(format!("{}/files/{}", self.api_base, object_id))
            .query(&params)
            .json(&serde_json::Value::Object(body));
        let response = self.send(self.authorized(request, token), object_id).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, token: &str, object_id: &str) -> Result<(), StorageError> {
        let request = self
            .client
            .delete(format!("{}/files/{}", self.api_base, object_id));
        self.send(self.authorized(request, token), object_id).await?;
        Ok(())
    }
}
