//! Supabase (PostgREST) implementation of the task store.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::TaskStore;
use super::models::{LogEntry, Task, TaskPatch};
use crate::errors::StoreError;

const TASKS_TABLE: &str = "tasks";
const APPEND_LOG_RPC: &str = "append_automation_log";
/// PostgREST error code for a function missing from the schema cache.
const FUNCTION_NOT_FOUND: &str = "PGRST202";

#[derive(Debug, Deserialize)]
struct LogRow {
    #[serde(default)]
    automation_log: Option<Vec<LogEntry>>,
}

/// Supabase client for the shared `tasks` table.
pub struct SupabaseStore {
    client: Client,
    url: String,
    service_key: String,
    /// Cleared the first time the server reports that the append function is
    /// not installed; afterwards appends use read-modify-write.
    rpc_append: AtomicBool,
}

impl SupabaseStore {
    pub fn new(url: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            rpc_append: AtomicBool::new(true),
        }
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url(), path))
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<String, StoreError> {
        let resp = builder.send().await?;
        Self::body(resp).await
    }

    async fn body(resp: Response) -> Result<String, StoreError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// Server-side append: `automation_log = automation_log || entry` in one
    /// statement. Returns `Ok(false)` when the function does not exist.
    ///
    /// The function raises `no_data_found` for an unknown task, which
    /// PostgREST also reports as 404; the body code tells the two apart.
    async fn append_via_rpc(&self, id: &str, entry: &LogEntry) -> Result<bool, StoreError> {
        let resp = self
            .request(Method::POST, &format!("rpc/{}", APPEND_LOG_RPC))
            .json(&serde_json::json!({ "task_id": id, "entry": entry }))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            let text = resp.text().await?;
            if text.contains(FUNCTION_NOT_FOUND) {
                return Ok(false);
            }
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Self::body(resp).await?;
        Ok(true)
    }

    /// Legacy protocol: read the whole log, append locally, write it back.
    /// Concurrent writers can lose entries.
    async fn append_read_modify_write(&self, id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        let mut log = self.read_log(id).await?;
        log.push(entry.clone());
        let body = serde_json::json!({
            "automation_log": log,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.send(
            self.request(Method::PATCH, TASKS_TABLE)
                .query(&[("id", format!("eq.{}", id))])
                .json(&body),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SupabaseStore {
    async fn fetch_eligible(&self) -> Result<Option<Task>, StoreError> {
        let text = self
            .send(self.request(Method::GET, TASKS_TABLE).query(&[
                ("select", "*"),
                ("automation_tag", "neq.none"),
                ("automation_status", "eq.queued"),
                ("order", "created_at.asc"),
                ("limit", "1"),
            ]))
            .await?;
        let tasks: Vec<Task> = serde_json::from_str(&text)?;
        Ok(tasks.into_iter().next())
    }

    async fn get_task(&self, id: &str) -> Result<Task, StoreError> {
        let text = self
            .send(
                self.request(Method::GET, TASKS_TABLE)
                    .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]),
            )
            .await?;
        let tasks: Vec<Task> = serde_json::from_str(&text)?;
        tasks
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn read_log(&self, id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let text = self
            .send(self.request(Method::GET, TASKS_TABLE).query(&[
                ("select", "automation_log".to_string()),
                ("id", format!("eq.{}", id)),
            ]))
            .await?;
        let rows: Vec<LogRow> = serde_json::from_str(&text)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        Ok(row.automation_log.unwrap_or_default())
    }

    async fn append_log(&self, id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        if self.rpc_append.load(Ordering::Relaxed) {
            if self.append_via_rpc(id, entry).await? {
                return Ok(());
            }
            if self.rpc_append.swap(false, Ordering::Relaxed) {
                tracing::warn!(
                    function = APPEND_LOG_RPC,
                    "atomic log append unavailable, falling back to read-modify-write"
                );
            }
        }
        self.append_read_modify_write(id, entry).await
    }

    async fn update_fields(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut body = serde_json::to_value(patch)?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert(
                "updated_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        self.send(
            self.request(Method::PATCH, TASKS_TABLE)
                .query(&[("id", format!("eq.{}", id))])
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
