//! The boundary between the discovery engine and the inventory API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::http::HttpError;

/// One WorkSpace as returned by `DescribeWorkspaces`.
///
/// Every attribute except the identifier may be missing, `None` is kept
/// distinct from an empty string. Attributes of an unexpected type decode
/// as `None` rather than failing the page.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryRecord {
    pub workspace_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subnet_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub directory_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub bundle_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_properties")]
    pub workspace_properties: Option<WorkspaceProperties>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WorkspaceProperties {
    #[serde(default, deserialize_with = "lenient_string")]
    pub compute_type_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub running_mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub root_volume_size_gib: Option<i64>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub user_volume_size_gib: Option<i64>,
}

/// A page of records plus the cursor of the next page, if any.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Page {
    #[serde(rename = "Workspaces", default, deserialize_with = "records")]
    pub records: Vec<InventoryRecord>,
    #[serde(rename = "NextToken", default, deserialize_with = "lenient_string")]
    pub next_token: Option<String>,
}

/// Records without an identifier are skipped, one bad record must not cost
/// the rest of the page.
fn records<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<InventoryRecord>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();

    let records = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<InventoryRecord>(value) {
            Ok(record) if record.workspace_id.is_empty() => {
                warn!(message = "skip workspace with empty id");
                None
            }
            Ok(record) => Some(record),
            Err(err) => {
                warn!(message = "skip malformed workspace", %err);
                None
            }
        })
        .collect();

    Ok(records)
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(value) => Some(value),
        _ => None,
    })
}

fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|size| size.is_finite() && size.fract() == 0.0)
                .map(|size| size as i64)
        }),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_properties<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<WorkspaceProperties>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.next_token.as_deref().is_some_and(|token| !token.is_empty())
    }
}

/// Failures while paging the inventory, all of them are transient from the
/// engine's point of view: the poll is skipped and retried on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("unexpected status code {status}: {body}")]
    UnexpectedStatus {
        status: http::StatusCode,
        body: String,
    },
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("decode response failed, {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// Fetch one page, `cursor` is `None` for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, FetchError>;
}

#[async_trait]
impl<T: Inventory + ?Sized> Inventory for Arc<T> {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        (**self).fetch_page(cursor).await
    }
}
