use crate::error::{Error, Result};
use crate::label_store::{LabelRecord, LabelStore};
use crate::object_store::ObjectStore;
use serde::ser::{Serialize, Serializer};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const NO_RESULTS: &str = "No results";
pub const DELETE_CONFIRMATION: &str = "Delete request successfully processed";

/// Actions accepted by the query/delete entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetLabels,
    DeleteImage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetLabels => "getLabels",
            Action::DeleteImage => "deleteImage",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "getLabels" => Ok(Action::GetLabels),
            "deleteImage" => Ok(Action::DeleteImage),
            other => Err(Error::UnrecognizedAction(other.to_string())),
        }
    }
}

/// Outcome of a query/delete request.
///
/// Serializes as the label record itself, or as a bare JSON string for the
/// sentinel and the delete confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResponse {
    Labels(LabelRecord),
    NoResults,
    Deleted,
}

impl Serialize for ServiceResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ServiceResponse::Labels(record) => record.serialize(serializer),
            ServiceResponse::NoResults => serializer.serialize_str(NO_RESULTS),
            ServiceResponse::Deleted => serializer.serialize_str(DELETE_CONFIRMATION),
        }
    }
}

/// Reads label records and removes images from all three stores
pub struct QueryService {
    label_store: Arc<dyn LabelStore>,
    object_store: Arc<dyn ObjectStore>,
    image_bucket: String,
    thumbnail_bucket: String,
}

impl QueryService {
    pub fn new(
        label_store: Arc<dyn LabelStore>,
        object_store: Arc<dyn ObjectStore>,
        image_bucket: impl Into<String>,
        thumbnail_bucket: impl Into<String>,
    ) -> Self {
        Self {
            label_store,
            object_store,
            image_bucket: image_bucket.into(),
            thumbnail_bucket: thumbnail_bucket.into(),
        }
    }

    /// Dispatch a raw action name. Unknown actions fail before any store access.
    pub async fn handle(&self, action: &str, key: &str) -> Result<ServiceResponse> {
        let action = action.parse::<Action>()?;
        Ok(self.execute(action, key).await)
    }

    /// Run a parsed action. Store failures never surface here.
    #[instrument(skip(self), fields(action = action.as_str()))]
    pub async fn execute(&self, action: Action, key: &str) -> ServiceResponse {
        match action {
            Action::GetLabels => self.get_labels(key).await,
            Action::DeleteImage => self.delete_image(key).await,
        }
    }

    async fn get_labels(&self, key: &str) -> ServiceResponse {
        match self.label_store.get(key).await {
            Ok(Some(record)) if !record.is_empty() => ServiceResponse::Labels(record),
            Ok(_) => ServiceResponse::NoResults,
            Err(e) => {
                error!(error = %e, key = %key, "Failed to read label record");
                metrics::counter!("labeler.store.errors", "op" => "get").increment(1);
                ServiceResponse::NoResults
            }
        }
    }

    async fn delete_image(&self, key: &str) -> ServiceResponse {
        // Each removal is attempted no matter how the previous one went.
        let results = [
            self.label_store.delete(key).await,
            self.object_store.delete(&self.image_bucket, key).await,
            self.object_store.delete(&self.thumbnail_bucket, key).await,
        ];

        let mut failures = 0;
        for e in results.into_iter().filter_map(|r| r.err()) {
            error!(error = %e, code = e.code(), key = %key, "Delete step failed");
            metrics::counter!("labeler.store.errors", "op" => "delete").increment(1);
            failures += 1;
        }

        info!(key = %key, failures = failures, "Delete request processed");
        ServiceResponse::Deleted
    }
}
