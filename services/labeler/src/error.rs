use thiserror::Error;

/// Errors produced while ingesting images or serving query/delete requests.
///
/// Everything except [`Error::UnrecognizedAction`] is a soft failure on the
/// ingestion path: it is logged and counted by the pipeline, never propagated
/// past a single record.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to fetch {bucket}/{key}: {message}")]
    Fetch {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Label service call failed for {bucket}/{key}: {message}")]
    LabelService {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to write {key} to {store}: {message}")]
    StoreWrite {
        store: String,
        key: String,
        message: String,
    },

    #[error("Failed to delete {key} from {store}: {message}")]
    StoreDelete {
        store: String,
        key: String,
        message: String,
    },

    #[error("Failed to read {key} from {store}: {message}")]
    StoreRead {
        store: String,
        key: String,
        message: String,
    },

    #[error("Action not detected or recognised: {0}")]
    UnrecognizedAction(String),

    #[error("Invalid object key encoding: {0}")]
    KeyDecode(String),

    #[error("Image processing failed for {key}: {message}")]
    Image { key: String, message: String },

    #[error("Temporary storage error: {0}")]
    TempStorage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short machine-readable code used in API error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Fetch { .. } => "FETCH_ERROR",
            Error::LabelService { .. } => "LABEL_SERVICE_ERROR",
            Error::StoreWrite { .. } => "STORE_WRITE_ERROR",
            Error::StoreDelete { .. } => "STORE_DELETE_ERROR",
            Error::StoreRead { .. } => "STORE_READ_ERROR",
            Error::UnrecognizedAction(_) => "UNRECOGNIZED_ACTION",
            Error::KeyDecode(_) => "KEY_DECODE_ERROR",
            Error::Image { .. } => "IMAGE_ERROR",
            Error::TempStorage(_) => "TEMP_STORAGE_ERROR",
        }
    }
}
