use serde::{Deserialize, Serialize};

// response for the upload endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub size: u64,
}

// progress poll payload, zero/zero for unknown sessions
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressResponse {
    pub total: u64,
    pub uploaded: u64,
}

// generic error response
#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

// query for /upload and /progress
#[derive(Deserialize, Debug, Default)]
pub struct UploadQuery {
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    /// size of the file as declared by the page script
    pub size: Option<u64>,
}

// query for /download
#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
    pub file: Option<String>,
}
