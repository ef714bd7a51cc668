use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Pending,
    Scanning,
    Completed,
    Failed,
    Cancelled,
}

/// Fixed progress checkpoints emitted during a scan, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgressEvent {
    /// 0..=100.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScanProgressEvent {
    pub fn new(progress: u8, message: impl Into<String>) -> Self {
        Self { progress, message: Some(message.into()) }
    }

    pub fn silent(progress: u8) -> Self {
        Self { progress, message: None }
    }
}
