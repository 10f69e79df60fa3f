//! Shared types for the mdpad backend and its HTTP clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Request Types
// =====================================================

/// Create a new pad (empty unless `content` is given)
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePadRequest {
    pub name: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Create a pad from an uploaded file
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportPadRequest {
    /// Original file name, e.g. "groceries.md"
    pub filename: String,
    pub content: String,
    /// Overrides the name derived from `filename`
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenamePadRequest {
    pub new_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectPadRequest {
    pub name: String,
}

/// Replace the editor content of the active pad
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateBufferRequest {
    pub content: String,
}

// =====================================================
// Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// =====================================================
// Domain Types
// =====================================================

/// The ordered pad list plus the current selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PadListing {
    pub pads: Vec<String>,
    pub selected: String,
}

/// Editor content of the selected pad
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveBufferView {
    pub pad: String,
    pub content: String,
    /// True when the content has edits not yet flushed to the store
    pub dirty: bool,
}

/// Everything the editor needs after a list change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub listing: PadListing,
    pub active: ActiveBufferView,
}

/// Offline cache manager status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineStatus {
    /// Version tag of the worker currently serving requests
    #[serde(default)]
    pub active_version: Option<String>,
    #[serde(default)]
    pub worker_state: Option<String>,
    pub regions: Vec<String>,
}
