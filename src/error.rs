// src/error.rs
//
// Unified error handling for tinypress
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Rejected input, recoverable by picking another file
// - CodecError: Decode/encode/resize failures
// - ResourceLimit: Size/time/dimension limits and host resource failures
// - Cancelled: Work superseded by a newer request (never shown to the user)
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// Message shown for a failed entry when the underlying error carries no text.
pub const FALLBACK_FAILURE_MESSAGE: &str = "Compression error";

/// Error taxonomy used by the pipeline to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected input, recoverable by the user
    UserError,
    /// Format/encoding issues
    CodecError,
    /// Memory/time/dimension limits
    ResourceLimit,
    /// Superseded work; silently dropped
    Cancelled,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// tinypress error types
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    // Admission Errors
    #[error("Only JPEG / PNG / WebP / GIF files are supported")]
    UnsupportedType { mime_type: Cow<'static, str> },

    #[error("File size must not exceed {limit_mb} MB")]
    FileTooLarge { size: u64, limit_mb: u64 },

    #[error("Failed to load image")]
    FileReadFailed {
        name: Cow<'static, str>,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Decode Errors
    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Operation Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Processing timed out, please retry")]
    Timeout { elapsed_ms: u64 },

    #[error("{resource} initialization failed")]
    ResourceUnavailable { resource: Cow<'static, str> },

    // State Errors
    #[error("No entry with id {id}")]
    EntryNotFound { id: u64 },

    #[error("Entry {id} is being compressed")]
    EntryBusy { id: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },

    // Generic Error
    #[error("{message}")]
    Generic { message: Cow<'static, str> },
}

// Constructor Helpers
impl PipelineError {
    pub fn unsupported_type(mime_type: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedType {
            mime_type: mime_type.into(),
        }
    }

    pub fn file_too_large(size: u64, limit: u64) -> Self {
        Self::FileTooLarge {
            size,
            limit_mb: limit / (1024 * 1024),
        }
    }

    pub fn file_read_failed(name: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            name: name.into(),
            source: Arc::new(source),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn timeout(elapsed_ms: u64) -> Self {
        Self::Timeout { elapsed_ms }
    }

    pub fn resource_unavailable(resource: impl Into<Cow<'static, str>>) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
        }
    }

    pub fn entry_not_found(id: u64) -> Self {
        Self::EntryNotFound { id }
    }

    pub fn entry_busy(id: u64) -> Self {
        Self::EntryBusy { id }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// True when the error only signals superseded work.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// Consistent with category(): UserError and ResourceLimit are recoverable
    /// (another file, a smaller image, a retry), everything else is not.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::Cancelled | ErrorCategory::InternalBug => {
                false
            }
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedType { .. }
            | Self::FileTooLarge { .. }
            | Self::InvalidArgument { .. }
            | Self::EntryNotFound { .. }
            | Self::EntryBusy { .. } => ErrorCategory::UserError,

            Self::FileReadFailed { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::Timeout { .. }
            | Self::ResourceUnavailable { .. } => ErrorCategory::ResourceLimit,

            Self::Cancelled => ErrorCategory::Cancelled,

            Self::InternalPanic { .. } | Self::Generic { .. } => ErrorCategory::InternalBug,
        }
    }

    /// Text recorded as an entry's failure reason.
    ///
    /// Never empty: an error without a message falls back to
    /// [`FALLBACK_FAILURE_MESSAGE`].
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            FALLBACK_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }
}

// Result type alias
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
