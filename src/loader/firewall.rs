// src/loader/firewall.rs
//
// Admission checks applied before any bytes are read, plus the dimension
// limits enforced once the header has been probed.

use super::source::FileLike;
use super::{MAX_DIMENSION, MAX_PIXELS};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

#[derive(Clone, Debug)]
pub struct AdmissionFirewall {
    pub max_file_size: u64,
    pub supported_types: Vec<String>,
}

impl Default for AdmissionFirewall {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl AdmissionFirewall {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            supported_types: config.supported_types.clone(),
        }
    }

    /// Type first, then size.
    pub fn check(&self, file: &FileLike) -> PipelineResult<()> {
        self.enforce_type(&file.mime_type)?;
        self.enforce_size(file.size)
    }

    pub fn enforce_type(&self, mime_type: &str) -> PipelineResult<()> {
        if self
            .supported_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(mime_type))
        {
            Ok(())
        } else {
            Err(PipelineError::unsupported_type(mime_type.to_string()))
        }
    }

    pub fn enforce_size(&self, size: u64) -> PipelineResult<()> {
        if size > self.max_file_size {
            return Err(PipelineError::file_too_large(size, self.max_file_size));
        }
        Ok(())
    }
}

/// Reject images whose decoded buffer would be unreasonably large.
pub fn check_dimensions(width: u32, height: u32) -> PipelineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(PipelineError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(PipelineError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}
