use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::palette::MAX_BIT_WIDTH;

/// Tunables for saving and loading worlds.
///
/// Every field has a default, so a partial JSON or TOML object is enough:
///
/// ```
/// # use voxf_core::CodecConfig;
/// let config: CodecConfig = serde_json::from_str(r#"{ "direct_threshold_bits": 6 }"#).unwrap();
/// assert_eq!(config.codec, "zstd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Block arrays whose local palette needs more bits than this are stored
    /// as raw global ids instead.
    pub direct_threshold_bits: u8,
    /// Encode and decode chunks on the rayon pool.
    pub parallel: bool,
    /// Envelope codec name, resolved by `voxf_codecs::codec_from_config`.
    pub codec: String,
    pub zstd_level: i32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            direct_threshold_bits: 8,
            parallel: true,
            codec: "zstd".to_owned(),
            zstd_level: 3,
        }
    }
}

impl CodecConfig {
    pub fn validate(&self) -> Result<()> {
        if self.direct_threshold_bits == 0 || self.direct_threshold_bits > MAX_BIT_WIDTH {
            return Err(Error::Invalid(format!(
                "direct_threshold_bits must be between 1 and {MAX_BIT_WIDTH}, got {}",
                self.direct_threshold_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_is_rejected() {
        let config = CodecConfig {
            direct_threshold_bits: 0,
            ..CodecConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(CodecConfig::default().validate().is_ok());
    }
}
