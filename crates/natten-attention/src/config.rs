//! Neighborhood window configuration.

use serde::{Deserialize, Serialize};

use natten_core::{NattenError, Result};
use natten_kernels::WindowParams;

fn default_dilation() -> usize {
    1
}

/// Kernel size, dilation and the reserved causal flag of a neighborhood
/// attention layer.
///
/// ```
/// use natten_attention::NeighborhoodConfig;
///
/// let config: NeighborhoodConfig = serde_json::from_str(r#"{"kernel_size": 7}"#).unwrap();
/// assert_eq!(config.dilation, 1);
/// assert!(!config.is_causal);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodConfig {
    pub kernel_size: usize,
    #[serde(default = "default_dilation")]
    pub dilation: usize,
    /// Reserved. `true` is rejected as unsupported.
    #[serde(default)]
    pub is_causal: bool,
}

impl NeighborhoodConfig {
    /// Undilated, non-causal window of `kernel_size`.
    pub fn new(kernel_size: usize) -> Self {
        Self {
            kernel_size,
            dilation: default_dilation(),
            is_causal: false,
        }
    }

    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn with_causal(mut self, is_causal: bool) -> Self {
        self.is_causal = is_causal;
        self
    }

    /// Validate into kernel window parameters.
    pub fn window_params(&self) -> Result<WindowParams> {
        let params = WindowParams::new(self.kernel_size, self.dilation)?;
        if self.is_causal {
            return Err(NattenError::unsupported("causal neighborhood attention"));
        }
        Ok(params)
    }
}
