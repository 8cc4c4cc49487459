//! # natten-kernels
//!
//! CPU neighborhood-attention kernels for natten-rs.
//!
//! Provides:
//! - Window and bias indexing per axis, with dilation and edge clamping
//! - QK+RPB scoring, window softmax and AV aggregation for 1-D and 2-D
//! - Stride-aware reads throughout; inputs may be arbitrary permuted views
//! - A process-wide backend context owning the rayon pool
//!
//! Pipeline: `window` → `qk` → `softmax` → `av`.

pub mod window;
pub mod check;
pub mod qk;
pub mod softmax;
pub mod av;
pub mod context;
pub mod parallel;

pub use av::{na1d_av, na2d_av};
pub use context::{context, init_backend, is_initialized, BackendConfig, BackendError, KernelContext};
pub use qk::{na1d_qk_rpb, na2d_qk_rpb};
pub use softmax::{softmax_in_place, window_softmax};
pub use window::{
    bias_index_table, bias_start, window_index_table, window_start, AxisWindow, WindowParams,
};
