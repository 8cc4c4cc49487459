//! # natten-attention
//!
//! Neighborhood attention for natten-rs.
//!
//! Provides:
//! - `natten1d` / `natten2d`: windowed attention with dilation and relative
//!   positional bias over 1-D sequences and 2-D grids
//! - Phase entry points (`natten1dqkrpb`, `natten1dav`, `natten2dqkrpb`,
//!   `natten2dav`) exposing the QK and AV kernels on their own
//! - Operator wrappers whose backward reports an unsupported operation
//! - Dense full-sequence attention (`fmha_forward`) as a numerical reference
//!
//! Inputs may be arbitrary strided views; nothing is copied to a packed
//! layout before the kernels read it.

pub mod config;
pub mod functional;
pub mod op;
pub mod fmha;

pub use config::NeighborhoodConfig;
pub use fmha::fmha_forward;
pub use functional::{
    na1d_forward, na2d_forward, natten1dav, natten1dqkrpb, natten2dav, natten2dqkrpb,
};
pub use op::{
    natten1d, natten2d, NeighborhoodAttention1d, NeighborhoodAttention2d,
    NeighborhoodAttentionBackward,
};
