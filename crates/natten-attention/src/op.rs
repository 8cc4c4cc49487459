//! Differentiable-operator wrappers.
//!
//! The operators run the stateless forward from [`crate::functional`] and,
//! when an input tracks gradients, attach a graph node. Their backward is not
//! implemented: both the node and the operator's own `backward` fail with
//! `NattenError::Unsupported`.

use natten_core::autograd::{graph_input, GradFn, GradNode};
use natten_core::{NattenError, Result, Tensor};

use crate::config::NeighborhoodConfig;
use crate::functional::{na1d_forward, na2d_forward};

/// Graph node for a neighborhood-attention output.
pub struct NeighborhoodAttentionBackward {
    op: &'static str,
}

impl GradFn for NeighborhoodAttentionBackward {
    fn apply(&self, _grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Err(NattenError::unsupported(self.op))
    }

    fn name(&self) -> &str {
        "NeighborhoodAttentionBackward"
    }
}

fn attach_backward(out: Tensor, op: &'static str, inputs: [&Tensor; 4]) -> Tensor {
    if !inputs.iter().any(|t| t.tracks_grad()) {
        return out;
    }
    let node = GradNode::with_grad_fn(
        Box::new(NeighborhoodAttentionBackward { op }),
        inputs.iter().map(|t| graph_input(t)).collect(),
    );
    out.with_grad_node(node)
}

/// 1-D neighborhood attention operator.
#[derive(Debug, Clone, Copy)]
pub struct NeighborhoodAttention1d {
    config: NeighborhoodConfig,
}

impl NeighborhoodAttention1d {
    const BACKWARD: &'static str = "natten1d backward";

    pub fn new(config: NeighborhoodConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NeighborhoodConfig {
        &self.config
    }

    /// See [`na1d_forward`].
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        rpb: &Tensor,
        original_length: usize,
    ) -> Result<Tensor> {
        let out = na1d_forward(query, key, value, rpb, &self.config, original_length)?;
        Ok(attach_backward(out, Self::BACKWARD, [query, key, value, rpb]))
    }

    /// Always fails: gradients are not implemented.
    pub fn backward(&self, _grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Err(NattenError::unsupported(Self::BACKWARD))
    }
}

/// 2-D neighborhood attention operator.
#[derive(Debug, Clone, Copy)]
pub struct NeighborhoodAttention2d {
    config: NeighborhoodConfig,
}

impl NeighborhoodAttention2d {
    const BACKWARD: &'static str = "natten2d backward";

    pub fn new(config: NeighborhoodConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NeighborhoodConfig {
        &self.config
    }

    /// See [`na2d_forward`].
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        rpb: &Tensor,
        original_height: usize,
        original_width: usize,
    ) -> Result<Tensor> {
        let out = na2d_forward(
            query,
            key,
            value,
            rpb,
            &self.config,
            original_height,
            original_width,
        )?;
        Ok(attach_backward(out, Self::BACKWARD, [query, key, value, rpb]))
    }

    /// Always fails: gradients are not implemented.
    pub fn backward(&self, _grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Err(NattenError::unsupported(Self::BACKWARD))
    }
}

/// 1-D neighborhood attention, non-causal.
///
/// ```
/// use natten_attention::natten1d;
/// use natten_core::Tensor;
///
/// let q = Tensor::randn(&[1, 2, 8, 4]);
/// let rpb = Tensor::zeros(&[2, 5], natten_core::DType::F32);
/// let out = natten1d(&q, &q, &q, &rpb, 3, 2, 8).unwrap();
/// assert_eq!(out.dims(), &[1, 8, 8]);
/// ```
pub fn natten1d(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    rpb: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_length: usize,
) -> Result<Tensor> {
    let config = NeighborhoodConfig::new(kernel_size).with_dilation(dilation);
    NeighborhoodAttention1d::new(config).forward(query, key, value, rpb, original_length)
}

/// 2-D neighborhood attention, non-causal.
#[allow(clippy::too_many_arguments)]
pub fn natten2d(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    rpb: &Tensor,
    kernel_size: usize,
    dilation: usize,
    original_height: usize,
    original_width: usize,
) -> Result<Tensor> {
    let config = NeighborhoodConfig::new(kernel_size).with_dilation(dilation);
    NeighborhoodAttention2d::new(config).forward(
        query,
        key,
        value,
        rpb,
        original_height,
        original_width,
    )
}
