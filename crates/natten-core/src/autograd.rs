//! Core autograd types.
//!
//! Defines the `GradFn` trait and `GradNode` computation graph node. The
//! attention operators are forward-only: they attach a node whose `GradFn`
//! reports `Unsupported`, so a backward pass through them fails loudly
//! instead of silently producing zeros.

use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::tensor::Tensor;
use crate::Result;

// ============================================================================
// GradFn trait
// ============================================================================

/// Trait for gradient functions in the computation graph.
///
/// Each differentiable operation implements this trait to define
/// how gradients flow backward through it.
pub trait GradFn: Send + Sync {
    /// Compute gradients for each input given the output gradient.
    ///
    /// Returns one optional gradient per input; `None` means the input
    /// receives nothing. An `Err` aborts the whole backward pass.
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>>;

    /// Name of this gradient function (for debugging).
    fn name(&self) -> &str;
}

// ============================================================================
// GradNode
// ============================================================================

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> usize {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A node in the autograd computation graph.
///
/// Inputs are held weakly so graphs never form reference cycles.
pub struct GradNode {
    pub id: usize,
    pub grad_fn: Option<Box<dyn GradFn>>,
    pub inputs: Vec<Weak<GradNode>>,
    pub grad: RwLock<Option<Tensor>>,
}

impl GradNode {
    /// Create a new leaf node (no grad_fn).
    pub fn leaf() -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            grad_fn: None,
            inputs: Vec::new(),
            grad: RwLock::new(None),
        })
    }

    /// Create a new interior node with a gradient function and inputs.
    pub fn with_grad_fn(grad_fn: Box<dyn GradFn>, inputs: Vec<Arc<GradNode>>) -> Arc<Self> {
        let weak_inputs = inputs.iter().map(Arc::downgrade).collect();
        Arc::new(Self {
            id: next_id(),
            grad_fn: Some(grad_fn),
            inputs: weak_inputs,
            grad: RwLock::new(None),
        })
    }

    /// Name of the attached gradient function, if any.
    pub fn grad_fn_name(&self) -> Option<&str> {
        self.grad_fn.as_ref().map(|f| f.name())
    }

    /// Accumulate gradient into this node.
    pub fn accumulate_grad(&self, grad: &Tensor) -> Result<()> {
        let mut lock = self.grad.write();
        let next = match lock.as_ref() {
            Some(existing) => existing.add(grad)?,
            None => grad.clone(),
        };
        *lock = Some(next);
        Ok(())
    }

    /// Get the current accumulated gradient.
    pub fn get_grad(&self) -> Option<Tensor> {
        self.grad.read().clone()
    }
}

/// Graph node standing for `t` as an operation input.
///
/// Non-tracking tensors get a detached leaf whose weak reference never
/// upgrades during backward, so they receive no gradient.
pub fn graph_input(t: &Tensor) -> Arc<GradNode> {
    match t.grad_node() {
        Some(node) if t.tracks_grad() => Arc::clone(node),
        _ => GradNode::leaf(),
    }
}

// ============================================================================
// Backward pass
// ============================================================================

/// Execute the backward pass from a root node.
///
/// Gradients are computed under a [`NoGradGuard`] so the pass itself never
/// records new graph nodes. They are collected first and written to the
/// nodes only after every gradient function has succeeded; on error no
/// node's gradient changes.
pub fn backward(root: &Arc<GradNode>, grad_output: Tensor) -> Result<()> {
    let _guard = NoGradGuard::new();
    let order = topological_sort(root);
    let mut pending: HashMap<usize, Tensor> = HashMap::new();
    pending.insert(root.id, grad_output);

    for node in &order {
        let Some(ref grad_fn) = node.grad_fn else {
            continue;
        };
        let Some(node_grad) = pending.get(&node.id).cloned() else {
            continue;
        };

        let input_grads = grad_fn.apply(&node_grad)?;

        for (weak_input, maybe_grad) in node.inputs.iter().zip(input_grads) {
            if let (Some(input_node), Some(grad)) = (weak_input.upgrade(), maybe_grad) {
                accumulate_pending(&mut pending, input_node.id, grad)?;
            }
        }
    }

    for node in &order {
        if let Some(grad) = pending.remove(&node.id) {
            node.accumulate_grad(&grad)?;
        }
    }
    Ok(())
}

fn accumulate_pending(pending: &mut HashMap<usize, Tensor>, id: usize, grad: Tensor) -> Result<()> {
    match pending.entry(id) {
        Entry::Occupied(mut slot) => {
            let sum = slot.get().add(&grad)?;
            slot.insert(sum);
        }
        Entry::Vacant(slot) => {
            slot.insert(grad);
        }
    }
    Ok(())
}

/// BFS topological sort from root → leaves (backward traversal order).
fn topological_sort(root: &Arc<GradNode>) -> Vec<Arc<GradNode>> {
    let mut sorted = Vec::new();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<Arc<GradNode>> = VecDeque::new();

    queue.push_back(Arc::clone(root));
    visited.insert(root.id);

    while let Some(node) = queue.pop_front() {
        sorted.push(Arc::clone(&node));
        for weak_input in &node.inputs {
            if let Some(input) = weak_input.upgrade() {
                if visited.insert(input.id) {
                    queue.push_back(input);
                }
            }
        }
    }

    sorted
}

// ============================================================================
// No-grad scope
// ============================================================================

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Check if gradient computation is currently enabled.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|g| g.get())
}

fn set_grad_enabled(enabled: bool) -> bool {
    GRAD_ENABLED.with(|g| {
        let prev = g.get();
        g.set(enabled);
        prev
    })
}

/// RAII guard that disables gradient tracking in its scope.
///
/// ```
/// use natten_core::autograd::{is_grad_enabled, NoGradGuard};
///
/// {
///     let _guard = NoGradGuard::new();
///     assert!(!is_grad_enabled());
/// }
/// assert!(is_grad_enabled());
/// ```
pub struct NoGradGuard {
    prev: bool,
}

impl NoGradGuard {
    pub fn new() -> Self {
        let prev = set_grad_enabled(false);
        Self { prev }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        set_grad_enabled(self.prev);
    }
}

// ============================================================================
// Built-in gradient functions
// ============================================================================

/// Backward for element-wise addition: grad flows through unchanged.
pub struct AddBackward;

impl GradFn for AddBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad_output.clone()), Some(grad_output.clone())])
    }
    fn name(&self) -> &str {
        "AddBackward"
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::NattenError;

    struct Refuses;

    impl GradFn for Refuses {
        fn apply(&self, _grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
            Err(NattenError::unsupported("refuses backward"))
        }
        fn name(&self) -> &str {
            "Refuses"
        }
    }

    #[test]
    fn test_leaf_node() {
        let node = GradNode::leaf();
        assert!(node.grad_fn.is_none());
        assert!(node.get_grad().is_none());
        assert!(node.grad_fn_name().is_none());
    }

    #[test]
    fn test_grad_accumulation() {
        let node = GradNode::leaf();
        node.accumulate_grad(&Tensor::from_f32(&[1.0, 2.0], &[2])).unwrap();
        node.accumulate_grad(&Tensor::from_f32(&[3.0, 4.0], &[2])).unwrap();
        let grad = node.get_grad().unwrap();
        assert_eq!(grad.as_f32_slice().unwrap(), &[4.0, 6.0]);
    }

    #[test]
    fn test_no_grad_guard() {
        assert!(is_grad_enabled());
        {
            let _guard = NoGradGuard::new();
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_backward_add() {
        let a = GradNode::leaf();
        let b = GradNode::leaf();
        let c = GradNode::with_grad_fn(Box::new(AddBackward), vec![Arc::clone(&a), Arc::clone(&b)]);
        backward(&c, Tensor::ones(&[1])).unwrap();
        assert_eq!(a.get_grad().unwrap().get_f32(0), Some(1.0));
        assert_eq!(b.get_grad().unwrap().get_f32(0), Some(1.0));
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_backward_chain() {
        // d = (a + b) + (a + b)
        let a = GradNode::leaf();
        let b = GradNode::leaf();
        let c = GradNode::with_grad_fn(Box::new(AddBackward), vec![Arc::clone(&a), Arc::clone(&b)]);
        let d = GradNode::with_grad_fn(Box::new(AddBackward), vec![Arc::clone(&c), Arc::clone(&c)]);
        backward(&d, Tensor::ones(&[1])).unwrap();
        assert_eq!(c.get_grad().unwrap().get_f32(0), Some(2.0));
        assert_eq!(a.get_grad().unwrap().get_f32(0), Some(2.0));
        assert_eq!(b.get_grad().unwrap().get_f32(0), Some(2.0));
    }

    #[test]
    fn test_backward_propagates_grad_fn_error() {
        let a = GradNode::leaf();
        let c = GradNode::with_grad_fn(Box::new(Refuses), vec![Arc::clone(&a)]);
        let err = backward(&c, Tensor::ones(&[1])).unwrap_err();
        assert!(err.is_unsupported());
        assert!(a.get_grad().is_none());
        assert!(c.get_grad().is_none());
        assert_eq!(c.grad_fn_name(), Some("Refuses"));
    }

    #[test]
    fn test_failed_backward_leaves_no_grads() {
        // root = refused(a) + b: b's gradient is computed before the failure
        let a = GradNode::leaf();
        let b = GradNode::leaf();
        let refused = GradNode::with_grad_fn(Box::new(Refuses), vec![Arc::clone(&a)]);
        let root = GradNode::with_grad_fn(Box::new(AddBackward), vec![Arc::clone(&refused), Arc::clone(&b)]);
        assert!(backward(&root, Tensor::ones(&[1])).is_err());
        for node in [&root, &refused, &a, &b] {
            assert!(node.get_grad().is_none());
        }

        // earlier gradients survive a failed pass untouched
        b.accumulate_grad(&Tensor::from_f32(&[5.0], &[1])).unwrap();
        assert!(backward(&root, Tensor::ones(&[1])).is_err());
        assert_eq!(b.get_grad().unwrap().get_f32(0), Some(5.0));
    }
}
