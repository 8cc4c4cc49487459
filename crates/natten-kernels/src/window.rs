//! Neighborhood window indexing.
//!
//! Maps a query coordinate on one axis to the first neighbor of its window
//! and the first entry of its relative-positional-bias slice. With dilation
//! `d`, the axis splits into `d` interleaved sub-lattices (residues of
//! `index % d`) and each is windowed as its own undilated problem.
//!
//! For every valid query `i` and window member `j`:
//!
//! ```text
//! neighbor(j) = window_start(i) + j * d
//! bias(j)     = bias_start(i) + j = (neighbor(j) - i) / d + kernel_size - 1
//! ```

use natten_core::{NattenError, Result, Tensor};

/// First neighbor position of the window around `index`.
///
/// Parameters must satisfy `kernel_size * dilation <= length` (see
/// [`WindowParams::check_extent`]); the result is then within `0..length`.
pub fn window_start(
    index: usize,
    length: usize,
    kernel_size: usize,
    neighborhood_size: usize,
    dilation: usize,
) -> usize {
    let (i, l, k, ns, d) = (
        index as isize,
        length as isize,
        kernel_size as isize,
        neighborhood_size as isize,
        dilation as isize,
    );
    let start = if d <= 1 {
        let mut start = (i - ns).max(0);
        if i + ns >= l {
            start += l - i - ns - 1;
        }
        start
    } else if i - ns * d < 0 {
        i % d
    } else if i + ns * d >= l {
        let residue = i % d;
        let full = (l / d) * d;
        let tail = l - full;
        if residue < tail {
            l - tail + residue - 2 * ns * d
        } else {
            full + residue - k * d
        }
    } else {
        i - ns * d
    };
    debug_assert!(start >= 0, "window start underflow for index {index}");
    start as usize
}

/// First relative-positional-bias index for the window around `index`.
///
/// Lies within `0..kernel_size` under the same preconditions as
/// [`window_start`].
pub fn bias_start(
    index: usize,
    length: usize,
    kernel_size: usize,
    neighborhood_size: usize,
    dilation: usize,
) -> usize {
    let (i, l, k, ns, d) = (
        index as isize,
        length as isize,
        kernel_size as isize,
        neighborhood_size as isize,
        dilation as isize,
    );
    let bias = if d <= 1 {
        let mut bias = ns;
        if i < ns {
            bias += ns - i;
        }
        if i + ns >= l {
            bias += l - i - 1 - ns;
        }
        bias
    } else if i - ns * d < 0 {
        k - 1 - i / d
    } else if i + ns * d >= l {
        (l - i - 1) / d
    } else {
        ns
    };
    debug_assert!(bias >= 0, "bias start underflow for index {index}");
    bias as usize
}

/// Validated window descriptor: odd `kernel_size`, `dilation >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    kernel_size: usize,
    dilation: usize,
    neighborhood_size: usize,
}

impl WindowParams {
    /// Validate a kernel size and dilation.
    pub fn new(kernel_size: usize, dilation: usize) -> Result<Self> {
        if kernel_size == 0 || kernel_size % 2 == 0 {
            return Err(NattenError::config(
                "kernel_size",
                format!("must be an odd positive integer, got {kernel_size}"),
            ));
        }
        if dilation == 0 {
            return Err(NattenError::config("dilation", "must be at least 1, got 0"));
        }
        Ok(Self {
            kernel_size,
            dilation,
            neighborhood_size: kernel_size / 2,
        })
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }

    pub fn neighborhood_size(&self) -> usize {
        self.neighborhood_size
    }

    /// Per-axis extent of the RPB table: `2 * kernel_size - 1`.
    pub fn rpb_extent(&self) -> usize {
        self.kernel_size.saturating_mul(2) - 1
    }

    /// Check that a window fits an axis of the given (unpadded) extent.
    ///
    /// `param` names the extent in the error, e.g. `"original_length"`.
    pub fn check_extent(&self, param: &'static str, extent: usize) -> Result<()> {
        if self.kernel_size > extent {
            return Err(NattenError::config(
                "kernel_size",
                format!(
                    "kernel_size {} exceeds {param} {extent}",
                    self.kernel_size
                ),
            ));
        }
        // span of the dilated window; an overflowing product never fits
        let span = self.kernel_size.checked_mul(self.dilation);
        if span.map_or(true, |span| span > extent) {
            return Err(NattenError::config(
                "dilation",
                format!(
                    "kernel_size {} * dilation {} exceeds {param} {extent}",
                    self.kernel_size, self.dilation
                ),
            ));
        }
        Ok(())
    }

    /// Window of `index` on an axis of `length` (already checked).
    #[inline]
    pub fn locate(&self, index: usize, length: usize) -> AxisWindow {
        AxisWindow {
            start: window_start(index, length, self.kernel_size, self.neighborhood_size, self.dilation),
            bias: bias_start(index, length, self.kernel_size, self.neighborhood_size, self.dilation),
            dilation: self.dilation,
        }
    }
}

/// One query's window along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisWindow {
    pub start: usize,
    pub bias: usize,
    dilation: usize,
}

impl AxisWindow {
    /// Position of window member `j`.
    #[inline]
    pub fn neighbor(&self, j: usize) -> usize {
        self.start + j * self.dilation
    }

    /// RPB index of window member `j`.
    #[inline]
    pub fn bias(&self, j: usize) -> usize {
        self.bias + j
    }
}

fn index_table(length: usize, params: &WindowParams, entry: impl Fn(&AxisWindow, usize) -> usize) -> Result<Tensor> {
    params.check_extent("length", length)?;
    let k = params.kernel_size();
    let mut table = Vec::with_capacity(length * k);
    for i in 0..length {
        let w = params.locate(i, length);
        table.extend((0..k).map(|j| entry(&w, j) as i32));
    }
    Ok(Tensor::from_i32(&table, &[length, k]))
}

/// `(length, kernel_size)` I32 table of neighbor positions.
pub fn window_index_table(length: usize, params: &WindowParams) -> Result<Tensor> {
    index_table(length, params, AxisWindow::neighbor)
}

/// `(length, kernel_size)` I32 table of RPB indices.
pub fn bias_index_table(length: usize, params: &WindowParams) -> Result<Tensor> {
    index_table(length, params, AxisWindow::bias)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(mut f: impl FnMut(usize, &WindowParams, usize)) {
        for length in 1..=32 {
            for kernel_size in (1..=length).step_by(2) {
                for dilation in 1..=length / kernel_size {
                    let params = WindowParams::new(kernel_size, dilation).unwrap();
                    for i in 0..length {
                        f(length, &params, i);
                    }
                }
            }
        }
    }

    #[test]
    fn test_undilated_boundaries() {
        assert_eq!(window_start(0, 10, 3, 1, 1), 0);
        assert_eq!(window_start(9, 10, 3, 1, 1), 7);
        assert_eq!(window_start(5, 10, 3, 1, 1), 4);
        assert_eq!(bias_start(0, 10, 3, 1, 1), 2);
        assert_eq!(bias_start(5, 10, 3, 1, 1), 1);
        assert_eq!(bias_start(9, 10, 3, 1, 1), 0);
    }

    #[test]
    fn test_dilated_interior() {
        assert_eq!(window_start(10, 20, 5, 2, 2), 6);
        assert_eq!(bias_start(10, 20, 5, 2, 2), 2);
    }

    #[test]
    fn test_dilated_edges() {
        // left edge: first member of the odd sub-lattice
        assert_eq!(window_start(3, 20, 5, 2, 2), 1);
        assert_eq!(bias_start(3, 20, 5, 2, 2), 3);
        // right edge, length divisible by dilation
        assert_eq!(window_start(19, 20, 5, 2, 2), 11);
        assert_eq!(bias_start(19, 20, 5, 2, 2), 0);
        // right edge with a trailing remainder
        assert_eq!(window_start(10, 11, 5, 2, 2), 2);
        assert_eq!(window_start(9, 11, 5, 2, 2), 1);
    }

    #[test]
    fn test_window_within_bounds() {
        sweep(|length, p, i| {
            let w = p.locate(i, length);
            let last = w.neighbor(p.kernel_size() - 1);
            assert!(last < length, "L={length} k={} d={} i={i}", p.kernel_size(), p.dilation());
        });
    }

    #[test]
    fn test_window_contains_query_on_its_sub_lattice() {
        sweep(|length, p, i| {
            let w = p.locate(i, length);
            let members: Vec<usize> = (0..p.kernel_size()).map(|j| w.neighbor(j)).collect();
            assert!(members.contains(&i));
            assert!(members.iter().all(|&n| n % p.dilation() == i % p.dilation()));
        });
    }

    #[test]
    fn test_bias_matches_relative_offset() {
        sweep(|length, p, i| {
            let w = p.locate(i, length);
            let k = p.kernel_size();
            assert!(w.bias(k - 1) < p.rpb_extent());
            for j in 0..k {
                let offset = w.neighbor(j) as isize - i as isize;
                let expected = offset / p.dilation() as isize + k as isize - 1;
                assert_eq!(w.bias(j) as isize, expected);
            }
        });
    }

    #[test]
    fn test_params_validation() {
        assert!(WindowParams::new(4, 1).unwrap_err().is_configuration());
        assert!(WindowParams::new(0, 1).is_err());
        assert!(WindowParams::new(3, 0).is_err());
        let p = WindowParams::new(7, 2).unwrap();
        assert_eq!(p.neighborhood_size(), 3);
        assert_eq!(p.rpb_extent(), 13);
        assert!(p.check_extent("original_length", 14).is_ok());
        match p.check_extent("original_length", 13) {
            Err(NattenError::Configuration { param, reason }) => {
                assert_eq!(param, "dilation");
                assert!(reason.contains("original_length"));
            }
            other => panic!("expected dilation error, got {other:?}"),
        }
        match p.check_extent("original_length", 5) {
            Err(NattenError::Configuration { param, .. }) => assert_eq!(param, "kernel_size"),
            other => panic!("expected kernel_size error, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_span_rejected() {
        // 3 * (usize::MAX / 3 + 1) wraps to 2 in unchecked arithmetic
        for dilation in [usize::MAX / 3 + 1, usize::MAX / 2, usize::MAX] {
            let p = WindowParams::new(3, dilation).unwrap();
            match p.check_extent("original_length", 10) {
                Err(NattenError::Configuration { param, .. }) => assert_eq!(param, "dilation"),
                other => panic!("expected dilation error, got {other:?}"),
            }
            assert!(window_index_table(10, &p).is_err());
        }
        let huge = WindowParams::new(usize::MAX, 1).unwrap();
        assert_eq!(huge.rpb_extent(), usize::MAX - 1);
        assert!(huge.check_extent("original_length", 10).is_err());
    }

    #[test]
    fn test_index_tables() {
        let p = WindowParams::new(3, 1).unwrap();
        let windows = window_index_table(4, &p).unwrap();
        assert_eq!(windows.dims(), &[4, 3]);
        assert_eq!(
            windows.as_i32_slice().unwrap(),
            &[0, 1, 2, 0, 1, 2, 1, 2, 3, 1, 2, 3]
        );
        let biases = bias_index_table(4, &p).unwrap();
        assert_eq!(
            biases.as_i32_slice().unwrap(),
            &[2, 3, 4, 1, 2, 3, 1, 2, 3, 0, 1, 2]
        );
        assert!(window_index_table(2, &p).is_err());
    }
}
