//! Row-parallel dispatch over an output buffer.

use rayon::prelude::*;

use natten_core::Result;

use crate::context::context;

/// Minimum rows before we use rayon parallelism.
pub const PAR_ROW_THRESHOLD: usize = 16;

/// Split `out` into rows of `row_len` and fill each with `f(row, slice)`.
///
/// Rows are independent. At or above [`PAR_ROW_THRESHOLD`] rows they run on
/// the backend pool, otherwise sequentially on the caller thread. The backend
/// is initialized first either way, so a bad configuration fails every call.
pub fn for_each_row<F>(out: &mut [f32], row_len: usize, f: F) -> Result<()>
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    let ctx = context()?;
    if row_len == 0 || out.is_empty() {
        return Ok(());
    }
    let rows = out.len() / row_len;

    if rows >= PAR_ROW_THRESHOLD {
        // Parallel: each row computed independently
        ctx.install(|| {
            out.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, chunk)| f(row, chunk));
        });
    } else {
        // Sequential for few rows
        for (row, chunk) in out.chunks_mut(row_len).enumerate() {
            f(row, chunk);
        }
    }
    Ok(())
}
