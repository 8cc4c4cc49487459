//! Benchmark: neighborhood attention vs dense attention on the CPU.
//!
//! Set `NATTEN_NUM_THREADS` to pin the worker pool size.

use natten_attention::{fmha_forward, natten1d, natten2d};
use natten_core::Tensor;
use std::time::Instant;

fn pattern(shape: &[usize], salt: usize) -> Tensor {
    let n: usize = shape.iter().product();
    let data: Vec<f32> = (0..n)
        .map(|i| ((i * 7 + salt) % 13) as f32 * 0.1 - 0.6)
        .collect();
    Tensor::from_f32_vec(data, shape)
}

fn time_it<F: FnMut()>(iters: usize, mut f: F) -> f64 {
    f();
    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn bench_1d() {
    println!("\n--- 1-D (batch=1, heads=4, dim=32) ---");
    println!(
        "{:<10} {:>4} {:>4} {:>12} {:>12} {:>10}",
        "Length", "k", "d", "NA (ms)", "Dense (ms)", "Speedup"
    );
    println!("{}", "-".repeat(58));

    let cases: &[(usize, usize, usize)] = &[
        (128, 7, 1),
        (512, 7, 1),
        (512, 13, 4),
        (2048, 13, 1),
        (2048, 31, 8),
    ];
    for &(length, ks, dilation) in cases {
        let (heads, dim) = (4, 32);
        let q = pattern(&[1, heads, length, dim], 3);
        let k = pattern(&[1, heads, length, dim], 5);
        let v = pattern(&[1, heads, length, dim], 11);
        let rpb = pattern(&[heads, 2 * ks - 1], 1);
        let iters = if length <= 512 { 50 } else { 5 };

        let na_s = time_it(iters, || {
            let _ = natten1d(&q, &k, &v, &rpb, ks, dilation, length).unwrap();
        });
        let dense_s = time_it(iters, || {
            let _ = fmha_forward(&q, &k, &v, Some(1.0)).unwrap();
        });

        println!(
            "{:<10} {:>4} {:>4} {:>10.3}ms {:>10.3}ms {:>9.1}x",
            length,
            ks,
            dilation,
            na_s * 1000.0,
            dense_s * 1000.0,
            dense_s / na_s,
        );
    }
}

fn bench_2d() {
    println!("\n--- 2-D (batch=1, heads=4, dim=32) ---");
    println!(
        "{:<10} {:>4} {:>4} {:>12} {:>14}",
        "Size", "k", "d", "NA (ms)", "Mpix/s"
    );
    println!("{}", "-".repeat(50));

    let cases: &[(usize, usize, usize, usize)] = &[
        (14, 14, 7, 1),
        (28, 28, 7, 2),
        (56, 56, 7, 1),
        (56, 56, 13, 4),
    ];
    for &(height, width, ks, dilation) in cases {
        let (heads, dim) = (4, 32);
        let q = pattern(&[1, heads, height, width, dim], 3);
        let k = pattern(&[1, heads, height, width, dim], 5);
        let v = pattern(&[1, heads, height, width, dim], 11);
        let rpb = pattern(&[heads, 2 * ks - 1, 2 * ks - 1], 1);
        let iters = if height <= 28 { 20 } else { 3 };

        let na_s = time_it(iters, || {
            let _ = natten2d(&q, &k, &v, &rpb, ks, dilation, height, width).unwrap();
        });

        println!(
            "{:<10} {:>4} {:>4} {:>10.3}ms {:>14.2}",
            format!("{}x{}", height, width),
            ks,
            dilation,
            na_s * 1000.0,
            (height * width) as f64 / na_s / 1e6,
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = natten_kernels::context().unwrap();
    println!("=== Neighborhood Attention Benchmark ===");
    println!("threads: {}", ctx.num_threads());

    bench_1d();
    bench_2d();
}
