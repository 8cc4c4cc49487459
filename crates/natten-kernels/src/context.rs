//! Process-wide kernel backend context.
//!
//! The context owns the rayon pool the kernels run on and records the
//! compiled-kernel library path handed to it. It is created exactly once per
//! process, either explicitly through [`init_backend`] or lazily from the
//! environment on first use through [`context`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable naming the compiled kernel library.
pub const LIBRARY_ENV: &str = "NATTEN_KERNEL_LIBRARY";

/// Environment variable overriding the worker thread count.
pub const THREADS_ENV: &str = "NATTEN_NUM_THREADS";

static CONTEXT: OnceLock<KernelContext> = OnceLock::new();
static INIT_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Backend initialization settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Path to a compiled kernel library. Must exist when set.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    /// Worker threads; `None` lets rayon pick one per core.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl BackendConfig {
    /// Read settings from `NATTEN_KERNEL_LIBRARY` and `NATTEN_NUM_THREADS`.
    pub fn from_env() -> Result<Self, BackendError> {
        let library_path = std::env::var_os(LIBRARY_ENV).map(PathBuf::from);
        let num_threads = match std::env::var(THREADS_ENV) {
            Ok(raw) => Some(raw.trim().parse::<usize>().map_err(|_| BackendError::InvalidEnv {
                var: THREADS_ENV,
                value: raw.clone(),
            })?),
            Err(_) => None,
        };
        Ok(Self {
            library_path,
            num_threads,
        })
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Reject a missing library file or a zero thread count.
    pub fn validate(&self) -> Result<(), BackendError> {
        if let Some(ref path) = self.library_path {
            if !path.is_file() {
                return Err(BackendError::LibraryNotFound(path.clone()));
            }
        }
        if self.num_threads == Some(0) {
            return Err(BackendError::InvalidThreadCount(0));
        }
        Ok(())
    }
}

/// Initialized backend state shared by every kernel call.
pub struct KernelContext {
    pool: rayon::ThreadPool,
    library_path: Option<PathBuf>,
}

impl KernelContext {
    fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("natten-worker-{i}"));
        if let Some(n) = config.num_threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| BackendError::ThreadPool(e.to_string()))?;
        Ok(Self {
            pool,
            library_path: config.library_path.clone(),
        })
    }

    /// Number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Kernel library path recorded at initialization.
    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    /// Run `op` inside the backend's thread pool.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("num_threads", &self.num_threads())
            .field("library_path", &self.library_path)
            .finish()
    }
}

/// Initialize the backend once for the whole process.
///
/// The config is validated on every call. After the first successful call
/// the existing context is returned and the new settings are ignored.
pub fn init_backend(config: &BackendConfig) -> Result<&'static KernelContext, BackendError> {
    config.validate()?;

    if let Some(ctx) = CONTEXT.get() {
        debug!(?config, "backend already initialized, ignoring repeated init");
        return Ok(ctx);
    }

    let _guard = INIT_LOCK.lock();
    if let Some(ctx) = CONTEXT.get() {
        debug!(?config, "backend initialized concurrently, ignoring repeated init");
        return Ok(ctx);
    }

    let ctx = KernelContext::new(config)?;
    info!(
        num_threads = ctx.num_threads(),
        library = ?ctx.library_path(),
        "natten backend initialized"
    );
    Ok(CONTEXT.get_or_init(|| ctx))
}

/// The backend context, initializing it from the environment if needed.
pub fn context() -> Result<&'static KernelContext, BackendError> {
    match CONTEXT.get() {
        Some(ctx) => Ok(ctx),
        None => init_backend(&BackendConfig::from_env()?),
    }
}

/// Whether the backend has been initialized.
pub fn is_initialized() -> bool {
    CONTEXT.get().is_some()
}

/// Backend initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("kernel library not found: {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("thread count must be positive, got {0}")]
    InvalidThreadCount(usize),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

impl From<BackendError> for natten_core::NattenError {
    fn from(err: BackendError) -> Self {
        natten_core::NattenError::Backend(err.to_string())
    }
}
