//! Per-chunk logging macros
//!
//! Streaming replies can produce hundreds of chunks per turn. These log at
//! trace level in debug builds and compile to nothing in release builds.

/// Chunk-level trace logging - only active in debug builds
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! chunk_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

/// Chunk-level trace logging - no-op in release builds
#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! chunk_trace {
    ($($arg:tt)*) => {};
}
