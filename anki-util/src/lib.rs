//! Engine-agnostic utilities: high resolution time and a barrier-dispatch
//! thread pool.

pub mod thread_pool;
pub mod time;
