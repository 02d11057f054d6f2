//! # streamclient-executor
//!
//! A bounded executor: at most `capacity` jobs run at once, each on its own
//! OS thread; further submissions wait in a FIFO queue and start, in
//! submission order, as workers free up.
//!
//! ```ignore
//! use streamclient_executor::BoundedExecutor;
//!
//! let executor = BoundedExecutor::with_name(5, "stream-writer")?;
//! executor.submit(|| println!("runs on a worker thread"))?;
//!
//! executor.shutdown();
//! executor.await_termination(Duration::from_secs(5));
//! ```

pub mod error;
pub mod pool;

pub use error::ExecutorError;
pub use pool::BoundedExecutor;
