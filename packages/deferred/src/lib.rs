//! # streamclient-deferred
//!
//! A deferred value: a single eventual result (success or failure) plus a
//! stream of progress notifications, observable by any number of subscribers.
//!
//! The same type is used whether the value is settled on another thread
//! (pooled stream writers) or before the producing call even returns
//! (synchronous writers). Callbacks registered after settlement are replayed
//! immediately with the original outcome.
//!
//! ```ignore
//! use streamclient_deferred::Deferred;
//!
//! let deferred: Deferred<String, u16, &'static str> = Deferred::new();
//!
//! deferred
//!     .on_progress(|step| println!("progress: {step}"))
//!     .subscribe(|body| println!("ok: {body}"), |status| println!("failed: {status}"));
//!
//! deferred.notify("sending");
//! deferred.resolve("{}".to_string());
//!
//! // Late subscribers see the original value.
//! deferred.on_success(|body| assert_eq!(body, "{}"));
//! ```

mod deferred;

pub use deferred::{Deferred, DeferredState};
