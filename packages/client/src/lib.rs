//! # streamclient
//!
//! Client for ingesting events into streams hosted by a gateway service.
//!
//! [`StreamClient`] performs stream lifecycle calls (create, TTL, truncate)
//! and creates writers. A [`StreamWriter`] sends events through a fixed pool
//! of worker threads and returns a [`WriteHandle`] for each write without
//! blocking; a [`SyncStreamWriter`] sends on the calling thread.
//!
//! Failures are split in two:
//!
//! - the gateway answering with a status other than `200` rejects the
//!   write's handle with [`RequestFailed`],
//! - a fault in the HTTP stack or in authentication is not a per-write
//!   outcome. Pooled writers hand it to their fatal-error handler
//!   ([`StreamWriter::on_fatal_error`]); synchronous writers return it.
//!
//! ```ignore
//! use streamclient::{ClientConfig, StreamClient};
//!
//! let client = StreamClient::new(ClientConfig::builder("localhost", 10000).build()?)?;
//! client.create("clicks")?;
//!
//! let writer = client.create_writer("clicks")?;
//! let faults = writer.fatal_channel();
//!
//! writer
//!     .write("user=42 page=/home")?
//!     .subscribe(
//!         |body| println!("stored: {body}"),
//!         |failed| eprintln!("rejected: {failed}"),
//!     );
//!
//! writer.close_and_wait(std::time::Duration::from_secs(5));
//! ```

pub mod charset;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod sync_writer;
pub mod writer;

pub use charset::Charset;
pub use client::StreamClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, RequestFailed};
pub use gateway::{merge_headers, Gateway};
pub use sync_writer::SyncStreamWriter;
pub use writer::{FatalErrorHandler, StreamWriter, WriteHandle, WriteProgress};

pub use streamclient_auth::{AuthProvider, BasicAuthenticationClient, StaticTokenProvider};
pub use streamclient_deferred::{Deferred, DeferredState};
