//! Single-shot, synchronous HTTP(S) calls.
//!
//! An [`Outcall`] wraps exactly one request/response exchange. It is configured
//! with fluent setters, optionally given a request body, and then read from.
//!
//! ```text
//!   Outcall::new(url)
//!        │
//!        ▼
//!   ┌──────────────────┐  output() / post_data()   ┌──────────────────┐
//!   │   Unconnected    │──────────────────────────▶│     Writing      │
//!   └──────────────────┘                           └──────────────────┘
//!        │                                                  │
//!        │ input() / data() / header_field()                │
//!        ▼                                                  │
//!   ┌──────────────────┐◀───────────────────────────────────┘
//!   │     Reading      │
//!   └──────────────────┘
//! ```
//!
//! Network I/O is lazy. The socket opens on the first access to the request
//! body, and the request is sent on the first access to the response.
//!
//! # Example
//!
//! ```no_run
//! use outcall::{Charset, Outcall};
//!
//! let mut call = Outcall::new("https://example.test/login")?;
//!
//! call.set_cookie("session", "abc")?
//!     .set_auth_params("alice", "wonderland")?
//!     .post_data([("user", "alice"), ("lang", "de")], Charset::UTF_8)?;
//!
//! let body = call.data()?;
//! let server = call.header_field("server").map(str::to_string);
//! # let _ = (body, server);
//! # Ok::<(), outcall::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod charset;
mod client;
mod conn;
mod error;
mod form;
mod tls;

pub use charset::{detect_content_encoding, Charset, ContentEncoding};
pub use client::{Outcall, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use conn::body::{RequestBody, ResponseBody};
pub use error::Error;
pub use form::{encode_form, MachineString};
pub use tls::{trusts_self_signed, Peer};

pub use http;
