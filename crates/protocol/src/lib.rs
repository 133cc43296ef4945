//! # wsgate Protocol Library
//!
//! Wire-level building blocks shared by the workspace gateway and its tests.
//!
//! ## Overview
//!
//! - **Message Definitions**: JSON bodies and query parameters of the workspace HTTP API
//! - **Multipart Decoding**: push-based `multipart/form-data` decoder that never
//!   buffers a whole upload
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{MultipartDecoder, MultipartEvent};
//!
//! let boundary = protocol::parse_boundary("multipart/form-data; boundary=X").unwrap();
//! let mut decoder = MultipartDecoder::new(&boundary);
//! decoder.feed(b"--X\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\nhi\r\n--X--");
//!
//! let mut events = Vec::new();
//! while let Some(event) = decoder.next_event().unwrap() {
//!     events.push(event);
//! }
//! assert!(decoder.finish().is_ok());
//! assert!(matches!(events.last(), Some(MultipartEvent::PartEnd)));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: HTTP API message definitions
//! - [`multipart`]: Streaming multipart decoder
//! - [`error`]: Error types

pub mod error;
pub mod messages;
pub mod multipart;

pub use error::{ProtocolError, Result};
pub use messages::{ErrorBody, FileEntry, OkResponse, WorkspaceQuery, DEFAULT_AGENT_ID};
pub use multipart::{
    parse_boundary, MultipartDecoder, MultipartEvent, PartHeaders, MAX_BOUNDARY_LEN,
    MAX_HEADER_SIZE,
};
