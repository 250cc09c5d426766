//! Wire protocol collaborators of a connection context.
//!
//! # Data Flow
//! ```text
//! accepted transport
//!     → base.rs (open input stream, optional TLS)
//!     → request.rs (Http | Smtp variant)
//!         → http.rs (httparse head + Content-Length body)
//!         → smtp.rs (command dialogue, DATA collection)
//!     → response.rs (status + headers + body → HTTP/1.1 bytes)
//! ```

pub mod base;
pub mod error;
pub mod headers;
pub mod http;
pub mod request;
pub mod response;
pub mod smtp;

pub use error::RequestError;
pub use headers::Headers;
pub use http::HttpRequest;
pub use request::Request;
pub use response::Response;
pub use smtp::SmtpRequest;
