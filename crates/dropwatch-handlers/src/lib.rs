//! Dropwatch Handlers - handler registry and built-in handlers
//!
//! Handlers are resolved once at startup from the comma-separated
//! `eventHandlerClasses` setting. Each identifier maps to a constructor that
//! reads the handler's own configuration profile.
//!
//! Built-in handlers:
//! - `printout` - prints every new file to stdout (the default)
//! - `upload` - uploads every new file to an HTTP object store and removes
//!   the local copy once the upload is confirmed

pub mod printout;
pub mod registry;
pub mod upload;

pub use printout::PrintoutHandler;
pub use registry::{HandlerCtor, HandlerRegistry};
pub use upload::{HttpUploadHandler, UploadConfig};
