//! Small helpers shared by the client and the CLI.
//!
//! - **Base URL validation**: HTTPS enforcement for the API endpoint
//! - **Terminal text**: width-aware padding/truncation and escape stripping
//!   for table output

mod text;
mod url_validator;

pub use text::{display_width, pad_to_width, strip_control_chars, truncate_to_width};
pub use url_validator::validate_base_url;
