//! Form workflow validation and versioned storage.
//!
//! A workflow is a JSON array of typed steps (start, section, condition, end)
//! attached to a form. `validate` checks a document in draft or activation
//! mode, `diagnostics` turns failures into per-node entries for the editor,
//! and `store` keeps draft/active versions per form.

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod parse;
pub mod service;
pub mod store;
pub mod validate;

pub use error::{Error, ErrorKind, ValidationError, ValidationErrors};
pub use service::WorkflowService;
