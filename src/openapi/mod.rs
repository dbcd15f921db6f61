//! OpenAPI document fetching, bundling, and auth inference.
//!
//! Operation and schema shapes are walked as plain `serde_json::Value` trees
//! rather than through `openapiv3`'s typed structs: the typed deserializer
//! is used only as a structural validity gate (did this parse as a
//! well-formed OpenAPI document at all?), while traversal uses the same
//! camelCase field names the OpenAPI JSON/YAML format itself uses. This
//! keeps ref-bundling and hint generation uniform whether the document came
//! in well-formed or needed best-effort salvage.

pub mod preparer;

pub use preparer::{prepare, DtsStatus, InferredAuth, OpenApiSpecInput, PreparedOperation, PreparedSpec, TypeDeclarationGenerator};
