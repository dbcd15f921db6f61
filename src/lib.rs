//! Compiles OpenAPI, GraphQL, Postman, and MCP sources into a uniform
//! callable-tool abstraction, then runs the approval/policy/credential
//! pipeline that turns a tool path and JSON input into a result.

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod executors;
pub mod host;
pub mod inventory;
pub mod invocation;
pub mod model;
pub mod openapi;
pub mod policy;
pub mod serialize;
pub mod sources;
pub mod util;

pub use error::{Result, ToolmeshError};
