//! A GraphQL execution engine for [`apollo_compiler`] documents.
//!
//! Fields are resolved by functions registered in [`Resolvers`],
//! or read from JSON-backed objects when no resolver is registered.
//! Sibling fields resolve concurrently, root fields of a mutation one after another.
//! Field errors are collected with their response path and nullify
//! the nearest nullable ancestor, per the GraphQL specification.
//!
//! Example usage:
//!
//! ```
#![doc = include_str!("../tests/doc_example.rs")]
//! ```

mod collect;
mod complexity;
mod errors;
mod execution;
mod executor;
mod input_coercion;
mod resolver;
mod response;
mod result_coercion;

pub use self::collect::collect_fields;
pub use self::collect::CollectedField;
pub use self::collect::CollectedFields;
pub use self::complexity::calculate_complexity;
pub use self::complexity::ComplexityEstimator;
pub use self::complexity::DefaultComplexity;
pub use self::complexity::FieldComplexities;
pub use self::complexity::MAX_COMPLEXITY;
pub use self::errors::panic_message;
pub use self::errors::BuildError;
pub use self::errors::ErrorPresenter;
pub use self::errors::PanicHandler;
pub use self::errors::RequestError;
pub use self::errors::ResolveError;
pub use self::errors::INTERNAL_ERROR_MESSAGE;
pub use self::execution::CANCELLED_MESSAGE;
pub use self::executor::Executor;
pub use self::executor::ExecutorConfig;
pub use self::executor::Request;
pub use self::executor::CANCELLED_CODE;
pub use self::input_coercion::VariableValues;
pub use self::resolver::ContextData;
pub use self::resolver::FieldFuture;
pub use self::resolver::ObjectValue;
pub use self::resolver::ResolvedValue;
pub use self::resolver::ResolverContext;
pub use self::resolver::Resolvers;
pub use self::response::GraphQLError;
pub use self::response::Location;
pub use self::response::PathElement;
pub use self::response::RequestErrorResponse;
pub use self::response::Response;
pub use self::response::EXTENSION_CODE;
pub use self::response::EXTENSION_VALIDATION_SHOULD_HAVE_CAUGHT_THIS;
pub use serde_json_bytes;
pub use serde_json_bytes::ByteString;
pub use serde_json_bytes::Value as JsonValue;
pub use tokio_util::sync::CancellationToken;

/// Represents a JSON object
pub type JsonMap = serde_json_bytes::Map<ByteString, JsonValue>;
