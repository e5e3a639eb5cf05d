use crate::resolver::ContextData;
use crate::response::GraphQLError;
use crate::response::PathElement;
use crate::response::RequestErrorResponse;
use crate::JsonMap;
use crate::JsonValue;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Message of the field error produced by the default [`PanicHandler`]
pub const INTERNAL_ERROR_MESSAGE: &str = "internal system error";

/// The error type returned by resolvers.
///
/// Becomes exactly one [`GraphQLError`] at the path of the field being resolved,
/// after going through the [`ErrorPresenter`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ResolveError {
    pub message: String,
    pub extensions: JsonMap,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: JsonMap::new(),
        }
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    pub(crate) fn unknown_field(type_name: &str, field_name: &str) -> Self {
        Self::new(format!("no resolver for field {type_name}.{field_name}"))
    }
}

impl From<String> for ResolveError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ResolveError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A [request error](https://spec.graphql.org/October2021/#sec-Errors.Request-errors):
/// the operation as a whole is rejected and no resolver runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UnknownOperation(String),

    #[error("{}", .0.message)]
    VariableCoercion(GraphQLError),

    #[error("operation is too complex: complexity {complexity} exceeds the limit of {limit}")]
    ComplexityExceeded { complexity: usize, limit: usize },

    #[error("{0} operations are not supported by this executor")]
    UnsupportedOperation(&'static str),

    #[error("{0}")]
    SuspectedValidationBug(String),
}

impl RequestError {
    /// The value of the `code` extension for this error
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Parse(_) => "GRAPHQL_PARSE_FAILED",
            RequestError::Validation(_) => "GRAPHQL_VALIDATION_FAILED",
            RequestError::UnknownOperation(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            RequestError::VariableCoercion(_) => "GRAPHQL_VALIDATION_FAILED",
            RequestError::ComplexityExceeded { .. } => "COMPLEXITY_LIMIT_EXCEEDED",
            RequestError::UnsupportedOperation(_) => "OPERATION_NOT_SUPPORTED",
            RequestError::SuspectedValidationBug(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Serializable response without a `data` key
    pub fn to_response(&self) -> RequestErrorResponse {
        let error = match self {
            RequestError::VariableCoercion(error) => error.clone(),
            RequestError::SuspectedValidationBug(message) => {
                GraphQLError::new(message.clone()).validation_should_have_caught_this()
            }
            _ => GraphQLError::new(self.to_string()),
        };
        error.with_code(self.code()).into_request_error()
    }
}

/// Errors from [`Executor::new`][crate::Executor::new]:
/// a resolver was registered for something the schema does not define.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("resolver registered for undefined object type {0}")]
    UnknownType(String),

    #[error("resolver registered for undefined field {type_name}.{field_name}")]
    UnknownField {
        type_name: String,
        field_name: String,
    },
}

/// Turns a resolver error into the error found in the response.
///
/// Receives the request-scoped data given to resolvers.
/// The path is a snapshot taken when the resolver failed.
pub type ErrorPresenter =
    dyn Fn(&ContextData, ResolveError, Vec<PathElement>) -> GraphQLError + Send + Sync;

/// Turns the payload of a panic caught around a resolver into a user-safe error
pub type PanicHandler = dyn Fn(Box<dyn Any + Send>) -> ResolveError + Send + Sync;

pub(crate) fn default_error_presenter() -> Arc<ErrorPresenter> {
    Arc::new(|_: &ContextData, error: ResolveError, path: Vec<PathElement>| {
        let mut presented = GraphQLError::new(error.message).with_path(path);
        presented.extensions = error.extensions;
        presented
    })
}

pub(crate) fn default_panic_handler() -> Arc<PanicHandler> {
    Arc::new(|payload: Box<dyn Any + Send>| {
        tracing::error!(panic = panic_message(&*payload), "resolver panicked");
        ResolveError::new(INTERNAL_ERROR_MESSAGE)
    })
}

/// Best effort extraction of the message given to `panic!`
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "Box<dyn Any>"
    }
}

/// Request-scoped, append-only list of field errors.
///
/// Shared by reference between all field futures of one operation.
#[derive(Debug, Default)]
pub(crate) struct ErrorSink {
    errors: Mutex<Vec<GraphQLError>>,
}

impl ErrorSink {
    pub(crate) fn push(&self, error: GraphQLError) {
        self.errors.lock().push(error)
    }

    pub(crate) fn into_vec(self) -> Vec<GraphQLError> {
        self.errors.into_inner()
    }
}
