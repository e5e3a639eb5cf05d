use crate::complexity::calculate_complexity;
use crate::complexity::ComplexityEstimator;
use crate::complexity::DefaultComplexity;
use crate::errors::default_error_presenter;
use crate::errors::default_panic_handler;
use crate::errors::BuildError;
use crate::errors::ErrorPresenter;
use crate::errors::ErrorSink;
use crate::errors::PanicHandler;
use crate::errors::RequestError;
use crate::errors::ResolveError;
use crate::execution::execute_root_selection_set;
use crate::execution::ExecutionContext;
use crate::execution::ExecutionMode;
use crate::execution::CANCELLED_MESSAGE;
use crate::input_coercion::VariableValues;
use crate::resolver::ContextData;
use crate::resolver::ObjectValue;
use crate::resolver::Resolvers;
use crate::response::GraphQLError;
use crate::response::PathElement;
use crate::response::Response;
use crate::JsonMap;
use apollo_compiler::ast;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::OperationType;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

/// Value of the `code` extension of the error added on cancellation
pub const CANCELLED_CODE: &str = "CANCELLED";

const DEFAULT_INTROSPECTION_MESSAGE: &str = "introspection is not supported by this executor";

/// Executes operations against one schema with one set of resolvers.
///
/// Built once, then shared by reference (or cloned cheaply) for every request.
#[derive(Clone)]
pub struct Executor {
    schema: Valid<Schema>,
    resolvers: Resolvers,
    complexity_limit: Option<usize>,
    estimator: Arc<dyn ComplexityEstimator>,
    presenter: Arc<ErrorPresenter>,
    panic_handler: Arc<PanicHandler>,
    introspection_message: String,
}

/// Settings a host application can load from its own configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Operations with a greater [complexity][crate::calculate_complexity] are rejected
    pub complexity_limit: Option<usize>,

    /// Message of the field error for `__schema` and `__type`
    pub introspection_message: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            complexity_limit: None,
            introspection_message: DEFAULT_INTROSPECTION_MESSAGE.to_owned(),
        }
    }
}

enum Variables {
    Raw(JsonMap),
    Coerced(VariableValues),
}

/// One operation to execute, with everything that varies between requests
pub struct Request<'a> {
    document: &'a ExecutableDocument,
    operation_name: Option<String>,
    variables: Variables,
    cancellation: Option<CancellationToken>,
    data: ContextData,
    root_value: Option<ObjectValue>,
}

impl<'a> Request<'a> {
    /// `document` is presumed valid against the schema of the executor
    pub fn new(document: &'a ExecutableDocument) -> Self {
        Self {
            document,
            operation_name: None,
            variables: Variables::Raw(JsonMap::new()),
            cancellation: None,
            data: ContextData::default(),
            root_value: None,
        }
    }

    /// Required if the document contains more than one operation
    pub fn operation_name(mut self, operation_name: Option<&str>) -> Self {
        self.operation_name = operation_name.map(ToOwned::to_owned);
        self
    }

    /// Values of variables as sent by the client, coerced before execution.
    ///
    /// If neither this nor [`coerced_variables`][Self::coerced_variables] is used,
    /// an empty map is assumed.
    pub fn variables(mut self, variables: JsonMap) -> Self {
        self.variables = Variables::Raw(variables);
        self
    }

    pub fn coerced_variables(mut self, variables: VariableValues) -> Self {
        self.variables = Variables::Coerced(variables);
        self
    }

    /// Stop waiting for root fields once `token` is cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Make `value` available to resolvers through [`ResolverContext::data`][crate::ResolverContext::data]
    pub fn data<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.data.insert(value);
        self
    }

    /// The parent object of root fields.
    /// Defaults to [`ObjectValue::root`] for the root operation type.
    pub fn root_value(mut self, root_value: ObjectValue) -> Self {
        self.root_value = Some(root_value);
        self
    }
}

impl Executor {
    /// Fails if a resolver is registered for a type or field the schema does not define
    pub fn new(schema: Valid<Schema>, resolvers: Resolvers) -> Result<Self, BuildError> {
        resolvers.check(&schema)?;
        Ok(Self {
            schema,
            resolvers,
            complexity_limit: None,
            estimator: Arc::new(DefaultComplexity),
            presenter: default_error_presenter(),
            panic_handler: default_panic_handler(),
            introspection_message: DEFAULT_INTROSPECTION_MESSAGE.to_owned(),
        })
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// Reject operations whose complexity is greater than `limit`, before executing them
    pub fn complexity_limit(mut self, limit: usize) -> Self {
        self.complexity_limit = Some(limit);
        self
    }

    /// Custom field costs used with [`complexity_limit`][Self::complexity_limit]
    pub fn complexity_estimator(mut self, estimator: impl ComplexityEstimator + 'static) -> Self {
        self.estimator = Arc::new(estimator);
        self
    }

    /// Replace how resolver errors become response errors.
    ///
    /// By default the message and extensions are kept and the path is attached.
    /// The presenter also sees the data added with [`Request::data`].
    pub fn error_presenter<F>(mut self, presenter: F) -> Self
    where
        F: Fn(&ContextData, ResolveError, Vec<PathElement>) -> GraphQLError + Send + Sync + 'static,
    {
        self.presenter = Arc::new(presenter);
        self
    }

    /// Replace how panics in resolvers become errors.
    ///
    /// By default the panic is logged and the field error says
    /// [`"internal system error"`][crate::INTERNAL_ERROR_MESSAGE].
    pub fn panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Box<dyn Any + Send>) -> ResolveError + Send + Sync + 'static,
    {
        self.panic_handler = Arc::new(handler);
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        let ExecutorConfig {
            complexity_limit,
            introspection_message,
        } = config;
        self.complexity_limit = complexity_limit;
        self.introspection_message = introspection_message;
        self
    }

    /// Complexity of `operation` with the estimator of this executor
    pub fn complexity(
        &self,
        document: &ExecutableDocument,
        operation: &Operation,
        variables: &VariableValues,
    ) -> usize {
        calculate_complexity(
            &self.schema,
            document,
            operation,
            variables,
            &*self.estimator,
        )
    }

    /// Parse and validate `query`, then execute it
    pub async fn execute_request(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: JsonMap,
    ) -> Result<Response, RequestError> {
        let ast = ast::Document::parse(query, "request.graphql")
            .map_err(|invalid| RequestError::Parse(invalid.errors.to_string()))?;
        let document = ast
            .to_executable_validate(&self.schema)
            .map_err(|invalid| RequestError::Validation(invalid.errors.to_string()))?;
        let request = Request::new(&document)
            .operation_name(operation_name)
            .variables(variables);
        self.execute(request).await
    }

    /// <https://spec.graphql.org/October2021/#sec-Executing-Requests>
    ///
    /// Field errors are in the response. `Err` means no resolver ran,
    /// except for cancellation which returns the partial response.
    pub async fn execute(&self, request: Request<'_>) -> Result<Response, RequestError> {
        let Request {
            document,
            operation_name,
            variables,
            cancellation,
            data,
            root_value,
        } = request;
        let operation = document
            .operations
            .get(operation_name.as_deref())
            .map_err(|_| match &operation_name {
                Some(name) => RequestError::UnknownOperation(format!("no operation named '{name}'")),
                None => RequestError::UnknownOperation(
                    "multiple operations but no `operationName`".to_owned(),
                ),
            })?;
        let mode = match operation.operation_type {
            OperationType::Query => ExecutionMode::Normal,
            OperationType::Mutation => ExecutionMode::Sequential,
            OperationType::Subscription => {
                return Err(RequestError::UnsupportedOperation("subscription"))
            }
        };
        let variable_values = match variables {
            Variables::Raw(raw) => VariableValues::coerce(&self.schema, operation, &raw)?,
            Variables::Coerced(coerced) => coerced,
        };
        if let Some(limit) = self.complexity_limit {
            let complexity = self.complexity(document, operation, &variable_values);
            if complexity > limit {
                tracing::debug!(complexity, limit, "operation rejected as too complex");
                return Err(RequestError::ComplexityExceeded { complexity, limit });
            }
        }
        let root_type_name = &operation.selection_set.ty;
        if self.schema.get_object(root_type_name).is_none() {
            return Err(RequestError::SuspectedValidationBug(format!(
                "root operation type {root_type_name} is undefined or not an object type"
            )));
        }
        let root_value = root_value.unwrap_or_else(|| ObjectValue::root(root_type_name.as_str()));

        let ctx = ExecutionContext {
            schema: &self.schema,
            document,
            variable_values: &variable_values,
            resolvers: &self.resolvers,
            data: &data,
            presenter: &*self.presenter,
            panic_handler: &*self.panic_handler,
            introspection_message: &self.introspection_message,
            errors: ErrorSink::default(),
        };
        let span = tracing::debug_span!(
            "graphql.execute",
            operation.name = operation.name.as_ref().map(|name| name.as_str()),
            operation.kind = ?operation.operation_type,
        );
        let outcome = execute_root_selection_set(
            &ctx,
            mode,
            &root_value,
            &operation.selection_set.selections,
            cancellation.as_ref(),
        )
        .instrument(span)
        .await;
        if outcome.cancelled {
            tracing::debug!("operation cancelled before all root fields completed");
            ctx.errors
                .push(GraphQLError::new(CANCELLED_MESSAGE).with_code(CANCELLED_CODE));
        }
        Ok(Response {
            data: outcome.data,
            errors: ctx.errors.into_vec(),
            extensions: JsonMap::new(),
        })
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("resolvers", &self.resolvers)
            .field("complexity_limit", &self.complexity_limit)
            .finish_non_exhaustive()
    }
}
