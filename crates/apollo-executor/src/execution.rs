use crate::collect::collect_fields;
use crate::collect::CollectedField;
use crate::collect::CollectedFields;
use crate::errors::ErrorPresenter;
use crate::errors::ErrorSink;
use crate::errors::PanicHandler;
use crate::errors::ResolveError;
use crate::input_coercion::coerce_argument_values;
use crate::input_coercion::VariableValues;
use crate::resolver::resolve_property;
use crate::resolver::ContextData;
use crate::resolver::FieldFuture;
use crate::resolver::MaybeAsync;
use crate::resolver::ObjectValue;
use crate::resolver::ResolvedValue;
use crate::resolver::ResolverContext;
use crate::resolver::Resolvers;
use crate::response::field_error;
use crate::response::path_to_vec;
use crate::response::to_locations;
use crate::response::LinkedPath;
use crate::response::LinkedPathElement;
use crate::response::PathElement;
use crate::result_coercion::complete_value;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::Type;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use futures::FutureExt as _;
use futures::StreamExt as _;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use tokio_util::sync::CancellationToken;

/// <https://spec.graphql.org/October2021/#sec-Normal-and-Serial-Execution>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    /// Allowed to resolve fields in any order, including concurrently
    Normal,
    /// Top-level fields of a mutation operation must be executed in order
    Sequential,
}

/// Return in `Err` when a field error occurred at some non-nullable place
///
/// <https://spec.graphql.org/October2021/#sec-Handling-Field-Errors>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PropagateNull;

/// Message of the error added when a request is cancelled before all root fields completed
pub const CANCELLED_MESSAGE: &str = "operation was cancelled";

/// State shared by all field futures of one operation
pub(crate) struct ExecutionContext<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) variable_values: &'a VariableValues,
    pub(crate) resolvers: &'a Resolvers,
    pub(crate) data: &'a ContextData,
    pub(crate) presenter: &'a ErrorPresenter,
    pub(crate) panic_handler: &'a PanicHandler,
    pub(crate) introspection_message: &'a str,
    pub(crate) errors: ErrorSink,
}

/// Result of executing the root selection set
pub(crate) struct RootOutcome {
    pub(crate) data: Option<JsonMap>,
    pub(crate) cancelled: bool,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn field_error(
        &self,
        message: impl Into<String>,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
    ) -> PropagateNull {
        self.errors.push(field_error(
            message,
            path,
            location,
            &self.document.sources,
        ));
        PropagateNull
    }

    pub(crate) fn validation_bug(
        &self,
        message: impl Into<String>,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
    ) -> PropagateNull {
        self.errors.push(
            field_error(message, path, location, &self.document.sources)
                .validation_should_have_caught_this(),
        );
        PropagateNull
    }

    /// Record the one error for a failed resolver invocation
    pub(crate) fn resolver_error(
        &self,
        error: ResolveError,
        path: LinkedPath<'_>,
        location: Option<SourceSpan>,
    ) -> PropagateNull {
        let mut presented = (self.presenter)(self.data, error, path_to_vec(path));
        if presented.locations.is_empty() {
            presented.locations = to_locations(location, &self.document.sources);
        }
        self.errors.push(presented);
        PropagateNull
    }

    fn report_unknown_fragments(&self, collected: &CollectedFields<'_>, path: LinkedPath<'_>) {
        for name in &collected.unknown_fragments {
            self.field_error(format!("unknown fragment \"{name}\""), path, name.location());
        }
    }
}

/// Execute the selection set of an operation, racing root fields against cancellation.
///
/// Fields that did not complete before cancellation are absent from the returned map.
pub(crate) async fn execute_root_selection_set<'a>(
    ctx: &ExecutionContext<'a>,
    mode: ExecutionMode,
    root_value: &ObjectValue,
    selections: impl IntoIterator<Item = &'a Selection>,
    cancellation: Option<&CancellationToken>,
) -> RootOutcome {
    let path = None;
    let collected = collect_fields(
        ctx.schema,
        ctx.document,
        ctx.variable_values,
        root_value.type_name(),
        selections,
    );
    ctx.report_unknown_fragments(&collected, path);
    let mut cancelled_signal = pin!(async {
        match cancellation {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    });
    let mut results: Vec<Option<Result<JsonValue, PropagateNull>>> =
        (0..collected.fields.len()).map(|_| None).collect();
    let mut cancelled = false;
    match mode {
        ExecutionMode::Normal => {
            let mut futures = collected
                .fields
                .values()
                .enumerate()
                .map(|(index, field)| async move {
                    (index, execute_field_at(ctx, path, root_value, field).await)
                })
                .collect::<FuturesUnordered<_>>();
            loop {
                tokio::select! {
                    biased;
                    () = &mut cancelled_signal => {
                        cancelled = true;
                        break;
                    }
                    next = futures.next() => match next {
                        Some((index, result)) => results[index] = Some(result),
                        None => break,
                    },
                }
            }
        }
        ExecutionMode::Sequential => {
            // Only start executing one field after the previous one is finished
            for (index, field) in collected.fields.values().enumerate() {
                let result = tokio::select! {
                    biased;
                    () = &mut cancelled_signal => {
                        cancelled = true;
                        break;
                    }
                    result = execute_field_at(ctx, path, root_value, field) => result,
                };
                let propagated = result.is_err();
                results[index] = Some(result);
                if propagated {
                    break;
                }
            }
        }
    }
    let mut data = Some(JsonMap::with_capacity(collected.fields.len()));
    for (response_key, result) in collected.fields.keys().zip(results) {
        match (result, &mut data) {
            (Some(Ok(value)), Some(map)) => {
                map.insert(response_key.as_str(), value);
            }
            (Some(Err(PropagateNull)), _) => data = None,
            _ => {}
        }
    }
    RootOutcome { data, cancelled }
}

/// <https://spec.graphql.org/October2021/#ExecuteSelectionSet()>
///
/// Leaf fields are completed in turn, composite fields concurrently.
/// The response map keeps the order of collected fields either way.
///
/// Leaves with asynchronous resolvers, such as scalars loaded through a data loader,
/// are therefore awaited one after another below the root.
/// Only the root fields of a query and composite fields overlap.
pub(crate) async fn execute_selection_set<'a>(
    ctx: &ExecutionContext<'a>,
    path: LinkedPath<'_>,
    object_value: &ObjectValue,
    selections: impl IntoIterator<Item = &'a Selection>,
) -> Result<JsonMap, PropagateNull> {
    let collected = collect_fields(
        ctx.schema,
        ctx.document,
        ctx.variable_values,
        object_value.type_name(),
        selections,
    );
    ctx.report_unknown_fragments(&collected, path);

    let mut results: Vec<Option<Result<JsonValue, PropagateNull>>> =
        Vec::with_capacity(collected.fields.len());
    let mut composite = Vec::new();
    for (index, field) in collected.fields.values().enumerate() {
        if field.is_leaf(ctx.schema) {
            results.push(Some(execute_field_at(ctx, path, object_value, field).await));
        } else {
            results.push(None);
            composite.push(async move {
                (index, execute_field_at(ctx, path, object_value, field).await)
            });
        }
    }
    // `join_all` waits for every field, even after one of them propagated null
    for (index, result) in join_all(composite).await {
        results[index] = Some(result);
    }

    let mut response_map = JsonMap::with_capacity(collected.fields.len());
    for (response_key, result) in collected.fields.keys().zip(results) {
        if let Some(result) = result {
            response_map.insert(response_key.as_str(), result?);
        }
    }
    Ok(response_map)
}

/// Execute one collected field of `object_value`, whose path is `parent_path`
async fn execute_field_at(
    ctx: &ExecutionContext<'_>,
    parent_path: LinkedPath<'_>,
    object_value: &ObjectValue,
    field: &CollectedField<'_>,
) -> Result<JsonValue, PropagateNull> {
    let field_path = LinkedPathElement {
        element: PathElement::Field(field.response_key().clone()),
        next: parent_path,
    };
    execute_field(ctx, Some(&field_path), object_value, field).await
}

/// <https://spec.graphql.org/October2021/#ExecuteField()>
async fn execute_field(
    ctx: &ExecutionContext<'_>,
    path: LinkedPath<'_>,
    object_value: &ObjectValue,
    field: &CollectedField<'_>,
) -> Result<JsonValue, PropagateNull> {
    let field_def = field.definition();
    let location = field.field_name().location();
    match field.field_name().as_str() {
        "__typename" => return Ok(object_value.type_name().into()),
        "__schema" | "__type" => {
            let propagate = ctx.field_error(ctx.introspection_message, path, location);
            return try_nullify(&field_def.ty, Err(propagate));
        }
        _ => {}
    }
    let first = field.occurrences()[0];
    let argument_values =
        match coerce_argument_values(ctx.schema, ctx.variable_values, field_def, first) {
            Ok(argument_values) => argument_values,
            Err(error) => {
                let propagate = if error.validation_should_have_caught_this {
                    ctx.validation_bug(error.message, path, error.location)
                } else {
                    ctx.field_error(error.message, path, error.location)
                };
                return try_nullify(&field_def.ty, Err(propagate));
            }
        };
    let resolver_ctx = ResolverContext {
        schema: ctx.schema,
        document: ctx.document,
        variables: ctx.variable_values,
        data: ctx.data,
        parent: object_value,
        fields: field.occurrences(),
        arguments: &argument_values,
        path,
    };
    let resolved_result = invoke_resolver(ctx, object_value, field, resolver_ctx).await;
    let completed_result = match resolved_result {
        Ok(resolved) => complete_value(ctx, path, &field_def.ty, resolved, field.occurrences()).await,
        Err(error) => Err(ctx.resolver_error(error, path, location)),
    };
    try_nullify(&field_def.ty, completed_result)
}

/// Call the registered resolver, or the default property resolver,
/// turning a panic in either the call or the returned future into an error.
async fn invoke_resolver(
    ctx: &ExecutionContext<'_>,
    object_value: &ObjectValue,
    field: &CollectedField<'_>,
    resolver_ctx: ResolverContext<'_>,
) -> Result<ResolvedValue, ResolveError> {
    let resolver = ctx
        .resolvers
        .get(object_value.type_name(), field.field_name());
    let called = std::panic::catch_unwind(AssertUnwindSafe(|| match resolver {
        Some(resolver) => resolver(resolver_ctx),
        None => FieldFuture::ready(resolve_property(resolver_ctx)),
    }));
    match called {
        Ok(FieldFuture(MaybeAsync::Sync(result))) => result,
        Ok(FieldFuture(MaybeAsync::Async(future))) => {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err((ctx.panic_handler)(payload)),
            }
        }
        Err(payload) => Err((ctx.panic_handler)(payload)),
    }
}

/// Try to insert a propagated null if possible, or keep propagating it.
///
/// <https://spec.graphql.org/October2021/#sec-Handling-Field-Errors>
pub(crate) fn try_nullify(
    ty: &Type,
    result: Result<JsonValue, PropagateNull>,
) -> Result<JsonValue, PropagateNull> {
    match result {
        Ok(json) => Ok(json),
        Err(PropagateNull) => {
            if ty.is_non_null() {
                Err(PropagateNull)
            } else {
                Ok(JsonValue::Null)
            }
        }
    }
}

/// Sub-selections of every merged field, for completing an object value
pub(crate) fn merged_selections<'a>(
    fields: &'a [&'a Field],
) -> impl Iterator<Item = &'a Selection> + 'a {
    fields
        .iter()
        .flat_map(|field| &field.selection_set.selections)
}
