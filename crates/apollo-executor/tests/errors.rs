use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_executor::panic_message;
use apollo_executor::Executor;
use apollo_executor::FieldFuture;
use apollo_executor::GraphQLError;
use apollo_executor::JsonMap;
use apollo_executor::ObjectValue;
use apollo_executor::Request;
use apollo_executor::ResolveError;
use apollo_executor::ResolvedValue;
use apollo_executor::ResolverContext;
use apollo_executor::Resolvers;
use apollo_executor::Response;
use pretty_assertions::assert_eq;
use serde_json::json;

fn executor(sdl: &str, resolvers: Resolvers) -> Executor {
    let schema = Schema::parse_and_validate(sdl, "schema.graphql").unwrap();
    Executor::new(schema, resolvers).unwrap()
}

async fn execute(executor: &Executor, query: &str) -> serde_json::Value {
    let response = executor
        .execute_request(query, None, JsonMap::new())
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

fn foo_resolvers() -> Resolvers {
    Resolvers::new()
        .field("Query", "x", |_ctx| {
            FieldFuture::value(ObjectValue::root("Foo"))
        })
        .field("Query", "y", |_ctx| FieldFuture::value(ResolvedValue::leaf(1)))
        .field("Foo", "bar", |_ctx| FieldFuture::error("bar failed"))
        .field("Foo", "baz", |_ctx| FieldFuture::value(ResolvedValue::leaf("ok")))
}

#[tokio::test]
async fn error_bubbles_to_nullable_parent() {
    let executor = executor(
        "type Query { x: Foo, y: Int } type Foo { bar: String!, baz: String }",
        foo_resolvers(),
    );
    let response = execute(&executor, "{ x { baz bar } y }").await;
    assert_eq!(
        response,
        json!({
            "data": {"x": null, "y": 1},
            "errors": [{
                "message": "bar failed",
                "locations": [{"line": 1, "column": 11}],
                "path": ["x", "bar"]
            }]
        })
    );
}

#[tokio::test]
async fn error_bubbles_past_non_null_root_field() {
    let executor = executor(
        "type Query { x: Foo!, y: Int } type Foo { bar: String!, baz: String }",
        foo_resolvers(),
    );
    let response = execute(&executor, "{ x { baz bar } y }").await;
    assert_eq!(
        response,
        json!({
            "data": null,
            "errors": [{
                "message": "bar failed",
                "locations": [{"line": 1, "column": 11}],
                "path": ["x", "bar"]
            }]
        })
    );
}

#[tokio::test]
async fn null_for_non_null_field_is_one_error() {
    let executor = executor(
        "type Query { x: Foo } type Foo { bar: String! }",
        Resolvers::new()
            .field("Query", "x", |_ctx| {
                FieldFuture::value(ObjectValue::root("Foo"))
            })
            .field("Foo", "bar", |_ctx| FieldFuture::value(ResolvedValue::null())),
    );
    let response = execute(&executor, "{ x { bar } }").await;
    assert_eq!(
        response,
        json!({
            "data": {"x": null},
            "errors": [{
                "message": "non-null type String! resolved to null",
                "locations": [{"line": 1, "column": 7}],
                "path": ["x", "bar"]
            }]
        })
    );
}

#[tokio::test]
async fn list_item_error_path() {
    let sdl = "type Query { items: [Item!]! } type Item { name: String }";
    let resolvers = Resolvers::new()
        .field("Query", "items", |_ctx| {
            FieldFuture::value(ResolvedValue::list(
                (0..4_usize).map(|index| ObjectValue::new("Item", index).into()),
            ))
        })
        .field("Item", "name", |ctx| {
            FieldFuture::new(async move {
                let index = *ctx.parent_as::<usize>()?;
                if index == 2 {
                    Err(ResolveError::new("no name"))
                } else {
                    Ok(ResolvedValue::leaf(format!("item {index}")))
                }
            })
        });
    let executor = executor(sdl, resolvers);
    let response = execute(&executor, "{ items { name } }").await;
    assert_eq!(
        response,
        json!({
            "data": {
                "items": [
                    {"name": "item 0"},
                    {"name": "item 1"},
                    {"name": null},
                    {"name": "item 3"}
                ]
            },
            "errors": [{
                "message": "no name",
                "locations": [{"line": 1, "column": 11}],
                "path": ["items", 2, "name"]
            }]
        })
    );
}

fn list_with_error(_ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::value(ResolvedValue::List(vec![
        Ok(ResolvedValue::leaf(1)),
        Err(ResolveError::new("not a number")),
        Ok(ResolvedValue::leaf(3)),
    ]))
}

#[tokio::test]
async fn resolver_list_item_errors() {
    let sdl = "type Query { numbers: [Int], strict: [Int!] }";
    let resolvers = Resolvers::new()
        .field("Query", "numbers", list_with_error)
        .field("Query", "strict", list_with_error);
    let executor = executor(sdl, resolvers);
    let response = execute(&executor, "{ numbers strict }").await;
    assert_eq!(
        response,
        json!({
            "data": {"numbers": [1, null, 3], "strict": null},
            "errors": [
                {
                    "message": "not a number",
                    "locations": [{"line": 1, "column": 3}],
                    "path": ["numbers", 1]
                },
                {
                    "message": "not a number",
                    "locations": [{"line": 1, "column": 11}],
                    "path": ["strict", 1]
                }
            ]
        })
    );
}

async fn explode() -> Result<ResolvedValue, ResolveError> {
    panic!("async resolver exploded")
}

#[tokio::test]
async fn panics_become_field_errors() {
    let sdl = "type Query { sync: Int, asynchronous: Int, fine: Int }";
    let resolvers = Resolvers::new()
        .field("Query", "sync", |_ctx| panic!("sync resolver exploded"))
        .field("Query", "asynchronous", |_ctx| FieldFuture::new(explode()))
        .field("Query", "fine", |_ctx| FieldFuture::value(ResolvedValue::leaf(3)));
    let executor = executor(sdl, resolvers);
    let response = execute(&executor, "{ sync asynchronous fine }").await;
    assert_eq!(
        response,
        json!({
            "data": {"sync": null, "asynchronous": null, "fine": 3},
            "errors": [
                {
                    "message": "internal system error",
                    "locations": [{"line": 1, "column": 3}],
                    "path": ["sync"]
                },
                {
                    "message": "internal system error",
                    "locations": [{"line": 1, "column": 8}],
                    "path": ["asynchronous"]
                }
            ]
        })
    );
}

struct Tenant(&'static str);

#[tokio::test]
async fn custom_panic_handler_and_error_presenter() {
    let sdl = "type Query { broken: Int, failing: Int }";
    let resolvers = Resolvers::new()
        .field("Query", "broken", |_ctx| panic!("disk on fire"))
        .field("Query", "failing", |_ctx| {
            FieldFuture::error(ResolveError::new("denied").with_extension("reason", "auth"))
        });
    let executor = executor(sdl, resolvers)
        .panic_handler(|payload| ResolveError::new(format!("panicked: {}", panic_message(&*payload))))
        .error_presenter(|data, error, path| {
            let mut presented = GraphQLError::new(error.message.to_uppercase())
                .with_path(path)
                .with_code("RESOLVER_FAILED");
            if let Some(tenant) = data.get::<Tenant>() {
                presented = presented.with_extension("tenant", tenant.0);
            }
            presented.extensions.extend(error.extensions);
            presented
        });
    let document = ExecutableDocument::parse_and_validate(
        executor.schema(),
        "{ broken failing }",
        "query.graphql",
    )
    .unwrap();
    let response = executor
        .execute(Request::new(&document).data(Tenant("acme")))
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({
            "data": {"broken": null, "failing": null},
            "errors": [
                {
                    "message": "PANICKED: DISK ON FIRE",
                    "locations": [{"line": 1, "column": 3}],
                    "path": ["broken"],
                    "extensions": {"code": "RESOLVER_FAILED", "tenant": "acme"}
                },
                {
                    "message": "DENIED",
                    "locations": [{"line": 1, "column": 10}],
                    "path": ["failing"],
                    "extensions": {"code": "RESOLVER_FAILED", "tenant": "acme", "reason": "auth"}
                }
            ]
        })
    );
}

#[tokio::test]
async fn missing_required_argument_in_unvalidated_document() {
    let executor = executor(
        "type Query { greet(name: String!): String, other: Int }",
        Resolvers::new()
            .field("Query", "greet", |_ctx| FieldFuture::value(ResolvedValue::leaf("hi")))
            .field("Query", "other", |_ctx| FieldFuture::value(ResolvedValue::leaf(1))),
    );
    // Validation would reject this document
    let document = ExecutableDocument::parse(executor.schema(), "{ greet other }", "query.graphql")
        .unwrap_or_else(|invalid| invalid.partial);
    let response = executor.execute(Request::new(&document)).await.unwrap();
    assert_eq!(
        serde_json::to_value(response).unwrap(),
        json!({
            "data": {"greet": null, "other": 1},
            "errors": [{
                "message": "missing value for required argument name",
                "locations": [{"line": 1, "column": 3}],
                "path": ["greet"],
                "extensions": {"APOLLO_VALIDATION_SHOULD_HAVE_CAUGHT_THIS": true}
            }]
        })
    );
}

#[tokio::test]
async fn unknown_fragment_is_reported_at_the_current_path() {
    let executor = executor(
        "type Query { x: Foo } type Foo { bar: String, baz: String }",
        Resolvers::new()
            .field("Query", "x", |_ctx| {
                FieldFuture::value(ObjectValue::root("Foo"))
            })
            .field("Foo", "bar", |_ctx| FieldFuture::value(ResolvedValue::leaf("bar")))
            .field("Foo", "baz", |_ctx| FieldFuture::value(ResolvedValue::leaf("baz"))),
    );
    // Validation would reject this document
    let document = ExecutableDocument::parse(
        executor.schema(),
        "{ x { bar ...Missing baz } }",
        "query.graphql",
    )
    .unwrap_or_else(|invalid| invalid.partial);
    let response: Response = executor.execute(Request::new(&document)).await.unwrap();
    let data = serde_json::to_value(&response.data).unwrap();
    assert_eq!(data, json!({"x": {"bar": "bar", "baz": "baz"}}));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "unknown fragment \"Missing\"");
    assert_eq!(
        serde_json::to_value(&response.errors[0].path).unwrap(),
        json!(["x"])
    );
}
