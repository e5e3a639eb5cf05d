use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_executor::CancellationToken;
use apollo_executor::Executor;
use apollo_executor::FieldFuture;
use apollo_executor::Request;
use apollo_executor::ResolvedValue;
use apollo_executor::ResolverContext;
use apollo_executor::Resolvers;
use apollo_executor::CANCELLED_CODE;
use apollo_executor::CANCELLED_MESSAGE;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn never(_ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(std::future::pending())
}

fn executor() -> Executor {
    let schema = Schema::parse_and_validate(
        "type Query { fast: Int, slow: Int }
         type Mutation { fast: Int, slow: Int, after: Int }",
        "schema.graphql",
    )
    .unwrap();
    let resolvers = Resolvers::new()
        .field("Query", "fast", |_ctx| FieldFuture::value(ResolvedValue::leaf(1)))
        .field("Query", "slow", never)
        .field("Mutation", "fast", |_ctx| FieldFuture::value(ResolvedValue::leaf(1)))
        .field("Mutation", "slow", never)
        .field("Mutation", "after", |_ctx| FieldFuture::value(ResolvedValue::leaf(2)));
    Executor::new(schema, resolvers).unwrap()
}

fn cancel_soon(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
}

async fn run(executor: &Executor, query: &str, token: CancellationToken) -> serde_json::Value {
    let document =
        ExecutableDocument::parse_and_validate(executor.schema(), query, "query.graphql").unwrap();
    let response = executor
        .execute(Request::new(&document).cancellation(token))
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

fn cancelled_error() -> serde_json::Value {
    json!({"message": CANCELLED_MESSAGE, "extensions": {"code": CANCELLED_CODE}})
}

#[tokio::test]
async fn cancellation_keeps_completed_root_fields() {
    let executor = executor();
    let token = CancellationToken::new();
    cancel_soon(&token);
    let response = run(&executor, "{ fast slow }", token).await;
    assert_eq!(
        response,
        json!({"data": {"fast": 1}, "errors": [cancelled_error()]})
    );
}

#[tokio::test]
async fn already_cancelled_request_resolves_nothing() {
    let executor = executor();
    let token = CancellationToken::new();
    token.cancel();
    let response = run(&executor, "{ fast slow }", token).await;
    assert_eq!(response, json!({"data": {}, "errors": [cancelled_error()]}));
}

#[tokio::test]
async fn cancelled_mutation_does_not_start_later_fields() {
    let executor = executor();
    let token = CancellationToken::new();
    cancel_soon(&token);
    let response = run(&executor, "mutation { fast slow after }", token).await;
    assert_eq!(
        response,
        json!({"data": {"fast": 1}, "errors": [cancelled_error()]})
    );
}

#[tokio::test]
async fn uncancelled_token_changes_nothing() {
    let executor = executor();
    let response = run(&executor, "{ fast }", CancellationToken::new()).await;
    assert_eq!(response, json!({"data": {"fast": 1}}));
}
