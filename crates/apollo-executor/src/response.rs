use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::parser::SourceMap;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::Name;
use serde::Serialize;

/// <https://spec.graphql.org/October2021/#sec-Response-Format>
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    /// None/null if a field error was propagated all the way to the root
    pub data: Option<JsonMap>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Reserved for additional information added by the host, such as tracing data
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub extensions: JsonMap,
}

/// A response that contains a [request error].
///
/// Does not contain a `data` entry. This is different from `data: null`.
///
/// [request error]: https://spec.graphql.org/October2021/#sec-Errors.Request-errors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestErrorResponse {
    pub errors: [GraphQLError; 1],
}

/// <https://spec.graphql.org/October2021/#sec-Errors.Error-result-format>
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQLError {
    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// Empty for request errors.
    /// Otherwise the path of the field that failed, at the time it failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathElement>,

    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub extensions: JsonMap,
}

/// Key of the `extensions` entry that classifies an error
pub const EXTENSION_CODE: &str = "code";

/// Possible key in the `GraphQLError::extensions` map
pub const EXTENSION_VALIDATION_SHOULD_HAVE_CAUGHT_THIS: &str =
    "APOLLO_VALIDATION_SHOULD_HAVE_CAUGHT_THIS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// One segment of [`GraphQLError::path`]: a response key or a list index.
///
/// Serialized as a JSON string or integer respectively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Field(Name),
    ListIndex(usize),
}

/// Linked-list version of `Vec<PathElement>`, taking advantage of the call stack.
///
/// Each concurrently executing field holds its own immutable element
/// pointing at its parent's, so sibling branches never share a mutable path.
pub(crate) type LinkedPath<'a> = Option<&'a LinkedPathElement<'a>>;

pub(crate) struct LinkedPathElement<'a> {
    pub(crate) element: PathElement,
    pub(crate) next: LinkedPath<'a>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: JsonMap::new(),
        }
    }

    pub fn with_path(mut self, path: Vec<PathElement>) -> Self {
        self.path = path;
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    pub fn with_code(self, code: &str) -> Self {
        self.with_extension(EXTENSION_CODE, code)
    }

    pub(crate) fn validation_should_have_caught_this(self) -> Self {
        self.with_extension(EXTENSION_VALIDATION_SHOULD_HAVE_CAUGHT_THIS, true)
    }

    pub(crate) fn into_request_error(self) -> RequestErrorResponse {
        RequestErrorResponse { errors: [self] }
    }

    /// Fill `locations` from the source span of the AST node that caused this error
    pub(crate) fn at(mut self, location: Option<SourceSpan>, sources: &SourceMap) -> Self {
        self.locations = to_locations(location, sources);
        self
    }
}

pub(crate) fn field_error(
    message: impl Into<String>,
    path: LinkedPath<'_>,
    location: Option<SourceSpan>,
    sources: &SourceMap,
) -> GraphQLError {
    GraphQLError::new(message)
        .with_path(path_to_vec(path))
        .at(location, sources)
}

/// Snapshot of a linked path, from the root of the response
pub(crate) fn path_to_vec(mut link: LinkedPath<'_>) -> Vec<PathElement> {
    let mut path = Vec::new();
    while let Some(node) = link {
        path.push(node.element.clone());
        link = node.next;
    }
    path.reverse();
    path
}

pub(crate) fn to_locations(location: Option<SourceSpan>, sources: &SourceMap) -> Vec<Location> {
    location
        .and_then(|location| location.line_column(sources))
        .map(|line_column| Location {
            line: line_column.line,
            column: line_column.column,
        })
        .into_iter()
        .collect()
}

impl Serialize for PathElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            PathElement::Field(name) => name.as_str().serialize(serializer),
            PathElement::ListIndex(index) => index.serialize(serializer),
        }
    }
}

impl std::fmt::Display for PathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathElement::Field(name) => f.write_str(name.as_str()),
            PathElement::ListIndex(index) => write!(f, "{index}"),
        }
    }
}
