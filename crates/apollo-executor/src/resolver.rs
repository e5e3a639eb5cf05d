use crate::errors::BuildError;
use crate::errors::ResolveError;
use crate::input_coercion::VariableValues;
use crate::response::path_to_vec;
use crate::response::LinkedPath;
use crate::response::PathElement;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::executable::Field;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::Type;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use futures::future::BoxFuture;
use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A field resolver, as registered in [`Resolvers`]
pub(crate) type ResolverFn = dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync;

/// Table of field resolvers keyed by concrete object type name, then field name.
///
/// Lookup happens with the runtime type of the parent object,
/// so objects returned for an interface or union field dispatch to
/// the resolvers of their own concrete type.
///
/// Fields without a registered resolver read the property of the same name
/// from JSON-backed parent objects (see [`ObjectValue::json`]).
#[derive(Clone, Default)]
pub struct Resolvers {
    by_type: HashMap<String, HashMap<String, Arc<ResolverFn>>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the resolver for `type_name.field_name`, replacing any previous one.
    ///
    /// ```
    /// # use apollo_executor::{FieldFuture, ResolvedValue, Resolvers};
    /// let resolvers = Resolvers::new().field("Query", "hello", |ctx| match ctx.arg("name") {
    ///     Ok(name) => FieldFuture::value(ResolvedValue::leaf(format!("Hello {name}!"))),
    ///     Err(error) => FieldFuture::error(error),
    /// });
    /// ```
    pub fn field<F>(mut self, type_name: &str, field_name: &str, resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        self.by_type
            .entry(type_name.to_owned())
            .or_default()
            .insert(field_name.to_owned(), Arc::new(resolver));
        self
    }

    pub(crate) fn get(&self, type_name: &str, field_name: &str) -> Option<&ResolverFn> {
        self.by_type
            .get(type_name)?
            .get(field_name)
            .map(|resolver| &**resolver)
    }

    /// Every registration must name a field of an object type defined in the schema
    pub(crate) fn check(&self, schema: &Schema) -> Result<(), BuildError> {
        for (type_name, fields) in &self.by_type {
            let object = schema
                .get_object(type_name)
                .ok_or_else(|| BuildError::UnknownType(type_name.clone()))?;
            if let Some(field_name) = fields
                .keys()
                .find(|field_name| !object.fields.contains_key(field_name.as_str()))
            {
                return Err(BuildError::UnknownField {
                    type_name: type_name.clone(),
                    field_name: field_name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (type_name, fields) in &self.by_type {
            map.entry(type_name, &fields.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// A concrete GraphQL object: the name of its object type and an arbitrary Rust value
/// that resolvers of that type can downcast.
#[derive(Clone)]
pub struct ObjectValue {
    type_name: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectValue {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    /// An object whose fields default to the properties of a JSON object
    pub fn json(type_name: impl Into<Arc<str>>, map: JsonMap) -> Self {
        Self::new(type_name, map)
    }

    /// An object without a payload, typically a root operation type
    pub fn root(type_name: impl Into<Arc<str>>) -> Self {
        Self::new(type_name, ())
    }

    /// Name of the concrete object type, expected to be defined in the schema
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        let value: &(dyn Any + Send + Sync) = &*self.value;
        value.downcast_ref()
    }

    pub(crate) fn as_json(&self) -> Option<&JsonMap> {
        self.downcast_ref()
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// The value of a resolved field
#[derive(Debug, Clone)]
pub enum ResolvedValue {
    /// * JSON null represents GraphQL null
    /// * A GraphQL enum value is represented as a JSON string
    /// * GraphQL built-in scalars are coerced according to their respective *Result Coercion* spec
    /// * For custom scalars, any JSON value is passed through as-is (including array or object)
    Leaf(JsonValue),

    /// Expected where the GraphQL type is an object, interface, or union type
    Object(ObjectValue),

    /// Expected for GraphQL list types.
    /// An `Err` item becomes a field error at the path of that item.
    List(Vec<Result<ResolvedValue, ResolveError>>),
}

impl ResolvedValue {
    /// Construct a null leaf resolved value
    pub fn null() -> Self {
        Self::Leaf(JsonValue::Null)
    }

    /// Construct a leaf resolved value from something that is convertible to JSON
    pub fn leaf(json: impl Into<JsonValue>) -> Self {
        Self::Leaf(json.into())
    }

    pub fn object(object: ObjectValue) -> Self {
        Self::Object(object)
    }

    /// Construct an object resolved value or null
    pub fn opt_object(opt_object: Option<ObjectValue>) -> Self {
        match opt_object {
            Some(object) => Self::Object(object),
            None => Self::null(),
        }
    }

    pub fn list<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        Self::List(iter.into_iter().map(Ok).collect())
    }

    /// Convert plain JSON into a resolved value, guided by the GraphQL type it should have.
    ///
    /// JSON objects become JSON-backed [`ObjectValue`]s.
    /// For interface and union types the concrete type is read from a `__typename` property.
    pub fn from_json(schema: &Schema, ty: &Type, json: JsonValue) -> Result<Self, ResolveError> {
        if json.is_null() {
            return Ok(Self::null());
        }
        let ty_name = match ty {
            Type::List(inner) | Type::NonNullList(inner) => {
                return match json {
                    JsonValue::Array(items) => Ok(Self::List(
                        items
                            .into_iter()
                            .map(|item| Self::from_json(schema, inner, item))
                            .collect(),
                    )),
                    // Let result coercion report the mismatch
                    other => Ok(Self::Leaf(other)),
                };
            }
            Type::Named(name) | Type::NonNullNamed(name) => name,
        };
        let object_type_name: Arc<str> = match schema.types.get(ty_name) {
            Some(ExtendedType::Object(_)) => ty_name.as_str().into(),
            Some(ExtendedType::Interface(_) | ExtendedType::Union(_)) => json
                .as_object()
                .and_then(|map| map.get("__typename"))
                .and_then(|typename| typename.as_str())
                .map(Arc::from)
                .ok_or_else(|| {
                    ResolveError::new(format!(
                        "cannot determine the concrete type of a {ty_name} value \
                         without a __typename property"
                    ))
                })?,
            _ => return Ok(Self::Leaf(json)),
        };
        match json {
            JsonValue::Object(map) => Ok(Self::Object(ObjectValue::json(object_type_name, map))),
            other => Ok(Self::Leaf(other)),
        }
    }
}

impl From<ObjectValue> for ResolvedValue {
    fn from(object: ObjectValue) -> Self {
        Self::Object(object)
    }
}

pub(crate) enum MaybeAsync<'a> {
    Sync(Result<ResolvedValue, ResolveError>),
    Async(BoxFuture<'a, Result<ResolvedValue, ResolveError>>),
}

/// What a resolver returns: either an already available result,
/// or a future for resolvers that need to wait on I/O.
pub struct FieldFuture<'a>(pub(crate) MaybeAsync<'a>);

impl<'a> FieldFuture<'a> {
    pub fn new<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<ResolvedValue, ResolveError>> + Send + 'a,
    {
        Self(MaybeAsync::Async(Box::pin(future)))
    }

    pub fn ready(result: Result<ResolvedValue, ResolveError>) -> Self {
        Self(MaybeAsync::Sync(result))
    }

    pub fn value(value: impl Into<ResolvedValue>) -> Self {
        Self::ready(Ok(value.into()))
    }

    pub fn error(error: impl Into<ResolveError>) -> Self {
        Self::ready(Err(error.into()))
    }
}

impl From<JsonValue> for ResolvedValue {
    fn from(json: JsonValue) -> Self {
        Self::Leaf(json)
    }
}

/// Request-scoped values made available to every resolver, keyed by Rust type.
#[derive(Clone, Default)]
pub struct ContextData {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ContextData {
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        let value: &(dyn Any + Send + Sync) = &**self.values.get(&TypeId::of::<T>())?;
        value.downcast_ref()
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextData")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Information passed to a field resolver
#[derive(Clone, Copy)]
pub struct ResolverContext<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) variables: &'a VariableValues,
    pub(crate) data: &'a ContextData,
    pub(crate) parent: &'a ObjectValue,
    pub(crate) fields: &'a [&'a Field],
    pub(crate) arguments: &'a JsonMap,
    pub(crate) path: LinkedPath<'a>,
}

impl<'a> ResolverContext<'a> {
    /// The object whose field is being resolved
    pub fn parent(&self) -> &'a ObjectValue {
        self.parent
    }

    /// The payload of the parent object, or an error if it is not a `T`
    pub fn parent_as<T: Any>(&self) -> Result<&'a T, ResolveError> {
        self.parent.downcast_ref().ok_or_else(|| {
            ResolveError::new(format!(
                "unexpected parent value for field {}.{}",
                self.parent.type_name(),
                self.field_name()
            ))
        })
    }

    /// The arguments passed to this field, after
    /// [`CoerceArgumentValues()`](https://spec.graphql.org/October2021/#sec-Coercing-Field-Arguments):
    /// this matches the argument definitions in the schema.
    pub fn args(&self) -> &'a JsonMap {
        self.arguments
    }

    pub fn arg(&self, name: &str) -> Result<&'a JsonValue, ResolveError> {
        self.arguments
            .get(name)
            .ok_or_else(|| ResolveError::new(format!("missing argument {name}")))
    }

    /// The name of the field being resolved
    pub fn field_name(&self) -> &'a Name {
        &self.fields[0].name
    }

    pub fn response_key(&self) -> &'a Name {
        self.fields[0].response_key()
    }

    /// The field definition in the schema
    pub fn field_definition(&self) -> &'a FieldDefinition {
        &self.fields[0].definition
    }

    /// The field selections being resolved.
    ///
    /// There is always at least one, but there may be more in case of
    /// [field merging](https://spec.graphql.org/October2021/#sec-Field-Selection-Merging).
    pub fn field_selections(&self) -> &'a [&'a Field] {
        self.fields
    }

    /// Path of this field in the response
    pub fn path(&self) -> Vec<PathElement> {
        path_to_vec(self.path)
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn document(&self) -> &'a ExecutableDocument {
        self.document
    }

    pub fn variables(&self) -> &'a VariableValues {
        self.variables
    }

    /// A request-scoped value previously added with [`Request::data`][crate::Request::data]
    pub fn data<T: Any>(&self) -> Option<&'a T> {
        self.data.get()
    }
}

/// Used for fields without a registered resolver
pub(crate) fn resolve_property(ctx: ResolverContext<'_>) -> Result<ResolvedValue, ResolveError> {
    let Some(map) = ctx.parent.as_json() else {
        return Err(ResolveError::unknown_field(
            ctx.parent.type_name(),
            ctx.field_name(),
        ));
    };
    let value = map
        .get(ctx.field_name().as_str())
        .cloned()
        .unwrap_or(JsonValue::Null);
    ResolvedValue::from_json(ctx.schema, &ctx.field_definition().ty, value)
}
