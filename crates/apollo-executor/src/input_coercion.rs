use crate::errors::RequestError;
use crate::response::GraphQLError;
use crate::JsonMap;
use crate::JsonValue;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Operation;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::Type;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use std::collections::HashMap;

/// Values of variables from a given GraphQL request, after coercion to types expected by the operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableValues(JsonMap);

impl std::ops::Deref for VariableValues {
    type Target = JsonMap;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VariableValues {
    /// <https://spec.graphql.org/October2021/#sec-Coercing-Variable-Values>
    ///
    /// `schema` and `operation` are presumed valid
    pub fn coerce(
        schema: &Schema,
        operation: &Operation,
        values: &JsonMap,
    ) -> Result<Self, RequestError> {
        coerce_variable_values(schema, operation, values)
    }

    /// Use values that were already coerced, for example by a gateway upstream
    pub fn assume_coerced(values: JsonMap) -> Self {
        Self(values)
    }

    pub fn into_inner(self) -> JsonMap {
        self.0
    }
}

/// Why argument values of a field could not be computed.
///
/// This only affects the field being resolved, which becomes null.
#[derive(Debug, Clone)]
pub(crate) struct ArgumentError {
    pub(crate) message: String,
    pub(crate) location: Option<SourceSpan>,
    pub(crate) validation_should_have_caught_this: bool,
}

macro_rules! request_error {
    ($($arg: tt)+) => {
        return Err(RequestError::VariableCoercion(GraphQLError::new(format!($($arg)+))))
    };
}

macro_rules! validation_should_have_caught_this {
    ($($arg: tt)+) => {
        return Err(RequestError::SuspectedValidationBug(format!($($arg)+)))
    };
}

/// <https://spec.graphql.org/October2021/#CoerceVariableValues()>
fn coerce_variable_values(
    schema: &Schema,
    operation: &Operation,
    values: &JsonMap,
) -> Result<VariableValues, RequestError> {
    let mut coerced_values = JsonMap::new();
    for variable_def in &operation.variables {
        let name = variable_def.name.as_str();
        if let Some((key, value)) = values.get_key_value(name) {
            let value =
                coerce_variable_value(schema, "variable", "", "", name, &variable_def.ty, value)?;
            coerced_values.insert(key.clone(), value);
        } else if let Some(default) = &variable_def.default_value {
            let value = graphql_value_to_json("variable", "", "", name, default)
                .map_err(|error| RequestError::VariableCoercion(GraphQLError::new(error.message)))?;
            coerced_values.insert(name, value);
        } else if variable_def.ty.is_non_null() {
            request_error!("missing value for non-null variable '{name}'")
        } else {
            // Nullable variable with no provided value nor explicit default.
            // The GraphQL specification says nothing for this case, but for input objects:
            //
            // > there is a semantic difference between the explicitly provided value null
            // > versus having not provided a value
        }
    }
    Ok(VariableValues(coerced_values))
}

fn coerce_variable_value(
    schema: &Schema,
    kind: &str,
    parent: &str,
    sep: &str,
    name: &str,
    ty: &Type,
    value: &JsonValue,
) -> Result<JsonValue, RequestError> {
    if value.is_null() {
        if ty.is_non_null() {
            request_error!("null value for non-null {kind} {parent}{sep}{name}")
        } else {
            return Ok(JsonValue::Null);
        }
    }
    let ty_name = match ty {
        Type::List(inner) | Type::NonNullList(inner) => {
            // https://spec.graphql.org/October2021/#sec-List.Input-Coercion
            return value
                .as_array()
                .map(Vec::as_slice)
                // If not an array, treat the value as an array of size one:
                .unwrap_or(std::slice::from_ref(value))
                .iter()
                .map(|item| coerce_variable_value(schema, kind, parent, sep, name, inner, item))
                .collect();
        }
        Type::Named(ty_name) | Type::NonNullNamed(ty_name) => ty_name,
    };
    let Some(ty_def) = schema.types.get(ty_name) else {
        validation_should_have_caught_this!(
            "Undefined type {ty_name} for {kind} {parent}{sep}{name}"
        )
    };
    match ty_def {
        ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            validation_should_have_caught_this!(
                "Non-input type {ty_name} for {kind} {parent}{sep}{name}."
            )
        }
        ExtendedType::Scalar(_) => match ty_name.as_str() {
            "Int" => {
                // https://spec.graphql.org/October2021/#sec-Int.Input-Coercion
                if value
                    .as_i64()
                    .is_some_and(|value| i32::try_from(value).is_ok())
                {
                    return Ok(value.clone());
                }
            }
            "Float" => {
                // https://spec.graphql.org/October2021/#sec-Float.Input-Coercion
                // Integer input values are accepted for Float
                if value.is_number() {
                    return Ok(value.clone());
                }
            }
            "String" => {
                // https://spec.graphql.org/October2021/#sec-String.Input-Coercion
                if value.is_string() {
                    return Ok(value.clone());
                }
            }
            "Boolean" => {
                // https://spec.graphql.org/October2021/#sec-Boolean.Input-Coercion
                if value.is_boolean() {
                    return Ok(value.clone());
                }
            }
            "ID" => {
                // https://spec.graphql.org/October2021/#sec-ID.Input-Coercion
                if value.is_string() || value.is_i64() {
                    return Ok(value.clone());
                }
            }
            _ => {
                // Custom scalars are passed through, their resolvers parse them
                return Ok(value.clone());
            }
        },
        ExtendedType::Enum(ty_def) => {
            // https://spec.graphql.org/October2021/#sec-Enums.Input-Coercion
            if let Some(str) = value.as_str() {
                if ty_def.values.contains_key(str) {
                    return Ok(value.clone());
                }
            }
        }
        ExtendedType::InputObject(ty_def) => {
            // https://spec.graphql.org/October2021/#sec-Input-Objects.Input-Coercion
            if let Some(object) = value.as_object() {
                if let Some(key) = object
                    .keys()
                    .find(|key| !ty_def.fields.contains_key(key.as_str()))
                {
                    request_error!(
                        "Input object has key {} not in type {ty_name}",
                        key.as_str()
                    )
                }
                let mut object = object.clone();
                for (field_name, field_def) in &ty_def.fields {
                    if let Some(field_value) = object.get_mut(field_name.as_str()) {
                        *field_value = coerce_variable_value(
                            schema,
                            "input field",
                            ty_name,
                            ".",
                            field_name,
                            &field_def.ty,
                            field_value,
                        )?
                    } else if let Some(default) = &field_def.default_value {
                        let default =
                            graphql_value_to_json("input field", ty_name, ".", field_name, default)
                                .map_err(|error| {
                                    RequestError::VariableCoercion(GraphQLError::new(
                                        error.message,
                                    ))
                                })?;
                        object.insert(field_name.as_str(), default);
                    } else if field_def.ty.is_non_null() {
                        request_error!(
                            "Missing value for non-null input object field {ty_name}.{field_name}"
                        )
                    } else {
                        // Field not required
                    }
                }
                return Ok(object.into());
            }
        }
    }
    request_error!("Could not coerce {kind} {parent}{sep}{name}: {value} to type {ty_name}")
}

/// Convert a constant GraphQL value (without variables) to JSON
fn graphql_value_to_json(
    kind: &str,
    parent: &str,
    sep: &str,
    name: &str,
    value: &Node<Value>,
) -> Result<JsonValue, ArgumentError> {
    let error = |message: String, validation_should_have_caught_this| ArgumentError {
        message,
        location: value.location(),
        validation_should_have_caught_this,
    };
    match value.as_ref() {
        Value::Null => Ok(JsonValue::Null),
        Value::Variable(_) => Err(error(
            format!("Variable in default value of {kind} {parent}{sep}{name}."),
            true,
        )),
        Value::Enum(value) => Ok(value.as_str().into()),
        Value::String(value) => Ok(value.as_str().into()),
        Value::Boolean(value) => Ok((*value).into()),
        // Rely on `serde_json::Number`’s own parser to use whatever precision it supports
        Value::Int(int) => int
            .as_str()
            .parse()
            .map(JsonValue::Number)
            .map_err(|_| error(format!("Int value overflow in {kind} {parent}{sep}{name}"), false)),
        Value::Float(float) => float.as_str().parse().map(JsonValue::Number).map_err(|_| {
            error(
                format!("Float value overflow in {kind} {parent}{sep}{name}"),
                false,
            )
        }),
        Value::List(items) => items
            .iter()
            .map(|item| graphql_value_to_json(kind, parent, sep, name, item))
            .collect(),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| {
                Ok((
                    key.as_str(),
                    graphql_value_to_json(kind, parent, sep, name, value)?,
                ))
            })
            .collect(),
    }
}

/// <https://spec.graphql.org/October2021/#sec-Coercing-Field-Arguments>
///
/// Arguments are coerced in the order of their definition in the schema.
/// The first failing argument stops coercion for this field.
pub(crate) fn coerce_argument_values(
    schema: &Schema,
    variable_values: &VariableValues,
    field_def: &FieldDefinition,
    field: &Field,
) -> Result<JsonMap, ArgumentError> {
    let mut coerced_values = JsonMap::new();
    for arg_def in &field_def.arguments {
        let arg_name = &arg_def.name;
        if let Some(arg) = field.arguments.iter().find(|arg| arg.name == *arg_name) {
            if let Value::Variable(var_name) = arg.value.as_ref() {
                if let Some(var_value) = variable_values.get(var_name.as_str()) {
                    if var_value.is_null() && arg_def.ty.is_non_null() {
                        return Err(ArgumentError {
                            message: format!("null value for non-nullable argument {arg_name}"),
                            location: arg.value.location(),
                            validation_should_have_caught_this: false,
                        });
                    }
                    coerced_values.insert(arg_name.as_str(), var_value.clone());
                    continue;
                }
                // Variable not provided: use the default value if any
            } else if arg.value.is_null() && arg_def.ty.is_non_null() {
                return Err(ArgumentError {
                    message: format!("null value for non-nullable argument {arg_name}"),
                    location: arg.value.location(),
                    validation_should_have_caught_this: true,
                });
            } else {
                let coerced_value = coerce_argument_value(
                    schema,
                    variable_values,
                    "argument",
                    "",
                    "",
                    arg_name,
                    &arg_def.ty,
                    &arg.value,
                )?;
                coerced_values.insert(arg_name.as_str(), coerced_value);
                continue;
            }
        }
        if let Some(default) = &arg_def.default_value {
            let value = graphql_value_to_json("argument", "", "", arg_name, default)?;
            coerced_values.insert(arg_name.as_str(), value);
            continue;
        }
        if arg_def.ty.is_non_null() {
            return Err(ArgumentError {
                message: format!("missing value for required argument {arg_name}"),
                location: field.name.location(),
                validation_should_have_caught_this: true,
            });
        }
    }
    Ok(coerced_values)
}

#[allow(clippy::too_many_arguments)] // internal recursion carrying error message context
fn coerce_argument_value(
    schema: &Schema,
    variable_values: &VariableValues,
    kind: &str,
    parent: &str,
    sep: &str,
    name: &str,
    ty: &Type,
    value: &Node<Value>,
) -> Result<JsonValue, ArgumentError> {
    let error = |message: String, validation_should_have_caught_this| ArgumentError {
        message,
        location: value.location(),
        validation_should_have_caught_this,
    };
    if value.is_null() {
        if ty.is_non_null() {
            return Err(error(
                format!("null value for non-null {kind} {parent}{sep}{name}"),
                true,
            ));
        } else {
            return Ok(JsonValue::Null);
        }
    }
    if let Some(var_name) = value.as_variable() {
        if let Some(var_value) = variable_values.get(var_name.as_str()) {
            if var_value.is_null() && ty.is_non_null() {
                return Err(error(
                    format!("null variable value for non-null {kind} {parent}{sep}{name}"),
                    false,
                ));
            } else {
                return Ok(var_value.clone());
            }
        } else if ty.is_non_null() {
            return Err(error(
                format!("missing variable for non-null {kind} {parent}{sep}{name}"),
                false,
            ));
        } else {
            return Ok(JsonValue::Null);
        }
    }
    let ty_name = match ty {
        Type::List(inner_ty) | Type::NonNullList(inner_ty) => {
            // https://spec.graphql.org/October2021/#sec-List.Input-Coercion
            return value
                .as_list()
                // If not an array, treat the value as an array of size one:
                .unwrap_or(std::slice::from_ref(value))
                .iter()
                .map(|item| {
                    coerce_argument_value(
                        schema,
                        variable_values,
                        kind,
                        parent,
                        sep,
                        name,
                        inner_ty,
                        item,
                    )
                })
                .collect();
        }
        Type::Named(ty_name) | Type::NonNullNamed(ty_name) => ty_name,
    };
    let Some(ty_def) = schema.types.get(ty_name) else {
        return Err(error(
            format!("Undefined type {ty_name} for {kind} {parent}{sep}{name}"),
            true,
        ));
    };
    match ty_def {
        ExtendedType::InputObject(ty_def) => {
            // https://spec.graphql.org/October2021/#sec-Input-Objects.Input-Coercion
            let Some(object) = value.as_object() else {
                return Err(error(
                    format!("Could not coerce {kind} {parent}{sep}{name}: {value} to type {ty_name}"),
                    true,
                ));
            };
            if let Some((key, _value)) = object
                .iter()
                .find(|(key, _value)| !ty_def.fields.contains_key(key))
            {
                return Err(error(
                    format!("Input object has key {key} not in type {ty_name}"),
                    true,
                ));
            }
            // `map` converts `&(k, v)` to `(&k, &v)`
            let object: HashMap<_, _> = object.iter().map(|(k, v)| (k, v)).collect();
            let mut coerced_object = JsonMap::new();
            for (field_name, field_def) in &ty_def.fields {
                if let Some(field_value) = object.get(field_name) {
                    let coerced_value = coerce_argument_value(
                        schema,
                        variable_values,
                        "input field",
                        ty_name,
                        ".",
                        field_name,
                        &field_def.ty,
                        field_value,
                    )?;
                    coerced_object.insert(field_name.as_str(), coerced_value);
                } else if let Some(default) = &field_def.default_value {
                    let default =
                        graphql_value_to_json("input field", ty_name, ".", field_name, default)?;
                    coerced_object.insert(field_name.as_str(), default);
                } else if field_def.ty.is_non_null() {
                    return Err(error(
                        format!(
                            "Missing value for non-null input object field {ty_name}.{field_name}"
                        ),
                        true,
                    ));
                } else {
                    // Field not required
                }
            }
            Ok(coerced_object.into())
        }
        // For scalar and enums, rely on validation and just convert between Rust types
        _ => graphql_value_to_json(kind, parent, sep, name, value),
    }
}
