use crate::errors::ResolveError;
use crate::execution::execute_selection_set;
use crate::execution::merged_selections;
use crate::execution::try_nullify;
use crate::execution::ExecutionContext;
use crate::execution::PropagateNull;
use crate::resolver::ObjectValue;
use crate::resolver::ResolvedValue;
use crate::response::LinkedPath;
use crate::response::LinkedPathElement;
use crate::response::PathElement;
use crate::JsonValue;
use apollo_compiler::executable::Field;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use apollo_compiler::Name;
use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt as _;

enum LeafOrObject {
    Leaf(JsonValue),
    Object(ObjectValue),
}

/// <https://spec.graphql.org/October2021/#CompleteValue()>
///
/// Returns `Err` for a field error being propagated upwards to find a nullable place.
/// Boxed since it recurses through [`execute_selection_set`].
pub(crate) fn complete_value<'b>(
    ctx: &'b ExecutionContext<'_>,
    path: LinkedPath<'b>,
    ty: &'b Type,
    resolved: ResolvedValue,
    fields: &'b [&'b Field],
) -> BoxFuture<'b, Result<JsonValue, PropagateNull>> {
    async move {
        let location = fields[0].name.location();
        let resolved = match resolved {
            ResolvedValue::Leaf(JsonValue::Null) => {
                return if ty.is_non_null() {
                    let message = format!("non-null type {ty} resolved to null");
                    Err(ctx.field_error(message, path, location))
                } else {
                    Ok(JsonValue::Null)
                };
            }
            ResolvedValue::List(items) => {
                return complete_list_value(ctx, path, ty, items, fields).await;
            }
            ResolvedValue::Leaf(leaf) => LeafOrObject::Leaf(leaf),
            ResolvedValue::Object(object) => LeafOrObject::Object(object),
        };
        let ty_name = match ty {
            Type::List(_) | Type::NonNullList(_) => {
                return Err(ctx.field_error(
                    format!("list type {ty} resolved to a non-list value"),
                    path,
                    location,
                ));
            }
            Type::Named(name) | Type::NonNullNamed(name) => name,
        };
        let Some(ty_def) = ctx.schema.types.get(ty_name) else {
            return Err(ctx.validation_bug(format!("undefined type {ty_name}"), path, location));
        };
        if let ExtendedType::InputObject(_) = ty_def {
            return Err(ctx.validation_bug(
                format!("field with input object type {ty_name}"),
                path,
                location,
            ));
        }
        let object = match resolved {
            LeafOrObject::Leaf(json_value) => {
                return complete_leaf_value(ctx, path, ty_name, ty_def, json_value, fields);
            }
            LeafOrObject::Object(object) => object,
        };
        check_runtime_type(ctx, path, ty_name, ty_def, &object, fields)?;
        execute_selection_set(ctx, path, &object, merged_selections(fields))
            .await
            .map(JsonValue::Object)
    }
    .boxed()
}

/// Check that the object returned by a resolver is a possible type of the field
fn check_runtime_type(
    ctx: &ExecutionContext<'_>,
    path: LinkedPath<'_>,
    ty_name: &Name,
    ty_def: &ExtendedType,
    object: &ObjectValue,
    fields: &[&Field],
) -> Result<(), PropagateNull> {
    let location = fields[0].name.location();
    let resolved_type_name = object.type_name();
    let field_error = |message: String| Err(ctx.field_error(message, path, location));
    match ty_def {
        ExtendedType::Enum(_) | ExtendedType::Scalar(_) | ExtendedType::InputObject(_) => {
            field_error(format!(
                "resolver returned an object of type {resolved_type_name}, expected {ty_name}"
            ))
        }
        ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            let Some(object_def) = ctx.schema.get_object(resolved_type_name) else {
                return field_error(format!(
                    "resolver returned an object of type {resolved_type_name} \
                     not defined in the schema"
                ));
            };
            if let ExtendedType::Union(union_def) = ty_def {
                if !union_def.members.contains(resolved_type_name) {
                    return field_error(format!(
                        "resolver returned an object of type {resolved_type_name}, \
                         expected a member of union type {ty_name}"
                    ));
                }
            } else if !object_def.implements_interfaces.contains(ty_name) {
                return field_error(format!(
                    "resolver returned an object of type {resolved_type_name} \
                     which does not implement interface {ty_name}"
                ));
            }
            Ok(())
        }
        ExtendedType::Object(_) => {
            if resolved_type_name == ty_name.as_str() {
                Ok(())
            } else {
                field_error(format!(
                    "resolver returned an object of type {resolved_type_name}, expected {ty_name}"
                ))
            }
        }
    }
}

/// Items are completed concurrently.
/// An error on a non-null item makes the whole list null, or propagates further.
async fn complete_list_value(
    ctx: &ExecutionContext<'_>,
    path: LinkedPath<'_>,
    ty: &Type,
    items: Vec<Result<ResolvedValue, ResolveError>>,
    fields: &[&Field],
) -> Result<JsonValue, PropagateNull> {
    let inner_ty = match ty {
        Type::Named(_) | Type::NonNullNamed(_) => {
            return Err(ctx.field_error(
                format!("non-list type {ty} resolved to a list"),
                path,
                fields[0].name.location(),
            ));
        }
        Type::List(inner_ty) | Type::NonNullList(inner_ty) => &**inner_ty,
    };
    let futures = items.into_iter().enumerate().map(|(index, item)| async move {
        let item_path = LinkedPathElement {
            element: PathElement::ListIndex(index),
            next: path,
        };
        let result = match item {
            Ok(resolved) => {
                complete_value(ctx, Some(&item_path), inner_ty, resolved, fields).await
            }
            Err(error) => Err(ctx.resolver_error(
                error,
                Some(&item_path),
                fields[0].name.location(),
            )),
        };
        // On field error, try to nullify that item
        try_nullify(inner_ty, result)
    });
    let completed_list = join_all(futures)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, PropagateNull>>()?;
    Ok(completed_list.into())
}

fn complete_leaf_value(
    ctx: &ExecutionContext<'_>,
    path: LinkedPath<'_>,
    ty_name: &Name,
    ty_def: &ExtendedType,
    json_value: JsonValue,
    fields: &[&Field],
) -> Result<JsonValue, PropagateNull> {
    let location = fields[0].name.location();
    macro_rules! field_error {
        ($($arg: tt)+) => {
            return Err(ctx.field_error(format!($($arg)+), path, location))
        };
    }
    match ty_def {
        ExtendedType::InputObject(_) => {
            return Err(ctx.validation_bug(
                format!("field with input object type {ty_name}"),
                path,
                location,
            ))
        }
        ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_) => {
            field_error!("resolver returned a leaf value but expected an object for type {ty_name}")
        }
        ExtendedType::Enum(enum_def) => {
            // https://spec.graphql.org/October2021/#sec-Enums.Result-Coercion
            if !json_value
                .as_str()
                .is_some_and(|str| enum_def.values.contains_key(str))
            {
                field_error!("resolver returned {json_value}, expected enum {ty_name}")
            }
        }
        ExtendedType::Scalar(_) => match ty_name.as_str() {
            "Int" => {
                // https://spec.graphql.org/October2021/#sec-Int.Result-Coercion
                // > GraphQL services may coerce non-integer internal values to integers
                // > when reasonable without losing information
                //
                // We choose not to, to keep with Rust’s strong typing
                if let Some(int) = json_value.as_i64() {
                    if i32::try_from(int).is_err() {
                        field_error!("resolver returned {json_value} which overflows Int")
                    }
                } else {
                    field_error!("resolver returned {json_value}, expected Int")
                }
            }
            "Float" => {
                // https://spec.graphql.org/October2021/#sec-Float.Result-Coercion
                if !json_value.is_number() {
                    field_error!("resolver returned {json_value}, expected Float")
                }
            }
            "String" => {
                // https://spec.graphql.org/October2021/#sec-String.Result-Coercion
                if !json_value.is_string() {
                    field_error!("resolver returned {json_value}, expected String")
                }
            }
            "Boolean" => {
                // https://spec.graphql.org/October2021/#sec-Boolean.Result-Coercion
                if !json_value.is_boolean() {
                    field_error!("resolver returned {json_value}, expected Boolean")
                }
            }
            "ID" => {
                // https://spec.graphql.org/October2021/#sec-ID.Result-Coercion
                if json_value.is_i64() {
                    return Ok(json_value.to_string().into());
                }
                if !json_value.is_string() {
                    field_error!("resolver returned {json_value}, expected ID")
                }
            }
            _ => {
                // Custom scalar: accept any JSON value (including an array or object,
                // despite this being a "leaf" as far as GraphQL resolution is concerned)
            }
        },
    };
    Ok(json_value)
}
