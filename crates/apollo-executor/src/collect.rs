use crate::input_coercion::VariableValues;
use apollo_compiler::ast::Value;
use apollo_compiler::executable::Argument;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use indexmap::IndexMap;
use std::collections::HashSet;

/// The grouped field set of one object, in first-occurrence order of response keys
#[derive(Debug, Default)]
pub struct CollectedFields<'a> {
    pub fields: IndexMap<&'a Name, CollectedField<'a>>,

    /// Fragment spreads whose definition is not in the document.
    /// They contribute no field.
    pub unknown_fragments: Vec<Name>,
}

/// All field selections of one object sharing a response key
#[derive(Debug)]
pub struct CollectedField<'a> {
    occurrences: Vec<&'a Field>,
}

impl<'a> CollectedField<'a> {
    /// The alias if any, or the field name
    pub fn response_key(&self) -> &'a Name {
        self.first().response_key()
    }

    pub fn field_name(&self) -> &'a Name {
        &self.first().name
    }

    pub fn definition(&self) -> &'a Node<FieldDefinition> {
        &self.first().definition
    }

    /// Arguments as written in the document.
    /// Validation ensures every occurrence has the same ones.
    pub fn arguments(&self) -> &'a [Node<Argument>] {
        &self.first().arguments
    }

    /// Every AST field merged into this one, in document order. Never empty.
    pub fn occurrences(&self) -> &[&'a Field] {
        &self.occurrences
    }

    /// Sub-selections of all occurrences, concatenated
    pub fn selections(&self) -> impl Iterator<Item = &'a Selection> + '_ {
        self.occurrences
            .iter()
            .flat_map(|field| &field.selection_set.selections)
    }

    /// Whether no selection set applies: scalars and enums
    pub(crate) fn is_leaf(&self, schema: &Schema) -> bool {
        matches!(
            schema.types.get(self.definition().ty.inner_named_type()),
            Some(ExtendedType::Scalar(_) | ExtendedType::Enum(_))
        )
    }

    fn first(&self) -> &'a Field {
        // Indexing does not panic: a `CollectedField` is only created with one occurrence
        self.occurrences[0]
    }
}

/// <https://spec.graphql.org/October2021/#CollectFields()>
///
/// `object_type_name` is the runtime type of the object whose fields are collected.
pub fn collect_fields<'a>(
    schema: &Schema,
    document: &'a ExecutableDocument,
    variable_values: &VariableValues,
    object_type_name: &str,
    selections: impl IntoIterator<Item = &'a Selection>,
) -> CollectedFields<'a> {
    let mut collected = CollectedFields::default();
    collect_fields_into(
        schema,
        document,
        variable_values,
        object_type_name,
        selections,
        &mut HashSet::new(),
        &mut collected,
    );
    collected
}

fn collect_fields_into<'a>(
    schema: &Schema,
    document: &'a ExecutableDocument,
    variable_values: &VariableValues,
    object_type_name: &str,
    selections: impl IntoIterator<Item = &'a Selection>,
    visited_fragments: &mut HashSet<&'a Name>,
    collected: &mut CollectedFields<'a>,
) {
    for selection in selections {
        if eval_if_arg(selection, "skip", variable_values).unwrap_or(false)
            || !eval_if_arg(selection, "include", variable_values).unwrap_or(true)
        {
            continue;
        }
        match selection {
            Selection::Field(field) => collected
                .fields
                .entry(field.response_key())
                .or_insert_with(|| CollectedField {
                    occurrences: Vec::new(),
                })
                .occurrences
                .push(field.as_ref()),
            Selection::FragmentSpread(spread) => {
                let new = visited_fragments.insert(&spread.fragment_name);
                if !new {
                    continue;
                }
                let Some(fragment) = document.fragments.get(&spread.fragment_name) else {
                    collected.unknown_fragments.push(spread.fragment_name.clone());
                    continue;
                };
                if !does_fragment_type_apply(schema, object_type_name, fragment.type_condition())
                {
                    continue;
                }
                collect_fields_into(
                    schema,
                    document,
                    variable_values,
                    object_type_name,
                    &fragment.selection_set.selections,
                    visited_fragments,
                    collected,
                )
            }
            Selection::InlineFragment(inline) => {
                if let Some(condition) = &inline.type_condition {
                    if !does_fragment_type_apply(schema, object_type_name, condition) {
                        continue;
                    }
                }
                collect_fields_into(
                    schema,
                    document,
                    variable_values,
                    object_type_name,
                    &inline.selection_set.selections,
                    visited_fragments,
                    collected,
                )
            }
        }
    }
}

/// <https://spec.graphql.org/October2021/#DoesFragmentTypeApply()>
pub(crate) fn does_fragment_type_apply(
    schema: &Schema,
    object_type_name: &str,
    fragment_type: &Name,
) -> bool {
    match schema.types.get(fragment_type) {
        Some(ExtendedType::Object(_)) => fragment_type.as_str() == object_type_name,
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_)) => {
            schema.is_subtype(fragment_type, object_type_name)
        }
        // Undefined or not an output type: validation should have caught this
        _ => false,
    }
}

/// Value of the `if` argument of `@skip` or `@include`, if that directive is present
pub(crate) fn eval_if_arg(
    selection: &Selection,
    directive_name: &str,
    variable_values: &VariableValues,
) -> Option<bool> {
    match selection
        .directives()
        .get(directive_name)?
        .specified_argument_by_name("if")?
        .as_ref()
    {
        Value::Boolean(value) => Some(*value),
        Value::Variable(var) => variable_values.get(var.as_str())?.as_bool(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonMap;
    use serde_json_bytes::json;

    const SDL: &str = r#"
        type Query { pet: Pet, dog: Dog }
        interface Pet { name: String, owner: Person }
        type Dog implements Pet { name: String, owner: Person, barks: Boolean }
        type Cat implements Pet { name: String, owner: Person, meows: Boolean }
        type Person { name: String, age: Int }
    "#;

    fn keys(collected: &CollectedFields<'_>) -> Vec<String> {
        collected.fields.keys().map(|key| key.to_string()).collect()
    }

    #[test]
    fn merges_field_inline_fragment_and_spread() {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let query = r#"
            {
                dog {
                    owner { name }
                    ... on Dog { owner { age } barks }
                    ...DogOwner
                }
            }
            fragment DogOwner on Pet { owner { name } name }
        "#;
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        let variables = VariableValues::default();
        let root = collect_fields(
            &schema,
            &document,
            &variables,
            "Query",
            &operation.selection_set.selections,
        );
        let dog = &root.fields[0];
        let collected = collect_fields(&schema, &document, &variables, "Dog", dog.selections());
        assert_eq!(keys(&collected), ["owner", "barks", "name"]);
        assert!(collected.unknown_fragments.is_empty());

        let owner = &collected.fields[0];
        assert_eq!(owner.occurrences().len(), 3);
        let sub_selections: Vec<_> = owner
            .selections()
            .map(|selection| match selection {
                Selection::Field(field) => field.name.to_string(),
                _ => panic!("expected a field"),
            })
            .collect();
        assert_eq!(sub_selections, ["name", "age", "name"]);

        // Same result when called again
        let again = collect_fields(&schema, &document, &variables, "Dog", dog.selections());
        assert_eq!(keys(&again), keys(&collected));
    }

    #[test]
    fn type_conditions_follow_the_runtime_type() {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let query = r#"
            {
                pet {
                    name
                    ... on Dog { barks }
                    ... on Cat { meows }
                    ... on Pet { owner { name } }
                }
            }
        "#;
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        let variables = VariableValues::default();
        let root = collect_fields(
            &schema,
            &document,
            &variables,
            "Query",
            &operation.selection_set.selections,
        );
        let pet = &root.fields[0];
        let as_cat = collect_fields(&schema, &document, &variables, "Cat", pet.selections());
        assert_eq!(keys(&as_cat), ["name", "meows", "owner"]);
        let as_dog = collect_fields(&schema, &document, &variables, "Dog", pet.selections());
        assert_eq!(keys(&as_dog), ["name", "barks", "owner"]);
    }

    #[test]
    fn skip_and_include() {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let query = r#"
            query($withAge: Boolean!) {
                dog {
                    name @skip(if: true)
                    barks @include(if: false)
                    owner @include(if: $withAge) { age }
                }
            }
        "#;
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        let mut variables = JsonMap::new();
        variables.insert("withAge", json!(true));
        let variables = VariableValues::assume_coerced(variables);
        let root = collect_fields(
            &schema,
            &document,
            &variables,
            "Query",
            &operation.selection_set.selections,
        );
        let collected = collect_fields(
            &schema,
            &document,
            &variables,
            "Dog",
            root.fields[0].selections(),
        );
        assert_eq!(keys(&collected), ["owner"]);
    }

    #[test]
    fn repeated_spread_is_visited_once_and_unknown_is_reported() {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let query = r#"
            { dog { ...Name ...Name ...Missing barks } }
            fragment Name on Dog { name }
        "#;
        // Not validated: the spread of `Missing` would be rejected
        let document = ExecutableDocument::parse(&schema, query, "query.graphql")
            .unwrap_or_else(|invalid| invalid.partial);
        let operation = document.operations.get(None).unwrap();
        let variables = VariableValues::default();
        let root = collect_fields(
            &schema,
            &document,
            &variables,
            "Query",
            &operation.selection_set.selections,
        );
        let collected = collect_fields(
            &schema,
            &document,
            &variables,
            "Dog",
            root.fields[0].selections(),
        );
        assert_eq!(keys(&collected), ["name", "barks"]);
        assert_eq!(collected.fields[0].occurrences().len(), 1);
        let unknown: Vec<_> = collected
            .unknown_fragments
            .iter()
            .map(|name| name.as_str())
            .collect();
        assert_eq!(unknown, ["Missing"]);
    }
}
