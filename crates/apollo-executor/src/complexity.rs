//! Static cost estimate of an operation, computed before any resolver runs.

use crate::collect::eval_if_arg;
use crate::input_coercion::coerce_argument_values;
use crate::input_coercion::VariableValues;
use crate::JsonMap;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Upper bound of computed complexity. Sums saturate here instead of overflowing.
pub const MAX_COMPLEXITY: usize = usize::MAX;

/// Custom cost of some fields.
///
/// Returning `None` keeps the default cost of a field:
/// one plus the complexity of its selection set.
pub trait ComplexityEstimator: Send + Sync {
    /// `type_name` is the type where the field is selected in the document,
    /// which may be an interface or union type. `arguments` are coerced.
    ///
    /// Negative values count as zero.
    fn field_complexity(
        &self,
        type_name: &str,
        field_name: &str,
        child_complexity: usize,
        arguments: &JsonMap,
    ) -> Option<i64>;
}

/// Estimator without custom costs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComplexity;

impl ComplexityEstimator for DefaultComplexity {
    fn field_complexity(&self, _: &str, _: &str, _: usize, _: &JsonMap) -> Option<i64> {
        None
    }
}

type ComplexityFn = dyn Fn(usize, &JsonMap) -> i64 + Send + Sync;

/// Table of custom cost functions keyed by type name, then field name
#[derive(Clone, Default)]
pub struct FieldComplexities {
    by_type: HashMap<String, HashMap<String, Arc<ComplexityFn>>>,
}

impl FieldComplexities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cost function of `type_name.field_name`,
    /// called with the child complexity and the coerced arguments.
    ///
    /// ```
    /// # use apollo_executor::FieldComplexities;
    /// let complexities = FieldComplexities::new().field("Query", "todos", |child, args| {
    ///     let first = args.get("first").and_then(|first| first.as_i64()).unwrap_or(10);
    ///     first.saturating_mul(child as i64)
    /// });
    /// ```
    pub fn field<F>(mut self, type_name: &str, field_name: &str, complexity: F) -> Self
    where
        F: Fn(usize, &JsonMap) -> i64 + Send + Sync + 'static,
    {
        self.by_type
            .entry(type_name.to_owned())
            .or_default()
            .insert(field_name.to_owned(), Arc::new(complexity));
        self
    }
}

impl ComplexityEstimator for FieldComplexities {
    fn field_complexity(
        &self,
        type_name: &str,
        field_name: &str,
        child_complexity: usize,
        arguments: &JsonMap,
    ) -> Option<i64> {
        let complexity = self.by_type.get(type_name)?.get(field_name)?;
        Some(complexity(child_complexity, arguments))
    }
}

impl fmt::Debug for FieldComplexities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (type_name, fields) in &self.by_type {
            map.entry(type_name, &fields.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

/// Sum of the cost of every field selected by `operation`.
///
/// Selections excluded by `@skip` or `@include` cost nothing.
/// Fragments add the cost of their selections and nothing for themselves.
pub fn calculate_complexity(
    schema: &Schema,
    document: &ExecutableDocument,
    operation: &Operation,
    variable_values: &VariableValues,
    estimator: &dyn ComplexityEstimator,
) -> usize {
    let walker = Walker {
        schema,
        document,
        variable_values,
        estimator,
    };
    walker.selection_set(&operation.selection_set, &mut HashSet::new())
}

struct Walker<'a> {
    schema: &'a Schema,
    document: &'a ExecutableDocument,
    variable_values: &'a VariableValues,
    estimator: &'a dyn ComplexityEstimator,
}

impl<'a> Walker<'a> {
    /// `expanding` holds fragments being walked on the current branch,
    /// so that an unvalidated fragment cycle terminates.
    fn selection_set(
        &self,
        selection_set: &'a SelectionSet,
        expanding: &mut HashSet<&'a Name>,
    ) -> usize {
        let mut complexity: usize = 0;
        for selection in &selection_set.selections {
            if eval_if_arg(selection, "skip", self.variable_values).unwrap_or(false)
                || !eval_if_arg(selection, "include", self.variable_values).unwrap_or(true)
            {
                continue;
            }
            let cost = match selection {
                Selection::Field(field) => {
                    let child_complexity = self.selection_set(&field.selection_set, expanding);
                    let arguments = coerce_argument_values(
                        self.schema,
                        self.variable_values,
                        &field.definition,
                        field,
                    )
                    .unwrap_or_default();
                    match self.estimator.field_complexity(
                        &selection_set.ty,
                        &field.name,
                        child_complexity,
                        &arguments,
                    ) {
                        Some(custom) => clamp(custom),
                        None => child_complexity.saturating_add(1),
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.selection_set(&inline.selection_set, expanding)
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    if !expanding.insert(&spread.fragment_name) {
                        continue;
                    }
                    let cost = self.selection_set(&fragment.selection_set, expanding);
                    expanding.remove(&spread.fragment_name);
                    cost
                }
            };
            complexity = complexity.saturating_add(cost);
        }
        complexity
    }
}

fn clamp(custom: i64) -> usize {
    if custom <= 0 {
        0
    } else {
        usize::try_from(custom).unwrap_or(MAX_COMPLEXITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        type Query {
            todos(first: Int = 10): [Todo]
            search: [SearchResult]
            node: Node
        }
        interface Node { id: ID! }
        type Todo implements Node { id: ID!, text: String, owner: User }
        type User implements Node { id: ID!, name: String }
        union SearchResult = Todo | User
    "#;

    fn complexity(query: &str, estimator: &dyn ComplexityEstimator) -> usize {
        let schema = Schema::parse_and_validate(SDL, "schema.graphql").unwrap();
        let document =
            ExecutableDocument::parse_and_validate(&schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        calculate_complexity(
            &schema,
            &document,
            operation,
            &VariableValues::default(),
            estimator,
        )
    }

    #[test]
    fn default_cost_is_one_per_field() {
        assert_eq!(complexity("{ todos { id text } }", &DefaultComplexity), 3);
        assert_eq!(
            complexity("{ todos { id owner { name } } }", &DefaultComplexity),
            4
        );
    }

    #[test]
    fn concatenated_selections_add_up() {
        let a = "todos { id text }";
        let b = "node { id ... on User { name } }";
        let separate = complexity(&format!("{{ {a} }}"), &DefaultComplexity)
            + complexity(&format!("{{ {b} }}"), &DefaultComplexity);
        let together = complexity(&format!("{{ {a} {b} }}"), &DefaultComplexity);
        assert_eq!(separate, together);
    }

    #[test]
    fn fragments_add_no_cost_of_their_own() {
        let with_fragments = complexity(
            "{ todos { ...TodoFields ... on Todo { owner { name } } } }
             fragment TodoFields on Todo { id text }",
            &DefaultComplexity,
        );
        let inline = complexity("{ todos { id text owner { name } } }", &DefaultComplexity);
        assert_eq!(with_fragments, inline);
    }

    #[test]
    fn skipped_selections_cost_nothing() {
        assert_eq!(
            complexity(
                "{ todos { id text @skip(if: true) owner @include(if: false) { name } } }",
                &DefaultComplexity
            ),
            2
        );
    }

    #[test]
    fn custom_cost_uses_arguments_and_child_complexity() {
        let estimator = FieldComplexities::new().field("Query", "todos", |child, args| {
            let first = args.get("first").and_then(|first| first.as_i64()).unwrap_or(0);
            first * child as i64
        });
        assert_eq!(complexity("{ todos { id text } }", &estimator), 20);
        assert_eq!(complexity("{ todos(first: 3) { id text } }", &estimator), 6);
    }

    #[test]
    fn abstract_fields_use_the_static_type() {
        let estimator = FieldComplexities::new()
            .field("Node", "id", |_, _| 5)
            .field("Todo", "id", |_, _| 100);
        // Selected on the interface: the cost for `Node.id` applies
        assert_eq!(complexity("{ node { id } }", &estimator), 6);
        // Selected in a fragment on the object type
        assert_eq!(complexity("{ node { ... on Todo { id } } }", &estimator), 101);
    }

    #[test]
    fn negative_costs_are_clamped_to_zero() {
        let estimator = FieldComplexities::new().field("Todo", "text", |_, _| -50);
        assert_eq!(complexity("{ todos { id text } }", &estimator), 2);
    }

    #[test]
    fn sums_saturate_instead_of_overflowing() {
        let estimator = FieldComplexities::new()
            .field("Todo", "id", |_, _| i64::MAX)
            .field("Todo", "text", |_, _| i64::MAX);
        let query = "{ todos { id text } search { ... on Todo { id text } } }";
        assert_eq!(complexity(query, &estimator), MAX_COMPLEXITY);
    }
}
