//! Contract tests for the query compiler.
//!
//! These tests verify the compile contracts through the public API:
//! - Fragment placeholder arity and splice expansion
//! - Binding resolution across scopes
//! - Cast, alias, values and interval errors
//! - Projection merging
//! - Cache keys and parameter lists

use std::collections::BTreeMap;

use query_core::binder::{AliasError, BindError};
use query_core::catalog::{AssocDef, Cardinality, Catalog, FieldDef, SchemaDef};
use query_core::compiler::{CastError, CompiledQuery, Compiler, CompilerConfig, ValuesError};
use query_core::error::CompileError;
use query_core::ir::surface::{call, fragment_arg, CallArg};
use query_core::ir::{
    AggregateKind, ArgKind, FieldRef, FieldSet, Node, OperatorKind, ProjectionKind, Query,
    SortDirection, Source, SourceRef, SubqueryKind, TypeRef, ValuesTable, ValuesTypes,
};
use query_core::types::{DataType, ResolvedType, Value};

/// Creates a catalog with Post and Comment schemas.
fn create_test_catalog() -> Catalog {
    let post = SchemaDef::new(
        "Post",
        "posts",
        vec![
            FieldDef::new("id", DataType::Id),
            FieldDef::new("title", DataType::String),
            FieldDef::new("body", DataType::String),
            FieldDef::new("visits", DataType::Integer),
            FieldDef::new("inserted_at", DataType::UtcDatetime),
        ],
        vec!["id".to_string()],
    )
    .unwrap()
    .with_association(AssocDef::new(
        "comments",
        "Comment",
        Cardinality::Many,
        "id",
        "post_id",
    ))
    .unwrap();

    let comment = SchemaDef::new(
        "Comment",
        "comments",
        vec![
            FieldDef::new("id", DataType::Id),
            FieldDef::new("post_id", DataType::Id),
            FieldDef::new("body", DataType::String),
        ],
        vec!["id".to_string()],
    )
    .unwrap();

    Catalog::new()
        .with_schema(post)
        .unwrap()
        .with_schema(comment)
        .unwrap()
}

fn compile(query: Query) -> Result<CompiledQuery, CompileError> {
    let catalog = create_test_catalog();
    Compiler::new(&catalog).compile(query)
}

fn posts() -> Query {
    Query::from(Source::schema("Post").named("post"))
}

fn row(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn id_text_types() -> ValuesTypes {
    ValuesTypes::Map(
        [
            ("id".to_string(), TypeRef::builtin("integer")),
            ("text".to_string(), TypeRef::builtin("string")),
        ]
        .into_iter()
        .collect(),
    )
}

fn select_fields(compiled: &CompiledQuery) -> Vec<String> {
    match &compiled.query.select {
        Some(Node::StructSelect(p) | Node::MapSelect(p)) => p.set.fields.clone(),
        other => panic!("expected a single projection, got {other:?}"),
    }
}

// =============================================================================
// Fragment Contracts
// =============================================================================

mod fragment_contracts {
    use super::*;
    use proptest::prelude::*;

    fn fragment_query(text: &str, arg_count: usize) -> Query {
        let args = (0..arg_count)
            .map(|i| ArgKind::Parameter(Node::param(i as i64)))
            .collect();
        Query::from(Source::table("posts")).filter(Node::fragment(text, args))
    }

    fn template(placeholders: usize, escaped: usize) -> String {
        let mut text = String::from("f(");
        for _ in 0..placeholders {
            text.push_str("? ");
        }
        for _ in 0..escaped {
            text.push_str(r"\? ");
        }
        text.push(')');
        text
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: k placeholders with k arguments compile; any other
        /// argument count is a fragment arity error. Escapes never count.
        #[test]
        fn test_fragment_arity(k in 0usize..6, supplied in 0usize..6, escaped in 0usize..3) {
            let text = template(k, escaped);
            let result = compile(fragment_query(&text, supplied));
            if k == supplied {
                prop_assert!(result.is_ok());
                prop_assert_eq!(result.unwrap().params.len(), k);
            } else {
                let is_arity_error = matches!(
                    result,
                    Err(CompileError::FragmentArity { placeholders, arguments, .. })
                        if placeholders == k && arguments == supplied
                );
                prop_assert!(is_arity_error);
            }
        }
    }

    #[test]
    fn test_escaped_placeholder_is_literal() {
        let compiled = compile(fragment_query(r"a \? b ?", 1)).unwrap();
        match &compiled.query.wheres[0] {
            Node::Fragment(f) => assert_eq!(f.parts, vec!["a ? b ", ""]),
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn test_splice_expands_and_renumbers() {
        let query = Query::from(Source::table("posts"))
            .filter(Node::fragment(
                "? in (?)",
                vec![
                    ArgKind::Parameter(Node::raw_field(0, "id")),
                    ArgKind::Splice(Node::param(vec![1i64, 2, 3])),
                ],
            ))
            .filter(Node::equals(Node::raw_field(0, "title"), Node::param("t")));
        let compiled = compile(query).unwrap();

        let layout = compiled.param_layout();
        assert_eq!(layout[0].len(), 3);
        assert_eq!(layout[1], 3..4);
        assert_eq!(compiled.expanded_params().len(), 4);
        assert!(compiled.params[0].splice);
    }

    #[test]
    fn test_splice_length_in_cache_key() {
        let build = |items: Vec<i64>| {
            Query::from(Source::table("posts")).filter(Node::fragment(
                "id in (?)",
                vec![ArgKind::Splice(Node::param(items))],
            ))
        };
        let a = compile(build(vec![1, 2, 3])).unwrap();
        let b = compile(build(vec![4])).unwrap();
        let c = compile(build(vec![7, 8, 9])).unwrap();
        assert_eq!(a.placeholder_count(), 3);
        assert_eq!(b.placeholder_count(), 1);
        assert_ne!(a.cache_key, b.cache_key);
        assert_eq!(a.cache_key, c.cache_key);
    }

    #[test]
    fn test_inline_values_change_cache_key() {
        let build = |column: &str| {
            Query::from(Source::table("posts")).filter(Node::fragment(
                "? > 0",
                vec![fragment_arg("identifier", Node::literal(column)).unwrap()],
            ))
        };
        let a = compile(build("visits")).unwrap();
        let b = compile(build("likes")).unwrap();
        assert_ne!(a.cache_key, b.cache_key);
        assert!(a.params.is_empty());
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let query = Query::from(Source::table("posts")).filter(Node::fragment(
            "? > 0",
            vec![ArgKind::Identifier(Node::literal(1i64))],
        ));
        assert!(matches!(
            compile(query),
            Err(CompileError::InvalidFragmentArgument { index: 0, .. })
        ));
    }
}

// =============================================================================
// Binding Contracts
// =============================================================================

mod binding_contracts {
    use super::*;

    #[test]
    fn test_parent_as_without_enclosing_query() {
        let query = posts().filter(Node::equals(
            Node::parent_field("post", "id"),
            Node::param(1i64),
        ));
        let err = compile(query).unwrap_err();
        assert_eq!(
            err,
            CompileError::Binding(BindError::NoParentBinding("post".into()))
        );
        assert!(err.to_string().contains("no parent binding"));
    }

    #[test]
    fn test_parent_as_resolves_one_level_up() {
        let inner = Query::from(Source::schema("Comment")).filter(Node::equals(
            Node::field(0, "post_id"),
            Node::parent_field("post", "id"),
        ));
        let query = posts().filter(Node::subquery(inner, SubqueryKind::Exists));
        assert!(compile(query).is_ok());
    }

    #[test]
    fn test_parent_as_does_not_skip_levels() {
        let innermost = Query::from(Source::schema("Comment")).filter(Node::equals(
            Node::field(0, "post_id"),
            Node::parent_field("post", "id"),
        ));
        let middle = Query::from(Source::schema("Comment").named("c"))
            .filter(Node::subquery(innermost, SubqueryKind::Exists));
        let query = posts().filter(Node::subquery(middle, SubqueryKind::Exists));
        assert_eq!(
            compile(query).unwrap_err(),
            CompileError::Binding(BindError::NoParentBinding("post".into()))
        );
    }

    #[test]
    fn test_as_resolves_through_every_level() {
        let innermost = Query::from(Source::schema("Comment")).filter(Node::equals(
            Node::field(0, "post_id"),
            Node::binding_field("post", "id"),
        ));
        let middle = Query::from(Source::schema("Comment").named("c"))
            .filter(Node::subquery(innermost, SubqueryKind::Exists));
        let query = posts().filter(Node::subquery(middle, SubqueryKind::Exists));
        assert!(compile(query).is_ok());
    }

    #[test]
    fn test_unknown_binding() {
        let query = posts().filter(Node::equals(
            Node::binding_field("author", "id"),
            Node::param(1i64),
        ));
        let err = compile(query).unwrap_err();
        assert!(err.to_string().contains("unknown binding"));
    }

    #[test]
    fn test_sibling_subqueries_reuse_binding_names() {
        let a = Query::from(Source::schema("Comment").named("c"));
        let b = Query::from(Source::schema("Comment").named("c"));
        let query = posts()
            .filter(Node::subquery(a, SubqueryKind::Exists))
            .filter(Node::subquery(b, SubqueryKind::Exists));
        assert!(compile(query).is_ok());
    }

    #[test]
    fn test_duplicate_binding_in_one_query() {
        let query = posts().join(
            query_core::ir::JoinQual::Inner,
            Source::schema("Comment").named("post"),
            None,
        );
        assert_eq!(
            compile(query).unwrap_err(),
            CompileError::Binding(BindError::DuplicateBinding("post".into()))
        );
    }
}

// =============================================================================
// Cast Contracts
// =============================================================================

mod cast_contracts {
    use super::*;

    #[test]
    fn test_unknown_builtin() {
        let query = posts().filter(Node::equals(
            Node::field(0, "visits"),
            Node::cast(Node::param(1i64), TypeRef::builtin("fortnight")),
        ));
        let err = compile(query).unwrap_err();
        assert_eq!(
            err,
            CompileError::Cast(CastError::UnknownBuiltin("fortnight".into()))
        );
        assert!(err.to_string().contains("unknown builtin"));
    }

    #[test]
    fn test_column_type_adopts_field_type() {
        let query = posts().filter(Node::equals(
            Node::field(0, "title"),
            Node::cast(
                Node::param("hello"),
                TypeRef::ColumnType(FieldRef::new(0, "title")),
            ),
        ));
        let compiled = compile(query).unwrap();
        assert_eq!(
            compiled.params[0].data_type,
            Some(ResolvedType::Builtin(DataType::String))
        );
    }

    #[test]
    fn test_unresolved_column_type() {
        let query = posts().filter(Node::equals(
            Node::field(0, "title"),
            Node::cast(
                Node::param("hello"),
                TypeRef::ColumnType(FieldRef::new(0, "subtitle")),
            ),
        ));
        let err = compile(query).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Cast(CastError::UnresolvedType { ref field, .. }) if field == "subtitle"
        ));
        assert!(err.to_string().contains("unresolved type"));
    }

    #[test]
    fn test_cast_of_field_is_rejected() {
        let query = posts().select(Node::cast(Node::field(0, "visits"), TypeRef::builtin("float")));
        assert!(matches!(
            compile(query),
            Err(CompileError::Cast(CastError::UnsupportedOperand(_)))
        ));
    }

    #[test]
    fn test_implicit_param_types() {
        let query = posts()
            .filter(Node::op(
                OperatorKind::In,
                vec![Node::field(0, "visits"), Node::param(vec![1i64, 2])],
            ))
            .filter(Node::op(
                OperatorKind::Like,
                vec![Node::field(0, "title"), Node::param("a%")],
            ))
            .limit(Node::param(10i64));
        let compiled = compile(query).unwrap();
        let types: Vec<_> = compiled
            .params
            .iter()
            .map(|p| p.data_type.clone())
            .collect();
        assert_eq!(
            types,
            vec![
                Some(ResolvedType::Array(DataType::Integer)),
                Some(ResolvedType::Builtin(DataType::String)),
                Some(ResolvedType::Builtin(DataType::Integer)),
            ]
        );
    }
}

// =============================================================================
// Alias Contracts
// =============================================================================

mod alias_contracts {
    use super::*;

    fn sum_visits() -> Node {
        Node::aggregate(AggregateKind::Sum, vec![Node::field(0, "visits")])
    }

    #[test]
    fn test_undefined_alias() {
        let query = posts()
            .select(Node::field(0, "title"))
            .order_by(Node::alias_ref("sum"), SortDirection::Desc);
        let err = compile(query).unwrap_err();
        assert_eq!(err, CompileError::Alias(AliasError::Undefined("sum".into())));
        assert!(err.to_string().contains("undefined alias"));
    }

    #[test]
    fn test_alias_reference_resolves() {
        let query = posts()
            .select(Node::Map(vec![
                ("title".into(), Node::field(0, "title")),
                ("sum".into(), Node::alias(sum_visits(), "sum")),
            ]))
            .group_by(Node::field(0, "title"))
            .order_by(Node::alias_ref("sum"), SortDirection::Desc);
        assert!(compile(query).is_ok());
    }

    #[test]
    fn test_duplicate_alias() {
        let query = posts().select(Node::Tuple(vec![
            Node::alias(sum_visits(), "x"),
            Node::alias(Node::field(0, "id"), "x"),
        ]));
        let err = compile(query).unwrap_err();
        assert_eq!(err, CompileError::Alias(AliasError::Duplicate("x".into())));
        assert!(err.to_string().contains("duplicate alias"));
    }

    #[test]
    fn test_identical_redefinition_is_configurable() {
        let build = || {
            posts()
                .select(Node::Map(vec![("s".into(), Node::alias(sum_visits(), "sum"))]))
                .select_merge(Node::Map(vec![("s".into(), Node::alias(sum_visits(), "sum"))]))
        };
        let catalog = create_test_catalog();
        assert!(Compiler::new(&catalog).compile(build()).is_err());

        let config = CompilerConfig::default().with_identical_alias_redefinition(true);
        assert!(Compiler::with_config(&catalog, config).compile(build()).is_ok());
    }

    #[test]
    fn test_alias_outside_outermost_select() {
        let query = posts().filter(Node::equals(
            Node::alias(Node::field(0, "id"), "id"),
            Node::param(1i64),
        ));
        let err = compile(query).unwrap_err();
        assert_eq!(
            err,
            CompileError::Alias(AliasError::NotOutermost("id".into()))
        );
        assert!(err.to_string().contains("alias not in outermost select"));
    }

    #[test]
    fn test_alias_inside_fragment_argument() {
        let query = posts().select(Node::fragment(
            "lower(?)",
            vec![ArgKind::Parameter(Node::alias(Node::field(0, "title"), "t"))],
        ));
        assert!(matches!(
            compile(query),
            Err(CompileError::Alias(AliasError::NotOutermost(_)))
        ));
    }

    #[test]
    fn test_subquery_has_its_own_alias_table() {
        let inner = Query::from(Source::schema("Comment"))
            .select(Node::field(0, "post_id"))
            .order_by(Node::alias_ref("sum"), SortDirection::Asc);
        let query = posts()
            .select(Node::alias(sum_visits(), "sum"))
            .filter(Node::subquery(inner, SubqueryKind::Exists));
        assert!(matches!(
            compile(query),
            Err(CompileError::Alias(AliasError::Undefined(_)))
        ));
    }
}

// =============================================================================
// Values Contracts
// =============================================================================

mod values_contracts {
    use super::*;

    #[test]
    fn test_empty_values() {
        let query = Query::from(Source::values(ValuesTable::new(vec![], id_text_types())));
        let err = compile(query).unwrap_err();
        assert_eq!(err, CompileError::Values(ValuesError::Empty));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_inconsistent_fields() {
        let rows = vec![
            row(&[("id", Value::Integer(1))]),
            row(&[("id", Value::Integer(2)), ("text", Value::from("b"))]),
        ];
        let query = Query::from(Source::values(ValuesTable::new(rows, id_text_types())));
        let err = compile(query).unwrap_err();
        assert_eq!(
            err,
            CompileError::Values(ValuesError::InconsistentFields { row: 1 })
        );
        assert!(err.to_string().contains("inconsistent fields"));
    }

    #[test]
    fn test_missing_type() {
        let rows = vec![row(&[("id", Value::Integer(1)), ("score", Value::Float(1.5))])];
        let query = Query::from(Source::values(ValuesTable::new(rows, id_text_types())));
        let err = compile(query).unwrap_err();
        assert!(err.to_string().contains("missing type"));
    }

    #[test]
    fn test_types_must_match_row_fields() {
        let rows = vec![row(&[("id", Value::Integer(1))])];
        let query = Query::from(Source::values(ValuesTable::new(rows, id_text_types())));
        let err = compile(query).unwrap_err();
        assert_eq!(
            err,
            CompileError::Values(ValuesError::UnexpectedType("text".into()))
        );
        assert!(err.to_string().contains("`text`"));
    }

    #[test]
    fn test_values_bound_row_major() {
        let rows = vec![
            row(&[("id", Value::Integer(1)), ("text", Value::from("a"))]),
            row(&[("id", Value::Integer(2)), ("text", Value::from("b"))]),
        ];
        let query = Query::from(Source::values(ValuesTable::new(rows, id_text_types())).named("v"))
            .filter(Node::equals(Node::field(0, "id"), Node::param(1i64)));
        let compiled = compile(query).unwrap();
        let values: Vec<_> = compiled.params.iter().map(|p| p.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::from("a"),
                Value::Integer(2),
                Value::from("b"),
                Value::Integer(1),
            ]
        );
        assert_eq!(
            compiled.params[4].data_type,
            Some(ResolvedType::Builtin(DataType::Integer))
        );
    }

    #[test]
    fn test_values_typed_from_schema() {
        let rows = vec![row(&[("id", Value::Integer(1)), ("title", Value::from("a"))])];
        let node = call(
            "values",
            vec![CallArg::Rows(rows), CallArg::Atom("Post".into())],
        )
        .unwrap();
        let Node::ValuesTable(table) = node else {
            panic!("expected values table");
        };
        let compiled = compile(Query::from(Source::values(table))).unwrap();
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_values_from_unknown_schema() {
        let rows = vec![row(&[("id", Value::Integer(1))])];
        let table = ValuesTable::new(rows, ValuesTypes::Schema("Author".into()));
        assert_eq!(
            compile(Query::from(Source::values(table))).unwrap_err(),
            CompileError::Binding(BindError::UnknownSchema("Author".into()))
        );
    }
}

// =============================================================================
// Merge Contracts
// =============================================================================

mod merge_contracts {
    use super::*;
    use proptest::prelude::*;

    const POST_FIELDS: [&str; 5] = ["id", "title", "body", "visits", "inserted_at"];

    fn post_struct(fields: &[&str]) -> Node {
        Node::struct_select(SourceRef::Position(0), FieldSet::of(fields.iter().copied()))
    }

    fn merged(a: &[&str], b: &[&str]) -> Vec<String> {
        let query = posts().select(post_struct(a)).select_merge(post_struct(b));
        select_fields(&compile(query).unwrap())
    }

    #[test]
    fn test_title_then_body() {
        assert_eq!(merged(&["title"], &["body"]), vec!["title", "body"]);
    }

    #[test]
    fn test_reverse_order_same_set() {
        let mut forward = merged(&["title"], &["body"]);
        let mut reverse = merged(&["body"], &["title"]);
        assert_eq!(reverse, vec!["body", "title"]);
        forward.sort();
        reverse.sort();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_merge_inside_selected_as() {
        let query = posts().select(Node::alias(
            Node::merge(post_struct(&["title"]), post_struct(&["body"])),
            "x",
        ));
        let compiled = compile(query).unwrap();
        match compiled.query.select.as_ref() {
            Some(Node::Alias { value, .. }) => match &**value {
                Node::StructSelect(p) => assert_eq!(p.set.fields, vec!["title", "body"]),
                other => panic!("expected merged struct, got {other:?}"),
            },
            other => panic!("expected alias, got {other:?}"),
        }
    }

    #[test]
    fn test_named_and_positional_refs_merge() {
        let query = posts()
            .select(post_struct(&["title"]))
            .select_merge(Node::struct_select(
                SourceRef::Binding("post".into()),
                FieldSet::of(["body"]),
            ));
        assert_eq!(select_fields(&compile(query).unwrap()), vec!["title", "body"]);
    }

    #[test]
    fn test_nested_merge_does_not_inject_keys() {
        let a = Node::struct_select(
            SourceRef::Position(0),
            FieldSet::of(["title"]).with_nested(
                "comments",
                ProjectionKind::Struct,
                FieldSet::of(["body"]),
            ),
        );
        let b = Node::struct_select(
            SourceRef::Position(0),
            FieldSet::of(["body"]).with_nested(
                "comments",
                ProjectionKind::Struct,
                FieldSet::of(["id"]),
            ),
        );
        let compiled = compile(posts().select(a).select_merge(b)).unwrap();
        match &compiled.query.select {
            Some(Node::StructSelect(p)) => {
                assert_eq!(p.set.fields, vec!["title", "body"]);
                assert_eq!(p.set.nested[0].set.fields, vec!["body", "id"]);
            }
            other => panic!("expected struct, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_projection_field() {
        let query = posts().select(post_struct(&["subtitle"]));
        assert!(matches!(
            compile(query),
            Err(CompileError::Binding(BindError::UnknownField { .. }))
        ));
    }

    fn field_subset() -> impl Strategy<Value = Vec<&'static str>> {
        proptest::sample::subsequence(POST_FIELDS.to_vec(), 0..=POST_FIELDS.len())
            .prop_shuffle()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Property: merging is a set union regardless of operand order.
        #[test]
        fn test_merge_commutative(a in field_subset(), b in field_subset()) {
            let mut ab = merged(&a, &b);
            let mut ba = merged(&b, &a);
            prop_assert_eq!(ab.len(), ba.len());
            ab.sort();
            ba.sort();
            prop_assert_eq!(ab, ba);
        }

        /// Property: the first operand's fields keep their order at the front.
        #[test]
        fn test_merge_first_seen_order(a in field_subset(), b in field_subset()) {
            let ab = merged(&a, &b);
            prop_assert_eq!(&ab[..a.len()], &a.iter().map(ToString::to_string).collect::<Vec<_>>()[..]);
        }
    }
}

// =============================================================================
// Surface Call Contracts
// =============================================================================

mod surface_contracts {
    use super::*;

    #[test]
    fn test_datetime_add_unknown_unit() {
        let err = call(
            "datetime_add",
            vec![
                CallArg::Expr(Node::field(0, "inserted_at")),
                CallArg::Expr(Node::literal(-1i64)),
                CallArg::Text("fortnight".into()),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::Interval {
                unit: "fortnight".into()
            }
        );
    }

    #[test]
    fn test_datetime_add_compiles() {
        let node = call(
            "datetime_add",
            vec![
                CallArg::Expr(Node::field(0, "inserted_at")),
                CallArg::Expr(Node::param(-1i64)),
                CallArg::Text("month".into()),
            ],
        )
        .unwrap();
        let query = posts().filter(Node::op(
            OperatorKind::Gt,
            vec![Node::field(0, "inserted_at"), node],
        ));
        let compiled = compile(query).unwrap();
        assert_eq!(
            compiled.params[0].data_type,
            Some(ResolvedType::Builtin(DataType::Integer))
        );
    }

    #[test]
    fn test_in_subquery() {
        let inner = Query::from(Source::schema("Comment")).select(Node::field(0, "post_id"));
        let node = call(
            "in",
            vec![CallArg::Expr(Node::field(0, "id")), CallArg::Query(inner)],
        )
        .unwrap();
        assert!(compile(posts().filter(node)).is_ok());
    }

    #[test]
    fn test_count_distinct_and_filter() {
        let count = call(
            "count",
            vec![
                CallArg::Expr(Node::field(0, "title")),
                CallArg::Atom("distinct".into()),
            ],
        )
        .unwrap();
        let filtered = call(
            "filter",
            vec![
                CallArg::Expr(count),
                CallArg::Expr(Node::op(
                    OperatorKind::Gt,
                    vec![Node::field(0, "visits"), Node::param(10i64)],
                )),
            ],
        )
        .unwrap();
        let compiled = compile(posts().select(filtered)).unwrap();
        assert_eq!(compiled.params.len(), 1);
    }
}

// =============================================================================
// Output Contracts
// =============================================================================

mod output_contracts {
    use super::*;

    fn by_id(id: i64) -> Query {
        posts()
            .filter(Node::equals(Node::field(0, "id"), Node::param(id)))
            .select(post_struct_all())
    }

    fn post_struct_all() -> Node {
        Node::struct_select(SourceRef::Position(0), FieldSet::of(["id", "title"]))
    }

    #[test]
    fn test_bound_values_excluded_from_cache_key() {
        let a = compile(by_id(1)).unwrap();
        let b = compile(by_id(2)).unwrap();
        assert_eq!(a.cache_key, b.cache_key);
        assert_ne!(a.params, b.params);
    }

    #[test]
    fn test_literals_included_in_cache_key() {
        let build = |n: i64| posts().filter(Node::equals(Node::field(0, "id"), Node::literal(n)));
        assert_ne!(
            compile(build(1)).unwrap().cache_key,
            compile(build(2)).unwrap().cache_key
        );
    }

    #[test]
    fn test_aggregate_in_where_rejected_by_default() {
        let query = posts().filter(Node::op(
            OperatorKind::Gt,
            vec![
                Node::aggregate(AggregateKind::Count0, vec![]),
                Node::param(1i64),
            ],
        ));
        assert!(matches!(
            compile(query),
            Err(CompileError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_compiled_query_serializes() {
        let compiled = compile(by_id(7)).unwrap();
        let json = serde_json::to_string(&compiled).unwrap();
        let restored: CompiledQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cache_key, compiled.cache_key);
        assert_eq!(restored.params, compiled.params);
    }

    #[test]
    fn test_concurrent_compiles_agree() {
        let catalog = create_test_catalog();
        let compiler = Compiler::new(&catalog);
        let keys: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let compiler = &compiler;
                    s.spawn(move || compiler.compile(by_id(i)).unwrap().cache_key)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }
}
