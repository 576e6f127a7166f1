//! Tests for the evaluator and the built-in operators

use super::*;
use crate::store::{Factbase, Store};

fn store(rows: &[&[(&str, Value)]]) -> Factbase {
    let fb = Factbase::new();
    for row in rows {
        let f = fb.insert().unwrap();
        for (prop, v) in row.iter() {
            f.append(prop, v.clone()).unwrap();
        }
    }
    fb
}

fn hits(fb: &Factbase, q: &str) -> usize {
    fb.query(q).unwrap().each(&Params::new(), |_| Ok(())).unwrap()
}

fn firsts(fb: &Factbase, q: &str, prop: &str) -> Vec<Value> {
    fb.query(q)
        .unwrap()
        .facts(&Params::new())
        .unwrap()
        .iter()
        .filter_map(|f| f.first(prop))
        .collect()
}

fn one(fb: &Factbase, q: &str) -> Option<Vec<Value>> {
    fb.query(q).unwrap().one(&Params::new()).unwrap()
}

fn failure(fb: &Factbase, q: &str) -> FactbaseError {
    match fb.query(q).unwrap().each(&Params::new(), |_| Ok(())) {
        Err(e) => e,
        Ok(n) => panic!("Expected {} to fail, it matched {} facts", q, n),
    }
}

fn time(s: &str) -> Value {
    Value::Time(Value::parse_time(s).unwrap())
}

fn numbers() -> Factbase {
    store(&[
        &[("x", Value::Int(1)), ("name", Value::from("a"))],
        &[("x", Value::Int(2)), ("name", Value::from("b"))],
        &[("x", Value::Float(3.5)), ("name", Value::from("c"))],
        &[("name", Value::from("d"))],
    ])
}

// ============================================================================
// Comparison
// ============================================================================

mod comparison_tests {
    use super::*;

    #[test]
    fn test_eq_is_numeric_across_kinds() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(eq x 2.0)"), 1);
        assert_eq!(hits(&fb, "(eq x 3.5)"), 1);
        assert_eq!(hits(&fb, "(eq x '2')"), 0);
    }

    #[test]
    fn test_ranges() {
        let fb = numbers();
        assert_eq!(firsts(&fb, "(gt x 1)", "name"), vec![Value::from("b"), Value::from("c")]);
        assert_eq!(hits(&fb, "(gte x 2)"), 2);
        assert_eq!(hits(&fb, "(lt x 3.5)"), 2);
        assert_eq!(hits(&fb, "(lte x 3.5)"), 3);
        assert_eq!(hits(&fb, "(lt name 'c')"), 2);
    }

    #[test]
    fn test_incomparable_is_false() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(gt name 1)"), 0);
        assert_eq!(hits(&fb, "(lt x 'z')"), 0);
    }

    #[test]
    fn test_multi_valued_is_existential() {
        let fb = store(&[&[("tag", Value::from("a")), ("tag", Value::from("b"))]]);
        assert_eq!(hits(&fb, "(eq tag 'b')"), 1);
        assert_eq!(hits(&fb, "(eq tag 'c')"), 0);
    }

    #[test]
    fn test_times() {
        let fb = store(&[
            &[("t", time("2024-01-01T00:00:00Z"))],
            &[("t", time("2024-06-01T00:00:00Z"))],
        ]);
        assert_eq!(hits(&fb, "(gt t 2024-03-01T00:00:00Z)"), 1);
        assert_eq!(hits(&fb, "(eq t 2024-01-01T00:00:00Z)"), 1);
    }

    #[test]
    fn test_bound_variables() {
        let fb = numbers();
        let q = fb.query("(eq x $x)").unwrap();
        let mut params = Params::new();
        params.insert("x".into(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(q.each(&params, |_| Ok(())).unwrap(), 2);
        assert_eq!(q.each(&Params::new(), |_| Ok(())).unwrap(), 0);
    }
}

// ============================================================================
// Boolean logic and existence
// ============================================================================

mod logic_tests {
    use super::*;

    #[test]
    fn test_connectives() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(and (exists x) (gt x 1))"), 2);
        assert_eq!(hits(&fb, "(or (eq x 1) (eq name 'd'))"), 2);
        assert_eq!(hits(&fb, "(not (exists x))"), 1);
        assert_eq!(hits(&fb, "(always)"), 4);
        assert_eq!(hits(&fb, "(never)"), 0);
        assert_eq!(hits(&fb, "(and)"), 4);
        assert_eq!(hits(&fb, "(or)"), 0);
    }

    #[test]
    fn test_when_is_implication() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(when (exists x) (gt x 1))"), 3);
    }

    #[test]
    fn test_either() {
        let fb = numbers();
        assert_eq!(
            firsts(&fb, "(as y (either x 0))", "y"),
            vec![Value::Int(1), Value::Int(2), Value::Float(3.5), Value::Int(0)]
        );
    }

    #[test]
    fn test_cardinality() {
        let fb = store(&[
            &[("a", Value::Int(1))],
            &[("a", Value::Int(1)), ("a", Value::Int(2))],
            &[("b", Value::Int(1))],
        ]);
        assert_eq!(hits(&fb, "(one a)"), 1);
        assert_eq!(hits(&fb, "(many a)"), 1);
        assert_eq!(hits(&fb, "(absent a)"), 1);
        assert_eq!(hits(&fb, "(nil a)"), 1);
        assert_eq!(hits(&fb, "(eq (size a) 2)"), 1);
    }

    #[test]
    fn test_type_names() {
        let fb = store(&[&[("a", Value::Int(1)), ("b", Value::from("x")), ("b", Value::from("y"))]]);
        assert_eq!(firsts(&fb, "(as k (type a))", "k"), vec![Value::from("Integer")]);
        assert_eq!(firsts(&fb, "(as k (type b))", "k"), vec![Value::from("Array")]);
        assert_eq!(firsts(&fb, "(as k (type c))", "k"), vec![Value::from("nil")]);
    }

    #[test]
    fn test_non_boolean_in_boolean_context() {
        let fb = numbers();
        let err = failure(&fb, "(and x)");
        assert_eq!(err.code(), "TYPE");
        assert!(err.to_string().contains("(and x)"));
    }

    #[test]
    fn test_arity() {
        let fb = numbers();
        let err = failure(&fb, "(not 1 2)");
        match err.root() {
            FactbaseError::Arity { operator, expected, actual } => {
                assert_eq!(operator, "not");
                assert_eq!((*expected, *actual), (1, 2));
            }
            e => panic!("Expected Arity, got {:?}", e),
        }
    }

    #[test]
    fn test_unknown_operator() {
        let fb = numbers();
        assert_eq!(failure(&fb, "(frobnicate x)").code(), "UNKNOWN_OPERATOR");
    }
}

// ============================================================================
// Arithmetic, casts and strings
// ============================================================================

mod value_tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(eq (plus x 1) 3)"), 1);
        assert_eq!(hits(&fb, "(eq (times x 2) 7.0)"), 1);
        assert_eq!(one(&fb, "(div 7 2)"), Some(vec![Value::Int(3)]));
        assert_eq!(one(&fb, "(minus 1 0.5)"), Some(vec![Value::Float(0.5)]));
        assert_eq!(one(&fb, "(plus 'a' 'b')"), Some(vec![Value::from("ab")]));
    }

    #[test]
    fn test_division_by_zero() {
        let fb = numbers();
        let err = fb.query("(div 1 0)").unwrap().one(&Params::new()).unwrap_err();
        assert_eq!(err.code(), "ARITHMETIC");
    }

    #[test]
    fn test_time_shift() {
        let fb = numbers();
        assert_eq!(
            one(&fb, "(plus 2024-01-01T00:00:00Z '2 days')"),
            Some(vec![time("2024-01-03T00:00:00Z")])
        );
        assert_eq!(
            one(&fb, "(minus 2024-01-01T00:01:00Z 2024-01-01T00:00:00Z)"),
            Some(vec![Value::Float(60.0)])
        );
    }

    #[test]
    fn test_casts() {
        let fb = numbers();
        assert_eq!(one(&fb, "(to_integer '42')"), Some(vec![Value::Int(42)]));
        assert_eq!(one(&fb, "(to_float 2)"), Some(vec![Value::Float(2.0)]));
        assert_eq!(one(&fb, "(to_string 7)"), Some(vec![Value::from("7")]));
        assert_eq!(
            one(&fb, "(to_time 0)"),
            Some(vec![time("1970-01-01T00:00:00Z")])
        );
    }

    #[test]
    fn test_strings() {
        let fb = numbers();
        assert_eq!(one(&fb, "(concat 'a' 1 'b')"), Some(vec![Value::from("a1b")]));
        assert_eq!(
            one(&fb, "(sprintf '%s=%d' 'x' 5)"),
            Some(vec![Value::from("x=5")])
        );
        assert_eq!(hits(&fb, "(matches name '^[ab]$')"), 2);
    }

    #[test]
    fn test_bad_regex() {
        let fb = numbers();
        assert_eq!(failure(&fb, "(matches name '(')").code(), "TYPE");
    }
}

// ============================================================================
// Ordering and per-run state
// ============================================================================

mod ordering_tests {
    use super::*;

    #[test]
    fn test_unique() {
        let fb = store(&[
            &[("k", Value::Int(1)), ("n", Value::Int(1))],
            &[("k", Value::Int(1)), ("n", Value::Int(2))],
            &[("k", Value::Int(2)), ("n", Value::Int(3))],
            &[("n", Value::Int(4))],
        ]);
        assert_eq!(firsts(&fb, "(unique k)", "n"), vec![Value::Int(1), Value::Int(3)]);
        // state is per run
        assert_eq!(hits(&fb, "(unique k)"), 2);
    }

    #[test]
    fn test_prev() {
        let fb = numbers();
        assert_eq!(
            firsts(&fb, "(as p (prev name))", "p"),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert_eq!(hits(&fb, "(nil (prev name))"), 1);
    }

    #[test]
    fn test_fact_sets() {
        let fb = store(&[
            &[("v", Value::Int(3))],
            &[("v", Value::Int(1))],
            &[("w", Value::Int(0))],
            &[("v", Value::Int(2))],
        ]);
        assert_eq!(
            firsts(&fb, "(sorted v (always))", "v"),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(
            firsts(&fb, "(inverted (sorted v (always)))", "v"),
            vec![Value::Int(3), Value::Int(2), Value::Int(1)]
        );
        assert_eq!(
            firsts(&fb, "(head 2 (inverted (exists v)))", "v"),
            vec![Value::Int(2), Value::Int(1)]
        );
    }

    #[test]
    fn test_fact_sets_are_not_values() {
        let fb = numbers();
        let err = fb.query("(head 1 (always))").unwrap().one(&Params::new()).unwrap_err();
        assert_eq!(err.code(), "TYPE");
    }
}

// ============================================================================
// Aggregation
// ============================================================================

mod aggregate_tests {
    use super::*;

    #[test]
    fn test_reducers() {
        let fb = numbers();
        assert_eq!(one(&fb, "(agg (exists x) (count))"), Some(vec![Value::Int(3)]));
        assert_eq!(one(&fb, "(agg (eq x 1) (sum x))"), Some(vec![Value::Int(1)]));
        assert_eq!(one(&fb, "(agg (always) (sum x))"), Some(vec![Value::Float(6.5)]));
        assert_eq!(one(&fb, "(agg (always) (max x))"), Some(vec![Value::Float(3.5)]));
        assert_eq!(one(&fb, "(agg (always) (min name))"), Some(vec![Value::from("a")]));
        assert_eq!(one(&fb, "(agg (always) (first x))"), Some(vec![Value::Int(1)]));
        assert_eq!(one(&fb, "(agg (always) (nth 1 name))"), Some(vec![Value::from("b")]));
        assert_eq!(one(&fb, "(agg (never) (max x))"), None);
    }

    #[test]
    fn test_sum_rejects_strings() {
        let fb = numbers();
        let err = fb.query("(agg (always) (sum name))").unwrap().one(&Params::new()).unwrap_err();
        assert_eq!(err.code(), "TYPE");
    }

    #[test]
    fn test_sub_query_sees_the_outer_fact() {
        let fb = store(&[
            &[("id", Value::Int(1)), ("kind", Value::from("dir"))],
            &[("parent", Value::Int(1)), ("size", Value::Int(10))],
            &[("parent", Value::Int(1)), ("size", Value::Int(5))],
            &[("id", Value::Int(2)), ("kind", Value::from("dir"))],
        ]);
        assert_eq!(
            firsts(&fb, "(and (eq kind 'dir') (as total (agg (eq parent $id) (sum size))))", "total"),
            vec![Value::Int(15), Value::Int(0)]
        );
        assert_eq!(
            firsts(&fb, "(and (eq kind 'dir') (empty (eq parent $id)))", "id"),
            vec![Value::Int(2)]
        );
    }

    #[test]
    fn test_agg_over_fact_set() {
        let fb = numbers();
        assert_eq!(
            one(&fb, "(agg (head 2 (sorted x (always))) (sum x))"),
            Some(vec![Value::Int(3)])
        );
    }
}

// ============================================================================
// Derivation, definitions, debugging
// ============================================================================

mod meta_tests {
    use super::*;

    #[test]
    fn test_derived_values_are_not_stored() {
        let fb = numbers();
        let found = fb
            .query("(and (eq x 1) (as double (times x 2)))")
            .unwrap()
            .facts(&Params::new())
            .unwrap();
        assert_eq!(found[0].get("double"), Some(vec![Value::Int(2)]));
        assert_eq!(hits(&fb, "(exists double)"), 0);
    }

    #[test]
    fn test_join() {
        let fb = store(&[
            &[("id", Value::Int(1)), ("label", Value::from("root"))],
            &[("owner", Value::Int(1))],
        ]);
        assert_eq!(
            firsts(&fb, "(and (exists owner) (join 'owner_label<=label' (eq id $owner)))", "owner_label"),
            vec![Value::from("root")]
        );
    }

    #[test]
    fn test_defn_and_undef() {
        let fb = numbers();
        assert_eq!(one(&fb, "(defn big \"(gt x $_1)\")"), Some(vec![Value::Bool(true)]));
        assert!(fb.registry().contains("big"));
        assert_eq!(hits(&fb, "(big 1)"), 2);
        one(&fb, "(undef big)");
        assert_eq!(failure(&fb, "(big 1)").code(), "UNKNOWN_OPERATOR");
    }

    #[test]
    fn test_builtins_cannot_be_redefined() {
        let fb = numbers();
        assert!(fb.query("(defn eq \"(always)\")").unwrap().one(&Params::new()).is_err());
    }

    #[test]
    fn test_runaway_macro() {
        let fb = Factbase::with_tuning(crate::config::Tuning::default().with_max_depth(8));
        fb.insert().unwrap().append("x", 1).unwrap();
        one(&fb, "(defn loop \"(loop $_1)\")");
        assert_eq!(failure(&fb, "(loop 1)").code(), "INVARIANT");
    }

    #[test]
    fn test_native_operator() {
        let fb = numbers();
        fb.registry()
            .define(
                "odd",
                Arc::new(|t: &Term, s: &Scope<'_>| -> Result<Outcome> {
                    let v = s.scalar(&t.operands()[0])?;
                    Ok(Outcome::Bool(matches!(v, Some(Value::Int(i)) if i % 2 == 1)))
                }),
            )
            .unwrap();
        assert_eq!(firsts(&fb, "(odd x)", "x"), vec![Value::Int(1)]);
    }

    #[test]
    fn test_operators_without_operands_see_each_fact() {
        let fb = store(&[
            &[("foo", Value::Int(1))],
            &[("foo", Value::Int(2))],
            &[("foo", Value::Int(1))],
            &[("foo", Value::Int(2))],
        ]);
        one(&fb, "(defn is_one \"(eq foo 1)\")");
        assert_eq!(hits(&fb, "(is_one)"), 2);
        assert_eq!(hits(&fb, "(not (is_one))"), 2);
        assert_eq!(one(&fb, "(agg (is_one) (count))"), Some(vec![Value::Int(2)]));

        fb.registry()
            .define(
                "foo_is_two",
                Arc::new(|_: &Term, s: &Scope<'_>| -> Result<Outcome> {
                    Ok(Outcome::Bool(s.fact("foo") == Some(vec![Value::Int(2)])))
                }),
            )
            .unwrap();
        assert_eq!(hits(&fb, "(foo_is_two)"), 2);
        assert_eq!(hits(&fb, "(or (foo_is_two) (is_one))"), 4);
    }

    #[test]
    fn test_assert() {
        let fb = numbers();
        assert_eq!(hits(&fb, "(assert 'x is set' (always))"), 4);
        let err = failure(&fb, "(assert 'x is set' (exists x))");
        match err.root() {
            FactbaseError::Assertion(m) => assert_eq!(m, "x is set"),
            e => panic!("Expected Assertion, got {:?}", e),
        }
    }

    #[test]
    fn test_traced_passes_through() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let fb = numbers();
        assert_eq!(hits(&fb, "(traced (eq x 2))"), 1);
    }

    #[test]
    fn test_env() {
        let fb = numbers();
        assert_eq!(
            one(&fb, "(env factbase_surely_unset_var 'fallback')"),
            Some(vec![Value::from("fallback")])
        );
        let err = fb
            .query("(env factbase_surely_unset_var)")
            .unwrap()
            .one(&Params::new())
            .unwrap_err();
        assert_eq!(err.code(), "ENV");
        let path = std::env::var("PATH").unwrap_or_default();
        if !path.is_empty() {
            assert_eq!(one(&fb, "(env path)"), Some(vec![Value::Str(path)]));
        }
    }
}
