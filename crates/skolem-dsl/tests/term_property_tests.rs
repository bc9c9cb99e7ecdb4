use skolem_dsl::parser::parse;
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z][A-Za-z0-9_]{0,6}").unwrap()
}

/// Surface text for lambda-free terms (lambdas compare by identity).
fn term_text() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        4 => name(),
        1 => Just("*".to_string()),
        1 => Just("?".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(f, a)| format!("{f} ({a})")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(f, a, b)| format!("({f}) ({a}) ({b})")),
            (inner.clone(), inner.clone()).prop_map(|(w, b)| format!("{{{w}}} {b}")),
            (inner.clone(), inner.clone()).prop_map(|(c, b)| format!("[{c}] {b}")),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn identical_text_parses_to_equal_terms(text in term_text()) {
        let a = parse(&text).expect("parse");
        let b = parse(&text).expect("parse");
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn printed_terms_reparse_to_the_same_term(text in term_text()) {
        let term = parse(&text).expect("parse");
        let printed = term.to_string();
        let reparsed = parse(&printed).expect("reparse printed term");
        prop_assert_eq!(reparsed, term, "printed={}", printed);
    }
}
