//! Property tests: byte preservation, idempotence and scheduler ordering.

use markup_patcher::edit::{self, Edit, EditError};
use markup_patcher::markup::{Document, Flavor};
use markup_patcher::patch::{plan_element, PatchOptions};
use proptest::prelude::*;

fn src_attribute() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(" src".to_owned()),
        Just(" src=''".to_owned()),
        Just(" src  =  \"\"".to_owned()),
        "[a-z.]{1,8}".prop_map(|v| format!(" src={v}")),
        "[a-z./ ]{1,8}".prop_map(|v| format!(" src='{v}'")),
        "[a-z./ ]{1,8}".prop_map(|v| format!(" SRC = \"{v}\"")),
    ]
}

fn other_attributes() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just(" type=module"),
            Just(" async"),
            Just(" data-x='1'"),
            Just("\n\tdefer"),
        ],
        0..3,
    )
    .prop_map(|parts| parts.concat())
}

/// `<p>prefix</p><script ...>body</script><p>suffix</p>`, returned with its
/// prefix and suffix.
fn document() -> impl Strategy<Value = (String, String, String)> {
    (
        "[a-z \n]{0,10}",
        src_attribute(),
        other_attributes(),
        "[ \t]{0,2}",
        prop::option::of("[a-z ();\n]{0,10}"),
        "[a-z \n]{0,10}",
    )
        .prop_map(|(prefix, src, others, ws, body, suffix)| {
            let tag = match body {
                Some(body) => format!("<script{src}{others}{ws}>{body}</script>"),
                None => format!("<script{src}{others}{ws}/>"),
            };
            let head = format!("<p>{prefix}</p>");
            let tail = format!("<p>{suffix}</p>");
            (format!("{head}{tag}{tail}"), head, tail)
        })
}

fn value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9./_ &<>\"'海-]{0,12}"
}

fn update(input: &str, value: &str) -> String {
    let document = Document::parse(input, Flavor::Html);
    let id = document.elements_by_tag("script").next().unwrap();
    let edits = plan_element(
        document.element(id).unwrap(),
        &["src".to_owned()],
        value,
        &PatchOptions::default(),
    )
    .unwrap();
    edit::apply(input, edit::adjust_for_bom(input, edits)).unwrap()
}

/// Non-overlapping edits at distinct offsets over a text long enough to hold
/// them, in a random order, plus the expected result.
fn disjoint_edits() -> impl Strategy<Value = (String, Vec<Edit>, String)> {
    (
        prop::collection::vec((1usize..4, 0usize..4, "[A-Z]{0,3}"), 0..8),
        0usize..4,
    )
        .prop_flat_map(|(pieces, tail)| {
            let mut edits = Vec::new();
            let mut pos = 0;
            for (gap, len, text) in pieces {
                pos += gap;
                edits.push(Edit::new(pos, pos + len, text));
                pos += len;
            }
            let text = prop::collection::vec(prop::char::range('a', 'z'), pos + tail)
                .prop_map(|chars| chars.into_iter().collect::<String>());
            (text, Just(edits.clone()).prop_shuffle(), Just(edits))
        })
        .prop_map(|(text, shuffled, ordered)| {
            let mut expected = String::new();
            let mut cursor = 0;
            for edit in &ordered {
                expected.push_str(&text[cursor..edit.byte_start]);
                expected.push_str(&edit.new_text);
                cursor = edit.byte_end;
            }
            expected.push_str(&text[cursor..]);
            (text, shuffled, expected)
        })
}

proptest! {
    #[test]
    fn prop_bytes_outside_the_element_survive((input, head, tail) in document(), value in value()) {
        let output = update(&input, &value);
        let head_with_tag = format!("{head}<script");
        prop_assert!(output.starts_with(&head_with_tag));
        prop_assert!(output.ends_with(&tail));

        let document = Document::parse(&output, Flavor::Html);
        let id = document.elements_by_tag("script").next().unwrap();
        let script = document.element(id).unwrap();
        let (_, src) = script.find_attribute("src").unwrap();
        prop_assert_eq!(src.value().unwrap_or(""), value.as_str());
        prop_assert!(script.children().is_empty());
    }

    #[test]
    fn prop_update_is_idempotent((input, _, _) in document(), value in value()) {
        let once = update(&input, &value);
        let twice = update(&once, &value);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_bom_does_not_change_the_result((input, _, _) in document(), value in value()) {
        let with_bom = format!("\u{feff}{input}");
        prop_assert_eq!(update(&with_bom, &value), format!("\u{feff}{}", update(&input, &value)));
    }

    #[test]
    fn prop_apply_is_order_independent((text, edits, expected) in disjoint_edits()) {
        let scheduled = edit::schedule(&text, edits.clone()).unwrap();
        prop_assert!(scheduled.windows(2).all(|w| w[0].byte_start > w[1].byte_end));
        prop_assert_eq!(edit::apply(&text, edits).unwrap(), expected);
    }

    #[test]
    fn prop_overlapping_replacements_conflict(
        start in 0usize..10,
        len in 1usize..5,
        shift in 0usize..4,
        extra in 1usize..5,
    ) {
        prop_assume!(shift < len);
        let text = "x".repeat(30);
        let first = Edit::new(start, start + len, "A");
        let second = Edit::new(start + shift, start + shift + extra, "B");
        let result = edit::apply(&text, vec![first, second]);
        prop_assert!(
            matches!(result, Err(EditError::Conflict { .. })),
            "expected a conflict, got {:?}",
            result
        );
    }
}
