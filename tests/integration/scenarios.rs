//! Whole-document scenarios: select, plan, adjust, apply.

use markup_patcher::edit::{self, Edit, EditError};
use markup_patcher::markup::{Document, Flavor};
use markup_patcher::patch::{plan_clear_text_content, plan_element, PatchOptions};
use markup_patcher::select::Selector;

fn update(input: &str, flavor: Flavor, selector: &str, attributes: &[&str], value: &str) -> Result<String, EditError> {
    let document = Document::parse(input, flavor);
    let names: Vec<String> = attributes.iter().map(|s| s.to_string()).collect();
    let options = PatchOptions::new(flavor);

    let mut edits: Vec<Edit> = Vec::new();
    for id in Selector::parse(selector).unwrap().select(&document).unwrap() {
        let element = document.element(id).unwrap();
        edits.extend(plan_element(element, &names, value, &options)?);
    }
    edit::apply(input, edit::adjust_for_bom(input, edits))
}

fn update_html(input: &str, selector: &str, value: &str) -> String {
    update(input, Flavor::Html, selector, &["src"], value).unwrap()
}

#[test]
fn test_ambiguous_empty_value_is_normalized() {
    let input = "<script src   =    '' type=module>x</script>";
    assert_eq!(
        update_html(input, "", "qux"),
        "<script src=\"qux\" type=module></script>"
    );
}

#[test]
fn test_missing_attribute_insertion() {
    assert_eq!(
        update_html("<script></script>", "", "qux"),
        "<script src=\"qux\"></script>"
    );
    assert_eq!(update_html("<script/>", "", "qux"), "<script src=\"qux\"/>");
}

#[test]
fn test_distinct_id_selectors_touch_only_their_element() {
    let input = "<body>\n<script id=a src='1.js'></script>\n<script id=b src='2.js'></script>\n</body>";
    let first = update_html(input, "id:a", "new.js");
    assert_eq!(
        first,
        "<body>\n<script id=a src='new.js'></script>\n<script id=b src='2.js'></script>\n</body>"
    );
    let both = update_html(&first, "id:b", "new.js");
    assert_eq!(
        both,
        "<body>\n<script id=a src='new.js'></script>\n<script id=b src='new.js'></script>\n</body>"
    );
}

#[test]
fn test_css_selector_over_many_elements() {
    let input = concat!(
        "<head>",
        "<script class=bundle src=a.js>a()</script>",
        "<script src=keep.js></script>",
        "<script class='x bundle' src=\"b.js\">b()</script>",
        "</head>"
    );
    assert_eq!(
        update_html(input, "css:script.bundle", "all.js"),
        concat!(
            "<head>",
            "<script class=bundle src=all.js></script>",
            "<script src=keep.js></script>",
            "<script class='x bundle' src=\"all.js\"></script>",
            "</head>"
        )
    );
}

#[test]
fn test_xpath_selector() {
    let input = "<html><head><script src=a.js></script></head><body><script src=b.js></script></body></html>";
    assert_eq!(
        update_html(input, "xpath://body/script[@src='b.js']", "c.js"),
        "<html><head><script src=a.js></script></head><body><script src=c.js></script></body></html>"
    );
}

#[test]
fn test_xml_document() {
    let input = "<?xml version=\"1.0\"?>\n<root><script src=\"a.js\">x</script><script/></root>";
    let output = update(input, Flavor::Xml, "xpath://script", &["src"], "b.js").unwrap();
    assert_eq!(
        output,
        "<?xml version=\"1.0\"?>\n<root><script src=\"b.js\"></script><script src=\"b.js\"/></root>"
    );
}

#[test]
fn test_clear_scenario() {
    let input = "<div><span>1</span>2<span>3</span></div>";
    let document = Document::parse(input, Flavor::Html);
    let id = document.elements_by_tag("div").next().unwrap();
    let edit = plan_clear_text_content(document.element(id).unwrap()).unwrap();
    assert_eq!(edit::apply(input, vec![edit]).unwrap(), "<div></div>");
}

#[test]
fn test_bom_is_kept() {
    let input = "\u{feff}<script src='foobar'></script>";
    assert_eq!(
        update_html(input, "", "海猫"),
        "\u{feff}<script src='海猫'></script>"
    );
}

#[test]
fn test_several_attributes_and_body() {
    let input = "<script data-main src=old.js>\n  legacy();\n</script>";
    let output = update(input, Flavor::Html, "", &["src", "data-main", "data-fallback"], "app.js").unwrap();
    assert_eq!(
        output,
        "<script data-main=\"app.js\" src=app.js data-fallback=\"app.js\"></script>"
    );
}

#[test]
fn test_repeated_element_in_selection_is_harmless() {
    let input = "<script id=s src=a.js></script>";
    let output = update(input, Flavor::Html, "css:#s, script", &["src"], "b.js").unwrap();
    assert_eq!(output, "<script id=s src=b.js></script>");
}

#[test]
fn test_values_are_escaped_per_flavor() {
    let input = "<script src='a'></script>";
    let html = update(input, Flavor::Html, "", &["src"], "a.js?x=1&y=\"2\"").unwrap();
    let xml = update(input, Flavor::Xml, "", &["src"], "a.js?x=1&y=\"2\"").unwrap();
    for (output, flavor) in [(html, Flavor::Html), (xml, Flavor::Xml)] {
        let document = Document::parse(&output, flavor);
        let id = document.elements_by_tag("script").next().unwrap();
        let (_, src) = document.element(id).unwrap().find_attribute("src").unwrap();
        assert_eq!(src.value(), Some("a.js?x=1&y=\"2\""));
        assert!(output.contains("&amp;"));
    }
}
