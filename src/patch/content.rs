use crate::edit::Edit;
use crate::markup::ElementRef;

/// Plan the removal of everything between an element's start and end tags.
///
/// Returns `None` for self-closed elements, elements without children, and
/// elements whose content is already an empty span.
pub fn plan_clear_text_content(element: ElementRef<'_>) -> Option<Edit> {
    if element.is_self_closed() {
        return None;
    }
    let children = element.children();
    let (first, last) = (children.first()?, children.last()?);

    let document = element.document();
    let start = document.node(*first).source_range().start.offset;
    let end = document.outer_end(*last).offset;
    (end > start).then(|| Edit::delete(start, end))
}
