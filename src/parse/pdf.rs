//! PDF text extraction (lopdf)

use lopdf::Document;

/// Extract text page by page, in page order, concatenated without separators.
///
/// Any page that cannot be decoded fails the whole document: a PDF with
/// silently missing pages would index misleading context.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    let doc = Document::load_mem(bytes).map_err(|e| e.to_string())?;

    let mut text = String::new();
    // get_pages is a BTreeMap keyed by 1-based page number
    for page_number in doc.get_pages().keys() {
        let page_text = doc
            .extract_text(&[*page_number])
            .map_err(|e| format!("page {}: {}", page_number, e))?;
        text.push_str(&page_text);
    }
    Ok(text)
}
