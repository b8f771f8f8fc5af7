use super::*;

fn table() -> ParsedTable {
    ParsedTable {
        columns: vec!["name".into(), "note".into()],
        rows: vec![
            vec![Some("alice".into()), Some("<b>bold</b>".into())],
            vec![Some("bob".into()), None],
        ],
    }
}

#[test]
fn renders_header_and_one_row_per_record() {
    let html = render_html(&table());
    assert!(html.starts_with("<table"));
    assert!(html.contains("<thead>\n<tr><th>name</th><th>note</th></tr>"));
    assert_eq!(html.matches("<tr>").count(), 3);
}

#[test]
fn escapes_cell_text() {
    let html = render_html(&table());
    assert!(html.contains("<td>&lt;b&gt;bold&lt;/b&gt;</td>"));
    assert!(!html.contains("<b>bold"));
}

#[test]
fn missing_cells_show_nan() {
    let html = render_html(&table());
    assert!(html.contains("<td>bob</td><td>NaN</td>"));
}

#[test]
fn empty_table_still_has_header() {
    let html = render_html(&ParsedTable {
        columns: vec!["only".into()],
        rows: vec![],
    });
    assert!(html.contains("<th>only</th>"));
    assert!(html.contains("<tbody>\n</tbody>"));
}

#[test]
fn escape_html_covers_attribute_quotes() {
    assert_eq!(escape_html(r#"a&b "c" 'd'"#), "a&amp;b &quot;c&quot; &#39;d&#39;");
}
