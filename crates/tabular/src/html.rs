use crate::{display_cell, ParsedTable};

const TABLE_CLASS: &str = "table shiny-table table-striped table-hover w-auto";

pub fn render_html(table: &ParsedTable) -> String {
    let mut out = String::with_capacity(64 + table.row_count() * table.column_count() * 16);
    out.push_str("<table class=\"");
    out.push_str(TABLE_CLASS);
    out.push_str("\">\n<thead>\n<tr>");
    for column in &table.columns {
        out.push_str("<th>");
        out.push_str(&escape_html(column));
        out.push_str("</th>");
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str("<td>");
            out.push_str(&escape_html(display_cell(cell)));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>");
    out
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
#[path = "tests/html_tests.rs"]
mod tests;
