//! The single page: title, sidebar form, and the output area.

use shared::protocol::{OutputState, SessionSnapshot};
use tabular::escape_html;

use crate::api::DATA_FILE_FIELD;

pub const APP_TITLE: &str = "CSV File Uploader";
pub const OUTPUT_ID: &str = "file_contents";

const THEME_CSS: &str =
    "https://cdn.jsdelivr.net/npm/bootswatch@5.3.3/dist/flatly/bootstrap.min.css";

// Submits a form whenever one of its inputs changes, and swaps the output
// area when the server pushes a re-render over the websocket.
const CLIENT_SCRIPT: &str = r#"<script>
(() => {
  document.querySelectorAll("form[data-autosubmit]").forEach((form) => {
    form.addEventListener("change", () => form.submit());
  });
  const output = document.getElementById("file_contents");
  const scheme = location.protocol === "https:" ? "wss" : "ws";
  const socket = new WebSocket(`${scheme}://${location.host}/ws`);
  socket.addEventListener("message", (event) => {
    const message = JSON.parse(event.data);
    if (message.type !== "output_updated") return;
    const state = message.payload.output;
    if (state.state === "rendered") {
      output.innerHTML = state.html;
    } else if (state.state === "failed") {
      const error = document.createElement("div");
      error.className = "shiny-output-error text-danger";
      error.textContent = "Error: " + state.error.message;
      output.replaceChildren(error);
    } else {
      output.replaceChildren();
    }
  });
})();
</script>"#;

pub fn render_page(snapshot: &SessionSnapshot) -> String {
    let mut page = String::with_capacity(4096);
    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    page.push_str(&format!("<title>{APP_TITLE}</title>\n"));
    page.push_str(&format!("<link rel=\"stylesheet\" href=\"{THEME_CSS}\">\n"));
    page.push_str("</head>\n<body>\n<div class=\"container-fluid\">\n");
    page.push_str(&format!("<h1>{APP_TITLE}</h1>\n"));
    page.push_str("<div class=\"row\">\n");
    page.push_str(&render_sidebar(snapshot));
    page.push_str(&format!(
        "<main class=\"col-sm-8\"><div id=\"{OUTPUT_ID}\" class=\"shiny-table-output\">{}</div></main>\n",
        render_output(&snapshot.output)
    ));
    page.push_str("</div>\n</div>\n");
    page.push_str(CLIENT_SCRIPT);
    page.push_str("\n</body>\n</html>\n");
    page
}

fn render_sidebar(snapshot: &SessionSnapshot) -> String {
    let current = snapshot
        .data_file
        .as_ref()
        .map(|file| {
            format!(
                "<div class=\"form-text\">Loaded: {} ({} bytes)</div>",
                escape_html(&file.name),
                file.size
            )
        })
        .unwrap_or_default();
    let checked = if snapshot.header { " checked" } else { "" };

    format!(
        r#"<aside class="col-sm-4"><div class="card card-body bg-light">
<form data-autosubmit method="post" action="/upload" enctype="multipart/form-data" class="mb-3">
<label class="form-label" for="{DATA_FILE_FIELD}">Choose CSV File</label>
<input class="form-control" id="{DATA_FILE_FIELD}" name="{DATA_FILE_FIELD}" type="file" accept=".csv">
{current}
<noscript><button class="btn btn-primary mt-2" type="submit">Upload</button></noscript>
</form>
<form data-autosubmit method="post" action="/header">
<div class="form-check">
<input class="form-check-input" id="header" name="header" type="checkbox"{checked}>
<label class="form-check-label" for="header">Header</label>
</div>
<noscript><button class="btn btn-secondary mt-2" type="submit">Apply</button></noscript>
</form>
</div></aside>
"#
    )
}

/// HTML for the output area. Idle renders nothing at all.
pub fn render_output(output: &OutputState) -> String {
    match output {
        OutputState::Idle => String::new(),
        OutputState::Rendered { html, .. } => html.clone(),
        OutputState::Failed { error } => format!(
            "<div class=\"shiny-output-error text-danger\">Error: {}</div>",
            escape_html(&error.message)
        ),
    }
}

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
