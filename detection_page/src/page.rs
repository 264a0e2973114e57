use crate::container::ImageContainer;
use crate::controller::Snapshot;

const STYLESHEET: &str = r#"
body { font-family: sans-serif; display: flex; flex-direction: column; align-items: center; }
#image-container { position: relative; width: 640px; max-width: 100%; margin-top: 1em; }
#image-container img { width: 100%; display: block; }
#status { min-height: 1.2em; margin: 0.5em 0; }
.custom-file-upload { display: inline-block; padding: 6px 12px; cursor: pointer; border: 2px solid #000; border-radius: 6px; }
#file-upload { display: none; }
.bounding-box { position: absolute; box-sizing: border-box; border: solid 2px; }
.bounding-box-label { position: absolute; color: white; font-size: 12px; top: -16px; left: -2px; padding: 0 4px; white-space: nowrap; }
"#;

// Polls the status while it is expected to change on its own, then reloads
// so the finished boxes are shown.
const STATUS_SCRIPT: &str = r#"
const status = document.getElementById("status");
async function poll() {
    const response = await fetch("/status");
    const state = await response.json();
    status.textContent = state.status;
    if (state.pending) {
        setTimeout(poll, 1000);
    } else {
        window.location.replace("/");
    }
}
if (status.dataset.pending === "true") { setTimeout(poll, 1000); }
"#;

pub fn render_page(snapshot: &Snapshot) -> String {
    let status = snapshot.status;
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Object Detection</title>
<style>{style}</style>
</head>
<body>
<h1>Object Detection</h1>
<form method="post" action="/upload" enctype="multipart/form-data">
<label for="file-upload" class="custom-file-upload">
<input id="file-upload" name="file" type="file" accept="image/*" onchange="this.form.submit()">
Upload image
</label>
</form>
<div id="image-container">{container}</div>
<p id="status" data-pending="{pending}">{status}</p>
<script>{script}</script>
</body>
</html>
"#,
        style = STYLESHEET,
        container = render_container(&snapshot.container),
        pending = status.is_pending(),
        status = escape_html(status.as_str()),
        script = STATUS_SCRIPT,
    )
}

pub fn render_container(container: &ImageContainer) -> String {
    let mut html = String::new();
    if let Some(src) = container.image_src() {
        html.push_str(&format!(
            r#"<img src="{}" alt="Uploaded image">"#,
            escape_html(src)
        ));
    }
    for overlay in container.overlays() {
        html.push_str(&format!(
            r#"<div class="bounding-box" style="{}"><span class="bounding-box-label" style="{}">{}</span></div>"#,
            escape_html(&overlay.box_style()),
            escape_html(&overlay.label_style()),
            escape_html(&overlay.label)
        ));
    }
    html
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
