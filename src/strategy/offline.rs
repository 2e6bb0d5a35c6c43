//! The two synthetic responses shown to users while offline.

use crate::http::Response;

pub const UNAVAILABLE_STATUS: u16 = 503;

/// Generic response when neither network nor cache can answer.
pub fn unavailable() -> Response {
  Response::new(
    UNAVAILABLE_STATUS,
    "text/plain; charset=utf-8",
    "Service unavailable: offline",
  )
}

/// Self-contained offline document for page navigations.
pub fn offline_page(app_name: &str, retry_path: &str) -> Response {
  let app_name = escape_html(app_name);
  let retry_path = escape_html(retry_path);
  let body = format!(
    r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{app_name} - Offline</title>
<style>
body {{ font-family: system-ui, sans-serif; background: #f8f9fa; color: #212529; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }}
main {{ text-align: center; padding: 2rem; }}
a.retry {{ display: inline-block; margin-top: 1rem; padding: .5rem 1.25rem; border-radius: .375rem; background: #0d6efd; color: #fff; text-decoration: none; }}
</style>
</head>
<body>
<main>
<h1>{app_name}</h1>
<p>You are offline. Records you save now will be sent when the connection returns.</p>
<a class="retry" href="{retry_path}">Try again</a>
</main>
</body>
</html>
"#
  );

  Response::new(UNAVAILABLE_STATUS, "text/html; charset=utf-8", body)
}

fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(c),
    }
  }
  out
}
