//! HTML configuration pages.

use crate::target::TargetRecord;

/// What the prefixed-mode home page reports under the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeStatus<'a> {
    Unset,
    Current(&'a str),
    Saved(&'a str),
    Error(&'a str),
}

const STYLE: &str = r#"
    body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; max-width: 640px; margin: 2em auto; padding: 0 1em; line-height: 1.6; }
    h1 { text-align: center; }
    form { display: flex; flex-wrap: wrap; gap: 0.5em; margin-bottom: 1em; }
    input { flex-grow: 1; padding: 0.5em; border: 1px solid #ccc; border-radius: 4px; }
    label { width: 100%; font-weight: 600; }
    button { padding: 0.5em 1em; border: none; background-color: #007bff; color: white; border-radius: 4px; cursor: pointer; }
    #status { background-color: #f0f0f0; padding: 1em; border-radius: 4px; }
    code { background-color: #e0e0e0; padding: 0.2em 0.4em; border-radius: 3px; }
    .error { color: #b00020; }
    .ok { color: #1b7f3b; }
"#;

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <style>{STYLE}</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = html_escape(title),
    )
}

/// Home page for prefixed mode: a `setUrl` form submitting back to
/// `home_path`, plus the current status.
pub fn prefixed_home(status: HomeStatus<'_>, home_path: &str, route_prefix: &str) -> String {
    let status_html = match status {
        HomeStatus::Unset => "<p>No proxy target set yet.</p>".to_string(),
        HomeStatus::Current(url) => {
            format!("<p>Current target: <code>{}</code></p>", html_escape(url))
        }
        HomeStatus::Saved(url) => format!(
            r#"<p class="ok"><b>Proxy target saved.</b></p>
    <p>Current target: <code>{url}</code></p>
    <p>Start browsing at <a href="{prefix}" target="_blank">{prefix}</a></p>"#,
            url = html_escape(url),
            prefix = html_escape(route_prefix),
        ),
        HomeStatus::Error(message) => {
            format!(r#"<p class="error"><b>Error:</b> {}</p>"#, html_escape(message))
        }
    };

    page(
        "Proxy target",
        &format!(
            r#"  <h1>Set the proxy target</h1>
  <p>Enter the full URL to proxy (for example <code>https://example.com</code>).</p>
  <form action="{action}" method="GET">
    <input type="url" name="setUrl" placeholder="https://example.com" required>
    <button type="submit">Set</button>
  </form>
  <div id="status">
    {status_html}
  </div>"#,
            action = html_escape(home_path),
        ),
    )
}

/// Home page for direct mode: the target record form, prefilled.
pub fn direct_home(record: &TargetRecord) -> String {
    let fields = [
        ("targetHost", "Target host", &record.target_host, "api.example.com"),
        ("hostHeader", "Host header", &record.host_header, "api.example.com"),
        ("originHeader", "Origin header", &record.origin_header, "https://api.example.com"),
        ("userAgent", "User-Agent", &record.user_agent, "Mozilla/5.0"),
        (
            "accessControlAllowOrigin",
            "Access-Control-Allow-Origin",
            &record.access_control_allow_origin,
            "https://app.example.com",
        ),
    ];

    let inputs: String = fields
        .iter()
        .map(|(name, label, value, placeholder)| {
            format!(
                r#"    <label for="{name}">{label}</label>
    <input id="{name}" name="{name}" value="{value}" placeholder="{placeholder}">
"#,
                value = html_escape(value),
            )
        })
        .collect();

    let status_html = if record.is_configured() {
        format!(
            "<p>Proxying every path to <code>{}</code></p>",
            html_escape(&record.target_host)
        )
    } else {
        "<p>No target host set yet.</p>".to_string()
    };

    page(
        "Proxy configuration",
        &format!(
            r#"  <h1>Proxy configuration</h1>
  <form action="/config" method="POST">
{inputs}    <button type="submit">Save</button>
  </form>
  <div id="status">
    {status_html}
  </div>"#
        ),
    )
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_escaped() {
        let html = prefixed_home(HomeStatus::Current("https://x/?a=<b>&c=\""), "/", "/proxy");
        assert!(html.contains("https://x/?a=&lt;b&gt;&amp;c=&quot;"));
        assert!(!html.contains("<b>&c"));
    }

    #[test]
    fn saved_status_links_to_prefix() {
        let html = prefixed_home(HomeStatus::Saved("https://api.example.com"), "/", "/proxy");
        assert!(html.contains(r#"href="/proxy""#));
        assert!(html.contains("Proxy target saved"));
    }

    #[test]
    fn set_url_form_submits_to_home_path() {
        let html = prefixed_home(HomeStatus::Unset, "/ui", "/proxy");
        assert!(html.contains(r#"<form action="/ui" method="GET">"#));
        assert!(!html.contains(r#"action="/""#));
    }

    #[test]
    fn direct_form_is_prefilled() {
        let record = TargetRecord {
            target_host: "api.example.com".into(),
            user_agent: "agent \"x\"".into(),
            ..Default::default()
        };
        let html = direct_home(&record);
        assert!(html.contains(r#"name="targetHost" value="api.example.com""#));
        assert!(html.contains(r#"value="agent &quot;x&quot;""#));
        assert!(html.contains(r#"action="/config" method="POST""#));
    }
}
