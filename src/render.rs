use crate::dataset::{ProxySettings, ProxyTarget};

/// Produces the panel's HTML pages.
pub trait PageRenderer: Send + Sync {
    fn render_error_page(&self, message: &str, cause: Option<&str>, is_fatal: bool) -> String;
    fn render_home_page(&self, settings: &ProxySettings, is_password_set: bool) -> String;
    fn render_login_page(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    fn page(title: &str, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            escape_html(title),
            body
        )
    }
}

impl PageRenderer for HtmlRenderer {
    fn render_error_page(&self, message: &str, cause: Option<&str>, is_fatal: bool) -> String {
        let mut body = format!("<h1>Error</h1>\n<p class=\"message\">{}</p>", escape_html(message));
        if let Some(cause) = cause {
            body.push_str(&format!("\n<pre class=\"cause\">{}</pre>", escape_html(cause)));
        }
        if is_fatal {
            body.push_str("\n<p>The panel cannot continue until this is fixed.</p>");
        } else {
            body.push_str("\n<p><a href=\"/panel\">Back to panel</a></p>");
        }
        Self::page("Error", &body)
    }

    fn render_home_page(&self, settings: &ProxySettings, is_password_set: bool) -> String {
        let rows: String = settings
            .targets
            .iter()
            .map(|target| match target {
                ProxyTarget::Domain { name, ipv4, ipv6 } => format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape_html(name),
                    escape_html(&ipv4.join(", ")),
                    escape_html(&ipv6.join(", "))
                ),
                ProxyTarget::Address { ip } if ip.is_ipv4() => {
                    format!("<tr><td>{0}</td><td>{0}</td><td></td></tr>\n", ip)
                }
                ProxyTarget::Address { ip } => {
                    format!("<tr><td>{0}</td><td></td><td>{0}</td></tr>\n", ip)
                }
            })
            .collect();

        let password_notice = if is_password_set {
            ""
        } else {
            "<p class=\"warning\">No panel password is set. Anyone can view this page.</p>\n"
        };

        let body = format!(
            "<h1>Proxy panel</h1>\n{}<p>UUID: <code>{}</code></p>\n\
             <table>\n<tr><th>Target</th><th>IPv4</th><th>IPv6</th></tr>\n{}</table>\n\
             <p class=\"meta\">Version {} &middot; updated {}</p>",
            password_notice,
            escape_html(&settings.uuid),
            rows,
            escape_html(&settings.panel.version),
            settings.panel.updated_at.to_rfc3339()
        );
        Self::page("Proxy panel", &body)
    }

    fn render_login_page(&self) -> String {
        let body = "<h1>Login</h1>\n\
             <form id=\"login\">\n<input type=\"password\" name=\"password\" autocomplete=\"current-password\">\n\
             <button type=\"submit\">Login</button>\n</form>\n\
             <script>\n\
             document.getElementById('login').addEventListener('submit', async (e) => {\n\
             e.preventDefault();\n\
             const res = await fetch('/login', { method: 'POST', body: e.target.password.value });\n\
             if (res.ok) location.href = '/panel'; else alert('Wrong password');\n\
             });\n\
             </script>";
        Self::page("Login", body)
    }
}

pub fn escape_html(s: &str) -> String {
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
