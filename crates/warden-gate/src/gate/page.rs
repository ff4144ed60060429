//! HTML pages for the approval gate.

use super::{ApprovalRequest, GateOutcome, Rejection};

const STYLE: &str = r"
  :root { color-scheme: dark; }
  html, body { height:100%; }
  body {
    margin:0; min-height:100vh; display:flex; align-items:center; justify-content:center;
    background:#0b0e14; color:#e6e6e6; font-family:system-ui,-apple-system,Segoe UI,Roboto,Arial,sans-serif; padding:16px;
  }
  .card { width:min(720px, 100%); background:#121826; border:1px solid #263042; border-radius:14px; padding:24px;
          text-align:center; box-shadow:0 6px 24px rgba(0,0,0,.35); }
  h1 { font-size:22px; margin:0 0 12px; } p { margin:8px 0; }
  .btns { display:flex; gap:12px; justify-content:center; flex-wrap:wrap; margin-top:8px; }
  .btns a { display:inline-block; padding:10px 14px; border-radius:10px; text-decoration:none; }
  .approve { background:#1a7f37; color:#fff; } .cancel { background:#2d3748; color:#fff; }
  small { color:#9aa4b2; display:block; margin-top:10px; }
";

/// A rendered page: document title and card body (already escaped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: &'static str,
    pub body: String,
}

impl Page {
    fn heading(title: &'static str, heading: &str) -> Self {
        Self {
            title,
            body: format!("<h1>{heading}</h1>"),
        }
    }

    /// Full HTML document.
    pub fn into_html(self) -> String {
        format!(
            "<!doctype html>\n<html>\n<head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n\
             <title>{}</title>\n<style>{STYLE}</style>\n</head>\n\
             <body><div class=\"card\">{}</div></body></html>",
            escape_html(self.title),
            self.body
        )
    }
}

/// Escape text for HTML element content and quoted attributes.
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

/// Render the page for a gate outcome.
pub fn render(outcome: &GateOutcome, request: &ApprovalRequest) -> Page {
    let instance = escape_html(&request.instance_id);
    let finding = escape_html(request.display_finding());

    match outcome {
        GateOutcome::ConfirmationRequired => {
            // Relative link: the browser resolves it against the current URL.
            let href = escape_html(&format!("?{}", request.confirmation_query()));
            Page {
                title: "Confirm restore",
                body: format!(
                    "<h1>Approve restore?</h1>\
                     <p>Instance: <b>{instance}</b></p>\
                     <p>Finding: <b>{finding}</b></p>\
                     <div class=\"btns\">\
                     <a class=\"approve\" href=\"{href}\">Approve restore</a>\
                     <a class=\"cancel\" href=\"javascript:history.back()\">Cancel</a>\
                     </div>"
                ),
            }
        }
        GateOutcome::MissingParameters => {
            Page::heading("Missing parameters", "Missing instanceId or findingId")
        }
        GateOutcome::Authorized => Page {
            title: "Restore requested",
            body: format!(
                "<h1>Restore requested</h1>\
                 <p>Instance <b>{instance}</b> (finding <b>{finding}</b>) is being restored.</p>\
                 <p>You will receive a notification shortly.</p>"
            ),
        },
        GateOutcome::Rejected(rejection) => rejection_page(*rejection),
        GateOutcome::ServiceError => Page {
            title: "Service unavailable",
            body: "<h1>Approval service unavailable</h1>\
                   <p>The link was not used. Try again later.</p>"
                .to_string(),
        },
        GateOutcome::DispatchFailed(reason) => Page {
            title: "Error",
            body: format!(
                "<h1>Failed to start restore</h1><p>{}</p>\
                 <small>This link has been used; request a new one.</small>",
                escape_html(reason)
            ),
        },
    }
}

fn rejection_page(rejection: Rejection) -> Page {
    match rejection {
        Rejection::Config => Page::heading("Configuration error", "Approval gate is not configured"),
        Rejection::Malformed => Page::heading("Invalid link", "Missing token or signature"),
        Rejection::NotFound => Page::heading("Invalid link", "Token not found"),
        Rejection::Replayed => Page::heading("Already used", "This link was already used."),
        Rejection::Expired => Page::heading("Expired", "This link has expired."),
        Rejection::Mismatch => Page::heading("Mismatch", "Token does not match this request."),
        Rejection::BadSignature => Page::heading("Invalid signature", "Signature check failed."),
    }
}
