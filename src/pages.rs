// src/pages.rs
//
// Server-rendered public pages. Everything interpolated goes through
// `escape_html`.

use crate::{config::Rules, merchant::Merchant, services::format_cents};

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Only http and https links are rendered as anchors.
fn is_web_url(url: &str) -> bool {
    let url = url.trim().to_ascii_lowercase();
    url.starts_with("https://") || url.starts_with("http://")
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:40rem;margin:2rem auto;padding:0 1rem;color:#222}\
h1{margin-bottom:.25rem}.muted{color:#666}ol li{margin:.4rem 0}\
form{margin-top:1.5rem;padding:1rem;border:1px solid #ddd;border-radius:6px}\
input{padding:.4rem;width:16rem}button{padding:.45rem 1rem}";

/// Landing page a customer reaches from the link in their certificate email.
pub fn merchant_page(merchant: &Merchant, rules: &Rules, app_base_url: &str) -> String {
    let name = escape_html(&merchant.business_name);

    let mut details = String::new();
    if let Some(description) = &merchant.description {
        details.push_str(&format!("<p>{}</p>\n", escape_html(description)));
    }
    let location: Vec<&str> = [&merchant.address, &merchant.city, &merchant.state]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .collect();
    if !location.is_empty() {
        details.push_str(&format!(
            "<p class=\"muted\">{}</p>\n",
            escape_html(&location.join(", "))
        ));
    }
    if let Some(website) = merchant.website.as_deref() {
        let shown = escape_html(website);
        if is_web_url(website) {
            details.push_str(&format!("<p><a href=\"{0}\" rel=\"nofollow noopener\">{0}</a></p>\n", shown));
        } else {
            details.push_str(&format!("<p>{}</p>\n", shown));
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{name} | Grocery Rebate Certificates</title>
<style>{style}</style>
</head>
<body>
<h1>{name}</h1>
<p class="muted">Grocery Rebate Certificate partner</p>
{details}<h2>How your certificate works</h2>
<ol>
<li>Sign in with your email and claim the code from your certificate.</li>
<li>Register the certificate with the grocery store you shop at.</li>
<li>Each month, upload receipts totalling {threshold} and answer a short survey.</li>
<li>Every month you qualify earns a {reward} grocery gift card until the certificate is used up.</li>
</ol>
<form method="get" action="{base}/claim">
<label for="code">Certificate code</label><br>
<input id="code" name="code" placeholder="GRC-XXXX-XXXX-XXXX" autocomplete="off" required>
<input type="hidden" name="merchant" value="{slug}">
<button type="submit">Claim</button>
</form>
<p class="muted">Questions? Contact <a href="mailto:{email}">{email}</a>.</p>
</body>
</html>
"#,
        name = name,
        style = STYLE,
        details = details,
        threshold = format_cents(rules.monthly_threshold_cents),
        reward = format_cents(rules.monthly_reward_cents),
        base = escape_html(app_base_url.trim_end_matches('/')),
        slug = escape_html(&merchant.slug),
        email = escape_html(&merchant.contact_email),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn merchant() -> Merchant {
        Merchant {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            business_name: "Tom & Jerry's <Deli>".to_string(),
            slug: "tom-jerry-s-deli".to_string(),
            contact_email: "tom@example.com".to_string(),
            phone: None,
            address: Some("5 Elm St".to_string()),
            city: Some("Dayton".to_string()),
            state: None,
            website: None,
            description: Some("Sandwiches \"since 1990\"".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_page_escapes_merchant_fields() {
        let html = merchant_page(&merchant(), &Rules::default(), "https://grc.test/");

        assert!(html.contains("<h1>Tom &amp; Jerry&#39;s &lt;Deli&gt;</h1>"));
        assert!(html.contains("Sandwiches &quot;since 1990&quot;"));
        assert!(html.contains("5 Elm St, Dayton"));
        assert!(html.contains("action=\"https://grc.test/claim\""));
        assert!(html.contains("$100.00"));
        assert!(html.contains("$25.00"));
        assert!(!html.contains("<Deli>"));
    }

    #[test]
    fn test_website_link_requires_web_scheme() {
        let mut m = merchant();
        m.website = Some("javascript:alert(1)".to_string());
        let html = merchant_page(&m, &Rules::default(), "https://grc.test/");
        assert!(!html.contains("href=\"javascript"));
        assert!(html.contains("<p>javascript:alert(1)</p>"));

        m.website = Some(" JavaScript:alert(1)".to_string());
        let html = merchant_page(&m, &Rules::default(), "https://grc.test/");
        assert!(!html.to_ascii_lowercase().contains("href=\" javascript"));

        m.website = Some("https://tomsdeli.example".to_string());
        let html = merchant_page(&m, &Rules::default(), "https://grc.test/");
        assert!(html.contains("<a href=\"https://tomsdeli.example\""));
    }
}
