//! Template personalization: placeholder substitution and body processing
//! for outbound messages.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Recipient, Template};

/// Matches any supported `{{placeholder}}` token, case-insensitively.
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\{\{(email|name|country|phone|linkedin|github)\}\}")
            .expect("placeholder pattern is valid")
    })
}

fn html_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// A rendered subject/body pair for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Substitutes `{{placeholder}}` tokens with the recipient's field values.
///
/// Unset optional fields substitute to the empty string, so a template
/// renders for every recipient regardless of how complete its profile is.
/// Token matching is case-insensitive; unrecognized tokens pass through
/// unchanged.
pub fn replace_placeholders(text: &str, recipient: &Recipient) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let field = caps[1].to_ascii_lowercase();
            let value = match field.as_str() {
                "email" => Some(recipient.email.as_str()),
                "name" => recipient.name.as_deref(),
                "country" => recipient.country.as_deref(),
                "phone" => recipient.phone.as_deref(),
                "linkedin" => recipient.linkedin.as_deref(),
                "github" => recipient.github.as_deref(),
                _ => None,
            };
            value.unwrap_or("").to_string()
        })
        .into_owned()
}

/// Converts plain-text line breaks into HTML breaks for the HTML part.
pub fn process_body(body: &str) -> String {
    body.replace('\n', "<br>").replace('\r', "")
}

/// Strips HTML tags to produce the plain-text alternative part.
pub fn strip_html(html: &str) -> String {
    html_tag_regex().replace_all(html, "").into_owned()
}

/// Renders the template for one recipient: personalized subject, and a
/// personalized body with line breaks converted for HTML delivery.
pub fn render(template: &Template, recipient: &Recipient) -> RenderedEmail {
    RenderedEmail {
        subject: replace_placeholders(&template.subject, recipient),
        body: process_body(&replace_placeholders(&template.body, recipient)),
    }
}
