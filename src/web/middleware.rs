//! HTTP-layer cross-cutting concerns (spec §6): cookie attribute rules and the legacy
//! browser `SameSite` exception.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// The original system's detection rule for browsers that reject `SameSite=None`
/// outright rather than ignoring it (SPEC_FULL §2, "Legacy browser SameSite omission").
static OLD_SAFARI: Lazy<Regex> = Lazy::new(|| Regex::new(r"iPhone.*Version/12.*Safari").unwrap());

pub fn is_known_buggy_safari(user_agent: &str) -> bool {
    OLD_SAFARI.is_match(user_agent)
}

/// Builds a `Set-Cookie` header value: `Secure; HttpOnly; SameSite=None` for every
/// cookie (spec §6), except `SameSite` is omitted for [`is_known_buggy_safari`] agents.
pub fn set_cookie_header(name: &str, value: &str, max_age_seconds: i64, user_agent: Option<&str>) -> String {
    let buggy = user_agent.map(is_known_buggy_safari).unwrap_or(false);
    let mut out = format!("{name}={value}; Path=/; Max-Age={max_age_seconds}; Secure; HttpOnly");
    if !buggy {
        out.push_str("; SameSite=None");
    }
    out
}

/// A `Set-Cookie` that immediately expires `name` (used to clear SLO/testidp cookies).
pub fn clear_cookie_header(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; Secure; HttpOnly")
}

/// Parses the `Cookie` request header into `name -> value` pairs.
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|kv| {
            let (k, v) = kv.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// Renders the auto-submitting HTML form the HTTP-POST binding uses to deliver a
/// `SAMLRequest`/`SAMLResponse` to its destination (spec §6 "HTML POST form").
pub fn html_post_form(destination: &str, param_name: &str, message_b64: &str, relay_state: Option<&str>) -> String {
    let relay_field = relay_state
        .map(|rs| format!(r#"<input type="hidden" name="RelayState" value="{}"/>"#, html_escape(rs)))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html><html><body onload="document.forms[0].submit()">
<form method="post" action="{dest}">
<input type="hidden" name="{param}" value="{msg}"/>
{relay}
<noscript><input type="submit" value="Continue"/></noscript>
</form>
</body></html>"#,
        dest = html_escape(destination),
        param = param_name,
        msg = message_b64,
        relay = relay_field,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_safari_is_detected() {
        assert!(is_known_buggy_safari(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 12_0 like Mac OS X) Version/12.0 Safari/604.1"
        ));
        assert!(!is_known_buggy_safari("Mozilla/5.0 (X11; Linux x86_64) Chrome/120"));
    }

    #[test]
    fn samesite_is_omitted_for_buggy_safari() {
        let header = set_cookie_header("SLO", "abc", 300, Some("iPhone.*Version/12.*Safari"));
        assert!(!header.contains("SameSite"));
    }

    #[test]
    fn samesite_none_is_set_by_default() {
        let header = set_cookie_header("SLO", "abc", 300, None);
        assert!(header.contains("SameSite=None"));
        assert!(header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
    }

    #[test]
    fn cookie_header_parses_multiple_pairs() {
        let parsed = parse_cookies("SSO2-abc=xyz; SLO=frame123");
        assert_eq!(parsed.get("SSO2-abc").map(String::as_str), Some("xyz"));
        assert_eq!(parsed.get("SLO").map(String::as_str), Some("frame123"));
    }
}
