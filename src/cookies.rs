use percent_encoding::percent_decode_str;

/// Finds `name` in a `Cookie:` style header (`a=1; b=2`) and returns its
/// percent-decoded value.
///
/// Empty values are treated as absent.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_named_cookie_among_others() {
        let header = "JSESSIONID=abc123; XSRF-TOKEN=4f2e-99; theme=dark";
        assert_eq!(cookie_value(header, "XSRF-TOKEN").as_deref(), Some("4f2e-99"));
        assert_eq!(cookie_value(header, "theme").as_deref(), Some("dark"));
    }

    #[test]
    fn decodes_percent_escapes() {
        let header = "XSRF-TOKEN=a%2Fb%3D%3D";
        assert_eq!(cookie_value(header, "XSRF-TOKEN").as_deref(), Some("a/b=="));
    }

    #[test]
    fn does_not_match_on_suffix() {
        assert_eq!(cookie_value("MY-XSRF-TOKEN=nope", "XSRF-TOKEN"), None);
        assert_eq!(cookie_value("XSRF-TOKEN=", "XSRF-TOKEN"), None);
        assert_eq!(cookie_value("", "XSRF-TOKEN"), None);
    }
}
