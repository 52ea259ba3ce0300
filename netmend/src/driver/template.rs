//! Command templates with named placeholders.
//!
//! Templates are plain CLI lines with `{name}` placeholders, e.g.
//! `ip address {ip} {netmask}`. Braces are escaped by doubling them.

use std::collections::HashMap;

use crate::error::{DriverError, Result};

/// Render one template.
pub fn render_command(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let malformed = |message: &str| DriverError::MalformedTemplate {
        template: template.to_string(),
        message: message.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(malformed("nested '{'").into()),
                        Some(ch) => name.push(ch),
                        None => return Err(malformed("unclosed '{'").into()),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(malformed("empty placeholder").into());
                }
                let value = vars.get(name).ok_or_else(|| DriverError::UnknownPlaceholder {
                    template: template.to_string(),
                    name: name.to_string(),
                })?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(malformed("unmatched '}'").into()),
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Render a list of templates in order.
pub fn render_commands<S: AsRef<str>>(
    templates: &[S],
    vars: &HashMap<String, String>,
) -> Result<Vec<String>> {
    templates
        .iter()
        .map(|t| render_command(t.as_ref(), vars))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn vars() -> HashMap<String, String> {
        [
            ("interface", "Ethernet0/1"),
            ("ip", "10.0.12.1"),
            ("netmask", "255.255.255.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_render_commands() {
        let rendered = render_commands(
            &["interface {interface}", " ip address {ip} {netmask}", " no shutdown"],
            &vars(),
        )
        .unwrap();
        assert_eq!(
            rendered,
            vec![
                "interface Ethernet0/1",
                " ip address 10.0.12.1 255.255.255.0",
                " no shutdown"
            ]
        );
    }

    #[test]
    fn test_escaped_braces() {
        assert_eq!(
            render_command("banner motd {{ {ip} }}", &vars()).unwrap(),
            "banner motd { 10.0.12.1 }"
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = render_command("hostname {hostname}", &vars()).unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(DriverError::UnknownPlaceholder { ref name, .. }) if name == "hostname"
        ));
    }

    #[test]
    fn test_malformed_templates() {
        for bad in ["ip {ip", "ip }", "ip {}", "ip {a{b}}"] {
            let err = render_command(bad, &vars()).unwrap_err();
            assert!(
                matches!(err, Error::Driver(DriverError::MalformedTemplate { .. })),
                "{bad}: {err}"
            );
        }
    }
}
