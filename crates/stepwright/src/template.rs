//! `${...}` placeholders in step payloads.
//!
//! - `${name}` - a bound text fixture
//! - `${name.field}` - a field of a bound record fixture
//! - `${env:VAR}` - an environment value (credentials)
//!
//! Rendered payloads are secrets as far as the rest of the crate is
//! concerned: they are handed to the session and nowhere else.

use crate::fixture::FixtureValue;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[allow(clippy::unwrap_used)]
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").unwrap())
}

/// A placeholder that could not be rendered
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// `${name}` with no fixture bound under that name
    #[error("unbound fixture placeholder ${{{0}}}")]
    UnboundFixture(String),
    /// `${name.field}` where the record has no such field
    #[error("fixture placeholder ${{{0}}} has no such field")]
    MissingField(String),
    /// `${name}` used on a record fixture
    #[error("fixture placeholder ${{{0}}} is a record; name a field")]
    RecordWithoutField(String),
    /// `${env:VAR}` with VAR unset
    #[error("environment placeholder ${{env:{0}}} is not set")]
    MissingEnv(String),
    /// `${}` or similar
    #[error("empty placeholder")]
    Empty,
}

/// Parsed placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder<'a> {
    /// Environment variable
    Env(&'a str),
    /// Fixture, optionally a record field
    Fixture {
        /// Bound fixture name
        name: &'a str,
        /// Record field
        field: Option<&'a str>,
    },
}

impl<'a> Placeholder<'a> {
    fn parse(inner: &'a str) -> Result<Self, TemplateError> {
        let inner = inner.trim();
        if let Some(var) = inner.strip_prefix("env:") {
            let var = var.trim();
            return if var.is_empty() {
                Err(TemplateError::Empty)
            } else {
                Ok(Self::Env(var))
            };
        }
        if inner.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(match inner.split_once('.') {
            Some((name, field)) => Self::Fixture {
                name,
                field: Some(field),
            },
            None => Self::Fixture {
                name: inner,
                field: None,
            },
        })
    }
}

/// Every placeholder in `template`, in order
///
/// # Errors
///
/// `Empty` for `${}`
pub fn placeholders(template: &str) -> Result<Vec<Placeholder<'_>>, TemplateError> {
    placeholder_re()
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| Placeholder::parse(m.as_str()))
        .collect()
}

/// Whether `template` contains any placeholder
#[must_use]
pub fn has_placeholders(template: &str) -> bool {
    placeholder_re().is_match(template)
}

/// Substitute every placeholder in `template`.
///
/// `env` is consulted for `${env:VAR}`; pass `|k| std::env::var(k).ok()` for
/// the process environment.
///
/// # Errors
///
/// The first placeholder that cannot be resolved
pub fn render<F>(
    template: &str,
    fixtures: &BTreeMap<String, FixtureValue>,
    env: F,
) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in placeholder_re().captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let value = match Placeholder::parse(inner.as_str())? {
            Placeholder::Env(var) => {
                env(var).ok_or_else(|| TemplateError::MissingEnv(var.to_string()))?
            }
            Placeholder::Fixture { name, field } => {
                let value = fixtures
                    .get(name)
                    .ok_or_else(|| TemplateError::UnboundFixture(name.to_string()))?;
                match (value, field) {
                    (FixtureValue::Text(text), None) => text.clone(),
                    (FixtureValue::Record(_), None) => {
                        return Err(TemplateError::RecordWithoutField(name.to_string()))
                    }
                    (value, Some(field)) => value
                        .field(field)
                        .map(str::to_string)
                        .ok_or_else(|| TemplateError::MissingField(format!("{name}.{field}")))?,
                }
            }
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fixtures() -> BTreeMap<String, FixtureValue> {
        let mut map = BTreeMap::new();
        map.insert(
            "cpf".to_string(),
            FixtureValue::Text("529.982.247-25".to_string()),
        );
        let mut patient = BTreeMap::new();
        patient.insert("full_name".to_string(), "Ana Lima".to_string());
        map.insert("patient".to_string(), FixtureValue::Record(patient));
        map
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render("T.A", &fixtures(), no_env).unwrap(), "T.A");
        assert!(!has_placeholders("T.A"));
    }

    #[test]
    fn test_fixture_and_field() {
        assert_eq!(
            render("${cpf} / ${patient.full_name}", &fixtures(), no_env).unwrap(),
            "529.982.247-25 / Ana Lima"
        );
    }

    #[test]
    fn test_env_lookup() {
        let env = |k: &str| (k == "APP_USER").then(|| "qa@example.com".to_string());
        assert_eq!(
            render("${env:APP_USER}", &fixtures(), env).unwrap(),
            "qa@example.com"
        );
    }

    #[test]
    fn test_errors_name_the_placeholder() {
        let err = render("${nope}", &fixtures(), no_env).unwrap_err();
        assert_eq!(err, TemplateError::UnboundFixture("nope".to_string()));
        assert!(err.to_string().contains("${nope}"));

        let err = render("${env:APP_PASSWORD}", &fixtures(), no_env).unwrap_err();
        assert!(err.to_string().contains("${env:APP_PASSWORD}"));

        assert_eq!(
            render("${patient}", &fixtures(), no_env).unwrap_err(),
            TemplateError::RecordWithoutField("patient".to_string())
        );
        assert_eq!(
            render("${patient.age}", &fixtures(), no_env).unwrap_err(),
            TemplateError::MissingField("patient.age".to_string())
        );
        assert_eq!(render("${}", &fixtures(), no_env).unwrap_err(), TemplateError::Empty);
    }

    #[test]
    fn test_placeholders_lists_all() {
        let found = placeholders("${env:APP_USER}:${patient.cpf}").unwrap();
        assert_eq!(
            found,
            vec![
                Placeholder::Env("APP_USER"),
                Placeholder::Fixture {
                    name: "patient",
                    field: Some("cpf")
                }
            ]
        );
    }
}
