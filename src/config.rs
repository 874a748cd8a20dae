//! Runtime configuration for the service.
//!
//! Settings come from `GEMINUS_`-prefixed environment variables; the serve
//! binary layers command-line arguments (via `arrrg`) on top.  Nothing here
//! talks to the backend: a missing API key surfaces when the Gemini client
//! is constructed, so the process fails at startup rather than on the
//! first request.

use std::env;

use arrrg_derive::CommandLine;

/// Default listen address for the serve binary.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

/// Environment-sourced service settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Backend API key, from GEMINUS_API_KEY.
    pub api_key: Option<String>,

    /// Model identifier, from GEMINUS_MODEL.  `None` lets the client pick
    /// its default.
    pub model: Option<String>,

    /// Allowed CORS origins, from GEMINUS_CORS_ALLOW_ORIGINS.  CSV or a
    /// JSON array; `*` or empty means any origin.
    pub cors_allow_origins: String,
}

impl Settings {
    /// Read settings from the environment.  Unset variables take their
    /// defaults; nothing errors here.
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("GEMINUS_API_KEY").ok().filter(|v| !v.is_empty()),
            model: env::var("GEMINUS_MODEL").ok().filter(|v| !v.is_empty()),
            cors_allow_origins: env::var("GEMINUS_CORS_ALLOW_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        }
    }

    /// The parsed CORS origin policy.
    pub fn cors_origins(&self) -> CorsOrigins {
        parse_origins(&self.cors_allow_origins)
    }
}

/// The set of origins cross-origin requests are accepted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// Any origin.
    Any,
    /// An explicit allow list.  An empty list allows no cross-origin
    /// callers at all.
    List(Vec<String>),
}

/// Parse an origin list value.  A JSON array is tried first, then a
/// comma-separated list; a `*` anywhere means any origin.
fn parse_origins(value: &str) -> CorsOrigins {
    let value = value.trim();
    if value.is_empty() || value == "*" {
        return CorsOrigins::Any;
    }

    if let Ok(serde_json::Value::Array(values)) = serde_json::from_str(value) {
        let origins = values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        return wrap_origins(origins);
    }

    let origins = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect();
    wrap_origins(origins)
}

fn wrap_origins(origins: Vec<String>) -> CorsOrigins {
    if origins.iter().any(|origin| origin == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}

/// Command-line arguments for the geminus-serve binary.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arrrg(optional, "Address to listen on (default: 127.0.0.1:8000)", "ADDR")]
    pub listen: Option<String>,
}

impl ServeArgs {
    /// The address to bind, falling back to [`DEFAULT_LISTEN_ADDR`].
    pub fn listen_addr(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_and_empty_allow_any() {
        assert_eq!(parse_origins("*"), CorsOrigins::Any);
        assert_eq!(parse_origins(""), CorsOrigins::Any);
        assert_eq!(parse_origins("   "), CorsOrigins::Any);
    }

    #[test]
    fn csv_origins() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example"),
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ])
        );
    }

    #[test]
    fn csv_drops_empty_parts() {
        assert_eq!(
            parse_origins("https://a.example,, https://b.example,"),
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ])
        );
    }

    #[test]
    fn json_array_origins() {
        assert_eq!(
            parse_origins(r#"["https://a.example", "https://b.example"]"#),
            CorsOrigins::List(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ])
        );
    }

    #[test]
    fn wildcard_inside_a_list_means_any() {
        assert_eq!(parse_origins(r#"["*"]"#), CorsOrigins::Any);
        assert_eq!(parse_origins("*, https://a.example"), CorsOrigins::Any);
    }

    #[test]
    fn malformed_json_falls_back_to_csv() {
        assert_eq!(
            parse_origins("[not json"),
            CorsOrigins::List(vec!["[not json".to_string()])
        );
    }

    #[test]
    fn comma_only_value_allows_nothing() {
        assert_eq!(parse_origins(","), CorsOrigins::List(Vec::new()));
    }

    #[test]
    fn listen_addr_default() {
        let args = ServeArgs::default();
        assert_eq!(args.listen_addr(), DEFAULT_LISTEN_ADDR);

        let args = ServeArgs {
            listen: Some("0.0.0.0:9000".to_string()),
        };
        assert_eq!(args.listen_addr(), "0.0.0.0:9000");
    }
}
