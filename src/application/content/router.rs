//! Private URL space of a content handler.
//!
//! Routes are anchored regular expressions tried in registration order; the
//! first match wins and its capture groups become positional view arguments.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("route pattern `{pattern}` must be anchored with `^` and `$`")]
    Unanchored { pattern: String },
    #[error("route pattern `{pattern}` is invalid: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("route name `{0}` registered twice")]
    DuplicateName(&'static str),
}

/// Matched route: its position, name and captured arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub index: usize,
    pub name: &'static str,
    pub args: Vec<String>,
}

impl RouteMatch {
    pub fn arg(&self, position: usize) -> Option<&str> {
        self.args.get(position).map(String::as_str)
    }
}

struct Route<V> {
    name: &'static str,
    pattern: Regex,
    view: V,
}

pub struct ContentRouter<V> {
    routes: Vec<Route<V>>,
}

impl<V> Default for ContentRouter<V> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<V> ContentRouter<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        name: &'static str,
        pattern: &str,
        view: V,
    ) -> Result<Self, RouterError> {
        if !pattern.starts_with('^') || !pattern.ends_with('$') {
            return Err(RouterError::Unanchored {
                pattern: pattern.to_string(),
            });
        }
        if self.routes.iter().any(|route| route.name == name) {
            return Err(RouterError::DuplicateName(name));
        }
        let compiled = Regex::new(pattern).map_err(|source| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.routes.push(Route {
            name,
            pattern: compiled,
            view,
        });
        Ok(self)
    }

    pub fn resolve(&self, sub_path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .enumerate()
            .find_map(|(index, route)| {
                let captures = route.pattern.captures(sub_path)?;
                let args = captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                Some(RouteMatch {
                    index,
                    name: route.name,
                    args,
                })
            })
    }

    pub fn view(&self, route: &RouteMatch) -> Option<&V> {
        self.routes
            .get(route.index)
            .filter(|candidate| candidate.name == route.name)
            .map(|candidate| &candidate.view)
    }

    /// Build the sub-path for a named route from positional arguments.
    ///
    /// Returns `None` for unknown names, a wrong argument count, or arguments
    /// the route itself would not match.
    pub fn reverse(&self, name: &str, args: &[&str]) -> Option<String> {
        let route = self.routes.iter().find(|route| route.name == name)?;
        let source = route.pattern.as_str();
        let body = source.strip_prefix('^')?.strip_suffix('$')?;

        let mut output = String::new();
        let mut remaining = args.iter();
        let mut chars = body.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => output.push(chars.next()?),
                '(' => {
                    skip_group(&mut chars)?;
                    output.push_str(remaining.next()?);
                }
                _ => output.push(ch),
            }
        }

        if remaining.next().is_some() || !route.pattern.is_match(&output) {
            return None;
        }
        Some(output)
    }
}

/// Consume a group body up to its matching `)`.
fn skip_group(chars: &mut std::str::Chars<'_>) -> Option<()> {
    let mut depth = 1;
    let mut in_class = false;
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next()?;
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => {
                depth -= 1;
                if depth == 0 {
                    return Some(());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum View {
        Index,
        Year,
        Month,
        Detail,
    }

    fn archive() -> ContentRouter<View> {
        ContentRouter::new()
            .route("index", r"^$", View::Index)
            .and_then(|router| router.route("year", r"^(\d+)/$", View::Year))
            .and_then(|router| router.route("month", r"^(\d+)/(\d+)/$", View::Month))
            .and_then(|router| {
                router.route("detail", r"^(\d+)/(\d+)/([a-zA-Z0-9_\-]+)/$", View::Detail)
            })
            .expect("valid routes")
    }

    #[test]
    fn resolves_in_registration_order() {
        let router = archive();

        let matched = router.resolve("").expect("index");
        assert_eq!(router.view(&matched), Some(&View::Index));

        let matched = router.resolve("2024/3/spring-fair/").expect("detail");
        assert_eq!(matched.name, "detail");
        assert_eq!(matched.args, vec!["2024", "3", "spring-fair"]);
        assert_eq!(router.view(&matched), Some(&View::Detail));

        assert!(router.resolve("2024").is_none());
        assert!(router.resolve("2024/3/bad slug/").is_none());
    }

    #[test]
    fn first_match_wins() {
        let router = ContentRouter::new()
            .route("numeric", r"^(\d+)/$", 1)
            .and_then(|router| router.route("anything", r"^(.+)/$", 2))
            .expect("valid routes");

        let matched = router.resolve("42/").expect("match");
        assert_eq!(router.view(&matched), Some(&1));
        let matched = router.resolve("news/").expect("match");
        assert_eq!(router.view(&matched), Some(&2));
    }

    #[test]
    fn reverse_substitutes_groups() {
        let router = archive();
        assert_eq!(router.reverse("index", &[]).as_deref(), Some(""));
        assert_eq!(router.reverse("year", &["2024"]).as_deref(), Some("2024/"));
        assert_eq!(
            router.reverse("detail", &["2024", "3", "spring-fair"]).as_deref(),
            Some("2024/3/spring-fair/")
        );
        assert_eq!(router.reverse("year", &["twenty"]), None);
        assert_eq!(router.reverse("month", &["2024"]), None);
        assert_eq!(router.reverse("year", &["2024", "1"]), None);
        assert_eq!(router.reverse("missing", &[]), None);
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(matches!(
            ContentRouter::new().route("loose", r"(\d+)/", ()),
            Err(RouterError::Unanchored { .. })
        ));
        assert!(matches!(
            ContentRouter::new().route("broken", r"^(\d+$", ()),
            Err(RouterError::InvalidPattern { .. })
        ));
        assert!(matches!(
            ContentRouter::new()
                .route("index", r"^$", ())
                .and_then(|router| router.route("index", r"^x/$", ())),
            Err(RouterError::DuplicateName("index"))
        ));
    }
}
