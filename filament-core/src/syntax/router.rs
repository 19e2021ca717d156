//! `<router routes=[...] global>`.
//!
//! Routes are `{path, template, default}` objects; `template` is a template
//! value or a catalog name. Paths match segment by segment, ignoring case,
//! with `:name` segments captured as params. The matched page is a child
//! component with input `{params, query}`, replaced on every navigation.
//!
//! Events emitted on the router component: `before` (path), `after`
//! (path, params) and `not-found` (path).

use std::rc::Rc;

use tracing::{debug, warn};

use super::{Construct, ConstructSignal};
use crate::component::Component;
use crate::error::{Error, Result};
use crate::surface::{clear_between, insert_all_before, NodeId};
use crate::template::Template;
use crate::value::{Object, Value};

#[derive(Default)]
pub struct Router {
    page: Option<Component>,
    current: Option<String>,
}

struct Route {
    path: String,
    name: String,
    template: Rc<Template>,
    default: bool,
}

fn routes(cx: &Component) -> Result<Vec<Route>> {
    let input = cx.input();
    let Some(list) = input.get("routes").as_array().map(<[Value]>::to_vec) else {
        return Err(Error::Contract("<router> expects an array of routes".into()));
    };
    let mut out = Vec::with_capacity(list.len());
    for route in list {
        let path = route.get("path").to_display();
        let (name, template) = match route.get("template") {
            Value::Template(template) => ("page".to_string(), template),
            Value::String(name) => (name.to_string(), cx.engine().import(&name)?),
            other => {
                return Err(Error::Contract(format!(
                    "route `{path}` needs a template, got {}",
                    other.type_name()
                )))
            }
        };
        out.push(Route {
            path,
            name,
            template,
            default: route.get("default").is_truthy(),
        });
    }
    Ok(out)
}

/// Split `a/b?x=1&y` into the path and its query object.
fn split_query(target: &str) -> (&str, Object) {
    let Some((path, query)) = target.split_once('?') else {
        return (target, Object::new());
    };
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), Value::string(value)),
            None => (pair.to_string(), Value::string("")),
        })
        .collect();
    (path, params)
}

/// Match `path` against a route pattern, capturing `:name` segments.
fn match_route(pattern: &str, path: &str) -> Option<Object> {
    let expected: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if expected.len() != actual.len() {
        return None;
    }
    let mut params = Object::new();
    for (want, got) in expected.iter().zip(&actual) {
        if let Some(name) = want.strip_prefix(':') {
            params.insert(name.to_string(), Value::string(got));
        } else if !want.eq_ignore_ascii_case(got) {
            return None;
        }
    }
    Some(params)
}

impl Router {
    /// Resolve `target` and build its page. Returns `None` when no route
    /// matches.
    fn resolve(&mut self, cx: &Component, target: &str) -> Result<Option<Component>> {
        cx.emit("before", &[Value::string(target)]);
        let (path, query) = split_query(target);
        let routes = routes(cx)?;
        let Some((route, params)) = routes
            .iter()
            .find_map(|route| match_route(&route.path, path).map(|params| (route, params)))
        else {
            warn!(component = %cx.path(), path = target, "no route matches");
            cx.emit("not-found", &[Value::string(target)]);
            return Ok(None);
        };

        let mut input = Object::new();
        input.insert("params".into(), Value::object(params.clone()));
        input.insert("query".into(), Value::object(query));
        let page = Component::create(
            cx.engine(),
            &route.name,
            route.template.clone(),
            Value::object(input),
            cx.path(),
            cx.boundaries(),
        )?;
        self.current = Some(target.to_string());
        debug!(component = %cx.path(), path = target, page = %page.path(), "navigated");
        cx.emit("after", &[Value::string(target), Value::object(params)]);
        Ok(Some(page))
    }

    fn navigate(&mut self, cx: &Component, target: &str) -> Result<()> {
        let Some(page) = self.resolve(cx, target)? else {
            return Ok(());
        };
        if let Some(previous) = self.page.take() {
            previous.destroy();
        }
        let surface = cx.engine().surface();
        if let Some(region) = cx.boundaries() {
            clear_between(surface.as_ref(), region);
            insert_all_before(surface.as_ref(), &page.nodes(), region.end);
        }
        self.page = Some(page);
        Ok(())
    }

    fn initial_path(cx: &Component) -> Result<String> {
        let input = cx.input();
        if let Some(path) = input.get("path").as_str() {
            return Ok(path.to_string());
        }
        let routes = routes(cx)?;
        let chosen = routes.iter().find(|r| r.default).or_else(|| routes.first());
        Ok(chosen.map(|r| r.path.clone()).unwrap_or_default())
    }
}

impl Construct for Router {
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>> {
        if cx.input().get("global").is_truthy() {
            cx.engine().register_router(cx);
        }
        let target = Self::initial_path(cx)?;
        let Some(page) = self.resolve(cx, &target)? else {
            return Ok(Vec::new());
        };
        let nodes = page.nodes();
        self.page = Some(page);
        Ok(nodes)
    }

    fn on_input(&mut self, cx: &Component) -> Result<()> {
        let Some(target) = cx.input().get("path").as_str().map(str::to_string) else {
            return Ok(());
        };
        if self.current.as_deref() == Some(target.as_str()) {
            return Ok(());
        }
        self.navigate(cx, &target)
    }

    fn on_signal(&mut self, cx: &Component, signal: ConstructSignal) -> Result<()> {
        match signal {
            ConstructSignal::Navigate(target) => self.navigate(cx, &target),
            ConstructSignal::Settled { .. } => Ok(()),
        }
    }

    fn on_destroy(&mut self, _cx: &Component) {
        if let Some(page) = self.page.take() {
            page.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_captured_and_case_is_ignored() {
        let params = match_route("/users/:id", "/Users/42");
        assert_eq!(params.and_then(|p| p.get("id").cloned()), Some(Value::from("42")));
        assert!(match_route("/users/:id", "/users").is_none());
        assert!(match_route("/about", "/contact").is_none());
    }

    #[test]
    fn query_strings_become_objects() {
        let (path, query) = split_query("/search?q=rust&page=2&flag");
        assert_eq!(path, "/search");
        assert_eq!(query.get("q"), Some(&Value::from("rust")));
        assert_eq!(query.get("page"), Some(&Value::from("2")));
        assert_eq!(query.get("flag"), Some(&Value::from("")));
    }
}
