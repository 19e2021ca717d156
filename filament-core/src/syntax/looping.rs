//! `<for in=... args=[...]>` and `<for from=... to=...>`.
//!
//! Every item is a partial of the body renderer with suffix `[i]`, wrapped
//! in its own markers. Input changes are diffed per index: unchanged items
//! are left alone, changed ones are updated in place, surplus items are
//! cleaned up from the end and new ones are appended before the closing
//! marker. Items are never rebuilt wholesale.

use tracing::{debug, warn};

use super::{positional_args, renderer_of, Construct};
use crate::component::Component;
use crate::error::{Error, Result};
use crate::graph::path::item_suffix;
use crate::mesh::MeshRenderer;
use crate::surface::{Boundaries, NodeId};
use crate::value::{Object, Value};

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Collection(Value),
    Range(f64, f64),
}

impl Source {
    fn same(&self, other: &Source) -> bool {
        match (self, other) {
            (Source::Collection(a), Source::Collection(b)) => a.same_ref(b),
            (a, b) => a == b,
        }
    }
}

struct Item {
    args: Object,
    boundaries: Boundaries,
}

#[derive(Default)]
pub struct Loop {
    renderer: Option<MeshRenderer>,
    source: Option<Source>,
    items: Vec<Item>,
    processing: bool,
}

/// Positional values per item: `[each, index]` for arrays,
/// `[key, value, index]` for maps and objects, `[i]` for ranges.
fn read(input: &Value) -> Result<(Source, Vec<Vec<Value>>)> {
    if !input.get("from").is_undefined() {
        return range(input);
    }
    let source = input.get("in");
    let items = match &source {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| vec![item.clone(), Value::from(i)])
            .collect(),
        Value::Map(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, (key, value))| vec![key.clone(), value.clone(), Value::from(i)])
            .collect(),
        Value::Object(map) => map
            .iter()
            .enumerate()
            .map(|(i, (key, value))| vec![Value::string(key), value.clone(), Value::from(i)])
            .collect(),
        Value::Undefined => return Err(Error::Contract("<for> needs `in`, or a `from`/`to` range".into())),
        other => {
            return Err(Error::Contract(format!(
                "<for> expects an array, map or object in `in`, got {}",
                other.type_name()
            )))
        }
    };
    Ok((Source::Collection(source), items))
}

/// `from` to `to` inclusive, stepping by one from `from` in either
/// direction. Bounds may be fractional: `0.5..=2` yields `0.5, 1.5`.
fn range(input: &Value) -> Result<(Source, Vec<Vec<Value>>)> {
    let to = input.get("to");
    if to.is_undefined() {
        return Err(Error::Contract("<for> range needs both `from` and `to`".into()));
    }
    let from = input.get("from").to_number();
    let to = to.to_number();
    if !from.is_finite() || !to.is_finite() {
        return Err(Error::Contract("<for> range bounds must be finite numbers".into()));
    }
    let mut values = Vec::new();
    let mut current = from;
    if from < to {
        while current <= to {
            values.push(vec![Value::Number(current)]);
            current += 1.0;
        }
    } else {
        while current >= to {
            values.push(vec![Value::Number(current)]);
            current -= 1.0;
        }
    }
    Ok((Source::Range(from, to), values))
}

fn changed_keys(old: &Object, new: &Object) -> Vec<String> {
    new.iter()
        .filter(|(name, value)| old.get(*name).map_or(true, |prev| prev.is_diff(value)))
        .map(|(name, _)| name.clone())
        .collect()
}

impl Loop {
    fn render_item(&mut self, renderer: &MeshRenderer, index: usize, values: &[Value]) -> Result<Vec<NodeId>> {
        let args = positional_args(renderer, values);
        let suffix = item_suffix(index);
        let nodes = renderer.mesh(&args, None, Some(&suffix))?;
        let (boundaries, out) = renderer.demarcate(nodes, Some(&suffix))?;
        self.items.push(Item { args, boundaries });
        Ok(out)
    }

    fn clear(&mut self, renderer: &MeshRenderer) {
        while let Some(item) = self.items.pop() {
            let suffix = item_suffix(self.items.len());
            renderer.cleanup(Some(item.boundaries), Some(&suffix));
        }
    }

    fn apply(&mut self, cx: &Component) -> Result<()> {
        let input = cx.input();
        let renderer = renderer_of(&input.get("renderer"))
            .ok_or_else(|| Error::Contract("<for> has no body to render".into()))?;
        let (source, values) = read(&input)?;

        let same_renderer = self.renderer.as_ref().is_some_and(|r| r.ptr_eq(&renderer));
        if same_renderer && self.source.as_ref().is_some_and(|s| s.same(&source)) {
            return Ok(());
        }
        if !same_renderer {
            if let Some(previous) = self.renderer.take() {
                self.clear(&previous);
            }
            self.renderer = Some(renderer.clone());
        }
        self.source = Some(source);

        let overlap = self.items.len().min(values.len());
        for (index, values) in values.iter().enumerate().take(overlap) {
            let args = positional_args(&renderer, values);
            let changed = changed_keys(&self.items[index].args, &args);
            if changed.is_empty() {
                continue;
            }
            renderer.update(&changed, &args, None, Some(&item_suffix(index)))?;
            self.items[index].args = args;
        }

        while self.items.len() > values.len() {
            if let Some(item) = self.items.pop() {
                let suffix = item_suffix(self.items.len());
                renderer.cleanup(Some(item.boundaries), Some(&suffix));
            }
        }

        for (index, values) in values.iter().enumerate().skip(self.items.len()) {
            let out = self.render_item(&renderer, index, values)?;
            renderer.fill(&out, None);
        }
        debug!(component = %cx.path(), items = self.items.len(), "loop updated");
        Ok(())
    }
}

impl Construct for Loop {
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>> {
        let input = cx.input();
        let renderer = renderer_of(&input.get("renderer"))
            .ok_or_else(|| Error::Contract("<for> has no body to render".into()))?;
        let (source, values) = read(&input)?;
        if values.is_empty() {
            warn!(component = %cx.path(), "<for> rendered an empty collection");
        }

        let mut out = Vec::new();
        for (index, values) in values.iter().enumerate() {
            out.extend(self.render_item(&renderer, index, values)?);
        }
        self.renderer = Some(renderer);
        self.source = Some(source);
        Ok(out)
    }

    fn on_input(&mut self, cx: &Component) -> Result<()> {
        if self.processing {
            return Ok(());
        }
        self.processing = true;
        let result = self.apply(cx);
        self.processing = false;
        result
    }

    fn on_destroy(&mut self, _cx: &Component) {
        if let Some(renderer) = self.renderer.take() {
            renderer.release();
        }
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(input: serde_json::Value) -> Vec<Vec<Value>> {
        read(&Value::from(input)).map(|(_, items)| items).unwrap_or_default()
    }

    #[test]
    fn arrays_yield_item_then_index() {
        let items = values(json!({"in": ["a", "b"]}));
        assert_eq!(items, vec![vec![Value::from("a"), Value::from(0)], vec![Value::from("b"), Value::from(1)]]);
    }

    #[test]
    fn objects_yield_key_value_index() {
        let items = values(json!({"in": {"x": 1}}));
        assert_eq!(items, vec![vec![Value::from("x"), Value::from(1), Value::from(0)]]);
    }

    #[test]
    fn ranges_are_inclusive_in_both_directions() {
        let up: Vec<Value> = values(json!({"from": 1, "to": 3})).into_iter().flatten().collect();
        assert_eq!(up, vec![Value::from(1), Value::from(2), Value::from(3)]);
        let down: Vec<Value> = values(json!({"from": 2, "to": 0})).into_iter().flatten().collect();
        assert_eq!(down, vec![Value::from(2), Value::from(1), Value::from(0)]);
    }

    #[test]
    fn ranges_step_from_fractional_starts() {
        let items: Vec<Value> = values(json!({"from": 0.5, "to": 2})).into_iter().flatten().collect();
        assert_eq!(items, vec![Value::Number(0.5), Value::Number(1.5)]);
        let single: Vec<Value> = values(json!({"from": 2, "to": 2})).into_iter().flatten().collect();
        assert_eq!(single, vec![Value::from(2)]);
    }

    #[test]
    fn ranges_take_precedence_over_collections() {
        let items: Vec<Value> = values(json!({"in": ["a"], "from": 1, "to": 2})).into_iter().flatten().collect();
        assert_eq!(items, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn non_collections_are_rejected() {
        assert!(matches!(read(&Value::from(json!({"in": 5}))), Err(Error::Contract(_))));
        assert!(matches!(read(&Value::from(json!({"from": 1}))), Err(Error::Contract(_))));
        assert!(matches!(read(&Value::from(json!({"to": 3}))), Err(Error::Contract(_))));
        assert!(matches!(read(&Value::from(json!({}))), Err(Error::Contract(_))));
    }

    #[test]
    fn only_changed_arguments_are_reported() {
        let old: Object = [("item".to_string(), Value::from("a")), ("i".to_string(), Value::from(0))].into_iter().collect();
        let new: Object = [("item".to_string(), Value::from("x")), ("i".to_string(), Value::from(0))].into_iter().collect();
        assert_eq!(changed_keys(&old, &new), vec!["item".to_string()]);
    }
}
