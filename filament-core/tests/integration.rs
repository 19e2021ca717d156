//! Integration Tests for the Rendering Engine
//!
//! These tests mount templates on an in-memory surface, mutate component
//! data and check both the output and the engine's bookkeeping.

use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use filament_core::{
    dynamic, el, text, Dictionary, Engine, Error, Handler, MemorySurface, Promise, Surface, Template, Value,
};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

fn setup() -> (Rc<MemorySurface>, Engine) {
    let surface = Rc::new(MemorySurface::new());
    let engine = Engine::new(surface.clone());
    (surface, engine)
}

fn first(surface: &MemorySurface, tag: &str) -> filament_core::NodeId {
    surface.find_all(tag)[0]
}

/// Setting a value equal to the current one queues nothing.
#[test]
fn unchanged_values_do_not_schedule_updates() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("p").bind("title", "state.title").text("{state.title}")])
                .with_state(json!({"title": "T"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    let before = engine.metrics().snapshot();

    app.set_state("title", "T").unwrap();
    app.replace_state(json!({"title": "T"}));

    assert_eq!(engine.pending_microtasks(), 0);
    assert_eq!(engine.run_until_idle(), 0);
    assert_eq!(app.batch_stats().batches, 0);
    assert_eq!(engine.metrics().snapshot().dependency_updates, before.dependency_updates);
    assert_eq!(surface.html(), "<p title=\"T\">T</p>");
}

/// A text node and an attribute both reading a path update in one batch.
#[test]
fn text_and_attributes_follow_state() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("p").bind("title", "state.title").text("Hello {state.name}")])
                .with_state(json!({"name": "Ada", "title": "greeting"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p title=\"greeting\">Hello Ada</p>");

    app.set_state("name", "Grace").unwrap();
    app.set_state("title", "welcome").unwrap();
    engine.run_until_idle();

    assert_eq!(surface.html(), "<p title=\"welcome\">Hello Grace</p>");
    assert_eq!(app.batch_stats().batches, 1);
}

/// One entry per (path, binding); all bindings of a node share one memo.
#[test]
fn dependencies_are_deduplicated_per_binding() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("img")
                .bind("title", "state.x")
                .bind("alt", "state.x")
                .interp("data-x", "{state.x}-{state.x}")])
            .with_state(json!({"x": 1})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();

    assert_eq!(app.dependents_of("state.x").len(), 3);
    let stats = app.inspect();
    assert_eq!(stats.dependencies, 3);
    assert_eq!(stats.dependency_paths, 1);
    assert_eq!(stats.memo_slots, 1);

    app.set_state("x", 2).unwrap();
    engine.run_until_idle();
    let img = first(&surface, "img");
    assert_eq!(surface.attribute(img, "data-x").as_deref(), Some("2-2"));
    assert_eq!(app.batch_stats().last_batch_size, 3);
}

/// Shallower nodes flush before deeper ones.
#[test]
fn updates_run_outermost_first() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("section")
                .bind("title", "state.x")
                .child(el("p").text("{state.x}"))])
            .with_state(json!({"x": "a"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();

    app.set_state("x", "b").unwrap();
    engine.run_until_idle();

    let order = app.batch_stats().last_batch;
    assert_eq!(order.len(), 2);
    assert!(order[0].ends_with(".title"), "{order:?}");
    assert!(order[1].ends_with(".state.x"), "{order:?}");
    assert_eq!(surface.html(), "<section title=\"b\"><p>b</p></section>");
}

/// Spreads never override explicit keys, and keys they stop providing
/// are removed.
#[test]
fn spreads_respect_explicit_attributes() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("div")
                .attr("class", "base")
                .spread("state.extra")
                .bind("title", "state.title")])
            .with_state(json!({
                "extra": {"class": "over", "id": "x", "title": "nope"},
                "title": "T"
            })),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    let div = first(&surface, "div");
    assert_eq!(surface.attribute(div, "class").as_deref(), Some("base"));
    assert_eq!(surface.attribute(div, "title").as_deref(), Some("T"));
    assert_eq!(surface.attribute(div, "id").as_deref(), Some("x"));

    app.set_state("extra", json!({"id": "y"})).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.attribute(div, "id").as_deref(), Some("y"));
    assert_eq!(surface.attribute(div, "class").as_deref(), Some("base"));

    app.set_state("extra", json!({})).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.attribute(div, "id"), None);
    assert_eq!(surface.attribute(div, "title").as_deref(), Some("T"));
}

/// Changing one item updates one partial; shrinking cleans up from the end.
#[test]
fn loops_touch_only_changed_items() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("ul").child(
                el("for")
                    .bind("in", "state.items")
                    .args(&["item"])
                    .child(el("li").text("{item}")),
            )])
            .with_state(json!({"items": ["a", "b", "c"]})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<ul><li>a</li><li>b</li><li>c</li></ul>");
    let first_item = first(&surface, "li");

    let before = engine.metrics().snapshot();
    app.set_state("items", json!(["a", "x", "c"])).unwrap();
    engine.run_until_idle();
    let after = engine.metrics().snapshot();
    assert_eq!(surface.html(), "<ul><li>a</li><li>x</li><li>c</li></ul>");
    assert_eq!(after.partial_updates - before.partial_updates, 1);
    assert_eq!(after.partial_renders, before.partial_renders);
    assert_eq!(first(&surface, "li"), first_item);

    app.set_state("items", json!(["a"])).unwrap();
    engine.run_until_idle();
    let shrunk = engine.metrics().snapshot();
    assert_eq!(surface.html(), "<ul><li>a</li></ul>");
    assert_eq!(shrunk.mesh_cleanups - after.mesh_cleanups, 2);

    app.set_state("items", json!(["a", "b"])).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<ul><li>a</li><li>b</li></ul>");
    assert_eq!(engine.metrics().snapshot().partial_renders, shrunk.partial_renders + 1);
}

#[test]
fn ranges_render_inclusive_sequences() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("for")
                .attr("from", "1")
                .bind("to", "state.n")
                .args(&["i"])
                .child(el("b").text("{i}"))])
            .with_state(json!({"n": 3})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<b>1</b><b>2</b><b>3</b>");

    app.set_state("n", 2).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<b>1</b><b>2</b>");
}

/// Switching branches drops the hidden branch's dependencies.
#[test]
fn conditionals_untrack_hidden_branches() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("div")
                .child(el("if").bind("by", "state.show").child(el("p").text("{state.name}")))
                .child(el("else").child(el("em").text("hidden")))])
            .with_state(json!({"show": true, "name": "Ada"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<div><p>Ada</p></div>");
    assert_eq!(app.dependents_of("state.name").len(), 1);

    app.set_state("show", false).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<div><em>hidden</em></div>");
    assert!(app.dependents_of("state.name").is_empty());

    app.set_state("name", "Grace").unwrap();
    app.set_state("show", true).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<div><p>Grace</p></div>");
    assert_eq!(app.dependents_of("state.name").len(), 1);
}

/// A branch first shown after its loop item changed renders the new item.
#[test]
fn branches_inside_loop_items_render_current_items() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("for")
                .bind("in", "state.items")
                .args(&["item"])
                .child(el("if").bind("by", "item.show").child(el("p").text("{item.name}")))])
            .with_state(json!({"items": [{"show": false, "name": "a"}]})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "");

    app.set_state("items", json!([{"show": true, "name": "b"}])).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>b</p>");
}

/// The branch condition does not read the item, so nothing in the item
/// re-runs; the hidden body still renders the latest value once shown.
#[test]
fn hidden_branches_pick_up_item_changes_when_shown() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("for")
                .bind("in", "state.items")
                .args(&["item"])
                .child(el("if").bind("by", "state.open").child(el("p").text("{item}")))])
            .with_state(json!({"open": false, "items": ["a"]})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();

    app.set_state("items", json!(["z"])).unwrap();
    engine.run_until_idle();
    app.set_state("open", true).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>z</p>");
}

/// An inner loop rebinding `item` keeps its own binding when the outer
/// row changes.
#[test]
fn nested_loops_keep_their_own_arguments() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("for").bind("in", "state.rows").args(&["item"]).child(
                el("for")
                    .bind("in", "item")
                    .args(&["item"])
                    .child(el("if").bind("by", "state.open").child(el("b").text("{item}"))),
            )])
            .with_state(json!({"open": false, "rows": [["a", "b"]]})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();

    app.set_state("rows", json!([["a", "c"]])).unwrap();
    engine.run_until_idle();
    app.set_state("open", true).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<b>a</b><b>c</b>");
}

#[test]
fn else_if_chains_pick_the_first_truthy_branch() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([
                el("if").bind("by", "state.n > 10").child(text("big")),
                el("else-if").bind("by", "state.n > 5").child(text("medium")),
                el("else").child(text("small")),
            ])
            .with_state(json!({"n": 7})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "medium");

    app.set_state("n", 20).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "big");

    app.set_state("n", 1).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "small");
}

#[test]
fn switch_renders_the_matching_case() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("switch")
                .bind("by", "state.mode")
                .child(el("case").attr("is", "edit").child(text("editing")))
                .child(el("case").attr("is", "view").child(text("viewing")))
                .child(el("default").child(text("idle")))])
            .with_state(json!({"mode": "view"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "viewing");

    app.set_state("mode", "edit").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "editing");

    app.set_state("mode", "other").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "idle");
}

/// The loading branch shows until the promise settles.
#[test]
fn async_swaps_loading_for_the_result() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("async")
                .bind("await", "input.job")
                .child(el("loading").child(text("loading")))
                .child(el("then").args(&["value"]).child(el("b").text("{value}")))
                .child(el("catch").args(&["error"]).child(el("i").text("{error}")))]),
        )
        .unwrap();

    let job = Promise::new();
    let mut input = filament_core::Object::new();
    input.insert("job".into(), job.clone().into());
    let app = engine.mount("app", Value::object(input), surface.root()).unwrap();
    assert_eq!(surface.html(), "loading");

    job.resolve(Value::from("done"));
    engine.run_until_idle();
    assert_eq!(surface.html(), "<b>done</b>");

    let failing = Promise::new();
    app.sub_input(Value::object(
        [("job".to_string(), Value::from(failing.clone()))].into_iter().collect(),
    ))
    .unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "loading");
    failing.reject(Value::from("boom"));
    engine.run_until_idle();
    assert_eq!(surface.html(), "<i>boom</i>");
}

/// A superseded promise settling late changes nothing.
#[test]
fn async_ignores_superseded_promises() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("async")
                .bind("await", "input.job")
                .child(el("loading").child(text("loading")))
                .child(el("then").args(&["value"]).child(text("{value}")))]),
        )
        .unwrap();
    let slow = Promise::new();
    let app = engine
        .mount(
            "app",
            Value::object([("job".to_string(), Value::from(slow.clone()))].into_iter().collect()),
            surface.root(),
        )
        .unwrap();

    let fast = Promise::new();
    app.sub_input(Value::object(
        [("job".to_string(), Value::from(fast.clone()))].into_iter().collect(),
    ))
    .unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "loading");

    slow.resolve(Value::from("slow"));
    engine.run_until_idle();
    assert_eq!(surface.html(), "loading");

    fast.resolve(Value::from("fast"));
    engine.run_until_idle();
    assert_eq!(surface.html(), "fast");
}

#[tokio::test(flavor = "current_thread")]
async fn async_settles_from_a_local_future() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let (surface, engine) = setup();
            engine
                .register(
                    "app",
                    Template::new([el("async")
                        .bind("await", "input.job")
                        .child(el("loading").child(text("...")))
                        .child(el("then").args(&["value"]).child(text("{value}")))]),
                )
                .unwrap();
            let job = Promise::from_future(async {
                tokio::task::yield_now().await;
                Ok(Value::from("ready"))
            });
            let _app = engine
                .mount(
                    "app",
                    Value::object([("job".to_string(), Value::from(job.clone()))].into_iter().collect()),
                    surface.root(),
                )
                .unwrap();
            assert_eq!(surface.html(), "...");

            while job.is_pending() {
                tokio::task::yield_now().await;
            }
            engine.run_until_idle();
            assert_eq!(surface.html(), "ready");
        })
        .await;
}

#[test]
fn child_components_receive_reactive_input() {
    let (surface, engine) = setup();
    engine
        .register("badge", Template::new([el("span").text("{input.label}")]))
        .unwrap();
    engine
        .register(
            "app",
            Template::new([el("div").child(el("badge").bind("label", "state.label"))])
                .with_state(json!({"label": "new"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<div><span>new</span></div>");
    assert_eq!(app.children().len(), 1);

    app.set_state("label", "old").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<div><span>old</span></div>");
    assert_eq!(app.children()[0].input().get("label"), Value::from("old"));
}

#[test]
fn a_component_cannot_render_itself() {
    let (surface, engine) = setup();
    engine
        .register("loop", Template::new([el("div").child(el("loop"))]))
        .unwrap();
    let err = engine.mount("loop", Value::Undefined, surface.root()).unwrap_err();
    assert!(matches!(err, filament_core::Error::Structural { .. }), "{err}");
}

#[test]
fn macros_update_with_their_arguments() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("badge").bind("label", "state.name")])
                .with_macro("badge", &["label"], [el("span").text("[{label}]")])
                .with_state(json!({"name": "ada"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<span>[ada]</span>");

    app.set_state("name", "grace").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<span>[grace]</span>");
}

#[test]
fn dynamic_tags_retarget_on_change() {
    let (surface, engine) = setup();
    engine
        .register("card", Template::new([el("article").text("card")]))
        .unwrap();
    engine
        .register(
            "app",
            Template::new([dynamic("state.tag").text("body")]).with_state(json!({"tag": "h1"})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<h1>body</h1>");

    app.set_state("tag", "h2").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<h2>body</h2>");

    app.set_state("tag", "card").unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<article>card</article>");
}

#[test]
fn events_call_handler_methods() {
    let (surface, engine) = setup();
    let handler = Handler::new().method("increment", |cx, args| {
        let step = args.first().map_or(1.0, Value::to_number);
        let next = cx.state().get("count").to_number() + step;
        cx.set_state("count", next).map_or(Value::Undefined, |_| Value::Bool(true))
    });
    engine
        .register(
            "app",
            Template::new([el("button").on("click", "increment, 2").text("{state.count}")])
                .with_state(json!({"count": 0}))
                .with_handler(handler),
        )
        .unwrap();
    let _app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    let button = first(&surface, "button");

    assert!(surface.dispatch(button, "click", &[]));
    engine.run_until_idle();
    assert_eq!(surface.html(), "<button>2</button>");
}

#[test]
fn context_changes_reach_subscribed_components() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("p").bind("class", "context.theme")]).with_context(&["theme"]),
        )
        .unwrap();
    engine.set_context(json!({"theme": "light"}));
    let _app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    let p = first(&surface, "p");
    assert_eq!(surface.attribute(p, "class").as_deref(), Some("light"));

    engine.set_context(json!({"theme": "dark"}));
    engine.run_until_idle();
    assert_eq!(surface.attribute(p, "class").as_deref(), Some("dark"));
}

#[test]
fn language_changes_retranslate_content() {
    let (surface, engine) = setup();
    engine.set_translator(Dictionary::new().entry("fr", "Hello", "Bonjour"));
    engine
        .register("app", Template::new([el("p").flag("i18n").text("Hello")]))
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p>Hello</p>");
    assert_eq!(app.inspect().i18n_bindings, 1);

    engine.set_language("fr");
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>Bonjour</p>");
}

#[test]
fn global_routers_follow_navigation() {
    let (surface, engine) = setup();
    engine
        .register("home", Template::new([el("h1").text("home")]))
        .unwrap();
    engine
        .register("user", Template::new([el("h1").text("user {input.params.id}")]))
        .unwrap();
    engine
        .register("app", Template::new([el("router").bind("routes", "input.routes").flag("global")]))
        .unwrap();
    let routes = json!({"routes": [
        {"path": "/", "template": "home", "default": true},
        {"path": "/users/:id", "template": "user"}
    ]});
    let _app = engine.mount("app", routes, surface.root()).unwrap();
    assert_eq!(surface.html(), "<h1>home</h1>");

    assert_eq!(engine.navigate("/users/7"), 1);
    engine.run_until_idle();
    assert_eq!(surface.html(), "<h1>user 7</h1>");
}

/// Destroying a component leaves no bindings and no output behind.
#[test]
fn destroy_releases_everything() {
    let (surface, engine) = setup();
    engine
        .register("badge", Template::new([el("span").text("{input.label}")]))
        .unwrap();
    engine
        .register(
            "app",
            Template::new([
                el("badge").bind("label", "state.label"),
                el("for")
                    .bind("in", "state.items")
                    .args(&["item"])
                    .child(el("li").text("{item}")),
            ])
            .with_state(json!({"label": "x", "items": [1, 2]})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    let children = app.children();
    assert!(!children.is_empty());

    app.destroy();
    let stats = app.inspect();
    assert_eq!(stats.dependencies, 0);
    assert_eq!(stats.memo_slots, 0);
    assert_eq!(stats.children, 0);
    assert!(children.iter().all(|c| c.is_destroyed()));
    assert_eq!(surface.html(), "");

    app.destroy();
    app.set_state("label", "y").unwrap();
    assert_eq!(engine.run_until_idle(), 0);
}

#[test]
fn context_fields_can_be_selected_at_runtime() {
    let (surface, engine) = setup();
    engine
        .register("app", Template::new([el("p").text("{context.user}")]))
        .unwrap();
    engine.set_context(json!({"user": "ada"}));
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p></p>");

    app.use_context(&["user"]);
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>ada</p>");

    engine.set_context(json!({"user": "grace"}));
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>grace</p>");
}

/// A reactive `let` re-runs the text and attribute bindings reading it.
#[test]
fn let_variables_propagate_to_their_readers() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([
                el("let").bind("double", "state.n * 2").build(),
                el("p").bind("title", "double").text("{double}").build(),
            ])
            .with_state(json!({"n": 1})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p title=\"2\">2</p>");
    assert_eq!(app.dependents_of("double").len(), 2);

    app.set_state("n", 4).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p title=\"8\">8</p>");
}

/// Re-evaluating a `let` to the same value stops there.
#[test]
fn unchanged_let_values_stop_propagation() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([
                el("let").bind("positive", "state.n > 0").build(),
                el("p").text("{positive}").build(),
            ])
            .with_state(json!({"n": 1})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p>true</p>");

    app.set_state("n", 2).unwrap();
    engine.run_until_idle();
    let stats = app.batch_stats();
    assert_eq!(stats.total_updates, 1);
    assert_eq!(stats.last_batch.len(), 1);
    assert!(stats.last_batch[0].ends_with(".positive"));
    assert_eq!(surface.html(), "<p>true</p>");
}

/// Keys bound before a spread are fixed at render; keys after it track.
#[test]
fn let_keys_before_a_spread_are_not_tracked() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([
                el("let")
                    .bind("early", "state.n")
                    .spread("state.extra")
                    .bind("late", "state.n")
                    .build(),
                el("p").text("{early} {late} {b}").build(),
            ])
            .with_state(json!({"n": 1, "extra": {"b": 2}})),
        )
        .unwrap();
    let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
    assert_eq!(surface.html(), "<p>1 1 2</p>");
    assert_eq!(app.dependents_of("state.n").len(), 1);

    app.set_state("n", 5).unwrap();
    engine.run_until_idle();
    assert_eq!(surface.html(), "<p>1 5 2</p>");
}

#[test]
fn constants_cannot_be_redeclared() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([
                el("const").attr("limit", "1").build(),
                el("const").attr("limit", "2").build(),
                el("p").text("{limit}").build(),
            ]),
        )
        .unwrap();
    let result = engine.mount("app", Value::Undefined, surface.root());
    assert!(matches!(result, Err(Error::ConstReassignment(name)) if name == "limit"));
    assert_eq!(surface.html(), "");
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains("filament::template"))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// `<log>` writes once on render and again whenever its arguments change.
#[test]
fn log_lines_follow_their_arguments() {
    let (surface, engine) = setup();
    engine
        .register(
            "app",
            Template::new([el("log").bind("args", "['count', state.n]")]).with_state(json!({"n": 1, "other": 0})),
        )
        .unwrap();
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let app = engine.mount("app", Value::Undefined, surface.root()).unwrap();
        app.set_state("n", 2).unwrap();
        engine.run_until_idle();
        app.set_state("other", 1).unwrap();
        engine.run_until_idle();
    });

    let lines = captured.lines();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].contains("count 1"));
    assert!(lines[1].contains("count 2"));
}
