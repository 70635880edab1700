// End-to-end tests for the directive walk, driven through `render_fragment`.

use futures::executor::block_on;
use serde_json::{json, Value};

use crate::collaborators::StaticIncludes;
use crate::config::RenderOptions;
use crate::context::DataContext;
use crate::processor::Engine;
use crate::render::render_fragment;
use crate::sources::SourceRegistry;

fn render_with(engine: &Engine, html: &str, data: Value, options: RenderOptions) -> String {
    block_on(render_fragment(engine, html, &DataContext::new(data), &options)).unwrap()
}

fn render(html: &str, data: Value) -> String {
    render_with(&Engine::new(), html, data, RenderOptions::default())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIST
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_list_expands_in_order_before_next_sibling() {
    let html = "<ul><li data-t-list=\"items\">{items}</li><li>end</li></ul>";
    let out = render(html, json!({ "items": ["a", "b"] }));

    assert_eq!(out, "<ul><li>a</li><li>b</li><li>end</li></ul>");
}

#[test]
fn test_list_item_fields() {
    let html = "<ul><li data-t-list=\"posts\"><a href=\"/posts/{posts.slug}\">{posts.title}</a></li></ul>";
    let out = render(
        html,
        json!({ "posts": [
            { "slug": "first", "title": "First" },
            { "slug": "second", "title": "Second" }
        ] }),
    );

    assert_eq!(
        out,
        "<ul><li><a href=\"/posts/first\">First</a></li><li><a href=\"/posts/second\">Second</a></li></ul>"
    );
}

#[test]
fn test_dotted_list_binds_full_path_and_leaf() {
    let html = "<ul><li data-t-list=\"blog.posts\">{blog.posts.title}|{posts.title}</li></ul>";
    let out = render(html, json!({ "blog": { "posts": [{ "title": "Only" }] } }));

    assert_eq!(out, "<ul><li>Only|Only</li></ul>");
}

#[test]
fn test_list_of_non_sequence_removes_template() {
    let html = "<ul><li data-t-list=\"missing\">x</li><li data-t-list=\"user\">y</li></ul>";
    let out = render(html, json!({ "user": { "name": "Ada" } }));

    assert_eq!(out, "<ul></ul>");
}

#[test]
fn test_empty_list_removes_template() {
    let out = render("<ul><li data-t-list=\"items\">{items}</li></ul>", json!({ "items": [] }));
    assert_eq!(out, "<ul></ul>");
}

#[test]
fn test_nested_lists() {
    let html = "<div data-t-list=\"groups\"><h2>{groups.name}</h2><span data-t-list=\"groups.tags\">{tags}</span></div>";
    let out = render(
        html,
        json!({ "groups": [
            { "name": "A", "tags": ["x", "y"] },
            { "name": "B", "tags": ["z"] }
        ] }),
    );

    assert_eq!(
        out,
        "<div><h2>A</h2><span>x</span><span>y</span></div><div><h2>B</h2><span>z</span></div>"
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONDITIONAL
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_false_condition_removes_element() {
    let html = "<p data-t-if=\"show\">yes</p><p data-t-if=\"!show\">no</p>";
    let out = render(html, json!({ "show": true }));

    assert_eq!(out, "<p data-t-if=\"show\">yes</p>");
}

#[test]
fn test_condition_stripped_on_server() {
    let html = "<p data-t-if=\"count:gt=3\">many</p><p data-t-if=\"status=draft\">draft</p>";
    let out = render_with(
        &Engine::new(),
        html,
        json!({ "count": 5, "status": "published" }),
        RenderOptions::server(),
    );

    assert_eq!(out, "<p>many</p>");
}

#[test]
fn test_removed_element_is_not_bound() {
    let html = "<div data-t-if=\"missing\"><a href=\"{link}\">{label}</a></div><span>after</span>";
    let out = render(html, json!({ "link": "javascript:alert(1)", "label": "x" }));

    assert_eq!(out, "<span>after</span>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// INCLUDE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_snippet_include_is_bound_after_merge() {
    let engine = Engine::new().with_includes(StaticIncludes::new().with("_parts/header.html", "<header>{title}</header>"));
    let out = render_with(
        &engine,
        "<div data-t-include=\"_parts/header.html\">old</div>",
        json!({ "title": "Home" }),
        RenderOptions::default(),
    );

    assert_eq!(out, "<div><header>Home</header></div>");
}

#[test]
fn test_layout_include_fills_slots() {
    let layout = "<header><span data-t-content=\"title\">Untitled</span></header>\
                  <main data-t-content=\"\">fallback</main>\
                  <footer data-t-content=\"footer\">(c)</footer>";
    let engine = Engine::new().with_includes(StaticIncludes::new().with("_parts/layout.html", layout));

    let out = render_with(
        &engine,
        "<div data-t-include=\"_parts/layout.html\"><h1 data-t-content=\"title\">{post}</h1><p>Body</p></div>",
        json!({ "post": "Hello" }),
        RenderOptions::default(),
    );

    assert!(out.contains("<header><span data-t-content=\"title\">Hello</span></header>"));
    assert!(out.contains("<main data-t-content=\"\"><p>Body</p></main>"));
    assert!(out.contains("<footer data-t-content=\"footer\">(c)</footer>"));
    assert!(!out.contains("data-t-include"));
    assert!(!out.contains("fallback"));
}

#[test]
fn test_nested_include_and_templated_path() {
    let includes = StaticIncludes::new()
        .with("_parts/page.html", "<section data-t-include=\"_parts/{part}.html\"></section>")
        .with("_parts/nav.html", "<nav>Menu</nav>");
    let engine = Engine::new().with_includes(includes);

    let out = render_with(
        &engine,
        "<div data-t-include=\"_parts/page.html\"></div>",
        json!({ "part": "nav" }),
        RenderOptions::default(),
    );

    assert_eq!(out, "<div><section><nav>Menu</nav></section></div>");
}

#[test]
fn test_failed_include_leaves_node() {
    let out = render("<div data-t-include=\"_parts/missing.html\">keep</div>", json!({}));
    assert_eq!(out, "<div data-t-include=\"_parts/missing.html\">keep</div>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scope_spreads_object_keys() {
    let html = "<div data-t-scope=\"user\"><span>{name}</span><span>{user.name}</span></div><p>{name}</p>";
    let out = render(html, json!({ "user": { "name": "Ada" } }));

    assert_eq!(
        out,
        "<div data-t-scope=\"user\"><span>Ada</span><span>Ada</span></div><p>{name}</p>"
    );
}

#[test]
fn test_scope_and_source_persist_when_stripping() {
    let registry = SourceRegistry::new();
    registry.mock("posts", json!([{ "title": "A" }]));
    let engine = Engine::new().with_fetcher(registry);

    let html = "<div data-t-source=\"posts\" href=\"/_sys/data/posts.json\">\
                <div data-t-scope=\"meta\"><span>{label}</span></div>\
                <p data-t-list=\"posts\">{posts.title}</p></div>";
    let out = render_with(&engine, html, json!({ "meta": { "label": "L" } }), RenderOptions::server());

    assert!(out.contains("data-t-source=\"posts\""));
    assert!(out.contains("<div data-t-scope=\"meta\"><span>L</span></div>"));
    assert!(out.contains("<p>A</p>"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_element_source_is_local_to_subtree() {
    let registry = SourceRegistry::new();
    registry.mock("team", json!({ "name": "Core" }));
    let engine = Engine::new().with_fetcher(registry);

    let html = "<div data-t-source=\"team\" href=\"/_sys/data/team.json\"><b>{team.name}</b></div><i>{team.name}</i>";
    let out = render_with(&engine, html, json!({}), RenderOptions::default());

    assert!(out.contains("<b>Core</b>"));
    assert!(out.contains("<i>{team.name}</i>"));
}

#[test]
fn test_link_sources_are_preloaded_with_query_shorthand() {
    let registry = SourceRegistry::new();
    registry.mock(
        "posts",
        json!([
            { "title": "One", "category": "news" },
            { "title": "Two", "category": "tech" },
            { "title": "Three", "category": "news" }
        ]),
    );
    let engine = Engine::new().with_fetcher(registry);

    let html = "<link data-t-source=\"posts\" href=\"/_sys/data/posts.json?category={?}\">\
                <ul><li data-t-list=\"posts\">{posts.title}</li></ul>";
    let data = json!({ "_sys": { "query": { "category": "news" }, "params": {} } });
    let out = render_with(&engine, html, data, RenderOptions::default());

    assert!(out.contains("<ul><li>One</li><li>Three</li></ul>"));
}

#[test]
fn test_source_without_fetcher_is_ignored() {
    let html = "<div data-t-source=\"posts\" href=\"/_sys/data/posts.json\">{posts}</div>";
    let out = render(html, json!({}));

    assert_eq!(out, "<div data-t-source=\"posts\" href=\"/_sys/data/posts.json\">{posts}</div>");
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_bound_text_and_attributes_are_escaped() {
    let payload = "\"><script>alert(1)</script>";
    let out = render("<p title=\"{t}\">{t}</p>", json!({ "t": payload }));

    assert!(out.starts_with("<p title=\"&quot;><script>alert(1)</script>\">"));
    assert!(out.ends_with(">\"&gt;&lt;script&gt;alert(1)&lt;/script&gt;</p>"));
}

#[test]
fn test_dangerous_url_replaced() {
    let html = "<a href=\"{link}\">x</a><img src=\"{pic}\">";
    let out = render(html, json!({ "link": " JavaScript:alert(1)", "pic": "/img/a.png" }));

    assert!(out.contains("<a href=\"#\">x</a>"));
    assert!(out.contains("<img src=\"/img/a.png\">"));
}

#[test]
fn test_event_handlers_not_bound() {
    let out = render("<button onclick=\"go('{id}')\">{id}</button>", json!({ "id": "7" }));
    assert_eq!(out, "<button onclick=\"go('{id}')\">7</button>");
}

#[test]
fn test_escaped_braces_unescaped_after_walk() {
    let out = render("<p data-x=\"\\{raw\\}\">\\{literal\\} {name}</p>", json!({ "name": "Ada" }));
    assert_eq!(out, "<p data-x=\"{raw}\">{literal} Ada</p>");
}

#[test]
fn test_unescape_can_be_disabled() {
    let options = RenderOptions {
        unescape_braces: false,
        ..RenderOptions::default()
    };
    let out = render_with(&Engine::new(), "<p>\\{x\\}</p>", json!({}), options);
    assert_eq!(out, "<p>\\{x\\}</p>");
}

#[test]
fn test_script_text_is_never_bound() {
    let out = render("<div><script>var x = {name};</script></div>", json!({ "name": "Ada" }));
    assert_eq!(out, "<div><script>var x = {name};</script></div>");
}

#[test]
fn test_auto_binding_on_server() {
    let html = "<input name=\"q\"><input type=\"checkbox\" name=\"done\"><textarea name=\"note\"></textarea>\
                <select name=\"size\"><option value=\"s\">S</option><option value=\"m\">M</option></select>";
    let out = render(html, json!({ "q": "rust", "done": true, "note": "hi", "size": "m" }));

    assert!(out.contains("<input name=\"q\" value=\"rust\">"));
    assert!(out.contains("<input type=\"checkbox\" name=\"done\" checked=\"checked\">"));
    assert!(out.contains("<textarea name=\"note\">hi</textarea>"));
    assert!(out.contains("<option value=\"m\" selected=\"\">M</option>"));
    assert!(!out.contains("<option value=\"s\" selected"));
}

#[test]
fn test_auto_binding_falls_back_to_query() {
    let data = json!({ "_sys": { "query": { "search": "owls" }, "params": {} } });
    let out = render("<input name=\"search\">", data);

    assert_eq!(out, "<input name=\"search\" value=\"owls\">");
}

#[test]
fn test_includes_only_leaves_bindings() {
    let engine = Engine::new().with_includes(StaticIncludes::new().with("_parts/a.html", "<b>{x}</b>"));
    let options = RenderOptions {
        traversal: crate::config::TraversalConfig::includes_only(),
        ..RenderOptions::default()
    };
    let out = render_with(
        &engine,
        "<div data-t-include=\"_parts/a.html\"></div><p data-t-if=\"missing\">{x}</p>",
        json!({ "x": "bound" }),
        options,
    );

    assert_eq!(out, "<div><b>{x}</b></div><p data-t-if=\"missing\">{x}</p>");
}
