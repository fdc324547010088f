//! Integration tests: imports, includes and lazy namespace initialization

mod common;

use std::sync::Arc;

use tplcore::{Error, Locale, MapLoader, NamespaceStatus};

fn lazy_engine(loader: &Arc<MapLoader>) -> tplcore::Engine {
    common::builder(loader, &common::DirectiveLanguage::new())
        .setting("lazy_imports", "true")
        .build()
        .unwrap()
}

// =============================================================================
// Eager imports
// =============================================================================

#[test]
fn test_eager_import_runs_at_import_time() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import lib/util.ftl as u\nmain\n@print u.greeting")
            .with("lib/util.ftl", "util ran\n@set greeting=hi"),
    );
    let (engine, _) = common::engine(&loader);
    assert_eq!(engine.render("main.ftl").unwrap(), "main\nhi\n");
}

#[test]
fn test_imported_template_output_is_discarded() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import lib.ftl as l\nmain\n@print l.x")
            .with("lib.ftl", "LIB OUTPUT\n@include part.ftl\n@set x=1")
            .with("part.ftl", "PART OUTPUT"),
    );
    let (engine, _) = common::engine(&loader);
    assert_eq!(engine.render("main.ftl").unwrap(), "main\n1\n");

    let lazy = lazy_engine(&loader);
    assert_eq!(lazy.render("main.ftl").unwrap(), "main\n1\n");
}

#[test]
fn test_mutual_eager_imports() {
    let loader = Arc::new(
        MapLoader::new()
            .with(
                "main.ftl",
                "@import a.ftl as a\n@import b.ftl as b\n@print a.x\n@print b.y",
            )
            .with("a.ftl", "@import b.ftl as b\n@set x=from-a")
            .with("b.ftl", "@import a.ftl as a\n@set y=from-b"),
    );
    let (engine, _) = common::engine(&loader);
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.process().unwrap();

    assert_eq!(session.output(), "from-a\nfrom-b\n");
    assert_eq!(session.namespace_status("a"), Some(NamespaceStatus::Ready));
    assert_eq!(session.namespace_status("b"), Some(NamespaceStatus::Ready));
}

#[test]
fn test_eager_import_failure_is_raw() {
    let loader = Arc::new(MapLoader::new().with("main.ftl", "@import nope.ftl as n\nmain"));
    let (engine, _) = common::engine(&loader);
    let err = engine.render("main.ftl").unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
    assert!(!matches!(err, Error::LazyInit { .. }));
}

// =============================================================================
// Lazy imports
// =============================================================================

#[test]
fn test_lazy_import_deferred_until_member_access() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import lib.ftl as lib\nbefore\n@print lib.x\nafter")
            .with("lib.ftl", "lib ran\n@set x=42"),
    );
    let engine = lazy_engine(&loader);
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.start().unwrap();
    session.import("lib.ftl", "lib").unwrap();
    assert_eq!(session.namespace_status("lib"), Some(NamespaceStatus::Unresolved));

    assert_eq!(
        engine.render("main.ftl").unwrap(),
        "before\n42\nafter\n"
    );
}

#[test]
fn test_lazy_import_of_missing_template_fails_on_access() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import missing.ftl as m\nstill fine")
            .with("use.ftl", "@import missing.ftl as m\n@print m.x"),
    );
    let engine = lazy_engine(&loader);
    assert_eq!(engine.render("main.ftl").unwrap(), "still fine\n");

    let err = engine.render("use.ftl").unwrap_err();
    match &err {
        Error::LazyInit { import, host, source } => {
            assert_eq!(import, "missing.ftl");
            assert_eq!(host, "use.ftl");
            assert!(source.is_not_found());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.to_string().contains("missing.ftl"));
    assert!(err.root().is_not_found());
}

#[test]
fn test_failed_namespace_stays_failed() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import broken.ftl as b")
            .with("broken.ftl", "@fail boom"),
    );
    let engine = lazy_engine(&loader);
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.process().unwrap();
    assert_eq!(session.namespace_status("b"), Some(NamespaceStatus::Unresolved));

    for _ in 0..2 {
        let err = session.namespace_var("b", "anything").unwrap_err();
        assert!(matches!(
            err.root(),
            Error::Eval { message, .. } if message == "boom"
        ));
    }
    assert_eq!(session.namespace_status("b"), Some(NamespaceStatus::Failed));
}

#[test]
fn test_same_template_imported_twice_shares_namespace() {
    let loader = Arc::new(
        MapLoader::new()
            .with(
                "main.ftl",
                "@import lib.ftl as a\n@import lib.ftl as b\n@print a.x\n@print b.x",
            )
            .with("lib.ftl", "lib ran\n@set x=1"),
    );
    let engine = lazy_engine(&loader);
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.process().unwrap();

    assert_eq!(session.output(), "1\n1\n");
    assert_eq!(session.namespace_aliases(), vec!["a", "b"]);
    let a = session.namespace_template("a").unwrap();
    let b = session.namespace_template("b").unwrap();
    assert!(Arc::ptr_eq(a, b));
}

#[test]
fn test_lazy_import_cycle_sees_partial_namespace() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import a.ftl as a\n@print a.x")
            .with("a.ftl", "@set x=from-a\n@import b.ftl as b\n@print b.y")
            .with("b.ftl", "@import a.ftl as a\n@print a.x\n@set y=from-b"),
    );
    let language = common::DirectiveLanguage::new();
    let parses = language.counter();
    let engine = common::builder(&loader, &language)
        .setting("lazy_imports", "true")
        .build()
        .unwrap();

    // b forces a while a is still initializing: no error and no second run
    assert_eq!(engine.render("main.ftl").unwrap(), "from-a\n");
    assert_eq!(common::parses(&parses), 3);
}

#[test]
fn test_lazy_namespace_runs_under_import_time_locale() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "@import lib.ftl as l")
            .with("lib.ftl", "@include part.ftl")
            .with("part.ftl", "@set x=default")
            .with("part_de.ftl", "@set x=de"),
    );
    let engine = common::builder(&loader, &common::DirectiveLanguage::new())
        .setting("lazy_imports", "true")
        .setting("locale", "fr")
        .build()
        .unwrap();
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.process().unwrap();

    let de = Locale::parse("de").unwrap();
    session.set_locale(de.clone()).unwrap();
    assert_eq!(
        session.namespace_var("l", "x").unwrap(),
        Some(serde_json::json!("default"))
    );
    assert_eq!(session.locale(), de);
}

// =============================================================================
// Auto-imports and auto-includes
// =============================================================================

#[test]
fn test_auto_imports_run_before_auto_includes() {
    let loader = Arc::new(
        MapLoader::new()
            .with("pages/main.ftl", "main\n@print std.v")
            .with("lib/std.ftl", "import\n@set v=std")
            .with("inc/top.ftl", "include"),
    );
    let engine = common::builder(&loader, &common::DirectiveLanguage::new())
        .setting("auto_import", "{std: lib/std.ftl}")
        .setting("auto_include", "[/inc/top.ftl]")
        .build()
        .unwrap();

    assert_eq!(
        engine.render("pages/main.ftl").unwrap(),
        "import\ninclude\nmain\nstd\n"
    );
}

#[test]
fn test_lazy_auto_imports_follow_lazy_imports_when_unset() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "main")
            .with("lib.ftl", "@fail should not run"),
    );
    let engine = common::builder(&loader, &common::DirectiveLanguage::new())
        .setting("auto_import", "{l: lib.ftl}")
        .setting("lazy_imports", "true")
        .build()
        .unwrap();
    assert_eq!(engine.render("main.ftl").unwrap(), "main\n");

    engine.set_setting("lazy_auto_imports", "false").unwrap();
    let err = engine.render("main.ftl").unwrap_err();
    assert!(matches!(err, Error::Eval { ref message, .. } if message == "should not run"));
}

#[test]
fn test_start_is_idempotent() {
    let loader = Arc::new(
        MapLoader::new()
            .with("main.ftl", "main")
            .with("inc.ftl", "inc"),
    );
    let engine = common::builder(&loader, &common::DirectiveLanguage::new())
        .setting("auto_include", "inc.ftl")
        .build()
        .unwrap();
    let template = engine.template("main.ftl").unwrap();
    let mut session = engine.new_session(template);
    session.start().unwrap();
    session.start().unwrap();
    session.process().unwrap();
    assert_eq!(session.output(), "inc\nmain\n");
}
