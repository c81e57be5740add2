mod common;

use gantry::mapper::{UrlMap, UrlPattern};

#[test]
fn exact_beats_prefix() {
    common::init_tracing();
    let mut map = UrlMap::new();
    map.add_map("/admin/*", "prefix").unwrap();
    map.add_map("/admin/status", "exact").unwrap();

    let m = map.map("/admin/status").unwrap();
    assert_eq!(*m.value, "exact");
    assert_eq!(m.servlet_path, "/admin/status");
    assert_eq!(m.path_info, None);
}

#[test]
fn longer_prefix_beats_shorter() {
    let mut map = UrlMap::new();
    map.add_map("/admin/*", "short").unwrap();
    map.add_map("/admin/db/*", "long").unwrap();

    let m = map.map("/admin/db/tables").unwrap();
    assert_eq!(*m.value, "long");
    assert_eq!(m.servlet_path, "/admin/db");
    assert_eq!(m.path_info.as_deref(), Some("/tables"));
}

#[test]
fn prefix_matches_bare_prefix_without_path_info() {
    let mut map = UrlMap::new();
    map.add_map("/admin/*", "admin").unwrap();

    let m = map.map("/admin").unwrap();
    assert_eq!(*m.value, "admin");
    assert_eq!(m.servlet_path, "/admin");
    assert_eq!(m.path_info, None);
}

#[test]
fn prefix_requires_segment_boundary() {
    let mut map = UrlMap::new();
    map.add_map("/admin/*", "admin").unwrap();

    assert!(map.map("/administrator").is_none());
}

#[test]
fn prefix_beats_suffix() {
    let mut map = UrlMap::new();
    map.add_map("*.jsp", "jsp").unwrap();
    map.add_map("/app/*", "app").unwrap();

    let m = map.map("/app/page.jsp").unwrap();
    assert_eq!(*m.value, "app");
}

#[test]
fn suffix_matches_when_no_prefix_does() {
    let mut map = UrlMap::new();
    map.add_map("*.jsp", "jsp").unwrap();
    map.add_map("/other/*", "other").unwrap();

    let m = map.map("/pages/view.jsp").unwrap();
    assert_eq!(*m.value, "jsp");
    assert_eq!(m.servlet_path, "/pages/view.jsp");
}

#[test]
fn default_matches_only_as_last_resort() {
    let mut map = UrlMap::new();
    map.add_map("/", "default").unwrap();
    map.add_map("*.jsp", "jsp").unwrap();

    assert_eq!(*map.map("/view.jsp").unwrap().value, "jsp");
    assert_eq!(*map.map("/anything/else").unwrap().value, "default");
}

#[test]
fn ties_go_to_first_declared() {
    let mut map = UrlMap::new();
    map.add_map("*.xml", "first").unwrap();
    map.add_map("*.xml", "second").unwrap();

    assert_eq!(*map.map("/a.xml").unwrap().value, "first");
}

#[test]
fn regexp_patterns_match() {
    let mut map = UrlMap::new();
    map.add_regexp(r"^/v[0-9]+/items$", 8, "versioned").unwrap();

    assert_eq!(*map.map("/v2/items").unwrap().value, "versioned");
    assert!(map.map("/vx/items").is_none());
}

#[test]
fn malformed_patterns_are_rejected() {
    assert!(UrlPattern::parse("no-leading-slash").is_err());
    assert!(UrlPattern::parse("*.a/b").is_err());
    assert!(matches!(UrlPattern::parse("/").unwrap(), UrlPattern::Default));
}

#[test]
fn non_default_lookup_skips_default() {
    let mut map = UrlMap::new();
    map.add_map("/", "default").unwrap();

    assert!(map.map_non_default("/index.html").is_none());
    assert!(map.map("/index.html").is_some());
}
