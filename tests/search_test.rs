//! Search queries executed against a populated store


use mediadex::models::TagFrequency;
use mediadex::{search, Error, SortColumn, SortDirection, SortOrder};
use test_helpers::*;

#[test]
fn test_single_term_matches_name_or_tag() {
    let lib = Library::new();
    let by_name = lib.add_file("some_awesome_band_desu", &[]);
    let by_tag = lib.add_tagged(&["some_awesome_band_desu"]);
    lib.add_tagged(&["noise"]);

    assert_matches(&lib, "some_awesome_band_desu", &[&by_name, &by_tag]);
}

#[test]
fn test_file_and_tag_prefixes() {
    let lib = Library::new();
    let by_name = lib.add_file("some_awesome_band_desu", &[]);
    let by_tag = lib.add_tagged(&["some_awesome_band_desu"]);

    assert_matches(&lib, "f~some_awesome_band_desu", &[&by_name]);
    assert_matches(&lib, "F~some_awesome_band_desu", &[&by_name]);
    assert_matches(&lib, "t~awesome_band", &[&by_tag]);
    assert_matches(&lib, "T~awesome_band", &[&by_tag]);
    assert_matches(&lib, "t=some_awesome_band_desu", &[&by_tag]);
    assert_matches(&lib, "T=some_awesome_band_desu", &[&by_tag]);
    assert_matches(&lib, "t=awesome_band", &[]);
}

#[test]
fn test_anchored_terms() {
    let lib = Library::new();
    let video = lib.add_file("holiday_video", &[]);
    let tagged = lib.add_tagged(&["band_desu_live"]);
    let other = lib.add_tagged(&["live_band_desu"]);

    // Stored name is holiday_video_N.ext
    assert_matches(&lib, "f~.ext$", &[&video, &tagged, &other]);
    assert_matches(&lib, "f~holiday_video$", &[]);
    assert_matches(&lib, "t~^band_desu", &[&tagged]);
    assert_matches(&lib, "t~desu_live$", &[&tagged]);
}

#[test]
fn test_wildcard() {
    let lib = Library::new();
    let a = lib.add_tagged(&["red_car"]);
    lib.add_tagged(&["red_bus"]);
    assert_matches(&lib, "t=red*car", &[&a]);
}

#[test]
fn test_special_characters_match_literally() {
    let lib = Library::new();
    let term = "awesome'\"*%_\\)(band";
    let by_name = lib.add_file(term, &[]);
    let by_tag = lib.add_tagged(&[term]);
    // Would match if % or _ were wildcards
    lib.add_tagged(&["awesome'\"*XY\\)(band"]);

    assert_matches(&lib, &format!("f~{}", term), &[&by_name]);
    assert_matches(&lib, &format!("t={}", term), &[&by_tag]);
}

#[test]
fn test_quoted_terms() {
    let lib = Library::new();
    let double = lib.add_tagged(&["some awesome\" band desu"]);
    let single = lib.add_tagged(&["some awesome' band desu"]);

    assert_matches(&lib, "t='some awesome\" band desu'", &[&double]);
    assert_matches(&lib, "t=\"some awesome' band desu\"", &[&single]);
}

#[test]
fn test_escaped_quotes_in_tags() {
    let lib = Library::new();
    let a = lib.add_tagged(&["some media' tag "]);
    let b = lib.add_tagged(&["some media\" tag "]);
    let c = lib.add_tagged(&["some \\'media\" tag "]);

    assert_matches(&lib, "t=some' media\\' tag '", &[&a]);
    assert_matches(&lib, "t=some\" media\\\" tag \"", &[&b]);
    assert_matches(&lib, "t=some\" \\'media\\\" tag \"", &[&c]);
}

#[test]
fn test_and_or_and_brackets() {
    let lib = Library::new();
    let expected1 = lib.add_file("some_folder", &["foo"]);
    let expected2 = lib.add_file("some_folder", &["bar"]);
    lib.add_file("other_folder", &["foo"]);
    lib.add_file("other_folder", &["bar"]);

    assert_matches(&lib, "t=foo f~some_folder", &[&expected1]);
    assert_matches(&lib, "t=bar f~some_folder", &[&expected2]);

    for query in [
        "(t=bar OR t=foo) f~some_folder",
        "f~some_folder (t=bar OR t=foo)",
        "f~some_folder AND (t=bar OR t=foo)",
        "f~some_folder AND AND (t=bar OR t=foo)",
    ] {
        assert_matches(&lib, query, &[&expected1, &expected2]);
    }
}

#[test]
fn test_or_of_two_tags() {
    let lib = Library::new();
    let a = lib.add_tagged(&["some_awesome_band_desu"]);
    let b = lib.add_tagged(&["happy_track_nyan~"]);
    lib.add_tagged(&["noise"]);

    assert_matches(&lib, "t=some_awesome_band_desu OR t=happy_track_nyan~", &[&a, &b]);
    assert_matches(&lib, "t=some_awesome_band_desu t=happy_track_nyan~", &[]);
}

#[test]
fn test_literal_example() {
    let lib = Library::new();
    let in_bar = lib.add_file("bar_dir", &["foo"]);
    let no_baz = lib.add_tagged(&["foo"]);
    lib.add_tagged(&["foo", "baz"]);
    lib.add_file("bar_dir", &[]);

    assert_matches(&lib, "t=foo AND ( f~bar_dir OR -t~baz )", &[&in_bar, &no_baz]);
}

#[test]
fn test_unbalanced_and_dangling_operators() {
    let lib = Library::new();
    let expected = lib.add_file("some_media_file", &[]);

    for query in [
        "(some_media_file",
        "( OR some_media_file",
        "some_media_file)",
        "some_media_file OR )",
        "OR some_media_file",
        "some_media_file OR",
    ] {
        assert_matches(&lib, query, &[&expected]);
    }
}

#[test]
fn test_negations() {
    let lib = Library::new();
    lib.add_tagged(&["abc", "foobar"]);
    let non_match = lib.add_tagged(&["abc", "desu"]);
    assert_matches(&lib, "t=abc -t=foobar", &[&non_match]);
    assert_matches(&lib, "t=abc -t~foo", &[&non_match]);

    let lib = Library::new();
    lib.add_file("foo_bar", &["abc"]);
    let non_match = lib.add_tagged(&["abc"]);
    assert_matches(&lib, "t=abc -f~foo_bar", &[&non_match]);
}

#[test]
fn test_tag_count_below() {
    let lib = Library::new();
    let none0 = lib.add_file("somepath", &[]);
    let none1 = lib.add_file("otherpath", &[]);
    let one0 = lib.add_tagged(&["abc"]);
    let one1 = lib.add_tagged(&["def"]);
    lib.add_tagged(&["abc", "desu"]);
    lib.add_tagged(&["def", "hello"]);

    assert_matches(&lib, "t<1", &[&none0, &none1]);
    assert_matches(&lib, "t<2", &[&none0, &none1, &one0, &one1]);
}

#[test]
fn test_tag_count_above() {
    let lib = Library::new();
    lib.add_file("somepath", &[]);
    let t1 = lib.add_tagged(&["one"]);
    let t2 = lib.add_tagged(&["one", "two"]);
    let t3 = lib.add_tagged(&["one", "two", "three"]);
    let t4 = lib.add_tagged(&["one", "two", "three", "four"]);

    assert_matches(&lib, "t=one t>0", &[&t1, &t2, &t3, &t4]);
    assert_matches(&lib, "t=one t>1", &[&t2, &t3, &t4]);
    assert_matches(&lib, "t=one t>2", &[&t3, &t4]);
    assert_matches(&lib, "t=one t>3", &[&t4]);
    assert_matches(&lib, "t=one t>4", &[]);
}

#[test]
fn test_deleted_tags_do_not_count() {
    let lib = Library::new();
    let id = lib.add_tagged(&["one", "two"]);
    lib.store().set_tag_deleted(&id, "two", true, 2).unwrap();

    assert_matches(&lib, "t=two", &[]);
    assert_matches(&lib, "t<2", &[&id]);
    assert_matches(&lib, "-t=two", &[&id]);
}

#[test]
fn test_dupes() {
    let lib = Library::new();
    let a0 = lib.add_content(b"content a");
    let a1 = lib.add_content(b"content a");
    let a2 = lib.add_content(b"content a");
    assert_eq!(a0, a1);
    assert_eq!(a0, a2);

    let b0 = lib.add_content(b"content b");
    let b1 = lib.add_content(b"content b");
    assert_eq!(b0, b1);
    assert_ne!(a0, b0);
    lib.add_content(b"content c");

    assert_matches(&lib, "dupes>0", &[&a0, &b0]);
    assert_matches(&lib, "dupes>1", &[&a0]);
    assert_matches(&lib, "dupes>2", &[]);
}

#[test]
fn test_paging() {
    let lib = Library::new();
    let mut ids: Vec<_> = (0..60).map(|_| lib.add_tagged(&["paged"])).collect();
    ids.sort_by_key(|id| lib.store().live_paths_for_id(id).unwrap()[0].to_lowercase());

    let query = search::compile("t=paged");
    let page1 = query.execute(lib.store(), Some(50), 0).unwrap();
    let page2 = query.execute(lib.store(), Some(50), 50).unwrap();
    assert_eq!(page1, ids[..50]);
    assert_eq!(page2, ids[50..]);

    let tail = query.execute(lib.store(), None, 55).unwrap();
    assert_eq!(tail, ids[55..]);
}

#[test]
fn test_sort_by_file() {
    let lib = Library::new();
    let b = lib.add_file("b_sort", &["sorted"]);
    let a = lib.add_file("A_sort", &["sorted"]);
    let c = lib.add_file("c_sort", &["sorted"]);

    let query = search::compile("t=sorted");
    let asc = query
        .execute_sorted(lib.store(), &[SortColumn::File.asc()], None, 0)
        .unwrap();
    assert_eq!(asc, vec![a.clone(), b.clone(), c.clone()]);

    let desc = query
        .execute_sorted(lib.store(), &[SortColumn::File.desc()], None, 0)
        .unwrap();
    assert_eq!(desc, vec![c, b, a]);
}

#[test]
fn test_sort_by_modified_then_file() {
    let lib = Library::new();
    let first = lib.add_file("zz_first", &["sorted"]);
    let second = lib.add_file("aa_second", &["sorted"]);

    let sorts = SortOrder::zip(
        &[SortColumn::Modified, SortColumn::File],
        &[SortDirection::Desc, SortDirection::Asc],
    )
    .unwrap();
    let ids = search::compile("t=sorted")
        .execute_sorted(lib.store(), &sorts, None, 0)
        .unwrap();
    assert_eq!(ids, vec![second, first]);
}

#[test]
fn test_mismatched_sort_lists_error() {
    let err = SortOrder::zip(&[SortColumn::File, SortColumn::Modified], &[SortDirection::Asc]).unwrap_err();
    assert!(matches!(err, Error::InvalidSort(_)));
    assert!(!err.is_retryable());
}

#[test]
fn test_bad_query_does_not_crash() {
    let lib = Library::new();
    lib.add_tagged(&["thing"]);

    let term = "t=\"a very long tag that does not fit on the screen properl";
    let query = search::compile(term);
    assert_eq!(query.terms(), [term]);
    assert!(query.execute(lib.store(), None, 0).unwrap().is_empty());
}

#[test]
fn test_tag_frequencies() {
    let lib = Library::new();
    lib.add_tagged(&["desu", "foobar", "thing", "other"]);
    lib.add_tagged(&["foobar", "desu"]);
    lib.add_tagged(&["foobar", "thing"]);
    lib.add_tagged(&["unrelated"]);

    let freq = search::compile("t=foobar")
        .tag_frequencies(lib.store(), Some(3), 0)
        .unwrap();
    let expected = [("foobar", 3), ("desu", 2), ("thing", 2)];
    let expected: Vec<TagFrequency> = expected
        .iter()
        .map(|(tag, count)| TagFrequency { tag: tag.to_string(), count: *count })
        .collect();
    assert_eq!(freq, expected);

    let rest = search::compile("t=foobar")
        .tag_frequencies(lib.store(), None, 3)
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].tag, "other");
}

#[test]
fn test_helper_searches_round_trip() {
    let lib = Library::new();
    let tag = "it's a \"quoted\" (tag)";
    let id = lib.add_tagged(&[tag]);
    lib.add_tagged(&["it's a"]);

    assert_matches(&lib, &search::single_tag_search(tag), &[&id]);

    let dir = lib.root().join("my films");
    let in_dir = lib.write("my films/clip.ext", b"clip bytes");
    let clip = lib.resolver().resolve(&in_dir, 10, 1).unwrap();
    assert_matches(&lib, &search::path_search(dir.to_str().unwrap()), &[&clip]);
}

#[test]
fn test_missing_files_never_returned() {
    let lib = Library::new();
    let id = lib.add_file("vanishing", &["gone"]);
    let path = lib.store().live_paths_for_id(&id).unwrap()[0].clone();
    std::fs::remove_file(&path).unwrap();

    assert_matches(&lib, "t=gone", &[&id]);
    mediadex::Cleaner::new(lib.store()).mark_missing_files().unwrap();
    assert_matches(&lib, "t=gone", &[]);
}
