//! End-to-end pipeline tests: headers in, database file out, and back.

use std::fs;

use tempfile::TempDir;

use scry::cli::{run_merge, run_parse, run_show, ParseOptions};
use scry_core::{Database, DbError, ModuleDef, UniqueNameEntry, WrapperIndex};

fn write_header(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

fn parse_options(files: Vec<std::path::PathBuf>, output: Option<std::path::PathBuf>) -> ParseOptions {
    ParseOptions {
        files,
        include_dirs: Vec::new(),
        module_name: "demo".to_string(),
        library_name: "libdemo".to_string(),
        output,
        permissive: false,
        json: false,
    }
}

#[test]
fn parse_write_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let header = write_header(
        &dir,
        "demo.h",
        "class Foo {\npublic:\n  int bar(const char *s) const;\n};\n",
    );
    let db_path = dir.path().join("demo.in");

    let mut sink = Vec::new();
    let report = run_parse(
        &parse_options(vec![header], Some(db_path.clone())),
        &mut sink,
    )
    .unwrap();
    assert_eq!(report.files_parsed, 1);
    assert_eq!(report.files_failed, 0);

    // Read it back into a fresh database; the records are structurally
    // intact.
    let contents = fs::read_to_string(&db_path).unwrap();
    let mut db = Database::new();
    let mut def = ModuleDef::default();
    db.read(&contents, &mut def).unwrap();

    assert_eq!(def.library_name, "libdemo");
    assert_eq!(def.module_name, "demo");
    assert_eq!(db.get_num_global_types(), 1);

    let foo = db.lookup_type_by_true_name("Foo");
    let record = db.get_type(foo).clone();
    assert_eq!(record.methods.len(), 1);
    let bar = db.get_function(record.methods[0]).clone();
    let wrapper = db.get_wrapper(bar.wrappers[0]).clone();
    assert!(wrapper.has_return_value());
    assert!(wrapper.parameter_is_this(0));
    assert_eq!(db.get_type(wrapper.return_type).name, "int");
}

#[test]
fn merging_two_modules_unifies_shared_types() {
    let dir = TempDir::new().unwrap();
    // Both headers define the same Point class; each adds its own
    // function.
    let point = "class Point {\npublic:\n  int x;\n  int y;\n};\n";
    let a = write_header(
        &dir,
        "a.h",
        &format!("{}double length(Point p);\n", point),
    );
    let b = write_header(&dir, "b.h", &format!("{}Point origin();\n", point));

    let a_db = dir.path().join("a.in");
    let b_db = dir.path().join("b.in");
    let mut sink = Vec::new();
    run_parse(&parse_options(vec![a], Some(a_db.clone())), &mut sink).unwrap();
    run_parse(&parse_options(vec![b], Some(b_db.clone())), &mut sink).unwrap();

    let merged = dir.path().join("merged.in");
    run_merge(&[a_db, b_db], &merged, &mut sink).unwrap();

    let mut db = Database::new();
    let mut def = ModuleDef::default();
    db.read(&fs::read_to_string(&merged).unwrap(), &mut def)
        .unwrap();

    // One Point, unified by true name; both functions survive.
    let point_count = db
        .types()
        .filter(|(_, t)| t.true_name == "Point")
        .count();
    assert_eq!(point_count, 1);
    assert_eq!(db.get_num_global_functions(), 2);
}

#[test]
fn show_renders_every_section() {
    let dir = TempDir::new().unwrap();
    let header = write_header(
        &dir,
        "demo.h",
        "#define LIMIT 64\nenum Kind { PLAIN, FANCY };\nint describe(Kind k);\n",
    );
    let db_path = dir.path().join("demo.in");
    let mut sink = Vec::new();
    run_parse(&parse_options(vec![header], Some(db_path.clone())), &mut sink).unwrap();

    let mut shown = Vec::new();
    run_show(&db_path, &mut shown).unwrap();
    let text = String::from_utf8(shown).unwrap();
    assert!(text.contains("describe"));
    assert!(text.contains("Kind"));
    assert!(text.contains("LIMIT = 64"));
}

#[test]
fn unique_name_lookup_crosses_the_module_boundary() {
    // Scenario: a wrapper whose unique name is "ABCDxyz123" lives in the
    // module with library hash "ABCD" at offset 7.
    let mut db = Database::new();
    db.request_module(ModuleDef {
        library_name: "alpha".to_string(),
        library_hash_name: "ABCD".to_string(),
        first_index: 0,
        next_index: 20,
        unique_names: vec![UniqueNameEntry {
            name: "xyz123".to_string(),
            index_offset: 7,
        }],
        ..ModuleDef::default()
    });

    // The module range was re-based to [1, 21); offset 7 is index 8.
    assert_eq!(db.get_wrapper_by_unique_name("ABCDxyz123"), WrapperIndex(8));
    assert_eq!(
        db.get_wrapper_by_unique_name("ABCDmissing"),
        WrapperIndex::NONE
    );
    assert_eq!(
        db.get_wrapper_by_unique_name("NOPExyz123"),
        WrapperIndex::NONE
    );
}

#[test]
fn future_major_version_refuses_to_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.in");
    fs::write(&path, "0 \n3 0 \n0 0 0 \n0 \n0 \n0 \n0 \n0 \n").unwrap();

    let mut db = Database::new();
    let mut def = ModuleDef::default();
    let err = db
        .read(&fs::read_to_string(&path).unwrap(), &mut def)
        .unwrap_err();
    assert!(matches!(err, DbError::VersionMismatch { file_major: 3, .. }));
    assert_eq!(db.get_num_all_types(), 0);
    assert_eq!(db.get_num_all_functions(), 0);
}

#[test]
fn batch_counts_fatal_failures_but_keeps_going() {
    let dir = TempDir::new().unwrap();
    // The first header hits a strict-mode include failure; the second is
    // fine.
    let bad = write_header(&dir, "bad.h", "#include \"missing.h\"\nint lost;\n");
    let good = write_header(&dir, "good.h", "int kept;\n");

    let mut sink = Vec::new();
    let report = run_parse(&parse_options(vec![bad, good], None), &mut sink).unwrap();
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_parsed, 1);
    assert!(report.failed());
}
