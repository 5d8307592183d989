//! Whole-database properties: write/read round trips, merge semantics, and
//! lazy module loading.

use scry_core::{
    Database, DbError, ElementIndex, ElementRecord, FunctionIndex, FunctionRecord, ManifestIndex,
    ManifestRecord, ModuleDef, SearchPath, TypeIndex, TypeRecord, WrapperIndex, WrapperParameter,
    WrapperRecord,
};

/// Build a small but representative database: one class with one method
/// wrapper, one atomic return type, one manifest, one element.
fn sample_database() -> Database {
    let mut db = Database::new();

    db.add_type(
        TypeIndex(1),
        TypeRecord {
            flags: TypeRecord::F_GLOBAL | TypeRecord::F_FULLY_DEFINED | TypeRecord::F_CLASS,
            name: "Foo".to_string(),
            scoped_name: "Foo".to_string(),
            true_name: "Foo".to_string(),
            methods: vec![FunctionIndex(3)],
            elements: vec![ElementIndex(6)],
            ..TypeRecord::default()
        },
    )
    .unwrap();

    db.add_type(
        TypeIndex(2),
        TypeRecord {
            flags: TypeRecord::F_FULLY_DEFINED | TypeRecord::F_ATOMIC,
            name: "int".to_string(),
            scoped_name: "int".to_string(),
            true_name: "int".to_string(),
            atomic_kind: scry_core::AtomicKind::Int,
            ..TypeRecord::default()
        },
    )
    .unwrap();

    db.add_function(
        FunctionIndex(3),
        FunctionRecord {
            flags: FunctionRecord::F_METHOD,
            name: "bar".to_string(),
            scoped_name: "Foo::bar".to_string(),
            class_type: TypeIndex(1),
            wrappers: vec![WrapperIndex(4)],
            ..FunctionRecord::default()
        },
    )
    .unwrap();

    db.add_wrapper(
        WrapperIndex(4),
        WrapperRecord {
            flags: WrapperRecord::F_HAS_RETURN | WrapperRecord::F_CALLABLE_BY_NAME,
            function: FunctionIndex(3),
            return_type: TypeIndex(2),
            unique_name: "ABCDxyz123".to_string(),
            parameters: vec![WrapperParameter {
                flags: WrapperParameter::PF_IS_THIS,
                param_type: TypeIndex(1),
                name: String::new(),
            }],
            ..WrapperRecord::default()
        },
    )
    .unwrap();

    db.add_manifest(
        ManifestIndex(5),
        ManifestRecord {
            flags: ManifestRecord::F_HAS_INT_VALUE,
            name: "FOO_VERSION".to_string(),
            definition: "3".to_string(),
            int_value: 3,
            ..ManifestRecord::default()
        },
    )
    .unwrap();

    db.add_element(
        ElementIndex(6),
        ElementRecord {
            flags: ElementRecord::F_HAS_GETTER,
            name: "value".to_string(),
            scoped_name: "Foo::value".to_string(),
            element_type: TypeIndex(2),
            getter: FunctionIndex(3),
            ..ElementRecord::default()
        },
    )
    .unwrap();

    db
}

fn module_def() -> ModuleDef {
    ModuleDef {
        library_name: "libfoo".to_string(),
        library_hash_name: "ABCD".to_string(),
        module_name: "foo".to_string(),
        file_identifier: 1234567,
        ..ModuleDef::default()
    }
}

#[test]
fn write_then_read_reproduces_every_record() {
    let db = sample_database();
    let text = db.write(&module_def());

    let mut fresh = Database::new();
    let mut def = ModuleDef::default();
    fresh.read(&text, &mut def).unwrap();

    // The module definition came back from the file.
    assert_eq!(def.library_name, "libfoo");
    assert_eq!(def.library_hash_name, "ABCD");
    assert_eq!(def.file_identifier, 1234567);
    assert_eq!(fresh.get_file_major_version(), 2);
    assert_eq!(fresh.get_file_minor_version(), 2);

    // Record counts survive.
    assert_eq!(fresh.get_num_all_types(), 2);
    assert_eq!(fresh.get_num_all_functions(), 1);
    assert_eq!(fresh.get_num_global_manifests(), 1);

    // Structure survives, modulo the remap onto the fresh database's
    // range: the wrapper's cross-references still resolve to the same
    // names as in the source database.
    let class_index = fresh.lookup_type_by_true_name("Foo");
    assert!(!class_index.is_none());
    let class_record = fresh.get_type(class_index).clone();
    assert!(class_record.is_fully_defined());
    assert_eq!(class_record.methods.len(), 1);

    let method = fresh.get_function(class_record.methods[0]).clone();
    assert_eq!(method.scoped_name, "Foo::bar");
    assert_eq!(method.class_type, class_index);

    let wrapper = fresh.get_wrapper(method.wrappers[0]).clone();
    assert!(wrapper.has_return_value());
    assert_eq!(wrapper.unique_name, "ABCDxyz123");
    assert_eq!(fresh.get_type(wrapper.return_type).name, "int");
    assert!(wrapper.parameter_is_this(0));
    assert_eq!(
        fresh.get_type(wrapper.parameters[0].param_type).name,
        "Foo"
    );
}

#[test]
fn merge_with_self_unifies_types_by_true_name() {
    let mut db = sample_database();
    let num_types_before = db.get_num_all_types();

    // Round-trip through the wire format to get an identical database in a
    // fresh, non-overlapping index range.
    let text = db.write(&module_def());
    let mut incoming = Database::new();
    incoming.remap_indices(1000);
    let mut def = ModuleDef::default();
    incoming.read(&text, &mut def).unwrap();
    incoming.remap_indices(1000);

    db.merge_from(incoming).unwrap();

    // Type records were unified by true name: no duplicates.
    assert_eq!(db.get_num_all_types(), num_types_before);

    // Non-type records are intentionally duplicated, never unified; the
    // unified class record references both copies of its method.
    assert_eq!(db.get_num_all_functions(), 2);
    let foo = db.lookup_type_by_true_name("Foo");
    let foo_record = db.get_type(foo).clone();
    assert_eq!(foo_record.methods.len(), 2);
}

#[test]
fn remap_keeps_names_reachable_through_new_indices() {
    let mut db = sample_database();
    db.remap_indices(1000);

    for (_, wrapper) in db.wrappers().map(|(i, w)| (i, w.clone())).collect::<Vec<_>>() {
        assert_eq!(db.get_type(wrapper.return_type).name, "int");
        for param in &wrapper.parameters {
            if param.is_this() {
                assert_eq!(db.get_type(param.param_type).name, "Foo");
            }
        }
    }
}

#[test]
fn stale_module_file_is_reported_out_of_date() {
    let db = sample_database();
    let text = db.write(&module_def());

    // A def claiming a reserved range the file's contents don't fill.
    let mut reader = Database::new();
    let mut def = ModuleDef {
        first_index: 1,
        next_index: 3, // file actually holds 6 records
        ..ModuleDef::default()
    };
    let err = reader.read(&text, &mut def).unwrap_err();
    assert!(matches!(err, DbError::ModuleOutOfDate { .. }));
}

#[test]
fn requested_module_file_loads_lazily_on_first_query() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("libfoo.in");
    sample_database().write_file(&db_path, &module_def()).unwrap();

    let mut db = Database::new();
    let mut path = SearchPath::new();
    path.append_directory(dir.path());
    db.set_search_path(path);
    db.request_database("libfoo.in");

    // The file is only read when a query needs it; this query sees its
    // contents.
    let foo = db.lookup_type_by_true_name("Foo");
    assert!(!foo.is_none());
    assert!(db.get_type(foo).is_fully_defined());
}
