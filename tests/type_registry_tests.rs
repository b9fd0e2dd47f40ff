use stream_logfile::type_registry::{get_type_definition, register_type_definition};
use stream_logfile::{GlobalRegistry, MemoryRegistry, TypeRegistry};
use std::thread;

#[test]
fn test_type_registration() {
    register_type_definition("tests::Vector3d", "struct Vector3d { double x, y, z; }");
    assert_eq!(
        get_type_definition("tests::Vector3d").as_deref(),
        Some("struct Vector3d { double x, y, z; }")
    );
}

#[test]
fn test_reregistration_returns_previous() {
    assert_eq!(register_type_definition("tests::Replaced", "v1"), None);
    assert_eq!(
        register_type_definition("tests::Replaced", "v2").as_deref(),
        Some("v1")
    );
    assert_eq!(get_type_definition("tests::Replaced").as_deref(), Some("v2"));
}

#[test]
fn test_unknown_type() {
    assert!(get_type_definition("tests::NeverRegistered").is_none());
    assert!(GlobalRegistry.type_definition("tests::NeverRegistered").is_none());
}

#[test]
fn test_concurrent_registration() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                register_type_definition(format!("tests::Concurrent{}", i), format!("def {}", i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        assert_eq!(
            get_type_definition(&format!("tests::Concurrent{}", i)),
            Some(format!("def {}", i))
        );
    }
}

#[test]
fn test_registries_behind_trait_objects() {
    let mut memory = MemoryRegistry::new();
    memory.insert("tests::Local", "local");
    register_type_definition("tests::Global", "global");

    let registries: [&dyn TypeRegistry; 2] = [&memory, &GlobalRegistry];
    assert_eq!(registries[0].type_definition("tests::Local").as_deref(), Some("local"));
    assert_eq!(registries[1].type_definition("tests::Global").as_deref(), Some("global"));
    assert!(registries[0].type_definition("tests::Global").is_none());
}
