use serde_json::{Value, json};
use stowage::CacheError;
use stowage::service::StorageAdapterFactory;
use stowage::storage::{DataType, DataTypeSupport, Storage};

fn assertion_message(configuration: Value) -> String {
    StorageAdapterFactory::default()
        .assert_valid_configuration_structure(&configuration)
        .expect_err("configuration should be rejected")
        .to_string()
}

#[test]
fn structural_errors_are_reported_in_order() {
    insta::assert_snapshot!(assertion_message(json!({})), @"Configuration must be a non-empty array");
    insta::assert_snapshot!(assertion_message(json!(null)), @"Configuration must be a non-empty array");
    insta::assert_snapshot!(assertion_message(json!({ "options": {} })), @r#"Configuration must contain a "adapter" key"#);
    insta::assert_snapshot!(assertion_message(json!({ "adapter": "" })), @r#"Storage "adapter" has to be a non-empty string"#);
    insta::assert_snapshot!(assertion_message(json!({ "adapter": ["Memory"] })), @r#"Storage "adapter" has to be a non-empty string"#);
    insta::assert_snapshot!(
        assertion_message(json!({ "adapter": "foo", "options": "bar" })),
        @r#"Storage "options" must be an array with string keys"#
    );
    insta::assert_snapshot!(
        assertion_message(json!({ "adapter": "foo", "plugins": ["bar"] })),
        @"All plugin configurations are expected to be an array"
    );
    insta::assert_snapshot!(
        assertion_message(json!({ "adapter": "foo", "plugins": { "name": "bar" } })),
        @r#"Storage "plugins" must be a list of plugin configurations"#
    );
}

#[test]
fn adapter_check_precedes_options_and_plugin_checks() {
    insta::assert_snapshot!(
        assertion_message(json!({ "adapter": "", "options": 1, "plugins": [1] })),
        @r#"Storage "adapter" has to be a non-empty string"#
    );
    insta::assert_snapshot!(
        assertion_message(json!({ "adapter": "foo", "options": 1, "plugins": [1] })),
        @r#"Storage "options" must be an array with string keys"#
    );
}

#[test]
fn plugin_errors_are_wrapped_with_the_adapter_name() {
    insta::assert_snapshot!(
        assertion_message(json!({
            "adapter": "Memory",
            "plugins": [{ "name": "Serializer" }, { "options": {} }]
        })),
        @r#"Plugin configuration for adapter "Memory" is invalid: Configuration must contain a "name" key"#
    );
    insta::assert_snapshot!(
        assertion_message(json!({
            "adapter": "Memory",
            "plugins": [{ "name": "Serializer", "options": "pretty" }]
        })),
        @r#"Plugin configuration for adapter "Memory" is invalid: Plugin "options" must be an array with string keys"#
    );
    insta::assert_snapshot!(
        assertion_message(json!({
            "adapter": "Memory",
            "plugins": [{ "name": "Serializer", "priority": "high" }]
        })),
        @r#"Plugin configuration for adapter "Memory" is invalid: Plugin priority has to be integer"#
    );
}

#[test]
fn every_structural_error_is_invalid_configuration() {
    let err = StorageAdapterFactory::default()
        .create_from_array_configuration(&json!({ "adapter": "" }))
        .err()
        .expect("empty adapter");
    assert!(err.is_invalid_configuration());
}

#[test]
fn validated_configurations_build() {
    let factory = StorageAdapterFactory::default();
    let configurations = [
        json!({ "adapter": "Memory" }),
        json!({ "adapter": "memory", "options": null, "plugins": [] }),
        json!({ "adapter": "BlackHole", "plugins": [{ "name": "Serializer" }] }),
        json!({
            "adapter": "Memory",
            "options": { "ttl": 120, "namespace": "app" },
            "plugins": [
                { "name": "Serializer", "priority": 10 },
                { "name": "ClearExpiredByFactor", "options": { "clearing_factor": 100 } }
            ]
        }),
    ];

    for configuration in configurations {
        factory
            .assert_valid_configuration_structure(&configuration)
            .expect("structurally valid");
        if let Err(err) = factory.create_from_array_configuration(&configuration) {
            panic!("{configuration} should build: {err}");
        }
    }
}

#[test]
fn registry_misses_are_distinguished() {
    let factory = StorageAdapterFactory::default();

    let err = factory
        .create_from_array_configuration(&json!({ "adapter": "Redis" }))
        .err()
        .expect("unknown adapter");
    assert!(matches!(err, CacheError::BackendNotFound { .. }));

    let err = factory
        .create_from_array_configuration(&json!({
            "adapter": "Memory",
            "plugins": [{ "name": "Compression" }]
        }))
        .err()
        .expect("unknown plugin");
    assert!(matches!(err, CacheError::PluginNotFound { .. }));
}

#[test]
fn assembled_storage_round_trips_through_the_serializer() {
    let mut storage = StorageAdapterFactory::default()
        .create_from_array_configuration(&json!({
            "adapter": "Memory",
            "options": { "namespace": "app" },
            "plugins": [{ "name": "Serializer", "priority": 10 }]
        }))
        .expect("storage");

    let values = [
        json!(null),
        json!(true),
        json!(42),
        json!(-7),
        json!(2.5),
        json!("text"),
        json!([1, "two", null]),
        json!({ "nested": { "deep": [true, { "x": 1 }] } }),
    ];
    for (index, value) in values.iter().enumerate() {
        let key = format!("key{index}");
        assert!(storage.set_item(&key, value.clone()).expect("set"));
        assert_eq!(storage.get_item(&key).expect("get").as_ref(), Some(value));
    }

    let capabilities = storage.capabilities().expect("capabilities");
    assert_eq!(capabilities, storage.capabilities().expect("capabilities"));
    assert_eq!(
        capabilities.support_for(DataType::Object),
        DataTypeSupport::ConvertedTo(DataType::Object)
    );
    assert!(!capabilities.support_for(DataType::Resource).is_supported());
}

#[test]
fn optional_interfaces_survive_factory_assembly() {
    let mut storage = StorageAdapterFactory::default()
        .create_from_array_configuration(&json!({ "adapter": "Memory" }))
        .expect("storage");
    storage.set_item("user:1", json!(1)).expect("set");
    storage.set_item("post:1", json!(2)).expect("set");

    storage
        .as_clear_by_prefix()
        .expect("memory clears by prefix")
        .clear_by_prefix("user:")
        .expect("clear");
    assert_eq!(storage.has_items(&["user:1", "post:1"]).expect("has"), vec!["post:1"]);

    storage
        .as_flushable()
        .expect("memory flushes")
        .flush()
        .expect("flush");
    assert!(!storage.has_item("post:1").expect("has"));
}

#[test]
fn oversized_ttl_is_an_error_not_a_crash() {
    let err = StorageAdapterFactory::default()
        .create_from_array_configuration(&json!({
            "adapter": "Memory",
            "options": { "ttl": 1e30 }
        }))
        .err()
        .expect("ttl beyond duration range");
    assert!(matches!(err, CacheError::InvalidArgument { .. }));
}
