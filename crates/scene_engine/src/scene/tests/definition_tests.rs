//! Instantiating and packing declarative definitions

use super::*;
use crate::assets::ResourceLoader;
use crate::core::config::ResourceConfig;
use crate::scene::Notification::{EnterTree, Parented, Ready};
use crate::scene::{BehaviorFactory, DefinitionError, NodeDefinition, SceneDefinition, SceneError};

const LEVEL: &str = r#"(
    nodes: [
        (name: "Level", type_name: "Node", behavior: Some("recorder")),
        (name: "Player", type_name: "Actor", parent: Some(0), behavior: Some("player"),
         properties: { "hp": Int(3), "speed": Float(2.5) }),
        (name: "Camera", type_name: "Node", parent: Some(1), behavior: Some("recorder")),
    ],
)"#;

/// `player` exports `hp` (code default 10) and traces what it sees at `READY`
fn factory(log: &EventLog, seen: &Trace) -> BehaviorFactory {
    let seen = Arc::clone(seen);
    let log_handle = Arc::clone(log);
    let player = ScriptedBehavior::new("player")
        .with_export("hp", 10)
        .on_notification(move |scope, what| {
            log_handle.lock().unwrap().push((scope.base().name().to_string(), what));
            if what == Ready {
                let hp = scope.var("hp").and_then(Value::as_int).unwrap_or_default();
                let speed = scope.base_get("speed")?;
                seen.lock().unwrap().push(format!("hp={hp} speed={speed:?}"));
            }
            Ok(())
        });

    let mut factory = BehaviorFactory::new();
    factory.register_prototype(recorder(log)).register_prototype(player);
    factory
}

#[test]
fn test_definition_values_override_code_defaults() {
    let mut tree = tree();
    let log = event_log();
    let seen = trace();
    let definition = SceneDefinition::from_ron_str(LEVEL).unwrap();

    let built = definition.instantiate(&mut tree, &factory(&log, &seen)).unwrap();
    assert!(built.report.is_clean());
    assert_eq!(built.nodes.len(), 3);
    let player = built.nodes[1];
    assert_eq!(tree.get(player, "hp").unwrap(), Value::Int(3));
    assert_eq!(tree.get(player, "speed").unwrap(), Value::Float(2.5));

    let root = tree.root();
    tree.attach(root, built.root).unwrap();
    assert_eq!(lines(&seen), vec!["hp=3 speed=Float(2.5)"]);
    assert_eq!(tree.get_path(built.nodes[2]).unwrap(), "/root/Level/Player/Camera");
}

#[test]
fn test_instantiated_subtree_stays_out_of_the_tree() {
    let mut tree = tree();
    let log = event_log();
    let seen = trace();
    let definition = SceneDefinition::from_ron_str(LEVEL).unwrap();

    let built = definition.instantiate(&mut tree, &factory(&log, &seen)).unwrap();
    assert!(receivers(&log, EnterTree).is_empty());
    assert!(receivers(&log, Ready).is_empty());
    assert_eq!(receivers(&log, Parented), vec!["Player", "Camera"]);
    assert!(!tree.is_inside_tree(built.root));

    clear(&log);
    let root = tree.root();
    tree.attach(root, built.root).unwrap();
    assert_eq!(receivers(&log, EnterTree), vec!["Level", "Player", "Camera"]);
    assert_eq!(receivers(&log, Ready), vec!["Camera", "Player", "Level"]);
}

#[test]
fn test_unknown_behavior_frees_partial_subtree() {
    let mut tree = tree();
    let before = tree.node_count();
    let definition = SceneDefinition::new()
        .with_node(NodeDefinition::new("Level", "Node"))
        .with_node(NodeDefinition::new("Ghost", "Node").with_parent(0).with_behavior("ghost"));

    let result = definition.instantiate(&mut tree, &BehaviorFactory::new());
    assert!(matches!(
        result,
        Err(SceneError::Definition(DefinitionError::UnknownBehavior(ref name))) if name == "ghost"
    ));
    assert_eq!(tree.node_count(), before);
}

#[test]
fn test_bad_property_frees_partial_subtree() {
    let mut tree = tree();
    let before = tree.node_count();
    let definition = SceneDefinition::new()
        .with_node(NodeDefinition::new("Level", "Node"))
        .with_node(NodeDefinition::new("Ship", "Actor").with_parent(0).with_property("speed", "fast"));

    assert!(matches!(
        definition.instantiate(&mut tree, &BehaviorFactory::new()),
        Err(SceneError::Object(ObjectError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        definition.clone().with_node(NodeDefinition::new("X", "Missing").with_parent(0))
            .instantiate(&mut tree, &BehaviorFactory::new()),
        Err(SceneError::UnknownType(_))
    ));
    assert_eq!(tree.node_count(), before);
}

#[test]
fn test_pack_records_exported_values() {
    let mut tree = tree();
    let log = event_log();
    let seen = trace();
    let factory = factory(&log, &seen);
    let built = SceneDefinition::from_ron_str(LEVEL)
        .unwrap()
        .instantiate(&mut tree, &factory)
        .unwrap();
    tree.set(built.nodes[1], "hp", 1).unwrap();
    tree.set(built.nodes[1], "target", built.nodes[2]).unwrap();

    let packed = SceneDefinition::pack(&tree, built.root).unwrap();
    assert_eq!(packed.nodes.len(), 3);
    let player = &packed.nodes[1];
    assert_eq!(player.parent, Some(0));
    assert_eq!(player.behavior.as_deref(), Some("player"));
    assert_eq!(player.properties["hp"], Value::Int(1));
    assert_eq!(player.properties["speed"], Value::Float(2.5));
    assert_eq!(player.properties["process_priority"], Value::Int(0));
    assert!(!player.properties.contains_key("target"));
    assert_eq!(packed.nodes[2].parent, Some(1));

    // the packed form rebuilds an equivalent subtree
    let again = packed.instantiate(&mut tree, &factory).unwrap();
    assert_eq!(tree.get(again.nodes[1], "hp").unwrap(), Value::Int(1));
    assert_eq!(SceneDefinition::pack(&tree, again.root).unwrap(), packed);
}

#[test]
fn test_definition_loaded_through_resource_loader() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("level.ron"), LEVEL).unwrap();

    let loader = ResourceLoader::new(ResourceConfig::new().with_search_paths([dir.path().to_string_lossy().into_owned()]));
    let mut tree = SceneTree::with_services(
        registry(),
        SceneConfig::default(),
        crate::object::Services::new().with(loader),
    )
    .unwrap();

    let loader = tree.services().get::<ResourceLoader>().unwrap();
    let definition = loader.load_eager::<SceneDefinition>("level.ron").unwrap();
    assert!(loader.is_cached("level.ron"));
    assert_eq!(definition.nodes[0].name, "Level");

    let log = event_log();
    let seen = trace();
    let built = definition.instantiate(&mut tree, &factory(&log, &seen)).unwrap();
    assert_eq!(tree.type_name(built.nodes[1]).unwrap(), "Actor");
}
