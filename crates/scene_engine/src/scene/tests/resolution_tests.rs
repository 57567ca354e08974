//! Member resolution through the tree: precedence, fallbacks, side effects

use super::*;
use crate::meta::PropertyUsage;
use crate::object::{ConnectFlags, ScriptedBehavior};
use crate::scene::SceneError;

#[test]
fn test_behavior_beats_registry_beats_generic() {
    let mut tree = tree();
    let actor = tree.create("Actor", "Ship").unwrap();

    // registry entry wins over the type's generic fallback
    assert_eq!(tree.get(actor, "speed").unwrap(), Value::Float(1.0));

    tree.set_behavior(actor, Some(Box::new(ScriptedBehavior::new("turbo").with_var("speed", 40.0))))
        .unwrap();
    assert_eq!(tree.get(actor, "speed").unwrap(), Value::Float(40.0));

    tree.set(actor, "speed", 55.0).unwrap();
    assert_eq!(tree.get(actor, "speed").unwrap(), Value::Float(55.0));
    assert!(tree.object(actor).unwrap().base().stored("speed").is_none());

    // removing the layer exposes the registry again
    tree.set_behavior(actor, None).unwrap();
    assert_eq!(tree.get(actor, "speed").unwrap(), Value::Float(1.0));
}

#[test]
fn test_generic_fallback_serves_path_keys() {
    let mut tree = tree();
    let actor = tree.create("Actor", "Ship").unwrap();

    assert_eq!(tree.get(actor, "echo/hello").unwrap(), Value::from("hello"));
    tree.set(actor, "echo/flag", true).unwrap();
    assert_eq!(tree.object(actor).unwrap().base().meta("flag"), Some(&Value::Bool(true)));

    // Node's own fallback still answers further up the chain
    tree.set(actor, "metadata/team", "red").unwrap();
    assert_eq!(tree.get(actor, "metadata/team").unwrap(), Value::from("red"));
}

#[test]
fn test_behavior_generic_runs_before_type_generic() {
    let mut tree = tree();
    let actor = tree
        .create_with_behavior(
            "Actor",
            "Ship",
            Box::new(ScriptedBehavior::new("echoes").with_generic_get(|_, _, name| {
                name.starts_with("echo/").then(|| Value::from("from behavior"))
            })),
        )
        .unwrap();

    assert_eq!(tree.get(actor, "echo/x").unwrap(), Value::from("from behavior"));
    assert_eq!(tree.get(actor, "speed").unwrap(), Value::Float(1.0));
}

#[test]
fn test_unknown_member_surfaces_as_typed_error() {
    let mut tree = tree();
    let node = tree.create("Node", "Plain").unwrap();

    assert!(matches!(
        tree.get(node, "health"),
        Err(SceneError::Object(ObjectError::UnknownMember { ref member, .. })) if member == "health"
    ));
    assert!(matches!(tree.set(node, "health", 3), Err(SceneError::Object(ObjectError::UnknownMember { .. }))));
    assert!(matches!(tree.call(node, "jump", &[]), Err(SceneError::Object(ObjectError::UnknownMember { .. }))));
}

#[test]
fn test_typed_properties_and_methods() {
    let mut tree = tree();
    let actor = tree.create("Actor", "Ship").unwrap();
    let other = tree.create("Node", "Other").unwrap();

    tree.set(actor, "target", other).unwrap();
    assert_eq!(tree.get(actor, "target").unwrap(), Value::Node(other));
    assert!(matches!(
        tree.set(actor, "target", "Other"),
        Err(SceneError::Object(ObjectError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        tree.call(actor, "hurt", &[Value::from("lots")]),
        Err(SceneError::Object(ObjectError::TypeMismatch { .. }))
    ));
    assert_eq!(tree.call(actor, "get_name", &[]).unwrap(), Value::from("Ship"));
    assert_eq!(tree.call(actor, "is_inside_tree", &[]).unwrap(), Value::Bool(false));
}

#[test]
fn test_setter_side_effects_reach_other_nodes() {
    let mut tree = tree();
    let root = tree.root();
    let seen = trace();

    let health = ScriptedBehavior::new("health")
        .with_export("hp", 3)
        .with_signal(SignalDescriptor::new("died"))
        .with_setter("hp", |scope, value| {
            scope.set_var("hp", value.clone())?;
            if value.as_int() == Some(0) {
                scope.emit("died", Vec::new())?;
            }
            Ok(())
        });
    let player = tree.create_with_behavior("Node", "Player", Box::new(health)).unwrap();

    let hud_seen = Arc::clone(&seen);
    let hud = tree
        .create_with_behavior(
            "Node",
            "Hud",
            Box::new(ScriptedBehavior::new("hud").with_method("on_player_died", move |scope, _| {
                hud_seen.lock().unwrap().push(format!("{} saw death", scope.base().name()));
                Ok(Value::Nil)
            })),
        )
        .unwrap();
    tree.attach(root, player).unwrap();
    tree.attach(root, hud).unwrap();
    tree.connect(player, "died", hud, "on_player_died", ConnectFlags::empty()).unwrap();

    tree.set(player, "hp", 1).unwrap();
    assert!(lines(&seen).is_empty());
    tree.set(player, "hp", 0).unwrap();
    assert_eq!(lines(&seen), vec!["Hud saw death"]);
    assert!(matches!(
        tree.set(player, "hp", "zero"),
        Err(SceneError::Object(ObjectError::TypeMismatch { .. }))
    ));
}

#[test]
fn test_introspection() {
    let mut tree = tree();
    let actor = tree
        .create_with_behavior(
            "Actor",
            "Ship",
            Box::new(
                ScriptedBehavior::new("ship")
                    .with_export("fuel", 10)
                    .with_method("refuel", |scope, _| {
                        scope.set_var("fuel", 10)?;
                        Ok(Value::Nil)
                    })
                    .with_signal(SignalDescriptor::new("empty"))
                    .with_warning(|vars, _| match vars.get("fuel") {
                        Some(Value::Int(0)) => "ship has no fuel".to_string(),
                        _ => String::new(),
                    }),
            ),
        )
        .unwrap();

    let list = tree.property_list(actor).unwrap();
    assert_eq!(list[0].name, "fuel");
    assert_eq!(list[0].origin, "ship");
    assert!(list[0].usage.contains(PropertyUsage::EXPORTED));
    assert!(list.iter().any(|p| p.name == "speed" && p.origin == "Actor"));
    assert!(list.iter().any(|p| p.name == "name" && p.origin == "Node"));

    assert!(tree.has_method(actor, "refuel").unwrap());
    assert!(tree.has_method(actor, "hurt").unwrap());
    assert!(tree.has_method(actor, "get_child_count").unwrap());
    assert!(!tree.has_method(actor, "fly").unwrap());
    assert!(tree.has_signal(actor, "empty").unwrap());
    assert!(tree.has_signal(actor, "ready").unwrap());
    assert!(tree.is_class(actor, "Node").unwrap());
    assert!(tree.is_class(actor, "Object").unwrap());
    assert!(!tree.is_class(actor, "Camera").unwrap());

    assert_eq!(tree.configuration_warning(actor).unwrap(), "");
    tree.set(actor, "fuel", 0).unwrap();
    assert_eq!(tree.configuration_warning(actor).unwrap(), "ship has no fuel");
    tree.call(actor, "refuel", &[]).unwrap();
    assert_eq!(tree.configuration_warning(actor).unwrap(), "");
}

#[test]
fn test_services_reachable_from_handlers() {
    use crate::object::Services;

    struct Difficulty(i64);

    let services = Services::new().with(Difficulty(3));
    let mut tree = SceneTree::with_services(registry(), SceneConfig::default(), services).unwrap();
    let node = tree
        .create_with_behavior(
            "Node",
            "Spawner",
            Box::new(ScriptedBehavior::new("spawner").with_method("difficulty", |scope, _| {
                let level = scope.base().services().get::<Difficulty>().map_or(0, |d| d.0);
                Ok(Value::Int(level))
            })),
        )
        .unwrap();

    assert_eq!(tree.call(node, "difficulty", &[]).unwrap(), Value::Int(3));
    assert!(tree.services().contains::<crate::assets::ResourceLoader>());
}
