//! Signal delivery through the tree

use super::*;
use crate::object::{Behavior, ConnectFlags, DisconnectMode, ScriptedBehavior, TreeCommand};
use crate::scene::{FailureOrigin, SceneError};

/// Node with `fire(Int)` declared and handlers `a`, `b`, `c` that trace their calls
fn listener(tree: &mut SceneTree, name: &str, seen: &Trace) -> NodeId {
    let mut behavior = ScriptedBehavior::new("listener");
    for method in ["a", "b", "c"] {
        let seen = Arc::clone(seen);
        behavior = behavior.with_method(method, move |scope, args| {
            seen.lock().unwrap().push(format!("{}.{method}{args:?}", scope.base().name()));
            Ok(Value::Nil)
        });
    }
    let id = tree.create_with_behavior("Node", name, Box::new(behavior)).unwrap();
    let root = tree.root();
    tree.attach(root, id).unwrap();
    id
}

fn emitter(tree: &mut SceneTree) -> NodeId {
    let id = tree
        .create_with_behavior(
            "Node",
            "Emitter",
            Box::new(
                ScriptedBehavior::new("emitter")
                    .with_signal(SignalDescriptor::new("fire").with_param("power", ValueKind::Int)),
            ),
        )
        .unwrap();
    let root = tree.root();
    tree.attach(root, id).unwrap();
    id
}

#[test]
fn test_handlers_run_in_connection_order() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);
    let y = listener(&mut tree, "Y", &seen);

    tree.connect(source, "fire", y, "b", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", x, "a", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", x, "c", ConnectFlags::empty()).unwrap();

    let report = tree.emit_signal(source, "fire", vec![Value::Int(7)]).unwrap();
    assert!(report.is_clean());
    assert_eq!(lines(&seen), vec!["Y.b[Int(7)]", "X.a[Int(7)]", "X.c[Int(7)]"]);
}

#[test]
fn test_connect_rejects_unknown_and_duplicate() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);

    assert!(matches!(
        tree.connect(source, "explode", x, "a", ConnectFlags::empty()),
        Err(SceneError::Object(ObjectError::UnknownSignal { .. }))
    ));
    tree.connect(source, "fire", x, "a", ConnectFlags::empty()).unwrap();
    assert!(matches!(
        tree.connect(source, "fire", x, "a", ConnectFlags::empty()),
        Err(SceneError::Object(ObjectError::DuplicateConnection { .. }))
    ));

    tree.connect(source, "fire", x, "a", ConnectFlags::ALLOW_DUPLICATES).unwrap();
    tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    assert_eq!(lines(&seen).len(), 2);
}

#[test]
fn test_disconnect_modes() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);

    assert!(!tree.disconnect(source, "fire", x, "a", DisconnectMode::Lenient).unwrap());
    assert!(matches!(
        tree.disconnect(source, "fire", x, "a", DisconnectMode::Strict),
        Err(SceneError::Object(ObjectError::NotConnected { .. }))
    ));

    tree.connect(source, "fire", x, "a", ConnectFlags::empty()).unwrap();
    assert!(tree.is_connected(source, "fire", x, "a").unwrap());
    assert!(tree.disconnect(source, "fire", x, "a", DisconnectMode::Strict).unwrap());
    assert!(!tree.is_connected(source, "fire", x, "a").unwrap());
    tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    assert!(lines(&seen).is_empty());
}

#[test]
fn test_self_disconnect_during_emission_runs_once() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);

    let once_seen = Arc::clone(&seen);
    let once = tree
        .create_with_behavior(
            "Node",
            "Once",
            Box::new(ScriptedBehavior::new("once").with_method("on_fire", move |scope, _| {
                once_seen.lock().unwrap().push("once".to_string());
                let me = scope.id();
                scope.request(TreeCommand::Disconnect {
                    source,
                    signal: "fire".to_string(),
                    target: me,
                    method: "on_fire".to_string(),
                });
                Ok(Value::Nil)
            })),
        )
        .unwrap();
    let later = listener(&mut tree, "Later", &seen);

    tree.connect(source, "fire", once, "on_fire", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", later, "a", ConnectFlags::empty()).unwrap();

    tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    tree.emit_signal(source, "fire", vec![Value::Int(2)]).unwrap();
    assert_eq!(lines(&seen), vec!["once", "Later.a[Int(1)]", "Later.a[Int(2)]"]);
    assert!(!tree.is_connected(source, "fire", once, "on_fire").unwrap());
}

#[test]
fn test_disconnecting_a_later_handler_keeps_current_pass() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let victim = listener(&mut tree, "Victim", &seen);

    let cutter = tree
        .create_with_behavior(
            "Node",
            "Cutter",
            Box::new(ScriptedBehavior::new("cutter").with_method("cut", move |scope, _| {
                scope.request(TreeCommand::Disconnect {
                    source,
                    signal: "fire".to_string(),
                    target: victim,
                    method: "a".to_string(),
                });
                Ok(Value::Nil)
            })),
        )
        .unwrap();

    tree.connect(source, "fire", cutter, "cut", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", victim, "a", ConnectFlags::empty()).unwrap();

    tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    tree.emit_signal(source, "fire", vec![Value::Int(2)]).unwrap();
    assert_eq!(lines(&seen), vec!["Victim.a[Int(1)]"]);
}

#[test]
fn test_one_shot_connection() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);

    tree.connect(source, "fire", x, "a", ConnectFlags::ONE_SHOT).unwrap();
    tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    tree.emit_signal(source, "fire", vec![Value::Int(2)]).unwrap();
    assert_eq!(lines(&seen), vec!["X.a[Int(1)]"]);
    assert!(!tree.is_connected(source, "fire", x, "a").unwrap());
}

#[test]
fn test_deferred_connection_runs_after_immediate_handlers() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);
    let y = listener(&mut tree, "Y", &seen);

    tree.connect(source, "fire", x, "a", ConnectFlags::DEFERRED).unwrap();
    tree.connect(source, "fire", y, "b", ConnectFlags::empty()).unwrap();

    tree.emit_signal(source, "fire", vec![Value::Int(3)]).unwrap();
    assert_eq!(lines(&seen), vec!["Y.b[Int(3)]", "X.a[Int(3)]"]);
    assert_eq!(tree.pending_deferred(), 0);
}

#[test]
fn test_destroyed_target_connections_are_purged() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let x = listener(&mut tree, "X", &seen);

    tree.connect(source, "fire", x, "a", ConnectFlags::empty()).unwrap();
    tree.free(x).unwrap();

    let report = tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    assert!(report.is_clean());
    assert!(lines(&seen).is_empty());
    assert_eq!(tree.object(source).unwrap().base().signals().connection_count(), 0);
    assert!(matches!(
        tree.connect(source, "fire", x, "a", ConnectFlags::empty()),
        Err(SceneError::StaleReference(_))
    ));
}

#[test]
fn test_emission_argument_schema() {
    let mut tree = tree();
    let source = emitter(&mut tree);

    assert!(matches!(
        tree.emit_signal(source, "fire", vec![Value::from("hot")]),
        Err(SceneError::Object(ObjectError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        tree.emit_signal(source, "fire", Vec::new()),
        Err(SceneError::Object(ObjectError::ArgumentCount { expected: 1, found: 0, .. }))
    ));
    assert!(matches!(
        tree.emit_signal(source, "missing", Vec::new()),
        Err(SceneError::Object(ObjectError::UnknownSignal { .. }))
    ));
}

#[test]
fn test_failing_handler_is_reported_and_others_still_run() {
    let mut tree = tree();
    let seen = trace();
    let source = emitter(&mut tree);
    let broken = tree
        .create_with_behavior(
            "Node",
            "Broken",
            Box::new(ScriptedBehavior::new("broken").with_method("boom", |_, _| {
                Err(ObjectError::Handler("boom".to_string()))
            })),
        )
        .unwrap();
    let x = listener(&mut tree, "X", &seen);

    tree.connect(source, "fire", broken, "boom", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", x, "a", ConnectFlags::empty()).unwrap();
    tree.connect(source, "fire", x, "missing", ConnectFlags::empty()).unwrap();

    let report = tree.emit_signal(source, "fire", vec![Value::Int(1)]).unwrap();
    assert_eq!(lines(&seen), vec!["X.a[Int(1)]"]);
    assert_eq!(report.len(), 2);
    assert!(matches!(
        &report.failures()[0].origin,
        FailureOrigin::Signal { signal, method } if signal == "fire" && method == "boom"
    ));
    assert_eq!(report.failures_of(x).count(), 1);
}

#[test]
fn test_builtin_ready_signal_fires_on_attach() {
    let mut tree = tree();
    let seen = trace();
    let watcher = listener(&mut tree, "Watcher", &seen);
    let node = tree.create("Actor", "Ship").unwrap();

    tree.connect(node, "ready", watcher, "a", ConnectFlags::empty()).unwrap();
    tree.connect(node, "tree_entered", watcher, "b", ConnectFlags::empty()).unwrap();
    let root = tree.root();
    tree.attach(root, node).unwrap();
    assert_eq!(lines(&seen), vec!["Watcher.b[]", "Watcher.a[]"]);

    // renaming through the registry setter announces itself
    tree.connect(node, "renamed", watcher, "c", ConnectFlags::empty()).unwrap();
    tree.set(node, "name", "Cruiser").unwrap();
    assert_eq!(tree.name(node).unwrap(), "Cruiser");
    assert_eq!(lines(&seen).last().map(String::as_str), Some("Watcher.c[]"));
}

#[test]
fn test_rename_collision_announces_final_name_once() {
    let mut tree = tree();
    let seen = trace();
    let root = tree.root();
    let first = tree.create("Node", "A").unwrap();
    tree.attach(root, first).unwrap();

    let names = Arc::clone(&seen);
    let behavior = ScriptedBehavior::new("self_watcher").with_method("log_name", move |scope, _| {
        names.lock().unwrap().push(scope.base().name().to_string());
        Ok(Value::Nil)
    });
    let second = tree.create_with_behavior("Node", "B", Box::new(behavior)).unwrap();
    tree.attach(root, second).unwrap();
    tree.connect(second, "renamed", second, "log_name", ConnectFlags::empty()).unwrap();

    tree.set(second, "name", "A").unwrap();
    assert_eq!(tree.name(first).unwrap(), "A");
    assert_eq!(tree.name(second).unwrap(), "A2");
    assert_eq!(lines(&seen), vec!["A2"]);
}

#[test]
fn test_removed_behavior_takes_its_subscriptions() {
    let mut tree = tree();
    let seen = trace();
    let x = listener(&mut tree, "X", &seen);
    let hitter = || -> Box<dyn Behavior> {
        Box::new(ScriptedBehavior::new("hitter").with_signal(SignalDescriptor::new("hit")))
    };
    let source = tree.create_with_behavior("Node", "Source", hitter()).unwrap();

    tree.connect(source, "hit", x, "a", ConnectFlags::empty()).unwrap();
    tree.connect(source, "ready", x, "b", ConnectFlags::empty()).unwrap();
    tree.set_behavior(source, None).unwrap();
    assert!(!tree.is_connected(source, "hit", x, "a").unwrap());
    assert!(tree.is_connected(source, "ready", x, "b").unwrap());

    // a later behavior declaring the same signal starts without subscribers
    tree.set_behavior(source, Some(hitter())).unwrap();
    assert!(!tree.is_connected(source, "hit", x, "a").unwrap());
    tree.emit_signal(source, "hit", Vec::new()).unwrap();
    assert!(lines(&seen).is_empty());
}

#[test]
fn test_signal_from_native_method() {
    let mut tree = tree();
    let seen = trace();
    let actor = tree.create("Actor", "Ship").unwrap();
    let x = listener(&mut tree, "X", &seen);

    tree.connect(actor, "hurt", x, "a", ConnectFlags::empty()).unwrap();
    tree.call(actor, "hurt", &[Value::Int(4)]).unwrap();
    assert_eq!(lines(&seen), vec!["X.a[Int(4)]"]);
}
