//! Lifecycle demo application
//!
//! Builds a small arena from a RON definition, wires signals between nodes
//! and walks through the lifecycle: attach, ready, damage, deferred free and
//! shutdown. Run with `RUST_LOG=debug` to see every notification.

use scene_engine::meta::RegistryError;
use scene_engine::prelude::*;
use thiserror::Error;

const ARENA: &str = r#"(
    nodes: [
        (name: "Arena", type_name: "Node", behavior: Some("announcer")),
        (name: "Turret", type_name: "Turret", parent: Some(0), properties: { "range": Float(25.0) }),
        (name: "Ship", type_name: "Node", parent: Some(0), behavior: Some("health"),
         properties: { "hp": Int(2) }),
        (name: "Ship", type_name: "Node", parent: Some(0), behavior: Some("health")),
    ],
)"#;

const MAX_VOLLEYS: usize = 10;

/// Demo failures
#[derive(Error, Debug)]
pub enum DemoError {
    /// Type registration failed
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Scene operation failed
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Registry with the core types plus a `Turret`
fn build_registry() -> Result<Arc<TypeRegistry>, DemoError> {
    let mut builder = TypeRegistryBuilder::with_core_types()?;
    builder.define(
        ClassDef::new("Turret", Some("Node"))
            .with_property(PropertyDescriptor::new("range", 10.0).exported())
            .with_method(
                MethodDescriptor::new("fire", |base, args| {
                    base.emit_signal("fired", args.to_vec())?;
                    Ok(Value::Nil)
                })
                .with_param("target", ValueKind::Node),
            )
            .with_signal(SignalDescriptor::new("fired").with_param("target", ValueKind::Node)),
    )?;
    Ok(Arc::new(builder.build()?))
}

/// `health`: exported hit points; at zero emits `died` and frees itself once the tree is idle
fn behaviors() -> BehaviorFactory {
    let health = ScriptedBehavior::new("health")
        .with_export("hp", 3)
        .with_signal(SignalDescriptor::new("died"))
        .with_method("take_hit", |scope, _| {
            let hp = scope.var("hp").and_then(Value::as_int).unwrap_or_default();
            scope.base_mut().call_deferred("set_hp", vec![Value::Int(hp - 1)]);
            Ok(Value::Nil)
        })
        .with_method("set_hp", |scope, args| {
            let hp = args.first().and_then(Value::as_int).unwrap_or_default().max(0);
            scope.set_var("hp", hp)?;
            log::info!("{} has {hp} hp left", scope.base().name());
            if hp == 0 {
                let me = scope.id();
                scope.emit("died", Vec::new())?;
                scope.defer(TreeCommand::Free(me));
            }
            Ok(Value::Nil)
        })
        .with_warning(|vars, _| match vars.get("hp") {
            Some(Value::Int(hp)) if *hp <= 0 => "starts dead".to_string(),
            _ => String::new(),
        });

    let announcer = ScriptedBehavior::new("announcer")
        .on_notification(|scope, what| {
            log::info!("{} received {what}", scope.base().name());
            Ok(())
        })
        .with_method("on_fired", |scope, args| {
            let target = args.first().and_then(Value::as_node);
            log::info!("{} saw a shot at {target:?}", scope.base().name());
            if let Some(target) = target {
                scope.request(TreeCommand::Call {
                    target,
                    method: "take_hit".to_string(),
                    args: Vec::new(),
                });
            }
            Ok(Value::Nil)
        })
        .with_method("on_ship_died", |scope, _| {
            log::info!("{}: a ship went down", scope.base().name());
            Ok(Value::Nil)
        });

    let mut factory = BehaviorFactory::new();
    factory.register_prototype(health).register_prototype(announcer);
    factory
}

/// Demo state
pub struct DemoApp {
    tree: SceneTree,
    arena: Option<NodeId>,
}

impl DemoApp {
    /// Create the tree
    pub fn new() -> Result<Self, DemoError> {
        let registry = build_registry()?;
        let config = SceneConfig::default().with_root_name("world");
        Ok(Self {
            tree: SceneTree::new(registry, config)?,
            arena: None,
        })
    }

    /// Instantiate the arena and wire its signals
    pub fn initialize(&mut self) -> Result<(), DemoError> {
        log::info!("Instantiating arena definition...");
        let definition = SceneDefinition::from_ron_str(ARENA).map_err(SceneError::from)?;
        let built = definition.instantiate(&mut self.tree, &behaviors())?;
        let arena = built.root;
        let turret = built.nodes[1];

        self.tree.connect(turret, "fired", arena, "on_fired", ConnectFlags::empty())?;
        for &ship in &built.nodes[2..] {
            self.tree.connect(ship, "died", arena, "on_ship_died", ConnectFlags::ONE_SHOT)?;
        }

        let root = self.tree.root();
        let report = self.tree.attach(root, arena)?;
        log::info!("Arena attached ({} handler failure(s))", report.len());
        for &id in &built.nodes {
            log::info!("  {} ({})", self.tree.get_path(id)?, self.tree.type_name(id)?);
        }
        self.arena = Some(arena);
        Ok(())
    }

    /// Fire at every ship until none is left
    pub fn run(&mut self) -> Result<(), DemoError> {
        let Some(arena) = self.arena else {
            return Ok(());
        };
        let turret = self.tree.get_node(arena, "Turret")?;
        let mut volley = 0;
        loop {
            let ships: Vec<NodeId> = self
                .tree
                .children(arena)?
                .iter()
                .copied()
                .filter(|&id| self.tree.name(id).is_ok_and(|name| name.starts_with("Ship")))
                .collect();
            if ships.is_empty() {
                break;
            }
            if volley == MAX_VOLLEYS {
                log::warn!("Giving up after {volley} volleys with {} ship(s) left", ships.len());
                break;
            }
            volley += 1;
            log::info!("Volley {volley} at {} ship(s)", ships.len());
            for ship in ships {
                self.tree.call(turret, "fire", &[Value::Node(ship)])?;
            }
            let report = self.tree.take_report();
            if !report.is_clean() {
                log::warn!("Volley {volley} had {} failure(s)", report.len());
            }
        }
        log::info!("Arena cleared after {volley} volley(s), {} node(s) left", self.tree.node_count());
        Ok(())
    }

    /// Free everything
    pub fn shutdown(&mut self) {
        let report = self.tree.shutdown();
        log::info!("Shutdown complete ({} handler failure(s))", report.len());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    scene_engine::foundation::logging::init_with_level("info");
    log::info!("Starting lifecycle demo");

    let mut app = DemoApp::new()?;
    app.initialize()?;
    app.run()?;
    app.shutdown();

    log::info!("Lifecycle demo finished successfully");
    Ok(())
}
