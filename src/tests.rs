use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing_test::traced_test;

use super::*;
use crate::constructible;

trait Store {
    fn name(&self) -> String;
}

#[derive(Default)]
struct MemoryStore;

impl Store for MemoryStore {
    fn name(&self) -> String {
        "memory".into()
    }
}

struct FileStore(&'static str);

impl Store for FileStore {
    fn name(&self) -> String {
        self.0.into()
    }
}

#[derive(Default)]
struct Counter(u8);

struct Inner {
    label: Rc<String>,
}

impl Inner {
    fn new(label: Rc<String>) -> Self {
        Self { label }
    }
}

struct Outer {
    label: Rc<String>,
    inner: Rc<Inner>,
}

impl Outer {
    fn new(label: Rc<String>, inner: Rc<Inner>) -> Self {
        Self { label, inner }
    }
}

struct Connection {
    closed: Rc<Cell<u32>>,
}

impl Connection {
    fn open(closed: Rc<Cell<u32>>) -> Self {
        Self { closed }
    }
}

impl Dispose for Connection {
    fn dispose(&self) {
        self.closed.set(self.closed.get() + 1);
    }
}

struct Settings {
    port: Rc<u16>,
    host: Rc<String>,
    timeout: Option<Rc<u64>>,
    stores: Vec<Rc<dyn Store>>,
}

impl Settings {
    fn new(port: Rc<u16>, host: Rc<String>, timeout: Option<Rc<u64>>, stores: Vec<Rc<dyn Store>>) -> Self {
        Self {
            port,
            host,
            timeout,
            stores,
        }
    }
}

struct Job {
    id: Rc<u32>,
    store: Rc<dyn Store>,
}

impl Job {
    fn new(id: Rc<u32>, store: Rc<dyn Store>) -> Self {
        Self { id, store }
    }
}

struct Scheduler {
    jobs: Rc<Factory>,
}

impl Scheduler {
    fn new(jobs: Rc<Factory>) -> Self {
        Self { jobs }
    }
}

#[allow(dead_code)]
#[derive(Debug)]
struct Chicken {
    egg: Rc<Egg>,
}

#[allow(dead_code)]
#[derive(Debug)]
struct Egg {
    chicken: Rc<Chicken>,
}

impl Chicken {
    fn hatch(egg: Rc<Egg>) -> Self {
        Self { egg }
    }
}

impl Egg {
    fn lay(chicken: Rc<Chicken>) -> Self {
        Self { chicken }
    }
}

constructible!(MemoryStore);
constructible!(Counter);
constructible!(Inner, new, label: dependency::<String>());
constructible!(Outer, new, label: dependency::<String>(), inner: construct::<Inner>());
constructible!(dispose Connection, open, closed: dependency::<Cell<u32>>());
constructible!(
    Settings,
    new,
    port: optional(dependency::<u16>(), Some(Instance::new(8080u16))),
    host: named::<String>("host"),
    timeout: optional(dependency::<u64>(), None),
    stores: all::<dyn Store>(),
);
constructible!(Job, new, id: dependency::<u32>(), store: dependency::<dyn Store>());
constructible!(Scheduler, new, jobs: func(Key::constructible::<Job>(), vec![Key::of::<u32>()]));
#[allow(dead_code)]
struct Session {
    connection: Rc<Connection>,
    user: Rc<u32>,
}

impl Session {
    fn new(connection: Rc<Connection>, user: Rc<u32>) -> Self {
        Self { connection, user }
    }
}

constructible!(Session, new, connection: construct::<Connection>(), user: dependency::<u32>());
constructible!(Chicken, hatch, egg: construct::<Egg>());
constructible!(Egg, lay, chicken: construct::<Chicken>());

fn memory_store(builder: &mut Builder) -> &mut Registration {
    builder
        .register_type::<MemoryStore>()
        .provides(|s: Rc<MemoryStore>| -> Rc<dyn Store> { s })
}

#[test]
fn unregistered_types_are_constructed() -> Result<(), ResolveError> {
    let container = Builder::new().build()?;

    let a = container.construct::<Counter>()?;
    let b = container.construct::<Counter>()?;
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(a.0, 0);

    // plain type keys are not constructed
    assert!(matches!(
        container.get::<Counter>(),
        Err(ResolveError::Unresolved { .. })
    ));
    Ok(())
}

#[test]
fn unregistered_names_fail() -> Result<(), ResolveError> {
    let container = Builder::new().build()?;
    let err = container.resolve(&Key::named("missing")).unwrap_err();
    assert!(matches!(err, ResolveError::Unresolved { ref key } if key == "\"missing\""));
    assert!(container.get::<u32>().is_err());
    assert!(container.resolve_all(&Key::named("missing"))?.is_empty());
    Ok(())
}

#[test]
fn once_is_shared_by_all_keys_and_children() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    memory_store(&mut builder).as_key("store").once();
    let container = builder.build()?;

    let a = container.get::<MemoryStore>()?;
    let b = container.get_named::<MemoryStore>("store")?;
    let c = container.get::<dyn Store>()?;
    assert!(Rc::ptr_eq(&a, &b));
    assert!(std::ptr::addr_eq(Rc::as_ptr(&a), Rc::as_ptr(&c)));
    assert_eq!(c.name(), "memory");

    let child = container.child()?;
    let d = child.get::<MemoryStore>()?;
    assert!(Rc::ptr_eq(&a, &d));

    // sub-containers overriding an unrelated key still share the singleton
    let other = container.create_child(|b| {
        b.register_value(String::from("child"));
    })?;
    assert!(Rc::ptr_eq(&a, &other.get::<MemoryStore>()?));
    Ok(())
}

#[test]
fn per_container_and_per_dependency() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder.register_type::<Counter>().per_container();
    builder.register_type::<MemoryStore>().per_dependency();
    let container = builder.build()?;

    let a = container.construct::<Counter>()?;
    let b = container.construct::<Counter>()?;
    assert!(Rc::ptr_eq(&a, &b));

    let child = container.child()?;
    let c = child.construct::<Counter>()?;
    let d = child.construct::<Counter>()?;
    assert!(!Rc::ptr_eq(&a, &c));
    assert!(Rc::ptr_eq(&c, &d));

    let x = container.construct::<MemoryStore>()?;
    let y = container.construct::<MemoryStore>()?;
    assert!(!Rc::ptr_eq(&x, &y));
    Ok(())
}

#[test]
fn default_lifetime_applies_to_unset_registrations() -> Result<(), ResolveError> {
    let mut builder = Builder::new().with_default_lifetime(Lifetime::Once);
    builder.register_type::<Counter>();
    builder.register_type::<MemoryStore>().per_dependency();
    let container = builder.build()?;

    assert!(Rc::ptr_eq(
        &container.construct::<Counter>()?,
        &container.construct::<Counter>()?
    ));
    assert!(!Rc::ptr_eq(
        &container.construct::<MemoryStore>()?,
        &container.construct::<MemoryStore>()?
    ));

    Ok(())
}

#[test]
fn synthesized_registrations_follow_default_lifetime() -> Result<(), ResolveError> {
    let container = Builder::new().with_default_lifetime(Lifetime::Once).build()?;
    let a = container.construct::<Counter>()?;
    let b = container.construct::<Counter>()?;
    assert!(Rc::ptr_eq(&a, &b));
    Ok(())
}

#[test]
fn children_override_and_inherit() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder.register_value(String::from("parent"));
    builder.register_value(3u8);
    let container = builder.build()?;

    let child = container.create_child(|b| {
        b.register_value(String::from("child"));
    })?;
    assert_eq!(child.get::<String>()?.as_str(), "child");
    assert_eq!(container.get::<String>()?.as_str(), "parent");
    assert_eq!(*child.get::<u8>()?, 3);

    // constructions in the child see the child's registrations
    assert_eq!(child.construct::<Inner>()?.label.as_str(), "child");
    assert_eq!(container.construct::<Inner>()?.label.as_str(), "parent");

    let grandchild = child.child()?;
    assert_eq!(grandchild.get::<String>()?.as_str(), "child");

    // siblings do not see each other's overrides
    let sibling = container.child()?;
    assert_eq!(sibling.get::<String>()?.as_str(), "parent");
    assert_eq!(sibling.construct::<Inner>()?.label.as_str(), "parent");
    Ok(())
}

#[test]
fn hooks_only_apply_to_their_registration() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder.register_value(String::from("global"));
    builder
        .register_type::<Outer>()
        .with_parameter("label")
        .use_value(String::from("hooked"));
    let container = builder.build()?;

    let outer = container.construct::<Outer>()?;
    assert_eq!(outer.label.as_str(), "hooked");
    assert_eq!(outer.inner.label.as_str(), "global");
    Ok(())
}

#[test]
fn first_matching_hook_wins() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder.register_value(String::from("global"));
    builder.register().use_value(String::from("alternate")).as_key("alt");
    builder
        .register_type::<Outer>()
        .with_parameter_at(0)
        .use_value(String::from("by index"))
        .with_parameter_of::<String>()
        .use_value(String::from("by key"));
    builder
        .register_type::<Inner>()
        .with_parameter_key(Key::of::<String>())
        .use_key("alt");
    let container = builder.build()?;

    let outer = container.construct::<Outer>()?;
    assert_eq!(outer.label.as_str(), "by index");
    assert_eq!(outer.inner.label.as_str(), "alternate");
    Ok(())
}

#[test]
fn hooks_receive_the_container_and_parameter() -> Result<(), ResolveError> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = seen.clone();
    let mut builder = Builder::new();
    builder.register_value(String::from("global"));
    builder.register_type::<Inner>().hook(ParameterHook::new(
        |p| p.index() == 0,
        move |c, p| {
            record.borrow_mut().push(p.name());
            let global = c.get::<String>()?;
            Ok(Instance::new(format!("{}!", global)))
        },
    ));
    let container = builder.build()?;

    assert_eq!(container.construct::<Inner>()?.label.as_str(), "global!");
    assert_eq!(*seen.borrow(), vec!["label"]);
    Ok(())
}

#[test]
fn fixed_arguments_bind_by_position() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder
        .register_type::<Job>()
        .with_arguments([Instance::new(5u32), Instance::from_rc::<dyn Store>(Rc::new(FileStore("disk")))]);
    let container = builder.build()?;

    let job = container.construct::<Job>()?;
    assert_eq!(*job.id, 5);
    assert_eq!(job.store.name(), "disk");
    Ok(())
}

#[test]
fn optional_named_and_all_dependencies() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder.register().use_value(String::from("example.org")).as_key("host");
    memory_store(&mut builder);
    builder
        .register()
        .use_value(FileStore("disk"))
        .provides(|s: Rc<FileStore>| -> Rc<dyn Store> { s });
    let container = builder.build()?;

    let settings = container.construct::<Settings>()?;
    assert_eq!(*settings.port, 8080);
    assert_eq!(settings.host.as_str(), "example.org");
    assert!(settings.timeout.is_none());
    let names: Vec<String> = settings.stores.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["memory", "disk"]);

    let child = container.create_child(|b| {
        b.register_value(9000u16);
        b.register_value(30u64);
    })?;
    let settings = child.construct::<Settings>()?;
    assert_eq!(*settings.port, 9000);
    assert_eq!(settings.timeout.as_deref(), Some(&30));
    Ok(())
}

#[test]
fn optional_does_not_hide_nested_failures() -> Result<(), ResolveError> {
    let container = Builder::new().build()?;
    let declared = optional(construct::<Outer>(), None);
    let err = container.resolve_dependency(&declared).unwrap_err();
    assert!(matches!(err, ResolveError::Unresolved { .. }));
    assert!(container.resolve_dependency(&optional(dependency::<u8>(), None))?.is_none());
    Ok(())
}

#[test]
fn empty_factories_and_type_mismatches() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    builder
        .register()
        .call_optional(|_| Ok(None::<Rc<u8>>))
        .as_key("nothing");
    builder.register().use_value(String::from("text")).as_key("text");
    let container = builder.build()?;

    assert!(matches!(
        container.resolve(&Key::named("nothing")),
        Err(ResolveError::Empty { .. })
    ));
    assert!(matches!(
        container.get_named::<u8>("text"),
        Err(ResolveError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
#[traced_test]
fn cycles_hit_the_depth_limit() {
    let container = Builder::new().with_max_depth(20).build().unwrap();
    let err = container.construct::<Chicken>().unwrap_err();
    assert!(matches!(err, ResolveError::RecursionLimit { depth: 20, .. }));

    // the stack unwound: the container still works
    assert!(container.construct::<Counter>().is_ok());
    assert!(logs_contain("built container"));
}

#[test]
#[traced_test]
fn disposal_runs_once_and_cascades() {
    let closed = Rc::new(Cell::new(0u32));
    let mut builder = Builder::new();
    builder.register_shared(closed.clone());
    builder.register_type::<Connection>().once();
    let container = builder.build().unwrap();

    let a = container.construct::<Connection>().unwrap();
    let b = container.construct::<Connection>().unwrap();
    assert!(Rc::ptr_eq(&a, &b));

    let child = container.create_child(|b| {
        b.register_type::<Connection>().per_container();
    }).unwrap();
    let c = child.construct::<Connection>().unwrap();
    assert!(!Rc::ptr_eq(&a, &c));
    assert_eq!(child.tracked(), 1);
    // the connection and the child
    assert_eq!(container.tracked(), 2);

    container.dispose();
    assert_eq!(closed.get(), 2);
    assert!(container.is_disposed());
    assert!(child.is_disposed());

    container.dispose();
    assert_eq!(closed.get(), 2);
    assert!(matches!(
        container.construct::<Connection>(),
        Err(ResolveError::Disposed)
    ));
    assert!(logs_contain("disposing container"));
}

#[test]
fn failed_resolution_keeps_created_dependencies_tracked() -> Result<(), ResolveError> {
    let closed = Rc::new(Cell::new(0u32));
    let mut builder = Builder::new();
    builder.register_shared(closed.clone());
    let container = builder.build()?;

    assert!(matches!(
        container.construct::<Session>(),
        Err(ResolveError::Unresolved { .. })
    ));
    assert_eq!(container.tracked(), 1);

    container.dispose();
    assert_eq!(closed.get(), 1);
    Ok(())
}

#[test]
fn disposed_children_are_released_by_their_parent() -> Result<(), ResolveError> {
    let closed = Rc::new(Cell::new(0u32));
    let mut builder = Builder::new();
    builder.register_shared(closed.clone());
    let container = builder.build()?;

    for _ in 0..1000 {
        let child = container.child()?;
        child.construct::<Connection>()?;
        child.dispose();
    }
    assert_eq!(container.tracked(), 0);
    assert_eq!(closed.get(), 1000);

    container.dispose();
    assert_eq!(closed.get(), 1000);
    Ok(())
}

#[test]
fn disposing_an_instance_untracks_it() -> Result<(), ResolveError> {
    let closed = Rc::new(Cell::new(0u32));
    let mut builder = Builder::new();
    builder.register_shared(closed.clone());
    let container = builder.build()?;

    let a = container.construct::<Connection>()?;
    let b = container.construct::<Connection>()?;
    assert_eq!(container.tracked(), 2);

    assert!(container.dispose_instance(&a));
    assert_eq!(closed.get(), 1);
    assert_eq!(container.tracked(), 1);

    container.dispose();
    assert_eq!(closed.get(), 2);
    drop(b);
    Ok(())
}

#[test]
fn explicit_disposers_track_values() -> Result<(), ResolveError> {
    let closed = Rc::new(Cell::new(0u32));
    let mut builder = Builder::new();
    let shared = closed.clone();
    builder
        .register()
        .call(move |_| Ok(Connection::open(shared.clone())))
        .disposable::<Connection>()
        .as_key("connection");
    let container = builder.build()?;

    container.get_named::<Connection>("connection")?;
    container.dispose();
    assert_eq!(closed.get(), 1);
    Ok(())
}

#[test]
fn factories_take_explicit_values() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    memory_store(&mut builder);
    builder.register_type::<Job>().once();
    let container = builder.build()?;

    let factory = container.factory_for(&Key::constructible::<Job>(), vec![Key::of::<u32>()])?;
    let seven = factory.create::<Job>(vec![Instance::new(7u32)])?;
    let eight = factory.create::<Job>(vec![Instance::new(8u32), Instance::new(9u32)])?;
    assert_eq!(*seven.id, 7);
    assert_eq!(*eight.id, 8);
    assert!(!Rc::ptr_eq(&seven, &eight));
    assert_eq!(seven.store.name(), "memory");

    // explicit values never leak into the container
    assert!(container.get::<u32>().is_err());
    Ok(())
}

#[test]
fn func_dependencies_inject_factories() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    memory_store(&mut builder);
    builder
        .register()
        .use_factory_for(Key::constructible::<Job>(), vec![Key::of::<u32>()])
        .as_key("jobs");
    let container = builder.build()?;

    let scheduler = container.construct::<Scheduler>()?;
    assert_eq!(*scheduler.jobs.create::<Job>(vec![Instance::new(1u32)])?.id, 1);

    let jobs = container.get_named::<Factory>("jobs")?;
    assert_eq!(jobs.parameters(), &[Key::of::<u32>()]);
    assert_eq!(*jobs.create::<Job>(vec![Instance::new(2u32)])?.id, 2);
    Ok(())
}

#[test]
fn functions_are_resolved_on_each_call() -> Result<(), ResolveError> {
    let mut builder = Builder::new();
    memory_store(&mut builder);
    builder.register_value(String::from("label"));
    let container = builder.build()?;

    let describe = container.resolve_function(|store: Rc<dyn Store>, label: Rc<String>| {
        format!("{} {}", store.name(), label)
    });
    assert_eq!(describe()?, "memory label");

    let timeout = container.resolve_function(|t: Option<Rc<u64>>| t.map(|t| *t));
    assert_eq!(timeout()?, None);

    let local = container.resolve_function_with(
        |label: Rc<String>| label.len(),
        vec![(Key::of::<String>(), Instance::new(String::from("local value")))],
    );
    assert_eq!(local()?, 11);

    let unresolved = container.resolve_function(|n: Rc<u32>| *n);
    assert!(matches!(unresolved(), Err(ResolveError::Unresolved { .. })));
    Ok(())
}

#[test]
fn functions_outliving_their_container_fail() -> Result<(), ResolveError> {
    let container = Builder::new().build()?;
    let call = container.resolve_function(|c: Rc<Container>| c.is_disposed());
    assert!(!call()?);
    drop(container);
    assert!(matches!(call(), Err(ResolveError::Disposed)));
    Ok(())
}
