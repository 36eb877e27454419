use osgi_mock::{
    properties, AnyArc, MockBundleContext, OsgiError, PropertyValue, ServiceFactory, ServiceReference,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const STRING: &str = "java.lang.String";

fn register(ctx: &MockBundleContext, name: &str, ranking: Option<i64>) {
    let mut props = properties! { "name" => name };
    if let Some(ranking) = ranking {
        props.insert("service.ranking".into(), PropertyValue::from(ranking));
    }
    ctx.register_service(&[STRING], Arc::new(name.to_string()), props).unwrap();
}

fn names(refs: &[ServiceReference]) -> String {
    refs.iter()
        .filter_map(|r| r.property("name"))
        .map(|v| v.to_string())
        .collect()
}

#[test]
fn test_ranking_order() {
    let ctx = MockBundleContext::new();
    register(&ctx, "A", Some(3));
    register(&ctx, "B", Some(5));
    register(&ctx, "C", Some(4));
    register(&ctx, "D", Some(1));
    register(&ctx, "E", Some(2));

    let mut refs = ctx.service_references(Some(STRING), None).unwrap().unwrap();
    assert_eq!(names(&refs), "BCAED");

    // natural order puts the best service last
    refs.sort();
    assert_eq!(names(&refs), "DEACB");

    assert_eq!(ctx.service_for::<String>(STRING).as_deref().map(String::as_str), Some("B"));
    let single = ctx.service_reference(STRING).unwrap();
    assert_eq!(single.property("name"), Some(PropertyValue::from("B")));
}

#[test]
fn test_no_ranking_keeps_registration_order() {
    let ctx = MockBundleContext::new();
    for name in ["A", "B", "C", "D", "E"] {
        register(&ctx, name, None);
    }

    let mut refs = ctx.service_references(Some(STRING), None).unwrap().unwrap();
    assert_eq!(names(&refs), "ABCDE");
    refs.sort();
    assert_eq!(names(&refs), "EDCBA");
    assert_eq!(ctx.service_for::<String>(STRING).as_deref().map(String::as_str), Some("A"));
}

#[test]
fn test_non_integer_ranking_counts_as_zero() {
    let ctx = MockBundleContext::new();
    register(&ctx, "A", Some(-1));
    ctx.register_service(
        &[STRING],
        Arc::new("B".to_string()),
        properties! { "name" => "B", "service.ranking" => "high" },
    )
    .unwrap();
    assert_eq!(names(&ctx.service_references(Some(STRING), None).unwrap().unwrap()), "BA");
}

#[test]
fn test_double_unregister_fails() {
    let ctx = MockBundleContext::new();
    let registration = ctx.register_service(&[STRING], Arc::new("x".to_string()), properties! {}).unwrap();

    registration.unregister().unwrap();
    let err = registration.unregister().unwrap_err();
    assert_eq!(err, OsgiError::AlreadyUnregistered);
    assert_eq!(err.to_string(), "Service was already unregistered");
    assert!(!registration.reference().is_registered());
}

#[test]
fn test_no_results_is_none() {
    let ctx = MockBundleContext::new();
    assert!(ctx.service_references(Some(STRING), None).unwrap().is_none());
    assert!(ctx.service_reference(STRING).is_none());

    register(&ctx, "A", None);
    assert!(ctx.service_references(Some(STRING), Some("(name=Z)")).unwrap().is_none());
    assert_eq!(ctx.service_references(Some(STRING), Some("(name=A)")).unwrap().map(|r| r.len()), Some(1));
}

#[test]
fn test_lookup_with_filter_only() {
    let ctx = MockBundleContext::new();
    register(&ctx, "A", None);
    ctx.register_service(&["other.Api"], Arc::new(1u8), properties! { "name" => "B" }).unwrap();

    let refs = ctx.service_references(None, Some("(name=*)")).unwrap().unwrap();
    assert_eq!(names(&refs), "AB");

    let by_class = ctx.service_references(None, Some("(objectClass=other.Api)")).unwrap().unwrap();
    assert_eq!(names(&by_class), "B");
}

#[test]
fn test_invalid_filter_is_rejected() {
    let ctx = MockBundleContext::new();
    let err = ctx.service_references(Some(STRING), Some("(name=A")).unwrap_err();
    assert!(matches!(err, OsgiError::InvalidSyntax { .. }));
}

#[test]
fn test_framework_properties_are_stamped() {
    let ctx = MockBundleContext::new();
    let registration = ctx
        .register_service(&[STRING, "java.lang.CharSequence"], Arc::new("s".to_string()), properties! {})
        .unwrap();
    let reference = registration.reference();

    let id = reference.service_id();
    assert_eq!(reference.property("service.id"), Some(PropertyValue::from(id)));
    assert_eq!(
        reference.property("objectClass"),
        Some(PropertyValue::from(vec![STRING, "java.lang.CharSequence"]))
    );
    assert_eq!(reference.property("service.bundleid"), Some(PropertyValue::from(ctx.bundle_id())));
    assert_eq!(reference.property("service.scope"), Some(PropertyValue::from("singleton")));
}

#[test]
fn test_set_properties_keeps_framework_keys_and_resorts() {
    let ctx = MockBundleContext::new();
    register(&ctx, "A", None);
    let b = ctx
        .register_service(&[STRING], Arc::new("B".to_string()), properties! { "name" => "B" })
        .unwrap();
    let id = b.reference().service_id();

    b.set_properties(properties! { "name" => "B2", "service.ranking" => 10, "service.id" => 999 })
        .unwrap();

    let reference = b.reference();
    assert_eq!(reference.service_id(), id);
    assert_eq!(reference.property("service.id"), Some(PropertyValue::from(id)));
    assert!(reference.property("objectClass").is_some());
    assert_eq!(names(&ctx.service_references(Some(STRING), None).unwrap().unwrap()), "B2A");

    b.unregister().unwrap();
    assert_eq!(b.set_properties(properties! {}), Err(OsgiError::AlreadyUnregistered));
}

#[test]
fn test_service_ids_increase_across_contexts() {
    let first = MockBundleContext::new();
    let second = MockBundleContext::new();
    let a = first.register_service(&[STRING], Arc::new("a".to_string()), properties! {}).unwrap();
    let b = second.register_service(&[STRING], Arc::new("b".to_string()), properties! {}).unwrap();
    assert!(b.reference().service_id() > a.reference().service_id());
    assert_ne!(first.bundle_id(), second.bundle_id());
}

#[test]
fn test_get_and_unget_count_usage() {
    let ctx = MockBundleContext::new();
    let registration = ctx.register_service(&[STRING], Arc::new("x".to_string()), properties! {}).unwrap();
    let reference = registration.reference();

    assert!(ctx.get_service(&reference).is_some());
    assert!(ctx.get_service(&reference).is_some());
    assert_eq!(reference.usage_count(), 2);
    assert!(ctx.unget_service(&reference));
    assert_eq!(reference.usage_count(), 1);

    registration.unregister().unwrap();
    assert!(ctx.get_service(&reference).is_none());
}

#[test]
fn test_service_objects() {
    let ctx = MockBundleContext::new();
    let registration = ctx.register_service(&[STRING], Arc::new("x".to_string()), properties! {}).unwrap();
    let objects = ctx.service_objects(&registration.reference());

    let service = objects.get_service().unwrap();
    assert_eq!(service.downcast_ref::<String>().map(String::as_str), Some("x"));
    assert_eq!(objects.service_reference(), &registration.reference());
    assert!(objects.unget_service());
    assert!(!objects.unget_service());
}

#[derive(Default)]
struct CountingFactory {
    gets: AtomicUsize,
    ungets: AtomicUsize,
}

impl ServiceFactory for CountingFactory {
    fn get_service(&self, _context: &MockBundleContext) -> AnyArc {
        let n = self.gets.fetch_add(1, Ordering::SeqCst);
        Arc::new(format!("instance-{}", n))
    }

    fn unget_service(&self, _context: &MockBundleContext, _service: &AnyArc) {
        self.ungets.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_service_factory_is_asked_once() {
    let ctx = MockBundleContext::new();
    let factory = Arc::new(CountingFactory::default());
    let registration = ctx.register_service_factory(&[STRING], factory.clone(), properties! {}).unwrap();

    for _ in 0..3 {
        let service = ctx.service_for::<String>(STRING).unwrap();
        assert_eq!(service.as_str(), "instance-0");
    }
    assert_eq!(factory.gets.load(Ordering::SeqCst), 1);

    registration.unregister().unwrap();
    assert_eq!(factory.ungets.load(Ordering::SeqCst), 1);
}

#[test]
fn test_trait_object_services() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    let ctx = MockBundleContext::new();
    let greeter: Arc<dyn Greeter> = Arc::new(English);
    ctx.register_service(&["demo.Greeter"], Arc::new(greeter), properties! {}).unwrap();

    let found = ctx.service_for::<Arc<dyn Greeter>>("demo.Greeter").unwrap();
    assert_eq!(found.greet(), "hello");
}
