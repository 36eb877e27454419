use osgi_mock::{
    properties, AnyArc, ComponentClass, LifecycleState, MockBundleContext, MockOsgi, OsgiError, OsgiMetadata,
    ParamKind, Properties, PropertyValue, Reference, ReferenceCardinality, DEACTIVATION_REASON_UNSPECIFIED,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn context_with(class: ComponentClass) -> MockBundleContext {
    let ctx = MockBundleContext::new();
    ctx.register_class(class);
    ctx
}

#[test]
fn test_activate_signature_precedence() {
    let class = ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
        .default_constructor()
        .method("activate", &[], |r: &Recorder, _| {
            r.record("no-args");
            Ok(())
        })
        .method("activate", &[ParamKind::Map, ParamKind::BundleContext], |r: &Recorder, _| {
            r.record("mixed");
            Ok(())
        })
        .method("activate", &[ParamKind::BundleContext], |r: &Recorder, args| {
            assert!(args.bundle_context().is_some());
            r.record("bundle-context");
            Ok(())
        })
        .method("activate", &[ParamKind::ComponentContext], |r: &Recorder, _| {
            r.record("component-context");
            Ok(())
        })
        .build();
    let ctx = context_with(class);

    let recorder = Arc::new(Recorder::default());
    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    assert_eq!(recorder.calls(), vec!["component-context"]);
}

#[test]
fn test_mixed_before_no_args() {
    let class = ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
        .default_constructor()
        .method("activate", &[], |r: &Recorder, _| {
            r.record("no-args");
            Ok(())
        })
        .method("activate", &[ParamKind::ComponentContext, ParamKind::Map], |r: &Recorder, args| {
            let name = args.properties().and_then(|p| p.get("component.name")).cloned();
            assert_eq!(name, Some(PropertyValue::from("demo.Recorder")));
            assert!(args.component_context().is_some());
            r.record("mixed");
            Ok(())
        })
        .build();
    let ctx = context_with(class);

    let recorder = Arc::new(Recorder::default());
    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    assert_eq!(recorder.calls(), vec!["mixed"]);
}

#[test]
fn test_named_lifecycle_methods() {
    let metadata = OsgiMetadata::new("demo.Recorder")
        .with_activate("start")
        .with_deactivate("stop")
        .with_modified("update");
    let class = ComponentClass::builder::<Recorder>(metadata)
        .default_constructor()
        .method("start", &[], |r: &Recorder, _| {
            r.record("start");
            Ok(())
        })
        .method("update", &[ParamKind::Map], |r: &Recorder, args| {
            let size = args.properties().and_then(|p| p.get("size")).and_then(PropertyValue::as_i64);
            r.record(format!("update:{}", size.unwrap_or_default()));
            Ok(())
        })
        .method("stop", &[ParamKind::Reason], |r: &Recorder, args| {
            r.record(format!("stop:{}", args.reason().unwrap_or(-1)));
            Ok(())
        })
        .build();
    let ctx = context_with(class);

    let recorder = Arc::new(Recorder::default());
    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    MockOsgi::modified(&recorder, &ctx, properties! { "size" => 3 }).unwrap();
    MockOsgi::deactivate(&recorder, &ctx, properties! {}).unwrap();
    assert_eq!(
        recorder.calls(),
        vec!["start".to_string(), "update:3".into(), format!("stop:{}", DEACTIVATION_REASON_UNSPECIFIED)]
    );
}

#[test]
fn test_deactivate_with_reason() {
    let class = ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
        .default_constructor()
        .method("deactivate", &[ParamKind::Reason, ParamKind::Map], |r: &Recorder, args| {
            r.record(format!("reason:{}", args.reason().unwrap_or(-1)));
            Ok(())
        })
        .build();
    let ctx = context_with(class);

    let recorder = Arc::new(Recorder::default());
    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    MockOsgi::deactivate_with_reason(&recorder, &ctx, properties! {}, 5).unwrap();
    assert_eq!(recorder.calls(), vec!["reason:5"]);
}

#[test]
fn test_missing_default_method_is_tolerated() {
    let ctx = context_with(
        ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
            .default_constructor()
            .build(),
    );
    let recorder = Arc::new(Recorder::default());
    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    MockOsgi::modified(&recorder, &ctx, properties! {}).unwrap();
    MockOsgi::deactivate(&recorder, &ctx, properties! {}).unwrap();
    assert!(recorder.calls().is_empty());
}

#[test]
fn test_missing_named_method_fails() {
    let ctx = context_with(
        ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder").with_activate("start"))
            .default_constructor()
            // a Reason parameter is not valid for activation
            .method("start", &[ParamKind::Reason], |_: &Recorder, _| Ok(()))
            .build(),
    );
    let recorder = Arc::new(Recorder::default());
    let err = MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap_err();
    assert_eq!(
        err,
        OsgiError::LifecycleMethod {
            class: "demo.Recorder".into(),
            method: "start".into(),
        }
    );
    assert!(err.to_string().contains("start"));
}

#[test]
fn test_no_metadata() {
    struct Unknown;

    let ctx = MockBundleContext::new();
    let err = MockOsgi::activate(&Arc::new(Unknown), &ctx, properties! {}).unwrap_err();
    match err {
        OsgiError::NoScrMetadata { class } => assert!(class.ends_with("Unknown"), "{}", class),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(MockOsgi::inject_services(&Arc::new(Unknown), &ctx, properties! {}).is_err());
    assert!(MockOsgi::activate_injected_service::<Unknown>(&ctx, properties! {}).is_err());
}

#[test]
fn test_state_machine() {
    let ctx = context_with(
        ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
            .default_constructor()
            .build(),
    );
    let recorder = Arc::new(Recorder::default());
    let erased: AnyArc = recorder.clone();
    assert_eq!(ctx.lifecycle_state(&erased), LifecycleState::Unactivated);

    MockOsgi::activate(&recorder, &ctx, properties! {}).unwrap();
    assert_eq!(ctx.lifecycle_state(&erased), LifecycleState::Activated);
    assert!(matches!(
        MockOsgi::activate(&recorder, &ctx, properties! {}),
        Err(OsgiError::Lifecycle { .. })
    ));

    MockOsgi::deactivate(&recorder, &ctx, properties! {}).unwrap();
    assert_eq!(ctx.lifecycle_state(&erased), LifecycleState::Deactivated);
    assert!(MockOsgi::deactivate(&recorder, &ctx, properties! {}).is_err());
    assert!(MockOsgi::modified(&recorder, &ctx, properties! {}).is_err());
    assert!(MockOsgi::activate(&recorder, &ctx, properties! {}).is_err());
}

#[test]
fn test_failing_activate_propagates() {
    let ctx = context_with(
        ComponentClass::builder::<Recorder>(OsgiMetadata::new("demo.Recorder"))
            .default_constructor()
            .method("activate", &[], |_: &Recorder, _| Err(OsgiError::component("demo.Recorder", "boom")))
            .build(),
    );
    let err = MockOsgi::register_injected_activate_service::<Recorder>(&ctx, properties! {})
        .err()
        .unwrap();
    assert!(err.to_string().contains("boom"));
    assert_eq!(ctx.service_count(), 1);
}

struct Settings {
    port: i64,
    host: String,
}

#[derive(Default)]
struct Server {
    endpoint: Mutex<Option<String>>,
}

#[test]
fn test_config_type_parameter() {
    let class = ComponentClass::builder::<Server>(OsgiMetadata::new("demo.Server").with_property("host", "localhost"))
        .default_constructor()
        .config_type::<Settings, _>("Settings", |props: &Properties| Settings {
            port: props.get("port").and_then(PropertyValue::as_i64).unwrap_or(80),
            host: props
                .get("host")
                .and_then(PropertyValue::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .method("activate", &[ParamKind::config("Settings")], |s: &Server, args| {
            let settings = args.config::<Settings>().ok_or_else(|| OsgiError::component("demo.Server", "no config"))?;
            *s.endpoint.lock() = Some(format!("{}:{}", settings.host, settings.port));
            Ok(())
        })
        .build();
    let ctx = context_with(class);

    let server = MockOsgi::activate_injected_service::<Server>(&ctx, properties! { "port" => 8080 }).unwrap();
    assert_eq!(server.endpoint.lock().as_deref(), Some("localhost:8080"));
    // activation alone does not publish
    assert_eq!(ctx.service_count(), 1);
}

#[derive(Default)]
struct Locator {
    found: Mutex<Vec<String>>,
}

#[test]
fn test_component_context_locates_services() {
    let metadata = OsgiMetadata::new("demo.Locator").with_reference(
        Reference::new("names", "demo.Name")
            .with_cardinality(ReferenceCardinality::OptionalMultiple)
            .with_target("(kind=good)"),
    );
    let class = ComponentClass::builder::<Locator>(metadata)
        .default_constructor()
        .method("activate", &[ParamKind::ComponentContext], |l: &Locator, args| {
            let cc = args
                .component_context()
                .ok_or_else(|| OsgiError::component("demo.Locator", "no context"))?;
            let all = cc.locate_services("names")?.unwrap_or_default();
            let mut found = l.found.lock();
            for service in all {
                if let Some(name) = service.downcast_ref::<String>() {
                    found.push(name.clone());
                }
            }
            assert!(cc.locate_service("missing")?.is_none());
            assert!(cc.component_instance().is_some());
            Ok(())
        })
        .build();
    let ctx = context_with(class);
    for (name, kind) in [("a", "good"), ("b", "bad"), ("c", "good")] {
        ctx.register_service(&["demo.Name"], Arc::new(name.to_string()), properties! { "kind" => kind })
            .unwrap();
    }

    let locator = Arc::new(Locator::default());
    MockOsgi::activate(&locator, &ctx, properties! {}).unwrap();
    assert_eq!(*locator.found.lock(), vec!["a", "c"]);
}
