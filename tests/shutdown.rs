use osgi_mock::{
    properties, ComponentClass, MockBundleContext, MockOsgi, OsgiError, OsgiMetadata, ParamKind,
    DEACTIVATION_REASON_BUNDLE_STOPPED,
};
use parking_lot::Mutex;
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

struct Part {
    name: String,
    journal: Journal,
    fail: bool,
}

fn part_class(journal: Journal) -> ComponentClass {
    ComponentClass::builder::<Part>(OsgiMetadata::new("demo.Part").with_service_interface("demo.Part"))
        .constructor(&[ParamKind::Map], move |args| {
            let props = args.properties().cloned().unwrap_or_default();
            Ok(Part {
                name: props.get("name").map(|v| v.to_string()).unwrap_or_default(),
                fail: props.get("fail").and_then(|v| v.as_bool()).unwrap_or(false),
                journal: journal.clone(),
            })
        })
        .method("deactivate", &[ParamKind::Reason], |p: &Part, args| {
            p.journal
                .lock()
                .push(format!("{}:{}", p.name, args.reason().unwrap_or(-1)));
            if p.fail {
                return Err(OsgiError::component("demo.Part", format!("{} refused to stop", p.name)));
            }
            Ok(())
        })
        .build()
}

#[test]
fn test_shutdown_deactivates_newest_first() {
    let journal = Journal::default();
    let ctx = MockBundleContext::new();
    ctx.register_class(part_class(journal.clone()));
    for name in ["first", "second", "third"] {
        MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => name }).unwrap();
    }

    MockOsgi::shutdown(&ctx).unwrap();
    let reason = DEACTIVATION_REASON_BUNDLE_STOPPED;
    assert_eq!(
        *journal.lock(),
        vec![
            format!("third:{}", reason),
            format!("second:{}", reason),
            format!("first:{}", reason),
        ]
    );
    assert_eq!(ctx.service_count(), 0);
    assert!(ctx.service_reference("demo.Part").is_none());
}

#[test]
fn test_shutdown_continues_after_failure() {
    let journal = Journal::default();
    let ctx = MockBundleContext::new();
    ctx.register_class(part_class(journal.clone()));
    MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => "a" }).unwrap();
    MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => "b", "fail" => true }).unwrap();
    MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => "c", "fail" => true }).unwrap();

    let err = ctx.shutdown().unwrap_err();
    assert_eq!(err, OsgiError::component("demo.Part", "c refused to stop"));
    assert_eq!(journal.lock().len(), 3);
    assert_eq!(ctx.service_count(), 0);
}

#[test]
fn test_instance_published_twice_is_deactivated_once() {
    let journal = Journal::default();
    let ctx = MockBundleContext::new();
    ctx.register_class(part_class(journal.clone()));
    let part = MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => "shared" }).unwrap();
    ctx.register_service(&["demo.Alias"], part, properties! { "name" => "shared" }).unwrap();

    ctx.shutdown().unwrap();
    assert_eq!(journal.lock().len(), 1);
}

#[test]
fn test_already_deactivated_is_skipped() {
    let journal = Journal::default();
    let ctx = MockBundleContext::new();
    ctx.register_class(part_class(journal.clone()));
    let part = MockOsgi::register_injected_activate_service::<Part>(&ctx, properties! { "name" => "p" }).unwrap();
    MockOsgi::deactivate_with_reason(&part, &ctx, properties! {}, 1).unwrap();

    ctx.shutdown().unwrap();
    assert_eq!(*journal.lock(), vec!["p:1"]);
}

#[test]
fn test_references_are_invalid_after_shutdown() {
    let ctx = MockBundleContext::new();
    let registration = ctx.register_service(&["demo.Api"], Arc::new(1u8), properties! {}).unwrap();
    ctx.shutdown().unwrap();

    assert!(!registration.reference().is_registered());
    assert!(ctx.get_service(&registration.reference()).is_none());
    assert_eq!(registration.unregister(), Err(OsgiError::AlreadyUnregistered));
}

#[test]
fn test_data_files_live_until_shutdown() {
    let ctx = MockBundleContext::new();
    let first = ctx.data_file("state.json").unwrap();
    let second = ctx.data_file("other.bin").unwrap();
    assert_eq!(first.parent(), second.parent());
    assert!(first.ends_with("state.json"));

    std::fs::write(&first, b"{}").unwrap();
    let dir = first.parent().map(|p| p.to_path_buf()).unwrap();
    assert!(dir.exists());

    ctx.shutdown().unwrap();
    assert!(!dir.exists());

    // a fresh directory is created on demand afterwards
    let again = ctx.data_file("state.json").unwrap();
    assert_ne!(again.parent(), Some(dir.as_path()));
    ctx.shutdown().unwrap();
}

#[test]
fn test_data_dirs_are_per_context() {
    let a = MockBundleContext::new();
    let b = MockBundleContext::new();
    assert_ne!(a.data_file("x").unwrap(), b.data_file("x").unwrap());
    a.shutdown().unwrap();
    b.shutdown().unwrap();
}
