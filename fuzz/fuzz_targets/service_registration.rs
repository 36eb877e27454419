#![no_main]

use libfuzzer_sys::fuzz_target;
use osgi_mock::{properties, MockBundleContext, ServiceRegistration};
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let ctx = MockBundleContext::new();
    let mut live: Vec<(ServiceRegistration, i64)> = Vec::new();

    // Each byte is one operation: register with a ranking, unregister, or re-rank.
    for &byte in data.iter().take(64) {
        let ranking = i64::from(byte % 16) - 8;
        match byte % 3 {
            0 => {
                let registration = ctx
                    .register_service(&["fuzz.Api"], Arc::new(byte), properties! { "service.ranking" => ranking })
                    .expect("plain registration cannot fail");
                live.push((registration, ranking));
            }
            1 if !live.is_empty() => {
                let (registration, _) = live.remove(usize::from(byte) % live.len());
                registration.unregister().expect("first unregister succeeds");
                assert!(registration.unregister().is_err());
            }
            _ if !live.is_empty() => {
                let index = usize::from(byte) % live.len();
                live[index].0
                    .set_properties(properties! { "service.ranking" => ranking })
                    .expect("live registration accepts properties");
                live[index].1 = ranking;
            }
            _ => {}
        }

        let best = ctx.service_reference("fuzz.Api").map(|r| r.ranking());
        assert_eq!(best, live.iter().map(|(_, r)| *r).max());
    }

    assert_eq!(ctx.service_count(), live.len() + 1);
});
