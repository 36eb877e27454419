#![no_main]

use libfuzzer_sys::fuzz_target;
use osgi_mock::{properties, Filter, LdapFilter};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    // Parsing must never panic; a parsed filter must evaluate and print back.
    if let Ok(filter) = LdapFilter::parse(source) {
        let props = properties! {
            "objectClass" => vec!["fuzz.Api"],
            "service.ranking" => 3,
            "name" => "fuzz",
            "enabled" => true,
            "ratio" => 0.5,
        };
        let _ = filter.matches(&props);
        assert_eq!(filter.to_string(), source);
    }
});
