mod common;

use common::*;
use iterdns::trace::{Outcome, Step};
use iterdns::types::*;
use iterdns::{Config, Resolution, Resolver, State};
use pretty_assertions::assert_eq;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn config(roots: &[Ipv4Addr]) -> Config {
    Config {
        roots: roots.to_vec(),
        ..Default::default()
    }
}

fn addr(ip: Ipv4Addr) -> SocketAddr {
    SocketAddr::from((ip, 53))
}

/// The (server, step, response) of every event.
fn hops(r: &Resolution) -> Vec<(Option<IpAddr>, Step, String)> {
    r.trace
        .iter()
        .map(|e| (e.server_ip, e.step, e.response.to_string()))
        .collect()
}

fn v4(ip: Ipv4Addr) -> Option<IpAddr> {
    Some(IpAddr::V4(ip))
}

#[test_env_log::test]
fn test_full_chain() {
    let resolver = Resolver::new(example_com(), &config(&[ROOT]));
    let r = resolver.resolve("example.com");

    assert_eq!(r.state, State::Answered);
    assert_eq!(r.hops, 3);
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "REFERRAL".to_string()),
            (v4(GTLD), Step::Tld, "REFERRAL".to_string()),
            (
                v4(AUTH),
                Step::Authoritative,
                "RESPONSE: A=93.184.216.34".to_string()
            ),
        ]
    );

    let m = r.message.expect("an answer");
    assert_eq!(m.rcode, Rcode::NoError);
    assert_eq!(
        m.answers[0].resource,
        Resource::A(Ipv4Addr::new(93, 184, 216, 34))
    );

    // total_time never goes backwards.
    for pair in r.trace.windows(2) {
        assert!(pair[0].total_time <= pair[1].total_time);
    }
}

#[test_env_log::test]
fn test_only_first_glue_is_followed() {
    let mock = example_com();
    let resolver = Resolver::new(mock, &config(&[ROOT]));
    resolver.resolve("example.com");

    // b.gtld-servers.net is never asked.
    assert_eq!(
        resolver_asked(&resolver),
        vec![addr(ROOT), addr(GTLD), addr(AUTH)]
    );
}

fn resolver_asked(resolver: &Resolver<MockExchanger>) -> Vec<SocketAddr> {
    resolver.exchanger().asked()
}

#[test_env_log::test]
fn test_root_answers_directly() {
    let mock = MockExchanger::new().with(
        ROOT,
        Script::Reply(answer("localhost.", Ipv4Addr::LOCALHOST)),
    );
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("localhost");

    assert_eq!(r.state, State::Answered);
    assert_eq!(r.hops, 1);

    // Whoever gives the answer is authoritative for it.
    assert_eq!(
        hops(&r),
        vec![(
            v4(ROOT),
            Step::Authoritative,
            "RESPONSE: A=127.0.0.1".to_string()
        )]
    );
}

#[test_env_log::test]
fn test_nxdomain_stops() {
    let mock = example_com().with(GTLD, Script::Reply(rcode(Rcode::NXDomain)));
    let resolver = Resolver::new(mock, &config(&[ROOT]));
    let r = resolver.resolve("nope.com");

    assert_eq!(r.state, State::NxDomain);
    assert_eq!(r.hops, 2);
    assert_eq!(r.outcome(), Outcome::NxDomain);
    assert_eq!(r.message.expect("the NXDOMAIN response").rcode, Rcode::NXDomain);
    assert_eq!(resolver_asked(&resolver), vec![addr(ROOT), addr(GTLD)]);
}

#[test_env_log::test]
fn test_other_rcode() {
    let mock = MockExchanger::new().with(ROOT, Script::Reply(rcode(Rcode::Refused)));
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::OtherError);
    assert_eq!(hops(&r), vec![(v4(ROOT), Step::Root, "RCODE_5".to_string())]);
    assert_eq!(r.message.expect("the REFUSED response").rcode, Rcode::Refused);
}

#[test_env_log::test]
fn test_soa_authority_is_a_dead_referral() {
    // NOERROR with an SOA but no A record has nothing to follow.
    let mock = MockExchanger::new().with(ROOT, Script::Reply(soa(".")));
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 1);
    assert!(r.message.is_none());
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "REFERRAL".to_string()),
            (None, Step::Root, "EXHAUSTED".to_string()),
        ]
    );
}

#[test_env_log::test]
fn test_soa_authority_from_authoritative() {
    let mock = example_com().with(AUTH, Script::Reply(soa("example.com.")));
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 3);
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "REFERRAL".to_string()),
            (v4(GTLD), Step::Tld, "REFERRAL".to_string()),
            (v4(AUTH), Step::Authoritative, "REFERRAL".to_string()),
            (None, Step::Authoritative, "EXHAUSTED".to_string()),
        ]
    );
    assert_eq!(r.last_hop().and_then(|e| e.server_ip), v4(AUTH));
}

#[test_env_log::test]
fn test_empty_noerror() {
    let mock = example_com().with(AUTH, Script::Reply(rcode(Rcode::NoError)));
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 3);
    assert!(r.message.is_none());
    assert_eq!(
        hops(&r)[2..].to_vec(),
        vec![
            (v4(AUTH), Step::Authoritative, "N-A".to_string()),
            (None, Step::Authoritative, "EXHAUSTED".to_string()),
        ]
    );
}

#[test_env_log::test]
fn test_referral_without_glue() {
    let mock = MockExchanger::new().with(
        ROOT,
        Script::Reply(referral("com.", &[("a.gtld-servers.net.", None)])),
    );
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 1);
    assert!(r.message.is_none());
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "REFERRAL".to_string()),
            (None, Step::Root, "EXHAUSTED".to_string()),
        ]
    );

    // The summary carries the last server that was actually asked.
    assert_eq!(r.last_hop().and_then(|e| e.server_ip), v4(ROOT));
}

#[test_env_log::test]
fn test_root_timeout() {
    let mock = MockExchanger::new().with(ROOT, Script::Timeout);
    let r = Resolver::new(mock, &config(&[ROOT])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 1);
    assert!(r.message.is_none());
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "TIMEOUT".to_string()),
            (None, Step::Root, "EXHAUSTED".to_string()),
        ]
    );
}

#[test_env_log::test]
fn test_root_fallback() {
    let second = Ipv4Addr::new(199, 9, 14, 201);
    let mock = example_com()
        .with(ROOT, Script::Timeout)
        .with(
            second,
            Script::Reply(referral("com.", &[("a.gtld-servers.net.", Some(GTLD))])),
        );
    let resolver = Resolver::new(mock, &config(&[ROOT, second]));
    let r = resolver.resolve("example.com");

    assert_eq!(r.state, State::Answered);
    assert_eq!(r.hops, 4);
    assert_eq!(
        resolver_asked(&resolver),
        vec![addr(ROOT), addr(second), addr(GTLD), addr(AUTH)]
    );
    assert_eq!(r.trace[0].response, Outcome::Timeout);
    assert_eq!(r.trace[1].step, Step::Root);
}

#[test_env_log::test]
fn test_all_roots_timeout() {
    let second = Ipv4Addr::new(199, 9, 14, 201);
    let mock = MockExchanger::new()
        .with(ROOT, Script::Timeout)
        .with(second, Script::Timeout);
    let r = Resolver::new(mock, &config(&[ROOT, second])).resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 2);
    assert_eq!(r.trace.len(), 3);
}

#[test_env_log::test]
fn test_tld_timeout_has_no_fallback() {
    let mock = example_com().with(GTLD, Script::Timeout);
    let resolver = Resolver::new(mock, &config(&[ROOT]));
    let r = resolver.resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 2);
    assert_eq!(
        hops(&r),
        vec![
            (v4(ROOT), Step::Root, "REFERRAL".to_string()),
            (v4(GTLD), Step::Tld, "TIMEOUT".to_string()),
            (None, Step::Tld, "EXHAUSTED".to_string()),
        ]
    );
}

#[test_env_log::test]
fn test_tld_bad_response_has_no_fallback() {
    for script in [Script::Malformed, Script::WrongId] {
        let mock = example_com().with(GTLD, script);
        let resolver = Resolver::new(mock, &config(&[ROOT]));
        let r = resolver.resolve("example.com");

        // Only timeouts get an event of their own.
        assert_eq!(r.state, State::Exhausted);
        assert_eq!(r.hops, 2);
        assert!(r.message.is_none());
        assert_eq!(
            hops(&r),
            vec![
                (v4(ROOT), Step::Root, "REFERRAL".to_string()),
                (None, Step::Tld, "EXHAUSTED".to_string()),
            ]
        );
        assert_eq!(resolver_asked(&resolver), vec![addr(ROOT), addr(GTLD)]);
    }
}

#[test_env_log::test]
fn test_hop_limit() {
    // Every server refers to the next, forever.
    let mut mock = MockExchanger::new();
    for i in 1..=20 {
        let next = Ipv4Addr::new(10, 0, 1, i + 1);
        let ns = format!("ns{}.loop.example.", i + 1);
        mock = mock.with(
            Ipv4Addr::new(10, 0, 1, i),
            Script::Reply(referral("loop.example.", &[(ns.as_str(), Some(next))])),
        );
    }

    let resolver = Resolver::new(mock, &config(&[Ipv4Addr::new(10, 0, 1, 1)]));
    let r = resolver.resolve("loop.example");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 10);
    assert_eq!(resolver_asked(&resolver).len(), 10);
    assert!(r.message.is_none());

    let last = r.trace.last().expect("an exhausted event");
    assert_eq!(last.response, Outcome::Exhausted);
    assert_eq!(last.server_ip, None);
    assert_eq!(r.trace.len(), 11);
}

#[test_env_log::test]
fn test_hop_limit_is_configurable() {
    let resolver = Resolver::new(
        example_com(),
        &Config {
            roots: vec![ROOT],
            hop_limit: 2,
            ..Default::default()
        },
    );
    let r = resolver.resolve("example.com");

    assert_eq!(r.state, State::Exhausted);
    assert_eq!(r.hops, 2);
}

#[test_env_log::test]
fn test_queries_are_iterative() {
    struct Check;

    impl iterdns::clients::Exchanger for Check {
        fn exchange(&self, _server: SocketAddr, query: &Message) -> iterdns::Result<Message> {
            assert!(!query.rd, "recursion must not be requested");
            assert_eq!(query.questions.len(), 1);
            assert_eq!(query.questions[0].name, "example.com.");
            assert_eq!(query.questions[0].qtype(), Some(Type::A));
            assert_eq!(query.questions[0].class, Class::Internet);

            Ok(query.reply(Rcode::NXDomain))
        }
    }

    let r = Resolver::new(Check, &config(&[ROOT])).resolve("example.com");
    assert_eq!(r.state, State::NxDomain);
}
