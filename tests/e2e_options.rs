//! End-to-end option command tests.
//!
//! Commands go through the registry the way a controller would send them and
//! are checked against the result codes it reports back.

use std::time::Duration;

use ppp::config::Config;
use ppp::error::result_code;
use ppp::link::{ControlMessage, LinkId, LinkRegistry, Outbox};
use ppp::options::{auth_proto, OptionId, OptionValue, RequesterId};

const LINK: LinkId = LinkId(5);

async fn registry_with_link(config: Config) -> LinkRegistry {
    let registry = LinkRegistry::new(config);
    registry.add_link(LINK, Box::new(Outbox::new())).await;
    registry
}

fn numeric(requester: u32, id: OptionId, value: u32) -> ControlMessage {
    ControlMessage::numeric(LINK, RequesterId(requester), id.as_raw(), value)
}

async fn stored(registry: &LinkRegistry, requester: u32, id: OptionId) -> Option<OptionValue> {
    let link = registry.get(LINK).await.unwrap();
    let ctx = link.lock().await;
    ctx.store().get(RequesterId(requester)).and_then(|set| set.value(id))
}

#[tokio::test]
async fn test_store_and_read_back() {
    let registry = registry_with_link(Config::default()).await;

    let reply = registry.handle(&numeric(1, OptionId::LcpMru, 1400)).await;
    assert!(reply.is_ok());
    assert_eq!(
        stored(&registry, 1, OptionId::LcpMru).await,
        Some(OptionValue::Numeric {
            value: 1400,
            is_set: true
        })
    );

    // a different requester has its own set
    assert_eq!(stored(&registry, 2, OptionId::LcpMru).await, None);
}

#[tokio::test]
async fn test_unknown_link_reports_no_device() {
    let registry = registry_with_link(Config::default()).await;
    let msg = ControlMessage::numeric(LinkId(99), RequesterId(1), OptionId::LcpMru.as_raw(), 1);
    assert_eq!(registry.handle(&msg).await.result, result_code::ENODEV);
}

#[tokio::test]
async fn test_unknown_option_reports_not_supported() {
    let registry = registry_with_link(Config::default()).await;
    let msg = ControlMessage::numeric(LINK, RequesterId(1), 4242, 1);
    assert_eq!(registry.handle(&msg).await.result, result_code::EOPNOTSUPP);
}

#[tokio::test]
async fn test_long_string_reports_message_size() {
    let registry = registry_with_link(Config::default()).await;

    let ok = ControlMessage::bytes(LINK, RequesterId(1), OptionId::AuthName.as_raw(), "dialer");
    assert!(registry.handle(&ok).await.is_ok());

    let long = ControlMessage::bytes(
        LINK,
        RequesterId(1),
        OptionId::AuthName.as_raw(),
        vec![b'x'; 256],
    );
    assert_eq!(registry.handle(&long).await.result, result_code::EMSGSIZE);

    // previous value survives
    assert_eq!(
        stored(&registry, 1, OptionId::AuthName).await,
        Some(OptionValue::BoundedString {
            bytes: b"dialer".to_vec(),
            is_set: true
        })
    );
}

#[tokio::test]
async fn test_auth_protocol_beyond_chap_is_invalid() {
    let registry = registry_with_link(Config::default()).await;

    let reply = registry
        .handle(&numeric(1, OptionId::AuthProto, auth_proto::CHAP + 1))
        .await;
    assert_eq!(reply.result, result_code::EINVAL);
    assert_eq!(
        stored(&registry, 1, OptionId::AuthProto).await,
        Some(OptionValue::Numeric {
            value: 0,
            is_set: false
        })
    );

    let reply = registry
        .handle(&numeric(1, OptionId::AuthProto, auth_proto::PAP))
        .await;
    assert!(reply.is_ok());
}

#[tokio::test]
async fn test_short_numeric_payload_is_invalid() {
    let registry = registry_with_link(Config::default()).await;
    let msg = ControlMessage::bytes(LINK, RequesterId(1), OptionId::LcpMru.as_raw(), vec![1, 2]);
    assert_eq!(registry.handle(&msg).await.result, result_code::EINVAL);
}

#[tokio::test]
async fn test_option_set_cap_reports_no_memory() {
    let mut config = Config::default();
    config.store.max_option_sets = 2;
    let registry = registry_with_link(config).await;

    assert!(registry.handle(&numeric(1, OptionId::LcpMtu, 1500)).await.is_ok());
    assert!(registry.handle(&numeric(2, OptionId::LcpMtu, 1500)).await.is_ok());

    // a third requester cannot get a set, even for an unknown option
    let reply = registry.handle(&numeric(3, OptionId::LcpMtu, 1500)).await;
    assert_eq!(reply.result, result_code::ENOMEM);
    let msg = ControlMessage::numeric(LINK, RequesterId(3), 4242, 1);
    assert_eq!(registry.handle(&msg).await.result, result_code::ENOMEM);

    // existing requesters keep writing
    assert!(registry.handle(&numeric(1, OptionId::LcpMru, 1200)).await.is_ok());
}

#[tokio::test]
async fn test_alert_enable_applies_to_link() {
    let registry = registry_with_link(Config::default()).await;

    let reply = registry.handle(&numeric(1, OptionId::AlertEnable, 3)).await;
    assert!(reply.is_ok());

    let link = registry.get(LINK).await.unwrap();
    let ctx = link.lock().await;
    assert_eq!(ctx.alert_enable(), 3);
    assert_eq!(ctx.store().get(RequesterId(1)).unwrap().value(OptionId::AlertEnable), None);
}

#[tokio::test]
async fn test_speed_rounds_up_the_ladder() {
    let registry = registry_with_link(Config::default()).await;
    assert!(registry.handle(&numeric(1, OptionId::DevSpeed, 20000)).await.is_ok());
    assert_eq!(
        stored(&registry, 1, OptionId::DevSpeed).await,
        Some(OptionValue::Numeric {
            value: 38400,
            is_set: true
        })
    );
}

#[tokio::test]
async fn test_echo_pair() {
    let registry = registry_with_link(Config::default()).await;
    let mut data = 10u32.to_ne_bytes().to_vec();
    data.extend_from_slice(&4u32.to_ne_bytes());
    let msg = ControlMessage::bytes(LINK, RequesterId(1), OptionId::LcpEcho.as_raw(), data);
    assert!(registry.handle(&msg).await.is_ok());

    let link = registry.get(LINK).await.unwrap();
    let ctx = link.lock().await;
    let lcp = &ctx.store().get(RequesterId(1)).unwrap().lcp;
    assert_eq!(lcp.echo_interval.get(), Some(10));
    assert_eq!(lcp.echo_failure.get(), Some(4));
}

#[tokio::test]
async fn test_requester_removal_drops_sets_everywhere() {
    let registry = registry_with_link(Config::default()).await;
    registry.add_link(LinkId(6), Box::new(Outbox::new())).await;

    registry.handle(&numeric(1, OptionId::LcpMru, 1400)).await;
    let other = ControlMessage::numeric(LinkId(6), RequesterId(1), OptionId::LcpMru.as_raw(), 1400);
    registry.handle(&other).await;

    registry.remove_requester(RequesterId(1)).await;

    for id in [LINK, LinkId(6)] {
        let link = registry.get(id).await.unwrap();
        assert!(link.lock().await.store().is_empty());
    }
}

#[tokio::test]
async fn test_removed_link_stops_answering() {
    let registry = registry_with_link(Config::default()).await;
    {
        let link = registry.get(LINK).await.unwrap();
        let mut ctx = link.lock().await;
        ctx.connect(None);
        ctx.lower_up();
    }

    registry.remove_link(LINK).await.unwrap();
    let reply = registry.handle(&numeric(1, OptionId::LcpMru, 1400)).await;
    assert_eq!(reply.result, result_code::ENODEV);

    // the terminate handshake times out and the link goes away
    for _ in 0..5 {
        registry.tick_all(Duration::from_secs(3)).await;
    }
    assert!(registry.is_empty().await);
}
