//! Ordering and exactly-once guarantees of the proxy and the channel.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use frame_connect::channel::Channel;
use frame_connect::envelope::PROTOCOL_TAG;
use frame_connect::network::NetworkId;
use frame_connect::rpc::RpcProvider;
use frame_connect::testing::{MemoryTransport, MockJsonRpc};
use frame_connect::{Error, Listener, ProviderFacade};
use serde_json::{json, Value as JsonValue};

#[tokio::test]
async fn test_queued_calls_reach_target_once_with_their_arguments() -> Result<()> {
    let client = Rc::new(MockJsonRpc::new().with("eth_getBalance", json!("0x01")));
    let (facade, resolver) = ProviderFacade::new()?;

    let addresses: Vec<String> = (0..25).map(|i| format!("0x{i:040x}")).collect();
    let pending: Vec<_> = addresses
        .iter()
        .map(|address| facade.get_balance(address, None))
        .collect();
    assert!(client.calls().is_empty());

    resolver.resolve(Rc::new(RpcProvider::new(client.clone(), "http://mock", NetworkId::default())))?;
    for call in pending {
        assert_eq!(call.await?, "0x01");
    }

    let forwarded: Vec<JsonValue> = client.calls().into_iter().map(|(_, params, _)| params).collect();
    let expected: Vec<JsonValue> = addresses.iter().map(|a| json!([a, "latest"])).collect();
    assert_eq!(forwarded, expected);
    Ok(())
}

#[tokio::test]
async fn test_queued_calls_reach_target_in_issue_order_when_awaited_backwards() -> Result<()> {
    let client = Rc::new(MockJsonRpc::new().with("eth_getBalance", json!("0x01")));
    let (facade, resolver) = ProviderFacade::new()?;

    let a = facade.get_balance("0xaaaa", None);
    let b = facade.get_balance("0xbbbb", None);
    resolver.resolve(Rc::new(RpcProvider::new(client.clone(), "http://mock", NetworkId::default())))?;
    assert_eq!(b.await?, "0x01");
    assert_eq!(a.await?, "0x01");

    let forwarded: Vec<JsonValue> = client.calls().into_iter().map(|(_, params, _)| params).collect();
    assert_eq!(forwarded, vec![json!(["0xaaaa", "latest"]), json!(["0xbbbb", "latest"])]);
    Ok(())
}

#[tokio::test]
async fn test_resolution_is_one_shot_and_reads_are_live() -> Result<()> {
    let (facade, resolver) = ProviderFacade::new()?;
    assert_eq!(
        facade.listener_count(None).unwrap_err(),
        Error::NotConnected("listenerCount".to_string())
    );

    let provider = Rc::new(RpcProvider::new(Rc::new(MockJsonRpc::new()), "http://mock", NetworkId::default()));
    resolver.resolve(provider.clone())?;
    assert_eq!(resolver.resolve(provider.clone()).unwrap_err(), Error::AlreadyResolved);

    assert_eq!(facade.listener_count(None)?, 0);
    let listener: Listener = Rc::new(|_: &JsonValue| {});
    facade.on("block", listener)?;
    assert_eq!(facade.listener_count(None)?, 1);
    provider.emit("block", &json!(1));
    facade.remove_all_listeners(None)?;
    assert_eq!(facade.listener_count(None)?, 0);
    Ok(())
}

#[test]
fn test_flush_preserves_issue_order() -> Result<()> {
    let channel = Channel::new("https://wallet.example");
    let ids = vec![
        channel.send("A", json!({}))?,
        channel.send("B", json!({}))?,
        channel.send("C", json!({}))?,
    ];
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let transport = MemoryTransport::new();
    channel.attach(transport.clone(), None)?;
    assert_eq!(transport.posted_actions(), vec!["ready", "A", "B", "C"]);
    assert!(transport
        .target_origins()
        .iter()
        .all(|origin| origin == "https://wallet.example"));

    let after = channel.send("D", json!({}))?;
    assert!(after > *ids.last().unwrap());
    let posted_ids: Vec<u64> = transport
        .posted()
        .iter()
        .filter_map(|m| m["id"].as_u64())
        .collect();
    let mut unique = posted_ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), posted_ids.len());
    Ok(())
}

#[test]
fn test_reply_callbacks_run_at_most_once() -> Result<()> {
    let channel = Channel::new("*");
    let transport = MemoryTransport::new();
    channel.attach(transport.clone(), None)?;

    let outcomes = Rc::new(RefCell::new(Vec::new()));
    let sink = outcomes.clone();
    let id = channel.send_with_reply("getAccount", json!({}), move |outcome| {
        sink.borrow_mut().push(outcome)
    })?;

    // a message from some other library sharing the window
    transport.deliver(json!({ "id": id, "result": "spoofed" }));
    transport.reply(id, json!("0xabc"));
    transport.reply(id, json!("0xdef"));
    transport.reply_error(id, "late");
    channel.teardown();

    assert_eq!(*outcomes.borrow(), vec![Ok(json!("0xabc"))]);
    assert!(transport.deliver(json!({ "ethers": PROTOCOL_TAG, "action": "accountChanged" })));
    Ok(())
}
