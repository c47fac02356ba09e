//! WebSocket Integration Tests
//!
//! Runs the websocket endpoint on a local port against an in-memory chain:
//! - Subscription id delivered before the first push
//! - eth_unsubscribe argument checking
//! - Subscriptions torn down when the socket closes

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use node_client::{mock::MockChain, NodeLog, ReceiptEntry, WaitForLogsResponse};
use notifier::{Agent, AgentConfig, LogPollConfig, NotifierConfig};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use chain_sync::{BlockSyncer, SyncConfig};

use crate::{RpcContext, WebSocketServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    agent: Arc<Agent>,
    token: CancellationToken,
    url: String,
}

async fn start(chain: Arc<MockChain>) -> Harness {
    let token = CancellationToken::new();
    let config = AgentConfig {
        new_heads_interval: Duration::from_millis(20),
        log_poll: LogPollConfig {
            min_call_spacing: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            ..Default::default()
        },
    };
    let agent = Agent::new(chain.clone(), config, &token);
    let context = Arc::new(RpcContext {
        client: chain.clone(),
        syncer: Arc::new(BlockSyncer::new(chain, SyncConfig::default())),
        agent: agent.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = WebSocketServer::new(context, NotifierConfig::default());
    tokio::spawn(server.serve(listener, token.clone()));

    Harness { agent, token, url }
}

async fn connect(harness: &Harness) -> Client {
    let (client, _) = connect_async(harness.url.as_str()).await.unwrap();
    client
}

async fn call(client: &mut Client, id: u64, method: &str, params: Value) {
    let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
    client.send(Message::Text(request.to_string())).await.unwrap();
}

async fn next_json(client: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    })
    .await
    .unwrap()
}

fn topic1_logs() -> WaitForLogsResponse {
    WaitForLogsResponse {
        entries: vec![ReceiptEntry {
            block_hash: "aa".repeat(32),
            block_number: 12,
            transaction_hash: "bb".repeat(32),
            transaction_index: 1,
            log: vec![NodeLog {
                address: "cc".repeat(20),
                topics: vec!["topic1".to_string()],
                data: "".to_string(),
            }],
            ..Default::default()
        }],
        count: 1,
        next_block: 13,
    }
}

#[tokio::test]
async fn test_logs_subscription_over_websocket() {
    let chain = Arc::new(MockChain::new(20));
    chain.set_default_logs(topic1_logs());
    let harness = start(chain).await;
    let mut client = connect(&harness).await;

    call(&mut client, 1, "eth_subscribe", json!(["logs", {"topics": ["topic1"]}])).await;

    let response = next_json(&mut client).await;
    assert_eq!(response["id"], 1);
    let id = response["result"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 34);

    let push = next_json(&mut client).await;
    assert_eq!(push["method"], "eth_subscription");
    assert_eq!(push["params"]["subscription"], json!(id));
    assert_eq!(push["params"]["result"]["topics"], json!(["0xtopic1"]));
    assert_eq!(push["params"]["result"]["transactionIndex"], "0x1");

    call(&mut client, 2, "eth_unsubscribe", json!([id, "extra"])).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["error"]["code"], -32602);

    call(&mut client, 3, "eth_unsubscribe", json!([id])).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["result"], true);
    assert_eq!(harness.agent.subscription_count(), 0);

    call(&mut client, 4, "eth_unsubscribe", json!([id])).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["result"], false);

    harness.token.cancel();
}

#[tokio::test]
async fn test_unknown_subscription_type_over_websocket() {
    let harness = start(Arc::new(MockChain::new(20))).await;
    let mut client = connect(&harness).await;

    call(&mut client, 7, "eth_subscribe", json!(["blocks"])).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -32602);

    client.send(Message::Text("not json".to_string())).await.unwrap();
    let response = next_json(&mut client).await;
    assert_eq!(response["error"]["code"], -32700);

    // The connection is still usable
    call(&mut client, 8, "eth_blockNumber", json!([])).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["result"], "0x14");

    harness.token.cancel();
}

#[tokio::test]
async fn test_socket_close_drops_subscriptions() {
    let harness = start(Arc::new(MockChain::new(20))).await;
    let mut client = connect(&harness).await;

    call(&mut client, 1, "eth_subscribe", json!(["newHeads"])).await;
    call(&mut client, 2, "eth_subscribe", json!(["logs", {}])).await;
    next_json(&mut client).await;
    next_json(&mut client).await;
    assert_eq!(harness.agent.subscription_count(), 2);

    client.close(None).await.unwrap();
    drop(client);

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.agent.subscription_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    harness.token.cancel();
}
