//! In-process mock ledger node for integration tests

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const TX_HASH: &str = "2434F57A60F5D847F1C348663DC510620A15F1D86009BDFA6587159EED2573DD";
pub const SENDER: &str = "rPJZ6ivZZ21RtyjudEVop67LQCrCWieTse";
pub const RECEIVER: &str = "rwietsevLFg8XSmG3bEZzFein1g8RBqWDZ";
pub const OTHER_HASH: &str = "C53ECF838647FA5A4C780377025FEC7999AB4182590510CA461444B207AB74A9";
pub const FULL_HISTORY: &str = "32570-80000000";

/// How the node answers `tx` requests
#[derive(Debug, Clone)]
pub enum TxReply {
    Found(Value),
    /// Known to the node but not in a validated ledger yet
    Unvalidated(Value),
    NotFound,
    Error(String),
    Silent,
}

#[derive(Debug, Clone)]
pub struct NodeBehavior {
    /// `None` never answers `server_info`
    pub complete_ledgers: Option<String>,
    pub tx: TxReply,
    pub reply_delay: Duration,
    /// Stream push sent this long after `subscribe`
    pub push: Option<(Duration, Value)>,
}

impl Default for NodeBehavior {
    fn default() -> Self {
        Self {
            complete_ledgers: Some(FULL_HISTORY.to_string()),
            tx: TxReply::Found(payment_result()),
            reply_delay: Duration::ZERO,
            push: None,
        }
    }
}

impl NodeBehavior {
    pub fn found() -> Self {
        Self::default()
    }

    pub fn not_found() -> Self {
        Self {
            tx: TxReply::NotFound,
            ..Self::default()
        }
    }

    pub fn unvalidated() -> Self {
        Self {
            tx: TxReply::Unvalidated(payment_result()),
            ..Self::default()
        }
    }

    pub fn history(mut self, ranges: &str) -> Self {
        self.complete_ledgers = Some(ranges.to_string());
        self
    }

    pub fn silent(mut self) -> Self {
        self.complete_ledgers = None;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    pub fn reply(mut self, tx: TxReply) -> Self {
        self.tx = tx;
        self
    }

    pub fn push_after(mut self, delay: Duration, message: Value) -> Self {
        self.push = Some((delay, message));
        self
    }
}

pub struct MockNode {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockNode {
    pub async fn start(behavior: NodeBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let user_agents = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requests = requests.clone();
            let user_agents = user_agents.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(
                        stream,
                        behavior.clone(),
                        requests.clone(),
                        user_agents.clone(),
                    ));
                }
            })
        };

        Self {
            url,
            requests,
            user_agents,
            handle,
        }
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn tx_requests(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["command"] == "tx")
            .collect()
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().clone()
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    stream: TcpStream,
    behavior: NodeBehavior,
    requests: Arc<Mutex<Vec<Value>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
) {
    let record_agent = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if let Some(agent) = request.headers().get("user-agent").and_then(|v| v.to_str().ok()) {
            user_agents.lock().push(agent.to_string());
        }
        Ok(response)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record_agent).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.to_string())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = source.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        requests.lock().push(request.clone());

        match request["command"].as_str() {
            Some("server_info") => {
                if let Some(ranges) = &behavior.complete_ledgers {
                    let _ = tx.send(json!({
                        "result": { "info": { "complete_ledgers": ranges, "build_version": "2.2.0" } },
                        "status": "success",
                        "type": "response"
                    }));
                }
            }
            Some("subscribe") => {
                let _ = tx.send(json!({ "result": {}, "status": "success", "type": "response" }));
                if let Some((delay, message)) = behavior.push.clone() {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(message);
                    });
                }
            }
            Some("tx") => {
                let Some(reply) = tx_reply(&request, &behavior.tx) else {
                    continue;
                };
                let tx = tx.clone();
                let delay = behavior.reply_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(reply);
                });
            }
            _ => {}
        }
    }
}

fn tx_reply(request: &Value, reply: &TxReply) -> Option<Value> {
    let id = request["id"].clone();
    match reply {
        TxReply::Found(result) => Some(json!({
            "id": id,
            "result": result,
            "status": "success",
            "type": "response"
        })),
        TxReply::Unvalidated(result) => {
            let mut result = result.clone();
            result["validated"] = json!(false);
            result.as_object_mut()?.remove("ledger_index");
            Some(json!({
                "id": id,
                "result": result,
                "status": "success",
                "type": "response"
            }))
        }
        TxReply::NotFound => {
            let mut echoed = request.clone();
            if let Some(map) = echoed.as_object_mut() {
                map.remove("id");
            }
            Some(json!({
                "id": id,
                "error": "txnNotFound",
                "error_code": 29,
                "error_message": "Transaction not found.",
                "request": echoed,
                "status": "error",
                "type": "response"
            }))
        }
        TxReply::Error(error) => Some(json!({
            "id": id,
            "error": error,
            "status": "error",
            "type": "response"
        })),
        TxReply::Silent => None,
    }
}

fn payment_meta() -> Value {
    json!({
        "AffectedNodes": [
            {
                "ModifiedNode": {
                    "LedgerEntryType": "AccountRoot",
                    "LedgerIndex": "1ED8DDFD80F275CB1CE7F18BB9D906655DE8029805D8B95FB9020B30425821EB",
                    "FinalFields": { "Account": SENDER, "Balance": "59389105", "Flags": 0, "Sequence": 31 },
                    "PreviousFields": { "Balance": "60389117", "Sequence": 30 }
                }
            },
            {
                "ModifiedNode": {
                    "LedgerEntryType": "AccountRoot",
                    "LedgerIndex": "A2A1E0E5B5F63CD5C3B2A9A1C4C8B53F6B0F5F0C3F1A4A9F5A9B2C1D0E0F1A2B",
                    "FinalFields": { "Account": RECEIVER, "Balance": "21000000", "Flags": 0, "Sequence": 7 },
                    "PreviousFields": { "Balance": "20000000" }
                }
            }
        ],
        "TransactionIndex": 3,
        "TransactionResult": "tesSUCCESS"
    })
}

fn payment_fields() -> Value {
    json!({
        "Account": SENDER,
        "Amount": "1000000",
        "Destination": RECEIVER,
        "Fee": "12",
        "Flags": 0,
        "Sequence": 30,
        "TransactionType": "Payment",
        "hash": TX_HASH
    })
}

/// `tx` result for a validated payment of 1 XRP (plus 12 drops fee)
pub fn payment_result() -> Value {
    let mut result = payment_fields();
    result["meta"] = payment_meta();
    result["ledger_index"] = json!(75000000);
    result["inLedger"] = json!(75000000);
    result["validated"] = json!(true);
    result
}

/// `transactions` stream push for the same payment
pub fn payment_push() -> Value {
    payment_push_for(TX_HASH)
}

/// `transactions` stream push for a payment with the given hash
pub fn payment_push_for(hash: &str) -> Value {
    let mut transaction = payment_fields();
    transaction["hash"] = json!(hash);
    json!({
        "type": "transaction",
        "engine_result": "tesSUCCESS",
        "ledger_index": 75000001,
        "meta": payment_meta(),
        "transaction": transaction,
        "validated": true
    })
}

pub fn endpoints(nodes: &[&MockNode]) -> Vec<String> {
    nodes.iter().map(|n| n.url.clone()).collect()
}

/// An address nothing listens on
pub fn dead_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}
