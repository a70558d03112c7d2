//! JSON-RPC 2.0 session over a single WebSocket.
//!
//! Requests and subscription notifications share the socket. The session
//! reads frames inline while it waits: a response to the pending request is
//! returned, notifications for other subscriptions are buffered until someone
//! asks for them. Nothing runs in the background, so the session is only ever
//! driven by its owner.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use zkv_common::{
    AggregationReceipt, ProofBundle, ProofSystemConfig, StatementPath, SubmissionOutcome,
};

use super::{Connector, Credential, Session, SessionConfig, SessionError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on notifications held for subscriptions nobody is reading.
const MAX_BUFFERED_NOTIFICATIONS: usize = 1024;

/// Opens [`WsSession`]s against a fixed endpoint.
#[derive(Clone, Debug)]
pub struct WsConnector {
    config: SessionConfig,
}

impl WsConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Session = WsSession;

    async fn open(&self, credential: &Credential) -> Result<WsSession, SessionError> {
        info!(
            "Opening session to {} (rpc {}, network {})",
            self.config.ws_url, self.config.rpc_url, self.config.network
        );

        let connect = connect_async(self.config.ws_url.as_str());
        let (stream, _) = timeout(self.config.request_timeout, connect)
            .await
            .map_err(|_| {
                SessionError::Connect(format!(
                    "No response received from {} within {}s",
                    self.config.ws_url,
                    self.config.request_timeout.as_secs()
                ))
            })?
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        let mut session = WsSession::new(stream, self.config.clone());
        if let Err(e) = session.authenticate(credential).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }
}

/// An authenticated connection to the aggregation network.
pub struct WsSession {
    stream: WsStream,
    config: SessionConfig,
    next_id: u64,
    buffered: VecDeque<(String, Value)>,
    aggregation_subscriptions: HashMap<u32, String>,
    account: Option<String>,
    closed: bool,
}

impl WsSession {
    fn new(stream: WsStream, config: SessionConfig) -> Self {
        Self {
            stream,
            config,
            next_id: 1,
            buffered: VecDeque::new(),
            aggregation_subscriptions: HashMap::new(),
            account: None,
            closed: false,
        }
    }

    /// Account id confirmed by the node during authentication.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    async fn authenticate(&mut self, credential: &Credential) -> Result<(), SessionError> {
        let network = self.config.network.clone();
        let challenge = self
            .call("session_challenge", json!([network]))
            .await
            .map_err(auth_error)?;
        let challenge = challenge
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Auth("node sent no challenge".into()))?;
        let challenge = hex::decode(challenge.trim_start_matches("0x"))
            .map_err(|e| SessionError::Auth(format!("invalid challenge: {}", e)))?;

        let account = credential.account_id();
        let response = self
            .call(
                "session_authenticate",
                json!({
                    "account": account,
                    "signature": credential.sign_challenge(&challenge),
                }),
            )
            .await
            .map_err(auth_error)?;

        let confirmed = response
            .get("account")
            .and_then(Value::as_str)
            .unwrap_or(&account)
            .to_string();
        debug!("Authenticated as {}", confirmed);
        self.account = Some(confirmed);
        Ok(())
    }

    /// Send a request and wait for its response.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        let id = self.next_id;
        self.next_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("rpc -> {} (id {})", method, id);
        self.stream
            .send(Message::Text(request.to_string()))
            .await
            .map_err(transport_error)?;

        let deadline = self.config.request_timeout;
        match timeout(deadline, self.await_response(id)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(format!(
                "No response received for {} within {}s",
                method,
                deadline.as_secs()
            ))),
        }
    }

    async fn call_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<T, SessionError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| SessionError::Protocol(format!("malformed {} result: {}", method, e)))
    }

    async fn subscribe(&mut self, method: &str, params: Value) -> Result<String, SessionError> {
        let result = self.call(method, params).await?;
        subscription_key(&result).ok_or_else(|| {
            SessionError::Protocol(format!("{} returned no subscription id", method))
        })
    }

    async fn await_response(&mut self, id: u64) -> Result<Value, SessionError> {
        loop {
            match self.read_incoming().await? {
                Incoming::Response { id: got, outcome } if got == id => return outcome,
                Incoming::Response { id: got, .. } => {
                    warn!("Discarding response to unknown request {}", got);
                }
                Incoming::Notification {
                    subscription,
                    result,
                } => self.buffer(subscription, result),
            }
        }
    }

    /// Next notification for `subscription`, buffered or from the socket.
    async fn next_notification(&mut self, subscription: &str) -> Result<Value, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if let Some(pos) = self.buffered.iter().position(|(s, _)| s == subscription) {
            if let Some((_, result)) = self.buffered.remove(pos) {
                return Ok(result);
            }
        }

        loop {
            match self.read_incoming().await? {
                Incoming::Notification {
                    subscription: s,
                    result,
                } if s == subscription => return Ok(result),
                Incoming::Notification {
                    subscription: s,
                    result,
                } => self.buffer(s, result),
                Incoming::Response { id, .. } => {
                    debug!("Ignoring late response to request {}", id);
                }
            }
        }
    }

    fn buffer(&mut self, subscription: String, result: Value) {
        if self.buffered.len() >= MAX_BUFFERED_NOTIFICATIONS {
            if let Some((dropped, _)) = self.buffered.pop_front() {
                warn!("Notification buffer full, dropping oldest for {}", dropped);
            }
        }
        self.buffered.push_back((subscription, result));
    }

    async fn read_incoming(&mut self) -> Result<Incoming, SessionError> {
        let frame = self.read_frame().await?;
        classify(frame)
    }

    async fn read_frame(&mut self) -> Result<Value, SessionError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(transport_error(e)),
                None => {
                    self.closed = true;
                    return Err(SessionError::Transport("connection disconnected".into()));
                }
            };

            match message {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map_err(|e| {
                        SessionError::Protocol(format!("invalid json frame: {}", e))
                    })
                }
                Message::Binary(bytes) => {
                    return serde_json::from_slice(&bytes).map_err(|e| {
                        SessionError::Protocol(format!("invalid json frame: {}", e))
                    })
                }
                Message::Close(frame) => {
                    self.closed = true;
                    return Err(close_error(frame));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn await_inclusion(
        &mut self,
        subscription: &str,
    ) -> Result<SubmissionOutcome, SessionError> {
        loop {
            let event = self.next_notification(subscription).await?;
            let status = event
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            match status.as_str() {
                "inBlock" | "finalized" => {
                    return serde_json::from_value(event).map_err(|e| {
                        SessionError::Protocol(format!("malformed transaction info: {}", e))
                    });
                }
                "invalid" | "dropped" | "error" => {
                    let reason = event
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or(&status)
                        .to_string();
                    return Err(SessionError::Rejected(reason));
                }
                other => debug!("Submission status: {}", other),
            }
        }
    }
}

#[async_trait]
impl Session for WsSession {
    async fn submit_proof(
        &mut self,
        bundle: &ProofBundle,
        system: ProofSystemConfig,
        domain_id: u32,
    ) -> Result<SubmissionOutcome, SessionError> {
        let params = json!({
            "proofType": system.proof_type,
            "config": { "library": system.library, "curve": system.curve },
            "proofData": {
                "vk": bundle.verification_key,
                "proof": bundle.proof,
                "publicSignals": bundle.public_signals,
            },
            "domainId": domain_id,
        });
        let subscription = self.subscribe("proof_submitAndWatch", params).await?;
        debug!("Submission watched on subscription {}", subscription);

        let deadline = self.config.inclusion_timeout;
        match timeout(deadline, self.await_inclusion(&subscription)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(format!(
                "Timeout exceeded waiting for inclusion after {}s",
                deadline.as_secs()
            ))),
        }
    }

    async fn next_aggregation_receipt(
        &mut self,
        domain_id: u32,
    ) -> Result<AggregationReceipt, SessionError> {
        let subscription = match self.aggregation_subscriptions.get(&domain_id) {
            Some(subscription) => subscription.clone(),
            None => {
                let subscription = self
                    .subscribe("aggregate_subscribeReceipts", json!([domain_id]))
                    .await?;
                self.aggregation_subscriptions
                    .insert(domain_id, subscription.clone());
                subscription
            }
        };

        let event = self.next_notification(&subscription).await?;
        serde_json::from_value(event)
            .map_err(|e| SessionError::Protocol(format!("malformed aggregation receipt: {}", e)))
    }

    async fn statement_path(
        &mut self,
        block_hash: &str,
        domain_id: u32,
        aggregation_id: u64,
        statement: &str,
    ) -> Result<StatementPath, SessionError> {
        self.call_as(
            "aggregate_statementPath",
            json!([block_hash, domain_id, aggregation_id, statement]),
        )
        .await
    }

    async fn vk_hash(
        &mut self,
        verification_key: &Value,
        system: ProofSystemConfig,
    ) -> Result<String, SessionError> {
        self.call_as(
            "vk_hash",
            json!({
                "proofType": system.proof_type,
                "config": { "library": system.library, "curve": system.curve },
                "vk": verification_key,
            }),
        )
        .await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match timeout(self.config.request_timeout, self.stream.close(None)).await {
            Ok(Ok(())) => debug!("Session closed"),
            Ok(Err(e)) => debug!("Session close: {}", e),
            Err(_) => debug!("Session close timed out"),
        }
    }
}

/// A decoded JSON-RPC frame.
enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, SessionError>,
    },
    Notification {
        subscription: String,
        result: Value,
    },
}

fn classify(frame: Value) -> Result<Incoming, SessionError> {
    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        let outcome = match frame.get("error") {
            Some(error) if !error.is_null() => Err(SessionError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            _ => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
        };
        return Ok(Incoming::Response { id, outcome });
    }

    let params = frame
        .get("params")
        .ok_or_else(|| SessionError::Protocol(format!("unrecognized frame: {}", frame)))?;
    let subscription = params
        .get("subscription")
        .and_then(subscription_key)
        .ok_or_else(|| SessionError::Protocol("notification without subscription id".into()))?;
    Ok(Incoming::Notification {
        subscription,
        result: params.get("result").cloned().unwrap_or(Value::Null),
    })
}

fn subscription_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn auth_error(err: SessionError) -> SessionError {
    match err {
        SessionError::Rpc { message, .. } => SessionError::Auth(message),
        other => other,
    }
}

fn transport_error(err: tungstenite::Error) -> SessionError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            SessionError::Transport("connection disconnected".into())
        }
        tungstenite::Error::Protocol(e) => {
            SessionError::Transport(format!("Abnormal Closure: {}", e))
        }
        other => SessionError::Transport(other.to_string()),
    }
}

fn close_error(frame: Option<CloseFrame<'static>>) -> SessionError {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => {
            SessionError::Transport(format!("disconnected by node: {}", frame.reason))
        }
        Some(frame) => SessionError::Transport(format!(
            "Abnormal Closure ({}): {}",
            u16::from(frame.code),
            frame.reason
        )),
        None => SessionError::Transport("Abnormal Closure".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_responses_and_errors() {
        match classify(json!({ "jsonrpc": "2.0", "id": 3, "result": "sub-1" })).unwrap() {
            Incoming::Response { id, outcome } => {
                assert_eq!(id, 3);
                assert_eq!(outcome.unwrap(), json!("sub-1"));
            }
            Incoming::Notification { .. } => panic!("expected response"),
        }

        let frame = json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": { "code": -32602, "message": "statement not found" }
        });
        match classify(frame).unwrap() {
            Incoming::Response { outcome, .. } => assert_eq!(
                outcome.unwrap_err(),
                SessionError::Rpc {
                    code: -32602,
                    message: "statement not found".into()
                }
            ),
            Incoming::Notification { .. } => panic!("expected response"),
        }
    }

    #[test]
    fn classifies_notifications_with_numeric_ids() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "aggregate_receipt",
            "params": { "subscription": 12, "result": { "aggregationId": 1 } }
        });
        match classify(frame).unwrap() {
            Incoming::Notification {
                subscription,
                result,
            } => {
                assert_eq!(subscription, "12");
                assert_eq!(result["aggregationId"], 1);
            }
            Incoming::Response { .. } => panic!("expected notification"),
        }
    }

    #[test]
    fn rejects_unrecognized_frames() {
        assert!(matches!(
            classify(json!({ "hello": "world" })),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn abnormal_close_is_retryable() {
        let err = close_error(Some(CloseFrame {
            code: CloseCode::Abnormal,
            reason: "".into(),
        }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Abnormal Closure"));

        assert!(close_error(None).is_retryable());
    }

    #[test]
    fn rpc_errors_during_auth_become_auth_errors() {
        let err = auth_error(SessionError::Rpc {
            code: 401,
            message: "unknown account".into(),
        });
        assert_eq!(err, SessionError::Auth("unknown account".into()));

        let err = auth_error(SessionError::Transport("reset".into()));
        assert!(err.is_retryable());
    }
}
