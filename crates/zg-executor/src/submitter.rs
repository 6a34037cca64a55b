//! Transaction submitter.
//!
//! `submit` suspends only for nonce lookup, signing and the node's
//! acknowledgement of the watch subscription. Everything after that runs
//! in a per-transaction driver task that feeds the lifecycle state machine.
//!
//! Sign-and-dispatch is serialised per signer address so that concurrent
//! submissions from one account never read the same nonce. Observation of
//! the resulting handles is fully concurrent.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zg_core::{ChainEvent, StatusUpdate};
use zg_registry::{DecodedError, ErrorTable};
use zg_telemetry::Metrics;
use zg_ws::{DynTransport, Subscription, WsError};

use crate::error::{ExecutorError, ExecutorResult, TransactionError};
use crate::guard::UnsubscribeGuard;
use crate::handle::{FinalizedTx, TransactionHandle, TransactionOutcome};
use crate::lifecycle::{Lifecycle, Step, TxState};
use crate::operation::{Operation, SignedOperation};
use crate::policy::CompletionPolicy;
use crate::signer::Signer;

pub const NONCE_METHOD: &str = "system_accountNextIndex";
pub const SUBMIT_METHOD: &str = "author_submitAndWatchExtrinsic";
pub const UNWATCH_METHOD: &str = "author_unwatchExtrinsic";

/// Submits signed operations over a shared transport.
pub struct Submitter {
    transport: DynTransport,
    error_table: Option<Arc<ErrorTable>>,
    signer_locks: DashMap<Address, Arc<TokioMutex<()>>>,
}

impl Submitter {
    pub fn new(transport: DynTransport, error_table: Option<Arc<ErrorTable>>) -> Self {
        Self {
            transport,
            error_table,
            signer_locks: DashMap::new(),
        }
    }

    /// Sign, dispatch and start observing an operation.
    ///
    /// # Errors
    ///
    /// - `SubmissionRejected`: local validation failed, or the node refused
    ///   the submission call
    /// - `Transport`: nonce lookup or dispatch failed at the transport level
    /// - `Signer`: the signer could not produce a signature
    pub async fn submit(
        &self,
        operation: Operation,
        signer: &dyn Signer,
        policy: CompletionPolicy,
    ) -> ExecutorResult<TransactionHandle> {
        operation.validate()?;

        let address = signer.address();
        let subscription = {
            let lock = self.signer_lock(address);
            let _serialised = lock.lock().await;

            let nonce = self.next_nonce(address).await?;
            let hash = operation.signing_hash(nonce)?;
            let signature = signer.sign(hash).await?;

            let signed = SignedOperation {
                call: operation.clone(),
                signer: address.to_string(),
                nonce,
                signature,
            };
            debug!(op = %operation, %address, nonce, "Dispatching signed operation");
            self.dispatch(&signed).await?
        };

        Ok(self.observe(operation, subscription, policy))
    }

    fn signer_lock(&self, address: Address) -> Arc<TokioMutex<()>> {
        self.signer_locks
            .entry(address)
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    async fn next_nonce(&self, address: Address) -> ExecutorResult<u64> {
        let value = self
            .transport
            .request(NONCE_METHOD, json!([address.to_string()]))
            .await?;
        value.as_u64().ok_or_else(|| {
            ExecutorError::InvalidResponse(format!("{NONCE_METHOD} returned {value}"))
        })
    }

    async fn dispatch(&self, signed: &SignedOperation) -> ExecutorResult<Subscription> {
        let params = json!([serde_json::to_value(signed)
            .map_err(|e| ExecutorError::SubmissionRejected(e.to_string()))?]);

        self.transport
            .subscribe(SUBMIT_METHOD, params, UNWATCH_METHOD)
            .await
            .map_err(|e| match e {
                WsError::Rpc(rpc) => {
                    warn!(op = %signed.call, code = rpc.code, message = %rpc.message, "Submission rejected by node");
                    ExecutorError::SubmissionRejected(rpc.to_string())
                }
                other => ExecutorError::Transport(other),
            })
    }

    fn observe(
        &self,
        operation: Operation,
        subscription: Subscription,
        policy: CompletionPolicy,
    ) -> TransactionHandle {
        let id = Uuid::new_v4();
        let lifecycle = Arc::new(Mutex::new(Lifecycle::new()));
        let guard = Arc::new(UnsubscribeGuard::new(
            self.transport.clone(),
            subscription.unsubscribe_method.clone(),
            subscription.id.clone(),
        ));
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();

        Metrics::tx_submitted();
        info!(tx = %id, op = %operation, subscription = %subscription.id, "Operation submitted");

        let driver = Driver {
            id,
            lifecycle: lifecycle.clone(),
            guard: guard.clone(),
            cancel: cancel.clone(),
            error_table: self.error_table.clone(),
            policy,
            status_tx,
            done_tx,
        };
        tokio::spawn(driver.run(subscription.notifications));

        TransactionHandle::new(id, lifecycle, guard, cancel, status_rx, done_rx)
    }
}

/// Per-transaction task consuming the status stream.
struct Driver {
    id: Uuid,
    lifecycle: Arc<Mutex<Lifecycle>>,
    guard: Arc<UnsubscribeGuard>,
    cancel: CancellationToken,
    error_table: Option<Arc<ErrorTable>>,
    policy: CompletionPolicy,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
    done_tx: oneshot::Sender<TransactionOutcome>,
}

impl Driver {
    async fn run(self, mut notifications: mpsc::UnboundedReceiver<Value>) {
        let outcome = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    self.lifecycle.lock().abandon(TxState::Cancelled);
                    break Err(TransactionError::Cancelled);
                }

                raw = notifications.recv() => {
                    let Some(raw) = raw else {
                        // Stream closed by the transport (disconnect or unsubscribe).
                        let lost = self.lifecycle.lock().abandon(TxState::Lost);
                        break Err(if lost {
                            TransactionError::SubscriptionLost
                        } else {
                            TransactionError::Cancelled
                        });
                    };

                    let update = match StatusUpdate::from_wire(&raw) {
                        Ok(update) => update,
                        Err(e) => {
                            warn!(tx = %self.id, error = %e, "Skipping malformed status update");
                            continue;
                        }
                    };

                    let step = self.lifecycle.lock().apply(&update);
                    debug!(tx = %self.id, tag = %update.tag, ?step, "Status update");

                    match step {
                        Step::Ignored => continue,
                        Step::Progress => {
                            let _ = self.status_tx.send(update);
                        }
                        Step::Finalized => {
                            let outcome = self.finalized(&update);
                            let _ = self.status_tx.send(update);
                            break outcome;
                        }
                        Step::Failed(tag) => {
                            let _ = self.status_tx.send(update);
                            break Err(TransactionError::Rejected { tag });
                        }
                    }
                }
            }
        };

        self.guard.release();
        self.finish(outcome);
    }

    fn finalized(&self, update: &StatusUpdate) -> TransactionOutcome {
        if let Some(raw) = update.dispatch_error() {
            let decoded = match &self.error_table {
                Some(table) => table.decode(raw),
                None => DecodedError::Raw(raw),
            };
            return Err(TransactionError::NodeReported(decoded));
        }

        let own: Vec<ChainEvent> = update.own_events().cloned().collect();
        Ok(FinalizedTx {
            block: update.block.clone(),
            events: update.events.clone(),
            selected: self.policy.select(&own),
        })
    }

    fn finish(self, outcome: TransactionOutcome) {
        match &outcome {
            Ok(done) => {
                info!(
                    tx = %self.id,
                    block = ?done.block.as_ref().map(|b| b.as_str()),
                    events = done.events.len(),
                    "Transaction finalized"
                );
                Metrics::tx_outcome("finalized");
            }
            Err(e) => {
                warn!(tx = %self.id, tag = e.tag(), error = %e, "Transaction failed");
                Metrics::tx_outcome(e.outcome_label());
            }
        }
        // The handle may already be gone.
        let _ = self.done_tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{KeyManager, LocalSigner};
    use std::time::Duration;
    use zg_core::{ModuleError, StatusTag};
    use zg_registry::{
        PalletMetadata, PalletsSection, TypeMetadata, TypesSection, VariantMetadata,
    };
    use zg_ws::{MockTransport, RpcError};

    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn signer() -> LocalSigner {
        let bytes = hex::decode(TEST_PRIVATE_KEY).unwrap();
        LocalSigner::new(Arc::new(KeyManager::from_bytes(&bytes, None).unwrap()))
    }

    fn mock() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.set_response(NONCE_METHOD, json!(7));
        mock
    }

    fn table() -> Arc<ErrorTable> {
        let pallets = PalletsSection {
            version: 1,
            pallets: vec![PalletMetadata {
                name: "PredictionMarkets".into(),
                index: 57,
                error: Some(20),
            }],
        };
        let types = TypesSection {
            version: 1,
            types: vec![TypeMetadata {
                id: 20,
                path: vec!["zrml_prediction_markets".into(), "Error".into()],
                variants: vec![VariantMetadata {
                    name: "MarketIsNotActive".into(),
                    docs: vec!["Market is not active.".into()],
                }],
            }],
        };
        Arc::new(ErrorTable::from_sections(pallets, types).unwrap())
    }

    fn remark() -> Operation {
        Operation::new("System", "remark", json!({"remark": "0x00"}))
    }

    async fn submit(
        submitter: &Submitter,
        policy: CompletionPolicy,
    ) -> TransactionHandle {
        submitter.submit(remark(), &signer(), policy).await.unwrap()
    }

    #[tokio::test]
    async fn test_in_block_then_finalized_with_event() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), Some(table()));
        let mut tx = submit(&submitter, CompletionPolicy::first("Court", "X")).await;
        let sub = tx.subscription_id().to_string();
        assert_eq!(tx.state(), TxState::Submitted);

        mock.push(&sub, json!("ready"));
        mock.push(&sub, json!({"inBlock": "0xb1"}));
        mock.push(
            &sub,
            json!({"finalized": {"block": "0xb1", "events": [
                {"pallet": "Court", "pallet_index": 61, "name": "X", "fields": {"n": 1}},
                {"pallet": "System", "pallet_index": 0, "name": "ExtrinsicSuccess", "fields": {}}
            ]}}),
        );
        // Redelivered terminal notification.
        mock.push(&sub, json!({"finalized": "0xb1"}));

        let mut tags = Vec::new();
        for _ in 0..3 {
            tags.push(tx.next_status().await.unwrap().tag);
        }
        assert_eq!(
            tags,
            vec![StatusTag::Queued, StatusTag::InBlock, StatusTag::Finalized]
        );

        let done = tx.wait().await.unwrap();
        assert_eq!(done.events.len(), 2);
        assert_eq!(done.selected.unwrap().name, "X");
        assert!(matches!(tx.state(), TxState::Finalized { .. }));

        // Stream is finished; no second finalized surfaces.
        assert!(tx.next_status().await.is_none());
        assert_eq!(mock.unsubscribe_count_for(&sub), 1);

        drop(tx);
        assert_eq!(mock.unsubscribe_count_for(&sub), 1);
    }

    #[tokio::test]
    async fn test_other_extrinsic_failure_in_same_block() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), Some(table()));
        let mut tx = submit(&submitter, CompletionPolicy::first("Court", "JoinedAsJuror")).await;

        mock.push(
            tx.subscription_id(),
            json!({"finalized": {"block": "0xb3", "extrinsic_index": 1, "events": [
                {"pallet": "Court", "pallet_index": 61, "name": "JoinedAsJuror",
                 "fields": {"juror": "a"}, "extrinsic_index": 1},
                {"pallet": "System", "pallet_index": 0, "name": "ExtrinsicSuccess",
                 "fields": {}, "extrinsic_index": 1},
                {"pallet": "Court", "pallet_index": 61, "name": "JoinedAsJuror",
                 "fields": {"juror": "b"}, "extrinsic_index": 2},
                {"pallet": "System", "pallet_index": 0, "name": "ExtrinsicFailed",
                 "fields": {"dispatch_error": {"module": {"index": 57, "error": 0}}},
                 "extrinsic_index": 2}
            ]}}),
        );

        let done = tx.wait().await.unwrap();
        assert_eq!(done.events.len(), 4);
        let selected = done.selected.unwrap();
        assert_eq!(selected.fields["juror"], "a");
        assert_eq!(selected.extrinsic_index, Some(1));
    }

    #[tokio::test]
    async fn test_invalid_without_in_block() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);
        let mut tx = submit(&submitter, CompletionPolicy::AllEvents).await;
        let sub = tx.subscription_id().to_string();

        mock.push(&sub, json!("invalid"));
        mock.push(&sub, json!({"finalized": "0xb1"}));

        assert_eq!(
            tx.wait().await,
            Err(TransactionError::Rejected {
                tag: StatusTag::Invalid
            })
        );
        assert_eq!(tx.next_status().await.unwrap().tag, StatusTag::Invalid);
        assert!(tx.next_status().await.is_none());
        assert_eq!(tx.state(), TxState::Failed { tag: StatusTag::Invalid });
        assert_eq!(mock.unsubscribe_count_for(&sub), 1);
    }

    #[tokio::test]
    async fn test_node_reported_error_decoded_or_raw() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), Some(table()));
        let failed_block = |index: u32, error: u32| {
            json!({"finalized": {"block": "0xb2", "events": [
                {"pallet": "System", "pallet_index": 0, "name": "ExtrinsicFailed",
                 "fields": {"dispatch_error": {"module": {"index": index, "error": error}}}}
            ]}})
        };

        let mut known = submit(&submitter, CompletionPolicy::AllEvents).await;
        mock.push(known.subscription_id(), failed_block(57, 0));
        match known.wait().await {
            Err(TransactionError::NodeReported(decoded)) => {
                assert_eq!(decoded.entry().unwrap().name, "MarketIsNotActive");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let mut unknown = submit(&submitter, CompletionPolicy::AllEvents).await;
        mock.push(unknown.subscription_id(), failed_block(99, 0));
        assert_eq!(
            unknown.wait().await,
            Err(TransactionError::NodeReported(DecodedError::Raw(
                ModuleError::new(99, 0)
            )))
        );
    }

    #[tokio::test]
    async fn test_cancel_unsubscribes_once() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);
        let mut tx = submit(&submitter, CompletionPolicy::AllEvents).await;
        let sub = tx.subscription_id().to_string();

        mock.push(&sub, json!({"inBlock": "0xb1"}));
        assert_eq!(tx.next_status().await.unwrap().tag, StatusTag::InBlock);

        tx.cancel();
        tx.cancel();
        assert_eq!(tx.state(), TxState::Cancelled);
        assert_eq!(tx.wait().await, Err(TransactionError::Cancelled));

        // Late terminal notification after cancellation.
        mock.push(&sub, json!({"finalized": "0xb1"}));
        drop(tx);
        tokio::task::yield_now().await;
        assert_eq!(mock.unsubscribe_count_for(&sub), 1);
    }

    #[tokio::test]
    async fn test_drop_before_terminal_unsubscribes() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);
        let tx = submit(&submitter, CompletionPolicy::AllEvents).await;
        let sub = tx.subscription_id().to_string();

        drop(tx);
        assert_eq!(mock.unsubscribe_count_for(&sub), 1);
    }

    #[tokio::test]
    async fn test_cancel_races_terminal_status() {
        for _ in 0..50 {
            let mock = mock();
            let submitter = Submitter::new(mock.clone(), None);
            let tx = submit(&submitter, CompletionPolicy::AllEvents).await;
            let sub = tx.subscription_id().to_string();

            let pusher = {
                let mock = mock.clone();
                let sub = sub.clone();
                tokio::spawn(async move {
                    mock.push(&sub, json!({"finalized": "0xb1"}));
                    mock.push(&sub, json!({"finalized": "0xb1"}));
                })
            };
            let canceller = tokio::spawn(async move {
                tokio::task::yield_now().await;
                tx.cancel();
                tx
            });

            pusher.await.unwrap();
            let mut tx = canceller.await.unwrap();
            let outcome = tx.wait().await;
            assert!(
                outcome.is_ok() || outcome == Err(TransactionError::Cancelled),
                "{outcome:?}"
            );
            drop(tx);
            assert_eq!(mock.unsubscribe_count_for(&sub), 1);
        }
    }

    #[tokio::test]
    async fn test_stream_loss_surfaces_asynchronously() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);
        let mut tx = submit(&submitter, CompletionPolicy::AllEvents).await;

        mock.end_subscription(tx.subscription_id());
        assert_eq!(tx.wait().await, Err(TransactionError::SubscriptionLost));
        assert_eq!(tx.state(), TxState::Lost);
    }

    #[tokio::test]
    async fn test_submission_rejected_synchronously() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);

        let invalid = Operation::new("", "remark", json!({}));
        let result = submitter
            .submit(invalid, &signer(), CompletionPolicy::AllEvents)
            .await;
        assert!(matches!(result, Err(ExecutorError::SubmissionRejected(_))));
        assert!(mock.requests().is_empty());

        mock.reject_subscriptions(RpcError::new(1010, "Invalid Transaction: bad signature"));
        let result = submitter
            .submit(remark(), &signer(), CompletionPolicy::AllEvents)
            .await;
        match result {
            Err(e @ ExecutorError::SubmissionRejected(_)) => {
                assert_eq!(e.tag(), "SubmissionRejected");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.unsubscribe_count(), 0);
    }

    #[tokio::test]
    async fn test_nonce_failures() {
        let mock = Arc::new(MockTransport::new());
        let submitter = Submitter::new(mock.clone(), None);

        let result = submitter
            .submit(remark(), &signer(), CompletionPolicy::AllEvents)
            .await;
        assert!(matches!(result, Err(ExecutorError::Transport(_))));

        mock.set_response(NONCE_METHOD, json!("seven"));
        let result = submitter
            .submit(remark(), &signer(), CompletionPolicy::AllEvents)
            .await;
        assert!(matches!(result, Err(ExecutorError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_submission_payload() {
        let mock = mock();
        let submitter = Submitter::new(mock.clone(), None);
        let signer = signer();
        let _tx = submitter
            .submit(remark(), &signer, CompletionPolicy::AllEvents)
            .await
            .unwrap();

        let nonce_params = mock.requests_for(NONCE_METHOD);
        assert_eq!(nonce_params, vec![json!([signer.address().to_string()])]);

        let submitted = mock.requests_for(SUBMIT_METHOD);
        let payload = &submitted[0][0];
        assert_eq!(payload["call"]["pallet"], "System");
        assert_eq!(payload["nonce"], 7);
        assert_eq!(payload["signer"], signer.address().to_string());
        let v = payload["signature"]["v"].as_u64().unwrap();
        assert!(v == 27 || v == 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_signer_dispatch_is_serialised() {
        let mock = mock();
        mock.set_delay(NONCE_METHOD, Duration::from_millis(100));
        let submitter = Arc::new(Submitter::new(mock.clone(), None));

        let a = {
            let submitter = submitter.clone();
            tokio::spawn(async move {
                submitter
                    .submit(remark(), &signer(), CompletionPolicy::AllEvents)
                    .await
                    .unwrap()
            })
        };
        let b = {
            let submitter = submitter.clone();
            tokio::spawn(async move {
                submitter
                    .submit(remark(), &signer(), CompletionPolicy::AllEvents)
                    .await
                    .unwrap()
            })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        // Nonce lookups never interleave with another dispatch.
        let methods: Vec<String> = mock.requests().into_iter().map(|(m, _)| m).collect();
        assert_eq!(
            methods,
            vec![NONCE_METHOD, SUBMIT_METHOD, NONCE_METHOD, SUBMIT_METHOD]
        );
        assert_ne!(a.subscription_id(), b.subscription_id());
    }
}
