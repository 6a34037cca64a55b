//! Client handle: one live transport session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use zg_core::ModuleError;
use zg_executor::{CompletionPolicy, Operation, Signer, Submitter, TransactionHandle};
use zg_registry::{AuxServiceClient, DecodedError, ErrorEntry, ErrorTable};
use zg_ws::DynTransport;

use crate::bootstrap::Bootstrapper;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// A ready session with its error table and optional auxiliary service.
///
/// Owned by the caller that bootstrapped it. After [`disconnect`] every
/// operation fails with [`ClientError::Released`]; dropping an unreleased
/// handle closes the transport.
///
/// The error table is a snapshot taken at bootstrap. A node upgrade is not
/// seen until a fresh handle is bootstrapped.
///
/// [`disconnect`]: ClientHandle::disconnect
pub struct ClientHandle {
    address: String,
    transport: DynTransport,
    error_table: Arc<ErrorTable>,
    aux_service: Option<AuxServiceClient>,
    submitter: Submitter,
    released: AtomicBool,
}

impl ClientHandle {
    pub(crate) fn new(
        address: impl Into<String>,
        transport: DynTransport,
        error_table: Arc<ErrorTable>,
        aux_service: Option<AuxServiceClient>,
    ) -> Self {
        let submitter = Submitter::new(transport.clone(), Some(error_table.clone()));
        Self {
            address: address.into(),
            transport,
            error_table,
            aux_service,
            submitter,
            released: AtomicBool::new(false),
        }
    }

    /// Bootstrap from a config with the default resolver and prober.
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let bootstrapper = Bootstrapper::from_config(config)?;
        Ok(bootstrapper.bootstrap_config(config).await?)
    }

    /// Target address this handle was bootstrapped against.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn live(&self) -> ClientResult<()> {
        if self.is_released() {
            return Err(ClientError::Released);
        }
        Ok(())
    }

    pub fn error_table(&self) -> ClientResult<Arc<ErrorTable>> {
        self.live()?;
        Ok(self.error_table.clone())
    }

    /// Auxiliary service client, present only if the probe succeeded.
    pub fn aux_service(&self) -> ClientResult<Option<&AuxServiceClient>> {
        self.live()?;
        Ok(self.aux_service.as_ref())
    }

    pub fn has_aux_service(&self) -> ClientResult<bool> {
        self.live()?;
        Ok(self.aux_service.is_some())
    }

    /// Look up `{subsystem, error}`. `Ok(None)` means not found.
    pub fn lookup_error(&self, subsystem: u32, error: u32) -> ClientResult<Option<ErrorEntry>> {
        self.live()?;
        Ok(self.error_table.get_entry(subsystem, error).cloned())
    }

    pub fn decode_module_error(&self, error: ModuleError) -> ClientResult<DecodedError> {
        self.live()?;
        Ok(self.error_table.decode(error))
    }

    /// Sign and submit an operation.
    ///
    /// Returns once the node acknowledges the watch subscription. Every
    /// later failure arrives through the returned handle.
    pub async fn submit(
        &self,
        operation: Operation,
        signer: &dyn Signer,
        policy: CompletionPolicy,
    ) -> ClientResult<TransactionHandle> {
        self.live()?;
        Ok(self.submitter.submit(operation, signer, policy).await?)
    }

    /// Release the session. Live transaction streams close.
    pub fn disconnect(&self) -> ClientResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Released);
        }
        info!(address = %self.address, "Disconnecting client");
        self.transport.close();
        Ok(())
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.transport.close();
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("address", &self.address)
            .field("pallets", &self.error_table.pallet_count())
            .field("aux_service", &self.aux_service.as_ref().map(AuxServiceClient::url))
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};
    use zg_executor::{KeyManager, LocalSigner, TransactionError, NONCE_METHOD};
    use zg_registry::{PalletMetadata, PalletsSection, TypeMetadata, TypesSection, VariantMetadata};
    use zg_ws::MockTransport;

    fn table() -> Arc<ErrorTable> {
        let pallets = PalletsSection {
            version: 1,
            pallets: vec![PalletMetadata {
                name: "Court".into(),
                index: 61,
                error: Some(7),
            }],
        };
        let types = TypesSection {
            version: 1,
            types: vec![TypeMetadata {
                id: 7,
                path: vec!["zrml_court".into(), "pallet".into(), "Error".into()],
                variants: vec![
                    VariantMetadata {
                        name: "JurorDoesNotExist".into(),
                        docs: vec!["An account id does not exist on the jurors storage.".into()],
                    },
                    VariantMetadata {
                        name: "CourtNotFound".into(),
                        docs: vec![],
                    },
                ],
            }],
        };
        Arc::new(ErrorTable::from_sections(pallets, types).unwrap())
    }

    fn handle(mock: &Arc<MockTransport>) -> ClientHandle {
        ClientHandle::new("ws://127.0.0.1:9944", mock.clone(), table(), None)
    }

    fn signer() -> LocalSigner {
        let key =
            hex::decode("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80").unwrap();
        LocalSigner::new(Arc::new(KeyManager::from_bytes(&key, None).unwrap()))
    }

    #[test]
    fn test_lookup_and_decode() {
        let mock = Arc::new(MockTransport::new());
        let client = handle(&mock);

        let entry = client.lookup_error(61, 1).unwrap().unwrap();
        assert_eq!(entry.name, "CourtNotFound");
        assert!(client.lookup_error(61, 2).unwrap().is_none());
        assert!(client.lookup_error(99, 0).unwrap().is_none());

        let decoded = client.decode_module_error(ModuleError::new(61, 0)).unwrap();
        assert_eq!(
            decoded.to_string(),
            "Court.JurorDoesNotExist: An account id does not exist on the jurors storage."
        );
        assert_eq!(
            client.decode_module_error(ModuleError::new(99, 0)).unwrap(),
            DecodedError::Raw(ModuleError::new(99, 0))
        );
    }

    #[tokio::test]
    async fn test_released_handle_rejects_everything() {
        let mock = Arc::new(MockTransport::new());
        let client = handle(&mock);

        assert_ok!(client.disconnect());
        assert_eq!(mock.close_count(), 1);
        assert!(client.is_released());

        assert!(matches!(client.disconnect(), Err(ClientError::Released)));
        assert!(matches!(client.lookup_error(61, 0), Err(ClientError::Released)));
        assert!(matches!(client.error_table(), Err(ClientError::Released)));
        assert!(matches!(client.aux_service(), Err(ClientError::Released)));
        assert!(matches!(client.has_aux_service(), Err(ClientError::Released)));
        assert_err!(client.decode_module_error(ModuleError::new(61, 0)));

        let result = client
            .submit(
                Operation::new("System", "remark", json!({})),
                &signer(),
                CompletionPolicy::AllEvents,
            )
            .await;
        assert!(matches!(result, Err(ClientError::Released)));
        assert!(mock.requests().is_empty());

        drop(client);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_drop_closes_transport() {
        let mock = Arc::new(MockTransport::new());
        drop(handle(&mock));
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_ends_live_transactions() {
        let mock = Arc::new(MockTransport::new());
        mock.set_response(NONCE_METHOD, json!(0));
        let client = handle(&mock);

        let mut tx = client
            .submit(
                Operation::new("System", "remark", json!({})),
                &signer(),
                CompletionPolicy::AllEvents,
            )
            .await
            .unwrap();

        client.disconnect().unwrap();
        assert_eq!(tx.wait().await, Err(TransactionError::SubscriptionLost));
    }
}
