//! Connection bootstrapper.
//!
//! Resolves an address into a pending session and races three outcomes:
//! the transport's `Connected` signal, the error count passing
//! `max_retries`, and the connect timer. The first settled outcome wins.
//! On success the auxiliary service is probed (best effort) and the error
//! table is populated before the handle is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info, warn};
use zg_registry::{AuxServiceClient, ErrorTable, HttpProber, Probe, RegistryError};
use zg_telemetry::Metrics;
use zg_ws::{DynTransport, PendingSession, Resolve, TransportResolver, TransportSignal};

use crate::client::ClientHandle;
use crate::config::ClientConfig;
use crate::error::{BootstrapError, ClientResult};

/// Default auxiliary probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Builds ready client handles.
#[derive(Clone)]
pub struct Bootstrapper {
    resolver: Arc<dyn Resolve>,
    prober: Arc<dyn Probe>,
    http: Client,
    probe_timeout: Duration,
}

impl Bootstrapper {
    pub fn new(resolver: Arc<dyn Resolve>, prober: Arc<dyn Probe>, http: Client) -> Self {
        Self {
            resolver,
            prober,
            http,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Socket resolver and HTTP prober built from the config.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let mut resolver = TransportResolver::new(config.connection());
        if let Some(path) = &config.chain_spec_path {
            resolver = resolver.with_chain_spec(path.clone());
        }

        let http = Client::builder()
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        let prober = HttpProber::with_client(http.clone());

        Ok(Self::new(Arc::new(resolver), Arc::new(prober), http)
            .with_probe_timeout(config.probe_timeout()))
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Bootstrap using the config's address, timeout, retries and aux service.
    pub async fn bootstrap_config(
        &self,
        config: &ClientConfig,
    ) -> Result<ClientHandle, BootstrapError> {
        self.bootstrap(
            &config.address,
            config.timeout(),
            config.max_retries,
            config.aux_service_address.as_deref(),
        )
        .await
    }

    /// Connect, probe and populate the error table.
    ///
    /// # Errors
    ///
    /// - `UnsupportedProtocol` / `InvalidAddress`: before any network I/O
    /// - `ConnectTimeout`: the timer fired before `Connected`
    /// - `RetryExhausted`: more than `max_retries` transport errors
    /// - `Metadata`: the error table query failed after connecting
    ///
    /// Every failure after resolution tears the transport down.
    pub async fn bootstrap(
        &self,
        address: &str,
        timeout: Duration,
        max_retries: u32,
        aux_service_address: Option<&str>,
    ) -> Result<ClientHandle, BootstrapError> {
        let started = Instant::now();
        info!(
            address,
            timeout_ms = timeout.as_millis() as u64,
            max_retries,
            "Bootstrapping client"
        );

        let result = self
            .try_bootstrap(address, timeout, max_retries, aux_service_address)
            .await;

        match &result {
            Ok(handle) => {
                Metrics::bootstrap("connected");
                info!(
                    address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    aux = matches!(handle.has_aux_service(), Ok(true)),
                    "Client ready"
                );
            }
            Err(e) => {
                Metrics::bootstrap(e.outcome_label());
                warn!(address, tag = e.tag(), error = %e, "Bootstrap failed");
            }
        }
        result
    }

    async fn try_bootstrap(
        &self,
        address: &str,
        timeout: Duration,
        max_retries: u32,
        aux_service_address: Option<&str>,
    ) -> Result<ClientHandle, BootstrapError> {
        let session = self.resolver.resolve(address)?;
        let transport = connect(session, timeout, max_retries).await?;

        let aux_service = match aux_service_address {
            Some(url) => self.probe_aux(url).await,
            None => None,
        };

        let error_table = match ErrorTable::populate(transport.as_ref()).await {
            Ok(table) => table,
            Err(e) => {
                transport.close();
                return Err(BootstrapError::Metadata(e));
            }
        };

        Ok(ClientHandle::new(
            address,
            transport,
            Arc::new(error_table),
            aux_service,
        ))
    }

    async fn probe_aux(&self, url: &str) -> Option<AuxServiceClient> {
        let available = self.prober.probe(url, self.probe_timeout).await;
        Metrics::aux_available(available);
        if available {
            Some(AuxServiceClient::new(url, self.http.clone()))
        } else {
            info!(url, "Auxiliary service unavailable; optional features disabled");
            None
        }
    }
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

/// Race `Connected` against the error threshold and the timer.
async fn connect(
    session: PendingSession,
    timeout: Duration,
    max_retries: u32,
) -> Result<DynTransport, BootstrapError> {
    let PendingSession {
        transport,
        mut signals,
    } = session;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut errors: u32 = 0;
    let mut signals_open = true;

    let outcome = loop {
        tokio::select! {
            biased;

            signal = signals.recv(), if signals_open => match signal {
                Some(TransportSignal::Connected) => break Ok(()),
                Some(TransportSignal::Error(reason)) => {
                    errors += 1;
                    Metrics::transport_error();
                    warn!(attempt = errors, max_retries, %reason, "Transport error during bootstrap");
                    if errors > max_retries {
                        break Err(BootstrapError::RetryExhausted { attempts: errors });
                    }
                }
                None => {
                    // Nothing more will arrive; only the timer can settle.
                    debug!("Transport signal stream closed");
                    signals_open = false;
                }
            },

            () = &mut deadline => {
                break Err(BootstrapError::ConnectTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    };

    match outcome {
        Ok(()) => {
            debug!(retries = errors, "Transport connected");
            Ok(transport)
        }
        Err(e) => {
            transport.close();
            Err(e)
        }
    }
}
