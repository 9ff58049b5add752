//! iap-gate server
//!
//! Serves the gateway API behind an identity-aware proxy.
//!
//! Verifier options are read from `AUTH_IAP_*` variables; `LISTEN_ADDR` and
//! `DATA_DIR` control the listener and the `RocksDB` user store.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iap_gate_auth::{IapVerifier, IdentityResolver, KeyStore, VerifierConfig};
use iap_gate_server::{auth, create_router, GatewayConfig, GatewayState};
use iap_gate_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,iap_gate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting iap-gate server");

    let gateway_config = GatewayConfig::from_env();
    let verifier_config = VerifierConfig::from_env()?;

    if verifier_config.project_id.is_empty() || verifier_config.project_numeric_id.is_empty() {
        tracing::warn!(
            "AUTH_IAP_PROJECT_ID or AUTH_IAP_PROJECT_NUMERIC_ID unset - tokens will fail the audience check"
        );
    }

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %gateway_config.data_dir,
        audience = %verifier_config.audience(),
        key_endpoint = %verifier_config.public_key_endpoint,
        header = %verifier_config.header_name(),
        staff = verifier_config.users_is_staff.len(),
        superusers = verifier_config.users_is_superuser.len(),
        "Configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %gateway_config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&gateway_config.data_dir)?);

    let keys = Arc::new(KeyStore::from_config(&verifier_config)?);
    let verifier = Arc::new(IapVerifier::new(&verifier_config, keys));
    let resolver = Arc::new(IdentityResolver::new(store, &verifier_config));
    let token_header = auth::token_header(&verifier_config.header_name())?;

    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(verifier, resolver, token_header, gateway_config);
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
