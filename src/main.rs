// src/main.rs

//! # did:plc command line client
//!
//! ## Subcommands
//! - `genkey`: print a fresh private key (hex) and its did:key
//! - `calc`: print the DID and signed genesis operation for the configured key
//! - `create`: register that genesis operation with the directory
//! - `resolve <did>`: print a DID's current data and audit log
//!
//! ## Environment Variables
//! - `PLC_PRIVATE_KEY`: rotation key as hex (required by `calc` and `create`)
//! - `PLC_CURVE`: `p256` (default) or `secp256k1`
//! - `PLC_HANDLE`: (Optional) handle published as `at://<handle>`
//! - `PLC_PDS_ENDPOINT`: (Optional) personal data server URL
//! - `PLC_DIRECTORY_URL` and the other settings read by [`Settings::load`]

use anyhow::{bail, Context, Result};
use did_plc::wallet::key_management::SigningKey;
use did_plc::wallet::signer::calc_genesis;
use did_plc::{Curve, HttpDirectory, IdentityState, KeyHandle, PlcClient, RetryPolicy, Service, Settings};
use dotenv::dotenv;
use log::info;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: plc <genkey | calc | create | resolve <did>>";

fn curve_from_env() -> Result<Curve> {
    match std::env::var("PLC_CURVE") {
        Ok(name) => Ok(name.parse()?),
        Err(_) => Ok(Curve::P256),
    }
}

/// Builds the identity described by the environment: one key used for both
/// rotation and the `atproto` verification method.
fn identity_from_env() -> Result<IdentityState> {
    let curve = curve_from_env()?;
    let hex_key = std::env::var("PLC_PRIVATE_KEY").context("PLC_PRIVATE_KEY must be set")?;
    let bytes = hex::decode(hex_key.trim()).context("PLC_PRIVATE_KEY is not valid hex")?;
    let key = KeyHandle::from_private_bytes(curve, &bytes)?;

    let mut state = IdentityState::new(vec![key.clone()]).with_verification_method("atproto", key);
    if let Ok(handle) = std::env::var("PLC_HANDLE") {
        state = state.with_also_known_as(format!("at://{handle}"));
    }
    if let Ok(endpoint) = std::env::var("PLC_PDS_ENDPOINT") {
        state = state.with_service(
            "atproto_pds",
            Service::new("AtprotoPersonalDataServer", endpoint),
        );
    }
    Ok(state)
}

fn client(settings: &Settings) -> Result<PlcClient<HttpDirectory>> {
    let directory = HttpDirectory::from_settings(settings)?;
    let cancel = CancellationToken::new();

    // Ctrl-C abandons the in-flight request and any remaining retries
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    Ok(PlcClient::new(directory, RetryPolicy::from(settings)).with_cancellation(cancel))
}

fn genkey() -> Result<()> {
    let key = SigningKey::generate(curve_from_env()?);
    println!("PLC_PRIVATE_KEY={}", hex::encode(key.to_bytes()));
    println!("{}", key.public_key().to_did_string());
    Ok(())
}

fn calc() -> Result<()> {
    let state = identity_from_env()?;
    let (did, signed) = calc_genesis(&state)?;
    println!("{did}");
    println!("{}", serde_json::to_string_pretty(&signed)?);
    Ok(())
}

async fn create(settings: &Settings) -> Result<()> {
    let client = client(settings)?;
    let mut state = identity_from_env()?;
    info!("creating DID at {}", client.directory().base_url());
    let did = client.create(&mut state).await?;
    println!("{did}");
    Ok(())
}

async fn resolve(settings: &Settings, did: &str) -> Result<()> {
    let client = client(settings)?;
    let state = client.resolve(did).await?;
    client.verify(&state).await.context("audit log failed verification")?;

    let data = serde_json::json!({
        "did": state.did,
        "lifecycle": format!("{:?}", state.lifecycle()),
        "rotationKeys": state.rotation_keys.iter().map(KeyHandle::to_did_string).collect::<Vec<_>>(),
        "verificationMethods": state
            .verification_methods
            .iter()
            .map(|(name, key)| (name.clone(), key.to_did_string()))
            .collect::<std::collections::BTreeMap<_, _>>(),
        "alsoKnownAs": state.also_known_as,
        "services": state.services,
    });
    println!("{}", serde_json::to_string_pretty(&data)?);
    println!("{}", serde_json::to_string_pretty(&state.log)?);
    Ok(())
}

/// Application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and initialise logging
/// 2. Load settings from `PLC_*` variables
/// 3. Dispatch the subcommand
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("failed to load PLC_* settings")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("genkey") => genkey(),
        Some("calc") => calc(),
        Some("create") => create(&settings).await,
        Some("resolve") => {
            let did = args.get(1).context(USAGE)?;
            resolve(&settings, did).await
        }
        _ => bail!(USAGE),
    }
}
