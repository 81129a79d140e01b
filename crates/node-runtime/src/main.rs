//! `qv-devnet`: runs a local operator committee through a series of
//! attestation duties and logs each reconstructed signature.

use anyhow::{Context, Result};
use node_runtime::{logging, Devnet, NodeConfig};
use qv_04_duty_runner::Duty;
use shared_types::RoleType;
use tracing::{info, warn};

// Single-threaded so every runner holds the duty before any frame of it is
// delivered. Controllers hold consensus messages one height ahead, but a
// runner that has not started the duty drops its partial signatures.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("invalid configuration")?;
    logging::init(&config.log_filter)?;

    info!("===========================================");
    info!("  QBFT Validator Devnet v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(
        operators = config.committee_size,
        duties = config.duties,
        fork_v1_height = config.controller.fork_v1_activation_height,
        "Configuration loaded"
    );

    let duties = config.duties;
    let mut devnet = Devnet::launch(config).context("failed to launch devnet")?;

    for slot in 1..=duties {
        let duty = Duty {
            role: RoleType::Attester,
            slot,
            validator_index: 0,
            committee_index: 0,
        };
        let data = format!("attestation data for slot {slot}").into_bytes();
        match devnet.run_duty(duty, data).await {
            Ok(report) => {
                if let Some(signed) = report.submissions.values().next() {
                    info!(
                        slot,
                        signature = %hex::encode(signed.signature.as_bytes()),
                        "Validator signature"
                    );
                }
            }
            Err(e) => warn!(slot, error = %e, "Duty failed"),
        }
    }

    devnet.shutdown();
    Ok(())
}
