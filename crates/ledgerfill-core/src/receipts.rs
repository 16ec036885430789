use tracing::debug;

use crate::error::CoreError;
use crate::rpc::EthRpc;
use crate::types::Block;

/// Whether transaction outcomes are looked up.
///
/// `Skip` leaves `success` and `gas_used` unknown on every transaction.
/// This trades fidelity for throughput (one fewer request per
/// transaction); downstream consumers must accept unknown outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Fetch,
    Skip,
}

pub async fn resolve_receipts(
    rpc: &dyn EthRpc,
    block: &mut Block,
    mode: ReceiptMode,
) -> Result<(), CoreError> {
    if mode == ReceiptMode::Skip {
        return Ok(());
    }

    for tx in &mut block.transactions {
        match rpc.get_receipt(&tx.hash).await? {
            Some(receipt) => tx.apply_receipt(receipt),
            None => debug!(block = block.number, tx = %tx.hash, "no receipt; outcome left unknown"),
        }
    }
    Ok(())
}
