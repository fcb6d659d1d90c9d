//! Swap status values and the transition graph the nursery enforces.
//!
//! The wire strings are part of the external protocol and must never change.

use crate::swap::SwapKind;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// All possible states of a swap.
///
/// Swaps progress through these states during their lifecycle; the reachable
/// transitions per kind are encoded in [`successors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapStatus {
    /// Initial state of a submarine swap.
    #[serde(rename = "swap.created")]
    SwapCreated,
    /// Initial state of a chain swap, waiting for the user lockup.
    #[serde(rename = "transaction.waiting")]
    TransactionWaiting,
    /// Lockup transaction detected in the mempool.
    #[serde(rename = "transaction.mempool")]
    TransactionMempool,
    /// Lockup transaction confirmed on-chain.
    #[serde(rename = "transaction.confirmed")]
    TransactionConfirmed,
    /// Lockup transaction failed.
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    /// A lockup was seen but paid less than the expected amount.
    #[serde(rename = "transaction.lockupFailed")]
    TransactionLockupFailed,
    /// Lightning payment is in flight.
    #[serde(rename = "invoice.pending")]
    InvoicePending,
    /// Lightning invoice successfully paid.
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    /// Lightning invoice payment failed.
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    /// Held Lightning invoice was settled with the preimage.
    #[serde(rename = "invoice.settled")]
    InvoiceSettled,
    /// Lightning invoice expired before it was paid.
    #[serde(rename = "invoice.expired")]
    InvoiceExpired,
    /// A Lightning channel was created to complete the payment.
    #[serde(rename = "channel.created")]
    ChannelCreated,
    /// The swap output was claimed.
    #[serde(rename = "transaction.claimed")]
    TransactionClaimed,
    /// The lockup was refunded after the swap failed.
    #[serde(rename = "transaction.refunded")]
    TransactionRefunded,
    /// The swap timed out.
    #[serde(rename = "swap.expired")]
    SwapExpired,
}

impl SwapStatus {
    /// Statuses after which a swap counts as failed.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            SwapStatus::TransactionFailed
                | SwapStatus::InvoiceFailedToPay
                | SwapStatus::SwapExpired
                | SwapStatus::TransactionRefunded
                | SwapStatus::InvoiceExpired
        )
    }

    /// The status a freshly persisted swap of `kind` starts in.
    pub fn initial(kind: SwapKind) -> Self {
        match kind {
            SwapKind::Submarine => SwapStatus::SwapCreated,
            SwapKind::Reverse => SwapStatus::TransactionMempool,
            SwapKind::Chain => SwapStatus::TransactionWaiting,
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapStatus::SwapCreated => "swap.created",
            SwapStatus::TransactionWaiting => "transaction.waiting",
            SwapStatus::TransactionMempool => "transaction.mempool",
            SwapStatus::TransactionConfirmed => "transaction.confirmed",
            SwapStatus::TransactionFailed => "transaction.failed",
            SwapStatus::TransactionLockupFailed => "transaction.lockupFailed",
            SwapStatus::InvoicePending => "invoice.pending",
            SwapStatus::InvoicePaid => "invoice.paid",
            SwapStatus::InvoiceFailedToPay => "invoice.failedToPay",
            SwapStatus::InvoiceSettled => "invoice.settled",
            SwapStatus::InvoiceExpired => "invoice.expired",
            SwapStatus::ChannelCreated => "channel.created",
            SwapStatus::TransactionClaimed => "transaction.claimed",
            SwapStatus::TransactionRefunded => "transaction.refunded",
            SwapStatus::SwapExpired => "swap.expired",
        };

        write!(f, "{s}")
    }
}

/// Direct successors of `status` in the lifecycle of a swap of `kind`.
pub fn successors(kind: SwapKind, status: SwapStatus) -> &'static [SwapStatus] {
    use SwapStatus::*;

    match kind {
        SwapKind::Submarine => match status {
            SwapCreated => &[TransactionMempool, TransactionLockupFailed, SwapExpired],
            TransactionLockupFailed => &[TransactionMempool, SwapExpired],
            TransactionMempool => &[
                TransactionConfirmed,
                InvoicePending,
                InvoicePaid,
                SwapExpired,
            ],
            TransactionConfirmed => &[
                InvoicePending,
                InvoicePaid,
                ChannelCreated,
                InvoiceFailedToPay,
                SwapExpired,
            ],
            ChannelCreated => &[InvoicePending, InvoicePaid, InvoiceFailedToPay],
            InvoicePending => &[InvoicePaid, InvoiceFailedToPay],
            InvoicePaid => &[TransactionClaimed],
            InvoiceFailedToPay => &[SwapExpired],
            SwapExpired => &[TransactionRefunded],
            TransactionClaimed
            | TransactionRefunded
            | TransactionWaiting
            | TransactionFailed
            | InvoiceSettled
            | InvoiceExpired => &[],
        },
        SwapKind::Reverse => match status {
            TransactionMempool => &[
                TransactionConfirmed,
                TransactionFailed,
                InvoicePending,
                InvoiceSettled,
                InvoiceExpired,
                SwapExpired,
            ],
            TransactionConfirmed => &[InvoicePending, InvoiceSettled, InvoiceExpired, SwapExpired],
            InvoicePending => &[InvoiceSettled, InvoiceExpired, SwapExpired],
            InvoiceSettled => &[TransactionClaimed],
            InvoiceExpired => &[SwapExpired],
            SwapExpired => &[TransactionRefunded],
            SwapCreated
            | TransactionWaiting
            | TransactionFailed
            | TransactionLockupFailed
            | InvoicePaid
            | InvoiceFailedToPay
            | ChannelCreated
            | TransactionClaimed
            | TransactionRefunded => &[],
        },
        SwapKind::Chain => match status {
            TransactionWaiting => &[TransactionMempool, TransactionLockupFailed, SwapExpired],
            TransactionLockupFailed => &[TransactionMempool, SwapExpired],
            TransactionMempool => &[TransactionConfirmed, TransactionClaimed, SwapExpired],
            TransactionConfirmed => &[TransactionClaimed, SwapExpired],
            SwapExpired => &[TransactionRefunded],
            SwapCreated
            | TransactionFailed
            | InvoicePending
            | InvoicePaid
            | InvoiceFailedToPay
            | InvoiceSettled
            | InvoiceExpired
            | ChannelCreated
            | TransactionClaimed
            | TransactionRefunded => &[],
        },
    }
}

/// Whether `to` is reachable from `from` along the transition graph of `kind`.
///
/// A status is not considered reachable from itself unless a cycle would
/// allow it, which the graph never does.
pub fn reachable(kind: SwapKind, from: SwapStatus, to: SwapStatus) -> bool {
    let mut stack = vec![from];
    let mut seen = std::collections::HashSet::new();

    while let Some(status) = stack.pop() {
        for successor in successors(kind, status) {
            if *successor == to {
                return true;
            }

            if seen.insert(*successor) {
                stack.push(*successor);
            }
        }
    }

    false
}
