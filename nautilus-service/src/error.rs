//! Error taxonomy of the swap service.
//!
//! Every condition that crosses the API boundary carries a stable ASCII code
//! returned by [`Error::code`]; transports rely on those exact spellings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Validation.
    #[error("could not find currency: {0}")]
    CurrencyNotFound(String),
    #[error("could not find pair: {0}")]
    PairNotFound(String),
    #[error("could not find order side: {0}")]
    OrderSideNotFound(String),
    #[error("invalid preimage hash: {0}")]
    InvalidPreimageHash(String),
    #[error("could not find script type: {0}")]
    ScriptTypeNotFound(String),

    // Policy.
    #[error("reverse swaps are disabled")]
    ReverseSwapsDisabled,
    #[error("{0} exceeds maximal of {1}")]
    ExceedMaximalAmount(u64, u64),
    #[error("{0} is beneath minimal of {1}")]
    BeneathMinimalAmount(u64, u64),
    #[error("onchain amount is too low")]
    OnchainAmountTooLow,
    #[error("maximal swap expiry of {0} minutes is smaller than the routing requirement of {1} minutes")]
    MinExpiryTooBig(u64, u64),

    // Uniqueness.
    #[error("a swap with this invoice exists already")]
    SwapWithInvoiceExists,
    #[error("a swap with this preimage hash exists already")]
    SwapWithPreimageExists,

    // Capability.
    #[error("{0} has no LND client")]
    NoLndClient(String),
    #[error("{0} is not UTXO based")]
    CurrencyNotUtxoBased(String),
    #[error("invalid timeout block delta: {0}")]
    InvalidTimeoutBlockDelta(String),

    // Resources.
    #[error("not enough funds")]
    NotEnoughFunds,

    // Cooperative signing.
    #[error("swap is not eligible for a cooperative refund")]
    NotEligibleForCooperativeRefund,
    #[error("swap is not eligible for a cooperative claim")]
    NotEligibleForCooperativeClaim,
    #[error("incorrect preimage")]
    IncorrectPreimage,
    #[error("could not find swap: {0}")]
    SwapNotFound(String),

    // Ambient failures from collaborators and primitives.
    #[error("invalid invoice: {0}")]
    Invoice(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Script(#[from] nautilus_core::ScriptError),
    #[error(transparent)]
    Tree(#[from] nautilus_core::TreeError),
    #[error(transparent)]
    Cosign(#[from] nautilus_core::CosignError),
    #[error("{0}")]
    AdHoc(String),
}

impl Error {
    pub fn ad_hoc(error: impl ToString) -> Self {
        Self::AdHoc(error.to_string())
    }

    /// The stable code exposed on the wire for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            Error::PairNotFound(_) => "PAIR_NOT_FOUND",
            Error::OrderSideNotFound(_) => "ORDER_SIDE_NOT_FOUND",
            Error::InvalidPreimageHash(_) => "INVALID_PREIMAGE_HASH",
            Error::ScriptTypeNotFound(_) => "SCRIPT_TYPE_NOT_FOUND",
            Error::ReverseSwapsDisabled => "REVERSE_SWAPS_DISABLED",
            Error::ExceedMaximalAmount(_, _) => "EXCEED_MAXIMAL_AMOUNT",
            Error::BeneathMinimalAmount(_, _) => "BENEATH_MINIMAL_AMOUNT",
            Error::OnchainAmountTooLow => "ONCHAIN_AMOUNT_TOO_LOW",
            Error::MinExpiryTooBig(_, _) => "MIN_EXPIRY_TOO_BIG",
            Error::SwapWithInvoiceExists => "SWAP_WITH_INVOICE_EXISTS",
            Error::SwapWithPreimageExists => "SWAP_WITH_PREIMAGE_EXISTS",
            Error::NoLndClient(_) => "NO_LND_CLIENT",
            Error::CurrencyNotUtxoBased(_) => "CURRENCY_NOT_UTXO_BASED",
            Error::InvalidTimeoutBlockDelta(_) => "INVALID_TIMEOUT_BLOCK_DELTA",
            Error::NotEnoughFunds => "NOT_ENOUGH_FUNDS",
            Error::NotEligibleForCooperativeRefund => "NOT_ELIGIBLE_FOR_COOPERATIVE_REFUND",
            Error::NotEligibleForCooperativeClaim => "NOT_ELIGIBLE_FOR_COOPERATIVE_CLAIM",
            Error::IncorrectPreimage => "INCORRECT_PREIMAGE",
            Error::SwapNotFound(_) => "SWAP_NOT_FOUND",
            Error::Invoice(_)
            | Error::Config(_)
            | Error::Script(_)
            | Error::Tree(_)
            | Error::Cosign(_)
            | Error::AdHoc(_) => "INTERNAL_ERROR",
        }
    }
}
