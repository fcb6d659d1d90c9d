pub mod block_time;
pub mod cosign;
pub mod script;
pub mod tree;

mod conversions;

pub use conversions::from_musig_xonly;
pub use conversions::to_musig_pk;
pub use cosign::CosignError;
pub use cosign::PartialSig;
pub use script::HtlcOptions;
pub use script::ScriptError;
pub use tree::SwapTree;
pub use tree::SwapTreeOptions;
pub use tree::TreeError;
