//! Utility functions for id minting

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::TradeError;

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Mint an id with one of the crate's fixed prefixes (`user_`, `food_`,
/// `trade_`, `note_`, `rating_`), mapping encoding failures into the engine's
/// error type.
pub(crate) fn mint(hrp: &str) -> Result<String, TradeError> {
    new_uuid_to_bech32(hrp).map_err(|e| TradeError::Codec(e.to_string()))
}
