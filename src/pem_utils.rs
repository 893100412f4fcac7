use crate::error::{PkiError, Result};

/// Label of the block carrying the compressed content grant next to a
/// content access certificate.
pub const ENTITLEMENT_DATA_LABEL: &str = "ENTITLEMENT DATA";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Extracts the contents of the first block labelled `label` from a string
/// that may hold several PEM blocks.
pub fn pem_to_der(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let blocks = pem::parse_many(pem_str).map_err(|e| PkiError::DecodingError(e.to_string()))?;
    blocks
        .into_iter()
        .find(|block| block.tag() == label)
        .map(|block| block.into_contents())
        .ok_or_else(|| PkiError::DecodingError(format!("no PEM block labelled {label}")))
}
