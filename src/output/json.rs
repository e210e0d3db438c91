use crate::model::ScanResult;
use anyhow::Result;

/// Pretty-printed JSON rendering of a finished scan.
pub fn export_json(result: &ScanResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

pub fn print_json(result: &ScanResult) -> Result<()> {
    println!("{}", export_json(result)?);
    Ok(())
}
