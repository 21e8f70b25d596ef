//! Dump commit log command implementation.

use super::json::cbor_to_json;
use rootstore_codec::from_cbor;
use rootstore_core::wal::WalRecord;
use serde::Serialize;
use std::path::Path;

/// Commit log record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction ID.
    pub txid: u64,
    /// Writing session (Begin only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Key written or deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Sequence number (Commit only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Payload size in bytes (Put only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
    /// Decoded payload, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Runs the dump-wal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    payloads: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_existing(path)?;
    let scan = store.wal().scan(start_offset)?;

    let records = scan
        .records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, record)| describe(*offset, record, payloads))
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
            if scan.torn {
                println!("[{:08}] <torn tail>", scan.end);
            }
        }
    }

    Ok(())
}

fn describe(
    offset: u64,
    record: &WalRecord,
    payloads: bool,
) -> Result<WalRecordInfo, Box<dyn std::error::Error>> {
    let mut info = WalRecordInfo {
        offset,
        record_type: format!("{:?}", record.record_type()).to_uppercase(),
        txid: record.txid().as_u64(),
        session: None,
        key: None,
        sequence: None,
        payload_size: None,
        payload: None,
    };

    match record {
        WalRecord::Begin { session, .. } => info.session = Some(session.to_string()),
        WalRecord::Put { key, payload, .. } => {
            info.key = Some(key.to_string());
            info.payload_size = Some(payload.len());
            if payloads {
                info.payload = Some(cbor_to_json(&from_cbor(payload)?));
            }
        }
        WalRecord::Delete { key, .. } => info.key = Some(key.to_string()),
        WalRecord::Commit { sequence, .. } => info.sequence = Some(sequence.as_u64()),
        WalRecord::Abort { .. } => {}
    }
    Ok(info)
}

fn print_text_output(records: &[WalRecordInfo]) {
    println!("Commit log records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!("[{:08}] {:8} txid={}", record.offset, record.record_type, record.txid);

        if let Some(ref session) = record.session {
            print!(" session={session}");
        }
        if let Some(seq) = record.sequence {
            print!(" seq={seq}");
        }
        if let Some(ref key) = record.key {
            print!(" key=\"{key}\"");
        }
        if let Some(size) = record.payload_size {
            print!(" payload={size} bytes");
        }
        if let Some(ref payload) = record.payload {
            print!(" {payload}");
        }

        println!();
    }
}
