use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::ArgType;
use crate::error::Result;

/// One extracted argument. `decoded_value` is present only for a
/// string-pointer argument whose dereference succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: ArgType,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_value: Option<String>,
}

/// One intercepted call. `name` is empty when symbol resolution failed;
/// `sequence` is the position in log order, assigned at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(default)]
    pub sequence: u64,
    pub name: String,
    pub arguments: Vec<ArgumentValue>,
}

impl CallRecord {
    pub fn new(name: String, arguments: Vec<ArgumentValue>) -> Self {
        Self {
            sequence: 0,
            name,
            arguments,
        }
    }
}

/// Append-only record of intercepted calls, in strict program order.
/// Nothing is flushed incrementally; the trace exists on disk only after
/// `save`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallLog {
    records: Vec<CallRecord>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, mut record: CallRecord) {
        record.sequence = self.records.len() as u64;
        self.records.push(record);
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Serialize the whole buffered sequence in one pass.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &self.records)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let records: Vec<CallRecord> = serde_json::from_reader(file)?;
        Ok(Self { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> CallLog {
        let mut log = CallLog::new();
        log.append(CallRecord::new(
            "kernel32!GetFileSize".to_string(),
            vec![
                ArgumentValue {
                    name: Some("hFile".to_string()),
                    ty: ArgType::Integer,
                    value: 0x10,
                    decoded_value: None,
                },
                ArgumentValue {
                    name: Some("lpFileSizeHigh".to_string()),
                    ty: ArgType::Integer,
                    value: 0,
                    decoded_value: None,
                },
            ],
        ));
        log.append(CallRecord::new(
            "kernel32!LoadLibraryA".to_string(),
            vec![ArgumentValue {
                name: Some("lpLibFileName".to_string()),
                ty: ArgType::AnsiString,
                value: 0x2000,
                decoded_value: Some("ws2_32.dll".to_string()),
            }],
        ));
        log.append(CallRecord::new(String::new(), Vec::new()));
        log
    }

    #[test]
    fn append_assigns_sequence_in_program_order() {
        let log = sample_log();
        let sequences: Vec<u64> = log.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let log = sample_log();
        let path = std::env::temp_dir().join(format!("call_log_{}.json", std::process::id()));
        log.save(&path).unwrap();
        let reloaded = CallLog::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(log, reloaded);
    }

    #[test]
    fn export_is_structured_json() {
        let json = sample_log().to_json().unwrap();
        assert!(json.contains("\"name\": \"kernel32!GetFileSize\""));
        assert!(json.contains("\"decoded_value\": \"ws2_32.dll\""));
        // absent decodings are omitted, not null
        assert!(!json.contains("null"));
    }
}
