//! Tracepoint discovery and `format` file parsing.
//!
//! Tracepoints live under `/sys/kernel/tracing/events/<subsystem>/<name>/`.
//! `id` holds the integer passed as `attr.config` for a
//! `PERF_TYPE_TRACEPOINT` event; `format` describes the payload's field
//! layout so fields can be pulled out of a sample's raw tracepoint data
//! without hardcoding kernel-version-specific offsets. Required to
//! implement the block-I/O and syscall writers against real tracepoints.

use std::collections::HashMap;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;

/// One `field:<decl>; offset:<n>; size:<n>; signed:<0|1>;` line.
#[derive(Clone, Copy, Debug)]
pub struct Field {
    pub offset: usize,
    pub size: usize,
    pub signed: bool,
}

/// Parsed `format` file: field name to field descriptor.
#[derive(Clone, Debug, Default)]
pub struct FormatFile {
    fields: HashMap<String, Field>,
}

impl FormatFile {
    pub fn parse(contents: &str) -> Self {
        let mut fields = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if !line.starts_with("field:") {
                continue;
            }

            let mut offset = None;
            let mut size = None;
            let mut signed = None;
            let mut name = None;

            for part in line.split(';') {
                let part = part.trim();
                if let Some(decl) = part.strip_prefix("field:") {
                    name = decl.rsplit([' ', '\t', '*']).next().map(|tok| {
                        tok.split('[').next().unwrap_or(tok).to_owned()
                    });
                } else if let Some(v) = part.strip_prefix("offset:") {
                    offset = v.trim().parse().ok();
                } else if let Some(v) = part.strip_prefix("size:") {
                    size = v.trim().parse().ok();
                } else if let Some(v) = part.strip_prefix("signed:") {
                    signed = v.trim().parse::<u8>().ok().map(|v| v != 0);
                }
            }

            if let (Some(name), Some(offset), Some(size), Some(signed)) =
                (name, offset, size, signed)
            {
                fields.insert(name, Field { offset, size, signed });
            }
        }

        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Extracts a field as a zero- or sign-extended `u64`, little-endian per
    /// the tracepoint ABI. Returns `None` if the field is unknown or the
    /// payload is too short.
    pub fn field_u64(&self, payload: &[u8], name: &str) -> Option<u64> {
        let field = self.fields.get(name)?;
        let bytes = payload.get(field.offset..field.offset + field.size)?;

        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        let unsigned = u64::from_le_bytes(buf);

        if field.signed && field.size < 8 {
            let shift = 64 - field.size * 8;
            Some(((unsigned << shift) as i64 >> shift) as u64)
        } else {
            Some(unsigned)
        }
    }
}

/// Reads `<tracing_fs>/events/<subsystem>/<name>/id` and parses it as the
/// integer passed as `attr.config` for a `PERF_TYPE_TRACEPOINT` event.
pub fn read_id(tracing_fs: &Path, subsystem: &str, name: &str) -> Result<u64> {
    let path = tracing_fs.join("events").join(subsystem).join(name).join("id");
    let contents = std::fs::read_to_string(&path)?;
    contents
        .trim()
        .parse()
        .map_err(|_| Error::new(ErrorKind::InvalidData, format!("malformed tracepoint id: {path:?}")))
}

/// Reads and parses `<tracing_fs>/events/<subsystem>/<name>/format`.
pub fn read_format(tracing_fs: &Path, subsystem: &str, name: &str) -> Result<FormatFile> {
    let path = tracing_fs.join("events").join(subsystem).join(name).join("format");
    let contents = std::fs::read_to_string(&path)?;
    Ok(FormatFile::parse(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHED_SWITCH_FORMAT: &str = r#"name: sched_switch
ID: 314
format:
	field:unsigned short common_type;	offset:0;	size:2;	signed:0;
	field:unsigned char common_flags;	offset:2;	size:1;	signed:0;
	field:unsigned char common_preempt_count;	offset:3;	size:1;	signed:0;
	field:int common_pid;	offset:4;	size:4;	signed:1;

	field:char prev_comm[16];	offset:8;	size:16;	signed:0;
	field:pid_t prev_pid;	offset:24;	size:4;	signed:1;
	field:int prev_prio;	offset:28;	size:4;	signed:1;
	field:long prev_state;	offset:32;	size:8;	signed:1;
	field:char next_comm[16];	offset:40;	size:16;	signed:0;
	field:pid_t next_pid;	offset:56;	size:4;	signed:1;
	field:int next_prio;	offset:60;	size:4;	signed:1;

print fmt: "..."
"#;

    #[test]
    fn parses_field_offsets() {
        let fmt = FormatFile::parse(SCHED_SWITCH_FORMAT);
        let f = fmt.field("prev_pid").unwrap();
        assert_eq!((f.offset, f.size, f.signed), (24, 4, true));
        let f = fmt.field("common_type").unwrap();
        assert_eq!((f.offset, f.size, f.signed), (0, 2, false));
    }

    #[test]
    fn extracts_signed_negative_value() {
        let fmt = FormatFile::parse(SCHED_SWITCH_FORMAT);
        let mut payload = vec![0u8; 64];
        payload[32..40].copy_from_slice(&(-1i64).to_le_bytes());
        assert_eq!(fmt.field_u64(&payload, "prev_state"), Some(u64::MAX));
    }

    #[test]
    fn extracts_unsigned_value() {
        let fmt = FormatFile::parse(SCHED_SWITCH_FORMAT);
        let mut payload = vec![0u8; 64];
        payload[56..60].copy_from_slice(&4242u32.to_le_bytes());
        assert_eq!(fmt.field_u64(&payload, "next_pid"), Some(4242));
    }

    #[test]
    fn unknown_field_is_none() {
        let fmt = FormatFile::parse(SCHED_SWITCH_FORMAT);
        assert!(fmt.field_u64(&[0; 64], "nonexistent").is_none());
    }
}
