//! In-memory zip archives for function code.
//!
//! Uploaded sources are packed together with the configured helper
//! modules into a zip held in a `Vec<u8>`; nothing is written to disk.

use std::io::{Cursor, Read, Write};

use anyhow::Context;
use bytes::Bytes;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// One file to place at the root of an archive.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub data: Bytes,
}

impl ArchiveMember {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Build a zip archive containing `members`, in order.
///
/// Duplicate member names are rejected.
pub fn build_archive(members: &[ArchiveMember]) -> anyhow::Result<Bytes> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);

    for (i, member) in members.iter().enumerate() {
        if members[..i].iter().any(|m| m.name == member.name) {
            anyhow::bail!("duplicate archive member {}", member.name);
        }
        writer
            .start_file(member.name.as_str(), options)
            .with_context(|| format!("starting archive member {}", member.name))?;
        writer
            .write_all(&member.data)
            .with_context(|| format!("writing archive member {}", member.name))?;
    }

    let cursor = writer.finish().context("finishing archive")?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Extract the member called `name` from `archive` as UTF-8 text.
///
/// Returns `Ok(None)` when the archive has no such member.
pub fn extract_text(archive: &[u8], name: &str) -> anyhow::Result<Option<String>> {
    let mut zip = ZipArchive::new(Cursor::new(archive)).context("reading archive")?;
    let mut file = match zip.by_name(name) {
        Ok(f) => f,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).context(format!("opening archive member {name}")),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)
        .with_context(|| format!("archive member {name} is not valid UTF-8"))?;
    Ok(Some(text))
}
