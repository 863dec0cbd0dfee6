//! Member name resolution.
//!
//! Every format keeps its own name field and archivers disagree on how it is
//! encoded. Names the format marks as UTF-8 are taken as such. Everything
//! else goes through a GBK detector, since archives created on Chinese
//! Windows systems commonly store names in that code page.
//!
//! The result is untrusted: containment is checked by the caller.

use encoding_rs::GBK;

use crate::codec::{ArchiveMember, MemberHeader};

/// Name to extract `member` to, relative to the extraction directory.
pub fn extract_name(member: &ArchiveMember<'_>) -> String {
    resolve_name(&member.header, &member.name)
}

/// Name from the format's own header, falling back to the codec-reported
/// name when the format has no name field.
pub fn resolve_name(header: &MemberHeader, reported: &str) -> String {
    let Some(raw) = header.name_bytes() else {
        return reported.to_string();
    };
    if header.declares_utf8() {
        return String::from_utf8_lossy(raw).into_owned();
    }
    decode_legacy_name(raw)
}

/// Decode `raw` as GBK when it looks like GBK, otherwise as UTF-8.
pub fn decode_legacy_name(raw: &[u8]) -> String {
    if is_legacy_double_byte(raw) {
        let (decoded, _) = GBK.decode_without_bom_handling(raw);
        decoded.into_owned()
    } else {
        String::from_utf8_lossy(raw).into_owned()
    }
}

/// Whether every character of `raw` is either ASCII or a GBK double-byte
/// sequence.
///
/// A lead byte at the very end, with no trail byte after it, fails the check.
pub fn is_legacy_double_byte(raw: &[u8]) -> bool {
    let mut i = 0;
    while i < raw.len() {
        let lead = raw[i];
        if lead <= 0x7F {
            i += 1;
            continue;
        }
        let Some(&trail) = raw.get(i + 1) else {
            return false;
        };
        if (0x81..=0xFE).contains(&lead) && (0x40..=0xFE).contains(&trail) && trail != 0xF7 {
            i += 2;
        } else {
            return false;
        }
    }
    true
}
