//! VLESS header codec: parses the inbound request header, validates the
//! shared UUID, and extracts the destination the relay should dial.

use crate::buffer::read_at_least;
use crate::error::{Error, Result};
use bytes::Bytes;
use tokio::io::AsyncRead;

const VERSION: u8 = 0x00;
const CMD_TCP: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x02;
const ATYP_IPV6: u8 = 0x03;

/// The parsed result of a VLESS request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlessRequest {
    pub hostname: String,
    pub port: u16,
    /// Payload bytes already read past the header — the first
    /// client-to-server chunk, possibly empty.
    pub data: Bytes,
    /// The two-byte response prefix `[version, 0x00]` to emit once as the
    /// first server-to-client chunk.
    pub resp: [u8; 2],
}

/// Parse a VLESS request header off `reader`, validating it against
/// `uuid` (16 bytes).
///
/// Reads in widening passes: first through the fixed 18-byte prefix
/// (version + UUID + addon length), then through the address-type byte,
/// then through the full variable-length header once its length is known.
pub async fn parse_header<R>(reader: &mut R, uuid: &[u8; 16]) -> Result<VlessRequest>
where
    R: AsyncRead + Unpin,
{
    // version(1) + uuid(16) + pb_len(1)
    let prefix = read_at_least(reader, 18).await?;
    let version = prefix[0];
    let request_uuid = &prefix[1..17];
    let pb_len = prefix[17] as usize;

    if !uuid_matches(request_uuid, uuid) {
        return Err(Error::InvalidUuid);
    }

    // Read through the address-type byte: 18 + pb_len (addons) + 1 (command)
    // + 2 (port) + 1 (atype) = 22 + pb_len.
    let through_atype = 22 + pb_len;
    let buf = if prefix.len() >= through_atype {
        prefix
    } else {
        let rest = read_at_least(reader, through_atype - prefix.len()).await?;
        crate::buffer::concat([prefix, rest])
    };

    let command = buf[18 + pb_len];
    if command != CMD_TCP {
        return Err(Error::UnsupportedCommand(command));
    }

    let port = u16::from_be_bytes([buf[19 + pb_len], buf[20 + pb_len]]);
    let atype = buf[21 + pb_len];
    let addr_start = 22 + pb_len;

    // Domain headers need one more byte (the length prefix) before the
    // total header length is even known.
    let buf = if atype == ATYP_DOMAIN && buf.len() < addr_start + 1 {
        let rest = read_at_least(reader, addr_start + 1 - buf.len()).await?;
        crate::buffer::concat([buf, rest])
    } else {
        buf
    };

    let header_len = match atype {
        ATYP_IPV4 => addr_start + 4,
        ATYP_IPV6 => addr_start + 16,
        ATYP_DOMAIN => {
            let domain_len = buf[addr_start] as usize;
            addr_start + 1 + domain_len
        }
        other => return Err(Error::UnknownAddressType(other)),
    };

    let header = if buf.len() >= header_len {
        buf
    } else {
        let rest = read_at_least(reader, header_len - buf.len()).await?;
        crate::buffer::concat([buf, rest])
    };

    let hostname = match atype {
        ATYP_IPV4 => {
            let octets = &header[addr_start..addr_start + 4];
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        }
        ATYP_IPV6 => render_ipv6(&header[addr_start..addr_start + 16]),
        ATYP_DOMAIN => {
            let domain_len = header[addr_start] as usize;
            let bytes = &header[addr_start + 1..addr_start + 1 + domain_len];
            String::from_utf8_lossy(bytes).into_owned()
        }
        _ => unreachable!("atype validated above"),
    };

    if hostname.is_empty() {
        return Err(Error::EmptyHostname);
    }

    let data = header.slice(header_len..);

    Ok(VlessRequest {
        hostname,
        port,
        data,
        resp: [version, 0x00],
    })
}

/// Length-only-guaranteed comparison: both inputs are fixed 16-byte arrays
/// so the lengths always match; this walks the whole slice rather than
/// short-circuiting on the first mismatch.
fn uuid_matches(a: &[u8], b: &[u8; 16]) -> bool {
    if a.len() != 16 {
        return false;
    }
    let mut diff = 0u8;
    for i in 0..16 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

/// Render an IPv6 address the way the source protocol does: 8 hex groups
/// separated by `:`, leading zeros dropped per group, no `::` compression.
fn render_ipv6(bytes: &[u8]) -> String {
    let mut groups = Vec::with_capacity(8);
    for chunk in bytes.chunks(2) {
        let value = u16::from_be_bytes([chunk[0], chunk[1]]);
        groups.push(format!("{:x}", value));
    }
    groups.join(":")
}
