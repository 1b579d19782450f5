//! Binary field codec
//!
//! Stateless readers for the fixed-format fields both SOCKS framings are built
//! from, and [`BufMut`] writers mirroring them. A read that hits EOF mid-field
//! fails with [`SocksError::TruncatedStream`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{SocksError, SocksResult};

/// Read one unsigned byte
pub async fn read_u8<R>(reader: &mut R) -> SocksResult<u8>
where
    R: AsyncRead + Unpin,
{
    reader.read_u8().await.map_err(SocksError::from_read)
}

/// Read a length byte (0-255) followed by that many raw bytes
pub async fn read_byte_string<R>(reader: &mut R) -> SocksResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = read_u8(reader).await? as usize;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(SocksError::from_read)?;
    Ok(buf)
}

/// Read a big-endian port
pub async fn read_port<R>(reader: &mut R) -> SocksResult<u16>
where
    R: AsyncRead + Unpin,
{
    reader.read_u16().await.map_err(SocksError::from_read)
}

/// Read exactly `len` bytes as a raw network address (4 for IPv4, 16 for IPv6)
pub async fn read_fixed_address<R>(reader: &mut R, len: usize) -> SocksResult<IpAddr>
where
    R: AsyncRead + Unpin,
{
    match len {
        4 => {
            let mut octets = [0u8; 4];
            reader
                .read_exact(&mut octets)
                .await
                .map_err(SocksError::from_read)?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0u8; 16];
            reader
                .read_exact(&mut octets)
                .await
                .map_err(SocksError::from_read)?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        other => Err(SocksError::MalformedFrame(format!(
            "no address is {} bytes long",
            other
        ))),
    }
}

/// Read bytes up to, and excluding, a zero terminator.
///
/// Fails with [`SocksError::MalformedFrame`] if the stream ends before the
/// terminator or more than `max_len` bytes arrive without one.
pub async fn read_cstring<R>(reader: &mut R, max_len: usize) -> SocksResult<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(SocksError::MalformedFrame(format!(
                    "stream ended after {} bytes without a null terminator",
                    buf.len()
                )));
            }
            Err(e) => return Err(SocksError::Io(e)),
        };
        if byte == 0 {
            break;
        }
        if buf.len() == max_len {
            return Err(SocksError::MalformedFrame(format!(
                "null-terminated field exceeds {} bytes",
                max_len
            )));
        }
        buf.push(byte);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Append a length-prefixed byte string; fields over 255 bytes are rejected
pub fn put_byte_string<B: BufMut>(buf: &mut B, bytes: &[u8]) -> SocksResult<()> {
    let len = u8::try_from(bytes.len()).map_err(|_| {
        SocksError::MalformedFrame(format!("field of {} bytes exceeds 255", bytes.len()))
    })?;
    buf.put_u8(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Append a big-endian port
pub fn put_port<B: BufMut>(buf: &mut B, port: u16) {
    buf.put_u16(port);
}

/// Append the raw octets of an address (4 or 16 bytes)
pub fn put_address<B: BufMut>(buf: &mut B, addr: IpAddr) {
    match addr {
        IpAddr::V4(ip) => buf.put_slice(&ip.octets()),
        IpAddr::V6(ip) => buf.put_slice(&ip.octets()),
    }
}

/// Append bytes followed by a zero terminator
pub fn put_cstring<B: BufMut>(buf: &mut B, value: &[u8]) {
    buf.put_slice(value);
    buf.put_u8(0);
}

/// Write a complete frame and flush it
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// Write a frame, silently skipping it if the peer has already gone away
pub async fn write_frame_best_effort<W>(writer: &mut W, frame: &[u8])
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_frame(writer, frame).await {
        debug!("Skipping reply to closed connection: {}", e);
    }
}
