//! Little-endian wire primitives shared by both simulator protocols.
//! Everything here is a thin wrapper over `AsyncReadExt`/`AsyncWriteExt`;
//! no framing beyond what each call site documents.

use futures::future::select_all;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::tag::ControlTag;

pub async fn read_tag<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> std::io::Result<ControlTag> {
    let byte = read_u8(stream).await?;
    ControlTag::try_from(byte)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

/// Races a tag read across every peer in `peers`, returning the index of
/// whichever one answered (or errored) first, alongside its result.
///
/// Stands in for `irecv(source=MPI.ANY_SOURCE, ...)` from the original
/// protocol: a plain TCP connection per peer has no built-in "receive
/// from whichever peer is ready" primitive, so each peer gets its own
/// pending read and the first one to complete wins.
pub async fn read_tag_any_source<S>(
    peers: &mut [S],
) -> (usize, std::io::Result<ControlTag>)
where
    S: AsyncRead + Unpin,
{
    let futs: Vec<_> = peers
        .iter_mut()
        .map(|peer| Box::pin(read_tag(peer)))
        .collect();
    let (result, index, _still_pending) = select_all(futs).await;
    (index, result)
}

pub async fn write_tag<S: AsyncWrite + Unpin>(
    stream: &mut S,
    tag: ControlTag,
) -> std::io::Result<()> {
    write_u8(stream, tag.into()).await
}

pub async fn read_u8<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<u8> {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await?;
    Ok(buf[0])
}

pub async fn write_u8<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: u8,
) -> std::io::Result<()> {
    stream.write_all(&[value]).await
}

pub async fn read_bool<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<bool> {
    Ok(read_u8(stream).await? != 0)
}

pub async fn write_bool<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: bool,
) -> std::io::Result<()> {
    write_u8(stream, u8::from(value)).await
}

pub async fn read_i32<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<i32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(i32::from_le_bytes(buf))
}

pub async fn write_i32<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: i32,
) -> std::io::Result<()> {
    stream.write_all(&value.to_le_bytes()).await
}

pub async fn read_f64<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<f64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await?;
    Ok(f64::from_le_bytes(buf))
}

pub async fn write_f64<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: f64,
) -> std::io::Result<()> {
    stream.write_all(&value.to_le_bytes()).await
}

pub async fn read_f64_vec<S: AsyncRead + Unpin>(
    stream: &mut S,
    count: usize,
) -> std::io::Result<Vec<f64>> {
    let mut raw = vec![0u8; count * 8];
    stream.read_exact(&mut raw).await?;
    Ok(raw
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().expect("chunk is 8 bytes")))
        .collect())
}

pub async fn write_f64_slice<S: AsyncWrite + Unpin>(
    stream: &mut S,
    values: &[f64],
) -> std::io::Result<()> {
    let mut raw = Vec::with_capacity(values.len() * 8);
    for value in values {
        raw.extend_from_slice(&value.to_le_bytes());
    }
    stream.write_all(&raw).await
}

pub async fn read_i32_vec<S: AsyncRead + Unpin>(
    stream: &mut S,
    count: usize,
) -> std::io::Result<Vec<i32>> {
    let mut raw = vec![0u8; count * 4];
    stream.read_exact(&mut raw).await?;
    Ok(raw
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes")))
        .collect())
}

pub async fn write_i32_slice<S: AsyncWrite + Unpin>(
    stream: &mut S,
    values: &[i32],
) -> std::io::Result<()> {
    let mut raw = Vec::with_capacity(values.len() * 4);
    for value in values {
        raw.extend_from_slice(&value.to_le_bytes());
    }
    stream.write_all(&raw).await
}
