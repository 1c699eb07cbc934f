//! Image transfer framing.
//!
//! One transfer is a `{Image Start,...}` message carrying the metadata, then
//! the compressed image as hex-encoded chunks, then `{Image End}`. All
//! messages go to the same topic, strictly in order, each acknowledged before
//! the next one is sent.

#![allow(async_fn_in_trait)]

use alloc::string::String;
use alloc::vec::Vec;
use core::iter;

use crate::constants::{IMAGE_END, IMAGE_START};
use crate::indicator::Indicator;
use crate::session::{PublishError, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFrame<'a> {
    Start { metadata: &'a [&'a str] },
    Chunk { bytes: &'a [u8] },
    End,
}

impl TransferFrame<'_> {
    /// Message body as published on the wire.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            TransferFrame::Start { metadata } => {
                let mut header = String::from(IMAGE_START);
                for field in metadata.iter() {
                    header.push(',');
                    header.push_str(field);
                }
                header.push('}');
                header.into_bytes()
            }
            TransferFrame::Chunk { bytes } => hex::encode(bytes).into_bytes(),
            TransferFrame::End => IMAGE_END.as_bytes().to_vec(),
        }
    }
}

/// Frames of one transfer in emission order. The last chunk may be shorter
/// than `chunk_size`; an empty image yields just Start and End.
pub fn frames<'a>(
    image: &'a [u8],
    metadata: &'a [&'a str],
    chunk_size: usize,
) -> impl Iterator<Item = TransferFrame<'a>> {
    iter::once(TransferFrame::Start { metadata })
        .chain(
            image
                .chunks(chunk_size.max(1))
                .map(|bytes| TransferFrame::Chunk { bytes }),
        )
        .chain(iter::once(TransferFrame::End))
}

/// Number of chunk frames for an image of `len` bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Anything that can deliver one message synchronously.
pub trait Publish {
    async fn publish(&mut self, topic: &str, payload: &[u8], raw: bool) -> Result<(), PublishError>;
}

impl<S, C> Publish for Session<S, C>
where
    S: embedded_io_async::Read + embedded_io_async::Write + embedded_io_async::ReadReady,
    S::Error: core::fmt::Debug,
    C: crate::clock::Clock,
{
    async fn publish(&mut self, topic: &str, payload: &[u8], raw: bool) -> Result<(), PublishError> {
        Session::publish(self, topic, payload, raw).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Publishing frame `frame` (0 is the Start frame) failed, the rest of the
    /// transfer was abandoned
    Publish { frame: usize, error: PublishError },
}

/// Publish a whole transfer. Stops at the first failed publish; nothing is
/// re-sent.
pub async fn send<P, L>(
    publisher: &mut P,
    indicator: &mut L,
    topic: &str,
    image: &[u8],
    metadata: &[&str],
    chunk_size: usize,
) -> Result<usize, Error>
where
    P: Publish,
    L: Indicator,
{
    log::info!(
        "Sending {} byte image as {} chunk(s) to {}",
        image.len(),
        chunk_count(image.len(), chunk_size),
        topic
    );

    let mut sent = 0;
    for (index, frame) in frames(image, metadata, chunk_size).enumerate() {
        let payload = frame.encode();

        indicator.on();
        let result = publisher.publish(topic, &payload, true).await;
        indicator.off();

        if let Err(error) = result {
            log::error!("Transfer aborted at frame {}: {:?}", index, error);
            return Err(Error::Publish {
                frame: index,
                error,
            });
        }
        sent += 1;
    }

    log::info!("Transfer complete, {} frames", sent);
    Ok(sent)
}
