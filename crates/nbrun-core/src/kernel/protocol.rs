//! Wire protocol between nbrun and a kernel process.
//!
//! Uses length-prefixed rkyv messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + rkyv-encoded message.
//! Message contents travel as JSON bytes inside the frame since their shape
//! depends on the message type.

use std::io::{Read, Write};

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{ExecuteReply, KernelMessage};

/// Largest frame accepted from a kernel.
const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Request sent from nbrun to the kernel process.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum KernelRequest {
    /// Execute a unit of code.
    Execute {
        /// Source text of the cell.
        code: String,
    },

    /// Ping to check if the kernel is alive.
    Ping,

    /// Shutdown the kernel process gracefully.
    Shutdown,
}

/// Frame sent from the kernel process to nbrun.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum KernelFrame {
    /// Reply to an `Execute` request (control channel).
    Reply {
        /// Reply content as JSON.
        content_json: Vec<u8>,
    },

    /// Broadcast message (output channel).
    Broadcast {
        /// Message type, e.g. `stream` or `status`.
        msg_type: String,
        /// Message content as JSON.
        content_json: Vec<u8>,
    },

    /// Response to `Ping`.
    Pong,

    /// Acknowledgement of shutdown request.
    ShuttingDown,
}

impl KernelFrame {
    /// Encode a reply frame.
    pub fn reply(reply: &ExecuteReply) -> Result<Self> {
        Ok(KernelFrame::Reply {
            content_json: encode_content(&reply.content)?,
        })
    }

    /// Encode a broadcast frame.
    pub fn broadcast(message: &KernelMessage) -> Result<Self> {
        Ok(KernelFrame::Broadcast {
            msg_type: message.msg_type.clone(),
            content_json: encode_content(&message.content)?,
        })
    }
}

fn encode_content(content: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<u8>> {
    serde_json::to_vec(content)
        .map_err(|e| Error::Serialization(format!("Failed to encode message content: {}", e)))
}

/// Decode the JSON content carried by a frame.
pub fn decode_content(bytes: &[u8]) -> Result<serde_json::Map<String, serde_json::Value>> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Serialization(format!("Failed to decode message content: {}", e)))
}

/// Write a message to a writer using length-prefixed rkyv encoding.
pub fn write_message<W: Write>(
    writer: &mut W,
    message: &impl for<'a> Serialize<
        rkyv::rancor::Strategy<
            rkyv::ser::Serializer<
                rkyv::util::AlignedVec,
                rkyv::ser::allocator::ArenaHandle<'a>,
                rkyv::ser::sharing::Share,
            >,
            rkyv::rancor::Error,
        >,
    >,
) -> Result<()> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode kernel frame: {}", e)))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write frame length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write frame body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush kernel stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed rkyv encoding.
///
/// # Safety
///
/// Uses unchecked deserialization. Only safe when reading from the kernel
/// process nbrun itself spawned.
pub fn read_message<R: Read, T>(reader: &mut R) -> Result<T>
where
    T: Archive,
    T::Archived: Deserialize<T, rkyv::rancor::Strategy<rkyv::de::Pool, rkyv::rancor::Error>>,
{
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read frame length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!("Kernel frame too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read frame body: {}", e)))?;

    // SAFETY: frames come from the kernel process we spawned.
    let message = unsafe { rkyv::from_bytes_unchecked::<T, rkyv::rancor::Error>(&bytes) }
        .map_err(|e| Error::Serialization(format!("Failed to decode kernel frame: {}", e)))?;

    Ok(message)
}
