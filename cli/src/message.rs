use std::io::{Read, Write};

use ethers::types::H256;
use ethers::utils::keccak256;

/// Size of the fixed part of an encoded message, before the body.
pub const HEADER_LEN: usize = 1 + 4 + 4 + 32 + 4 + 32;

/// Simple trait for types with a canonical encoding
pub trait Encode {
    /// Write the canonical encoding to the writer
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: Write;

    /// Serialize to a vec
    fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![];
        self.write_to(&mut buf).expect("!alloc");
        buf
    }
}

/// Simple trait for types with a canonical encoding
pub trait Decode {
    /// Try to read from some source
    fn read_from<R>(reader: &mut R) -> std::io::Result<Self>
    where
        R: Read,
        Self: Sized;
}

impl Encode for u8 {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(&[*self])?;
        Ok(1)
    }
}

impl Decode for u8 {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl Encode for u32 {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(&self.to_be_bytes())?;
        Ok(4)
    }
}

impl Decode for u32 {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
}

impl Encode for H256 {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(self.as_ref())?;
        Ok(32)
    }
}

impl Decode for H256 {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut digest = H256::default();
        reader.read_exact(digest.as_mut())?;
        Ok(digest)
    }
}

/// A message as the mailbox encodes it into the `Dispatch` event: a packed
/// header followed by the body the sender passed to `dispatch`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HyperlaneMessage {
    /// Mailbox version
    pub version: u8,
    /// Per-mailbox sequence number
    pub nonce: u32,
    /// Origin domain
    pub origin: u32,
    /// Sender, left-padded to 32 bytes
    pub sender: H256,
    /// Destination domain
    pub destination: u32,
    /// Recipient, left-padded to 32 bytes
    pub recipient: H256,
    /// Body
    pub body: Vec<u8>,
}

impl HyperlaneMessage {
    /// The message id, keccak256 of the encoding
    pub fn id(&self) -> H256 {
        keccak256(self.to_vec()).into()
    }
}

impl Encode for HyperlaneMessage {
    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        let mut written = self.version.write_to(writer)?;
        written += self.nonce.write_to(writer)?;
        written += self.origin.write_to(writer)?;
        written += self.sender.write_to(writer)?;
        written += self.destination.write_to(writer)?;
        written += self.recipient.write_to(writer)?;
        writer.write_all(&self.body)?;
        Ok(written + self.body.len())
    }
}

impl Decode for HyperlaneMessage {
    fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let version = u8::read_from(reader)?;
        let nonce = u32::read_from(reader)?;
        let origin = u32::read_from(reader)?;
        let sender = H256::read_from(reader)?;
        let destination = u32::read_from(reader)?;
        let recipient = H256::read_from(reader)?;
        let mut body = vec![];
        reader.read_to_end(&mut body)?;
        Ok(Self {
            version,
            nonce,
            origin,
            sender,
            destination,
            recipient,
            body,
        })
    }
}

impl TryFrom<&[u8]> for HyperlaneMessage {
    type Error = std::io::Error;

    fn try_from(mut bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::read_from(&mut bytes)
    }
}
