use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short")]
    Truncated,
    #[error("invalid label")]
    InvalidLabel,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io(err.to_string())
    }
}

/// Shared label (domain name) encode/decode, mirroring the question/answer
/// name handling used elsewhere in the wire layer.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError>;

    /// Read with access to the full packet buffer, needed to follow
    /// compression pointers a secondary might echo back in its reply.
    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        let _ = packet_buf;
        self.read(reader)
    }

    fn read_labels_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        let mut jumps = 0;

        loop {
            let first_byte = reader.read_var::<u8>(8)?;

            if first_byte == 0 {
                break;
            }

            if (first_byte & 0xC0) == 0xC0 {
                let second_byte = reader.read_var::<u8>(8)?;
                let pointer = ((first_byte as u16 & 0x3F) << 8) | second_byte as u16;
                labels.extend(read_labels_at(packet_buf, pointer as usize)?);
                break;
            }

            if first_byte > 63 {
                return Err(ParseError::InvalidLabel);
            }

            let mut label_buf = vec![0u8; first_byte as usize];
            reader.read_bytes(&mut label_buf)?;
            let label = String::from_utf8(label_buf).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label);

            jumps += 1;
            if jumps > 128 {
                return Err(ParseError::InvalidLabel);
            }
        }

        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels {
            if label.is_empty() {
                continue;
            }
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;
        Ok(())
    }
}

/// Parses a sequence of labels starting at `offset` in the raw packet buffer,
/// following at most one level of compression pointer indirection per hop.
fn read_labels_at(buf: &[u8], offset: usize) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut jumps = 0;

    loop {
        if pos >= buf.len() {
            return Err(ParseError::Truncated);
        }
        let len = buf[pos] as usize;

        if len == 0 {
            break;
        }

        if (len & 0xC0) == 0xC0 {
            if pos + 1 >= buf.len() {
                return Err(ParseError::Truncated);
            }
            let pointer = ((len as u16 & 0x3F) << 8) | buf[pos + 1] as u16;
            jumps += 1;
            if jumps > 128 {
                return Err(ParseError::InvalidLabel);
            }
            pos = pointer as usize;
            continue;
        }

        if len > 63 || pos + 1 + len > buf.len() {
            return Err(ParseError::InvalidLabel);
        }

        let label =
            String::from_utf8(buf[pos + 1..pos + 1 + len].to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
        pos += 1 + len;

        jumps += 1;
        if jumps > 128 {
            return Err(ParseError::InvalidLabel);
        }
    }

    Ok(labels)
}
