use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::common::{PacketComponent, ParseError};
use super::enums::{RRClass, RRType};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsQuestion {
    pub labels: Vec<String>,
    pub qtype: RRType,
    pub qclass: RRClass,
}

impl DnsQuestion {
    /// Builds a question from a canonical, dot-terminated zone name.
    pub fn for_zone(zone_name: &str, qclass: RRClass) -> Self {
        let labels = zone_name
            .trim_end_matches('.')
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Self {
            labels,
            qtype: RRType::SOA,
            qclass,
        }
    }

    /// Joined, lowercase name for case-insensitive comparison, e.g. "example.com".
    pub fn name_lower(&self) -> String {
        self.labels.join(".").to_ascii_lowercase()
    }
}

impl PacketComponent for DnsQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.into())?;
        writer.write_var::<u16>(16, self.qclass.into())?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        self.read_with_buffer(reader, &[])
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        let labels = self.read_labels_with_buffer(reader, packet_buf)?;
        let qtype = reader.read_var::<u16>(16)?.into();
        let qclass = reader.read_var::<u16>(16)?.into();
        *self = DnsQuestion {
            labels,
            qtype,
            qclass,
        };
        Ok(())
    }
}
