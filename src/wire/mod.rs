//! NOTIFY wire format: header/question codec and response validation.

mod codec;
mod common;
mod enums;
mod header;
mod question;

pub use codec::{encode_notify_query, validate_response, ValidationResult};
pub use common::{PacketComponent, ParseError};
pub use enums::{RRClass, RRType};
pub use header::{DnsHeader, OPCODE_NOTIFY};
pub use question::DnsQuestion;
