//! The small subset of DNS class/type codes the NOTIFY codec needs.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RRClass {
    #[default]
    Unknown,
    IN,
    CH,
    HS,
}

impl From<u16> for RRClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RRClass::IN,
            3 => RRClass::CH,
            4 => RRClass::HS,
            _ => RRClass::Unknown,
        }
    }
}

impl From<RRClass> for u16 {
    fn from(value: RRClass) -> Self {
        match value {
            RRClass::IN => 1,
            RRClass::CH => 3,
            RRClass::HS => 4,
            RRClass::Unknown => 0,
        }
    }
}

impl std::fmt::Display for RRClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RRClass::IN => write!(f, "IN"),
            RRClass::CH => write!(f, "CH"),
            RRClass::HS => write!(f, "HS"),
            RRClass::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl std::str::FromStr for RRClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(RRClass::IN),
            "CH" => Ok(RRClass::CH),
            "HS" => Ok(RRClass::HS),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RRType {
    #[default]
    Unknown,
    A,
    NS,
    SOA,
    AAAA,
}

impl From<u16> for RRType {
    fn from(value: u16) -> Self {
        match value {
            1 => RRType::A,
            2 => RRType::NS,
            6 => RRType::SOA,
            28 => RRType::AAAA,
            _ => RRType::Unknown,
        }
    }
}

impl From<RRType> for u16 {
    fn from(value: RRType) -> Self {
        match value {
            RRType::A => 1,
            RRType::NS => 2,
            RRType::SOA => 6,
            RRType::AAAA => 28,
            RRType::Unknown => 0,
        }
    }
}
