use crate::Error;
use std::io;

/// A `name <email> timestamp offset` attribution, as used by commits and annotated tags.
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct Signature {
    pub name: Vec<u8>,
    pub email: Vec<u8>,
    /// Seconds since the epoch.
    pub time: u64,
    /// Offset from UTC in seconds, positive for east of Greenwich.
    pub offset_in_seconds: i32,
}

impl Signature {
    pub(crate) fn write_to(&self, mut out: impl io::Write) -> io::Result<()> {
        let sign = if self.offset_in_seconds < 0 { '-' } else { '+' };
        let offset = self.offset_in_seconds.abs();
        write!(
            out,
            "{} <{}> {} {}{:02}{:02}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.email),
            self.time,
            sign,
            offset / 3600,
            (offset % 3600) / 60,
        )
    }

    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let email_start = data
            .iter()
            .position(|b| *b == b'<')
            .ok_or(Error::Decode("signature missing '<'"))?;
        let email_end = data
            .iter()
            .position(|b| *b == b'>')
            .ok_or(Error::Decode("signature missing '>'"))?;
        if email_end < email_start {
            return Err(Error::Decode("signature '>' precedes '<'"));
        }
        let name = data[..email_start].trim_end_matches(|c: u8| c == b' ').to_vec();
        let email = data[email_start + 1..email_end].to_vec();
        let rest = std::str::from_utf8(&data[email_end + 1..])
            .map_err(|_| Error::Decode("signature timestamp is not utf8"))?
            .trim();
        let mut parts = rest.split_whitespace();
        let time: u64 = parts
            .next()
            .ok_or(Error::Decode("signature missing timestamp"))?
            .parse()
            .map_err(|_| Error::Decode("signature timestamp is not a number"))?;
        let offset_raw = parts.next().ok_or(Error::Decode("signature missing offset"))?;
        let offset_in_seconds = parse_offset(offset_raw)?;
        Ok(Signature {
            name,
            email,
            time,
            offset_in_seconds,
        })
    }
}

fn parse_offset(raw: &str) -> Result<i32, Error> {
    if raw.len() != 5 {
        return Err(Error::Decode("signature offset must be 5 characters, e.g. +0000"));
    }
    let sign = match &raw[..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(Error::Decode("signature offset must start with + or -")),
    };
    let hours: i32 = raw[1..3].parse().map_err(|_| Error::Decode("invalid offset hours"))?;
    let minutes: i32 = raw[3..5].parse().map_err(|_| Error::Decode("invalid offset minutes"))?;
    Ok(sign * (hours * 3600 + minutes * 60))
}

trait TrimEndMatches {
    fn trim_end_matches(&self, pred: impl Fn(u8) -> bool) -> &[u8];
}

impl TrimEndMatches for [u8] {
    fn trim_end_matches(&self, pred: impl Fn(u8) -> bool) -> &[u8] {
        let mut end = self.len();
        while end > 0 && pred(self[end - 1]) {
            end -= 1;
        }
        &self[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let sig = Signature {
            name: b"Jane Doe".to_vec(),
            email: b"jane@example.com".to_vec(),
            time: 1_600_000_000,
            offset_in_seconds: -3600,
        };
        let mut buf = Vec::new();
        sig.write_to(&mut buf).unwrap();
        assert_eq!(Signature::from_bytes(&buf).unwrap(), sig);
    }
}
