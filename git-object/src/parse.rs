use crate::Error;
use git_hash::ObjectId;

/// Split `data` into `(first line, rest)`, without the trailing `\n`.
pub(crate) fn next_line(data: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let pos = data
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(Error::Decode("expected a newline-terminated header line"))?;
    Ok((&data[..pos], &data[pos + 1..]))
}

/// Parse a header line of the form `"<keyword> <rest>"`, returning `rest`.
pub(crate) fn header_line<'a>(line: &'a [u8], keyword: &str) -> Result<&'a [u8], Error> {
    let prefix = keyword.as_bytes();
    if line.len() <= prefix.len() + 1 || &line[..prefix.len()] != prefix || line[prefix.len()] != b' ' {
        return Err(Error::Decode("missing expected header keyword"));
    }
    Ok(&line[prefix.len() + 1..])
}

/// Parse a `40`-character hex object id out of a header line's value.
pub(crate) fn hex_hash(value: &[u8]) -> Result<ObjectId, Error> {
    ObjectId::from_hex(value).map_err(Error::from)
}
