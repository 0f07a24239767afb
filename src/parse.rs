/// Splits a command line into its verb and argument string.
///
/// The verb is the leading run of ASCII letters, upper-cased. Everything
/// after it is the argument, trimmed. Returns `None` when the line does not
/// start with a letter.
pub fn parse_cmd(line: &str) -> Option<(String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let end = line
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(line.len());

    if end == 0 {
        return None;
    }

    Some((line[..end].to_ascii_uppercase(), line[end..].trim().to_string()))
}

/// Parses a 1-based message number.
pub fn parse_msg_id(arg: &str) -> Option<usize> {
    let arg = arg.trim();
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match arg.parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(id) => Some(id),
    }
}

/// Parses the optional message number of LIST and UIDL. An empty argument
/// is `Ok(None)`, a malformed one is an error.
pub fn parse_opt_msg_id(arg: &str) -> Result<Option<usize>, ()> {
    if arg.trim().is_empty() {
        return Ok(None);
    }
    parse_msg_id(arg).map(Some).ok_or(())
}
