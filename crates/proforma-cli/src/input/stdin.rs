use std::io::{self, Read};

/// Piped stdin text. `None` for an interactive terminal or blank input.
pub fn piped_text() -> io::Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().lock().read_to_string(&mut buffer)?;
    let text = buffer.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}
