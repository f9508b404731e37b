//! AT command line parsing.
//!
//! The HFP service-level connection carries ASCII AT command lines
//! terminated by CR/LF. This module splits raw stream reads into logical
//! lines and parses the `IPHONEACCEV` accessory-event extension, which is
//! the one command this accessory acts on.
//!
//! Accessory-event format: the `IPHONEACCEV` token, a separator, the
//! number of key/value elements, then comma-separated decimal integers
//! interpreted as successive (key, value) pairs. Key 1 carries the battery
//! level as a step in 0-9, reported as `(step + 1) * 10` percent.

use crate::error::{Error, Result};

/// Token identifying the accessory-event vendor extension command.
pub const ACCESSORY_EVENT_PREFIX: &str = "IPHONEACCEV";

/// Positive acknowledgement literal.
pub const ACK_OK: &str = "OK";

/// Negative acknowledgement literal.
pub const ACK_ERROR: &str = "ERROR";

/// Line terminator used on both send and receive.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Accessory-event key carrying the battery level.
pub const BATTERY_LEVEL_KEY: u32 = 1;

/// A single logical AT command line, trimmed of surrounding whitespace
/// and control characters.
///
/// Transient: produced from one stream read and consumed within the same
/// receive cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(String);

impl CommandLine {
    /// Create a command line from raw text, trimming surrounding
    /// whitespace and ASCII control characters.
    pub fn new(text: impl AsRef<str>) -> Self {
        let trimmed = text
            .as_ref()
            .trim_matches(|c: char| c.is_ascii_whitespace() || c.is_ascii_control());
        Self(trimmed.to_string())
    }

    /// Get the line text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this line is one of the literal acknowledgement
    /// tokens (`OK` / `ERROR`) sent by the peer in response to our own
    /// commands.
    pub fn is_acknowledgement(&self) -> bool {
        self.0 == ACK_OK || self.0 == ACK_ERROR
    }

    /// Check whether the line is empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a raw read buffer into logical command lines.
///
/// Splits on CR/LF, trims each line, and drops empties. An empty buffer
/// yields no lines. The protocol is ASCII; any non-UTF-8 bytes are
/// replaced lossily and will fail integer parsing downstream.
pub fn split_lines(buf: &[u8]) -> Vec<CommandLine> {
    if buf.is_empty() {
        return Vec::new();
    }

    String::from_utf8_lossy(buf)
        .split(['\r', '\n'])
        .map(CommandLine::new)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Key/value pairs extracted from an accessory-event command line.
///
/// Only the pair with key [`BATTERY_LEVEL_KEY`] is meaningful to this
/// accessory; other keys (signal strength, dock state) are carried but
/// not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryReport {
    pairs: Vec<(u32, u32)>,
}

impl BatteryReport {
    /// The (key, value) pairs in the order they appeared on the line.
    pub fn pairs(&self) -> &[(u32, u32)] {
        &self.pairs
    }

    /// Scan for the battery-level pair and convert its value to a
    /// percentage.
    ///
    /// First matching key wins. The value is a level step in 0-9 mapped
    /// to `(step + 1) * 10` percent; nonsensical steps saturate rather
    /// than wrap. Returns `None` if no pair carries the battery key.
    pub fn battery_percentage(&self) -> Option<u8> {
        self.pairs
            .iter()
            .find(|(key, _)| *key == BATTERY_LEVEL_KEY)
            .map(|(_, value)| {
                let percent = value.saturating_add(1).saturating_mul(10);
                u8::try_from(percent).unwrap_or(u8::MAX)
            })
    }
}

/// Parse a command line as an accessory-event command.
///
/// Returns `Ok(None)` for lines that are not accessory events (they are
/// acknowledged by the session but not interpreted here). Returns
/// [`Error::MalformedLine`] when the line carries the accessory-event
/// token but its field list is empty, has an odd number of elements, or
/// contains a non-numeric field. Malformed lines are dropped by the
/// caller; they never abort the receive loop.
pub fn parse_accessory_event(line: &CommandLine) -> Result<Option<BatteryReport>> {
    let text = line.as_str();
    let Some(start) = text.find(ACCESSORY_EVENT_PREFIX) else {
        return Ok(None);
    };

    let malformed = || Error::MalformedLine {
        line: text.to_string(),
    };

    // Payload is "<count>,<k>,<v>,..." after the command token. Phones
    // send "AT+IPHONEACCEV=..." so accept '=' as well as ',' before the
    // element count.
    let payload = text[start + ACCESSORY_EVENT_PREFIX.len()..].trim_start_matches(['=', ',']);
    if payload.is_empty() {
        return Err(malformed());
    }

    let mut elements = payload.split(',');

    // Leading element is the peer's element count. It must be numeric but
    // is otherwise not validated against the actual field count.
    let count = elements.next().unwrap_or_default();
    count.trim().parse::<u32>().map_err(|_| malformed())?;

    let fields = elements
        .map(|field| field.trim().parse::<u32>().map_err(|_| malformed()))
        .collect::<Result<Vec<u32>>>()?;

    if fields.is_empty() || fields.len() % 2 != 0 {
        return Err(malformed());
    }

    let pairs = fields.chunks_exact(2).map(|kv| (kv[0], kv[1])).collect();

    Ok(Some(BatteryReport { pairs }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> CommandLine {
        CommandLine::new(text)
    }

    #[test]
    fn test_split_empty_buffer() {
        assert!(split_lines(b"").is_empty());
    }

    #[test]
    fn test_split_single_line() {
        let lines = split_lines(b"\r\nAT+CIND?\r\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "AT+CIND?");
    }

    #[test]
    fn test_split_multiple_lines() {
        let lines = split_lines(b"OK\r\nIPHONEACCEV,2,1,3,2,0\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_str(), "OK");
        assert_eq!(lines[1].as_str(), "IPHONEACCEV,2,1,3,2,0");
    }

    #[test]
    fn test_split_trims_controls() {
        let lines = split_lines(b"\x00  AT+BRSF=959 \r\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "AT+BRSF=959");
    }

    #[test]
    fn test_acknowledgement_tokens() {
        assert!(line("OK").is_acknowledgement());
        assert!(line("ERROR").is_acknowledgement());
        assert!(!line("OKAY").is_acknowledgement());
        assert!(!line("IPHONEACCEV,1,1,3").is_acknowledgement());
    }

    #[test]
    fn test_battery_event_extraction() {
        let report = parse_accessory_event(&line("IPHONEACCEV,2,1,3,2,0"))
            .unwrap()
            .unwrap();
        assert_eq!(report.pairs(), &[(1, 3), (2, 0)]);
        assert_eq!(report.battery_percentage(), Some(40));
    }

    #[test]
    fn test_battery_event_at_form() {
        // Real handsets frame the event as an AT command.
        let report = parse_accessory_event(&line("AT+IPHONEACCEV=2,1,3,2,0"))
            .unwrap()
            .unwrap();
        assert_eq!(report.battery_percentage(), Some(40));
    }

    #[test]
    fn test_first_matching_key_wins() {
        let report = parse_accessory_event(&line("IPHONEACCEV,3,2,5,1,5,1,9"))
            .unwrap()
            .unwrap();
        assert_eq!(report.battery_percentage(), Some(60));
    }

    #[test]
    fn test_no_battery_key_yields_no_percentage() {
        let report = parse_accessory_event(&line("IPHONEACCEV,1,2,5"))
            .unwrap()
            .unwrap();
        assert_eq!(report.battery_percentage(), None);
    }

    #[test]
    fn test_percentage_conversion_range() {
        for step in 0..=9u32 {
            let text = format!("IPHONEACCEV,1,1,{step}");
            let report = parse_accessory_event(&line(&text)).unwrap().unwrap();
            assert_eq!(report.battery_percentage(), Some(((step + 1) * 10) as u8));
        }
    }

    #[test]
    fn test_empty_field_list_is_malformed() {
        let result = parse_accessory_event(&line("IPHONEACCEV,0"));
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_odd_field_list_is_malformed() {
        let result = parse_accessory_event(&line("IPHONEACCEV,2,1,3,2"));
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_non_numeric_field_is_malformed() {
        let result = parse_accessory_event(&line("IPHONEACCEV,2,1,full"));
        assert!(matches!(result, Err(Error::MalformedLine { .. })));

        let result = parse_accessory_event(&line("IPHONEACCEV,x,1,3"));
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_bare_token_is_malformed() {
        let result = parse_accessory_event(&line("IPHONEACCEV"));
        assert!(matches!(result, Err(Error::MalformedLine { .. })));
    }

    #[test]
    fn test_other_commands_not_interpreted() {
        assert_eq!(parse_accessory_event(&line("AT+CIND?")).unwrap(), None);
        assert_eq!(parse_accessory_event(&line("AT+VGS=10")).unwrap(), None);
        assert_eq!(parse_accessory_event(&line("OK")).unwrap(), None);
    }
}
